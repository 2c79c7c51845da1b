use nalgebra_glm::Vec3;
use serde::{Deserialize, Serialize};

use super::AABB;

/// A sphere given by its center and radius.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sphere {
    pub center: Vec3,
    pub radius: f32,
}

impl Sphere {
    /// Creates a new sphere.
    ///
    /// # Arguments
    /// * `center` - The center of the sphere.
    /// * `radius` - The radius of the sphere.
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Returns the tight axis aligned box around the sphere.
    #[inline]
    pub fn aabb(&self) -> AABB {
        AABB::from_sphere(&self.center, self.radius)
    }

    /// Returns true if both spheres touch or overlap.
    #[inline]
    pub fn overlaps(&self, rhs: &Self) -> bool {
        let r = self.radius + rhs.radius;
        nalgebra_glm::distance2(&self.center, &rhs.center) <= r * r
    }
}
