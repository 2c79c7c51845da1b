//! Geometry primitives used by the tree: boxes, rays, spheres and their intersection tests.

mod aabb;
mod intersection;
mod ray;
mod sphere;

pub use aabb::*;
pub use intersection::*;
pub use ray::*;
pub use sphere::*;

use nalgebra_glm::Vec3;

/// Constraint a value to lie between two further values
///
/// # Arguments
/// * `x` - The value to constraint.
/// * `min_value` - The lower bound for the value constraint.
/// * `max_value` - The upper bound for the value constraint.
#[inline]
pub fn clamp<T>(x: T, min_value: T, max_value: T) -> T
where
    T: PartialOrd,
{
    if x < min_value {
        min_value
    } else if x > max_value {
        max_value
    } else {
        x
    }
}

/// Returns the point inside the given box that is closest to `p`.
///
/// # Arguments
/// * `aabb` - The box to project onto.
/// * `p` - The point to project.
#[inline]
pub fn closest_point(aabb: &AABB, p: &Vec3) -> Vec3 {
    Vec3::new(
        clamp(p.x, aabb.min.x, aabb.max.x),
        clamp(p.y, aabb.min.y, aabb.max.y),
        clamp(p.z, aabb.min.z, aabb.max.z),
    )
}

/// One of the three coordinate axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    /// All axes in their canonical order.
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// Returns the coordinate of `p` along this axis.
    #[inline]
    pub fn coord(self, p: &Vec3) -> f32 {
        match self {
            Axis::X => p.x,
            Axis::Y => p.y,
            Axis::Z => p.z,
        }
    }
}
