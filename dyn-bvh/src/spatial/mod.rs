//! Dynamic bounding volume hierarchy over point-like objects.
//!
//! Every object is reduced to a center and a radius by a [`NodeAdapter`]. The tree keeps a tight
//! bound per node while objects are added, removed or moved, and repairs its shape lazily through
//! a batched rotation pass ([`VolumeTree::optimize`]).

mod node;
mod query;
mod rotation;
mod sphere_adapter;
mod tree;
mod validate;

#[cfg(test)]
pub(crate) mod test_utils;

pub use node::*;
pub use rotation::{Family, Rotation};
pub use sphere_adapter::*;
pub use tree::*;

use std::sync::atomic::{AtomicU64, Ordering};

use nalgebra_glm::Vec3;
use serde::{Deserialize, Serialize};

use crate::math::{aabb_ray, Ray, Sphere, AABB};

/// Insertion only merges the new object into a fresh sibling pair if that is cheaper than this
/// fraction of the best descent cost.
pub const MERGE_DISCOUNT: f32 = 0.3;

/// Minimal relative surface area gain for a rotation to be applied.
pub const ROTATION_DISCOUNT: f32 = 0.3;

/// Probability with which the parent of a node with a skipped rotation is revisited.
pub const REVISIT_PROBABILITY: f64 = 0.02;

static NEXT_TREE_ID: AtomicU64 = AtomicU64::new(1);

/// Process wide unique identity of a tree instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TreeId(u64);

impl TreeId {
    /// Allocates a new unique tree id.
    pub(crate) fn next() -> Self {
        Self(NEXT_TREE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Connects arbitrary domain objects to the tree.
///
/// The adapter projects an object onto a position and a radius and owns the mapping from each
/// object to the leaf currently containing it. The tree calls [`NodeAdapter::map_to_leaf`] for
/// every object it relocates, so after each public tree operation `get_leaf` is accurate.
pub trait NodeAdapter<T> {
    /// Returns true if the adapter can resolve the position and radius of the object.
    fn contains(&self, object: &T) -> bool;

    /// Returns the center of the object.
    fn position(&self, object: &T) -> Vec3;

    /// Returns the radius of the object.
    fn radius(&self, object: &T) -> f32;

    /// Registers `leaf` as the leaf containing `object`, replacing any previous mapping.
    fn map_to_leaf(&mut self, object: &T, leaf: NodeId);

    /// Removes the mapping of `object`.
    fn unmap(&mut self, object: &T);

    /// Returns the leaf containing `object`, if any.
    fn get_leaf(&self, object: &T) -> Option<NodeId>;

    /// Permanently associates the adapter with the given tree.
    fn bind_tree(&mut self, tree: TreeId);

    /// Returns the tree the adapter is bound to.
    fn owning_tree(&self) -> Option<TreeId>;

    /// Returns the tight box around the object, i.e., its position +- its radius.
    #[inline]
    fn bound(&self, object: &T) -> AABB {
        AABB::from_sphere(&self.position(object), self.radius(object))
    }
}

/// The options for a volume tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeOptions {
    /// The maximal number of objects per leaf. Only 1 supports incremental optimization.
    #[serde(default = "default_leaf_capacity")]
    pub leaf_capacity: usize,

    /// Seed for the revisit decisions of the optimizer.
    #[serde(default)]
    pub seed: u64,
}

fn default_leaf_capacity() -> usize {
    1
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            leaf_capacity: default_leaf_capacity(),
            seed: 0,
        }
    }
}

/// A trait to enable intersection tests with rays.
pub trait RayIntersectionTest {
    /// Tests the intersection of the ray with the object.
    /// Returns the distance to the intersection point if the ray intersects
    /// with the object, otherwise None.
    ///
    /// # Arguments
    /// * `ray` - The ray to test the intersection with.
    /// * `max_depth` - Optionally, a value can be provided to limit the intersection. This value
    ///             usually comes previous intersection tests and can be used to reduce the
    ///             search space.
    fn intersects_ray(&self, ray: &Ray, max_depth: Option<f32>) -> Option<f32>;
}

impl RayIntersectionTest for AABB {
    #[inline]
    fn intersects_ray(&self, ray: &Ray, max_depth: Option<f32>) -> Option<f32> {
        aabb_ray(self, ray, max_depth)
    }
}

impl RayIntersectionTest for Sphere {
    fn intersects_ray(&self, ray: &Ray, max_depth: Option<f32>) -> Option<f32> {
        let oc = ray.pos - self.center;
        let b = oc.dot(&ray.dir);
        let c = oc.dot(&oc) - self.radius * self.radius;

        // origin inside the sphere
        if c <= 0f32 {
            return Some(0f32);
        }

        let disc = b * b - c;
        if b > 0f32 || disc < 0f32 {
            return None;
        }

        let t = -b - disc.sqrt();
        match max_depth {
            Some(max_depth) if t > max_depth => None,
            _ => Some(t),
        }
    }
}
