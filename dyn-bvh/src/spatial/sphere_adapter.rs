use std::collections::HashMap;

use nalgebra_glm::Vec3;

use crate::math::Sphere;

use super::{NodeAdapter, NodeId, TreeId};

/// Handle of a sphere stored in a [`SphereAdapter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SphereId(pub usize);

/// Node adapter for plain spheres addressed by [`SphereId`] handles.
#[derive(Debug, Clone, Default)]
pub struct SphereAdapter {
    spheres: Vec<Sphere>,
    leaves: HashMap<SphereId, NodeId>,
    tree: Option<TreeId>,
}

impl SphereAdapter {
    /// Creates a new empty adapter that is not bound to any tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the sphere and returns its handle. The sphere is not added to any tree.
    pub fn insert(&mut self, sphere: Sphere) -> SphereId {
        self.spheres.push(sphere);
        SphereId(self.spheres.len() - 1)
    }

    /// Returns the sphere for the handle.
    #[inline]
    pub fn sphere(&self, id: SphereId) -> Option<&Sphere> {
        self.spheres.get(id.0)
    }

    /// Replaces the sphere behind the handle. Returns false for unknown handles.
    ///
    /// The owning tree must be told about the change afterwards, e.g., through
    /// [`super::VolumeTree::object_moved`].
    pub fn set_sphere(&mut self, id: SphereId, sphere: Sphere) -> bool {
        match self.spheres.get_mut(id.0) {
            Some(s) => {
                *s = sphere;
                true
            }
            None => false,
        }
    }

    /// Returns the number of stored spheres.
    #[inline]
    pub fn len(&self) -> usize {
        self.spheres.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.spheres.is_empty()
    }

    /// Iterates over all handles.
    pub fn ids(&self) -> impl Iterator<Item = SphereId> {
        (0..self.spheres.len()).map(SphereId)
    }
}

impl NodeAdapter<SphereId> for SphereAdapter {
    #[inline]
    fn contains(&self, object: &SphereId) -> bool {
        object.0 < self.spheres.len()
    }

    #[inline]
    fn position(&self, object: &SphereId) -> Vec3 {
        self.spheres[object.0].center
    }

    #[inline]
    fn radius(&self, object: &SphereId) -> f32 {
        self.spheres[object.0].radius
    }

    fn map_to_leaf(&mut self, object: &SphereId, leaf: NodeId) {
        self.leaves.insert(*object, leaf);
    }

    fn unmap(&mut self, object: &SphereId) {
        self.leaves.remove(object);
    }

    fn get_leaf(&self, object: &SphereId) -> Option<NodeId> {
        self.leaves.get(object).copied()
    }

    fn bind_tree(&mut self, tree: TreeId) {
        self.tree = Some(tree);
    }

    fn owning_tree(&self) -> Option<TreeId> {
        self.tree
    }
}
