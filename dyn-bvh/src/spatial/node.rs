use std::fmt;

use crate::math::AABB;

/// Handle of a node inside the arena of a [`super::VolumeTree`].
///
/// Handles are only meaningful for the tree that issued them. Slots of discarded nodes get
/// recycled, so a handle must not be kept across structural changes unless it is refreshed
/// through the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Returns the arena index of the node.
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The payload of a node. A node either holds objects or exactly two children.
#[derive(Debug, Clone)]
pub enum NodeContent<T> {
    Leaf(Vec<T>),
    Internal([NodeId; 2]),
}

/// A single node of the tree.
#[derive(Debug, Clone)]
pub struct TreeNode<T> {
    /// Debugging id, unique over the lifetime of the tree.
    pub(crate) serial: u64,

    /// The tight bound of everything below the node.
    pub(crate) bound: AABB,

    /// Distance to the root, which has depth 0.
    pub(crate) depth: usize,

    /// Non-owning link to the parent. `None` for the root.
    pub(crate) parent: Option<NodeId>,

    pub(crate) content: NodeContent<T>,
}

impl<T> TreeNode<T> {
    pub(crate) fn new(
        serial: u64,
        depth: usize,
        parent: Option<NodeId>,
        content: NodeContent<T>,
    ) -> Self {
        Self {
            serial,
            bound: AABB::new(),
            depth,
            parent,
            content,
        }
    }

    /// Returns the debugging id of the node.
    #[inline]
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Returns the bounding volume of the node.
    #[inline]
    pub fn bound(&self) -> &AABB {
        &self.bound
    }

    /// Returns the depth of the node, where the root has depth 0.
    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Returns the parent of the node or `None` for the root.
    #[inline]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    #[inline]
    pub fn content(&self) -> &NodeContent<T> {
        &self.content
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        matches!(self.content, NodeContent::Leaf(_))
    }

    /// Returns the two children of an internal node.
    #[inline]
    pub fn children(&self) -> Option<[NodeId; 2]> {
        match self.content {
            NodeContent::Internal(children) => Some(children),
            NodeContent::Leaf(_) => None,
        }
    }

    /// Returns the objects of a leaf. Internal nodes have none.
    #[inline]
    pub fn objects(&self) -> &[T] {
        match &self.content {
            NodeContent::Leaf(objects) => objects,
            NodeContent::Internal(_) => &[],
        }
    }
}
