use std::collections::BTreeSet;

use log::{debug, trace};
use nalgebra_glm::Vec3;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::math::{Axis, AABB};
use crate::{Error, Result};

use super::{NodeAdapter, NodeContent, NodeId, TreeId, TreeNode, TreeOptions, MERGE_DISCOUNT};

/// Counters about the structural work done by a tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeStats {
    /// Leaves that were split because they exceeded the leaf capacity.
    pub splits: usize,

    /// Insertions that pushed the existing children down into a new node.
    pub merges: usize,

    /// Emptied leaves that were replaced by their sibling.
    pub collapses: usize,

    /// Rotations applied by the optimizer.
    pub rotations_applied: usize,

    /// Nodes visited by the optimizer without a profitable rotation.
    pub rotations_skipped: usize,
}

/// A dynamic bounding volume hierarchy over objects of type `T`.
///
/// The tree owns its nodes in an arena and its adapter, which maps objects to positions, radii
/// and back to their leaves. It is not synchronized; all operations take `&mut self`.
pub struct VolumeTree<T, A> {
    pub(super) id: TreeId,
    pub(super) adapter: A,
    pub(super) options: TreeOptions,

    /// Node arena, `None` marks a free slot.
    pub(super) nodes: Vec<Option<TreeNode<T>>>,
    pub(super) free: Vec<NodeId>,
    pub(super) root: NodeId,

    pub(super) next_serial: u64,
    pub(super) max_depth: usize,

    /// Nodes waiting for a rotation attempt in the next [`VolumeTree::optimize`] call.
    pub(super) pending: BTreeSet<NodeId>,
    pub(super) rng: ChaCha8Rng,
    pub(super) stats: TreeStats,
}

impl<T, A> VolumeTree<T, A>
where
    T: Clone + PartialEq,
    A: NodeAdapter<T>,
{
    /// Builds a new tree top-down from the given objects and binds the adapter to it.
    ///
    /// # Arguments
    /// * `adapter` - The adapter for the objects. Must not be bound to another tree yet.
    /// * `objects` - The initial objects. May be empty.
    /// * `options` - The tree options.
    pub fn new(mut adapter: A, objects: Vec<T>, options: TreeOptions) -> Result<Self> {
        if options.leaf_capacity == 0 {
            return Err(Error::InvalidLeafCapacity(options.leaf_capacity));
        }

        if adapter.owning_tree().is_some() {
            return Err(Error::AdapterAlreadyBound);
        }

        check_new_objects(&mut adapter, &objects)?;

        let id = TreeId::next();
        adapter.bind_tree(id);

        let rng = ChaCha8Rng::seed_from_u64(options.seed);
        let mut tree = Self {
            id,
            adapter,
            options,
            nodes: Vec::new(),
            free: Vec::new(),
            root: NodeId(0),
            next_serial: 0,
            max_depth: 0,
            pending: BTreeSet::new(),
            rng,
            stats: TreeStats::default(),
        };

        let num_objects = objects.len();
        tree.root = if objects.is_empty() {
            tree.alloc(0, None, NodeContent::Leaf(Vec::new()))
        } else {
            tree.build_leaf(objects, None, 0)
        };

        debug!(
            "Built tree {:?} from {} objects: {} nodes, max depth {}",
            tree.id,
            num_objects,
            tree.count_nodes(),
            tree.max_depth
        );

        Ok(tree)
    }

    /// Inserts a new object into the tree.
    ///
    /// The object descends from the root along the cheaper of both children. If keeping the two
    /// children together and adding the object as their sibling is substantially cheaper, the
    /// children are pushed down one level instead.
    pub fn add_object(&mut self, object: T) -> Result<()> {
        if !self.adapter.contains(&object) {
            return Err(Error::ObjectNotFound);
        }

        if self.adapter.get_leaf(&object).is_some() {
            return Err(Error::ObjectAlreadyPresent);
        }

        let bound = self.adapter.bound(&object);
        let mut current = self.root;

        while let Some([left, right]) = self.n(current).children() {
            let left_bound = self.n(left).bound;
            let right_bound = self.n(right).bound;

            let send_left = right_bound.surface_area() + left_bound.union(&bound).surface_area();
            let send_right = left_bound.surface_area() + right_bound.union(&bound).surface_area();
            let merge = left_bound.union(&right_bound).surface_area() + bound.surface_area();

            if merge < MERGE_DISCOUNT * send_left.min(send_right) {
                self.merge_and_push_down(current, object);
                return Ok(());
            }

            current = if send_left <= send_right { left } else { right };
        }

        self.insert_into_leaf(current, object);

        Ok(())
    }

    /// Removes the given object from the tree.
    ///
    /// A leaf that runs empty is discarded together with its parent and the sibling takes the
    /// place of the parent. An emptied root stays as an empty leaf.
    pub fn remove_object(&mut self, object: &T) -> Result<()> {
        let leaf = self.adapter.get_leaf(object).ok_or(Error::ObjectNotFound)?;
        let node = self.node(leaf).ok_or(Error::UnknownNode(leaf))?;
        let index = match &node.content {
            NodeContent::Leaf(objects) => objects
                .iter()
                .position(|o| o == object)
                .ok_or(Error::ObjectNotFound)?,
            NodeContent::Internal(_) => return Err(Error::NotALeaf(leaf)),
        };

        self.adapter.unmap(object);

        let now_empty = match &mut self.n_mut(leaf).content {
            NodeContent::Leaf(objects) => {
                objects.swap_remove(index);
                objects.is_empty()
            }
            NodeContent::Internal(_) => return Err(Error::NotALeaf(leaf)),
        };

        if now_empty && leaf != self.root {
            self.collapse(leaf);
        } else {
            self.refit_upwards(Some(leaf));
        }

        Ok(())
    }

    /// Refits the bound of the leaf after some of its objects moved or changed their radius.
    ///
    /// The change propagates up to the root. If the leaf grew, its parent is scheduled for the
    /// next [`VolumeTree::optimize`] call.
    pub fn refit_leaf(&mut self, leaf: NodeId) -> Result<()> {
        let node = self.node(leaf).ok_or(Error::UnknownNode(leaf))?;
        if !node.is_leaf() {
            return Err(Error::NotALeaf(leaf));
        }

        let before = node.bound;
        let parent = node.parent;

        if self.refit_volume(leaf) {
            let grew = !before.contains_aabb(&self.n(leaf).bound);
            self.refit_upwards(parent);

            if grew {
                self.enqueue(parent);
            }
        }

        Ok(())
    }

    /// Grows the bound of the leaf to include a sphere, without rescanning the other objects.
    ///
    /// The bound stays conservative but may no longer be tight; a later [`VolumeTree::refit_leaf`]
    /// restores tightness. Growth propagates upwards as long as the ancestors grow as well.
    ///
    /// # Arguments
    /// * `leaf` - The leaf to grow.
    /// * `position` - The center of the sphere to include.
    /// * `radius` - The radius of the sphere to include.
    pub fn expand_leaf(&mut self, leaf: NodeId, position: &Vec3, radius: f32) -> Result<()> {
        let node = self.node(leaf).ok_or(Error::UnknownNode(leaf))?;
        if !node.is_leaf() {
            return Err(Error::NotALeaf(leaf));
        }

        if !self.expand_volume(leaf, &AABB::from_sphere(position, radius)) {
            return Ok(());
        }

        let parent = self.n(leaf).parent;
        let mut child = leaf;
        while let Some(id) = self.n(child).parent {
            if !self.child_expanded(id, child) {
                break;
            }

            child = id;
        }

        self.enqueue(parent);

        Ok(())
    }

    /// Refits the leaf owning the given object, see [`VolumeTree::refit_leaf`].
    pub fn object_moved(&mut self, object: &T) -> Result<()> {
        let leaf = self.adapter.get_leaf(object).ok_or(Error::ObjectNotFound)?;
        self.refit_leaf(leaf)
    }

    /// Grows the leaf owning the given object by its current extent, see
    /// [`VolumeTree::expand_leaf`].
    pub fn object_expanded(&mut self, object: &T) -> Result<()> {
        let leaf = self.adapter.get_leaf(object).ok_or(Error::ObjectNotFound)?;
        let position = self.adapter.position(object);
        let radius = self.adapter.radius(object);

        self.expand_leaf(leaf, &position, radius)
    }

    /// Returns the unique id of the tree.
    #[inline]
    pub fn id(&self) -> TreeId {
        self.id
    }

    /// Returns the root node.
    #[inline]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Returns the node for the given handle, or `None` if the handle is not in use.
    #[inline]
    pub fn node(&self, id: NodeId) -> Option<&TreeNode<T>> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    /// Returns the adapter of the tree.
    #[inline]
    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// Returns the adapter for updating object data. Structural mappings must not be changed
    /// through this reference.
    #[inline]
    pub fn adapter_mut(&mut self) -> &mut A {
        &mut self.adapter
    }

    /// Returns the options the tree was built with.
    #[inline]
    pub fn options(&self) -> &TreeOptions {
        &self.options
    }

    /// Returns the counters of the structural work done so far.
    #[inline]
    pub fn stats(&self) -> &TreeStats {
        &self.stats
    }

    /// Returns the deepest depth a node ever had in this tree.
    #[inline]
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Returns the number of nodes waiting for the optimizer.
    #[inline]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Returns the number of nodes in the tree.
    #[inline]
    pub fn count_nodes(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    /// Iterates over all nodes of the tree in arena order.
    pub fn iter_nodes(&self) -> impl Iterator<Item = (NodeId, &TreeNode<T>)> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, node)| node.as_ref().map(|node| (NodeId(i), node)))
    }

    /// Returns the number of objects stored in the tree.
    pub fn object_count(&self) -> usize {
        self.iter_nodes().map(|(_, node)| node.objects().len()).sum()
    }

    /// Returns the sum of the surface areas of all node bounds.
    pub fn total_surface_area(&self) -> f64 {
        self.iter_nodes()
            .map(|(_, node)| node.bound.surface_area() as f64)
            .sum()
    }

    /// Returns the sum of the surface areas of all leaf bounds.
    pub fn leaf_surface_area(&self) -> f64 {
        self.iter_nodes()
            .filter(|(_, node)| node.is_leaf())
            .map(|(_, node)| node.bound.surface_area() as f64)
            .sum()
    }

    /// Returns the node behind a handle that is known to be alive.
    #[inline]
    pub(super) fn n(&self, id: NodeId) -> &TreeNode<T> {
        match self.nodes.get(id.0) {
            Some(Some(node)) => node,
            _ => panic!("Stale node handle {}", id),
        }
    }

    #[inline]
    pub(super) fn n_mut(&mut self, id: NodeId) -> &mut TreeNode<T> {
        match self.nodes.get_mut(id.0) {
            Some(Some(node)) => node,
            _ => panic!("Stale node handle {}", id),
        }
    }

    /// Allocates a new node with an empty bound.
    pub(super) fn alloc(
        &mut self,
        depth: usize,
        parent: Option<NodeId>,
        content: NodeContent<T>,
    ) -> NodeId {
        let serial = self.next_serial;
        self.next_serial += 1;
        self.max_depth = self.max_depth.max(depth);

        let node = TreeNode::new(serial, depth, parent, content);
        match self.free.pop() {
            Some(id) => {
                self.nodes[id.0] = Some(node);
                id
            }
            None => {
                self.nodes.push(Some(node));
                NodeId(self.nodes.len() - 1)
            }
        }
    }

    /// Discards a node. Its slot gets reused by later allocations.
    pub(super) fn release(&mut self, id: NodeId) {
        self.nodes[id.0] = None;
        self.free.push(id);
        self.pending.remove(&id);
    }

    pub(super) fn enqueue(&mut self, id: Option<NodeId>) {
        if let Some(id) = id {
            self.pending.insert(id);
        }
    }

    /// Creates a leaf from the objects and splits it as long as it exceeds the leaf capacity.
    ///
    /// # Panics
    /// If `objects` is empty.
    fn build_leaf(&mut self, objects: Vec<T>, parent: Option<NodeId>, depth: usize) -> NodeId {
        assert!(!objects.is_empty(), "A node needs at least one object");

        let id = self.alloc(depth, parent, NodeContent::Leaf(objects));
        self.register_objects(id);
        self.compute_volume(id);

        if self.n(id).objects().len() > self.options.leaf_capacity {
            self.split_node(id);
        }

        id
    }

    /// Maps all objects of the leaf to it.
    fn register_objects(&mut self, leaf: NodeId) {
        let Self { nodes, adapter, .. } = self;
        if let Some(Some(node)) = nodes.get(leaf.0) {
            for object in node.objects() {
                adapter.map_to_leaf(object, leaf);
            }
        }
    }

    /// Turns a leaf into an internal node with two new children by splitting its objects at the
    /// median of the axis with the lowest surface area cost.
    fn split_node(&mut self, id: NodeId) {
        let objects = match &mut self.n_mut(id).content {
            NodeContent::Leaf(objects) => std::mem::take(objects),
            NodeContent::Internal(_) => panic!("Cannot split internal node {}", id),
        };

        let proxies: Vec<(Vec3, AABB)> = objects
            .iter()
            .map(|o| (self.adapter.position(o), self.adapter.bound(o)))
            .collect();
        let mid = objects.len() / 2;

        let mut best_axis = Axis::X;
        let (mut best_cost, mut best_order) = median_split(&proxies, Axis::X);
        for axis in [Axis::Y, Axis::Z] {
            let (cost, order) = median_split(&proxies, axis);
            if cost < best_cost {
                best_axis = axis;
                best_cost = cost;
                best_order = order;
            }
        }

        trace!(
            "Split node {} with {} objects along {:?} (cost {})",
            id,
            objects.len(),
            best_axis,
            best_cost
        );

        let left: Vec<T> = best_order[..mid].iter().map(|&i| objects[i].clone()).collect();
        let right: Vec<T> = best_order[mid..].iter().map(|&i| objects[i].clone()).collect();

        let depth = self.n(id).depth;
        let left = self.build_leaf(left, Some(id), depth + 1);
        let right = self.build_leaf(right, Some(id), depth + 1);

        self.n_mut(id).content = NodeContent::Internal([left, right]);
        self.compute_volume(id);
        self.stats.splits += 1;
    }

    /// Appends an object to a leaf, refits and splits the leaf if needed.
    fn insert_into_leaf(&mut self, leaf: NodeId, object: T) {
        self.adapter.map_to_leaf(&object, leaf);
        if let NodeContent::Leaf(objects) = &mut self.n_mut(leaf).content {
            objects.push(object);
        }

        self.refit_upwards(Some(leaf));

        if self.n(leaf).objects().len() > self.options.leaf_capacity {
            self.split_node(leaf);
        }
    }

    /// Moves both children of `id` into a new intermediate node and adds the object as a new
    /// leaf next to it.
    fn merge_and_push_down(&mut self, id: NodeId, object: T) {
        let Some([left, right]) = self.n(id).children() else {
            panic!("Cannot push down the children of leaf {}", id);
        };
        let depth = self.n(id).depth;

        let merged = self.alloc(depth + 1, Some(id), NodeContent::Internal([left, right]));
        self.n_mut(left).parent = Some(merged);
        self.n_mut(right).parent = Some(merged);
        self.compute_volume(merged);
        self.restamp_depths(merged, depth + 1);

        let leaf = self.alloc(depth + 1, Some(id), NodeContent::Leaf(vec![object]));
        self.register_objects(leaf);
        self.compute_volume(leaf);

        self.n_mut(id).content = NodeContent::Internal([leaf, merged]);
        self.stats.merges += 1;

        trace!("Pushed down children of node {} into node {}", id, merged);

        self.refit_upwards(Some(id));
    }

    /// Discards an emptied non-root leaf together with its parent, splicing the sibling into the
    /// parent's place.
    fn collapse(&mut self, leaf: NodeId) {
        let Some(parent) = self.n(leaf).parent else {
            return;
        };
        let Some([a, b]) = self.n(parent).children() else {
            panic!("Parent {} of leaf {} has no children", parent, leaf);
        };

        let sibling = if a == leaf { b } else { a };
        let grandparent = self.n(parent).parent;
        let depth = self.n(parent).depth;

        self.n_mut(sibling).parent = grandparent;
        match grandparent {
            Some(gp) => {
                if let NodeContent::Internal(children) = &mut self.n_mut(gp).content {
                    for child in children.iter_mut().filter(|c| **c == parent) {
                        *child = sibling;
                    }
                }
            }
            None => self.root = sibling,
        }

        self.release(leaf);
        self.release(parent);
        self.restamp_depths(sibling, depth);
        self.stats.collapses += 1;

        trace!("Collapsed leaf {}, node {} replaces node {}", leaf, sibling, parent);

        self.refit_upwards(grandparent);
    }

    /// Computes the tight bound of a node from its objects or its children.
    pub(super) fn tight_bound(&self, id: NodeId) -> AABB {
        match &self.n(id).content {
            NodeContent::Leaf(objects) => objects
                .iter()
                .fold(AABB::new(), |acc, o| acc.union(&self.adapter.bound(o))),
            NodeContent::Internal([left, right]) => {
                self.n(*left).bound.union(&self.n(*right).bound)
            }
        }
    }

    /// Recomputes the bound of the node without notifying the parent.
    pub(super) fn compute_volume(&mut self, id: NodeId) {
        let bound = self.tight_bound(id);
        self.n_mut(id).bound = bound;
    }

    /// Recomputes the bound of the node and returns true if it changed.
    fn refit_volume(&mut self, id: NodeId) -> bool {
        let bound = self.tight_bound(id);
        let node = self.n_mut(id);
        if node.bound == bound {
            false
        } else {
            node.bound = bound;
            true
        }
    }

    /// Refits the node and its ancestors until a bound stays unchanged.
    pub(super) fn refit_upwards(&mut self, start: Option<NodeId>) {
        let mut current = start;
        while let Some(id) = current {
            if !self.refit_volume(id) {
                break;
            }

            current = self.n(id).parent;
        }
    }

    /// Grows the bound of the node to include `aabb`. Returns true if it grew.
    fn expand_volume(&mut self, id: NodeId, aabb: &AABB) -> bool {
        let node = self.n_mut(id);
        if node.bound.contains_aabb(aabb) {
            false
        } else {
            node.bound.extend_bbox(aabb);
            true
        }
    }

    /// Grows the bound of `id` to include the bound of its child. Returns true if it grew.
    fn child_expanded(&mut self, id: NodeId, child: NodeId) -> bool {
        let child_bound = self.n(child).bound;
        self.expand_volume(id, &child_bound)
    }

    /// Sets the depth of the subtree rooted at `id`, starting with `depth`.
    pub(super) fn restamp_depths(&mut self, id: NodeId, depth: usize) {
        let mut stack = vec![(id, depth)];
        while let Some((id, depth)) = stack.pop() {
            self.max_depth = self.max_depth.max(depth);

            let node = self.n_mut(id);
            node.depth = depth;
            if let Some([left, right]) = node.children() {
                stack.push((left, depth + 1));
                stack.push((right, depth + 1));
            }
        }
    }
}

/// Checks that the adapter resolves every object and that no object is mapped already or listed
/// twice. Objects get a provisional mapping to detect repeats, which is dropped again on failure.
fn check_new_objects<T, A: NodeAdapter<T>>(adapter: &mut A, objects: &[T]) -> Result<()> {
    for object in objects {
        if !adapter.contains(object) {
            return Err(Error::ObjectNotFound);
        }

        if adapter.get_leaf(object).is_some() {
            return Err(Error::ObjectAlreadyPresent);
        }
    }

    for (i, object) in objects.iter().enumerate() {
        if adapter.get_leaf(object).is_some() {
            objects[..i].iter().for_each(|o| adapter.unmap(o));
            return Err(Error::ObjectAlreadyPresent);
        }

        adapter.map_to_leaf(object, NodeId(0));
    }

    Ok(())
}

/// Sorts the proxies along the axis and returns the surface area cost of splitting them at the
/// median together with the sorted order.
fn median_split(proxies: &[(Vec3, AABB)], axis: Axis) -> (f32, Vec<usize>) {
    let mut order: Vec<usize> = (0..proxies.len()).collect();
    order.sort_by(|&a, &b| axis.coord(&proxies[a].0).total_cmp(&axis.coord(&proxies[b].0)));

    let mid = proxies.len() / 2;
    let cost = half_cost(proxies, &order[..mid]) + half_cost(proxies, &order[mid..]);

    (cost, order)
}

fn half_cost(proxies: &[(Vec3, AABB)], indices: &[usize]) -> f32 {
    let bound = indices
        .iter()
        .fold(AABB::new(), |acc, &i| acc.union(&proxies[i].1));

    bound.surface_area() * indices.len() as f32
}
