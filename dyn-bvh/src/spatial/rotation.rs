use log::{debug, trace};
use rand::Rng;

use crate::math::AABB;
use crate::{Error, Result};

use super::{NodeAdapter, NodeContent, NodeId, VolumeTree, REVISIT_PROBABILITY, ROTATION_DISCOUNT};

/// A local restructuring of a node with two children and up to four grandchildren.
///
/// Naming: `L`/`R` are the children, `LL`, `LR`, `RL`, `RR` the grandchildren. A rotation swaps
/// two of them while keeping the set of objects below the node unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    None,
    /// Swap `L` with `RL`.
    LeftRightLeft,
    /// Swap `L` with `RR`.
    LeftRightRight,
    /// Swap `R` with `LL`.
    RightLeftLeft,
    /// Swap `R` with `LR`.
    RightLeftRight,
    /// Swap `LL` with `RL`.
    LeftLeftRightLeft,
    /// Swap `LL` with `RR`.
    LeftLeftRightRight,
}

impl Rotation {
    pub const ALL: [Rotation; 7] = [
        Rotation::None,
        Rotation::LeftRightLeft,
        Rotation::LeftRightRight,
        Rotation::RightLeftLeft,
        Rotation::RightLeftRight,
        Rotation::LeftLeftRightLeft,
        Rotation::LeftLeftRightRight,
    ];

    /// Returns the summed surface area of both children after applying the rotation, or infinity
    /// if a grandchild required by the rotation does not exist.
    pub fn cost(self, family: &Family) -> f32 {
        let l = &family.left;
        let r = &family.right;

        match (self, family.left_children, family.right_children) {
            (Rotation::None, _, _) => l.surface_area() + r.surface_area(),
            (Rotation::LeftRightLeft, _, Some([rl, rr])) => {
                rl.surface_area() + l.union(&rr).surface_area()
            }
            (Rotation::LeftRightRight, _, Some([rl, rr])) => {
                rr.surface_area() + rl.union(l).surface_area()
            }
            (Rotation::RightLeftLeft, Some([ll, lr]), _) => {
                r.union(&lr).surface_area() + ll.surface_area()
            }
            (Rotation::RightLeftRight, Some([ll, lr]), _) => {
                ll.union(r).surface_area() + lr.surface_area()
            }
            (Rotation::LeftLeftRightLeft, Some([ll, lr]), Some([rl, rr])) => {
                rl.union(&lr).surface_area() + ll.union(&rr).surface_area()
            }
            (Rotation::LeftLeftRightRight, Some([ll, lr]), Some([rl, rr])) => {
                rr.union(&lr).surface_area() + rl.union(&ll).surface_area()
            }
            _ => f32::INFINITY,
        }
    }
}

/// The bounds of the children and grandchildren of a node.
#[derive(Debug, Clone, Copy)]
pub struct Family {
    pub left: AABB,
    pub right: AABB,
    pub left_children: Option<[AABB; 2]>,
    pub right_children: Option<[AABB; 2]>,
}

impl Family {
    /// Returns the cheapest rotation and its cost. Ties prefer the earlier rotation in
    /// [`Rotation::ALL`], i.e., not rotating at all.
    pub fn best_rotation(&self) -> (Rotation, f32) {
        let mut best = (Rotation::None, Rotation::None.cost(self));
        for rotation in Rotation::ALL.into_iter().skip(1) {
            let cost = rotation.cost(self);
            if cost < best.1 {
                best = (rotation, cost);
            }
        }

        best
    }
}

impl<T, A> VolumeTree<T, A>
where
    T: Clone + PartialEq,
    A: NodeAdapter<T>,
{
    /// Repairs the shape of the tree around all nodes whose bounds grew since the last call.
    ///
    /// Pending nodes are processed deepest first; each level is drained completely before the
    /// next shallower one, since a rotation changes the costs seen by its ancestors.
    pub fn optimize(&mut self) -> Result<()> {
        if self.options.leaf_capacity != 1 {
            return Err(Error::UnsupportedLeafCapacity(self.options.leaf_capacity));
        }

        let area_before = self.total_surface_area();
        let stats_before = self.stats;
        let mut num_processed = 0;

        while let Some(depth) = self.pending.iter().map(|id| self.n(*id).depth).max() {
            let batch: Vec<NodeId> = self
                .pending
                .iter()
                .copied()
                .filter(|id| self.n(*id).depth == depth)
                .collect();
            for id in batch.iter() {
                self.pending.remove(id);
            }

            let mut rotated = Vec::new();
            for id in batch {
                num_processed += 1;
                if self.try_rotate(id) {
                    rotated.push(id);
                }
            }

            for id in rotated {
                self.refit_upwards(Some(id));
            }
        }

        debug!(
            "Optimized tree {:?}: {} nodes processed, {} rotations applied, surface area {} -> {}",
            self.id,
            num_processed,
            self.stats.rotations_applied - stats_before.rotations_applied,
            area_before,
            self.total_surface_area()
        );

        Ok(())
    }

    /// Applies the best rotation at the node if it is profitable enough. Returns true if the node
    /// was rotated. The bound of the node itself is left for the caller to refit.
    fn try_rotate(&mut self, id: NodeId) -> bool {
        let Some(node) = self.node(id) else {
            return false;
        };
        let parent = node.parent;

        let Some([left, right]) = node.children() else {
            self.enqueue(parent);
            return false;
        };

        let left_children = self.n(left).children();
        let right_children = self.n(right).children();
        if left_children.is_none() && right_children.is_none() {
            self.enqueue(parent);
            return false;
        }

        let family = Family {
            left: self.n(left).bound,
            right: self.n(right).bound,
            left_children: left_children.map(|[a, b]| [self.n(a).bound, self.n(b).bound]),
            right_children: right_children.map(|[a, b]| [self.n(a).bound, self.n(b).bound]),
        };

        let current = Rotation::None.cost(&family);
        let (best, best_cost) = family.best_rotation();

        if best != Rotation::None
            && current > 0f32
            && (current - best_cost) / current > ROTATION_DISCOUNT
        {
            trace!(
                "Rotating node {} with {:?}: cost {} -> {}",
                id,
                best,
                current,
                best_cost
            );

            self.apply_rotation(id, best);
            self.stats.rotations_applied += 1;
            self.enqueue(parent);

            true
        } else {
            self.stats.rotations_skipped += 1;
            if self.rng.random_bool(REVISIT_PROBABILITY) {
                self.enqueue(parent);
            }

            false
        }
    }

    /// Relinks the nodes below `id` according to the rotation.
    pub(super) fn apply_rotation(&mut self, id: NodeId, rotation: Rotation) {
        match rotation {
            Rotation::None => {}
            Rotation::LeftRightLeft => self.swap_child_with_grandchild(id, 0, 0),
            Rotation::LeftRightRight => self.swap_child_with_grandchild(id, 0, 1),
            Rotation::RightLeftLeft => self.swap_child_with_grandchild(id, 1, 0),
            Rotation::RightLeftRight => self.swap_child_with_grandchild(id, 1, 1),
            Rotation::LeftLeftRightLeft => self.swap_grandchildren(id, 0, 0),
            Rotation::LeftLeftRightRight => self.swap_grandchildren(id, 0, 1),
        }
    }

    /// Swaps the child in slot `child_slot` with the grandchild in slot `grand_slot` of the other
    /// child.
    fn swap_child_with_grandchild(&mut self, id: NodeId, child_slot: usize, grand_slot: usize) {
        let children = self.internal_children(id);
        let child = children[child_slot];
        let other = children[1 - child_slot];
        let grandchild = self.internal_children(other)[grand_slot];

        self.set_child(id, child_slot, grandchild);
        self.set_child(other, grand_slot, child);
        self.compute_volume(other);

        let depth = self.n(id).depth;
        self.restamp_depths(grandchild, depth + 1);
        self.restamp_depths(other, depth + 1);
    }

    /// Swaps the grandchild `left_slot` of the left child with the grandchild `right_slot` of the
    /// right child.
    fn swap_grandchildren(&mut self, id: NodeId, left_slot: usize, right_slot: usize) {
        let [left, right] = self.internal_children(id);
        let a = self.internal_children(left)[left_slot];
        let b = self.internal_children(right)[right_slot];

        self.set_child(left, left_slot, b);
        self.set_child(right, right_slot, a);
        self.compute_volume(left);
        self.compute_volume(right);
    }

    fn internal_children(&self, id: NodeId) -> [NodeId; 2] {
        match self.n(id).children() {
            Some(children) => children,
            None => panic!("Node {} must be internal for the rotation", id),
        }
    }

    fn set_child(&mut self, id: NodeId, slot: usize, child: NodeId) {
        if let NodeContent::Internal(children) = &mut self.n_mut(id).content {
            children[slot] = child;
        }

        self.n_mut(child).parent = Some(id);
    }
}

#[cfg(test)]
mod test {
    use nalgebra_glm::Vec3;
    use rand::prelude::*;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::math::Sphere;
    use crate::spatial::test_utils::*;

    fn unit_box_at(x: f32) -> AABB {
        AABB::from_sphere(&Vec3::new(x, 0.0, 0.0), 0.5)
    }

    #[test]
    fn test_missing_grandchildren_cost_infinity() {
        let family = Family {
            left: unit_box_at(0.0),
            right: unit_box_at(5.0),
            left_children: None,
            right_children: Some([unit_box_at(4.0), unit_box_at(6.0)]),
        };

        assert!(Rotation::LeftRightLeft.cost(&family).is_finite());
        assert!(Rotation::LeftRightRight.cost(&family).is_finite());
        assert_eq!(Rotation::RightLeftLeft.cost(&family), f32::INFINITY);
        assert_eq!(Rotation::RightLeftRight.cost(&family), f32::INFINITY);
        assert_eq!(Rotation::LeftLeftRightLeft.cost(&family), f32::INFINITY);
        assert_eq!(Rotation::LeftLeftRightRight.cost(&family), f32::INFINITY);
    }

    #[test]
    fn test_best_rotation_pairs_close_boxes() {
        // L = {0, 10}, R = {11, 1}: swapping LL with RL groups {10, 11} and {0, 1}
        let family = Family {
            left: unit_box_at(0.0).union(&unit_box_at(10.0)),
            right: unit_box_at(1.0).union(&unit_box_at(11.0)),
            left_children: Some([unit_box_at(0.0), unit_box_at(10.0)]),
            right_children: Some([unit_box_at(11.0), unit_box_at(1.0)]),
        };

        let (best, cost) = family.best_rotation();
        assert_eq!(best, Rotation::LeftLeftRightLeft);
        assert!(cost < Rotation::None.cost(&family));
    }

    #[test]
    fn test_best_rotation_keeps_good_tree() {
        let family = Family {
            left: unit_box_at(0.0).union(&unit_box_at(1.0)),
            right: unit_box_at(10.0).union(&unit_box_at(11.0)),
            left_children: Some([unit_box_at(0.0), unit_box_at(1.0)]),
            right_children: Some([unit_box_at(10.0), unit_box_at(11.0)]),
        };

        assert_eq!(family.best_rotation().0, Rotation::None);
    }

    #[test]
    fn test_apply_rotation_relinks_and_restamps() {
        let (mut tree, _) = build_tree(&cube_corners(0.1), 1);
        let root = tree.root();
        let [left, right] = tree.n(root).children().unwrap();
        let [rl, rr] = tree.n(right).children().unwrap();

        tree.apply_rotation(root, Rotation::LeftRightLeft);
        tree.refit_upwards(Some(root));

        assert_eq!(tree.n(root).children(), Some([rl, right]));
        assert_eq!(tree.n(right).children(), Some([left, rr]));
        assert_eq!(tree.n(rl).parent(), Some(root));
        assert_eq!(tree.n(left).parent(), Some(right));
        assert_eq!(tree.n(rl).depth(), 1);
        assert_eq!(tree.n(left).depth(), 2);
        assert_eq!(tree.max_depth(), 4);
        tree.validate().unwrap();
    }

    #[test]
    fn test_apply_grandchild_rotation() {
        let (mut tree, _) = build_tree(&cube_corners(0.1), 1);
        let root = tree.root();
        let [left, right] = tree.n(root).children().unwrap();
        let [ll, lr] = tree.n(left).children().unwrap();
        let [rl, rr] = tree.n(right).children().unwrap();

        tree.apply_rotation(root, Rotation::LeftLeftRightRight);
        tree.refit_upwards(Some(root));

        assert_eq!(tree.n(left).children(), Some([rr, lr]));
        assert_eq!(tree.n(right).children(), Some([rl, ll]));
        assert_eq!(tree.n(rr).depth(), 2);
        assert_eq!(tree.n(ll).depth(), 2);
        tree.validate().unwrap();
    }

    #[test]
    fn test_optimize_requires_unit_leaf_capacity() {
        let (mut tree, _) = build_tree(&cube_corners(0.1), 2);

        assert!(matches!(
            tree.optimize(),
            Err(Error::UnsupportedLeafCapacity(2))
        ));
    }

    #[test]
    fn test_optimize_repairs_swapped_objects() {
        // two clusters; swapping positions of one member each ruins the tree
        let spheres = vec![
            Sphere::new(Vec3::new(0.0, 0.0, 0.0), 0.1),
            Sphere::new(Vec3::new(0.5, 0.0, 0.0), 0.1),
            Sphere::new(Vec3::new(100.0, 0.0, 0.0), 0.1),
            Sphere::new(Vec3::new(100.5, 0.0, 0.0), 0.1),
        ];
        let (mut tree, ids) = build_tree(&spheres, 1);
        let clean_area = tree.total_surface_area();

        tree.adapter_mut().set_sphere(ids[1], spheres[3]);
        tree.adapter_mut().set_sphere(ids[3], spheres[1]);
        tree.object_moved(&ids[1]).unwrap();
        tree.object_moved(&ids[3]).unwrap();
        tree.validate().unwrap();

        let ruined_area = tree.total_surface_area();
        assert!(ruined_area > clean_area);
        assert_eq!(tree.pending_len(), 2);

        tree.optimize().unwrap();

        assert_eq!(tree.pending_len(), 0);
        assert_eq!(tree.stats().rotations_applied, 1);
        assert!(tree.total_surface_area() < ruined_area);
        assert!((tree.total_surface_area() - clean_area).abs() < 1e-3);
        tree.validate().unwrap();
    }

    #[test]
    fn test_optimize_random_motion() {
        let mut r = ChaCha8Rng::seed_from_u64(42);
        let spheres = random_spheres(&mut r, 1000);
        let (mut tree, ids) = build_tree(&spheres, 1);

        for _ in 0..10 {
            for id in ids.choose_multiple(&mut r, 200) {
                let mut sphere = *tree.adapter().sphere(*id).unwrap();
                sphere.center += Vec3::new(
                    r.random_range(-5.0..5.0),
                    r.random_range(-5.0..5.0),
                    r.random_range(-5.0..5.0),
                );
                tree.adapter_mut().set_sphere(*id, sphere);
                tree.object_moved(id).unwrap();
            }

            let leaf_area = tree.leaf_surface_area();
            let area = tree.total_surface_area();

            while tree.pending_len() > 0 {
                tree.optimize().unwrap();
            }

            assert_eq!(tree.leaf_surface_area(), leaf_area);
            assert!(tree.total_surface_area() <= area);
            tree.validate().unwrap();
        }

        assert!(tree.stats().rotations_applied > 0);
        assert_eq!(tree.object_count(), 1000);
    }

    #[test]
    fn test_optimize_incrementally_grown_tree() {
        let mut r = ChaCha8Rng::seed_from_u64(43);
        let mut tree = empty_tree();

        let mut ids = Vec::new();
        for _ in 0..1000 {
            let id = tree.adapter_mut().insert(random_sphere(&mut r));
            tree.add_object(id).unwrap();
            ids.push(id);
        }
        assert!(tree.stats().merges > 0);
        tree.validate().unwrap();

        for _ in 0..10 {
            for id in ids.choose_multiple(&mut r, 200) {
                let mut sphere = *tree.adapter().sphere(*id).unwrap();
                sphere.center += Vec3::new(
                    r.random_range(-5.0..5.0),
                    r.random_range(-5.0..5.0),
                    r.random_range(-5.0..5.0),
                );
                tree.adapter_mut().set_sphere(*id, sphere);
                tree.object_moved(id).unwrap();
            }

            let leaf_area = tree.leaf_surface_area();
            let area = tree.total_surface_area();

            while tree.pending_len() > 0 {
                tree.optimize().unwrap();
            }

            assert_eq!(tree.leaf_surface_area(), leaf_area);
            assert!(tree.total_surface_area() <= area);
            tree.validate().unwrap();
        }

        assert_eq!(tree.object_count(), 1000);
        assert_eq!(tree.count_nodes(), 1999);
    }

    #[test]
    fn test_optimize_after_expansion() {
        let mut r = ChaCha8Rng::seed_from_u64(9);
        let (mut tree, ids) = build_tree(&random_spheres(&mut r, 200), 1);

        for id in ids.iter().take(50) {
            let sphere = Sphere::new(random_sphere(&mut r).center, 1.0);
            tree.adapter_mut().set_sphere(*id, sphere);
            tree.object_expanded(id).unwrap();
        }

        tree.optimize().unwrap();
        assert_eq!(tree.pending_len(), 0);

        // after a full refit of every object the tree is tight again
        for id in ids.iter() {
            tree.object_moved(id).unwrap();
        }
        tree.optimize().unwrap();
        tree.validate().unwrap();
    }

    #[test]
    fn test_optimize_on_empty_tree() {
        let mut tree = empty_tree();

        tree.optimize().unwrap();
        assert_eq!(tree.count_nodes(), 1);
    }
}
