use crate::math::{aabb_aabb, sphere_aabb, Ray, Sphere, AABB};

use super::{NodeAdapter, NodeContent, NodeId, RayIntersectionTest, VolumeTree};

impl<T, A> VolumeTree<T, A>
where
    T: Clone + PartialEq,
    A: NodeAdapter<T>,
{
    /// Visits the tree from the root and returns every node whose bound passes the predicate.
    /// Subtrees of a failing node are skipped. Nodes are returned in pre-order.
    ///
    /// # Arguments
    /// * `predicate` - The test for the node bounds.
    pub fn traverse<F>(&self, mut predicate: F) -> Vec<NodeId>
    where
        F: FnMut(&AABB) -> bool,
    {
        let mut result = Vec::new();
        let mut stack = vec![self.root];

        while let Some(id) = stack.pop() {
            let node = self.n(id);
            if !predicate(&node.bound) {
                continue;
            }

            result.push(id);
            if let Some([left, right]) = node.children() {
                stack.push(right);
                stack.push(left);
            }
        }

        result
    }

    /// Returns all nodes whose bound is hit by the ray.
    pub fn traverse_ray(&self, ray: &Ray) -> Vec<NodeId> {
        self.traverse(|bound| bound.intersects_ray(ray, None).is_some())
    }

    /// Returns all nodes whose bound overlaps the box.
    pub fn traverse_box(&self, aabb: &AABB) -> Vec<NodeId> {
        self.traverse(|bound| aabb_aabb(bound, aabb))
    }

    /// Collects the leaves below `start` whose bound overlaps the sphere.
    ///
    /// # Arguments
    /// * `start` - The node to start the search at.
    /// * `sphere` - The query sphere.
    /// * `out` - Receives the overlapping leaves.
    pub fn find_leaves_in_sphere(&self, start: NodeId, sphere: &Sphere, out: &mut Vec<NodeId>) {
        self.find_leaves(start, |bound| sphere_aabb(sphere, bound), out);
    }

    /// Collects the leaves below `start` whose bound overlaps the box.
    ///
    /// # Arguments
    /// * `start` - The node to start the search at.
    /// * `aabb` - The query box.
    /// * `out` - Receives the overlapping leaves.
    pub fn find_leaves_in_box(&self, start: NodeId, aabb: &AABB, out: &mut Vec<NodeId>) {
        self.find_leaves(start, |bound| aabb_aabb(bound, aabb), out);
    }

    fn find_leaves<F>(&self, start: NodeId, test: F, out: &mut Vec<NodeId>)
    where
        F: Fn(&AABB) -> bool,
    {
        if self.node(start).is_none() {
            return;
        }

        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            let node = self.n(id);
            if !test(&node.bound) {
                continue;
            }

            match node.content {
                NodeContent::Leaf(_) => out.push(id),
                NodeContent::Internal([left, right]) => {
                    stack.push(right);
                    stack.push(left);
                }
            }
        }
    }

    /// Returns the objects stored in the given nodes. Internal nodes contribute nothing.
    pub fn objects_in(&self, nodes: &[NodeId]) -> Vec<&T> {
        nodes
            .iter()
            .filter_map(|id| self.node(*id))
            .flat_map(|node| node.objects().iter())
            .collect()
    }

    /// Returns the object whose sphere is hit first by the ray together with the hit distance.
    ///
    /// Children are visited front to back and the search distance shrinks with every hit.
    ///
    /// # Arguments
    /// * `ray` - The ray to cast.
    /// * `max_depth` - Optionally, the maximal hit distance.
    pub fn cast_ray(&self, ray: &Ray, max_depth: Option<f32>) -> Option<(&T, f32)> {
        let mut best: Option<(&T, f32)> = None;
        let mut limit = max_depth;
        let mut stack = vec![self.root];

        while let Some(id) = stack.pop() {
            let node = self.n(id);
            if node.bound.intersects_ray(ray, limit).is_none() {
                continue;
            }

            match &node.content {
                NodeContent::Leaf(objects) => {
                    for object in objects {
                        let sphere =
                            Sphere::new(self.adapter.position(object), self.adapter.radius(object));
                        if let Some(t) = sphere.intersects_ray(ray, limit) {
                            if best.map_or(true, |(_, d)| t < d) {
                                best = Some((object, t));
                                limit = Some(t);
                            }
                        }
                    }
                }
                NodeContent::Internal([left, right]) => {
                    let t_left = self.n(*left).bound.intersects_ray(ray, limit);
                    let t_right = self.n(*right).bound.intersects_ray(ray, limit);

                    // the nearer child goes on top of the stack
                    match (t_left, t_right) {
                        (Some(a), Some(b)) if a <= b => {
                            stack.push(*right);
                            stack.push(*left);
                        }
                        (Some(_), Some(_)) => {
                            stack.push(*left);
                            stack.push(*right);
                        }
                        (Some(_), None) => stack.push(*left),
                        (None, Some(_)) => stack.push(*right),
                        (None, None) => {}
                    }
                }
            }
        }

        best
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashSet;

    use nalgebra_glm::Vec3;
    use rand::prelude::*;
    use rand_chacha::ChaCha8Rng;

    use crate::spatial::test_utils::*;
    use crate::spatial::SphereId;

    use super::*;

    fn random_box(r: &mut ChaCha8Rng) -> AABB {
        let center = Vec3::new(
            r.random_range(-50.0..50.0),
            r.random_range(-50.0..50.0),
            r.random_range(-50.0..50.0),
        );
        AABB::from_sphere(&center, r.random_range(1.0..15.0))
    }

    #[test]
    fn test_traverse_everything() {
        let (tree, _) = build_tree(&cube_corners(0.1), 1);

        let nodes = tree.traverse(|_| true);
        assert_eq!(nodes.len(), tree.count_nodes());
        assert_eq!(nodes[0], tree.root());

        assert!(tree.traverse(|_| false).is_empty());
    }

    #[test]
    fn test_traverse_prunes_subtrees() {
        let (tree, ids) = build_tree(&cube_corners(0.1), 1);

        // only the corner at the origin
        let query = AABB::from_sphere(&Vec3::zeros(), 0.2);
        let nodes = tree.traverse_box(&query);

        // the path from the root down to the single leaf
        assert_eq!(nodes.len(), 4);
        let leaves: Vec<&SphereId> = tree.objects_in(&nodes);
        assert_eq!(leaves, vec![&ids[0]]);
    }

    #[test]
    fn test_traverse_box_is_conservative() {
        let mut r = ChaCha8Rng::seed_from_u64(21);
        let spheres = random_spheres(&mut r, 500);
        let (mut tree, ids) = build_tree(&spheres, 1);

        // also exercise a tree that went through removals and optimization
        for id in ids.iter().take(100) {
            tree.remove_object(id).unwrap();
        }
        tree.optimize().unwrap();

        for _ in 0..100 {
            let query = random_box(&mut r);
            let found: HashSet<SphereId> = tree
                .objects_in(&tree.traverse_box(&query))
                .into_iter()
                .copied()
                .collect();

            for id in ids.iter().skip(100) {
                let sphere = tree.adapter().sphere(*id).unwrap();
                if aabb_aabb(&sphere.aabb(), &query) {
                    assert!(found.contains(id), "Missing object {:?} for {}", id, query);
                }
            }
        }
    }

    #[test]
    fn test_traverse_ray_is_conservative() {
        let mut r = ChaCha8Rng::seed_from_u64(22);
        let spheres = random_spheres(&mut r, 300);
        let (tree, ids) = build_tree(&spheres, 1);

        for _ in 0..100 {
            let ray = random_ray(&mut r);
            let found: HashSet<SphereId> = tree
                .objects_in(&tree.traverse_ray(&ray))
                .into_iter()
                .copied()
                .collect();

            for id in ids.iter() {
                let sphere = tree.adapter().sphere(*id).unwrap();
                if sphere.aabb().intersects_ray(&ray, None).is_some() {
                    assert!(found.contains(id));
                }
            }
        }
    }

    #[test]
    fn test_find_leaves_in_sphere() {
        let mut r = ChaCha8Rng::seed_from_u64(23);
        let spheres = random_spheres(&mut r, 300);
        let (tree, ids) = build_tree(&spheres, 1);

        for _ in 0..100 {
            let query = Sphere::new(random_sphere(&mut r).center, r.random_range(1.0..20.0));

            let mut leaves = Vec::new();
            tree.find_leaves_in_sphere(tree.root(), &query, &mut leaves);
            assert!(leaves.iter().all(|id| tree.node(*id).unwrap().is_leaf()));

            let found: HashSet<SphereId> =
                tree.objects_in(&leaves).into_iter().copied().collect();
            for id in ids.iter() {
                let sphere = tree.adapter().sphere(*id).unwrap();
                if sphere.overlaps(&query) {
                    assert!(found.contains(id));
                }
            }
        }
    }

    #[test]
    fn test_find_leaves_in_box_below_subtree() {
        let (tree, _) = build_tree(&cube_corners(0.1), 1);
        let [left, _] = tree.node(tree.root()).unwrap().children().unwrap();

        let everything = AABB::from_sphere(&Vec3::zeros(), 10.0);
        let mut leaves = Vec::new();
        tree.find_leaves_in_box(left, &everything, &mut leaves);
        assert_eq!(leaves.len(), 4);

        leaves.clear();
        tree.find_leaves_in_box(NodeId(1000), &everything, &mut leaves);
        assert!(leaves.is_empty());
    }

    #[test]
    fn test_cast_ray_matches_brute_force() {
        let mut r = ChaCha8Rng::seed_from_u64(24);
        let spheres = random_spheres(&mut r, 300);
        let (tree, ids) = build_tree(&spheres, 1);

        for _ in 0..200 {
            let ray = random_ray(&mut r);

            let expected = ids
                .iter()
                .filter_map(|id| {
                    let sphere = tree.adapter().sphere(*id).unwrap();
                    sphere.intersects_ray(&ray, None)
                })
                .min_by(|a, b| a.total_cmp(b));

            let hit = tree.cast_ray(&ray, None).map(|(_, t)| t);
            assert_eq!(hit, expected);
        }
    }

    #[test]
    fn test_queries_on_empty_tree() {
        let tree = empty_tree();

        let ray = Ray::new(Vec3::zeros(), Vec3::new(1.0, 0.0, 0.0));
        assert!(tree.traverse_ray(&ray).is_empty());
        assert!(tree
            .traverse_box(&AABB::from_sphere(&Vec3::zeros(), 1.0))
            .is_empty());
        assert!(tree.cast_ray(&ray, None).is_none());
    }
}
