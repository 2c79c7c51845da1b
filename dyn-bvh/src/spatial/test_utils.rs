use nalgebra_glm::Vec3;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use crate::math::{Ray, Sphere};

use super::{SphereAdapter, SphereId, TreeOptions, VolumeTree};

/// The eight corners of the unit cube. Corner `i` has the coordinates of the bits of `i`, so
/// corner `i` and `7 - i` are opposite.
pub(crate) fn cube_corners(radius: f32) -> Vec<Sphere> {
    (0..8)
        .map(|i| {
            let center = Vec3::new((i & 1) as f32, ((i >> 1) & 1) as f32, ((i >> 2) & 1) as f32);
            Sphere::new(center, radius)
        })
        .collect()
}

pub(crate) fn random_sphere(r: &mut ChaCha8Rng) -> Sphere {
    Sphere::new(
        Vec3::new(
            r.random_range(-50.0..50.0),
            r.random_range(-50.0..50.0),
            r.random_range(-50.0..50.0),
        ),
        r.random_range(0.1..1.0),
    )
}

pub(crate) fn random_spheres(r: &mut ChaCha8Rng, n: usize) -> Vec<Sphere> {
    (0..n).map(|_| random_sphere(r)).collect()
}

pub(crate) fn random_ray(r: &mut ChaCha8Rng) -> Ray {
    let from = Vec3::new(
        r.random_range(-80.0..80.0),
        r.random_range(-80.0..80.0),
        r.random_range(-80.0..80.0),
    );
    let to = Vec3::new(
        r.random_range(-20.0..20.0),
        r.random_range(-20.0..20.0),
        r.random_range(-20.0..20.0),
    );

    Ray::from_pos(&from, &to)
}

/// Builds a tree over the given spheres and returns it with the handles in input order.
pub(crate) fn build_tree(
    spheres: &[Sphere],
    leaf_capacity: usize,
) -> (VolumeTree<SphereId, SphereAdapter>, Vec<SphereId>) {
    let mut adapter = SphereAdapter::new();
    let ids: Vec<SphereId> = spheres.iter().map(|s| adapter.insert(*s)).collect();
    let options = TreeOptions {
        leaf_capacity,
        ..Default::default()
    };

    let tree = VolumeTree::new(adapter, ids.clone(), options).unwrap();
    (tree, ids)
}

pub(crate) fn empty_tree() -> VolumeTree<SphereId, SphereAdapter> {
    VolumeTree::new(SphereAdapter::new(), Vec::new(), TreeOptions::default()).unwrap()
}
