use std::fmt;
use std::time::Instant;

use log::{debug, error, info};
use nalgebra_glm::Vec3;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use crate::math::{aabb_aabb, Ray, Sphere, AABB};
use crate::spatial::{RayIntersectionTest, SphereAdapter, SphereId, TreeStats, VolumeTree};
use crate::{Error, MovementMode, Result, SimulationConfig};

/// The outcome of a simulation run.
#[derive(Debug, Clone, Default)]
pub struct SimulationReport {
    pub name: String,
    pub num_objects: usize,
    pub num_nodes: usize,
    pub max_depth: usize,

    /// The surface area sum of all nodes right after the build.
    pub initial_surface_area: f64,

    /// The surface area sum of all nodes after the last tick.
    pub final_surface_area: f64,

    /// The number of box and ray queries issued.
    pub num_queries: usize,

    /// The number of objects returned by the broad phase.
    pub num_candidates: usize,

    /// The number of candidates that really overlap the query.
    pub num_hits: usize,

    pub stats: TreeStats,

    pub build_ms: f64,
    pub update_ms: f64,
    pub optimize_ms: f64,
    pub query_ms: f64,
}

impl fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Scenario '{}':", self.name)?;
        writeln!(f, "  - Objects: {}", self.num_objects)?;
        writeln!(f, "  - Nodes: {}", self.num_nodes)?;
        writeln!(f, "  - Max depth: {}", self.max_depth)?;
        writeln!(
            f,
            "  - Surface area: {:.2} -> {:.2}",
            self.initial_surface_area, self.final_surface_area
        )?;
        writeln!(
            f,
            "  - Queries: {} ({} candidates, {} hits)",
            self.num_queries, self.num_candidates, self.num_hits
        )?;
        writeln!(
            f,
            "  - Splits: {}, merges: {}, collapses: {}",
            self.stats.splits, self.stats.merges, self.stats.collapses
        )?;
        writeln!(
            f,
            "  - Rotations: {} applied, {} skipped",
            self.stats.rotations_applied, self.stats.rotations_skipped
        )?;
        write!(
            f,
            "  - Timings: build {:.2} ms, update {:.2} ms, optimize {:.2} ms, query {:.2} ms",
            self.build_ms, self.update_ms, self.optimize_ms, self.query_ms
        )
    }
}

/// Runs a scenario of randomly moving spheres against a tree and checks every query against a
/// brute force scan.
pub struct SimulationExecutor {
    config: SimulationConfig,
}

impl SimulationExecutor {
    /// Creates a new executor.
    ///
    /// # Arguments
    /// * `config` - The scenario to run.
    pub fn new(config: SimulationConfig) -> Self {
        Self { config }
    }

    /// Runs the scenario and returns the report.
    pub fn run(&self) -> Result<SimulationReport> {
        let config = &self.config;
        config.validate()?;

        info!("Scenario: {}", config.name);
        info!("Num Objects: {}", config.num_objects);
        info!("Num Ticks: {}", config.num_ticks);

        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let mut report = SimulationReport {
            name: config.name.clone(),
            num_objects: config.num_objects,
            ..Default::default()
        };

        let mut adapter = SphereAdapter::new();
        let ids: Vec<SphereId> = (0..config.num_objects)
            .map(|_| {
                let center = self.random_position(&mut rng);
                let radius = rng.random_range(config.min_radius..=config.max_radius);
                adapter.insert(Sphere::new(center, radius))
            })
            .collect();

        let t = Instant::now();
        let mut tree = VolumeTree::new(adapter, ids.clone(), config.tree.clone())?;
        report.build_ms = t.elapsed().as_secs_f64() * 1e3f64;
        report.initial_surface_area = tree.total_surface_area();
        info!(
            "Built tree with {} nodes in {} ms",
            tree.count_nodes(),
            report.build_ms
        );

        let num_moved = (config.moved_fraction * ids.len() as f32) as usize;
        let optimize = config.tree.leaf_capacity == 1;

        for tick in 0..config.num_ticks {
            let t = Instant::now();
            let moved: Vec<SphereId> = ids.choose_multiple(&mut rng, num_moved).copied().collect();
            for id in moved.iter() {
                self.move_sphere(&mut tree, *id, &mut rng)?;
            }
            report.update_ms += t.elapsed().as_secs_f64() * 1e3f64;

            if optimize {
                let t = Instant::now();
                tree.optimize()?;
                report.optimize_ms += t.elapsed().as_secs_f64() * 1e3f64;
            }

            let t = Instant::now();
            for _ in 0..config.queries_per_tick {
                self.check_box_query(&tree, &ids, &mut rng, &mut report)?;
                self.check_ray_query(&tree, &ids, &mut rng, &mut report)?;
            }
            report.query_ms += t.elapsed().as_secs_f64() * 1e3f64;

            debug!(
                "Tick {}/{}: {} nodes, surface area {:.2}",
                tick + 1,
                config.num_ticks,
                tree.count_nodes(),
                tree.total_surface_area()
            );
        }

        // expanded leaves are only conservative, refit them before checking the invariants
        if config.movement == MovementMode::Expand {
            for id in ids.iter() {
                tree.object_moved(id)?;
            }
        }

        tree.validate().map_err(|err| {
            error!("Tree is corrupt after the simulation: {:?}", err);
            err
        })?;

        report.num_nodes = tree.count_nodes();
        report.max_depth = tree.max_depth();
        report.final_surface_area = tree.total_surface_area();
        report.stats = *tree.stats();

        Ok(report)
    }

    fn random_position(&self, rng: &mut ChaCha8Rng) -> Vec3 {
        let h = self.config.world_size / 2f32;
        Vec3::new(
            rng.random_range(-h..h),
            rng.random_range(-h..h),
            rng.random_range(-h..h),
        )
    }

    /// Moves the given sphere by a random step and reports the movement to the tree.
    fn move_sphere(
        &self,
        tree: &mut VolumeTree<SphereId, SphereAdapter>,
        id: SphereId,
        rng: &mut ChaCha8Rng,
    ) -> Result<()> {
        let mut sphere = *tree.adapter().sphere(id).ok_or(Error::ObjectNotFound)?;

        let s = self.config.max_step;
        sphere.center += Vec3::new(
            rng.random_range(-s..=s),
            rng.random_range(-s..=s),
            rng.random_range(-s..=s),
        );
        tree.adapter_mut().set_sphere(id, sphere);

        match self.config.movement {
            MovementMode::Refit => tree.object_moved(&id),
            MovementMode::Expand => tree.object_expanded(&id),
        }
    }

    fn check_box_query(
        &self,
        tree: &VolumeTree<SphereId, SphereAdapter>,
        ids: &[SphereId],
        rng: &mut ChaCha8Rng,
        report: &mut SimulationReport,
    ) -> Result<()> {
        let extent = 0.5f32 + rng.random_range(0f32..=1f32) * self.config.world_size / 10f32;
        let query = AABB::from_sphere(&self.random_position(rng), extent);

        let candidates = tree.objects_in(&tree.traverse_box(&query));
        report.num_queries += 1;
        report.num_candidates += candidates.len();

        for id in ids.iter() {
            let sphere = tree.adapter().sphere(*id).ok_or(Error::ObjectNotFound)?;
            if aabb_aabb(&sphere.aabb(), &query) {
                report.num_hits += 1;
                if !candidates.contains(&id) {
                    return Err(Error::InvariantViolation(format!(
                        "box query {} misses {:?}",
                        query, id
                    )));
                }
            }
        }

        Ok(())
    }

    fn check_ray_query(
        &self,
        tree: &VolumeTree<SphereId, SphereAdapter>,
        ids: &[SphereId],
        rng: &mut ChaCha8Rng,
        report: &mut SimulationReport,
    ) -> Result<()> {
        let from = self.random_position(rng) * 2f32;
        let to = self.random_position(rng) / 2f32;
        if from == to {
            return Ok(());
        }
        let ray = Ray::from_pos(&from, &to);

        let candidates = tree.objects_in(&tree.traverse_ray(&ray));
        report.num_queries += 1;
        report.num_candidates += candidates.len();

        let mut nearest: Option<f32> = None;
        for id in ids.iter() {
            let sphere = tree.adapter().sphere(*id).ok_or(Error::ObjectNotFound)?;
            if let Some(t) = sphere.intersects_ray(&ray, None) {
                report.num_hits += 1;
                nearest = Some(nearest.map_or(t, |n| n.min(t)));
            }

            if sphere.aabb().intersects_ray(&ray, None).is_some() && !candidates.contains(&id) {
                return Err(Error::InvariantViolation(format!(
                    "ray query misses {:?}",
                    id
                )));
            }
        }

        let hit = tree.cast_ray(&ray, None).map(|(_, t)| t);
        if hit != nearest {
            return Err(Error::InvariantViolation(format!(
                "nearest ray hit {:?} differs from {:?}",
                hit, nearest
            )));
        }

        Ok(())
    }
}
