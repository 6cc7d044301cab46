use std::ops::Range;

use bevy::log::{debug, warn};
use bevy::math::{DVec3, Vec3};
use bevy::tasks::{TaskPool, TaskPoolBuilder};
use nbody_core::{BodyHandle, BodyStore, SimConfig, SimError, Viewpoint};
use nbody_physics::forces::ForceLaw;
use nbody_physics::{aggregate, collision, forces, integrator};
use nbody_physics::{BucketTable, CapacityOverflow, Grid, Snapshot};

use crate::schedule::{Domain, Stage, StageGraph};

/// A body absorbed into another during a frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Merge {
    pub survivor: BodyHandle,
    pub absorbed: BodyHandle,
    pub absorbed_mass: f32,
}

/// What happened during one frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameReport {
    pub frame: u64,
    /// Bodies that entered the pipeline
    pub bodies: usize,
    /// Bodies left out for non-finite or non-positive state
    pub rejected: Vec<BodyHandle>,
    pub cell_size: f64,
    pub buckets: usize,
    pub merges: Vec<Merge>,
    /// Capacity limits exceeded and grown past
    pub overflows: Vec<CapacityOverflow>,
    /// Bodies removed from the store by the destroy sink
    pub destroyed: usize,
}

/// Per-frame N-body update.
///
/// Owns the scratch buffers (snapshot, bucket arena, destroy queue) and the
/// worker pool. Scratch is cleared at the start of each frame, never
/// reallocated unless the body count grows.
pub struct Pipeline {
    config: SimConfig,
    law: ForceLaw,
    pool: TaskPool,
    order: Vec<Stage>,
    snapshot: Snapshot,
    grid: Grid,
    table: BucketTable,
    translations: Vec<Vec3>,
    destroy_queue: Vec<BodyHandle>,
    frame: u64,
}

impl Pipeline {
    pub fn new(config: SimConfig) -> Result<Self, SimError> {
        config.validate()?;
        let order = StageGraph::standard()
            .validate()
            .map_err(|err| SimError::InvalidSchedule(err.to_string()))?;

        let mut builder = TaskPoolBuilder::new().thread_name("nbody-frame".to_string());
        if let Some(threads) = config.worker_threads {
            builder = builder.num_threads(threads);
        }

        Ok(Self {
            law: ForceLaw::from_config(&config),
            pool: builder.build(),
            order,
            snapshot: Snapshot::new(),
            grid: Grid::default(),
            table: BucketTable::with_capacity(config.max_buckets, config.body_count as usize),
            translations: Vec::new(),
            destroy_queue: Vec::new(),
            frame: 0,
            config,
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Frames completed so far
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn stage_order(&self) -> &[Stage] {
        &self.order
    }

    /// Advance every body in `store` by `dt`.
    ///
    /// The store is only written by the last two stages, so a failing frame
    /// leaves it untouched.
    pub fn tick(
        &mut self,
        store: &mut BodyStore,
        dt: f32,
        viewpoint: &Viewpoint,
    ) -> Result<FrameReport, SimError> {
        if !dt.is_finite() || dt < 0.0 {
            return Err(SimError::InvalidTimeStep(dt));
        }

        let mut report = FrameReport {
            frame: self.frame + 1,
            ..Default::default()
        };
        for stage in self.order.clone() {
            if let Err(err) = self.run_stage(stage, store, dt, viewpoint, &mut report) {
                debug!("Frame {} stopped at {} stage: {err}", report.frame, stage.name());
                return Err(err);
            }
        }
        self.frame += 1;

        debug!(
            "Frame {}: {} bodies in {} buckets (cell {:.3}), {} merges",
            report.frame,
            report.bodies,
            report.buckets,
            report.cell_size,
            report.merges.len()
        );
        Ok(report)
    }

    fn run_stage(
        &mut self,
        stage: Stage,
        store: &mut BodyStore,
        dt: f32,
        viewpoint: &Viewpoint,
        report: &mut FrameReport,
    ) -> Result<(), SimError> {
        match stage {
            Stage::Snapshot => self.extract(store, report),
            Stage::Bounds => {
                self.grid = Grid::fit(
                    &self.snapshot.positions,
                    self.config.cell_divisor,
                    self.config.min_cell_size,
                );
                report.cell_size = self.grid.cell_size;
            }
            Stage::Partition => self.partition(report)?,
            Stage::Collision => self.resolve_collisions(report),
            Stage::Aggregate => self.aggregate(),
            Stage::Forces => self.evaluate_forces(),
            Stage::Integrate => self.integrate(dt, viewpoint),
            Stage::Scale => self.update_scales(),
            Stage::Commit => self.commit(store),
            Stage::DestroySink => {
                for handle in self.destroy_queue.drain(..) {
                    if store.remove(handle).is_some() {
                        report.destroyed += 1;
                    }
                }
            }
        }
        Ok(())
    }

    /// Work items of a domain, one range per task: everything at once for
    /// serial stages, one bucket per task, or one contiguous chunk of bodies
    /// per worker thread.
    fn task_ranges(&self, domain: Domain) -> Vec<Range<usize>> {
        let bodies = self.snapshot.len();
        match domain {
            Domain::Serial => vec![0..bodies],
            Domain::PerBucket => (0..self.table.len()).map(|b| b..b + 1).collect(),
            Domain::PerBody => {
                let chunk = bodies.div_ceil(self.pool.thread_num().max(1)).max(1);
                (0..bodies)
                    .step_by(chunk)
                    .map(|start| start..(start + chunk).min(bodies))
                    .collect()
            }
        }
    }

    /// Run `task` on the pool once per range of the stage's domain.
    /// Results come back in range order whichever task finishes first.
    fn fan_out<T, F>(&self, stage: Stage, task: F) -> Vec<T>
    where
        T: Send + 'static,
        F: Fn(Range<usize>) -> T + Sync,
    {
        let ranges = self.task_ranges(stage.domain());
        let task = &task;
        let mut results = self.pool.scope(move |s| {
            for range in ranges {
                s.spawn(async move { (range.start, task(range)) });
            }
        });
        results.sort_by_key(|(start, _)| *start);
        results.into_iter().map(|(_, result)| result).collect()
    }

    fn extract(&mut self, store: &BodyStore, report: &mut FrameReport) {
        self.destroy_queue.clear();
        report.rejected = self.snapshot.extract(store);
        for handle in &report.rejected {
            warn!("Excluding body {handle} from frame {}: non-finite or non-positive state", report.frame);
        }
        report.bodies = self.snapshot.len();
        self.translations.clear();
        self.translations.resize(self.snapshot.len(), Vec3::ZERO);
    }

    fn partition(&mut self, report: &mut FrameReport) -> Result<(), SimError> {
        self.table
            .rebuild(&self.snapshot.positions, &self.grid, &self.config)?;
        report.buckets = self.table.len();
        report.overflows = self.table.overflows().to_vec();
        for overflow in &report.overflows {
            warn!(
                "{} capacity exceeded ({} > {}), grown for frame {}",
                overflow.kind, overflow.requested, overflow.limit, report.frame
            );
        }
        Ok(())
    }

    fn resolve_collisions(&mut self, report: &mut FrameReport) {
        let table = &self.table;
        let snapshot = &self.snapshot;
        let outcomes = self.fan_out(Stage::Collision, |buckets| {
            buckets
                .map(|b| collision::resolve_bucket(b, table.members(b), snapshot))
                .collect::<Vec<_>>()
        });

        for outcome in outcomes.into_iter().flatten() {
            outcome.apply(&mut self.snapshot);
            for absorption in &outcome.absorptions {
                let absorbed = self.snapshot.handles[absorption.absorbed];
                self.destroy_queue.push(absorbed);
                report.merges.push(Merge {
                    survivor: self.snapshot.handles[absorption.survivor],
                    absorbed,
                    absorbed_mass: absorption.mass,
                });
            }
        }
    }

    fn aggregate(&mut self) {
        let table = &self.table;
        let snapshot = &self.snapshot;
        let masses = self.fan_out(Stage::Aggregate, |buckets| {
            buckets
                .map(|b| (b, aggregate::aggregate_mass(table.members(b), snapshot)))
                .collect::<Vec<_>>()
        });
        for (bucket, mass) in masses.into_iter().flatten() {
            self.table.set_aggregate_mass(bucket, mass);
        }
    }

    fn evaluate_forces(&mut self) {
        let table = &self.table;
        let snapshot = &self.snapshot;
        let law = &self.law;
        let outcomes = self.fan_out(Stage::Forces, |buckets| {
            buckets
                .map(|b| forces::evaluate_bucket(b, table, snapshot, law))
                .collect::<Vec<_>>()
        });

        self.snapshot.forces.fill(Vec3::ZERO);
        for outcome in outcomes.into_iter().flatten() {
            for (index, force) in outcome.forces {
                self.snapshot.forces[index] = force;
            }
        }
    }

    fn integrate(&mut self, dt: f32, viewpoint: &Viewpoint) {
        let look_at = DVec3::from_array(viewpoint.look_at);
        let snapshot = &self.snapshot;
        let moved = self.fan_out(Stage::Integrate, |bodies| {
            bodies
                .filter(|&i| snapshot.is_live(i))
                .map(|i| {
                    let (position, velocity) = integrator::integrate(
                        snapshot.positions[i],
                        snapshot.velocities[i],
                        snapshot.forces[i],
                        snapshot.masses[i],
                        dt,
                    );
                    (i, position, velocity, integrator::recenter(position, look_at))
                })
                .collect::<Vec<_>>()
        });

        for (i, position, velocity, translation) in moved.into_iter().flatten() {
            self.snapshot.positions[i] = position;
            self.snapshot.velocities[i] = velocity;
            self.translations[i] = translation;
        }
    }

    fn update_scales(&mut self) {
        let snapshot = &self.snapshot;
        let scales = self.fan_out(Stage::Scale, |bodies| {
            bodies
                .filter(|&i| snapshot.is_live(i))
                .map(|i| (i, integrator::scale_from_mass(snapshot.masses[i])))
                .collect::<Vec<_>>()
        });
        for (i, scale) in scales.into_iter().flatten() {
            self.snapshot.scales[i] = scale;
        }
    }

    /// Write surviving bodies back to the store
    fn commit(&self, store: &mut BodyStore) {
        let snapshot = &self.snapshot;
        for i in 0..snapshot.len() {
            if snapshot.destroyed[i] {
                continue;
            }
            match store.try_get_mut(snapshot.handles[i]) {
                Ok(body) => {
                    body.position = snapshot.positions[i].to_array();
                    body.velocity = snapshot.velocities[i].to_array();
                    body.mass = snapshot.masses[i];
                    body.scale = snapshot.scales[i];
                    body.force = snapshot.forces[i].to_array();
                    body.translation = self.translations[i].to_array();
                }
                Err(err) => warn!("Skipping write-back: {err}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nbody_core::{Body, CapacityKind, OverflowPolicy};
    use nbody_physics::integrator::scale_from_mass;
    use nbody_physics::procgen;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    const DT: f32 = 1.0 / 60.0;

    fn heavy(position: [f64; 3]) -> Body {
        Body::at_rest(position, 100.0).with_scale(scale_from_mass(100.0))
    }

    fn bodies(store: &BodyStore) -> Vec<Body> {
        store.iter().map(|(_, body)| *body).collect()
    }

    fn cloud(config: &SimConfig) -> BodyStore {
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        procgen::generate_cloud(config, &mut rng).into_iter().collect()
    }

    #[test]
    fn test_stage_order_matches_graph() {
        let pipeline = Pipeline::new(SimConfig::default()).unwrap();
        assert_eq!(pipeline.stage_order(), StageGraph::standard().order().unwrap().as_slice());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = SimConfig { softening: -1.0, ..SimConfig::default() };
        assert!(matches!(Pipeline::new(config), Err(SimError::InvalidConfig(_))));
    }

    #[test]
    fn test_empty_store_is_a_no_op() {
        let mut pipeline = Pipeline::new(SimConfig::default()).unwrap();
        let mut store = BodyStore::new();
        let report = pipeline.tick(&mut store, DT, &Viewpoint::default()).unwrap();
        assert_eq!(report.bodies, 0);
        assert_eq!(report.buckets, 0);
        assert!(report.merges.is_empty());
        assert_eq!(report.cell_size, SimConfig::default().min_cell_size);
        assert_eq!(pipeline.frame(), 1);
    }

    #[test]
    fn test_invalid_time_step() {
        let mut pipeline = Pipeline::new(SimConfig::default()).unwrap();
        let mut store: BodyStore = procgen::test_bed().into_iter().collect();
        let before = bodies(&store);
        for dt in [-0.1, f32::NAN, f32::INFINITY] {
            let result = pipeline.tick(&mut store, dt, &Viewpoint::default());
            assert!(matches!(result, Err(SimError::InvalidTimeStep(_))));
        }
        assert_eq!(bodies(&store), before);
        assert_eq!(pipeline.frame(), 0);
    }

    #[test]
    fn test_equal_mass_head_on_collision() {
        let mut pipeline = Pipeline::new(SimConfig::default()).unwrap();
        let mut store = BodyStore::new();
        let first = store.insert(heavy([0.0, 0.0, 0.0]));
        let second = store.insert(heavy([0.5, 0.0, 0.0]));

        let report = pipeline.tick(&mut store, DT, &Viewpoint::default()).unwrap();
        assert_eq!(
            report.merges,
            vec![Merge { survivor: first, absorbed: second, absorbed_mass: 100.0 }]
        );
        assert_eq!(report.destroyed, 1);
        assert!(!store.contains(second));

        let survivor = store.get(first).unwrap();
        assert_eq!(survivor.mass, 200.0);
        assert_eq!(survivor.scale, scale_from_mass(200.0));
        assert!(survivor.scale > scale_from_mass(100.0));

        let next = pipeline.tick(&mut store, DT, &Viewpoint::default()).unwrap();
        assert_eq!(next.bodies, 1);
        assert!(next.merges.is_empty());
    }

    #[test]
    fn test_cross_bucket_overlap_is_not_merged() {
        let mut pipeline = Pipeline::new(SimConfig::default()).unwrap();
        let mut store = BodyStore::new();
        // Contact distance is about 1.28, the cell size 1.0: the pair
        // overlaps but straddles a cell boundary.
        let left = store.insert(heavy([0.0, 0.0, 0.0]));
        let right = store.insert(heavy([1.0, 0.0, 0.0]));

        let report = pipeline.tick(&mut store, DT, &Viewpoint::default()).unwrap();
        assert_eq!(report.buckets, 2);
        assert!(report.merges.is_empty());
        assert!(store.contains(left));
        assert!(store.contains(right));
    }

    #[test]
    fn test_isolated_body_drifts_exactly() {
        let mut pipeline = Pipeline::new(SimConfig::default()).unwrap();
        let mut store = BodyStore::new();
        let start = [3.0, -4.0, 5.5];
        let velocity = [1.0f32, 2.0, -0.5];
        let handle = store.insert(Body::new(start, velocity, 10.0));

        pipeline.tick(&mut store, 0.5, &Viewpoint::default()).unwrap();
        let body = store.get(handle).unwrap();
        assert_eq!(body.force, [0.0; 3]);
        assert_eq!(body.velocity, velocity);
        let expected = DVec3::from_array(start) + (0.5 * Vec3::from_array(velocity)).as_dvec3();
        assert_eq!(body.position, expected.to_array());
    }

    #[test]
    fn test_mass_is_conserved_across_frames() {
        let config = SimConfig {
            body_count: 300,
            spawn_extent: 15.0,
            ..SimConfig::default()
        };
        let mut store = cloud(&config);
        let mut pipeline = Pipeline::new(config).unwrap();
        let initial = store.total_mass();

        let mut merges = 0;
        for _ in 0..30 {
            let report = pipeline.tick(&mut store, DT, &Viewpoint::default()).unwrap();
            merges += report.merges.len();
            assert_eq!(report.destroyed, report.merges.len());
            assert!((store.total_mass() - initial).abs() <= initial * 1e-6);
        }
        assert!(merges > 0);
        assert_eq!(store.len(), 300 - merges);
    }

    #[test]
    fn test_results_do_not_depend_on_thread_count() {
        let base = SimConfig {
            body_count: 200,
            spawn_extent: 30.0,
            initial_speed: 1.0,
            ..SimConfig::default()
        };
        let mut serial_store = cloud(&base);
        let mut parallel_store = cloud(&base);
        let mut serial = Pipeline::new(SimConfig { worker_threads: Some(1), ..base.clone() }).unwrap();
        let mut parallel = Pipeline::new(SimConfig { worker_threads: Some(4), ..base }).unwrap();

        for _ in 0..10 {
            let a = serial.tick(&mut serial_store, DT, &Viewpoint::default()).unwrap();
            let b = parallel.tick(&mut parallel_store, DT, &Viewpoint::default()).unwrap();
            assert_eq!(a.merges, b.merges);
        }
        assert_eq!(bodies(&serial_store), bodies(&parallel_store));
    }

    #[test]
    fn test_non_finite_body_is_excluded() {
        let mut pipeline = Pipeline::new(SimConfig::default()).unwrap();
        let mut store = BodyStore::new();
        let good = store.insert(heavy([0.0, 0.0, 0.0]));
        let other = store.insert(heavy([40.0, 0.0, 0.0]));
        let poisoned = Body::at_rest([f64::NAN, 0.0, 0.0], 100.0);
        let bad = store.insert(poisoned);

        let report = pipeline.tick(&mut store, DT, &Viewpoint::default()).unwrap();
        assert_eq!(report.rejected, vec![bad]);
        assert_eq!(report.bodies, 2);
        assert!(store.get(bad).unwrap().position[0].is_nan());
        for handle in [good, other] {
            let body = store.get(handle).unwrap();
            assert!(body.position.iter().all(|c| c.is_finite()));
            assert!(body.force.iter().all(|f| f.is_finite()));
            assert_ne!(body.force, [0.0; 3]);
        }
    }

    #[test]
    fn test_non_finite_velocity_is_excluded_same_frame() {
        let mut pipeline = Pipeline::new(SimConfig::default()).unwrap();
        let mut store = BodyStore::new();
        let good = store.insert(heavy([0.0, 0.0, 0.0]));
        let runaway = store.insert(Body::new([30.0, 0.0, 0.0], [f32::INFINITY, 0.0, 0.0], 100.0));

        let report = pipeline.tick(&mut store, DT, &Viewpoint::default()).unwrap();
        assert_eq!(report.rejected, vec![runaway]);
        assert_eq!(store.get(runaway).unwrap().position, [30.0, 0.0, 0.0]);
        assert_eq!(store.get(good).unwrap().force, [0.0; 3]);
    }

    #[test]
    fn test_distant_cluster_attracts_correctly() {
        let mut pipeline = Pipeline::new(SimConfig::default()).unwrap();
        let mut store = BodyStore::new();
        let low = store.insert(Body::at_rest([1e11, 0.0, 0.0], 10.0));
        let high = store.insert(Body::at_rest([1e11, 0.0, 100.0], 10.0));

        let report = pipeline.tick(&mut store, DT, &Viewpoint::default()).unwrap();
        assert_eq!(report.buckets, 2);

        let pull = |handle| Vec3::from_array(store.get(handle).unwrap().force);
        let (up, down) = (pull(low), pull(high));
        assert!(up.z > 0.0 && up.z > 10.0 * up.x.abs());
        assert!(down.z < 0.0 && -down.z > 10.0 * down.x.abs());
        // 10 * 10 / (100^2 + 10) for the exact pair
        let exact = 100.0 / 10_010.0;
        assert!((up.length() - exact).abs() / exact < 0.15);
    }

    #[test]
    fn test_task_ranges_follow_stage_domain() {
        let config = SimConfig { worker_threads: Some(3), ..SimConfig::default() };
        let mut pipeline = Pipeline::new(config).unwrap();
        let mut store: BodyStore = (0..10)
            .map(|i| Body::at_rest([i as f64 * 20.0, 0.0, 0.0], 1.0))
            .collect();
        pipeline.tick(&mut store, DT, &Viewpoint::default()).unwrap();

        let serial = pipeline.task_ranges(Stage::Bounds.domain());
        assert_eq!(serial, vec![0..10]);

        let buckets = pipeline.task_ranges(Stage::Forces.domain());
        assert_eq!(buckets.len(), pipeline.table.len());
        assert!(buckets.iter().enumerate().all(|(b, range)| *range == (b..b + 1)));

        let bodies = pipeline.task_ranges(Stage::Integrate.domain());
        assert!(bodies.len() <= 3);
        assert_eq!(bodies.first().map(|r| r.start), Some(0));
        assert_eq!(bodies.last().map(|r| r.end), Some(10));
        assert!(bodies.windows(2).all(|pair| pair[0].end == pair[1].start));
    }

    #[test]
    fn test_reject_policy_fails_without_touching_store() {
        let config = SimConfig {
            max_buckets: 1,
            overflow_policy: OverflowPolicy::Reject,
            ..SimConfig::default()
        };
        let mut pipeline = Pipeline::new(config).unwrap();
        let mut store = BodyStore::new();
        store.insert(heavy([0.0, 0.0, 0.0]));
        store.insert(heavy([1000.0, 0.0, 0.0]));
        let before = bodies(&store);

        let result = pipeline.tick(&mut store, DT, &Viewpoint::default());
        assert!(matches!(
            result,
            Err(SimError::CapacityExceeded { kind: CapacityKind::Buckets, .. })
        ));
        assert_eq!(bodies(&store), before);
    }

    #[test]
    fn test_grow_policy_keeps_every_member() {
        let config = SimConfig { max_bucket_members: 1, ..SimConfig::default() };
        let mut pipeline = Pipeline::new(config).unwrap();
        let mut store = BodyStore::new();
        let light = |x: f64| Body::at_rest([x, 0.0, 0.0], 1.0).with_scale(scale_from_mass(1.0));
        let a = store.insert(light(0.0));
        let b = store.insert(light(0.9));

        let report = pipeline.tick(&mut store, DT, &Viewpoint::default()).unwrap();
        assert_eq!(report.buckets, 1);
        assert_eq!(report.overflows.len(), 1);
        assert_eq!(report.overflows[0].kind, CapacityKind::BucketMembers);
        assert!(report.merges.is_empty());
        assert!(store.get(a).unwrap().force[0] > 0.0);
        assert!(store.get(b).unwrap().force[0] < 0.0);
    }

    #[test]
    fn test_translation_is_relative_to_viewpoint() {
        let mut pipeline = Pipeline::new(SimConfig::default()).unwrap();
        let mut store = BodyStore::new();
        let handle = store.insert(Body::new([105.0, 0.0, -3.0], [2.0, 0.0, 0.0], 1.0));
        let viewpoint = Viewpoint::new([100.0, 1.0, 0.0]);

        pipeline.tick(&mut store, 0.5, &viewpoint).unwrap();
        let body = store.get(handle).unwrap();
        assert_eq!(body.position, [106.0, 0.0, -3.0]);
        assert_eq!(body.translation, [6.0, -1.0, -3.0]);
    }

    #[test]
    fn test_scale_follows_mass_every_frame() {
        let mut pipeline = Pipeline::new(SimConfig::default()).unwrap();
        let mut store = BodyStore::new();
        let handle = store.insert(Body::at_rest([0.0; 3], 50.0));
        assert_eq!(store.get(handle).unwrap().scale, nbody_core::DEFAULT_SCALE);

        pipeline.tick(&mut store, DT, &Viewpoint::default()).unwrap();
        assert_eq!(store.get(handle).unwrap().scale, scale_from_mass(50.0));
    }
}
