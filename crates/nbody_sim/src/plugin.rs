use bevy::prelude::*;
use nbody_core::{BodyStore, RenderInstance, SimConfig, SimError, Viewpoint};

use crate::pipeline::{FrameReport, Pipeline};

/// The simulated bodies and the pipeline that advances them, tracked as a
/// Bevy Resource
#[derive(Resource)]
pub struct NBodyWorld {
    pub store: BodyStore,
    pipeline: Pipeline,
    /// Report of the most recent completed frame
    pub last_report: Option<FrameReport>,
    /// Per-body draw data, refreshed after every frame
    pub instances: Vec<RenderInstance>,
    /// Simulated seconds so far
    pub elapsed: f64,
    /// Whether simulation is paused
    pub paused: bool,
    /// Time scale multiplier (1.0 = real time)
    pub time_scale: f32,
}

impl NBodyWorld {
    /// World with no bodies yet
    pub fn empty(config: SimConfig) -> Result<Self, SimError> {
        Self::new(config, BodyStore::new())
    }

    pub fn new(config: SimConfig, store: BodyStore) -> Result<Self, SimError> {
        let instances = store.render_instances();
        Ok(Self {
            store,
            pipeline: Pipeline::new(config)?,
            last_report: None,
            instances,
            elapsed: 0.0,
            paused: false,
            time_scale: 1.0,
        })
    }

    pub fn config(&self) -> &SimConfig {
        self.pipeline.config()
    }

    pub fn frame(&self) -> u64 {
        self.pipeline.frame()
    }

    /// Advance the world by one frame of `dt` real seconds
    pub fn tick(&mut self, dt: f32, viewpoint: &Viewpoint) -> Result<(), SimError> {
        if self.paused {
            return Ok(());
        }

        let dt = dt * self.time_scale;
        let report = self.pipeline.tick(&mut self.store, dt, viewpoint)?;
        self.elapsed += dt as f64;
        self.instances = self.store.render_instances();

        if !report.merges.is_empty() {
            info!(
                "Frame {}: {} merges, {} bodies remain",
                report.frame,
                report.merges.len(),
                self.store.len()
            );
        }
        self.last_report = Some(report);
        Ok(())
    }
}

/// Point the render side is centered on
#[derive(Resource, Debug, Clone, Copy, Default)]
pub struct CameraFocus(pub Viewpoint);

/// Bevy plugin for the simulation pipeline
pub struct SimulationPlugin;

impl Plugin for SimulationPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<CameraFocus>();
        if !app.world().contains_resource::<NBodyWorld>() {
            match NBodyWorld::empty(SimConfig::default()) {
                Ok(world) => {
                    app.insert_resource(world);
                }
                Err(err) => error!("Failed to create simulation world: {err}"),
            }
        }
        app.add_systems(Update, simulation_tick.run_if(resource_exists::<NBodyWorld>));
    }
}

/// Advance the world by the frame delta. A failed frame leaves the store
/// as it was and is retried next frame.
fn simulation_tick(mut world: ResMut<NBodyWorld>, time: Res<Time>, focus: Res<CameraFocus>) {
    if let Err(err) = world.tick(time.delta_secs(), &focus.0) {
        warn!("Simulation frame failed: {err}");
    }
}
