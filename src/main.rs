use bevy::app::ScheduleRunnerPlugin;
use bevy::log::LogPlugin;
use bevy::prelude::*;
use nbody_core::{BodyStore, SimConfig};
use nbody_physics::procgen;
use nbody_sim::{CameraFocus, NBodyWorld, SimulationPlugin};
use nbody_storage::{WorldSnapshot, save_snapshot};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_FRAMES: u64 = 600;
const STATUS_INTERVAL: u64 = 60;

/// When to stop and where to save
#[derive(Resource)]
struct RunLimits {
    frames: u64,
    output: PathBuf,
}

fn main() -> AppExit {
    let mut args = std::env::args().skip(1);
    let frames = args
        .next()
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(DEFAULT_FRAMES);
    let output = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("saves/world.bin"));

    let config = SimConfig::default();
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let store: BodyStore = procgen::generate_cloud(&config, &mut rng).into_iter().collect();
    let world = match NBodyWorld::new(config, store) {
        Ok(world) => world,
        Err(err) => {
            eprintln!("Invalid configuration: {err}");
            return AppExit::error();
        }
    };

    App::new()
        .add_plugins(
            MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(Duration::from_secs_f64(1.0 / 60.0))),
        )
        .add_plugins(LogPlugin::default())
        .insert_resource(world)
        .insert_resource(RunLimits { frames, output })
        .add_plugins(SimulationPlugin)
        .add_systems(PostUpdate, (report_status, finish_run).chain())
        .run()
}

fn report_status(world: Res<NBodyWorld>) {
    let frame = world.frame();
    if frame == 0 || frame % STATUS_INTERVAL != 0 {
        return;
    }
    info!(
        "Frame {frame}: {} bodies, total mass {:.1}, {:.2}s simulated",
        world.store.len(),
        world.store.total_mass(),
        world.elapsed
    );
}

/// Save a snapshot and exit once the frame budget is spent
fn finish_run(
    world: Res<NBodyWorld>,
    focus: Res<CameraFocus>,
    limits: Res<RunLimits>,
    mut exit: EventWriter<AppExit>,
) {
    if world.frame() < limits.frames {
        return;
    }

    let snapshot = WorldSnapshot::capture(
        world.frame(),
        world.elapsed,
        world.config(),
        focus.0,
        &world.store,
    );
    match save_snapshot(&snapshot, &limits.output) {
        Ok(()) => info!(
            "Saved {} bodies after {} frames to {}",
            snapshot.bodies.len(),
            snapshot.frame,
            limits.output.display()
        ),
        Err(err) => error!("Failed to save snapshot: {err}"),
    }
    exit.send(AppExit::Success);
}
