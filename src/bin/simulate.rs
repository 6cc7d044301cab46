//! Batch runs of seeded body clouds without the app loop.
//! Reports merges, survivors and mass drift for each run.

use nbody_core::{BodyStore, SimConfig, Viewpoint};
use nbody_physics::procgen;
use nbody_sim::Pipeline;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

const RUNS: u64 = 20;
const FRAMES: u32 = 300;
const DT: f32 = 1.0 / 60.0;

struct RunSummary {
    seed: u64,
    merges: usize,
    survivors: usize,
    largest: f32,
    drift: f64,
}

fn run(config: SimConfig) -> Result<RunSummary, nbody_core::SimError> {
    let seed = config.seed;
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut store: BodyStore = procgen::generate_cloud(&config, &mut rng).into_iter().collect();
    let mut pipeline = Pipeline::new(config)?;
    let initial = store.total_mass();
    let viewpoint = Viewpoint::default();

    let mut merges = 0;
    for _ in 0..FRAMES {
        merges += pipeline.tick(&mut store, DT, &viewpoint)?.merges.len();
    }

    let largest = store.iter().map(|(_, body)| body.mass).fold(0.0, f32::max);
    Ok(RunSummary {
        seed,
        merges,
        survivors: store.len(),
        largest,
        drift: (store.total_mass() - initial).abs() / initial.max(f64::MIN_POSITIVE),
    })
}

fn main() {
    eprintln!("Simulating {RUNS} clouds of {FRAMES} frames...");

    let mut summaries = Vec::new();
    for n in 0..RUNS {
        let seed = 1000 + n * 7919;
        let config = SimConfig {
            seed,
            spawn_extent: 40.0,
            initial_speed: 2.0,
            ..SimConfig::default()
        };
        match run(config) {
            Ok(summary) => summaries.push(summary),
            Err(err) => eprintln!("  run {n} (seed {seed}) failed: {err}"),
        }
        if (n + 1) % 5 == 0 {
            eprintln!("  {}/{RUNS} done", n + 1);
        }
    }

    println!("{:>8} {:>8} {:>10} {:>10} {:>12}", "seed", "merges", "survivors", "largest", "mass drift");
    for s in &summaries {
        println!(
            "{:>8} {:>8} {:>10} {:>10.1} {:>12.3e}",
            s.seed, s.merges, s.survivors, s.largest, s.drift
        );
    }

    if let Some(worst) = summaries.iter().map(|s| s.drift).reduce(f64::max) {
        println!("\nWorst mass drift: {worst:.3e}");
    }
}
