use nbody_core::{Body, SimConfig};
use rand::Rng;

use crate::integrator::scale_from_mass;

/// Uniform cloud of equal-mass bodies filling the spawn cube
pub fn generate_cloud(config: &SimConfig, rng: &mut impl Rng) -> Vec<Body> {
    let extent = config.spawn_extent;
    let speed = config.initial_speed;
    let scale = scale_from_mass(config.body_mass);

    (0..config.body_count)
        .map(|_| {
            let position = [
                sample(rng, extent),
                sample(rng, extent),
                sample(rng, extent),
            ];
            let velocity = [
                sample(rng, speed as f64) as f32,
                sample(rng, speed as f64) as f32,
                sample(rng, speed as f64) as f32,
            ];
            Body::new(position, velocity, config.body_mass).with_scale(scale)
        })
        .collect()
}

fn sample(rng: &mut impl Rng, half_width: f64) -> f64 {
    if half_width > 0.0 {
        rng.gen_range(-half_width..=half_width)
    } else {
        0.0
    }
}

/// Four resting bodies of mass 100: a pair on the x axis and two more
/// offset along z
pub fn test_bed() -> Vec<Body> {
    let scale = scale_from_mass(100.0);
    [
        [10.0, 0.0, 0.0],
        [-10.0, 0.0, 0.0],
        [-10.0, 0.0, -10.0],
        [-10.0, 0.0, 20.0],
    ]
    .into_iter()
    .map(|position| Body::at_rest(position, 100.0).with_scale(scale))
    .collect()
}
