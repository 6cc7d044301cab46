use bevy::math::{DVec3, Vec3};
use nbody_core::constants::SCALE_VOLUME_DIVISOR;

/// Semi-implicit Euler: velocity first, then position from the new velocity
pub fn integrate(position: DVec3, velocity: Vec3, force: Vec3, mass: f32, dt: f32) -> (DVec3, Vec3) {
    let velocity = velocity + dt * force / mass;
    let position = position + (dt * velocity).as_dvec3();
    (position, velocity)
}

/// Render-facing position relative to the viewpoint
pub fn recenter(position: DVec3, look_at: DVec3) -> Vec3 {
    (position - look_at).as_vec3()
}

/// Display radius from mass. The volume divisor of 4 is a stylized
/// constant, not the inverse of 4/3 pi r^3.
pub fn scale_from_mass(mass: f32) -> f32 {
    let volume = mass / SCALE_VOLUME_DIVISOR;
    (volume * 0.75 / std::f32::consts::PI).cbrt()
}
