use bevy::math::{DVec3, Vec3};
use nbody_core::{Body, BodyHandle, BodyStore};

/// Flat per-frame copy of the bodies the pipeline works on.
/// All vectors are index-aligned with `handles`.
#[derive(Debug, Default)]
pub struct Snapshot {
    pub handles: Vec<BodyHandle>,
    pub positions: Vec<DVec3>,
    pub velocities: Vec<Vec3>,
    pub masses: Vec<f32>,
    pub scales: Vec<f32>,
    pub forces: Vec<Vec3>,
    pub destroyed: Vec<bool>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty every buffer, keeping allocations for the next frame
    pub fn clear(&mut self) {
        self.handles.clear();
        self.positions.clear();
        self.velocities.clear();
        self.masses.clear();
        self.scales.clear();
        self.forces.clear();
        self.destroyed.clear();
    }

    /// Refill from the store. Bodies that cannot be simulated (non-finite
    /// position or mass, non-positive mass) are skipped and returned.
    pub fn extract(&mut self, store: &BodyStore) -> Vec<BodyHandle> {
        self.clear();
        let mut rejected = Vec::new();
        for (handle, body) in store.iter() {
            if body.is_simulable() {
                self.push(handle, body);
            } else {
                rejected.push(handle);
            }
        }
        rejected
    }

    pub fn push(&mut self, handle: BodyHandle, body: &Body) {
        self.handles.push(handle);
        self.positions.push(DVec3::from_array(body.position));
        self.velocities.push(Vec3::from_array(body.velocity));
        self.masses.push(body.mass);
        self.scales.push(body.scale);
        self.forces.push(Vec3::from_array(body.force));
        self.destroyed.push(false);
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn is_live(&self, index: usize) -> bool {
        !self.destroyed[index]
    }

    /// Sum of the masses not flagged destroyed
    pub fn live_mass(&self) -> f64 {
        self.masses
            .iter()
            .zip(&self.destroyed)
            .filter(|(_, destroyed)| !**destroyed)
            .map(|(mass, _)| *mass as f64)
            .sum()
    }
}
