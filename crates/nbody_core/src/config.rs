use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::SimError;

/// What the partitioner does when a capacity limit is exceeded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OverflowPolicy {
    /// Grow past the limit and report a degraded-accuracy overflow
    #[default]
    Grow,
    /// Fail the tick before any body is touched
    Reject,
}

/// Simulation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    /// Number of bodies produced by scenario generation
    pub body_count: u32,
    /// Random seed for deterministic scenario generation
    pub seed: u64,
    /// Bodies spawn uniformly inside [-spawn_extent, spawn_extent]^3
    pub spawn_extent: f64,
    /// Mass of each spawned body
    pub body_mass: f32,
    /// Spawned velocity components are drawn from [-initial_speed, initial_speed]
    pub initial_speed: f32,
    /// Partition granularity: cell size = bounds diagonal / cell_divisor
    pub cell_divisor: f64,
    /// Lower clamp on the cell size
    pub min_cell_size: f64,
    /// Softening term added to the squared distance in the force law
    pub softening: f64,
    /// Floor on the distance used to normalize the force direction
    pub min_separation: f64,
    /// Bucket table capacity
    pub max_buckets: usize,
    /// Member capacity of a single bucket
    pub max_bucket_members: usize,
    /// Behaviour when either capacity is exceeded
    pub overflow_policy: OverflowPolicy,
    /// Worker threads for the frame task pool (None = available parallelism)
    pub worker_threads: Option<usize>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            body_count: INITIAL_BODY_COUNT,
            seed: 42,
            spawn_extent: SPAWN_EXTENT,
            body_mass: DEFAULT_BODY_MASS,
            initial_speed: 0.0,
            cell_divisor: CELL_DIVISOR,
            min_cell_size: MIN_CELL_SIZE,
            softening: SOFTENING,
            min_separation: MIN_SEPARATION,
            max_buckets: MAX_BUCKETS,
            max_bucket_members: MAX_BUCKET_MEMBERS,
            overflow_policy: OverflowPolicy::Grow,
            worker_threads: None,
        }
    }
}

impl SimConfig {
    /// Check that every tunable is usable by the pipeline
    pub fn validate(&self) -> Result<(), SimError> {
        let positive = [
            ("cell_divisor", self.cell_divisor),
            ("min_cell_size", self.min_cell_size),
            ("softening", self.softening),
            ("min_separation", self.min_separation),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(SimError::InvalidConfig(format!(
                    "{name} must be finite and positive, got {value}"
                )));
            }
        }
        if self.cell_divisor > MAX_CELL_DIVISOR {
            return Err(SimError::InvalidConfig(format!(
                "cell_divisor must be at most {MAX_CELL_DIVISOR}, got {}",
                self.cell_divisor
            )));
        }
        if self.max_buckets == 0 {
            return Err(SimError::InvalidConfig("max_buckets must be at least 1".into()));
        }
        if self.max_bucket_members == 0 {
            return Err(SimError::InvalidConfig(
                "max_bucket_members must be at least 1".into(),
            ));
        }
        if self.worker_threads == Some(0) {
            return Err(SimError::InvalidConfig("worker_threads must be at least 1".into()));
        }
        if !self.spawn_extent.is_finite() || self.spawn_extent < 0.0 {
            return Err(SimError::InvalidConfig(format!(
                "spawn_extent must be finite and non-negative, got {}",
                self.spawn_extent
            )));
        }
        if !self.body_mass.is_finite() || self.body_mass <= 0.0 {
            return Err(SimError::InvalidConfig(format!(
                "body_mass must be finite and positive, got {}",
                self.body_mass
            )));
        }
        if !self.initial_speed.is_finite() || self.initial_speed < 0.0 {
            return Err(SimError::InvalidConfig(format!(
                "initial_speed must be finite and non-negative, got {}",
                self.initial_speed
            )));
        }
        Ok(())
    }
}
