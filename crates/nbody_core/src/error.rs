use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::BodyHandle;

/// Which partition capacity was exceeded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CapacityKind {
    Buckets,
    BucketMembers,
}

impl fmt::Display for CapacityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buckets => write!(f, "bucket table"),
            Self::BucketMembers => write!(f, "bucket member"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("time step must be finite and non-negative, got {0}")]
    InvalidTimeStep(f32),
    #[error("{kind} capacity exceeded: {requested} > {limit}")]
    CapacityExceeded {
        kind: CapacityKind,
        limit: usize,
        requested: usize,
    },
    #[error("stale body handle {0}")]
    StaleHandle(BodyHandle),
    #[error("invalid stage schedule: {0}")]
    InvalidSchedule(String),
}
