use nbody_core::{Body, BodyStore, SimConfig, Viewpoint};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Encoding error: {0}")]
    Bincode(#[from] bincode::Error),
}

/// Complete world snapshot for save/load
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    /// Frames completed when the snapshot was taken
    pub frame: u64,
    /// Simulated seconds so far
    pub elapsed: f64,
    pub config: SimConfig,
    pub viewpoint: Viewpoint,
    /// Live bodies in store iteration order. Handles are not saved.
    pub bodies: Vec<Body>,
}

impl WorldSnapshot {
    pub fn capture(
        frame: u64,
        elapsed: f64,
        config: &SimConfig,
        viewpoint: Viewpoint,
        store: &BodyStore,
    ) -> Self {
        Self {
            frame,
            elapsed,
            config: config.clone(),
            viewpoint,
            bodies: store.iter().map(|(_, body)| *body).collect(),
        }
    }

    /// Rebuild a store from the saved bodies. Handles are issued afresh.
    pub fn into_store(self) -> BodyStore {
        let mut store = BodyStore::with_capacity(self.bodies.len());
        for body in self.bodies {
            store.insert(body);
        }
        store
    }

    pub fn total_mass(&self) -> f64 {
        self.bodies.iter().map(|b| b.mass as f64).sum()
    }
}

/// Save a snapshot to disk as bincode
pub fn save_snapshot(snapshot: &WorldSnapshot, path: &Path) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let data = bincode::serialize(snapshot)?;
    fs::write(path, data)?;
    Ok(())
}

/// Load a snapshot from disk
pub fn load_snapshot(path: &Path) -> Result<WorldSnapshot, StorageError> {
    let data = fs::read(path)?;
    Ok(bincode::deserialize(&data)?)
}
