use std::fmt;

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_SCALE;

/// Stable identity of a body in the [`BodyStore`](crate::BodyStore).
/// The generation changes whenever the slot is freed, so a handle to a
/// removed body never resolves to whatever reuses the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BodyHandle {
    index: u32,
    generation: u32,
}

impl BodyHandle {
    pub fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn index(&self) -> usize {
        self.index as usize
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for BodyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// A simulated point mass
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Body {
    /// World position. Double precision: extents are large while per-frame
    /// displacements are small.
    pub position: [f64; 3],
    pub velocity: [f32; 3],
    /// Always > 0 for a body the pipeline accepts
    pub mass: f32,
    /// Display radius, derived from mass every tick
    pub scale: f32,
    /// Net force from the most recent force evaluation
    pub force: [f32; 3],
    /// Position relative to the viewpoint of the most recent tick
    pub translation: [f32; 3],
}

impl Body {
    pub fn new(position: [f64; 3], velocity: [f32; 3], mass: f32) -> Self {
        Self {
            position,
            velocity,
            mass,
            scale: DEFAULT_SCALE,
            force: [0.0; 3],
            translation: [0.0; 3],
        }
    }

    pub fn at_rest(position: [f64; 3], mass: f32) -> Self {
        Self::new(position, [0.0; 3], mass)
    }

    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }

    /// Whether the pipeline can accept this body: finite position and
    /// velocity and a finite, strictly positive mass
    pub fn is_simulable(&self) -> bool {
        self.mass.is_finite()
            && self.mass > 0.0
            && self.position.iter().all(|c| c.is_finite())
            && self.velocity.iter().all(|v| v.is_finite())
    }

    pub fn render_instance(&self) -> RenderInstance {
        RenderInstance {
            translation: self.translation,
            scale: self.scale,
        }
    }
}

/// Per-body data handed to a renderer.
/// Must be repr(C) and Pod for buffer upload
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct RenderInstance {
    /// Position relative to the viewpoint
    pub translation: [f32; 3],
    pub scale: f32,
}

/// Where the observer is looking. Only used to recenter render positions,
/// never feeds back into physics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Viewpoint {
    pub look_at: [f64; 3],
}

impl Viewpoint {
    pub fn new(look_at: [f64; 3]) -> Self {
        Self { look_at }
    }
}
