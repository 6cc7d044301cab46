pub mod pipeline;
pub mod plugin;
pub mod schedule;

pub use pipeline::{FrameReport, Merge, Pipeline};
pub use plugin::{CameraFocus, NBodyWorld, SimulationPlugin};
pub use schedule::{Domain, FrameData, Stage, StageGraph};
