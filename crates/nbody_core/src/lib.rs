pub mod config;
pub mod constants;
pub mod error;
pub mod store;
pub mod types;

pub use config::{OverflowPolicy, SimConfig};
pub use constants::*;
pub use error::{CapacityKind, SimError};
pub use store::BodyStore;
pub use types::*;
