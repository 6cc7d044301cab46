pub mod aggregate;
pub mod bounds;
pub mod collision;
pub mod forces;
pub mod integrator;
pub mod partition;
pub mod procgen;
pub mod snapshot;

pub use bounds::{Bounds, Grid};
pub use partition::{Bucket, BucketTable, CapacityOverflow};
pub use snapshot::Snapshot;
