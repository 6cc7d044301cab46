// Simulation units are arbitrary: positions in world units, masses in body
// units, time in seconds of frame delta. The force law carries no G term.

/// Additive term in the force denominator, keeps close encounters finite
pub const SOFTENING: f64 = 10.0;

/// Floor for the separation used to normalize the force direction.
/// Coincident bodies have a zero distance that softening does not cover.
pub const MIN_SEPARATION: f64 = 1e-6;

/// Bounds diagonal is divided by this to get the partition cell size
pub const CELL_DIVISOR: f64 = 15.0;

/// Largest accepted divisor. Grid coordinates along an axis never exceed
/// the divisor, so this keeps them far inside `i32`.
pub const MAX_CELL_DIVISOR: f64 = 1.0e6;

/// Smallest cell size the partitioner will use (degenerate bounds)
pub const MIN_CELL_SIZE: f64 = 1.0;

/// Bucket table capacity before the overflow policy applies
pub const MAX_BUCKETS: usize = 4096;

/// Members per bucket before the overflow policy applies
pub const MAX_BUCKET_MEMBERS: usize = 512;

/// Stylized mass -> volume divisor used by the scale mapping.
/// Not the true sphere inverse; kept for consistent visual scale.
pub const SCALE_VOLUME_DIVISOR: f32 = 4.0;

/// Scale given to freshly created bodies until the first tick recomputes it
pub const DEFAULT_SCALE: f32 = 1.0;

/// Number of bodies in the default spawn cloud
pub const INITIAL_BODY_COUNT: u32 = 100;

/// Mass of each body in the default spawn cloud
pub const DEFAULT_BODY_MASS: f32 = 100.0;

/// Half-width of the default spawn cube
pub const SPAWN_EXTENT: f64 = 100.0;
