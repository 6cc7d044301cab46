use bevy::math::{DVec3, IVec3};

/// Axis-aligned box around a set of positions
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: DVec3,
    pub max: DVec3,
}

impl Bounds {
    pub fn from_positions(positions: &[DVec3]) -> Option<Self> {
        let first = *positions.first()?;
        let (min, max) = positions
            .iter()
            .fold((first, first), |(min, max), p| (min.min(*p), max.max(*p)));
        Some(Self { min, max })
    }

    pub fn diagonal(&self) -> f64 {
        self.min.distance(self.max)
    }
}

/// Partition grid for one frame.
///
/// Anchored at the minimum corner of the frame's bounds, so cell
/// coordinates stay small wherever the bodies sit in world space: along each
/// axis they run from 0 to at most the cell divisor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grid {
    pub origin: DVec3,
    pub cell_size: f64,
}

impl Default for Grid {
    fn default() -> Self {
        Self::new(DVec3::ZERO, 1.0)
    }
}

impl Grid {
    pub fn new(origin: DVec3, cell_size: f64) -> Self {
        Self { origin, cell_size }
    }

    /// Grid over `positions`: cell size is the bounds diagonal over
    /// `divisor`, clamped to `min_cell_size` so degenerate bounds (empty, one
    /// body, all coincident) still give a usable grid.
    pub fn fit(positions: &[DVec3], divisor: f64, min_cell_size: f64) -> Self {
        let bounds = Bounds::from_positions(positions);
        let extent = bounds.map_or(0.0, |b| b.diagonal());
        Self {
            origin: bounds.map_or(DVec3::ZERO, |b| b.min),
            cell_size: (extent / divisor).max(min_cell_size),
        }
    }

    /// Cell containing `position`
    pub fn cell(&self, position: DVec3) -> IVec3 {
        ((position - self.origin) / self.cell_size).floor().as_ivec3()
    }

    /// Geometric center of `cell`
    pub fn center(&self, cell: IVec3) -> DVec3 {
        self.origin + (cell.as_dvec3() + DVec3::splat(0.5)) * self.cell_size
    }
}
