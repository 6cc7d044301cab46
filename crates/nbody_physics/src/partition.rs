use std::collections::HashMap;

use bevy::math::{DVec3, IVec3};
use nbody_core::{CapacityKind, OverflowPolicy, SimConfig, SimError};

use crate::bounds::Grid;

/// One spatial cell's worth of bodies for the current frame.
/// Only allocated buckets are stored; a bucket never outlives its frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    /// Integer coordinate on the frame's [`Grid`]
    pub cell: IVec3,
    /// Geometric center of the cell, the far-field anchor
    pub center: DVec3,
    /// Sum of live member masses after collision resolution
    pub aggregate_mass: f64,
    /// Start of this bucket's members in the shared index array
    pub offset: usize,
    pub count: usize,
}

/// A capacity limit that was exceeded under [`OverflowPolicy::Grow`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityOverflow {
    pub kind: CapacityKind,
    pub limit: usize,
    pub requested: usize,
    /// Offending cell for member overflows
    pub cell: Option<IVec3>,
}

/// Bucket arena rebuilt from scratch every frame.
///
/// Members of every bucket live contiguously in one shared index array, in
/// ascending body index order. After [`BucketTable::rebuild`] the table is
/// read-only for the rest of the frame except for the aggregate masses.
#[derive(Debug, Default)]
pub struct BucketTable {
    buckets: Vec<Bucket>,
    indices: Vec<usize>,
    lookup: HashMap<IVec3, usize>,
    membership: Vec<usize>,
    overflows: Vec<CapacityOverflow>,
    grid: Grid,
}

impl BucketTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(max_buckets: usize, bodies: usize) -> Self {
        Self {
            buckets: Vec::with_capacity(max_buckets),
            indices: Vec::with_capacity(bodies),
            lookup: HashMap::with_capacity(max_buckets),
            membership: Vec::with_capacity(bodies),
            overflows: Vec::new(),
            grid: Grid::default(),
        }
    }

    /// Drop every bucket, keeping allocations
    pub fn clear(&mut self) {
        self.buckets.clear();
        self.indices.clear();
        self.lookup.clear();
        self.membership.clear();
        self.overflows.clear();
    }

    /// Partition every position into grid buckets.
    ///
    /// Counting pass, prefix sum over counts, then an insertion pass writing
    /// each body at `offset + count`. Nothing is ever dropped: limits from
    /// `config` are either exceeded and reported (`Grow`) or the whole
    /// partition is abandoned with an error (`Reject`).
    pub fn rebuild(
        &mut self,
        positions: &[DVec3],
        grid: &Grid,
        config: &SimConfig,
    ) -> Result<(), SimError> {
        self.clear();
        self.grid = *grid;

        for &position in positions {
            let cell = grid.cell(position);
            let bucket = match self.lookup.get(&cell) {
                Some(&bucket) => bucket,
                None => {
                    let bucket = self.buckets.len();
                    self.buckets.push(Bucket {
                        cell,
                        center: grid.center(cell),
                        aggregate_mass: 0.0,
                        offset: 0,
                        count: 0,
                    });
                    self.lookup.insert(cell, bucket);
                    bucket
                }
            };
            self.buckets[bucket].count += 1;
            self.membership.push(bucket);
        }

        if let Err(err) = self.check_capacity(config) {
            self.clear();
            return Err(err);
        }

        let mut offset = 0;
        for bucket in &mut self.buckets {
            bucket.offset = offset;
            offset += bucket.count;
            bucket.count = 0;
        }

        self.indices.resize(positions.len(), 0);
        for (body, &bucket) in self.membership.iter().enumerate() {
            let bucket = &mut self.buckets[bucket];
            self.indices[bucket.offset + bucket.count] = body;
            bucket.count += 1;
        }

        Ok(())
    }

    fn check_capacity(&mut self, config: &SimConfig) -> Result<(), SimError> {
        let mut exceeded = Vec::new();
        if self.buckets.len() > config.max_buckets {
            exceeded.push(CapacityOverflow {
                kind: CapacityKind::Buckets,
                limit: config.max_buckets,
                requested: self.buckets.len(),
                cell: None,
            });
        }
        exceeded.extend(
            self.buckets
                .iter()
                .filter(|bucket| bucket.count > config.max_bucket_members)
                .map(|bucket| CapacityOverflow {
                    kind: CapacityKind::BucketMembers,
                    limit: config.max_bucket_members,
                    requested: bucket.count,
                    cell: Some(bucket.cell),
                }),
        );

        if config.overflow_policy == OverflowPolicy::Reject {
            if let Some(overflow) = exceeded.first() {
                return Err(SimError::CapacityExceeded {
                    kind: overflow.kind,
                    limit: overflow.limit,
                    requested: overflow.requested,
                });
            }
        }
        self.overflows = exceeded;
        Ok(())
    }

    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    pub fn bucket(&self, index: usize) -> &Bucket {
        &self.buckets[index]
    }

    /// Body indices belonging to bucket `index`
    pub fn members(&self, index: usize) -> &[usize] {
        let bucket = &self.buckets[index];
        &self.indices[bucket.offset..bucket.offset + bucket.count]
    }

    pub fn bucket_of_cell(&self, cell: IVec3) -> Option<usize> {
        self.lookup.get(&cell).copied()
    }

    pub fn set_aggregate_mass(&mut self, index: usize, mass: f64) {
        self.buckets[index].aggregate_mass = mass;
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Grid of the last rebuild
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Limits exceeded during the last rebuild
    pub fn overflows(&self) -> &[CapacityOverflow] {
        &self.overflows
    }
}
