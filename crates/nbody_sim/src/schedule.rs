//! Explicit dependency graph between the stages of one frame.
//!
//! Every stage declares the frame data it reads and writes. A graph is only
//! accepted when it is acyclic and every pair of stages touching the same
//! data (at least one of them writing) is ordered by a path. The pipeline
//! runs stages in the resulting order; parallelism happens inside a stage.

use std::collections::BTreeSet;

/// Data a stage can touch during a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FrameData {
    Store,
    Positions,
    Velocities,
    Masses,
    Scales,
    Forces,
    Destroyed,
    CellSize,
    Buckets,
    Aggregates,
    DestroyQueue,
    RenderOutput,
}

/// How a stage spreads over the task pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    Serial,
    PerBucket,
    PerBody,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Snapshot,
    Bounds,
    Partition,
    Collision,
    Aggregate,
    Forces,
    Integrate,
    Scale,
    Commit,
    DestroySink,
}

impl Stage {
    pub const ALL: [Stage; 10] = [
        Stage::Snapshot,
        Stage::Bounds,
        Stage::Partition,
        Stage::Collision,
        Stage::Aggregate,
        Stage::Forces,
        Stage::Integrate,
        Stage::Scale,
        Stage::Commit,
        Stage::DestroySink,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Snapshot => "snapshot",
            Self::Bounds => "bounds",
            Self::Partition => "partition",
            Self::Collision => "collision",
            Self::Aggregate => "aggregate",
            Self::Forces => "forces",
            Self::Integrate => "integrate",
            Self::Scale => "scale",
            Self::Commit => "commit",
            Self::DestroySink => "destroy_sink",
        }
    }

    pub fn domain(&self) -> Domain {
        match self {
            Self::Collision | Self::Aggregate | Self::Forces => Domain::PerBucket,
            Self::Integrate | Self::Scale => Domain::PerBody,
            _ => Domain::Serial,
        }
    }

    pub fn reads(&self) -> &'static [FrameData] {
        use FrameData::*;
        match self {
            Self::Snapshot => &[Store],
            Self::Bounds => &[Positions],
            Self::Partition => &[Positions, CellSize],
            Self::Collision => &[Buckets, Positions, Scales, Masses, Destroyed],
            Self::Aggregate => &[Buckets, Masses, Destroyed],
            Self::Forces => &[Buckets, Aggregates, Positions, Masses, Destroyed],
            Self::Integrate => &[Positions, Velocities, Forces, Masses, Destroyed],
            Self::Scale => &[Masses, Destroyed],
            Self::Commit => &[
                Positions,
                Velocities,
                Masses,
                Scales,
                Forces,
                Destroyed,
                RenderOutput,
            ],
            Self::DestroySink => &[DestroyQueue],
        }
    }

    pub fn writes(&self) -> &'static [FrameData] {
        use FrameData::*;
        match self {
            Self::Snapshot => &[Positions, Velocities, Masses, Scales, Forces, Destroyed],
            Self::Bounds => &[CellSize],
            Self::Partition => &[Buckets],
            Self::Collision => &[Masses, Destroyed, DestroyQueue],
            Self::Aggregate => &[Aggregates],
            Self::Forces => &[Forces],
            Self::Integrate => &[Positions, Velocities, RenderOutput],
            Self::Scale => &[Scales],
            Self::Commit => &[Store],
            Self::DestroySink => &[Store, DestroyQueue],
        }
    }

    /// Data both stages touch where at least one of them writes
    pub fn conflicts(&self, other: &Stage) -> Vec<FrameData> {
        let mine_w: BTreeSet<_> = self.writes().iter().copied().collect();
        let theirs_w: BTreeSet<_> = other.writes().iter().copied().collect();
        let mine: BTreeSet<_> = self.reads().iter().copied().chain(mine_w.iter().copied()).collect();
        let theirs: BTreeSet<_> = other.reads().iter().copied().chain(theirs_w.iter().copied()).collect();

        mine_w
            .intersection(&theirs)
            .chain(theirs_w.intersection(&mine))
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("dependency cycle through {0:?}")]
    Cycle(Vec<Stage>),
    #[error("{first:?} and {second:?} both touch {data:?} but are not ordered")]
    Unordered {
        first: Stage,
        second: Stage,
        data: FrameData,
    },
}

/// Declared `before -> after` edges between stages
#[derive(Debug, Clone, Default)]
pub struct StageGraph {
    edges: BTreeSet<(Stage, Stage)>,
}

impl StageGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// The per-frame pipeline. Integrate and Scale are independent of each
    /// other and join again at Commit.
    pub fn standard() -> Self {
        let mut graph = Self::new();
        graph
            .depend(Stage::Snapshot, Stage::Bounds)
            .depend(Stage::Bounds, Stage::Partition)
            .depend(Stage::Partition, Stage::Collision)
            .depend(Stage::Collision, Stage::Aggregate)
            .depend(Stage::Aggregate, Stage::Forces)
            .depend(Stage::Forces, Stage::Integrate)
            .depend(Stage::Forces, Stage::Scale)
            .depend(Stage::Integrate, Stage::Commit)
            .depend(Stage::Scale, Stage::Commit)
            .depend(Stage::Commit, Stage::DestroySink);
        graph
    }

    pub fn depend(&mut self, before: Stage, after: Stage) -> &mut Self {
        self.edges.insert((before, after));
        self
    }

    /// Whether `before` must complete before `after` starts
    pub fn precedes(&self, before: Stage, after: Stage) -> bool {
        let mut stack = vec![before];
        let mut seen = BTreeSet::new();
        while let Some(stage) = stack.pop() {
            for &(from, to) in &self.edges {
                if from != stage {
                    continue;
                }
                if to == after {
                    return true;
                }
                if seen.insert(to) {
                    stack.push(to);
                }
            }
        }
        false
    }

    /// Topological order of all stages. Ties break on declaration order of
    /// [`Stage::ALL`] so the order is stable.
    pub fn order(&self) -> Result<Vec<Stage>, ScheduleError> {
        let mut remaining: BTreeSet<Stage> = Stage::ALL.into_iter().collect();
        let mut order = Vec::with_capacity(Stage::ALL.len());

        while !remaining.is_empty() {
            let ready = remaining.iter().copied().find(|stage| {
                !self
                    .edges
                    .iter()
                    .any(|(from, to)| to == stage && remaining.contains(from))
            });
            match ready {
                Some(stage) => {
                    remaining.remove(&stage);
                    order.push(stage);
                }
                None => return Err(ScheduleError::Cycle(remaining.into_iter().collect())),
            }
        }
        Ok(order)
    }

    /// Order the stages and check that every data conflict is ordered
    pub fn validate(&self) -> Result<Vec<Stage>, ScheduleError> {
        let order = self.order()?;
        for (i, first) in Stage::ALL.iter().enumerate() {
            for second in &Stage::ALL[i + 1..] {
                let conflicts = first.conflicts(second);
                if let Some(&data) = conflicts.first() {
                    if !self.precedes(*first, *second) && !self.precedes(*second, *first) {
                        return Err(ScheduleError::Unordered {
                            first: *first,
                            second: *second,
                            data,
                        });
                    }
                }
            }
        }
        Ok(order)
    }
}
