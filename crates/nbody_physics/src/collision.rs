use bevy::math::DVec3;

use crate::snapshot::Snapshot;

/// One body merged into another
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Absorption {
    pub survivor: usize,
    pub absorbed: usize,
    /// Mass the absorbed body carried into the survivor
    pub mass: f32,
}

/// Result of resolving one bucket, applied to the snapshot after every
/// bucket task has finished
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollisionOutcome {
    pub bucket: usize,
    /// Final mass of each member that absorbed at least one body
    pub masses: Vec<(usize, f32)>,
    pub absorptions: Vec<Absorption>,
}

impl CollisionOutcome {
    pub fn apply(&self, snapshot: &mut Snapshot) {
        for &(index, mass) in &self.masses {
            snapshot.masses[index] = mass;
        }
        for absorption in &self.absorptions {
            snapshot.destroyed[absorption.absorbed] = true;
        }
    }
}

/// Contact test: squared distance below the sum of the squared radii.
/// This is deliberately not the squared sum of the radii.
pub fn overlaps(a: DVec3, scale_a: f32, b: DVec3, scale_b: f32) -> bool {
    let ra = scale_a as f64 * 0.5;
    let rb = scale_b as f64 * 0.5;
    a.distance_squared(b) < ra * ra + rb * rb
}

/// Merge overlapping bodies within one bucket.
///
/// For every live member `j`, every other live member `i` with
/// `mass[i] <= mass[j]` that overlaps `j` is absorbed into `j`. Members are
/// visited in bucket order, so between equal masses the earlier member
/// survives. Bodies in other buckets are never considered, even when they
/// overlap.
pub fn resolve_bucket(bucket: usize, members: &[usize], snapshot: &Snapshot) -> CollisionOutcome {
    let mut masses: Vec<f32> = members.iter().map(|&i| snapshot.masses[i]).collect();
    let mut destroyed: Vec<bool> = members.iter().map(|&i| snapshot.destroyed[i]).collect();
    let mut grew = vec![false; members.len()];
    let mut absorptions = Vec::new();

    for j in 0..members.len() {
        if destroyed[j] {
            continue;
        }
        let my_position = snapshot.positions[members[j]];
        let my_scale = snapshot.scales[members[j]];
        for i in 0..members.len() {
            if i == j || destroyed[i] || masses[i] > masses[j] {
                continue;
            }
            let their_position = snapshot.positions[members[i]];
            let their_scale = snapshot.scales[members[i]];
            if overlaps(my_position, my_scale, their_position, their_scale) {
                absorptions.push(Absorption {
                    survivor: members[j],
                    absorbed: members[i],
                    mass: masses[i],
                });
                masses[j] += masses[i];
                destroyed[i] = true;
                grew[j] = true;
            }
        }
    }

    let masses = members
        .iter()
        .zip(masses)
        .zip(grew)
        .filter(|(_, grew)| *grew)
        .map(|((&index, mass), _)| (index, mass))
        .collect();

    CollisionOutcome {
        bucket,
        masses,
        absorptions,
    }
}
