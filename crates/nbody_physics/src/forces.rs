use bevy::math::{DVec3, Vec3};
use nbody_core::constants::{MIN_SEPARATION, SOFTENING};
use nbody_core::SimConfig;

use crate::partition::BucketTable;
use crate::snapshot::Snapshot;

/// Softened attraction between point masses
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForceLaw {
    pub softening: f64,
    pub min_separation: f64,
}

impl Default for ForceLaw {
    fn default() -> Self {
        Self {
            softening: SOFTENING,
            min_separation: MIN_SEPARATION,
        }
    }
}

impl ForceLaw {
    pub fn from_config(config: &SimConfig) -> Self {
        Self {
            softening: config.softening,
            min_separation: config.min_separation,
        }
    }

    /// Force on the body at `at` from a mass at `other`:
    /// `m1 * m2 / (d^2 + softening) * delta / max(d, min_separation)`
    pub fn pairwise(&self, at: DVec3, mass: f64, other: DVec3, other_mass: f64) -> DVec3 {
        let delta = other - at;
        let dist_sq = delta.length_squared();
        let f = (mass * other_mass) / (dist_sq + self.softening);
        f * delta / dist_sq.sqrt().max(self.min_separation)
    }
}

/// Forces for the live members of one bucket
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForceOutcome {
    pub bucket: usize,
    pub forces: Vec<(usize, Vec3)>,
}

/// Near field: exact pairwise terms from live co-members.
/// Far field: one point-mass term per other bucket, its aggregate mass
/// placed at its cell center. Cost per body is members + buckets.
pub fn evaluate_bucket(
    bucket: usize,
    table: &BucketTable,
    snapshot: &Snapshot,
    law: &ForceLaw,
) -> ForceOutcome {
    let members = table.members(bucket);
    let mut forces = Vec::with_capacity(members.len());

    for &j in members {
        if !snapshot.is_live(j) {
            continue;
        }
        let position = snapshot.positions[j];
        let mass = snapshot.masses[j] as f64;
        let mut force = DVec3::ZERO;

        for &i in members {
            if i != j && snapshot.is_live(i) {
                force += law.pairwise(position, mass, snapshot.positions[i], snapshot.masses[i] as f64);
            }
        }

        for (k, other) in table.buckets().iter().enumerate() {
            if k != bucket && other.aggregate_mass > 0.0 {
                force += law.pairwise(position, mass, other.center, other.aggregate_mass);
            }
        }

        forces.push((j, force.as_vec3()));
    }

    ForceOutcome { bucket, forces }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate_mass;
    use crate::bounds::Grid;
    use nbody_core::{Body, BodyStore};

    fn prepared(bodies: &[Body], cell_size: f64) -> (Snapshot, BucketTable) {
        prepared_on(bodies, |_| Grid::new(DVec3::ZERO, cell_size))
    }

    fn prepared_on(bodies: &[Body], grid: impl Fn(&[DVec3]) -> Grid) -> (Snapshot, BucketTable) {
        let store: BodyStore = bodies.iter().copied().collect();
        let mut snapshot = Snapshot::new();
        snapshot.extract(&store);
        let mut table = BucketTable::new();
        table
            .rebuild(&snapshot.positions, &grid(&snapshot.positions), &SimConfig::default())
            .unwrap();
        for b in 0..table.len() {
            let mass = aggregate_mass(table.members(b), &snapshot);
            table.set_aggregate_mass(b, mass);
        }
        (snapshot, table)
    }

    #[test]
    fn test_pairwise_symmetry() {
        let law = ForceLaw::default();
        let a = DVec3::new(0.0, 0.0, 0.0);
        let b = DVec3::new(3.0, 4.0, 0.0);
        let on_a = law.pairwise(a, 2.0, b, 5.0);
        let on_b = law.pairwise(b, 5.0, a, 2.0);
        assert!((on_a + on_b).length() < 1e-12);
        // 2 * 5 / (25 + 10), pointing along (3, 4) / 5
        assert!((on_a.length() - 10.0 / 35.0).abs() < 1e-12);
    }

    #[test]
    fn test_coincident_bodies_stay_finite() {
        let law = ForceLaw::default();
        let force = law.pairwise(DVec3::ONE, 100.0, DVec3::ONE, 100.0);
        assert!(force.is_finite());
        assert_eq!(force, DVec3::ZERO);
    }

    #[test]
    fn test_isolated_body_feels_nothing() {
        let (snapshot, table) = prepared(&[Body::at_rest([3.0, 2.0, 1.0], 50.0)], 10.0);
        let outcome = evaluate_bucket(0, &table, &snapshot, &ForceLaw::default());
        assert_eq!(outcome.forces, vec![(0, Vec3::ZERO)]);
    }

    #[test]
    fn test_far_field_uses_bucket_aggregate() {
        let (snapshot, table) = prepared(
            &[
                Body::at_rest([1.0, 1.0, 1.0], 10.0),
                Body::at_rest([2.0, 1.0, 1.0], 10.0),
                Body::at_rest([1.0, 2.0, 1.0], 10.0),
                Body::at_rest([95.0, 95.0, 95.0], 5.0),
            ],
            10.0,
        );
        let law = ForceLaw::default();
        let cluster = table.bucket_of_cell(bevy::math::IVec3::ZERO).unwrap();
        let lone = table.bucket_of_cell(bevy::math::IVec3::splat(9)).unwrap();
        assert_eq!(table.bucket(cluster).aggregate_mass, 30.0);
        assert_eq!(table.bucket(cluster).center, DVec3::splat(5.0));

        let outcome = evaluate_bucket(lone, &table, &snapshot, &law);
        let target = snapshot.positions[3];
        let approx = law.pairwise(target, 5.0, DVec3::splat(5.0), 30.0).as_vec3();
        assert_eq!(outcome.forces, vec![(3, approx)]);

        let exact: DVec3 = (0..3)
            .map(|i| law.pairwise(target, 5.0, snapshot.positions[i], 10.0))
            .sum();
        assert_ne!(approx, exact.as_vec3());
        assert!((approx - exact.as_vec3()).length() / exact.as_vec3().length() < 0.15);
    }

    #[test]
    fn test_near_field_is_exact() {
        let (snapshot, table) = prepared(
            &[
                Body::at_rest([1.0, 1.0, 1.0], 10.0),
                Body::at_rest([4.0, 5.0, 1.0], 20.0),
            ],
            10.0,
        );
        let law = ForceLaw::default();
        let outcome = evaluate_bucket(0, &table, &snapshot, &law);
        let expected = law
            .pairwise(snapshot.positions[0], 10.0, snapshot.positions[1], 20.0)
            .as_vec3();
        assert_eq!(outcome.forces[0], (0, expected));
        assert_eq!(outcome.forces[1].1, -expected);
    }

    #[test]
    fn test_destroyed_bodies_neither_feel_nor_exert() {
        let (mut snapshot, mut table) = prepared(
            &[
                Body::at_rest([1.0, 1.0, 1.0], 10.0),
                Body::at_rest([4.0, 5.0, 1.0], 20.0),
            ],
            10.0,
        );
        snapshot.destroyed[1] = true;
        table.set_aggregate_mass(0, aggregate_mass(table.members(0), &snapshot));
        let outcome = evaluate_bucket(0, &table, &snapshot, &ForceLaw::default());
        assert_eq!(outcome.forces, vec![(0, Vec3::ZERO)]);
    }

    #[test]
    fn test_far_field_of_distant_cluster() {
        let (snapshot, table) = prepared_on(
            &[
                Body::at_rest([1e11, 0.0, 0.0], 10.0),
                Body::at_rest([1e11, 0.0, 100.0], 10.0),
            ],
            |positions| Grid::fit(positions, 15.0, 1.0),
        );
        assert_eq!(table.len(), 2);
        let law = ForceLaw::default();
        let own = table.bucket_of_cell(table.grid().cell(snapshot.positions[0])).unwrap();
        let outcome = evaluate_bucket(own, &table, &snapshot, &law);
        let (index, force) = outcome.forces[0];
        assert_eq!(index, 0);

        let exact = law
            .pairwise(snapshot.positions[0], 10.0, snapshot.positions[1], 10.0)
            .as_vec3();
        assert!(force.z > 0.0);
        assert!(force.z > 10.0 * force.x.abs());
        assert!((force - exact).length() / exact.length() < 0.15);
    }
}
