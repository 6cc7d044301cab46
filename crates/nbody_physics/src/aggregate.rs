use crate::snapshot::Snapshot;

/// Sum of the live member masses of one bucket. Run after collision
/// resolution so absorbed bodies are not counted twice.
pub fn aggregate_mass(members: &[usize], snapshot: &Snapshot) -> f64 {
    members
        .iter()
        .filter(|&&i| snapshot.is_live(i))
        .map(|&i| snapshot.masses[i] as f64)
        .sum()
}
