//! The quorum predicate.

use pingmesh_model::QuorumType;

/// Whether `count` agreeing vantages out of `total` online nodes meet the
/// monitor's quorum.
///
/// `majority` requires strictly more than half (integer division: 3 of 5
/// qualifies, 2 of 4 does not). `n_of_m` requires at least `quorum_n`.
pub fn quorum_met(quorum_type: QuorumType, quorum_n: u32, count: usize, total: usize) -> bool {
    match quorum_type {
        QuorumType::Majority => count > total / 2,
        QuorumType::NOfM => count >= quorum_n as usize,
    }
}
