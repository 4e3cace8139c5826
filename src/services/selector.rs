//! Review party selection.

use crate::error::AppError;
use crate::models::{ReviewerWorkload, Role};

/// Choose a review party from a candidate pool.
///
/// `pool` must already be filtered to active reviewers other than the
/// author and sorted by ascending payload. For each `(role, count)` in
/// `quotas`, the first `count` candidates of that role are taken in pool
/// order; role groups are concatenated in quota order.
///
/// Fails with [`AppError::NoEligibleReviewers`] only when the pool is empty.
/// A party that comes out empty or partially filled is returned as is.
pub fn select_party(
    pool: &[ReviewerWorkload],
    quotas: &[(Role, usize)],
) -> Result<Vec<ReviewerWorkload>, AppError> {
    if pool.is_empty() {
        return Err(AppError::NoEligibleReviewers);
    }

    let mut party: Vec<ReviewerWorkload> = Vec::new();
    for &(role, count) in quotas {
        let picked: Vec<ReviewerWorkload> = pool
            .iter()
            .filter(|candidate| candidate.role() == role)
            .filter(|candidate| !party.iter().any(|p| p.id() == candidate.id()))
            .take(count)
            .cloned()
            .collect();
        party.extend(picked);
    }

    Ok(party)
}
