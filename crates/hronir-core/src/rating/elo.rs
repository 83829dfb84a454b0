//! Elo computation over a lineage's heirs.

use std::collections::HashMap;

use crate::ids::{HronirId, PathId};
use crate::path::Path;

use super::Vote;

/// Rating every heir starts from.
pub const BASE_RATING: f64 = 1500.0;

/// Standard Elo K-factor.
pub const K_FACTOR: f64 = 32.0;

/// A ranked heir: one eligible path with its replayed rating.
#[derive(Debug, Clone, PartialEq)]
pub struct RatedHeir {
    /// The heir path.
    pub path_id: PathId,
    /// Its proposed successor hrönir (the identity votes reference).
    pub successor: HronirId,
    /// Replayed Elo rating.
    pub rating: f64,
    /// Duels won during replay.
    pub wins: u32,
    /// Duels lost during replay.
    pub losses: u32,
}

/// Expected score of `a` against `b` under the logistic Elo model.
#[must_use]
pub fn expected_score(rating_a: f64, rating_b: f64) -> f64 {
    1.0 / (1.0 + 10f64.powf((rating_b - rating_a) / 400.0))
}

/// Replays the full vote history for one heir set and returns the heirs
/// ranked by descending rating.
///
/// `heirs` must already be lineage-filtered: every path's recorded
/// predecessor equals the predecessor hrönir under consideration. Votes are
/// applied in ascending `(recorded_at, vote_id)` order; votes whose winner
/// and loser are not both successors of the heir set are ignored. Rating
/// ties order by ascending path id so the result is deterministic.
#[must_use]
pub fn rank_heirs(heirs: &[Path], votes: &[Vote]) -> Vec<RatedHeir> {
    if heirs.is_empty() {
        return Vec::new();
    }

    // Within one heir set every successor is distinct (identical
    // (position, predecessor, successor) triples collapse to one path id),
    // so successor -> heir index is injective.
    let by_successor: HashMap<HronirId, usize> = heirs
        .iter()
        .enumerate()
        .map(|(i, p)| (p.successor, i))
        .collect();

    let mut rated: Vec<RatedHeir> = heirs
        .iter()
        .map(|p| RatedHeir {
            path_id: p.path_id,
            successor: p.successor,
            rating: BASE_RATING,
            wins: 0,
            losses: 0,
        })
        .collect();

    let mut ordered: Vec<&Vote> = votes.iter().collect();
    ordered.sort_by(|a, b| {
        a.recorded_at
            .cmp(&b.recorded_at)
            .then_with(|| a.vote_id.cmp(&b.vote_id))
    });

    for vote in ordered {
        let (Some(&wi), Some(&li)) = (
            by_successor.get(&vote.winner),
            by_successor.get(&vote.loser),
        ) else {
            continue;
        };
        if wi == li {
            continue;
        }

        let expected_winner = expected_score(rated[wi].rating, rated[li].rating);
        let delta = K_FACTOR * (1.0 - expected_winner);
        rated[wi].rating += delta;
        rated[li].rating -= delta;
        rated[wi].wins += 1;
        rated[li].losses += 1;
    }

    rated.sort_by(|a, b| {
        b.rating
            .partial_cmp(&a.rating)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.path_id.cmp(&b.path_id))
    });
    rated
}
