//! Entropy-maximizing duel selection.

use serde::{Deserialize, Serialize};

use crate::ids::PathId;

use super::elo::{RatedHeir, expected_score};

/// A pair of competing paths proposed for judgment.
///
/// Duels are derived values; they are only persisted inside a frozen
/// session dossier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Duel {
    /// Position the duel would be judged at.
    pub position: u32,
    /// First candidate (the higher-rated contestant of the pair).
    pub candidate_a: PathId,
    /// Second candidate.
    pub candidate_b: PathId,
    /// Shannon entropy of the predicted outcome, in bits.
    pub entropy: f64,
}

impl Duel {
    /// Whether `path_id` is one of the duel's two candidates.
    #[must_use]
    pub fn has_candidate(&self, path_id: &PathId) -> bool {
        self.candidate_a == *path_id || self.candidate_b == *path_id
    }

    /// Given one candidate, returns the other, or `None` if `path_id` is
    /// not part of this duel.
    #[must_use]
    pub fn opponent_of(&self, path_id: &PathId) -> Option<PathId> {
        if self.candidate_a == *path_id {
            Some(self.candidate_b)
        } else if self.candidate_b == *path_id {
            Some(self.candidate_a)
        } else {
            None
        }
    }
}

/// Shannon entropy (bits) of a Bernoulli outcome with probability `p`.
#[must_use]
pub fn shannon_entropy(p: f64) -> f64 {
    if p <= 0.0 || p >= 1.0 {
        return 0.0;
    }
    -p * p.log2() - (1.0 - p) * (1.0 - p).log2()
}

/// Selects the most informative duel among the ranked heirs.
///
/// Scans all unordered pairs of `ranked` (which must be sorted by
/// descending rating, as [`super::rank_heirs`] returns) and keeps the pair
/// with maximal outcome entropy. Ties keep the pair encountered first, so
/// higher-rated contestants are preferred deterministically. Fewer than two
/// heirs yield no duel.
#[must_use]
pub fn select_duel(position: u32, ranked: &[RatedHeir]) -> Option<Duel> {
    if ranked.len() < 2 {
        return None;
    }

    let mut best: Option<Duel> = None;
    for i in 0..ranked.len() {
        for j in (i + 1)..ranked.len() {
            let p = expected_score(ranked[i].rating, ranked[j].rating);
            let entropy = shannon_entropy(p);
            // Strict comparison keeps the first pair on ties.
            if best.as_ref().is_none_or(|b| entropy > b.entropy) {
                best = Some(Duel {
                    position,
                    candidate_a: ranked[i].path_id,
                    candidate_b: ranked[j].path_id,
                    entropy,
                });
            }
        }
    }
    best
}
