//! Lineage-filtered Elo rating and entropy-maximizing duel selection.
//!
//! Ratings are always replayed from the full vote history in a fixed
//! deterministic order, never updated incrementally. This is what makes
//! dormant votes work: evidence recorded against a lineage that was not
//! canonical at the time is counted the moment that lineage becomes
//! canonical, because every ranking starts from scratch.

mod duel;
mod elo;

#[cfg(test)]
mod tests;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::hash_fields;
use crate::ids::{HronirId, PathId, VoteId};

pub use duel::{Duel, select_duel, shannon_entropy};
pub use elo::{BASE_RATING, K_FACTOR, RatedHeir, expected_score, rank_heirs};

/// Domain tag for vote id derivation.
const VOTE_ID_DOMAIN: &[u8] = b"hronir.vote.v1";

/// An appended verdict: `winner` beat `loser` at `position`, cast under
/// `voting_mandate`.
///
/// Votes are append-only evidence. They are never mutated or deleted, even
/// when their lineage later drops out of the canon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    /// Content-derived identity of this vote.
    pub vote_id: VoteId,
    /// Position the duel was judged at.
    pub position: u32,
    /// The path whose mandate cast this vote.
    pub voting_mandate: PathId,
    /// The winning hrönir.
    pub winner: HronirId,
    /// The losing hrönir.
    pub loser: HronirId,
    /// When the vote was committed.
    pub recorded_at: DateTime<Utc>,
}

impl Vote {
    /// Creates a vote, deriving its identity from its content.
    #[must_use]
    pub fn new(
        position: u32,
        voting_mandate: PathId,
        winner: HronirId,
        loser: HronirId,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        let nanos = recorded_at.timestamp_nanos_opt().unwrap_or(0);
        let vote_id = VoteId::from_bytes(hash_fields(
            VOTE_ID_DOMAIN,
            &[
                &position.to_be_bytes(),
                voting_mandate.as_bytes(),
                winner.as_bytes(),
                loser.as_bytes(),
                &nanos.to_be_bytes(),
            ],
        ));
        Self {
            vote_id,
            position,
            voting_mandate,
            winner,
            loser,
            recorded_at,
        }
    }
}
