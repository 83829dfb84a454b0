//! Qualification, mandate derivation, and the vote budget.
//!
//! A mandate is a one-time voting authorization attached to a path that has
//! crossed the qualification threshold within its own lineage. Mandate ids
//! are derived from the path and the ledger head at qualification time, so
//! they are auditable after the fact: anyone can recompute the id from the
//! ledger state the qualification observed.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::hash_fields;
use crate::ids::{MandateId, PathId, SessionId, TxId};
use crate::rating::RatedHeir;

/// Domain tag for mandate id derivation.
const MANDATE_ID_DOMAIN: &[u8] = b"hronir.mandate.v1";

/// Errors raised by qualification and mandate checks.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum MandateError {
    /// The path has not crossed the qualification threshold.
    #[error("path not qualified: {path_id}")]
    NotQualified {
        /// The unqualified path.
        path_id: PathId,
    },

    /// The path's mandate was already used to start a session.
    #[error("path already consumed by session {session_id}: {path_id}")]
    AlreadyConsumed {
        /// The consumed path.
        path_id: PathId,
        /// The session that consumed it.
        session_id: SessionId,
    },
}

/// The qualification threshold, configurable rather than hard-coded.
///
/// The protocol's history carries two competing conventions (a raw win
/// count and an Elo floor); both are representable and the deployment
/// picks one explicitly in its config.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QualificationPolicy {
    /// Qualified once the path has at least this many duel wins.
    WinCount {
        /// Minimum number of wins.
        threshold: u32,
    },
    /// Qualified once the path's replayed Elo reaches this floor.
    EloThreshold {
        /// Minimum rating.
        threshold: f64,
    },
}

impl Default for QualificationPolicy {
    fn default() -> Self {
        Self::WinCount { threshold: 3 }
    }
}

impl QualificationPolicy {
    /// Evaluates the policy against a path's replayed lineage rating.
    #[must_use]
    pub fn is_qualified(&self, heir: &RatedHeir) -> bool {
        match self {
            Self::WinCount { threshold } => heir.wins >= *threshold,
            Self::EloThreshold { threshold } => heir.rating >= *threshold,
        }
    }
}

/// Derives the mandate id assigned at qualification.
///
/// `head` is the ledger HEAD observed immediately before the qualification
/// transition; the genesis value stands in when the ledger is empty.
#[must_use]
pub fn derive_mandate_id(path_id: &PathId, head: Option<&TxId>) -> MandateId {
    let head_bytes: &[u8] = head.map_or(&[], |h| h.as_bytes());
    MandateId::from_bytes(hash_fields(
        MANDATE_ID_DOMAIN,
        &[path_id.as_bytes(), head_bytes],
    ))
}

/// Verdicts a mandate at `position` may cast per session: `floor(sqrt(N))`.
#[must_use]
pub fn vote_budget(position: u32) -> u32 {
    position.isqrt()
}
