//! Session lifecycle: dossier freezing, verdict validation, close-out.
//!
//! A session is the execution context spawned by activating a mandate.
//! Its dossier of duels is computed once, at session start, against the
//! canonical chain as it stood at that moment, and never recomputed: the
//! judge rules on the questions they were handed, even if the canon moves
//! underneath them before they commit.
//!
//! # State Machine
//!
//! ```text
//!     (start)          commit, >=1 accepted
//!        │           ┌──────────────────────> Committed
//!        ▼           │
//!     Active ────────┤
//!                    │
//!                    └──────────────────────> Failed
//!                        commit, 0 accepted
//! ```
//!
//! Either close is terminal and consumes the mandate; a closed session is
//! kept for audit and never reused.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::{MandateId, PathId, SessionId};
use crate::rating::Duel;

/// Errors raised by session operations.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum SessionError {
    /// No session exists with the given id.
    #[error("session not found: {session_id}")]
    SessionNotFound {
        /// The unknown id.
        session_id: SessionId,
    },

    /// The session was already committed or failed.
    #[error("session already committed: {session_id} ({status})")]
    AlreadyCommitted {
        /// The closed session.
        session_id: SessionId,
        /// Its terminal status.
        status: SessionStatus,
    },

    /// More verdicts were submitted than the mandate's budget allows.
    #[error("vote budget exceeded: submitted {submitted}, budget {budget}")]
    VoteBudgetExceeded {
        /// Number of verdicts submitted.
        submitted: usize,
        /// The mandate's budget, `floor(sqrt(position))`.
        budget: u32,
    },
}

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Dossier frozen, awaiting commit.
    Active,
    /// Closed with at least one accepted verdict.
    Committed,
    /// Closed with no accepted verdicts; the mandate is spent regardless.
    Failed,
}

impl SessionStatus {
    /// Returns the status as a static string (used for storage columns).
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Committed => "committed",
            Self::Failed => "failed",
        }
    }

    /// Parses a storage column value.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "committed" => Some(Self::Committed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The immutable set of duels a session is permitted to judge, keyed by
/// position.
pub type Dossier = BTreeMap<u32, Duel>;

/// A voting session spawned from a qualified path's mandate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Session identity.
    pub session_id: SessionId,
    /// The qualified path whose mandate was activated.
    pub initiating_path: PathId,
    /// The mandate being consumed.
    pub mandate_id: MandateId,
    /// The initiating path's position; fixes the vote budget.
    pub position_of_mandate: u32,
    /// Frozen duels, one per judgeable position.
    pub dossier: Dossier,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Verdicts accepted at commit, empty until then.
    pub committed_verdicts: BTreeMap<u32, PathId>,
    /// When the session was started.
    pub started_at: DateTime<Utc>,
}

impl Session {
    /// Creates an active session with a frozen dossier.
    #[must_use]
    pub fn new(
        session_id: SessionId,
        initiating_path: PathId,
        mandate_id: MandateId,
        position_of_mandate: u32,
        dossier: Dossier,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id,
            initiating_path,
            mandate_id,
            position_of_mandate,
            dossier,
            status: SessionStatus::Active,
            committed_verdicts: BTreeMap::new(),
            started_at,
        }
    }

    /// Whether the session can still accept a commit.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self.status, SessionStatus::Active)
    }
}

/// Why a single verdict was rejected at commit.
///
/// Rejections are per-verdict: one bad entry doesn't abort the batch, it
/// is reported alongside the accepted entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictRejection {
    /// The position doesn't exist in the frozen dossier.
    UnknownPosition,
    /// The named winner is not one of the duel's two candidates.
    NotACandidate,
}

impl std::fmt::Display for VerdictRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownPosition => f.write_str("position not in dossier"),
            Self::NotACandidate => f.write_str("winner is not a duel candidate"),
        }
    }
}

/// One rejected verdict with its reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedVerdict {
    /// The submitted position.
    pub position: u32,
    /// The submitted winner.
    pub winner: PathId,
    /// Why it was rejected.
    pub reason: VerdictRejection,
}

/// Result of screening a submitted verdict map against a frozen dossier.
#[derive(Debug, Clone, PartialEq)]
pub struct ScreenedVerdicts {
    /// Verdicts matching a dossier duel, winner being a candidate.
    pub accepted: BTreeMap<u32, PathId>,
    /// Everything else, with reasons.
    pub rejected: Vec<RejectedVerdict>,
}

/// Screens `verdicts` against the session's frozen dossier.
///
/// Budget enforcement is the caller's job (it needs the mandate position
/// and must reject the whole commit); this function only applies the
/// per-verdict rules.
#[must_use]
pub fn screen_verdicts(dossier: &Dossier, verdicts: &BTreeMap<u32, PathId>) -> ScreenedVerdicts {
    let mut accepted = BTreeMap::new();
    let mut rejected = Vec::new();

    for (&position, &winner) in verdicts {
        match dossier.get(&position) {
            None => rejected.push(RejectedVerdict {
                position,
                winner,
                reason: VerdictRejection::UnknownPosition,
            }),
            Some(duel) if !duel.has_candidate(&winner) => rejected.push(RejectedVerdict {
                position,
                winner,
                reason: VerdictRejection::NotACandidate,
            }),
            Some(_) => {
                accepted.insert(position, winner);
            }
        }
    }

    ScreenedVerdicts { accepted, rejected }
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    fn duel(position: u32, a: u8, b: u8) -> Duel {
        Duel {
            position,
            candidate_a: PathId::from_bytes([a; 32]),
            candidate_b: PathId::from_bytes([b; 32]),
            entropy: 1.0,
        }
    }

    fn dossier() -> Dossier {
        let mut d = Dossier::new();
        d.insert(0, duel(0, 1, 2));
        d.insert(1, duel(1, 3, 4));
        d
    }

    #[test]
    fn test_screen_accepts_candidates() {
        let mut verdicts = BTreeMap::new();
        verdicts.insert(0, PathId::from_bytes([2; 32]));
        verdicts.insert(1, PathId::from_bytes([3; 32]));

        let screened = screen_verdicts(&dossier(), &verdicts);
        assert_eq!(screened.accepted.len(), 2);
        assert!(screened.rejected.is_empty());
    }

    #[test]
    fn test_screen_rejects_unknown_position() {
        let mut verdicts = BTreeMap::new();
        verdicts.insert(7, PathId::from_bytes([1; 32]));

        let screened = screen_verdicts(&dossier(), &verdicts);
        assert!(screened.accepted.is_empty());
        assert_eq!(screened.rejected.len(), 1);
        assert_eq!(screened.rejected[0].reason, VerdictRejection::UnknownPosition);
    }

    #[test]
    fn test_screen_rejects_non_candidate() {
        let mut verdicts = BTreeMap::new();
        verdicts.insert(0, PathId::from_bytes([9; 32]));

        let screened = screen_verdicts(&dossier(), &verdicts);
        assert!(screened.accepted.is_empty());
        assert_eq!(screened.rejected[0].reason, VerdictRejection::NotACandidate);
    }

    #[test]
    fn test_screen_mixes_accept_and_reject() {
        let mut verdicts = BTreeMap::new();
        verdicts.insert(0, PathId::from_bytes([1; 32]));
        verdicts.insert(1, PathId::from_bytes([9; 32]));

        let screened = screen_verdicts(&dossier(), &verdicts);
        assert_eq!(screened.accepted.len(), 1);
        assert_eq!(screened.rejected.len(), 1);
    }

    #[test]
    fn test_session_is_active() {
        let session = Session::new(
            SessionId::new(),
            PathId::from_bytes([1; 32]),
            crate::ids::MandateId::from_bytes([2; 32]),
            4,
            dossier(),
            chrono::Utc::now(),
        );
        assert!(session.is_active());
        assert!(session.committed_verdicts.is_empty());
    }
}
