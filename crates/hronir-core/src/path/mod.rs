//! Path records: the edges of the narrative DAG.
//!
//! A path proposes a successor hrönir after a given predecessor at a
//! position. Its identity is derived from exactly those three fields, so
//! re-submitting the same edge is idempotent by construction. Paths carry a
//! strictly forward status state machine:
//!
//! ```text
//! Pending ──qualify──> Qualified ──commit──> Spent
//! ```
//!
//! No transition ever reverses; attempting one fails with
//! [`PathError::InvalidStateTransition`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::hash_fields;
use crate::ids::{HronirId, MandateId, PathId};

/// Domain tag for path id derivation.
const PATH_ID_DOMAIN: &[u8] = b"hronir.path.v1";

/// Errors that can occur when constructing or transitioning a path.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PathError {
    /// The position/predecessor invariant was violated.
    ///
    /// Position 0 paths must have no predecessor; every later position must
    /// have one.
    #[error(
        "position/predecessor mismatch: position {position} with predecessor present = {has_predecessor}"
    )]
    PositionPredecessorMismatch {
        /// The offending position.
        position: u32,
        /// Whether a predecessor was supplied.
        has_predecessor: bool,
    },

    /// Attempted a backward or skipping status transition.
    #[error("invalid status transition: {from} -> {to}")]
    InvalidStateTransition {
        /// The current status.
        from: PathStatus,
        /// The requested status.
        to: PathStatus,
    },
}

/// Lifecycle status of a path.
///
/// The machine is strictly forward: `Pending -> Qualified -> Spent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathStatus {
    /// Proposed but not yet past the qualification threshold.
    Pending,
    /// Past the threshold; carries a mandate and may start one session.
    Qualified,
    /// Its mandate has been consumed by a committed session.
    Spent,
}

impl PathStatus {
    /// Returns the status as a static string (used for storage columns).
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Qualified => "qualified",
            Self::Spent => "spent",
        }
    }

    /// Parses a storage column value.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "qualified" => Some(Self::Qualified),
            "spent" => Some(Self::Spent),
            _ => None,
        }
    }

    /// Whether the machine permits moving from `self` to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Qualified) | (Self::Qualified, Self::Spent)
        )
    }
}

impl std::fmt::Display for PathStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A DAG edge proposing `successor` after `predecessor` at `position`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Path {
    /// Content-derived identity: `H(position, predecessor, successor)`.
    pub path_id: PathId,
    /// Narrative position of this edge.
    pub position: u32,
    /// Predecessor hrönir; `None` exactly at position 0.
    pub predecessor: Option<HronirId>,
    /// The proposed successor hrönir.
    pub successor: HronirId,
    /// Lifecycle status.
    pub status: PathStatus,
    /// Voting mandate, assigned at qualification.
    pub mandate_id: Option<MandateId>,
}

/// Derives the content identity of a path.
///
/// The empty byte string stands in for an absent predecessor, so position-0
/// edges hash distinctly from any edge with a real predecessor.
#[must_use]
pub fn derive_path_id(
    position: u32,
    predecessor: Option<&HronirId>,
    successor: &HronirId,
) -> PathId {
    let pred_bytes: &[u8] = predecessor.map_or(&[], |p| p.as_bytes());
    PathId::from_bytes(hash_fields(
        PATH_ID_DOMAIN,
        &[&position.to_be_bytes(), pred_bytes, successor.as_bytes()],
    ))
}

impl Path {
    /// Creates a new pending path, enforcing the position/predecessor
    /// invariant and deriving the path id.
    ///
    /// # Errors
    ///
    /// Returns [`PathError::PositionPredecessorMismatch`] when position 0 is
    /// given a predecessor or a later position lacks one.
    pub fn new(
        position: u32,
        predecessor: Option<HronirId>,
        successor: HronirId,
    ) -> Result<Self, PathError> {
        if (position == 0) != predecessor.is_none() {
            return Err(PathError::PositionPredecessorMismatch {
                position,
                has_predecessor: predecessor.is_some(),
            });
        }
        let path_id = derive_path_id(position, predecessor.as_ref(), &successor);
        Ok(Self {
            path_id,
            position,
            predecessor,
            successor,
            status: PathStatus::Pending,
            mandate_id: None,
        })
    }

    /// Moves the path to `next`, rejecting anything but the forward machine.
    ///
    /// # Errors
    ///
    /// Returns [`PathError::InvalidStateTransition`] for backward, skipping,
    /// or self transitions.
    pub fn transition(&mut self, next: PathStatus) -> Result<(), PathError> {
        if !self.status.can_transition_to(next) {
            return Err(PathError::InvalidStateTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;
    use crate::crypto::hash_content;

    fn hronir(text: &str) -> HronirId {
        HronirId::from_bytes(hash_content(text.as_bytes()))
    }

    #[test]
    fn test_same_edge_same_id() {
        let pred = hronir("axaxaxas");
        let succ = hronir("mlo");
        let a = Path::new(3, Some(pred), succ).expect("valid path");
        let b = Path::new(3, Some(pred), succ).expect("valid path");
        assert_eq!(a.path_id, b.path_id);
    }

    #[test]
    fn test_different_fields_different_id() {
        let pred = hronir("axaxaxas");
        let succ = hronir("mlo");
        let base = Path::new(3, Some(pred), succ).expect("valid path");
        let other_pos = Path::new(4, Some(pred), succ).expect("valid path");
        let other_succ = Path::new(3, Some(pred), hronir("uqbar")).expect("valid path");
        assert_ne!(base.path_id, other_pos.path_id);
        assert_ne!(base.path_id, other_succ.path_id);
    }

    #[test]
    fn test_position_predecessor_invariant() {
        let h = hronir("tlon");
        assert!(Path::new(0, None, h).is_ok());
        assert!(matches!(
            Path::new(0, Some(h), h),
            Err(PathError::PositionPredecessorMismatch { position: 0, has_predecessor: true })
        ));
        assert!(matches!(
            Path::new(1, None, h),
            Err(PathError::PositionPredecessorMismatch { position: 1, has_predecessor: false })
        ));
    }

    #[test]
    fn test_forward_only_transitions() {
        let mut path = Path::new(0, None, hronir("orbis")).expect("valid path");
        assert_eq!(path.status, PathStatus::Pending);
        path.transition(PathStatus::Qualified).expect("forward");
        path.transition(PathStatus::Spent).expect("forward");

        let err = path.transition(PathStatus::Qualified).unwrap_err();
        assert!(matches!(err, PathError::InvalidStateTransition { .. }));
    }

    #[test]
    fn test_pending_cannot_skip_to_spent() {
        let mut path = Path::new(0, None, hronir("tertius")).expect("valid path");
        assert!(path.transition(PathStatus::Spent).is_err());
        assert_eq!(path.status, PathStatus::Pending);
    }
}
