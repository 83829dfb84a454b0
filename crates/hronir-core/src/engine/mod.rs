//! The consensus engine facade.
//!
//! [`ConsensusEngine`] ties the resolver, rating, lifecycle, cascade, and
//! ledger together behind one handle. It owns no state of its own: every
//! operation works through the injected [`Storage`], and every multi-step
//! mutation delegates to one of the storage layer's atomic composites.

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info};

use crate::canon::{CanonEntry, resolve_canonical_path};
use crate::cascade::{CascadeError, CascadeOutcome, run_cascade};
use crate::config::EngineConfig;
use crate::ids::{HronirId, PathId, SessionId};
use crate::ledger::{LedgerError, Transaction, verify_chain};
use crate::mandate::{MandateError, derive_mandate_id, vote_budget};
use crate::path::{Path, PathError, PathStatus};
use crate::rating::{Duel, RatedHeir, Vote, rank_heirs, select_duel};
use crate::session::{
    Dossier, RejectedVerdict, ScreenedVerdicts, Session, SessionError, SessionStatus,
    screen_verdicts,
};
use crate::storage::{Storage, StorageError};

/// Errors surfaced by engine operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// The persistence layer failed; propagated unchanged.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Path construction or transition failed.
    #[error(transparent)]
    Path(#[from] PathError),

    /// Qualification or mandate rules rejected the operation.
    #[error(transparent)]
    Mandate(#[from] MandateError),

    /// Session rules rejected the operation.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Cascade re-resolution failed.
    #[error(transparent)]
    Cascade(#[from] CascadeError),

    /// Ledger integrity verification failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// A referenced path does not exist.
    #[error("path not found: {path_id}")]
    PathNotFound {
        /// The unknown path.
        path_id: PathId,
    },
}

/// Result of a committed (or failed) session.
#[derive(Debug)]
pub struct CommitOutcome {
    /// The closed session's id.
    pub session_id: SessionId,
    /// Terminal status: `Committed` with accepted verdicts, else `Failed`.
    pub status: SessionStatus,
    /// Verdicts that passed dossier screening and became votes.
    pub accepted: BTreeMap<u32, PathId>,
    /// Verdicts rejected individually, with reasons.
    pub rejected: Vec<RejectedVerdict>,
    /// The ledger transaction, when at least one verdict was accepted.
    pub transaction: Option<Transaction>,
    /// The cascade triggered by the lowest accepted position.
    pub cascade: Option<CascadeOutcome>,
}

/// The canon consensus engine.
///
/// Generic over its storage backend; see [`crate::storage`] for the two
/// provided implementations.
pub struct ConsensusEngine<S> {
    storage: S,
    config: EngineConfig,
}

impl<S: Storage> ConsensusEngine<S> {
    /// Creates an engine over the given storage handle.
    #[must_use]
    pub fn new(storage: S, config: EngineConfig) -> Self {
        Self { storage, config }
    }

    /// The underlying storage handle.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// The engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // --- paths -----------------------------------------------------------

    /// Proposes a continuation edge. Idempotent: re-submitting an existing
    /// edge returns the stored record unchanged.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a position/predecessor mismatch, or
    /// a storage error.
    pub fn create_path(
        &self,
        position: u32,
        predecessor: Option<HronirId>,
        successor: HronirId,
    ) -> Result<Path, EngineError> {
        let path = Path::new(position, predecessor, successor)?;
        let stored = self.storage.upsert_path(&path)?;
        debug!(path_id = %stored.path_id, position, "path recorded");
        Ok(stored)
    }

    /// Loads a path by id.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::PathNotFound`] for an unknown id.
    pub fn get_path(&self, path_id: &PathId) -> Result<Path, EngineError> {
        self.storage
            .get_path(path_id)?
            .ok_or(EngineError::PathNotFound { path_id: *path_id })
    }

    // --- qualification ---------------------------------------------------

    /// Evaluates the qualification threshold for a path and, when crossed,
    /// performs `Pending -> Qualified` and assigns the mandate.
    ///
    /// Idempotent for already-qualified paths: returns the stored record
    /// without re-deriving the mandate.
    ///
    /// # Errors
    ///
    /// Returns [`MandateError::NotQualified`] when the path is below the
    /// configured threshold.
    pub fn check_qualification(&self, path_id: &PathId) -> Result<Path, EngineError> {
        let mut path = self.get_path(path_id)?;
        if path.status != PathStatus::Pending {
            return Ok(path);
        }

        let rated = self.rated_entry(&path)?;
        let qualified = rated
            .as_ref()
            .is_some_and(|heir| self.config.qualification.is_qualified(heir));
        if !qualified {
            return Err(MandateError::NotQualified { path_id: *path_id }.into());
        }

        // The mandate id binds the qualification to the ledger state it
        // observed.
        let head = self.storage.get_head_transaction_id()?;
        path.mandate_id = Some(derive_mandate_id(path_id, head.as_ref()));
        path.transition(PathStatus::Qualified)?;
        self.storage.update_path(&path)?;
        info!(path_id = %path.path_id, mandate = ?path.mandate_id, "path qualified");
        Ok(path)
    }

    fn rated_entry(&self, path: &Path) -> Result<Option<RatedHeir>, EngineError> {
        let heirs: Vec<Path> = self
            .storage
            .get_paths_by_predecessor(path.predecessor.as_ref())?
            .into_iter()
            .filter(|p| p.position == path.position)
            .collect();
        let heir_ids: Vec<PathId> = heirs.iter().map(|p| p.path_id).collect();
        let votes = self.storage.get_votes_for_heirs(&heir_ids, path.position)?;
        Ok(rank_heirs(&heirs, &votes)
            .into_iter()
            .find(|h| h.path_id == path.path_id))
    }

    // --- rankings and duels ----------------------------------------------

    /// Ranked heirs continuing the canonical chain at `position`.
    ///
    /// # Errors
    ///
    /// Returns a storage error if lookups fail.
    pub fn ranking(&self, position: u32) -> Result<Vec<RatedHeir>, EngineError> {
        match self.predecessor_for(position)? {
            None if position > 0 => Ok(Vec::new()),
            predecessor => self.rank_at(position, predecessor),
        }
    }

    /// The most informative duel at `position`, if two or more heirs exist.
    ///
    /// # Errors
    ///
    /// Returns a storage error if lookups fail.
    pub fn next_duel(&self, position: u32) -> Result<Option<Duel>, EngineError> {
        let ranked = self.ranking(position)?;
        Ok(select_duel(position, &ranked))
    }

    /// Predecessor hrönir for `position` under the current cached canon.
    ///
    /// `None` at position 0, or when the previous position has no cached
    /// winner.
    fn predecessor_for(&self, position: u32) -> Result<Option<HronirId>, EngineError> {
        if position == 0 {
            return Ok(None);
        }
        let Some(winner_id) = self.storage.canonical_cache_entry(position - 1)? else {
            return Ok(None);
        };
        let winner = self.get_path(&winner_id)?;
        Ok(Some(winner.successor))
    }

    fn rank_at(
        &self,
        position: u32,
        predecessor: Option<HronirId>,
    ) -> Result<Vec<RatedHeir>, EngineError> {
        let heirs: Vec<Path> = self
            .storage
            .get_paths_by_predecessor(predecessor.as_ref())?
            .into_iter()
            .filter(|p| p.position == position)
            .collect();
        let heir_ids: Vec<PathId> = heirs.iter().map(|p| p.path_id).collect();
        let votes = self.storage.get_votes_for_heirs(&heir_ids, position)?;
        Ok(rank_heirs(&heirs, &votes))
    }

    // --- canon -----------------------------------------------------------

    /// Recomputes the canonical chain from scratch (pure resolver over the
    /// full path set) without touching the cache.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the path set cannot be loaded.
    pub fn canonical_path(&self) -> Result<Vec<CanonEntry>, EngineError> {
        let paths = self.storage.all_paths()?;
        Ok(resolve_canonical_path(&paths, self.config.max_positions))
    }

    /// The cached canonical chain, as maintained by cascades.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the cache cannot be loaded.
    pub fn canonical_cache(&self) -> Result<BTreeMap<u32, PathId>, EngineError> {
        Ok(self.storage.canonical_cache()?)
    }

    /// Rebuilds the canonical cache from the resolver's output.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the rebuild cannot be persisted.
    pub fn rebuild_canonical_cache(&self) -> Result<Vec<CanonEntry>, EngineError> {
        let chain = self.canonical_path()?;
        let entries: Vec<(u32, PathId)> =
            chain.iter().map(|e| (e.position, e.winner)).collect();
        let truncate_from = entries.len() as u32;
        self.storage
            .apply_canonical_delta(&entries, Some(truncate_from))?;
        Ok(chain)
    }

    // --- sessions --------------------------------------------------------

    /// Activates a qualified path's mandate: freezes a dossier of duels
    /// over the current canonical chain and consumes the path.
    ///
    /// # Errors
    ///
    /// - [`MandateError::AlreadyConsumed`] if any session already consumed
    ///   the path (also raised on the atomic double-spend race)
    /// - [`MandateError::NotQualified`] if the path is not `Qualified`
    pub fn start_session(&self, path_id: &PathId) -> Result<Session, EngineError> {
        let path = self.get_path(path_id)?;

        if let Some(session_id) = self.storage.get_consuming_session(path_id)? {
            return Err(MandateError::AlreadyConsumed {
                path_id: *path_id,
                session_id,
            }
            .into());
        }
        if path.status != PathStatus::Qualified {
            return Err(MandateError::NotQualified { path_id: *path_id }.into());
        }
        let mandate_id = path.mandate_id.ok_or(StorageError::Corrupt {
            details: format!("qualified path {path_id} has no mandate"),
        })?;

        // Freeze the dossier against the canon as it stands right now.
        let mut dossier = Dossier::new();
        for position in (0..path.position).rev() {
            let predecessor = self.predecessor_for(position)?;
            if position > 0 && predecessor.is_none() {
                // No determinable predecessor: skip the position.
                continue;
            }
            let ranked = self.rank_at(position, predecessor)?;
            if let Some(duel) = select_duel(position, &ranked) {
                dossier.insert(position, duel);
            }
        }

        let session = Session::new(
            SessionId::new(),
            *path_id,
            mandate_id,
            path.position,
            dossier,
            Utc::now(),
        );

        // Atomic consumed-check + mark + freeze; a concurrent rival gets a
        // conflict here even after passing the pre-check above.
        match self.storage.consume_and_save_session(&session) {
            Ok(()) => {}
            Err(StorageError::Conflict { .. }) => {
                let session_id = self
                    .storage
                    .get_consuming_session(path_id)?
                    .unwrap_or(session.session_id);
                return Err(MandateError::AlreadyConsumed {
                    path_id: *path_id,
                    session_id,
                }
                .into());
            }
            Err(e) => return Err(e.into()),
        }

        info!(
            session_id = %session.session_id,
            path_id = %path_id,
            duels = session.dossier.len(),
            "session started"
        );
        Ok(session)
    }

    /// Commits a session's verdicts.
    ///
    /// Verdicts are screened individually against the frozen dossier;
    /// rejections are reported, not fatal. The initiating path is spent
    /// regardless of how many verdicts survive. With at least one accepted
    /// verdict, a ledger transaction is appended and a cascade re-resolves
    /// the canon from the lowest touched position.
    ///
    /// # Errors
    ///
    /// - [`SessionError::SessionNotFound`] for an unknown session
    /// - [`SessionError::AlreadyCommitted`] for a closed session
    /// - [`SessionError::VoteBudgetExceeded`] when more verdicts are
    ///   submitted than `floor(sqrt(position))`; the session stays active
    pub fn commit_session(
        &self,
        session_id: &SessionId,
        verdicts: &BTreeMap<u32, PathId>,
    ) -> Result<CommitOutcome, EngineError> {
        let mut session = self
            .storage
            .get_session(session_id)?
            .ok_or(SessionError::SessionNotFound {
                session_id: *session_id,
            })?;
        if !session.is_active() {
            return Err(SessionError::AlreadyCommitted {
                session_id: *session_id,
                status: session.status,
            }
            .into());
        }

        let budget = vote_budget(session.position_of_mandate);
        if verdicts.len() > budget as usize {
            return Err(SessionError::VoteBudgetExceeded {
                submitted: verdicts.len(),
                budget,
            }
            .into());
        }

        let ScreenedVerdicts { accepted, rejected } =
            screen_verdicts(&session.dossier, verdicts);

        // Build votes: winner/loser by successor hrönir of the duel's
        // candidates.
        let now = Utc::now();
        let mut votes = Vec::with_capacity(accepted.len());
        for (&position, winner_id) in &accepted {
            let duel = session.dossier.get(&position).ok_or(StorageError::Corrupt {
                details: format!("accepted verdict at {position} missing from dossier"),
            })?;
            let loser_id = duel.opponent_of(winner_id).ok_or(StorageError::Corrupt {
                details: format!("screened winner {winner_id} not in duel"),
            })?;
            let winner = self.get_path(winner_id)?;
            let loser = self.get_path(&loser_id)?;
            votes.push(Vote::new(
                position,
                session.initiating_path,
                winner.successor,
                loser.successor,
                now,
            ));
        }

        // The mandate is consumed no matter what survived screening.
        let mut path = self.get_path(&session.initiating_path)?;
        path.transition(PathStatus::Spent)?;
        session.status = if accepted.is_empty() {
            SessionStatus::Failed
        } else {
            SessionStatus::Committed
        };
        session.committed_verdicts = accepted.clone();

        let transaction = if accepted.is_empty() {
            None
        } else {
            let head = self.storage.get_head_transaction_id()?;
            Some(Transaction::new(
                now,
                head,
                session.session_id,
                session.initiating_path,
                accepted.clone(),
            ))
        };

        self.storage
            .commit_session_state(&session, &path, &votes, transaction.as_ref())?;

        info!(
            session_id = %session.session_id,
            accepted = accepted.len(),
            rejected = rejected.len(),
            status = %session.status,
            "session closed"
        );

        // Re-resolve downstream of the lowest touched position.
        let cascade = match accepted.keys().next() {
            None => None,
            Some(&min_position) => {
                Some(run_cascade(&self.storage, &self.config, min_position, &accepted)?)
            }
        };

        Ok(CommitOutcome {
            session_id: *session_id,
            status: session.status,
            accepted,
            rejected,
            transaction,
            cascade,
        })
    }

    // --- ledger ----------------------------------------------------------

    /// Verifies the transaction chain from HEAD to genesis.
    ///
    /// Returns the number of verified transactions.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] integrity variants on the first mismatch.
    pub fn verify_ledger(&self) -> Result<u64, EngineError> {
        Ok(verify_chain(&self.storage)?)
    }
}
