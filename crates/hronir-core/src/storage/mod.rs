//! Persistence abstraction and backends.
//!
//! The engine never touches a database directly: every operation receives a
//! [`Storage`] handle (dependency injection, no global state), and every
//! multi-step mutation the protocol requires to be atomic is a single trait
//! method, so each backend can realize it with its own transaction
//! mechanism. Two backends ship:
//!
//! - [`SqliteStorage`]: `SQLite` with WAL mode, the production backend.
//! - [`MemoryStorage`]: `BTreeMap`s behind a lock, for tests.

mod memory;
mod sqlite;


use std::collections::BTreeMap;

use thiserror::Error;

use crate::ids::{HronirId, PathId, SessionId, TxId};
use crate::ledger::Transaction;
use crate::path::Path;
use crate::rating::Vote;
use crate::session::Session;

pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;

/// Errors that can occur in the persistence layer.
///
/// These propagate to callers unchanged; the engine performs no retries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    /// Database error from `SQLite`.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O error during database operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A record failed to serialize or deserialize.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored value could not be interpreted.
    #[error("corrupt record: {details}")]
    Corrupt {
        /// What failed to parse.
        details: String,
    },

    /// An atomic operation lost a uniqueness race.
    ///
    /// Raised when e.g. two concurrent session starts both pass the
    /// consumed-set pre-check; exactly one insert wins.
    #[error("conflict: {details}")]
    Conflict {
        /// The violated constraint.
        details: String,
    },
}

/// The persistence collaborator.
///
/// Append-only tables (votes, transactions) are never updated or deleted
/// through this interface. The composite methods at the bottom are the
/// protocol's atomic units; implementations must make each one
/// all-or-nothing.
pub trait Storage {
    // --- paths -----------------------------------------------------------

    /// Inserts a path if absent and returns the stored record.
    ///
    /// Re-submitting an existing edge is a no-op that returns the existing
    /// record with its current status, which is what makes path creation
    /// idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert or read-back fails.
    fn upsert_path(&self, path: &Path) -> Result<Path, StorageError>;

    /// Rewrites a path's mutable columns (status, mandate).
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    fn update_path(&self, path: &Path) -> Result<(), StorageError>;

    /// Loads a path by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn get_path(&self, path_id: &PathId) -> Result<Option<Path>, StorageError>;

    /// All paths whose recorded predecessor equals `predecessor`.
    ///
    /// `None` selects the roots (position 0).
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn get_paths_by_predecessor(
        &self,
        predecessor: Option<&HronirId>,
    ) -> Result<Vec<Path>, StorageError>;

    /// The full path set, ordered by (position, path id).
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn all_paths(&self) -> Result<Vec<Path>, StorageError>;

    // --- votes -----------------------------------------------------------

    /// Appends a vote. Append-only; duplicate vote ids are rejected.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Conflict`] on a duplicate id.
    fn append_vote(&self, vote: &Vote) -> Result<(), StorageError>;

    /// Votes at `position` whose winner and loser are both successors of
    /// the given heir set.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn get_votes_for_heirs(
        &self,
        heirs: &[PathId],
        position: u32,
    ) -> Result<Vec<Vote>, StorageError>;

    // --- transactions ----------------------------------------------------

    /// Appends a transaction and advances HEAD to it.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Conflict`] on a duplicate id.
    fn append_transaction(&self, tx: &Transaction) -> Result<(), StorageError>;

    /// Loads a transaction by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn get_transaction(&self, tx_id: &TxId) -> Result<Option<Transaction>, StorageError>;

    /// The current ledger HEAD, or `None` for an empty ledger.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn get_head_transaction_id(&self) -> Result<Option<TxId>, StorageError>;

    // --- sessions and the consumed set -----------------------------------

    /// The session that consumed `path_id`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn get_consuming_session(
        &self,
        path_id: &PathId,
    ) -> Result<Option<SessionId>, StorageError>;

    /// Loads a session by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn get_session(&self, session_id: &SessionId) -> Result<Option<Session>, StorageError>;

    // --- canonical cache -------------------------------------------------

    /// The cached canonical winner at `position`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn canonical_cache_entry(&self, position: u32) -> Result<Option<PathId>, StorageError>;

    /// The full cached canonical chain.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn canonical_cache(&self) -> Result<BTreeMap<u32, PathId>, StorageError>;

    // --- atomic composites -----------------------------------------------

    /// Atomically: verify the initiating path is unconsumed, mark it
    /// consumed by this session, and persist the session with its frozen
    /// dossier.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Conflict`] when another session already
    /// consumed the path (double-spend race).
    fn consume_and_save_session(&self, session: &Session) -> Result<(), StorageError>;

    /// Atomically: rewrite the session (terminal status plus committed
    /// verdicts), rewrite the spent path, append all votes, and append the
    /// transaction (advancing HEAD) when present.
    ///
    /// Nothing is visible unless everything lands.
    ///
    /// # Errors
    ///
    /// Returns an error if any write fails; the whole batch rolls back.
    fn commit_session_state(
        &self,
        session: &Session,
        path: &Path,
        votes: &[Vote],
        transaction: Option<&Transaction>,
    ) -> Result<(), StorageError>;

    /// Atomically applies a cascade's cache delta: set the given entries,
    /// then delete every cached entry at positions `>= truncate_from`.
    /// A cascade never sets a position it also truncates.
    ///
    /// # Errors
    ///
    /// Returns an error if any write fails; the whole delta rolls back.
    fn apply_canonical_delta(
        &self,
        set: &[(u32, PathId)],
        truncate_from: Option<u32>,
    ) -> Result<(), StorageError>;
}
