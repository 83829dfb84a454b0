//! In-memory storage backend for testing.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use crate::ids::{HronirId, PathId, SessionId, TxId, VoteId};
use crate::ledger::Transaction;
use crate::path::Path;
use crate::rating::Vote;
use crate::session::Session;

use super::{Storage, StorageError};

#[derive(Default)]
struct Inner {
    paths: BTreeMap<PathId, Path>,
    votes: BTreeMap<VoteId, Vote>,
    transactions: BTreeMap<TxId, Transaction>,
    head: Option<TxId>,
    consumed: BTreeMap<PathId, SessionId>,
    sessions: BTreeMap<SessionId, Session>,
    canonical: BTreeMap<u32, PathId>,
}

/// `BTreeMap`-backed storage. A single lock serializes writers, which is
/// all the atomicity the composite operations need here.
#[derive(Default)]
pub struct MemoryStorage {
    inner: Mutex<Inner>,
}

impl MemoryStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Storage for MemoryStorage {
    fn upsert_path(&self, path: &Path) -> Result<Path, StorageError> {
        let mut inner = self.lock();
        Ok(inner
            .paths
            .entry(path.path_id)
            .or_insert_with(|| path.clone())
            .clone())
    }

    fn update_path(&self, path: &Path) -> Result<(), StorageError> {
        let mut inner = self.lock();
        inner.paths.insert(path.path_id, path.clone());
        Ok(())
    }

    fn get_path(&self, path_id: &PathId) -> Result<Option<Path>, StorageError> {
        Ok(self.lock().paths.get(path_id).cloned())
    }

    fn get_paths_by_predecessor(
        &self,
        predecessor: Option<&HronirId>,
    ) -> Result<Vec<Path>, StorageError> {
        let inner = self.lock();
        let mut found: Vec<Path> = inner
            .paths
            .values()
            .filter(|p| p.predecessor.as_ref() == predecessor)
            .cloned()
            .collect();
        found.sort_by_key(|p| (p.position, p.path_id));
        Ok(found)
    }

    fn all_paths(&self) -> Result<Vec<Path>, StorageError> {
        let inner = self.lock();
        let mut all: Vec<Path> = inner.paths.values().cloned().collect();
        all.sort_by_key(|p| (p.position, p.path_id));
        Ok(all)
    }

    fn append_vote(&self, vote: &Vote) -> Result<(), StorageError> {
        let mut inner = self.lock();
        if inner.votes.contains_key(&vote.vote_id) {
            return Err(StorageError::Conflict {
                details: format!("vote already recorded: {}", vote.vote_id),
            });
        }
        inner.votes.insert(vote.vote_id, vote.clone());
        Ok(())
    }

    fn get_votes_for_heirs(
        &self,
        heirs: &[PathId],
        position: u32,
    ) -> Result<Vec<Vote>, StorageError> {
        let inner = self.lock();
        let successors: Vec<_> = heirs
            .iter()
            .filter_map(|id| inner.paths.get(id).map(|p| p.successor))
            .collect();

        let mut votes: Vec<Vote> = inner
            .votes
            .values()
            .filter(|v| {
                v.position == position
                    && successors.contains(&v.winner)
                    && successors.contains(&v.loser)
            })
            .cloned()
            .collect();
        votes.sort_by(|a, b| {
            a.recorded_at
                .cmp(&b.recorded_at)
                .then_with(|| a.vote_id.cmp(&b.vote_id))
        });
        Ok(votes)
    }

    fn append_transaction(&self, tx: &Transaction) -> Result<(), StorageError> {
        let mut inner = self.lock();
        if inner.transactions.contains_key(&tx.tx_id) {
            return Err(StorageError::Conflict {
                details: format!("transaction already recorded: {}", tx.tx_id),
            });
        }
        inner.transactions.insert(tx.tx_id, tx.clone());
        inner.head = Some(tx.tx_id);
        Ok(())
    }

    fn get_transaction(&self, tx_id: &TxId) -> Result<Option<Transaction>, StorageError> {
        Ok(self.lock().transactions.get(tx_id).cloned())
    }

    fn get_head_transaction_id(&self) -> Result<Option<TxId>, StorageError> {
        Ok(self.lock().head)
    }

    fn get_consuming_session(
        &self,
        path_id: &PathId,
    ) -> Result<Option<SessionId>, StorageError> {
        Ok(self.lock().consumed.get(path_id).copied())
    }

    fn get_session(&self, session_id: &SessionId) -> Result<Option<Session>, StorageError> {
        Ok(self.lock().sessions.get(session_id).cloned())
    }

    fn canonical_cache_entry(&self, position: u32) -> Result<Option<PathId>, StorageError> {
        Ok(self.lock().canonical.get(&position).copied())
    }

    fn canonical_cache(&self) -> Result<BTreeMap<u32, PathId>, StorageError> {
        Ok(self.lock().canonical.clone())
    }

    fn consume_and_save_session(&self, session: &Session) -> Result<(), StorageError> {
        let mut inner = self.lock();
        if let Some(existing) = inner.consumed.get(&session.initiating_path) {
            return Err(StorageError::Conflict {
                details: format!(
                    "path already consumed by session {existing}: {}",
                    session.initiating_path
                ),
            });
        }
        inner
            .consumed
            .insert(session.initiating_path, session.session_id);
        inner.sessions.insert(session.session_id, session.clone());
        Ok(())
    }

    fn commit_session_state(
        &self,
        session: &Session,
        path: &Path,
        votes: &[Vote],
        transaction: Option<&Transaction>,
    ) -> Result<(), StorageError> {
        let mut inner = self.lock();
        // Validate the appends before mutating anything, so a duplicate
        // vote or transaction leaves the store untouched.
        if let Some(dup) = votes.iter().find(|v| inner.votes.contains_key(&v.vote_id)) {
            return Err(StorageError::Conflict {
                details: format!("vote already recorded: {}", dup.vote_id),
            });
        }
        if let Some(tx) = transaction {
            if inner.transactions.contains_key(&tx.tx_id) {
                return Err(StorageError::Conflict {
                    details: format!("transaction already recorded: {}", tx.tx_id),
                });
            }
        }

        inner.sessions.insert(session.session_id, session.clone());
        inner.paths.insert(path.path_id, path.clone());
        for vote in votes {
            inner.votes.insert(vote.vote_id, vote.clone());
        }
        if let Some(tx) = transaction {
            inner.transactions.insert(tx.tx_id, tx.clone());
            inner.head = Some(tx.tx_id);
        }
        Ok(())
    }

    fn apply_canonical_delta(
        &self,
        set: &[(u32, PathId)],
        truncate_from: Option<u32>,
    ) -> Result<(), StorageError> {
        let mut inner = self.lock();
        for (position, path_id) in set {
            inner.canonical.insert(*position, *path_id);
        }
        if let Some(from) = truncate_from {
            inner.canonical.retain(|&position, _| position < from);
        }
        Ok(())
    }
}
