//! The hash-chained, Merkle-provable transaction ledger.
//!
//! Two independent integrity layers cover every committed verdict:
//!
//! 1. Each [`Transaction`] chains to its predecessor through its id, rooted
//!    at a HEAD pointer, so the whole history is tamper-evident.
//! 2. Within one transaction, the verdict batch is committed to by a binary
//!    Merkle tree, so a single verdict's inclusion can be proven without the
//!    rest of the batch.
//!
//! Any mismatch found here is an integrity failure: it is surfaced to the
//! caller and halts dependent operations rather than being skipped.

mod merkle;
mod transaction;


use std::collections::HashSet;

use thiserror::Error;
use tracing::debug;

use crate::ids::TxId;
use crate::storage::{Storage, StorageError};

pub use merkle::{
    ProofStep, Side, compute_merkle_root, empty_root, generate_merkle_proof,
    trust_check_sampling, verify_merkle_proof,
};
pub use transaction::{Transaction, verdict_leaf, verdict_leaves};

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LedgerError {
    /// The persistence layer failed; propagated unchanged.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A transaction's stored id doesn't match its recomputed id.
    #[error("ledger chain broken at {tx_id}: {details}")]
    ChainBroken {
        /// The transaction where the chain broke.
        tx_id: TxId,
        /// What mismatched.
        details: String,
    },

    /// A transaction's Merkle root doesn't cover its verdicts.
    #[error("merkle root mismatch in transaction {tx_id}")]
    MerkleMismatch {
        /// The offending transaction.
        tx_id: TxId,
    },

    /// A chained transaction is missing from storage.
    #[error("transaction not found: {tx_id}")]
    MissingTransaction {
        /// The id that could not be resolved.
        tx_id: TxId,
    },
}

/// Verifies the whole chain from HEAD back to genesis.
///
/// Every transaction's id and Merkle root are recomputed from stored
/// content. Returns the number of verified transactions; an empty ledger
/// verifies trivially as 0.
///
/// # Errors
///
/// Returns [`LedgerError::ChainBroken`] or [`LedgerError::MerkleMismatch`]
/// on the first integrity failure, [`LedgerError::MissingTransaction`] if a
/// chained transaction cannot be loaded.
pub fn verify_chain<S: Storage>(storage: &S) -> Result<u64, LedgerError> {
    let mut cursor = storage.get_head_transaction_id()?;
    let mut verified = 0u64;
    let mut seen: HashSet<TxId> = HashSet::new();

    while let Some(tx_id) = cursor {
        if !seen.insert(tx_id) {
            return Err(LedgerError::ChainBroken {
                tx_id,
                details: "prev links form a cycle".to_string(),
            });
        }
        let tx = storage
            .get_transaction(&tx_id)?
            .ok_or(LedgerError::MissingTransaction { tx_id })?;

        if tx.expected_tx_id() != tx.tx_id {
            return Err(LedgerError::ChainBroken {
                tx_id,
                details: "stored id does not match recomputed content hash".to_string(),
            });
        }
        if tx.expected_merkle_root() != tx.merkle_root {
            return Err(LedgerError::MerkleMismatch { tx_id });
        }

        verified += 1;
        cursor = tx.prev_tx_id;
    }

    debug!(verified, "ledger chain verified");
    Ok(verified)
}
