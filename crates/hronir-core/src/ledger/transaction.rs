//! Hash-chained ledger transactions.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::{ChainHasher, Hash, hash_fields};
use crate::ids::{PathId, SessionId, TxId};

use super::merkle::compute_merkle_root;

/// Domain tag for verdict leaf encoding inside the per-transaction Merkle
/// tree.
const VERDICT_LEAF_DOMAIN: &[u8] = b"hronir.verdict.v1";

/// A committed verdict batch, chained to its predecessor by hash.
///
/// `tx_id` is `H(prev || canonical content)`, so any mutation of a stored
/// transaction, or any re-ordering of the chain, breaks verification from
/// that point forward. `merkle_root` commits to the verdict batch
/// independently, enabling per-verdict inclusion proofs without replaying
/// the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Chain-linked content hash of this transaction.
    pub tx_id: TxId,
    /// When the batch was committed.
    pub timestamp: DateTime<Utc>,
    /// The ledger head this transaction was appended after; `None` for the
    /// genesis transaction.
    pub prev_tx_id: Option<TxId>,
    /// The session that produced the batch.
    pub session_id: SessionId,
    /// The path whose mandate was consumed.
    pub initiating_path: PathId,
    /// Accepted verdicts, keyed by position (sorted by construction).
    pub verdicts: BTreeMap<u32, PathId>,
    /// Merkle root over the verdict leaves.
    pub merkle_root: Hash,
}

/// Encodes one verdict as a Merkle leaf.
#[must_use]
pub fn verdict_leaf(position: u32, winner: &PathId) -> Vec<u8> {
    let mut leaf = Vec::with_capacity(VERDICT_LEAF_DOMAIN.len() + 4 + 32);
    leaf.extend_from_slice(VERDICT_LEAF_DOMAIN);
    leaf.extend_from_slice(&position.to_be_bytes());
    leaf.extend_from_slice(winner.as_bytes());
    leaf
}

/// Ordered Merkle leaves for a verdict map.
///
/// `BTreeMap` iteration is position-ascending, which fixes the leaf order.
#[must_use]
pub fn verdict_leaves(verdicts: &BTreeMap<u32, PathId>) -> Vec<Vec<u8>> {
    verdicts
        .iter()
        .map(|(position, winner)| verdict_leaf(*position, winner))
        .collect()
}

impl Transaction {
    /// Builds a transaction, deriving its Merkle root and chained id.
    #[must_use]
    pub fn new(
        timestamp: DateTime<Utc>,
        prev_tx_id: Option<TxId>,
        session_id: SessionId,
        initiating_path: PathId,
        verdicts: BTreeMap<u32, PathId>,
    ) -> Self {
        let merkle_root = compute_merkle_root(&verdict_leaves(&verdicts));
        let tx_id = Self::derive_tx_id(
            timestamp,
            prev_tx_id.as_ref(),
            &session_id,
            &initiating_path,
            &verdicts,
            &merkle_root,
        );
        Self {
            tx_id,
            timestamp,
            prev_tx_id,
            session_id,
            initiating_path,
            verdicts,
            merkle_root,
        }
    }

    /// Recomputes the id this transaction should carry.
    ///
    /// Used by chain verification to detect tampered content.
    #[must_use]
    pub fn expected_tx_id(&self) -> TxId {
        Self::derive_tx_id(
            self.timestamp,
            self.prev_tx_id.as_ref(),
            &self.session_id,
            &self.initiating_path,
            &self.verdicts,
            &self.merkle_root,
        )
    }

    /// Recomputes the Merkle root this transaction's verdicts produce.
    #[must_use]
    pub fn expected_merkle_root(&self) -> Hash {
        compute_merkle_root(&verdict_leaves(&self.verdicts))
    }

    fn derive_tx_id(
        timestamp: DateTime<Utc>,
        prev_tx_id: Option<&TxId>,
        session_id: &SessionId,
        initiating_path: &PathId,
        verdicts: &BTreeMap<u32, PathId>,
        merkle_root: &Hash,
    ) -> TxId {
        // Canonical content encoding: fixed field order, verdicts
        // position-ascending via the BTreeMap.
        let mut content = Vec::new();
        let nanos = timestamp.timestamp_nanos_opt().unwrap_or(0);
        content.extend_from_slice(&nanos.to_be_bytes());
        content.extend_from_slice(session_id.to_string().as_bytes());
        content.extend_from_slice(initiating_path.as_bytes());
        content.extend_from_slice(merkle_root);
        for (position, winner) in verdicts {
            content.extend_from_slice(&position.to_be_bytes());
            content.extend_from_slice(winner.as_bytes());
        }

        let content_hash = hash_fields(b"hronir.transaction.v1", &[&content]);
        let prev: Hash = prev_tx_id.map_or(ChainHasher::GENESIS_PREV_HASH, |id| *id.as_bytes());
        TxId::from_bytes(ChainHasher::hash_link(&content_hash, &prev))
    }
}
