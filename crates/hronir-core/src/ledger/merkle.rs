//! Binary Merkle tree over a transaction's verdict batch.
//!
//! Conventions, applied identically for construction and verification:
//!
//! - Leaf nodes are `H(LEAF_TAG || leaf)`; internal nodes are
//!   `H(NODE_TAG || left || right)`. The tags keep a leaf from ever being
//!   reinterpreted as an internal node.
//! - A layer with an odd node count duplicates its last node.
//! - The root of an empty leaf set is `H(LEAF_TAG)`, the canonical empty
//!   root.

use serde::{Deserialize, Serialize};

use crate::crypto::Hash;

const LEAF_TAG: &[u8] = b"hronir.merkle.leaf.v1";
const NODE_TAG: &[u8] = b"hronir.merkle.node.v1";

/// Which side of the parent a proof sibling sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// The sibling is the left child; the running hash is the right.
    Left,
    /// The sibling is the right child; the running hash is the left.
    Right,
}

/// One step of a Merkle inclusion proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    /// The sibling hash at this level.
    pub sibling: Hash,
    /// Which side the sibling is on.
    pub side: Side,
}

fn hash_leaf(leaf: &[u8]) -> Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(LEAF_TAG);
    hasher.update(leaf);
    *hasher.finalize().as_bytes()
}

fn hash_node(left: &Hash, right: &Hash) -> Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(NODE_TAG);
    hasher.update(left);
    hasher.update(right);
    *hasher.finalize().as_bytes()
}

/// The canonical root of an empty leaf set.
#[must_use]
pub fn empty_root() -> Hash {
    hash_leaf(&[])
}

fn leaf_layer(leaves: &[Vec<u8>]) -> Vec<Hash> {
    leaves.iter().map(|l| hash_leaf(l)).collect()
}

fn parent_layer(layer: &[Hash]) -> Vec<Hash> {
    let mut next = Vec::with_capacity(layer.len().div_ceil(2));
    let mut i = 0;
    while i < layer.len() {
        let left = layer[i];
        // Odd layer: the last node pairs with itself.
        let right = if i + 1 < layer.len() { layer[i + 1] } else { left };
        next.push(hash_node(&left, &right));
        i += 2;
    }
    next
}

/// Computes the Merkle root over ordered leaves.
#[must_use]
pub fn compute_merkle_root(leaves: &[Vec<u8>]) -> Hash {
    if leaves.is_empty() {
        return empty_root();
    }
    let mut layer = leaf_layer(leaves);
    while layer.len() > 1 {
        layer = parent_layer(&layer);
    }
    layer[0]
}

/// Generates an inclusion proof for the leaf at `index`.
///
/// Returns `None` when `index` is out of range or the leaf set is empty.
#[must_use]
pub fn generate_merkle_proof(leaves: &[Vec<u8>], index: usize) -> Option<Vec<ProofStep>> {
    if index >= leaves.len() {
        return None;
    }
    let mut proof = Vec::new();
    let mut layer = leaf_layer(leaves);
    let mut idx = index;

    while layer.len() > 1 {
        let (sibling, side) = if idx % 2 == 0 {
            let sib = if idx + 1 < layer.len() { layer[idx + 1] } else { layer[idx] };
            (sib, Side::Right)
        } else {
            (layer[idx - 1], Side::Left)
        };
        proof.push(ProofStep { sibling, side });
        layer = parent_layer(&layer);
        idx /= 2;
    }
    Some(proof)
}

/// Verifies an inclusion proof for `leaf` against `root`.
///
/// `index` and `total` must match the values the proof was generated for;
/// they pin the leaf's place in the tree so a proof cannot be replayed at a
/// different index. Any single-bit change to the leaf, the root, or a proof
/// step makes this return `false`.
#[must_use]
pub fn verify_merkle_proof(
    leaf: &[u8],
    root: &Hash,
    proof: &[ProofStep],
    index: usize,
    total: usize,
) -> bool {
    if total == 0 || index >= total {
        return false;
    }
    // A proof's length must match the tree depth for this leaf count.
    if proof.len() != tree_depth(total) {
        return false;
    }

    let mut hash = hash_leaf(leaf);
    let mut idx = index;
    let mut width = total;
    for step in proof {
        // The claimed side must agree with the index's position in its
        // layer, including the duplicated-last-node case.
        let expected_side = if idx % 2 == 0 { Side::Right } else { Side::Left };
        if step.side != expected_side {
            return false;
        }
        if idx % 2 == 0 && idx + 1 >= width && step.sibling != hash {
            // Lone last node: its sibling is itself.
            return false;
        }
        hash = match step.side {
            Side::Left => hash_node(&step.sibling, &hash),
            Side::Right => hash_node(&hash, &step.sibling),
        };
        idx /= 2;
        width = width.div_ceil(2);
    }
    hash == *root
}

fn tree_depth(total: usize) -> usize {
    let mut depth = 0;
    let mut width = total;
    while width > 1 {
        width = width.div_ceil(2);
        depth += 1;
    }
    depth
}

/// Verifies a deterministic sample of leaves against `root`.
///
/// Sampled indices stride evenly through the leaf set, so repeated runs
/// check the same leaves; callers wanting randomized spot checks choose
/// their own indices and call [`verify_merkle_proof`] directly. An empty
/// leaf set is trusted only when `root` is the canonical empty root.
#[must_use]
pub fn trust_check_sampling(leaves: &[Vec<u8>], root: &Hash, sample_size: usize) -> bool {
    if leaves.is_empty() {
        return *root == empty_root();
    }
    if sample_size == 0 {
        return true;
    }

    let stride = (leaves.len() / sample_size).max(1);
    let mut checked = 0;
    let mut index = 0;
    while index < leaves.len() && checked < sample_size {
        let Some(proof) = generate_merkle_proof(leaves, index) else {
            return false;
        };
        if !verify_merkle_proof(&leaves[index], root, &proof, index, leaves.len()) {
            return false;
        }
        checked += 1;
        index += stride;
    }
    true
}
