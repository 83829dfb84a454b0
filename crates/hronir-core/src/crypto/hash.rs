//! Blake3 hashing helpers and the ledger chain hasher.

use thiserror::Error;

/// Size of a Blake3 hash in bytes.
pub const HASH_SIZE: usize = 32;

/// Type alias for a 32-byte hash.
pub type Hash = [u8; HASH_SIZE];

/// Errors that can occur during hash chain operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HashChainError {
    /// The previous hash doesn't match the expected value.
    #[error("hash chain broken: expected {expected}, got {actual}")]
    ChainBroken {
        /// The expected previous hash (hex-encoded).
        expected: String,
        /// The actual previous hash found (hex-encoded).
        actual: String,
    },

    /// A recomputed hash doesn't match the stored value.
    #[error("hash mismatch: expected {expected}, got {actual}")]
    HashMismatch {
        /// The expected hash (hex-encoded).
        expected: String,
        /// The actual hash computed (hex-encoded).
        actual: String,
    },
}

/// Hashes raw content without chain linking.
///
/// This is the content-addressing primitive: a hrönir's identity is the
/// Blake3 digest of its text.
#[must_use]
pub fn hash_content(content: &[u8]) -> Hash {
    *blake3::hash(content).as_bytes()
}

/// Hashes a sequence of length-delimited fields under a domain tag.
///
/// Each field is prefixed with its length as a big-endian `u64` so that
/// adjacent fields cannot be reinterpreted across their boundary. The domain
/// tag keeps digests from different record kinds (path ids, vote ids, ...)
/// disjoint even for identical field content.
#[must_use]
pub fn hash_fields(domain: &[u8], fields: &[&[u8]]) -> Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&(domain.len() as u64).to_be_bytes());
    hasher.update(domain);
    for field in fields {
        hasher.update(&(field.len() as u64).to_be_bytes());
        hasher.update(field);
    }
    *hasher.finalize().as_bytes()
}

/// Hasher for ledger transactions.
///
/// Each transaction hash is computed over `prev_hash || content`, linking
/// every transaction to its predecessor and forming a tamper-evident chain
/// rooted at the genesis hash.
pub struct ChainHasher;

impl ChainHasher {
    /// The zero hash used as the previous link for the genesis transaction.
    pub const GENESIS_PREV_HASH: Hash = [0u8; HASH_SIZE];

    /// Hashes transaction content with chain linking.
    #[must_use]
    pub fn hash_link(content: &[u8], prev_hash: &Hash) -> Hash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(prev_hash);
        hasher.update(content);
        *hasher.finalize().as_bytes()
    }

    /// Verifies that a transaction hash matches the expected value.
    ///
    /// # Errors
    ///
    /// Returns `HashMismatch` if the computed hash doesn't match.
    pub fn verify_link(
        content: &[u8],
        prev_hash: &Hash,
        expected_hash: &Hash,
    ) -> Result<(), HashChainError> {
        let computed = Self::hash_link(content, prev_hash);
        if computed != *expected_hash {
            return Err(HashChainError::HashMismatch {
                expected: hex::encode(expected_hash),
                actual: hex::encode(computed),
            });
        }
        Ok(())
    }

    /// Verifies the chain link between two consecutive transactions.
    ///
    /// # Errors
    ///
    /// Returns `ChainBroken` if the stored previous hash doesn't match the
    /// computed hash of the predecessor.
    pub fn verify_chain_link(
        current_prev_hash: &Hash,
        previous_tx_hash: &Hash,
    ) -> Result<(), HashChainError> {
        if current_prev_hash != previous_tx_hash {
            return Err(HashChainError::ChainBroken {
                expected: hex::encode(previous_tx_hash),
                actual: hex::encode(current_prev_hash),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_hash_content_deterministic() {
        let a = hash_content(b"the original is unfaithful to the translation");
        let b = hash_content(b"the original is unfaithful to the translation");
        assert_eq!(a, b);
        assert_ne!(a, hash_content(b"something else"));
    }

    #[test]
    fn test_hash_fields_domain_separation() {
        let a = hash_fields(b"hronir.path.v1", &[b"abc"]);
        let b = hash_fields(b"hronir.vote.v1", &[b"abc"]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_hash_fields_boundary_separation() {
        // "ab" + "c" must not collide with "a" + "bc".
        let a = hash_fields(b"d", &[b"ab", b"c"]);
        let b = hash_fields(b"d", &[b"a", b"bc"]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_chain_link_verification() {
        let content = b"verdicts";
        let h1 = ChainHasher::hash_link(content, &ChainHasher::GENESIS_PREV_HASH);
        assert!(ChainHasher::verify_link(content, &ChainHasher::GENESIS_PREV_HASH, &h1).is_ok());
        assert!(ChainHasher::verify_link(b"tampered", &ChainHasher::GENESIS_PREV_HASH, &h1).is_err());
        assert!(ChainHasher::verify_chain_link(&h1, &h1).is_ok());
        assert!(ChainHasher::verify_chain_link(&h1, &ChainHasher::GENESIS_PREV_HASH).is_err());
    }
}
