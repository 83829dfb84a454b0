//! Blake3 hashing and hash-chain primitives.
//!
//! All identities in the engine (hrönirs, paths, votes, mandates,
//! transactions) are 32-byte Blake3 digests. Derivation functions live next
//! to the types they identify; this module owns the raw primitives and the
//! chain-linking rules used by the transaction ledger.

mod hash;

pub use hash::{ChainHasher, HASH_SIZE, Hash, HashChainError, hash_content, hash_fields};
