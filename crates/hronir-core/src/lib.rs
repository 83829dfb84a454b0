//! # hronir-core
//!
//! Canon consensus engine for a collaborative, branching narrative corpus.
//!
//! Writers propose competing continuations ("hrönirs") at every narrative
//! position; this crate derives the single canonical path purely from
//! distributed voting evidence, at any time, reproducibly. The moving
//! parts:
//!
//! - [`canon`]: the path DAG and quadratic-influence canonical resolver.
//! - [`rating`]: lineage-filtered Elo replay and entropy-maximizing duel
//!   selection.
//! - [`mandate`] / [`session`]: one-time voting rights, dossier freezing,
//!   and the double-spend guard.
//! - [`cascade`]: downstream re-resolution when the canon moves.
//! - [`ledger`]: the hash-chained, Merkle-provable verdict log.
//! - [`engine`]: the facade wiring it all to a [`storage`] backend.
//!
//! The engine is a library: it spawns no threads and opens no sockets.
//! Callers inject a [`storage::Storage`] handle and drive it from their own
//! request workers; every multi-step operation is atomic at the storage
//! layer.
//!
//! # Example
//!
//! ```
//! use hronir_core::config::EngineConfig;
//! use hronir_core::content::{ContentStore, MemoryContentStore};
//! use hronir_core::engine::ConsensusEngine;
//! use hronir_core::storage::MemoryStorage;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let content = MemoryContentStore::new();
//! let engine = ConsensusEngine::new(MemoryStorage::new(), EngineConfig::default());
//!
//! let origin = content.store_text("In the beginning, a mirror.")?;
//! let rival = content.store_text("In the beginning, a labyrinth.")?;
//! engine.create_path(0, None, origin)?;
//! engine.create_path(0, None, rival)?;
//!
//! let chain = engine.canonical_path()?;
//! assert_eq!(chain.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod canon;
pub mod cascade;
pub mod config;
pub mod content;
pub mod crypto;
pub mod engine;
pub mod ids;
pub mod ledger;
pub mod mandate;
pub mod path;
pub mod rating;
pub mod session;
pub mod storage;
