//! Path graph and canonical resolver.
//!
//! The canonical path is never authoritative state: it is a pure function
//! of the full path set, recomputed on demand and cached. The resolver
//! scores candidates by quadratic influence and walks the DAG greedily from
//! the root, strictly advancing position, so malformed predecessor links
//! can never loop.

mod resolver;

#[cfg(test)]
mod tests;

pub use resolver::{CandidateScore, CanonEntry, influence, resolve_canonical_path, score_candidates};
