//! Temporal cascade: downstream re-resolution of the canon.
//!
//! After a verdict batch lands, every position downstream of the lowest
//! touched position must be re-resolved against its (possibly new)
//! predecessor. The cascade walks upward from the trigger position,
//! validating verdicts, keeping still-consistent cache entries, recomputing
//! the rest from ratings, and truncating the chain wherever coherence
//! breaks. Positions below the trigger are never touched.
//!
//! This is also the mechanism that reactivates dormant votes: when an
//! upstream winner flips, the recomputation at each downstream position
//! replays the full vote history for the new lineage, so evidence recorded
//! while that lineage was non-canonical counts immediately.


use std::collections::BTreeMap;

use thiserror::Error;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::ids::{HronirId, PathId};
use crate::rating::rank_heirs;
use crate::storage::{Storage, StorageError};

/// Errors that can occur during a cascade.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CascadeError {
    /// The persistence layer failed; propagated unchanged.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The canonical cache references a path that no longer loads.
    #[error("canonical cache references missing path {path_id} at position {position}")]
    CorruptCache {
        /// The cached position.
        position: u32,
        /// The dangling path id.
        path_id: PathId,
    },

    /// A committed verdict references a path that no longer loads.
    #[error("verdict references missing path {path_id} at position {position}")]
    MissingVerdictPath {
        /// The verdict position.
        position: u32,
        /// The dangling path id.
        path_id: PathId,
    },
}

/// Why the cascade stopped walking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadeHalt {
    /// The previous position has no canonical winner.
    NoCanonicalPredecessor,
    /// A verdict's winner does not descend from the computed predecessor.
    InconsistentVerdict,
    /// No eligible heirs exist at the frontier position.
    NoHeirs,
    /// The configured position guard was reached.
    GuardReached,
}

/// Result of one cascade run.
#[derive(Debug, Clone)]
pub struct CascadeOutcome {
    /// The position the cascade started from.
    pub start: u32,
    /// Cache entries written (changed or newly extended), in position order.
    pub updated: Vec<(u32, PathId)>,
    /// First truncated position, when the chain was cut.
    pub truncated_from: Option<u32>,
    /// Why the walk stopped.
    pub halt: CascadeHalt,
    /// Number of positions visited.
    pub positions_visited: u32,
}

/// Re-resolves the canonical chain from `start` upward and persists the
/// resulting cache delta atomically.
///
/// `verdicts` are the newly committed winners by position; they carry
/// authority over recomputation at their positions but are still validated
/// for lineage coherence. An inconsistent verdict invalidates its position
/// and everything above it.
///
/// # Errors
///
/// Returns [`CascadeError::Storage`] on persistence failures and the
/// corrupt-reference variants when cached or committed state no longer
/// resolves; nothing is written in either case.
pub fn run_cascade<S: Storage>(
    storage: &S,
    config: &EngineConfig,
    start: u32,
    verdicts: &BTreeMap<u32, PathId>,
) -> Result<CascadeOutcome, CascadeError> {
    // Local working copy: later positions must see the winners this run
    // assigns to earlier ones.
    let mut cache = storage.canonical_cache()?;
    let mut updated: Vec<(u32, PathId)> = Vec::new();
    let mut visited = 0u32;

    let mut position = start;
    let (halt, truncated_from) = loop {
        if position >= config.max_positions {
            break (CascadeHalt::GuardReached, None);
        }
        visited += 1;

        // Step 1: predecessor hrönir from the previous position's winner.
        let predecessor: Option<HronirId> = if position == 0 {
            None
        } else {
            match cache.get(&(position - 1)) {
                None => break (CascadeHalt::NoCanonicalPredecessor, Some(position)),
                Some(winner_id) => {
                    let winner = storage.get_path(winner_id)?.ok_or(
                        CascadeError::CorruptCache {
                            position: position - 1,
                            path_id: *winner_id,
                        },
                    )?;
                    Some(winner.successor)
                }
            }
        };

        if let Some(&verdict_winner) = verdicts.get(&position) {
            // Step 2: a fresh verdict rules this position, if coherent.
            let path = storage.get_path(&verdict_winner)?.ok_or(
                CascadeError::MissingVerdictPath {
                    position,
                    path_id: verdict_winner,
                },
            )?;
            if path.position != position || path.predecessor != predecessor {
                debug!(position, %verdict_winner, "verdict inconsistent with predecessor");
                break (CascadeHalt::InconsistentVerdict, Some(position));
            }
            if cache.get(&position) != Some(&verdict_winner) {
                updated.push((position, verdict_winner));
            }
            cache.insert(position, verdict_winner);
        } else {
            // Step 3: keep a consistent cache entry, else recompute.
            let keep = match cache.get(&position) {
                None => false,
                Some(cached_id) => storage
                    .get_path(cached_id)?
                    .is_some_and(|p| p.position == position && p.predecessor == predecessor),
            };
            if !keep {
                let heirs: Vec<_> = storage
                    .get_paths_by_predecessor(predecessor.as_ref())?
                    .into_iter()
                    .filter(|p| p.position == position)
                    .collect();
                let heir_ids: Vec<PathId> = heirs.iter().map(|p| p.path_id).collect();
                let votes = storage.get_votes_for_heirs(&heir_ids, position)?;
                let ranked = rank_heirs(&heirs, &votes);

                match ranked.first() {
                    None => break (CascadeHalt::NoHeirs, Some(position)),
                    Some(top) => {
                        if cache.get(&position) != Some(&top.path_id) {
                            updated.push((position, top.path_id));
                        }
                        cache.insert(position, top.path_id);
                    }
                }
            }
        }

        position += 1;
    };

    // Entries at or past the cut are superseded by the truncation.
    if let Some(from) = truncated_from {
        updated.retain(|&(p, _)| p < from);
    }

    storage.apply_canonical_delta(&updated, truncated_from)?;

    info!(
        start,
        updates = updated.len(),
        ?truncated_from,
        ?halt,
        "cascade complete"
    );

    Ok(CascadeOutcome {
        start,
        updated,
        truncated_from,
        halt,
        positions_visited: visited,
    })
}
