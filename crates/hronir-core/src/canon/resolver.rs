//! Quadratic-influence scoring and the greedy canonical walk.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ids::{HronirId, PathId};
use crate::path::Path;

/// Score of one candidate at a position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    /// The candidate path.
    pub path_id: PathId,
    /// Its proposed successor hrönir.
    pub successor: HronirId,
    /// Quadratic-influence score (sum over the successor's children).
    pub score: f64,
    /// Raw child count of the successor, the first tiebreak.
    pub child_count: usize,
}

/// One resolved position of the canonical chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonEntry {
    /// The position.
    pub position: u32,
    /// The winning path.
    pub winner: PathId,
    /// The winner's successor hrönir (the next position's predecessor).
    pub successor: HronirId,
    /// All candidates considered, ordered winner-first.
    pub scores: Vec<CandidateScore>,
}

/// Index of paths by their predecessor hrönir.
///
/// `None` keys the roots (position 0).
type ChildIndex<'a> = HashMap<Option<HronirId>, Vec<&'a Path>>;

fn build_child_index(paths: &[Path]) -> ChildIndex<'_> {
    let mut index: ChildIndex<'_> = HashMap::new();
    for path in paths {
        index.entry(path.predecessor).or_default().push(path);
    }
    index
}

/// Influence of a hrönir: `1 + sqrt(#children)`.
#[must_use]
pub fn influence(child_count: usize) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    {
        1.0 + (child_count as f64).sqrt()
    }
}

fn children_of<'a, 'i>(index: &'i ChildIndex<'a>, hronir: HronirId) -> &'i [&'a Path] {
    index.get(&Some(hronir)).map_or(&[], Vec::as_slice)
}

/// Scores every candidate continuing `predecessor` at `position`.
///
/// A candidate's score is the summed influence of its successor's children.
/// The returned list is ordered winner-first: descending score, then
/// descending raw child count, then ascending path id. The id tiebreak is
/// arbitrary but stable; it carries no semantic meaning.
#[must_use]
pub fn score_candidates(
    paths: &[Path],
    position: u32,
    predecessor: Option<HronirId>,
) -> Vec<CandidateScore> {
    let index = build_child_index(paths);
    score_with_index(&index, position, predecessor)
}

fn score_with_index(
    index: &ChildIndex<'_>,
    position: u32,
    predecessor: Option<HronirId>,
) -> Vec<CandidateScore> {
    let Some(candidates) = index.get(&predecessor) else {
        return Vec::new();
    };

    let mut scores: Vec<CandidateScore> = candidates
        .iter()
        .filter(|p| p.position == position)
        .map(|p| {
            let children = children_of(index, p.successor);
            let score = children
                .iter()
                .map(|child| influence(children_of(index, child.successor).len()))
                .sum();
            CandidateScore {
                path_id: p.path_id,
                successor: p.successor,
                score,
                child_count: children.len(),
            }
        })
        .collect();

    scores.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.child_count.cmp(&a.child_count))
            .then_with(|| a.path_id.cmp(&b.path_id))
    });
    scores
}

/// Computes the canonical chain from the full path set.
///
/// Walks greedily from the root (`predecessor = None`), taking the
/// top-scored candidate at each position and feeding its successor forward
/// as the next predecessor. The walk stops at the first position with no
/// candidates, or after `max_positions` steps. A position with zero votes
/// and zero children still resolves as long as candidates exist.
///
/// Given identical path sets this produces byte-identical output on every
/// run: all inputs are sorted and all tiebreaks are total.
#[must_use]
pub fn resolve_canonical_path(paths: &[Path], max_positions: u32) -> Vec<CanonEntry> {
    let index = build_child_index(paths);
    let mut chain = Vec::new();
    let mut predecessor: Option<HronirId> = None;

    for position in 0..max_positions {
        let scores = score_with_index(&index, position, predecessor);
        let Some(winner) = scores.first() else {
            break;
        };
        let (winner, successor) = (winner.path_id, winner.successor);
        chain.push(CanonEntry {
            position,
            winner,
            successor,
            scores,
        });
        predecessor = Some(successor);
    }
    chain
}
