//! Tests for the canonical resolver.

use crate::crypto::hash_content;
use crate::ids::HronirId;
use crate::path::Path;

use super::*;

fn hronir(text: &str) -> HronirId {
    HronirId::from_bytes(hash_content(text.as_bytes()))
}

fn path(position: u32, pred: Option<&str>, succ: &str) -> Path {
    Path::new(position, pred.map(hronir), hronir(succ)).expect("valid path")
}

#[test]
fn test_empty_graph_empty_chain() {
    assert!(resolve_canonical_path(&[], 100).is_empty());
}

#[test]
fn test_two_roots_no_votes_lexicographic_tiebreak() {
    let a = path(0, None, "aleph");
    let b = path(0, None, "zahir");
    let chain = resolve_canonical_path(&[a.clone(), b.clone()], 100);

    assert_eq!(chain.len(), 1);
    assert_eq!(chain[0].winner, a.path_id.min(b.path_id));
    assert_eq!(chain[0].scores.len(), 2);
}

#[test]
fn test_score_counts_children_influence() {
    let a = path(0, None, "aleph");
    let b = path(0, None, "zahir");
    let child_a = path(1, Some("aleph"), "aleph-1");
    let child_b1 = path(1, Some("zahir"), "zahir-1");
    let child_b2 = path(1, Some("zahir"), "zahir-2");

    let chain = resolve_canonical_path(&[a.clone(), b.clone(), child_a, child_b1, child_b2], 100);
    assert_eq!(chain[0].winner, b.path_id, "two children outweigh one");
}

#[test]
fn test_tied_scores_fall_to_raw_child_count() {
    // Root A: one child with four grandchildren -> 1 + sqrt(4) = 3.0.
    // Root B: two children, one with a single grandchild -> 2 + 1 = 3.0.
    // Scores tie; B wins on raw child count.
    let a = path(0, None, "aleph");
    let b = path(0, None, "zahir");
    let mut paths = vec![
        a.clone(),
        b.clone(),
        path(1, Some("aleph"), "aleph-1"),
        path(1, Some("zahir"), "zahir-1"),
        path(1, Some("zahir"), "zahir-2"),
        path(2, Some("zahir-1"), "zahir-1-1"),
    ];
    for i in 0..4 {
        paths.push(path(2, Some("aleph-1"), &format!("aleph-1-{i}")));
    }

    let chain = resolve_canonical_path(&paths, 100);
    let a_score = chain[0].scores.iter().find(|s| s.path_id == a.path_id).unwrap();
    let b_score = chain[0].scores.iter().find(|s| s.path_id == b.path_id).unwrap();
    assert!((a_score.score - b_score.score).abs() < 1e-9, "scores tie");
    assert_eq!(chain[0].winner, b.path_id, "child count breaks the tie");
}

#[test]
fn test_influence_is_quadratic() {
    assert!((influence(0) - 1.0).abs() < f64::EPSILON);
    assert!((influence(1) - 2.0).abs() < f64::EPSILON);
    assert!((influence(4) - 3.0).abs() < f64::EPSILON);
    assert!((influence(9) - 4.0).abs() < f64::EPSILON);
}

#[test]
fn test_grandchildren_weigh_through_sqrt() {
    // Root A: one child with four grandchildren -> score 1 + sqrt(4) = 3.
    // Root B: two childless children -> score 1 + 1 = 2.
    let a = path(0, None, "a");
    let b = path(0, None, "b");
    let a_child = path(1, Some("a"), "a1");
    let b_child1 = path(1, Some("b"), "b1");
    let b_child2 = path(1, Some("b"), "b2");
    let mut paths = vec![a.clone(), b.clone(), a_child, b_child1, b_child2];
    for i in 0..4 {
        paths.push(path(2, Some("a1"), &format!("a1-{i}")));
    }

    let chain = resolve_canonical_path(&paths, 100);
    assert_eq!(chain[0].winner, a.path_id);
    let a_score = chain[0]
        .scores
        .iter()
        .find(|s| s.path_id == a.path_id)
        .expect("a scored");
    assert!((a_score.score - 3.0).abs() < 1e-9);
}

#[test]
fn test_walk_follows_winner_lineage() {
    let root = path(0, None, "root");
    let left = path(1, Some("root"), "left");
    let right = path(1, Some("root"), "right");
    // Build depth under "left" so it wins position 1.
    let left_child = path(2, Some("left"), "left-deep");
    let chain = resolve_canonical_path(
        &[root.clone(), left.clone(), right.clone(), left_child.clone()],
        100,
    );

    assert_eq!(chain.len(), 3);
    assert_eq!(chain[0].winner, root.path_id);
    assert_eq!(chain[1].winner, left.path_id);
    assert_eq!(chain[2].winner, left_child.path_id);
}

#[test]
fn test_walk_stops_where_candidates_end() {
    let root = path(0, None, "root");
    // An orphan at position 5 is unreachable by the walk.
    let orphan = path(5, Some("nowhere"), "lost");
    let chain = resolve_canonical_path(&[root, orphan], 100);
    assert_eq!(chain.len(), 1);
}

#[test]
fn test_malformed_predecessor_cannot_loop() {
    // A "cycle": x's successor is y, y's successor is x, both at wrong
    // positions. The walk strictly advances position, so it terminates.
    let root = path(0, None, "x");
    let forward = path(1, Some("x"), "y");
    let back = path(2, Some("y"), "x");
    let chain = resolve_canonical_path(&[root, forward, back], 10);

    // Position 3 asks for children of "x" AT position 3; the only edge from
    // "x" sits at position 1, so the walk stops.
    assert_eq!(chain.len(), 3);
}

#[test]
fn test_max_positions_bounds_walk() {
    let mut paths = vec![path(0, None, "h0")];
    for i in 0..50u32 {
        paths.push(path(i + 1, Some(&format!("h{i}")), &format!("h{}", i + 1)));
    }
    let chain = resolve_canonical_path(&paths, 10);
    assert_eq!(chain.len(), 10);
}

#[test]
fn test_determinism_across_input_order() {
    let mut paths = vec![
        path(0, None, "a"),
        path(0, None, "b"),
        path(1, Some("a"), "a1"),
        path(1, Some("b"), "b1"),
        path(2, Some("a1"), "a2"),
    ];
    let forward = resolve_canonical_path(&paths, 100);
    paths.reverse();
    let reversed = resolve_canonical_path(&paths, 100);
    assert_eq!(forward, reversed);
}
