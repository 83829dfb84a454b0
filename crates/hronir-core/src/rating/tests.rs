//! Tests for rating replay and duel selection.

use chrono::{TimeZone, Utc};

use crate::crypto::hash_content;
use crate::ids::{HronirId, PathId};
use crate::path::Path;

use super::*;

fn hronir(text: &str) -> HronirId {
    HronirId::from_bytes(hash_content(text.as_bytes()))
}

fn heir(position: u32, pred: Option<HronirId>, succ: &str) -> Path {
    Path::new(position, pred, hronir(succ)).expect("valid path")
}

fn vote_at(seq: i64, position: u32, mandate: PathId, winner: HronirId, loser: HronirId) -> Vote {
    let at = Utc.timestamp_opt(1_700_000_000 + seq, 0).unwrap();
    Vote::new(position, mandate, winner, loser, at)
}

#[test]
fn test_no_heirs_no_ranking() {
    assert!(rank_heirs(&[], &[]).is_empty());
}

#[test]
fn test_unvoted_heirs_rank_by_path_id() {
    let pred = hronir("root");
    let a = heir(1, Some(pred), "alpha");
    let b = heir(1, Some(pred), "beta");
    let ranked = rank_heirs(&[a.clone(), b.clone()], &[]);

    assert_eq!(ranked.len(), 2);
    assert!((ranked[0].rating - BASE_RATING).abs() < f64::EPSILON);
    let expected_first = a.path_id.min(b.path_id);
    assert_eq!(ranked[0].path_id, expected_first);
}

#[test]
fn test_two_of_three_elo_scenario() {
    // A wins, loses, wins against B: standard K=32 computation lands on
    // roughly 1515 / 1485 with A ranked first.
    let pred = hronir("root");
    let a = heir(1, Some(pred), "alpha");
    let b = heir(1, Some(pred), "beta");
    let mandate = a.path_id;

    let votes = vec![
        vote_at(1, 1, mandate, a.successor, b.successor),
        vote_at(2, 1, mandate, b.successor, a.successor),
        vote_at(3, 1, mandate, a.successor, b.successor),
    ];

    let ranked = rank_heirs(&[a.clone(), b.clone()], &votes);
    assert_eq!(ranked[0].path_id, a.path_id);
    assert_eq!(ranked[0].wins, 2);
    assert_eq!(ranked[0].losses, 1);
    assert!((ranked[0].rating - 1515.0).abs() < 1.0, "got {}", ranked[0].rating);
    assert!((ranked[1].rating - 1485.0).abs() < 1.0, "got {}", ranked[1].rating);
}

#[test]
fn test_replay_order_is_by_recorded_at_then_vote_id() {
    let pred = hronir("root");
    let a = heir(1, Some(pred), "alpha");
    let b = heir(1, Some(pred), "beta");
    let mandate = a.path_id;

    let early = vote_at(1, 1, mandate, a.successor, b.successor);
    let late = vote_at(9, 1, mandate, b.successor, a.successor);

    // Submission order must not matter.
    let forward = rank_heirs(&[a.clone(), b.clone()], &[early.clone(), late.clone()]);
    let shuffled = rank_heirs(&[a.clone(), b.clone()], &[late, early]);
    assert_eq!(forward[0].path_id, shuffled[0].path_id);
    assert!((forward[0].rating - shuffled[0].rating).abs() < f64::EPSILON);
}

#[test]
fn test_votes_outside_heir_set_are_ignored() {
    let pred = hronir("root");
    let a = heir(1, Some(pred), "alpha");
    let b = heir(1, Some(pred), "beta");
    let stranger = hronir("stranger");

    let votes = vec![vote_at(1, 1, a.path_id, stranger, a.successor)];
    let ranked = rank_heirs(&[a, b], &votes);
    assert!(ranked.iter().all(|h| (h.rating - BASE_RATING).abs() < f64::EPSILON));
    assert!(ranked.iter().all(|h| h.wins == 0 && h.losses == 0));
}

#[test]
fn test_duel_degenerate_cases() {
    let pred = hronir("root");
    let a = heir(1, Some(pred), "alpha");

    assert!(select_duel(1, &[]).is_none());

    let one = rank_heirs(&[a.clone()], &[]);
    assert!(select_duel(1, &one).is_none());
}

#[test]
fn test_exactly_two_heirs_is_the_duel() {
    let pred = hronir("root");
    let a = heir(1, Some(pred), "alpha");
    let b = heir(1, Some(pred), "beta");
    let ranked = rank_heirs(&[a.clone(), b.clone()], &[]);
    let duel = select_duel(1, &ranked).expect("duel exists");

    assert!(duel.has_candidate(&a.path_id));
    assert!(duel.has_candidate(&b.path_id));
    // Equal ratings: a coin flip carries a full bit of information.
    assert!((duel.entropy - 1.0).abs() < 1e-9);
}

#[test]
fn test_duel_prefers_closest_ratings() {
    let pred = hronir("root");
    let a = heir(1, Some(pred), "alpha");
    let b = heir(1, Some(pred), "beta");
    let c = heir(1, Some(pred), "gamma");
    let mandate = a.path_id;

    // a far ahead; b and c untouched at base rating.
    let votes: Vec<Vote> = (0..6)
        .map(|i| {
            let (w, l) = if i % 2 == 0 {
                (a.successor, b.successor)
            } else {
                (a.successor, c.successor)
            };
            vote_at(i, 1, mandate, w, l)
        })
        .collect();

    let ranked = rank_heirs(&[a.clone(), b.clone(), c.clone()], &votes);
    assert_eq!(ranked[0].path_id, a.path_id);

    let duel = select_duel(1, &ranked).expect("duel exists");
    // The informative pair is the two trailing heirs, not the runaway leader.
    assert!(duel.has_candidate(&b.path_id));
    assert!(duel.has_candidate(&c.path_id));
}

#[test]
fn test_entropy_tie_prefers_higher_rated_pair() {
    let pred = hronir("root");
    let a = heir(1, Some(pred), "alpha");
    let b = heir(1, Some(pred), "beta");
    let c = heir(1, Some(pred), "gamma");

    // No votes: all pairs tie at one bit. The first pair scanned in
    // descending-rating order must win.
    let ranked = rank_heirs(&[a, b, c], &[]);
    let duel = select_duel(1, &ranked).expect("duel exists");
    assert_eq!(duel.candidate_a, ranked[0].path_id);
    assert_eq!(duel.candidate_b, ranked[1].path_id);
}

#[test]
fn test_opponent_of() {
    let pred = hronir("root");
    let a = heir(1, Some(pred), "alpha");
    let b = heir(1, Some(pred), "beta");
    let ranked = rank_heirs(&[a.clone(), b.clone()], &[]);
    let duel = select_duel(1, &ranked).expect("duel exists");

    assert_eq!(duel.opponent_of(&duel.candidate_a), Some(duel.candidate_b));
    assert_eq!(duel.opponent_of(&duel.candidate_b), Some(duel.candidate_a));
    let outsider = heir(1, Some(pred), "delta");
    assert_eq!(duel.opponent_of(&outsider.path_id), None);
}

#[test]
fn test_shannon_entropy_bounds() {
    assert!((shannon_entropy(0.5) - 1.0).abs() < 1e-12);
    assert!(shannon_entropy(0.0).abs() < f64::EPSILON);
    assert!(shannon_entropy(1.0).abs() < f64::EPSILON);
    assert!(shannon_entropy(0.9) < shannon_entropy(0.6));
}
