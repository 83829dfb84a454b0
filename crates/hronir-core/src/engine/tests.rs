//! Tests for the engine facade.

use std::collections::BTreeMap;

use chrono::{TimeZone, Utc};

use crate::config::EngineConfig;
use crate::crypto::hash_content;
use crate::ids::HronirId;
use crate::mandate::MandateError;
use crate::path::{Path, PathStatus};
use crate::rating::Vote;
use crate::session::{SessionError, SessionStatus, VerdictRejection};
use crate::storage::{MemoryStorage, Storage};

use super::*;

fn hronir(text: &str) -> HronirId {
    HronirId::from_bytes(hash_content(text.as_bytes()))
}

struct Fixture {
    engine: ConsensusEngine<MemoryStorage>,
    a: Path,
    b: Path,
    c: Path,
    d: Path,
    g: Path,
    h: Path,
}

/// A small corpus: two roots, a contested position 1, a single-file spine
/// to position 4 where the mandate path `g` has beaten its rival `h`
/// three times.
///
/// ```text
/// pos 0:  a   b
///         |
/// pos 1:  c   d     (both continue a)
///         |
/// pos 2:  e
///         |
/// pos 3:  f
///         |
/// pos 4:  g   h     (both continue f; g has 3 wins over h)
/// ```
fn fixture() -> Fixture {
    let engine = ConsensusEngine::new(MemoryStorage::new(), EngineConfig::default());

    let a = engine.create_path(0, None, hronir("a")).expect("a");
    let b = engine.create_path(0, None, hronir("b")).expect("b");
    let c = engine.create_path(1, Some(hronir("a")), hronir("c")).expect("c");
    let d = engine.create_path(1, Some(hronir("a")), hronir("d")).expect("d");
    engine.create_path(2, Some(hronir("c")), hronir("e")).expect("e");
    engine.create_path(3, Some(hronir("e")), hronir("f")).expect("f");
    let g = engine.create_path(4, Some(hronir("f")), hronir("g")).expect("g");
    let h = engine.create_path(4, Some(hronir("f")), hronir("h")).expect("h");

    for seq in 0..3 {
        let vote = Vote::new(
            4,
            a.path_id,
            g.successor,
            h.successor,
            Utc.timestamp_opt(1_700_000_000 + seq, 0).unwrap(),
        );
        engine.storage().append_vote(&vote).expect("vote");
    }

    engine.rebuild_canonical_cache().expect("rebuild");

    Fixture { engine, a, b, c, d, g, h }
}

fn qualified_session(fx: &Fixture) -> crate::session::Session {
    fx.engine
        .check_qualification(&fx.g.path_id)
        .expect("qualify");
    fx.engine.start_session(&fx.g.path_id).expect("start")
}

#[test]
fn test_create_path_idempotent() {
    let fx = fixture();
    let again = fx.engine.create_path(0, None, hronir("a")).expect("recreate");
    assert_eq!(again.path_id, fx.a.path_id);
    assert_eq!(fx.engine.storage().all_paths().expect("all").len(), 8);
}

#[test]
fn test_create_path_rejects_bad_invariant() {
    let fx = fixture();
    let err = fx.engine.create_path(1, None, hronir("nope")).unwrap_err();
    assert!(matches!(err, EngineError::Path(_)));
}

#[test]
fn test_qualification_below_threshold() {
    let fx = fixture();
    // h lost every duel: zero wins under the default WinCount(3) policy.
    let err = fx.engine.check_qualification(&fx.h.path_id).unwrap_err();
    assert!(matches!(
        err,
        EngineError::Mandate(MandateError::NotQualified { .. })
    ));
    let stored = fx.engine.get_path(&fx.h.path_id).expect("get");
    assert_eq!(stored.status, PathStatus::Pending);
}

#[test]
fn test_qualification_assigns_mandate() {
    let fx = fixture();
    let qualified = fx.engine.check_qualification(&fx.g.path_id).expect("qualify");
    assert_eq!(qualified.status, PathStatus::Qualified);
    assert!(qualified.mandate_id.is_some());

    // Idempotent: a second check returns the record unchanged.
    let again = fx.engine.check_qualification(&fx.g.path_id).expect("again");
    assert_eq!(again.mandate_id, qualified.mandate_id);
}

#[test]
fn test_session_requires_qualification() {
    let fx = fixture();
    let err = fx.engine.start_session(&fx.h.path_id).unwrap_err();
    assert!(matches!(
        err,
        EngineError::Mandate(MandateError::NotQualified { .. })
    ));
}

#[test]
fn test_session_dossier_covers_contested_positions() {
    let fx = fixture();
    let session = qualified_session(&fx);

    assert_eq!(session.position_of_mandate, 4);
    // Positions 2 and 3 have single heirs: no duel to judge there.
    assert_eq!(session.dossier.len(), 2);
    assert!(session.dossier[&0].has_candidate(&fx.a.path_id));
    assert!(session.dossier[&0].has_candidate(&fx.b.path_id));
    assert!(session.dossier[&1].has_candidate(&fx.c.path_id));
    assert!(session.dossier[&1].has_candidate(&fx.d.path_id));
}

#[test]
fn test_no_double_spend() {
    let fx = fixture();
    let session = qualified_session(&fx);

    let err = fx.engine.start_session(&fx.g.path_id).unwrap_err();
    match err {
        EngineError::Mandate(MandateError::AlreadyConsumed { session_id, .. }) => {
            assert_eq!(session_id, session.session_id);
        }
        other => panic!("expected AlreadyConsumed, got {other:?}"),
    }
}

#[test]
fn test_vote_budget_enforced() {
    let fx = fixture();
    let session = qualified_session(&fx);

    // Budget at position 4 is 2; submit 3.
    let mut verdicts = BTreeMap::new();
    verdicts.insert(0, fx.a.path_id);
    verdicts.insert(1, fx.c.path_id);
    verdicts.insert(2, fx.c.path_id);
    let err = fx
        .engine
        .commit_session(&session.session_id, &verdicts)
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Session(SessionError::VoteBudgetExceeded { submitted: 3, budget: 2 })
    ));

    // The rejection left the session open: a budget-conforming commit
    // still succeeds.
    let mut verdicts = BTreeMap::new();
    verdicts.insert(0, fx.a.path_id);
    let outcome = fx
        .engine
        .commit_session(&session.session_id, &verdicts)
        .expect("commit");
    assert_eq!(outcome.status, SessionStatus::Committed);
}

#[test]
fn test_commit_happy_path() {
    let fx = fixture();
    let session = qualified_session(&fx);

    let mut verdicts = BTreeMap::new();
    verdicts.insert(0, fx.a.path_id);
    verdicts.insert(1, fx.d.path_id);
    let outcome = fx
        .engine
        .commit_session(&session.session_id, &verdicts)
        .expect("commit");

    assert_eq!(outcome.status, SessionStatus::Committed);
    assert_eq!(outcome.accepted.len(), 2);
    assert!(outcome.rejected.is_empty());

    // The mandate is spent.
    let spent = fx.engine.get_path(&fx.g.path_id).expect("get");
    assert_eq!(spent.status, PathStatus::Spent);

    // The ledger advanced to the new transaction.
    let tx = outcome.transaction.expect("transaction");
    assert_eq!(
        fx.engine.storage().get_head_transaction_id().expect("head"),
        Some(tx.tx_id)
    );
    assert_eq!(fx.engine.verify_ledger().expect("verify"), 1);

    // The cascade re-resolved from position 0: d now holds position 1,
    // and the old spine under c (positions 2+) is truncated.
    let cascade = outcome.cascade.expect("cascade");
    assert_eq!(cascade.start, 0);
    let cache = fx.engine.canonical_cache().expect("cache");
    assert_eq!(cache.get(&0), Some(&fx.a.path_id));
    assert_eq!(cache.get(&1), Some(&fx.d.path_id));
    assert!(!cache.contains_key(&2), "spine under c was cut");

    // Re-commit is rejected.
    let err = fx
        .engine
        .commit_session(&session.session_id, &verdicts)
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Session(SessionError::AlreadyCommitted { .. })
    ));
}

#[test]
fn test_commit_reports_individual_rejections() {
    let fx = fixture();
    let session = qualified_session(&fx);

    let mut verdicts = BTreeMap::new();
    verdicts.insert(0, fx.a.path_id); // valid
    verdicts.insert(3, fx.c.path_id); // position not in dossier
    let outcome = fx
        .engine
        .commit_session(&session.session_id, &verdicts)
        .expect("commit");

    assert_eq!(outcome.status, SessionStatus::Committed);
    assert_eq!(outcome.accepted.len(), 1);
    assert_eq!(outcome.rejected.len(), 1);
    assert_eq!(outcome.rejected[0].reason, VerdictRejection::UnknownPosition);
}

#[test]
fn test_commit_with_zero_valid_verdicts_spends_mandate() {
    let fx = fixture();
    let session = qualified_session(&fx);

    let mut verdicts = BTreeMap::new();
    verdicts.insert(0, fx.g.path_id); // not a candidate at position 0
    let outcome = fx
        .engine
        .commit_session(&session.session_id, &verdicts)
        .expect("commit");

    assert_eq!(outcome.status, SessionStatus::Failed);
    assert!(outcome.accepted.is_empty());
    assert_eq!(outcome.rejected[0].reason, VerdictRejection::NotACandidate);
    assert!(outcome.transaction.is_none());
    assert!(outcome.cascade.is_none());

    // The mandate is consumed even though nothing counted.
    let spent = fx.engine.get_path(&fx.g.path_id).expect("get");
    assert_eq!(spent.status, PathStatus::Spent);
    assert!(fx.engine.verify_ledger().expect("verify") == 0);
}

#[test]
fn test_commit_empty_verdicts_closes_failed() {
    let fx = fixture();
    let session = qualified_session(&fx);

    let outcome = fx
        .engine
        .commit_session(&session.session_id, &BTreeMap::new())
        .expect("commit");
    assert_eq!(outcome.status, SessionStatus::Failed);
}

#[test]
fn test_unknown_session() {
    let fx = fixture();
    let err = fx
        .engine
        .commit_session(&crate::ids::SessionId::new(), &BTreeMap::new())
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Session(SessionError::SessionNotFound { .. })
    ));
}

#[test]
fn test_canonical_path_deterministic() {
    let fx = fixture();
    let first = fx.engine.canonical_path().expect("resolve");
    let second = fx.engine.canonical_path().expect("resolve");
    assert_eq!(first, second);

    let json_a = serde_json::to_vec(&first).expect("serialize");
    let json_b = serde_json::to_vec(&second).expect("serialize");
    assert_eq!(json_a, json_b, "byte-identical output");
}

#[test]
fn test_ranking_and_next_duel() {
    let fx = fixture();

    let ranked = fx.engine.ranking(4).expect("ranking");
    assert_eq!(ranked.len(), 2);
    assert_eq!(ranked[0].path_id, fx.g.path_id, "g leads on wins");

    let duel = fx.engine.next_duel(1).expect("duel").expect("exists");
    assert!(duel.has_candidate(&fx.c.path_id));
    assert!(duel.has_candidate(&fx.d.path_id));

    // Single-heir positions have no duel.
    assert!(fx.engine.next_duel(2).expect("duel").is_none());
}

#[test]
fn test_dormant_votes_count_after_canon_flip() {
    // Seed dormant evidence under root b, then flip the canon to b and
    // observe the dormant winner take position 1.
    let engine = ConsensusEngine::new(MemoryStorage::new(), EngineConfig::default());
    let a = engine.create_path(0, None, hronir("a")).expect("a");
    let b = engine.create_path(0, None, hronir("b")).expect("b");
    let b_weak = engine.create_path(1, Some(hronir("b")), hronir("b-weak")).expect("b-weak");
    let b_strong = engine
        .create_path(1, Some(hronir("b")), hronir("b-strong"))
        .expect("b-strong");
    // Keep a canonical initially: three children outscore b's two.
    for i in 0..3 {
        engine
            .create_path(1, Some(hronir("a")), hronir(&format!("a-child-{i}")))
            .expect("a-child");
    }

    for seq in 0..2 {
        let vote = Vote::new(
            1,
            a.path_id,
            b_strong.successor,
            b_weak.successor,
            Utc.timestamp_opt(1_700_000_000 + seq, 0).unwrap(),
        );
        engine.storage().append_vote(&vote).expect("vote");
    }

    engine.rebuild_canonical_cache().expect("rebuild");
    assert_eq!(
        engine.canonical_cache().expect("cache").get(&0),
        Some(&a.path_id)
    );

    // Flip position 0 to b by cascading a direct verdict.
    let mut verdicts = BTreeMap::new();
    verdicts.insert(0, b.path_id);
    crate::cascade::run_cascade(engine.storage(), engine.config(), 0, &verdicts)
        .expect("cascade");

    let cache = engine.canonical_cache().expect("cache");
    assert_eq!(cache.get(&0), Some(&b.path_id));
    assert_eq!(
        cache.get(&1),
        Some(&b_strong.path_id),
        "dormant votes decided the recomputed position"
    );
}
