//! Session store lifecycle, turn parity and eviction.

use shogi_link::{EvictionPolicy, SessionStatus, SessionStore, SyncError};
use shogi_rules::{Action, Side};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

fn action(usi: &str, side: Side) -> Action {
    Action::from_usi(usi, side).expect("valid usi")
}

fn scripted_tokens(tokens: &[&str]) -> SessionStore {
    let queue = Arc::new(Mutex::new(
        tokens.iter().map(|t| t.to_string()).collect::<VecDeque<_>>(),
    ));
    SessionStore::new().with_token_generator(Arc::new(move || {
        queue
            .lock()
            .expect("queue lock")
            .pop_front()
            .expect("script exhausted")
    }))
}

fn active_session(store: &SessionStore) -> String {
    let token = store.create();
    store.join(&token).expect("join");
    token
}

#[test]
fn test_second_join_is_already_started() {
    let store = scripted_tokens(&["AB12CD"]);
    let token = store.create();
    assert_eq!(token, "AB12CD");
    store.join("AB12CD").expect("first join succeeds");
    assert_eq!(store.join("AB12CD"), Err(SyncError::AlreadyStarted));
}

#[test]
fn test_status_moves_from_waiting_to_active() {
    let store = SessionStore::new();
    let token = store.create();
    assert_eq!(store.status(&token), Ok(SessionStatus::Waiting));
    store.join(&token).expect("join");
    assert_eq!(store.status(&token), Ok(SessionStatus::Active));
}

#[test]
fn test_same_side_twice_is_wrong_turn() {
    let store = SessionStore::new();
    let token = active_session(&store);
    let receipt = store
        .submit_move(&token, action("7g7f", Side::Black), Side::Black, None)
        .expect("black moves first");
    assert_eq!(receipt.sequence, 0);
    assert_eq!(receipt.turn, 1);

    let second = store.submit_move(&token, action("2g2f", Side::Black), Side::Black, None);
    assert_eq!(second, Err(SyncError::WrongTurn));

    let state = store.get_state(&token).expect("state");
    assert_eq!(state.turn, 1);
    assert_eq!(state.moves.len(), 1);
}

#[test]
fn test_cancelled_token_is_not_found() {
    let store = SessionStore::new();
    let token = store.create();
    store.cancel(&token).expect("cancel");
    assert_eq!(store.status(&token), Err(SyncError::NotFound));
    assert_eq!(store.cancel(&token), Err(SyncError::NotFound));
}

#[test]
fn test_unknown_token_is_not_found_everywhere() {
    let store = SessionStore::new();
    let black = action("7g7f", Side::Black);
    assert_eq!(store.join("ZZZZZZ"), Err(SyncError::NotFound));
    assert_eq!(store.status("ZZZZZZ"), Err(SyncError::NotFound));
    assert_eq!(store.get_state("ZZZZZZ"), Err(SyncError::NotFound));
    assert_eq!(store.end("ZZZZZZ"), Err(SyncError::NotFound));
    assert_eq!(
        store.submit_move("ZZZZZZ", black, Side::Black, None),
        Err(SyncError::NotFound)
    );
}

#[test]
fn test_moves_before_join_are_not_active() {
    let store = SessionStore::new();
    let token = store.create();
    let result = store.submit_move(&token, action("7g7f", Side::Black), Side::Black, None);
    assert_eq!(result, Err(SyncError::NotActive));
}

#[test]
fn test_ended_session_refuses_moves_but_keeps_log() {
    let store = SessionStore::new();
    let token = active_session(&store);
    store
        .submit_move(&token, action("7g7f", Side::Black), Side::Black, None)
        .expect("move");
    store.end(&token).expect("end");
    store.end(&token).expect("ending twice is a no-op");

    let result = store.submit_move(&token, action("3c3d", Side::White), Side::White, None);
    assert_eq!(result, Err(SyncError::NotActive));
    let state = store.get_state(&token).expect("state");
    assert_eq!(state.status, SessionStatus::Ended);
    assert_eq!(state.moves.len(), 1);
}

#[test]
fn test_waiting_session_cannot_end() {
    let store = SessionStore::new();
    let token = store.create();
    assert_eq!(store.end(&token), Err(SyncError::NotActive));
}

#[test]
fn test_alternating_moves_get_contiguous_sequences() {
    let store = SessionStore::new();
    let token = active_session(&store);
    let script = [
        ("7g7f", Side::Black),
        ("3c3d", Side::White),
        ("2g2f", Side::Black),
        ("8c8d", Side::White),
    ];
    for (i, (usi, side)) in script.iter().enumerate() {
        let receipt = store
            .submit_move(&token, action(usi, *side), *side, Some(format!("snap{i}")))
            .expect("in turn");
        assert_eq!(receipt.sequence, i as u64);
    }
    let state = store.get_state(&token).expect("state");
    let sequences: Vec<u64> = state.moves.iter().map(|m| m.sequence).collect();
    assert_eq!(sequences, vec![0, 1, 2, 3]);
    assert_eq!(state.snapshot.as_deref(), Some("snap3"));
}

#[test]
fn test_submit_next_move_follows_parity() {
    let store = SessionStore::new();
    let token = active_session(&store);
    store
        .submit_next_move(&token, action("7g7f", Side::Black), None)
        .expect("first");
    store
        .submit_next_move(&token, action("3c3d", Side::White), None)
        .expect("second");
    let state = store.get_state(&token).expect("state");
    assert_eq!(state.moves[0].side, Side::Black);
    assert_eq!(state.moves[1].side, Side::White);
}

#[test]
fn test_concurrent_same_side_submits_accept_exactly_one() {
    let store = SessionStore::new();
    let token = active_session(&store);
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = store.clone();
            let token = token.clone();
            std::thread::spawn(move || {
                store.submit_move(&token, action("7g7f", Side::Black), Side::Black, None)
            })
        })
        .collect();
    let results: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().expect("thread"))
        .collect();
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(
        results
            .iter()
            .filter(|r| r.is_err())
            .all(|r| *r == Err(SyncError::WrongTurn))
    );
}

#[test]
fn test_concurrent_joins_accept_exactly_one() {
    let store = SessionStore::new();
    let token = store.create();
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = store.clone();
            let token = token.clone();
            std::thread::spawn(move || store.join(&token))
        })
        .collect();
    let successes = handles
        .into_iter()
        .map(|h| h.join().expect("thread"))
        .filter(Result::is_ok)
        .count();
    assert_eq!(successes, 1);
}

#[test]
fn test_token_collision_regenerates() {
    let store = scripted_tokens(&["AAAAAA", "AAAAAA", "BBBBBB"]);
    assert_eq!(store.create(), "AAAAAA");
    assert_eq!(store.create(), "BBBBBB");
    assert_eq!(store.len(), 2);
}

#[test]
fn test_random_tokens_are_six_alphanumerics() {
    let store = SessionStore::new();
    for _ in 0..32 {
        let token = store.create();
        assert_eq!(token.len(), 6);
        assert!(
            token
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        );
    }
}

#[test]
fn test_eviction_uses_status_ttl() {
    let policy = EvictionPolicy::new(
        Duration::from_secs(10),
        Duration::from_secs(100),
        Duration::from_secs(1),
    );
    let store = SessionStore::with_policy(policy);
    let waiting = store.create();
    let active = active_session(&store);

    let later = Instant::now() + Duration::from_secs(50);
    assert_eq!(store.evict_stale(later), 1);
    assert_eq!(store.status(&waiting), Err(SyncError::NotFound));
    assert_eq!(store.status(&active), Ok(SessionStatus::Active));

    let much_later = Instant::now() + Duration::from_secs(500);
    assert_eq!(store.evict_stale(much_later), 1);
    assert!(store.is_empty());
}
