//! Search adapter: single-flight requests and difficulty.

use shogi_link::{Difficulty, EngineAdapter, SyncError};
use shogi_rules::{INITIAL_SFEN, Position, RulesOracle, StandardRules};
use std::time::Duration;

async fn ready_engine(difficulty: Difficulty) -> EngineAdapter {
    let engine = EngineAdapter::standard();
    engine.set_difficulty(difficulty);
    engine.initialize().await.expect("engine ready");
    engine
}

#[tokio::test]
async fn test_back_to_back_requests_supersede() {
    let engine = ready_engine(Difficulty::Easy).await;
    let (first, second) = tokio::join!(
        engine.request_best_move(INITIAL_SFEN),
        engine.request_best_move(INITIAL_SFEN)
    );
    assert_eq!(first, Ok(None));
    let action = second.expect("second request").expect("a real action");
    let rules = StandardRules::new();
    assert!(rules.apply(&Position::initial(), &action).is_ok());
}

#[tokio::test]
async fn test_sequential_requests_both_answer() {
    let engine = ready_engine(Difficulty::Easy).await;
    let first = engine.request_best_move(INITIAL_SFEN).await.expect("first");
    let second = engine.request_best_move(INITIAL_SFEN).await.expect("second");
    assert!(first.is_some());
    assert!(second.is_some());
}

#[tokio::test]
async fn test_mated_side_resigns() {
    // White king on 1a, Black gold on 1b backed by a silver: mate.
    let sfen = "8k/8G/7S1/9/9/9/9/9/K8 w - 1";
    let engine = ready_engine(Difficulty::Easy).await;
    assert_eq!(engine.request_best_move(sfen).await, Ok(None));
}

#[tokio::test]
async fn test_shutdown_resolves_outstanding_request() {
    let engine = ready_engine(Difficulty::Hard).await;
    let (result, ()) = tokio::join!(engine.request_best_move(INITIAL_SFEN), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        engine.shutdown();
    });
    assert_eq!(result, Ok(None));
}

#[tokio::test]
async fn test_requests_after_shutdown_fail() {
    let engine = ready_engine(Difficulty::Easy).await;
    engine.shutdown();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let result = engine.request_best_move(INITIAL_SFEN).await;
    assert!(matches!(result, Err(SyncError::EngineInit(_))));
}

#[tokio::test]
async fn test_difficulty_is_adjustable() {
    let engine = EngineAdapter::standard();
    assert_eq!(engine.difficulty(), Difficulty::Medium);
    engine.set_difficulty(Difficulty::Hard);
    assert_eq!(engine.difficulty(), Difficulty::Hard);
}
