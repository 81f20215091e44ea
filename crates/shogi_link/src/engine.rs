//! Move-search adapter.
//!
//! The search oracle runs on a dedicated OS thread and is driven by message
//! passing. At most one request is live: issuing a new one resolves the
//! previous caller with `None`, and a result for a superseded request is
//! dropped on the worker side.

use crate::SyncError;
use serde::{Deserialize, Serialize};
use shogi_rules::{
    Action, AlphaBetaSearch, Position, SearchBudget, SearchOracle, StandardRules,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{OnceCell, mpsc, oneshot};
use tracing::{debug, info, instrument, warn};

/// Engine strength.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumIter,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Difficulty {
    /// One ply.
    Easy,
    /// Three plies.
    #[default]
    Medium,
    /// Five plies.
    Hard,
}

impl Difficulty {
    /// Search budget for this strength. Deeper for harder levels.
    pub fn budget(self) -> SearchBudget {
        match self {
            Difficulty::Easy => SearchBudget::new(1, Duration::from_secs(1)),
            Difficulty::Medium => SearchBudget::new(3, Duration::from_secs(3)),
            Difficulty::Hard => SearchBudget::new(5, Duration::from_secs(8)),
        }
    }
}

/// Builds the search oracle on the worker thread.
pub type SearchFactory =
    Arc<dyn Fn() -> Result<Box<dyn SearchOracle>, String> + Send + Sync>;

enum Job {
    Search {
        id: u64,
        position: Position,
        budget: SearchBudget,
    },
    Stop,
}

type Slot = Arc<Mutex<Option<(u64, oneshot::Sender<Option<Action>>)>>>;

fn lock_slot(slot: &Slot) -> MutexGuard<'_, Option<(u64, oneshot::Sender<Option<Action>>)>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
struct Worker {
    jobs: mpsc::UnboundedSender<Job>,
}

/// Async front for a [`SearchOracle`] living on its own thread.
pub struct EngineAdapter {
    factory: SearchFactory,
    worker: OnceCell<Worker>,
    difficulty: Mutex<Difficulty>,
    next_id: AtomicU64,
    pending: Slot,
}

impl std::fmt::Debug for EngineAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineAdapter")
            .field("ready", &self.is_ready())
            .field("difficulty", &self.difficulty())
            .finish()
    }
}

impl EngineAdapter {
    /// Adapter whose worker builds its oracle with `factory`.
    pub fn new(factory: SearchFactory) -> Self {
        Self {
            factory,
            worker: OnceCell::new(),
            difficulty: Mutex::new(Difficulty::default()),
            next_id: AtomicU64::new(0),
            pending: Arc::new(Mutex::new(None)),
        }
    }

    /// Adapter over alpha-beta search with the standard rules.
    pub fn standard() -> Self {
        Self::new(Arc::new(|| {
            Ok(Box::new(AlphaBetaSearch::new(StandardRules::new())) as Box<dyn SearchOracle>)
        }))
    }

    /// True once [`EngineAdapter::initialize`] has succeeded.
    pub fn is_ready(&self) -> bool {
        self.worker.initialized()
    }

    /// Current strength.
    pub fn difficulty(&self) -> Difficulty {
        *self.difficulty.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Changes the strength used by later requests.
    #[instrument(skip(self))]
    pub fn set_difficulty(&self, difficulty: Difficulty) {
        *self.difficulty.lock().unwrap_or_else(PoisonError::into_inner) = difficulty;
        debug!("Difficulty set");
    }

    /// Starts the worker thread. Idempotent; concurrent callers share one start.
    ///
    /// A failed start leaves the adapter uninitialized, so it can be retried.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> Result<(), SyncError> {
        self.worker
            .get_or_try_init(|| self.start_worker())
            .await
            .map(|_| ())
    }

    async fn start_worker(&self) -> Result<Worker, SyncError> {
        info!("Starting search worker");
        let factory = Arc::clone(&self.factory);
        let pending = Arc::clone(&self.pending);
        let (jobs, mut inbox) = mpsc::unbounded_channel::<Job>();
        let (ready_tx, ready_rx) = oneshot::channel::<Result<(), String>>();

        std::thread::Builder::new()
            .name("shogi-search".to_string())
            .spawn(move || {
                let mut oracle = match factory() {
                    Ok(oracle) => {
                        let _ = ready_tx.send(Ok(()));
                        oracle
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                while let Some(job) = inbox.blocking_recv() {
                    match job {
                        Job::Stop => break,
                        Job::Search {
                            id,
                            position,
                            budget,
                        } => run_search(oracle.as_mut(), &pending, id, &position, budget),
                    }
                }
                // Close the inbox before releasing the waiter so no job can slip in between.
                drop(inbox);
                if let Some((id, waiting)) = lock_slot(&pending).take() {
                    debug!(id, "Releasing request left at shutdown");
                    drop(waiting);
                }
                debug!("Search worker stopped");
            })
            .map_err(|e| SyncError::EngineInit(e.to_string()))?;

        match ready_rx.await {
            Ok(Ok(())) => {
                info!("Search worker ready");
                Ok(Worker { jobs })
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Search oracle failed to build");
                Err(SyncError::EngineInit(e))
            }
            Err(_) => Err(SyncError::EngineInit("search worker exited".to_string())),
        }
    }

    /// Best action for the SFEN-encoded position, `None` for resignation.
    ///
    /// Supersedes any outstanding request, whose caller then receives `None`.
    #[instrument(skip(self))]
    pub async fn request_best_move(&self, sfen: &str) -> Result<Option<Action>, SyncError> {
        let position =
            Position::from_sfen(sfen).map_err(|e| SyncError::InvalidPosition(e.to_string()))?;
        self.request_for(position).await
    }

    /// Same as [`EngineAdapter::request_best_move`] for an already decoded position.
    pub async fn request_for(&self, position: Position) -> Result<Option<Action>, SyncError> {
        let worker = self
            .worker
            .get()
            .ok_or_else(|| SyncError::EngineInit("engine not initialized".to_string()))?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let budget = self.difficulty().budget();
        let (tx, rx) = oneshot::channel();

        if let Some((previous, superseded)) = lock_slot(&self.pending).replace((id, tx)) {
            debug!(previous, id, "Superseding outstanding request");
            let _ = superseded.send(None);
        }

        let sent = worker.jobs.send(Job::Search {
            id,
            position,
            budget,
        });
        if sent.is_err() {
            let mut slot = lock_slot(&self.pending);
            if slot.as_ref().is_some_and(|(current, _)| *current == id) {
                slot.take();
            }
            return Err(SyncError::EngineInit("search worker stopped".to_string()));
        }

        // A dropped sender means shutdown or supersession; both read as no result.
        Ok(rx.await.unwrap_or(None))
    }

    /// Stops the worker and resolves any outstanding request with `None`.
    #[instrument(skip(self))]
    pub fn shutdown(&self) {
        if let Some((id, waiting)) = lock_slot(&self.pending).take() {
            debug!(id, "Abandoning outstanding request");
            let _ = waiting.send(None);
        }
        if let Some(worker) = self.worker.get() {
            let _ = worker.jobs.send(Job::Stop);
        }
    }
}

impl Drop for EngineAdapter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_search(
    oracle: &mut dyn SearchOracle,
    pending: &Slot,
    id: u64,
    position: &Position,
    budget: SearchBudget,
) {
    let current = lock_slot(pending).as_ref().map(|(current, _)| *current);
    if current != Some(id) {
        debug!(id, "Skipping superseded request");
        return;
    }
    let action = oracle.best_action(position, budget);
    let mut slot = lock_slot(pending);
    match slot.take() {
        Some((current, waiting)) if current == id => {
            let _ = waiting.send(action);
        }
        other => {
            *slot = other;
            debug!(id, "Dropping stale search result");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_budget_grows_with_difficulty() {
        let easy = Difficulty::Easy.budget();
        let medium = Difficulty::Medium.budget();
        let hard = Difficulty::Hard.budget();
        assert!(easy.depth < medium.depth && medium.depth < hard.depth);
        assert!(easy.time_limit <= medium.time_limit && medium.time_limit <= hard.time_limit);
    }

    #[tokio::test]
    async fn test_request_before_initialize_fails() {
        let engine = EngineAdapter::standard();
        let result = engine.request_best_move(shogi_rules::INITIAL_SFEN).await;
        assert!(matches!(result, Err(SyncError::EngineInit(_))));
    }

    #[tokio::test]
    async fn test_concurrent_initialize_builds_one_oracle() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        let engine = EngineAdapter::new(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(AlphaBetaSearch::new(StandardRules::new())) as Box<dyn SearchOracle>)
        }));
        let (a, b) = tokio::join!(engine.initialize(), engine.initialize());
        assert!(a.is_ok() && b.is_ok());
        engine.initialize().await.expect("already ready");
        assert_eq!(built.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_initialize_can_retry() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let engine = EngineAdapter::new(Arc::new(move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err("no weights".to_string())
            } else {
                Ok(Box::new(AlphaBetaSearch::new(StandardRules::new())) as Box<dyn SearchOracle>)
            }
        }));
        assert!(matches!(engine.initialize().await, Err(SyncError::EngineInit(_))));
        assert!(!engine.is_ready());
        engine.initialize().await.expect("second attempt succeeds");
        assert!(engine.is_ready());
    }

    #[tokio::test]
    async fn test_unreadable_position_is_reported() {
        let engine = EngineAdapter::standard();
        engine.initialize().await.expect("ready");
        let result = engine.request_best_move("not a position").await;
        assert!(matches!(result, Err(SyncError::InvalidPosition(_))));
        let result = engine
            .request_best_move("4k4/9/9/9/9/9/9/9/4K4 b 99999999999P 1")
            .await;
        assert!(matches!(result, Err(SyncError::InvalidPosition(_))));
    }
}
