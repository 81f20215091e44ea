//! Reconciliation loop: feeds the opponent's new log entries into the turn machine.

use crate::{GameState, SessionApi, SyncError, Transition, TurnMachine};
use shogi_rules::{RulesOracle, Side};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

/// Cursor over a session's move log.
///
/// The cursor only moves forward, so an entry is applied at most once no
/// matter how often the same log is fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciler {
    cursor: u64,
    own_side: Side,
}

impl Reconciler {
    /// Starts at the beginning of the log.
    pub fn new(own_side: Side) -> Self {
        Self {
            cursor: 0,
            own_side,
        }
    }

    /// Log entries already consumed.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Side this client plays; its entries are never replayed.
    pub fn own_side(&self) -> Side {
        self.own_side
    }

    /// Applies opponent entries in `[cursor, state.turn)` and advances the cursor.
    ///
    /// Returns the number of actions applied. A log shorter than the cursor
    /// changes nothing.
    #[instrument(skip(self, state, machine), fields(cursor = self.cursor, turn = state.turn))]
    pub fn reconcile<R: RulesOracle>(
        &mut self,
        state: &GameState,
        machine: &mut TurnMachine<R>,
    ) -> usize {
        let length = state.turn.max(state.moves.len() as u64);
        if length <= self.cursor {
            return 0;
        }
        let mut applied = 0;
        for entry in state
            .moves
            .iter()
            .filter(|entry| entry.sequence >= self.cursor && entry.sequence < length)
        {
            if entry.side == self.own_side {
                continue;
            }
            match machine.apply_remote(entry.action) {
                Transition::Committed(_) => applied += 1,
                other => warn!(sequence = entry.sequence, ?other, "Remote entry did not apply"),
            }
        }
        debug!(from = self.cursor, to = length, applied, "Cursor advanced");
        self.cursor = length;
        applied
    }
}

/// What a poll tick produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollResult {
    /// A fresh session snapshot.
    State(GameState),
    /// The fetch failed; the next tick tries again.
    Failed(SyncError),
}

/// Aborts the poller task when dropped.
#[derive(Debug)]
pub struct PollerHandle {
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Stops polling now.
    pub fn abort(&self) {
        self.task.abort();
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Fetches `token`'s state every `interval` and forwards it as `wrap(result)`.
///
/// Stops once the receiving side of `events` is closed.
pub fn spawn_poller<E, F>(
    api: Arc<dyn SessionApi>,
    token: String,
    interval: Duration,
    events: mpsc::UnboundedSender<E>,
    wrap: F,
) -> PollerHandle
where
    E: Send + 'static,
    F: Fn(PollResult) -> E + Send + 'static,
{
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if events.is_closed() {
                break;
            }
            let result = match api.game_state(&token).await {
                Ok(state) => PollResult::State(state),
                Err(e) => {
                    debug!(token = %token, error = %e, "Poll failed");
                    PollResult::Failed(e)
                }
            };
            if events.send(wrap(result)).is_err() {
                break;
            }
        }
        debug!(token = %token, "Poller stopped");
    });
    PollerHandle { task }
}
