//! Server-side session registry: rendezvous tokens and append-only move logs.
//!
//! The store knows nothing about shogi rules. It orders moves by log parity
//! and hands the log back to whoever asks; legality stays with each client.

use crate::SyncError;
use derive_getters::Getters;
use rand::Rng;
use serde::{Deserialize, Serialize};
use shogi_rules::{Action, Side};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Session token handed out by [`SessionStore::create`].
pub type Token = String;

/// Produces candidate tokens; the store retries on collision.
pub type TokenGenerator = Arc<dyn Fn() -> Token + Send + Sync>;

const TOKEN_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const TOKEN_LEN: usize = 6;

/// Draws a 6-character token uniformly from `[A-Z0-9]`.
pub fn random_token() -> Token {
    let mut rng = rand::thread_rng();
    (0..TOKEN_LEN)
        .map(|_| TOKEN_ALPHABET[rng.gen_range(0..TOKEN_ALPHABET.len())] as char)
        .collect()
}

/// Lifecycle of a session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SessionStatus {
    /// Created, waiting for the second player.
    Waiting,
    /// Joined; moves are accepted.
    Active,
    /// A client reported the game over.
    Ended,
}

/// One committed ply in a session's log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveLogEntry {
    /// Position in the log, contiguous from 0.
    pub sequence: u64,
    /// Side that played the action.
    pub side: Side,
    /// The action itself.
    pub action: Action,
    /// SFEN after the action, when the submitting client sent one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resulting_position: Option<String>,
}

/// Snapshot of a session as returned by `get_state`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
    /// Lifecycle state.
    pub status: SessionStatus,
    /// Full move log.
    pub moves: Vec<MoveLogEntry>,
    /// Log length, the index of the next ply.
    pub turn: u64,
    /// Latest echoed SFEN, if any client sent one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<String>,
}

/// What `submit_move` assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, derive_new::new)]
pub struct SubmitReceipt {
    /// Sequence number given to the new entry.
    pub sequence: u64,
    /// Log length after the append.
    pub turn: u64,
}

/// Time-based expiry of abandoned sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Getters, derive_new::new)]
pub struct EvictionPolicy {
    /// How long a never-joined session may sit untouched.
    waiting_ttl: Duration,
    /// How long an active or ended session may sit untouched.
    idle_ttl: Duration,
    /// Period of the background sweeper.
    sweep_interval: Duration,
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        Self {
            waiting_ttl: Duration::from_secs(30 * 60),
            idle_ttl: Duration::from_secs(2 * 60 * 60),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone)]
struct Session {
    status: SessionStatus,
    creator_side: Side,
    log: Vec<MoveLogEntry>,
    snapshot: Option<String>,
    touched_at: Instant,
}

impl Session {
    fn new(now: Instant) -> Self {
        Self {
            status: SessionStatus::Waiting,
            creator_side: Side::Black,
            log: Vec::new(),
            snapshot: None,
            touched_at: now,
        }
    }

    fn next_sequence(&self) -> u64 {
        self.log.len() as u64
    }

    /// Side due to play the next entry, by log parity.
    fn side_to_move(&self) -> Side {
        let side = Side::for_ply(self.next_sequence());
        if self.creator_side == Side::Black {
            side
        } else {
            side.opponent()
        }
    }

    fn state(&self) -> GameState {
        GameState {
            status: self.status,
            moves: self.log.clone(),
            turn: self.next_sequence(),
            snapshot: self.snapshot.clone(),
        }
    }
}

/// Registry of live sessions keyed by token.
///
/// Cloning is cheap and every clone shares the same map. Each operation
/// runs its check and its mutation under a single lock acquisition, so
/// two concurrent joins or two same-side moves cannot both succeed.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<Mutex<HashMap<Token, Session>>>,
    generate: TokenGenerator,
    policy: EvictionPolicy,
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStore")
            .field("sessions", &self.lock().len())
            .field("policy", &self.policy)
            .finish()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    /// Creates an empty store with random tokens and the default eviction policy.
    #[instrument]
    pub fn new() -> Self {
        info!("Creating session store");
        Self::with_policy(EvictionPolicy::default())
    }

    /// Creates an empty store with the given eviction policy.
    pub fn with_policy(policy: EvictionPolicy) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            generate: Arc::new(random_token),
            policy,
        }
    }

    /// Replaces the token source. The generator must eventually yield an unused token.
    pub fn with_token_generator(mut self, generate: TokenGenerator) -> Self {
        self.generate = generate;
        self
    }

    /// Eviction policy in force.
    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True when no session is live.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Token, Session>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Issues a fresh token in `Waiting` with an empty log.
    #[instrument(skip(self))]
    pub fn create(&self) -> Token {
        let mut sessions = self.lock();
        let token = loop {
            let candidate = (self.generate)();
            if !sessions.contains_key(&candidate) {
                break candidate;
            }
            debug!(token = %candidate, "Token collision, regenerating");
        };
        sessions.insert(token.clone(), Session::new(Instant::now()));
        info!(token = %token, live = sessions.len(), "Session created");
        token
    }

    /// Moves a waiting session to `Active`. Succeeds at most once per token.
    #[instrument(skip(self))]
    pub fn join(&self, token: &str) -> Result<(), SyncError> {
        let mut sessions = self.lock();
        let session = sessions.get_mut(token).ok_or(SyncError::NotFound)?;
        session.touched_at = Instant::now();
        if session.status != SessionStatus::Waiting {
            warn!(token, status = %session.status, "Join on a session that already started");
            return Err(SyncError::AlreadyStarted);
        }
        session.status = SessionStatus::Active;
        info!(token, "Session joined");
        Ok(())
    }

    /// Current lifecycle state.
    #[instrument(skip(self))]
    pub fn status(&self, token: &str) -> Result<SessionStatus, SyncError> {
        let mut sessions = self.lock();
        let session = sessions.get_mut(token).ok_or(SyncError::NotFound)?;
        session.touched_at = Instant::now();
        Ok(session.status)
    }

    /// Appends `action` for `side` if it is that side's turn by log parity.
    #[instrument(skip(self, action, snapshot), fields(action = %action))]
    pub fn submit_move(
        &self,
        token: &str,
        action: Action,
        side: Side,
        snapshot: Option<String>,
    ) -> Result<SubmitReceipt, SyncError> {
        let mut sessions = self.lock();
        let session = sessions.get_mut(token).ok_or(SyncError::NotFound)?;
        session.touched_at = Instant::now();
        Self::append(token, session, action, side, snapshot)
    }

    /// Appends `action` for whichever side is to move, for requests that omit the side.
    #[instrument(skip(self, action, snapshot), fields(action = %action))]
    pub fn submit_next_move(
        &self,
        token: &str,
        action: Action,
        snapshot: Option<String>,
    ) -> Result<SubmitReceipt, SyncError> {
        let mut sessions = self.lock();
        let session = sessions.get_mut(token).ok_or(SyncError::NotFound)?;
        session.touched_at = Instant::now();
        let side = session.side_to_move();
        Self::append(token, session, action, side, snapshot)
    }

    fn append(
        token: &str,
        session: &mut Session,
        action: Action,
        side: Side,
        snapshot: Option<String>,
    ) -> Result<SubmitReceipt, SyncError> {
        if session.status != SessionStatus::Active {
            warn!(token, status = %session.status, "Move on a session that is not active");
            return Err(SyncError::NotActive);
        }
        let expected = session.side_to_move();
        if side != expected {
            warn!(token, %side, %expected, "Move out of turn");
            return Err(SyncError::WrongTurn);
        }
        let sequence = session.next_sequence();
        if snapshot.is_some() {
            session.snapshot = snapshot.clone();
        }
        session.log.push(MoveLogEntry {
            sequence,
            side,
            action,
            resulting_position: snapshot,
        });
        let receipt = SubmitReceipt::new(sequence, session.next_sequence());
        info!(token, sequence, %side, "Move appended");
        Ok(receipt)
    }

    /// Status and full move log.
    #[instrument(skip(self))]
    pub fn get_state(&self, token: &str) -> Result<GameState, SyncError> {
        let mut sessions = self.lock();
        let session = sessions.get_mut(token).ok_or(SyncError::NotFound)?;
        session.touched_at = Instant::now();
        Ok(session.state())
    }

    /// Removes the session; the token is unknown from then on.
    #[instrument(skip(self))]
    pub fn cancel(&self, token: &str) -> Result<(), SyncError> {
        let mut sessions = self.lock();
        sessions.remove(token).ok_or(SyncError::NotFound)?;
        info!(token, live = sessions.len(), "Session cancelled");
        Ok(())
    }

    /// Marks an active session over. Repeating it on an ended session is a no-op.
    #[instrument(skip(self))]
    pub fn end(&self, token: &str) -> Result<(), SyncError> {
        let mut sessions = self.lock();
        let session = sessions.get_mut(token).ok_or(SyncError::NotFound)?;
        session.touched_at = Instant::now();
        match session.status {
            SessionStatus::Waiting => Err(SyncError::NotActive),
            SessionStatus::Ended => Ok(()),
            SessionStatus::Active => {
                session.status = SessionStatus::Ended;
                info!(token, plies = session.log.len(), "Session ended");
                Ok(())
            }
        }
    }

    /// Drops sessions untouched for longer than their TTL as of `now`.
    ///
    /// Returns how many were removed.
    #[instrument(skip(self, now))]
    pub fn evict_stale(&self, now: Instant) -> usize {
        let policy = self.policy;
        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|token, session| {
            let ttl = match session.status {
                SessionStatus::Waiting => policy.waiting_ttl,
                SessionStatus::Active | SessionStatus::Ended => policy.idle_ttl,
            };
            let keep = now.saturating_duration_since(session.touched_at) <= ttl;
            if !keep {
                debug!(token = %token, status = %session.status, "Evicting stale session");
            }
            keep
        });
        let evicted = before - sessions.len();
        if evicted > 0 {
            info!(evicted, live = sessions.len(), "Evicted stale sessions");
        }
        evicted
    }

    /// Runs [`SessionStore::evict_stale`] every `sweep_interval` until aborted.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let store = self.clone();
        let period = self.policy.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                store.evict_stale(Instant::now());
            }
        })
    }
}
