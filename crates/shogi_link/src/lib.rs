//! Shogi Link - turn-authoritative shogi sessions over HTTP
//!
//! Two players share a game through a short session token. Each client keeps
//! its own turn state machine, forwards its own commits to the session store
//! and replays the opponent's entries from the move log.
//!
//! # Architecture
//!
//! - **Store**: in-memory sessions with a per-session move log
//! - **Server**: axum routes exposing the store
//! - **Client**: the same operations over HTTP (or in-process)
//! - **Turn**: selection, promotion and commit rules for one client
//! - **Engine**: alpha-beta search behind an async, single-flight adapter
//! - **Reconcile / Driver**: polling and the single-threaded event loop
//!
//! # Example
//!
//! ```no_run
//! use shogi_link::{HttpSessionClient, SessionApi};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = HttpSessionClient::new("http://127.0.0.1:3001")?;
//! let token = client.create().await?;
//! println!("Share this code: {token}");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Private module declarations
mod client;
mod config;
mod driver;
mod engine;
mod error;
mod http;
mod reconcile;
mod store;
mod turn;

/// Request and response bodies of the HTTP protocol.
pub mod wire;

// Crate-level exports - Errors
pub use error::{ConfigError, SyncError};

// Crate-level exports - Configuration
pub use config::LinkConfig;

// Crate-level exports - Session store
pub use store::{
    EvictionPolicy, GameState, MoveLogEntry, SessionStatus, SessionStore, SubmitReceipt, Token,
    TokenGenerator, random_token,
};

// Crate-level exports - Server
pub use http::{AppState, cors_layer, router, routes, serve};

// Crate-level exports - Client
pub use client::{HttpSessionClient, SessionApi};

// Crate-level exports - Turn state machine
pub use turn::{Control, MoveSource, Outbound, PendingPromotion, Phase, Selection, Transition, TurnMachine};

// Crate-level exports - Engine
pub use engine::{Difficulty, EngineAdapter, SearchFactory};

// Crate-level exports - Reconciliation and driver
pub use driver::{Command, DriverNotice, GameDriver, GameEvent};
pub use reconcile::{PollResult, PollerHandle, Reconciler, spawn_poller};
