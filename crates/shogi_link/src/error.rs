//! Error types for session synchronization and configuration.

use derive_more::{Display, Error};
use shogi_rules::Rejection;
use tracing::instrument;

/// Failure of a session, transport or engine operation.
///
/// `NotFound` displays as "invalid code" because that is what a player
/// typing a mistyped token needs to read.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum SyncError {
    /// The token is unknown to the session store.
    #[display("invalid code")]
    NotFound,

    /// The session is no longer waiting for a second player.
    #[display("Game already started")]
    AlreadyStarted,

    /// The submitted side is not the side to move.
    #[display("Not your turn")]
    WrongTurn,

    /// The session is not accepting moves (not joined yet, or over).
    #[display("Game is not active")]
    NotActive,

    /// The session service was unreachable or answered with a failure.
    #[display("Transport error: {}", _0)]
    Transport(String),

    /// The rules refused the action.
    #[display("Illegal action: {}", _0)]
    OracleRejected(Rejection),

    /// The search engine could not be started or has stopped.
    #[display("Engine failed to start: {}", _0)]
    EngineInit(String),

    /// A position encoding could not be read.
    #[display("Invalid position: {}", _0)]
    InvalidPosition(String),
}

impl std::error::Error for SyncError {}

impl SyncError {
    /// Stable machine tag carried in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            SyncError::NotFound => "not_found",
            SyncError::AlreadyStarted => "already_started",
            SyncError::WrongTurn => "wrong_turn",
            SyncError::NotActive => "not_active",
            SyncError::Transport(_) => "transport",
            SyncError::OracleRejected(_) => "rejected",
            SyncError::EngineInit(_) => "engine_init",
            SyncError::InvalidPosition(_) => "invalid_position",
        }
    }

    /// Rebuilds a protocol error from its wire tag.
    ///
    /// Unknown tags become [`SyncError::Transport`] carrying `message`.
    pub fn from_code(code: &str, message: &str) -> Self {
        match code {
            "not_found" => SyncError::NotFound,
            "already_started" => SyncError::AlreadyStarted,
            "wrong_turn" => SyncError::WrongTurn,
            "not_active" => SyncError::NotActive,
            _ => SyncError::Transport(message.to_string()),
        }
    }

    /// True for the protocol-order violations a player should see as a blocking alert.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            SyncError::AlreadyStarted | SyncError::WrongTurn | SyncError::NotActive
        )
    }
}

impl From<Rejection> for SyncError {
    fn from(rejection: Rejection) -> Self {
        SyncError::OracleRejected(rejection)
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::Transport(err.to_string())
    }
}

/// Configuration error.
#[derive(Debug, Clone, Display, Error)]
#[display("Config error: {} at {}:{}", message, file, line)]
pub struct ConfigError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message: message.into(),
            line: loc.line(),
            file: loc.file(),
        }
    }
}
