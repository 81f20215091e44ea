//! JSON bodies exchanged between the session server and its clients.

use crate::{SessionStatus, SyncError};
use serde::{Deserialize, Serialize};
use shogi_rules::{Action, Side};

/// Response to `POST /api/create`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateResponse {
    /// Freshly issued session token.
    pub token: String,
}

/// Body of the token-only requests (`join`, `cancel`, `end`).
///
/// `token` is optional so a missing field reaches the handler and is
/// answered with a 400 body instead of a bare extractor rejection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRequest {
    /// Session token.
    #[serde(default)]
    pub token: Option<String>,
}

/// Plain acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessResponse {
    /// Always true on a 200.
    pub success: bool,
}

impl SuccessResponse {
    /// The only acknowledgement the server sends.
    pub fn ok() -> Self {
        Self { success: true }
    }
}

/// Response to `GET /api/status/{token}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Lifecycle state of the session.
    pub status: SessionStatus,
}

/// Body of `POST /api/move`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MoveRequest {
    /// Session token.
    #[serde(default)]
    pub token: Option<String>,
    /// The committed action.
    #[serde(rename = "move", default)]
    pub action: Option<Action>,
    /// Side that played it; inferred from log parity when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side: Option<Side>,
    /// SFEN of the resulting position, echoed for late joiners.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub board: Option<String>,
    /// Hand contents; ignored because the SFEN in `board` already carries them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hands: Option<serde_json::Value>,
}

/// Response to `POST /api/move`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveResponse {
    /// Always true on a 200.
    pub success: bool,
    /// Log length after the append, the index of the next ply.
    pub turn: u64,
}

/// Body of every non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable message.
    pub error: String,
    /// Machine tag, see [`SyncError::code`].
    #[serde(default)]
    pub code: String,
}

impl ErrorBody {
    /// Error body with a free-form code.
    pub fn new(code: &str, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.to_string(),
        }
    }

    /// Converts back into the error the server reported.
    pub fn into_sync_error(self) -> SyncError {
        SyncError::from_code(&self.code, &self.error)
    }
}

impl From<&SyncError> for ErrorBody {
    fn from(err: &SyncError) -> Self {
        Self::new(err.code(), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_move_request_accepts_hands_field() {
        let body = serde_json::json!({
            "token": "AB12CD",
            "move": {"type": "board", "from": "7g", "to": "7f", "promote": false},
            "board": "lnsgkgsnl/1r5b1/ppppppppp/9/9/2P6/PP1PPPPPP/1B5R1/LNSGKGSNL w - 2",
            "hands": {"black": {}, "white": {}}
        });
        let request: MoveRequest = serde_json::from_value(body).expect("decodes");
        assert_eq!(request.token.as_deref(), Some("AB12CD"));
        assert!(request.action.is_some());
        assert_eq!(request.side, None);
    }

    #[test]
    fn test_missing_token_decodes_as_none() {
        let request: TokenRequest = serde_json::from_str("{}").expect("decodes");
        assert_eq!(request.token, None);
    }
}
