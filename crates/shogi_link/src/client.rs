//! Session client: request/response wrapper over the session store.
//!
//! No operation retries. Retry policy belongs to the reconciliation loop.

use crate::wire::{
    CreateResponse, ErrorBody, MoveRequest, MoveResponse, StatusResponse, SuccessResponse,
    TokenRequest,
};
use crate::{GameState, SessionStatus, SessionStore, SubmitReceipt, SyncError};
use serde::Serialize;
use serde::de::DeserializeOwned;
use shogi_rules::{Action, Side};
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Operations a client performs against a session store.
#[async_trait::async_trait]
pub trait SessionApi: Send + Sync {
    /// Issues a new session token.
    async fn create(&self) -> Result<String, SyncError>;

    /// Joins a waiting session.
    async fn join(&self, token: &str) -> Result<(), SyncError>;

    /// Current lifecycle state of a session.
    async fn status(&self, token: &str) -> Result<SessionStatus, SyncError>;

    /// Removes a session.
    async fn cancel(&self, token: &str) -> Result<(), SyncError>;

    /// Marks a session over.
    async fn end(&self, token: &str) -> Result<(), SyncError>;

    /// Status and full move log.
    async fn game_state(&self, token: &str) -> Result<GameState, SyncError>;

    /// Appends a locally committed action. Returns the new log length.
    async fn submit_move(
        &self,
        token: &str,
        action: Action,
        side: Side,
        snapshot: Option<String>,
    ) -> Result<u64, SyncError>;
}

/// In-process store, used for hot-seat games and tests.
#[async_trait::async_trait]
impl SessionApi for SessionStore {
    async fn create(&self) -> Result<String, SyncError> {
        Ok(SessionStore::create(self))
    }

    async fn join(&self, token: &str) -> Result<(), SyncError> {
        SessionStore::join(self, token)
    }

    async fn status(&self, token: &str) -> Result<SessionStatus, SyncError> {
        SessionStore::status(self, token)
    }

    async fn cancel(&self, token: &str) -> Result<(), SyncError> {
        SessionStore::cancel(self, token)
    }

    async fn end(&self, token: &str) -> Result<(), SyncError> {
        SessionStore::end(self, token)
    }

    async fn game_state(&self, token: &str) -> Result<GameState, SyncError> {
        self.get_state(token)
    }

    async fn submit_move(
        &self,
        token: &str,
        action: Action,
        side: Side,
        snapshot: Option<String>,
    ) -> Result<u64, SyncError> {
        SessionStore::submit_move(self, token, action, side, snapshot)
            .map(|receipt: SubmitReceipt| receipt.turn)
    }
}

/// Talks to a remote session server over HTTP.
#[derive(Debug, Clone)]
pub struct HttpSessionClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpSessionClient {
    /// Creates a client for the server at `base_url` (for example `http://127.0.0.1:3001`).
    pub fn new(base_url: impl Into<String>) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Server this client talks to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, SyncError> {
        let response = self.client.get(self.url(path)).send().await?;
        Self::decode(response).await
    }

    async fn post<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, SyncError> {
        let response = self.client.post(self.url(path)).json(body).send().await?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, SyncError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }
        let text = response.text().await.unwrap_or_default();
        let err = match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => body.into_sync_error(),
            Err(_) => SyncError::Transport(format!("HTTP {}", status)),
        };
        warn!(status = %status, error = %err, "Session server refused request");
        Err(err)
    }

    fn token_body(token: &str) -> TokenRequest {
        TokenRequest {
            token: Some(token.to_string()),
        }
    }
}

#[async_trait::async_trait]
impl SessionApi for HttpSessionClient {
    #[instrument(skip(self), fields(base_url = %self.base_url))]
    async fn create(&self) -> Result<String, SyncError> {
        let response: CreateResponse = self.post("/api/create", &serde_json::json!({})).await?;
        debug!(token = %response.token, "Created session");
        Ok(response.token)
    }

    #[instrument(skip(self))]
    async fn join(&self, token: &str) -> Result<(), SyncError> {
        let _: SuccessResponse = self.post("/api/join", &Self::token_body(token)).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn status(&self, token: &str) -> Result<SessionStatus, SyncError> {
        let response: StatusResponse = self.get(&format!("/api/status/{}", token)).await?;
        Ok(response.status)
    }

    #[instrument(skip(self))]
    async fn cancel(&self, token: &str) -> Result<(), SyncError> {
        let _: SuccessResponse = self.post("/api/cancel", &Self::token_body(token)).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn end(&self, token: &str) -> Result<(), SyncError> {
        let _: SuccessResponse = self.post("/api/end", &Self::token_body(token)).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn game_state(&self, token: &str) -> Result<GameState, SyncError> {
        self.get(&format!("/api/game/{}", token)).await
    }

    #[instrument(skip(self, action, snapshot), fields(action = %action))]
    async fn submit_move(
        &self,
        token: &str,
        action: Action,
        side: Side,
        snapshot: Option<String>,
    ) -> Result<u64, SyncError> {
        let request = MoveRequest {
            token: Some(token.to_string()),
            action: Some(action),
            side: Some(side),
            board: snapshot,
            hands: None,
        };
        let response: MoveResponse = self.post("/api/move", &request).await?;
        debug!(turn = response.turn, "Move accepted");
        Ok(response.turn)
    }
}
