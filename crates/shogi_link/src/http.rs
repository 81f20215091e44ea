//! HTTP surface of the session store.

use crate::wire::{
    CreateResponse, ErrorBody, MoveRequest, MoveResponse, StatusResponse, SuccessResponse,
    TokenRequest,
};
use crate::{LinkConfig, SessionStore, SyncError};
use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, instrument, warn};

/// Shared state handed to every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    store: SessionStore,
}

impl AppState {
    /// Wraps a store for the router.
    pub fn new(store: SessionStore) -> Self {
        Self { store }
    }

    /// The wrapped store.
    pub fn store(&self) -> &SessionStore {
        &self.store
    }
}

/// A failed request: status code plus `{ error, code }` body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    fn sync(status: StatusCode, err: SyncError) -> Self {
        Self {
            status,
            body: ErrorBody::from(&err),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorBody::new("bad_request", message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

fn require_token(token: Option<String>) -> Result<String, ApiError> {
    token
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Token required"))
}

/// CORS policy: any origin in dev mode, the configured allow-list otherwise.
pub fn cors_layer(config: &LinkConfig) -> CorsLayer {
    let cors = if *config.dev_mode() {
        CorsLayer::new().allow_origin(AllowOrigin::any())
    } else {
        let origins = config
            .allowed_origins()
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!("Invalid origin in allow-list: {}", origin);
                    None
                }
            })
            .collect::<Vec<_>>();
        CorsLayer::new().allow_origin(AllowOrigin::list(origins))
    };
    cors.allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

/// Routes without middleware.
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/create", post(create))
        .route("/api/join", post(join))
        .route("/api/status/{token}", get(status))
        .route("/api/cancel", post(cancel))
        .route("/api/end", post(end))
        .route("/api/game/{token}", get(game))
        .route("/api/move", post(submit_move))
        .with_state(state)
}

/// Routes wrapped in CORS and request tracing.
pub fn router(state: AppState, config: &LinkConfig) -> Router {
    routes(state)
        .layer(cors_layer(config))
        .layer(TraceLayer::new_for_http())
}

/// Binds `host:port` from `config`, starts the eviction sweeper and serves until the process exits.
#[instrument(skip_all, fields(host = %config.host(), port = config.port()))]
pub async fn serve(store: SessionStore, config: &LinkConfig) -> std::io::Result<()> {
    let sweeper = store.spawn_sweeper();
    let app = router(AppState::new(store), config);
    let listener = tokio::net::TcpListener::bind((config.host().as_str(), *config.port())).await?;
    info!(addr = %listener.local_addr()?, dev_mode = config.dev_mode(), "Session server listening");
    let result = axum::serve(listener, app).await;
    sweeper.abort();
    result
}

async fn health() -> &'static str {
    "ok"
}

#[instrument(skip_all)]
async fn create(State(state): State<AppState>) -> Json<CreateResponse> {
    let token = state.store.create();
    Json(CreateResponse { token })
}

#[instrument(skip_all)]
async fn join(
    State(state): State<AppState>,
    body: Result<Json<TokenRequest>, JsonRejection>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let Json(request) = body?;
    let token = require_token(request.token)?;
    state
        .store
        .join(&token)
        .map_err(|e| ApiError::sync(StatusCode::BAD_REQUEST, e))?;
    Ok(Json(SuccessResponse::ok()))
}

#[instrument(skip_all, fields(token = %token))]
async fn status(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let status = state
        .store
        .status(&token)
        .map_err(|e| ApiError::sync(StatusCode::NOT_FOUND, e))?;
    Ok(Json(StatusResponse { status }))
}

#[instrument(skip_all)]
async fn cancel(
    State(state): State<AppState>,
    body: Result<Json<TokenRequest>, JsonRejection>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let Json(request) = body?;
    let token = require_token(request.token)?;
    state
        .store
        .cancel(&token)
        .map_err(|e| ApiError::sync(StatusCode::BAD_REQUEST, e))?;
    Ok(Json(SuccessResponse::ok()))
}

#[instrument(skip_all)]
async fn end(
    State(state): State<AppState>,
    body: Result<Json<TokenRequest>, JsonRejection>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let Json(request) = body?;
    let token = require_token(request.token)?;
    state
        .store
        .end(&token)
        .map_err(|e| ApiError::sync(StatusCode::BAD_REQUEST, e))?;
    Ok(Json(SuccessResponse::ok()))
}

#[instrument(skip_all, fields(token = %token))]
async fn game(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<crate::GameState>, ApiError> {
    let game = state
        .store
        .get_state(&token)
        .map_err(|e| ApiError::sync(StatusCode::NOT_FOUND, e))?;
    debug!(turn = game.turn, "Serving game state");
    Ok(Json(game))
}

#[instrument(skip_all)]
async fn submit_move(
    State(state): State<AppState>,
    body: Result<Json<MoveRequest>, JsonRejection>,
) -> Result<Json<MoveResponse>, ApiError> {
    let Json(request) = body?;
    let token = require_token(request.token)?;
    let action = request
        .action
        .ok_or_else(|| ApiError::bad_request("Move required"))?;
    if request.hands.is_some() {
        debug!("Ignoring hands field; board snapshot carries hands");
    }
    let receipt = match request.side {
        Some(side) => state.store.submit_move(&token, action, side, request.board),
        None => state.store.submit_next_move(&token, action, request.board),
    }
    .map_err(|e| ApiError::sync(StatusCode::BAD_REQUEST, e))?;
    Ok(Json(MoveResponse {
        success: true,
        turn: receipt.turn,
    }))
}
