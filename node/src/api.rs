//! # External HTTP API
//!
//! Translates HTTP requests into core operations and reads from the
//! ledger. Error kinds and messages from the core surface verbatim in
//! the response body, with the status code derived from the error kind.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::info;

use ember_protocol::error::CoreError;
use ember_protocol::ledger::{LedgerSnapshot, Transaction, TxKind};
use ember_protocol::network::Node;

// ---------------------------------------------------------------------------
// State & errors
// ---------------------------------------------------------------------------

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    node: Arc<Node>,
}

/// A core error crossing the HTTP boundary.
struct ApiError(CoreError);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CoreError::InvalidArgument(_)
            | CoreError::InvalidInput(_)
            | CoreError::InvalidTransaction(_)
            | CoreError::InvalidBlock(_)
            | CoreError::InvalidData(_) => StatusCode::BAD_REQUEST,
            CoreError::InvalidOperation(_) => StatusCode::NOT_FOUND,
            CoreError::Transport(_) | CoreError::Io(_) | CoreError::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Builds the API router over a running node.
pub fn router(node: Arc<Node>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/blockchain", get(blockchain))
        .route("/balance/:address", get(balance))
        .route("/transaction", post(transaction))
        .route("/stake", post(stake))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { node })
}

/// Serves the API until the shutdown signal fires.
pub async fn serve(
    port: u16,
    node: Arc<Node>,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "api listening");

    axum::serve(listener, router(node))
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct Health {
    status: &'static str,
    version: &'static str,
    peer: String,
    peers: usize,
    height: usize,
    pending: usize,
}

async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        version: ember_protocol::config::PROTOCOL_VERSION,
        peer: state.node.id().to_string(),
        peers: state.node.peer_count(),
        height: state.node.ledger().len(),
        pending: state.node.ledger().pending(),
    })
}

async fn blockchain(State(state): State<AppState>) -> Json<LedgerSnapshot> {
    Json(state.node.ledger().snapshot())
}

#[derive(Serialize)]
struct Balance {
    address: String,
    balance: f64,
    nonce: u64,
}

async fn balance(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<Balance>, ApiError> {
    let account = state.node.ledger().account(&address)?;
    Ok(Json(Balance {
        address,
        balance: account.balance.to_f64(),
        nonce: account.nonce,
    }))
}

#[derive(Deserialize)]
struct TransactionRequest {
    sender: String,
    receiver: String,
    signature: String,
    amount: f64,
}

async fn transaction(
    State(state): State<AppState>,
    Json(request): Json<TransactionRequest>,
) -> Result<Json<Transaction>, ApiError> {
    let tx = state.node.create_transaction(
        &request.sender,
        &request.receiver,
        &request.signature,
        request.amount,
        TxKind::Regular,
    )?;
    Ok(Json(tx))
}

#[derive(Deserialize)]
struct StakeRequest {
    sender: String,
    signature: String,
    amount: f64,
}

async fn stake(
    State(state): State<AppState>,
    Json(request): Json<StakeRequest>,
) -> Result<Json<Transaction>, ApiError> {
    let tx = state.node.create_transaction(
        &request.sender,
        "",
        &request.signature,
        request.amount,
        TxKind::Stake,
    )?;
    Ok(Json(tx))
}
