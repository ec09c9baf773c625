//! Axum-based HTTP server: thin translation between JSON requests and
//! orchestrator commands.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, oneshot};

use ember_ledger::BlockData;
use ember_messages::PeerAddress;
use ember_transactions::{Transaction, Utxo};

use crate::api::{ApiError, ApiRequest, BlocksView, HeadSummary};
use crate::error::RpcError;

#[derive(Clone)]
struct AppState {
    requests: mpsc::Sender<ApiRequest>,
}

/// The HTTP API server. Binding is separate from serving so a failed bind
/// can abort startup with a clean error.
pub struct RpcServer {
    listener: TcpListener,
    requests: mpsc::Sender<ApiRequest>,
}

impl RpcServer {
    pub async fn bind(
        addr: (&str, u16),
        requests: mpsc::Sender<ApiRequest>,
    ) -> Result<Self, RpcError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| RpcError::Bind(format!("{}:{}: {e}", addr.0, addr.1)))?;
        Ok(Self { listener, requests })
    }

    /// The actual bound address (relevant when the port was 0).
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, RpcError> {
        self.listener
            .local_addr()
            .map_err(|e| RpcError::Bind(e.to_string()))
    }

    /// Serve until the shutdown signal fires.
    pub async fn serve(self, mut shutdown: broadcast::Receiver<()>) -> Result<(), RpcError> {
        let state = AppState {
            requests: self.requests,
        };

        let app = Router::new()
            .route("/blocks", get(list_blocks).post(add_block))
            .route("/peers", get(list_peers).post(add_peer))
            .route("/transactions", post(add_transaction))
            .route("/transactions/unspent", get(list_unspent))
            .route("/transactions/unconfirmed", get(list_unconfirmed))
            // Aliases kept for clients of the earlier path scheme.
            .route("/list-blocks", get(list_blocks))
            .route("/add-block", post(add_block))
            .route("/list-peers", get(list_peers))
            .route("/add-peer", post(add_peer))
            .with_state(state);

        axum::serve(self.listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await
            .map_err(|e| RpcError::Serve(e.to_string()))
    }
}

/// Enqueue one request and wait for the orchestrator's reply.
async fn request<T>(
    state: &AppState,
    build: impl FnOnce(oneshot::Sender<T>) -> ApiRequest,
) -> Result<T, ApiError> {
    let (tx, rx) = oneshot::channel();
    state
        .requests
        .send(build(tx))
        .await
        .map_err(|_| ApiError::Unavailable)?;
    rx.await.map_err(|_| ApiError::Unavailable)
}

async fn list_blocks(State(state): State<AppState>) -> Result<Json<BlocksView>, ApiError> {
    let view = request(&state, |reply| ApiRequest::ListBlocks { reply }).await?;
    Ok(Json(view))
}

async fn add_block(
    State(state): State<AppState>,
    body: Json<serde_json::Value>,
) -> Result<Json<HeadSummary>, ApiError> {
    // The payload is a bare JSON string (basic variant) or a transaction
    // array (transaction variant); anything else is malformed.
    let data: BlockData = serde_json::from_value(body.0)
        .map_err(|e| ApiError::BadRequest(format!("invalid block data: {e}")))?;
    let summary = request(&state, |reply| ApiRequest::AddBlock { data, reply }).await??;
    Ok(Json(summary))
}

async fn list_peers(State(state): State<AppState>) -> Result<Json<Vec<PeerAddress>>, ApiError> {
    let peers = request(&state, |reply| ApiRequest::ListPeers { reply }).await?;
    Ok(Json(peers))
}

async fn add_peer(
    State(state): State<AppState>,
    body: Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let peer: PeerAddress = serde_json::from_value(body.0)
        .map_err(|e| ApiError::BadRequest(format!("invalid peer: {e}")))?;
    request(&state, |reply| ApiRequest::AddPeer { peer, reply }).await??;
    Ok(Json(serde_json::json!({})))
}

async fn add_transaction(
    State(state): State<AppState>,
    body: Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let transaction: Transaction = serde_json::from_value(body.0)
        .map_err(|e| ApiError::BadRequest(format!("invalid transaction: {e}")))?;
    request(&state, |reply| ApiRequest::AddTransaction { transaction, reply }).await??;
    Ok(Json(serde_json::json!({})))
}

async fn list_unspent(State(state): State<AppState>) -> Result<Json<Vec<Utxo>>, ApiError> {
    let utxos = request(&state, |reply| ApiRequest::ListUnspent { reply }).await??;
    Ok(Json(utxos))
}

async fn list_unconfirmed(
    State(state): State<AppState>,
) -> Result<Json<Vec<Transaction>>, ApiError> {
    let txs = request(&state, |reply| ApiRequest::ListUnconfirmed { reply }).await??;
    Ok(Json(txs))
}
