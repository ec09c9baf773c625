//! The request surface the HTTP adapter presents to the orchestrator.
//!
//! Handlers never touch node state: each request is enqueued on the
//! orchestrator's command channel with a `oneshot` for the reply, keeping
//! all mutations serialized in one place.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::oneshot;

use ember_ledger::{Block, BlockData};
use ember_messages::PeerAddress;
use ember_transactions::{Transaction, Utxo};
use ember_types::Hash;

/// `GET /blocks` response.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlocksView {
    pub blocks: Vec<Block>,
    pub length: usize,
    pub valid: bool,
}

/// `POST /blocks` response: where the chain ended up.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HeadSummary {
    pub index: u64,
    pub hash: Hash,
    pub length: usize,
}

/// Errors surfaced to HTTP clients.
///
/// `BadRequest` maps to 400 (malformed input), `Conflict` to 409
/// (invariant violation), `Unavailable` to 500 (orchestrator gone).
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("node unavailable")]
    Unavailable,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unavailable => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

/// One HTTP-origin command, queued for the orchestrator.
#[derive(Debug)]
pub enum ApiRequest {
    AddBlock {
        data: BlockData,
        reply: oneshot::Sender<Result<HeadSummary, ApiError>>,
    },
    ListBlocks {
        reply: oneshot::Sender<BlocksView>,
    },
    AddPeer {
        peer: PeerAddress,
        reply: oneshot::Sender<Result<(), ApiError>>,
    },
    ListPeers {
        reply: oneshot::Sender<Vec<PeerAddress>>,
    },
    AddTransaction {
        transaction: Transaction,
        reply: oneshot::Sender<Result<(), ApiError>>,
    },
    ListUnspent {
        reply: oneshot::Sender<Result<Vec<Utxo>, ApiError>>,
    },
    ListUnconfirmed {
        reply: oneshot::Sender<Result<Vec<Transaction>, ApiError>>,
    },
}
