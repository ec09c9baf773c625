//! A cheap, cloneable client for the orchestrator's command queue.
//!
//! The HTTP adapter and in-process callers (tests, the daemon) go through
//! the same queue, so every mutation is serialized no matter its origin.

use tokio::sync::{mpsc, oneshot};

use ember_ledger::BlockData;
use ember_messages::PeerAddress;
use ember_rpc::{ApiError, ApiRequest, BlocksView, HeadSummary};
use ember_transactions::{Transaction, Utxo};

#[derive(Clone)]
pub struct NodeHandle {
    requests: mpsc::Sender<ApiRequest>,
}

impl NodeHandle {
    pub(crate) fn new(requests: mpsc::Sender<ApiRequest>) -> Self {
        Self { requests }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> ApiRequest,
    ) -> Result<T, ApiError> {
        let (tx, rx) = oneshot::channel();
        self.requests
            .send(build(tx))
            .await
            .map_err(|_| ApiError::Unavailable)?;
        rx.await.map_err(|_| ApiError::Unavailable)
    }

    /// Append (or, under PoW, mine) a block carrying `data`. Resolves once
    /// the block is part of the chain.
    pub async fn add_block(&self, data: BlockData) -> Result<HeadSummary, ApiError> {
        self.request(|reply| ApiRequest::AddBlock { data, reply })
            .await?
    }

    pub async fn list_blocks(&self) -> Result<BlocksView, ApiError> {
        self.request(|reply| ApiRequest::ListBlocks { reply }).await
    }

    pub async fn add_peer(&self, peer: PeerAddress) -> Result<(), ApiError> {
        self.request(|reply| ApiRequest::AddPeer { peer, reply })
            .await?
    }

    pub async fn list_peers(&self) -> Result<Vec<PeerAddress>, ApiError> {
        self.request(|reply| ApiRequest::ListPeers { reply }).await
    }

    pub async fn add_transaction(&self, transaction: Transaction) -> Result<(), ApiError> {
        self.request(|reply| ApiRequest::AddTransaction { transaction, reply })
            .await?
    }

    pub async fn list_unspent(&self) -> Result<Vec<Utxo>, ApiError> {
        self.request(|reply| ApiRequest::ListUnspent { reply })
            .await?
    }

    pub async fn list_unconfirmed(&self) -> Result<Vec<Transaction>, ApiError> {
        self.request(|reply| ApiRequest::ListUnconfirmed { reply })
            .await?
    }
}
