//! The node orchestrator: sole writer of chain, UTXO set, and mempool.
//!
//! HTTP requests, inbound peer messages, and miner results all enter one
//! command loop and are processed to completion in dequeue order, so the
//! chain transitions monotonically through validated states. The only
//! state shared with a background worker is the miner's cancel flag.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::Instrument;

use ember_ledger::{Block, BlockData, Blockchain, ChainError};
use ember_messages::{PeerAddress, PeerMessage};
use ember_network::{PeerEvent, PeerHandle, PeerRegistry};
use ember_rpc::{ApiError, ApiRequest, BlocksView, HeadSummary, RpcServer};
use ember_transactions::{Mempool, Transaction};
use ember_types::{Hash, Timestamp};

use crate::config::NodeConfig;
use crate::error::NodeError;
use crate::handle::NodeHandle;
use crate::miner::{self, MinedBlock, MiningCandidate};
use crate::shutdown::ShutdownController;

const API_CHANNEL_CAPACITY: usize = 256;
const EVENT_CHANNEL_CAPACITY: usize = 256;
const MINED_CHANNEL_CAPACITY: usize = 16;
/// Upper bound on an outbound peer dial, handshake included.
const DIAL_TIMEOUT: Duration = Duration::from_secs(5);

type BlockReply = oneshot::Sender<Result<HeadSummary, ApiError>>;

/// A running node: listeners, orchestrator, and (under PoW) the miner.
pub struct Node {
    handle: NodeHandle,
    shutdown: Arc<ShutdownController>,
    peer_addr: PeerAddress,
    http_addr: std::net::SocketAddr,
    tasks: Vec<JoinHandle<()>>,
}

impl Node {
    /// Bind both listeners and start every task. Either bind failing is
    /// fatal and nothing keeps running.
    pub async fn start(config: NodeConfig) -> Result<Self, NodeError> {
        let (api_tx, api_rx) = mpsc::channel::<ApiRequest>(API_CHANNEL_CAPACITY);
        let (events_tx, events_rx) = mpsc::channel::<PeerEvent>(EVENT_CHANNEL_CAPACITY);
        let (mined_tx, mined_rx) = mpsc::channel::<MinedBlock>(MINED_CHANNEL_CAPACITY);

        let ws_listener =
            TcpListener::bind((config.websocket_host.as_str(), config.websocket_port))
                .await
                .map_err(|e| {
                    NodeError::Bind(format!(
                        "{}:{}: {e}",
                        config.websocket_host, config.websocket_port
                    ))
                })?;
        let ws_port = ws_listener
            .local_addr()
            .map_err(|e| NodeError::Bind(e.to_string()))?
            .port();
        let peer_addr = PeerAddress::new(config.websocket_host.clone(), ws_port);

        let rpc = RpcServer::bind((config.http_host.as_str(), config.http_port), api_tx.clone())
            .await?;
        let http_addr = rpc.local_addr()?;

        tracing::info!(
            name = %config.name,
            ws = %peer_addr,
            http = %http_addr,
            "node listening"
        );

        let shutdown = Arc::new(ShutdownController::new());
        let mut tasks = Vec::new();

        let rpc_shutdown = shutdown.subscribe();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = rpc.serve(rpc_shutdown).await {
                tracing::error!(error = %e, "HTTP server exited");
            }
        }));

        tasks.push(tokio::spawn(ember_network::serve(
            ws_listener,
            events_tx.clone(),
            shutdown.subscribe(),
        )));

        let orchestrator = Orchestrator {
            chain: Blockchain::new(config.chain.clone()),
            mempool: Mempool::new(),
            registry: PeerRegistry::new(),
            self_addr: peer_addr.clone(),
            events_tx,
            mined_tx,
            mining: None,
            pending: VecDeque::new(),
        };
        let span = tracing::info_span!("node", name = %config.name);
        let orchestrator_shutdown = shutdown.subscribe();
        tasks.push(tokio::spawn(
            orchestrator
                .run(api_rx, events_rx, mined_rx, orchestrator_shutdown)
                .instrument(span),
        ));

        Ok(Self {
            handle: NodeHandle::new(api_tx),
            shutdown,
            peer_addr,
            http_addr,
            tasks,
        })
    }

    /// An in-process client for the command queue.
    pub fn handle(&self) -> NodeHandle {
        self.handle.clone()
    }

    /// The endpoint other nodes use in `POST /peers`.
    pub fn peer_addr(&self) -> PeerAddress {
        self.peer_addr.clone()
    }

    pub fn http_addr(&self) -> std::net::SocketAddr {
        self.http_addr
    }

    /// Block until SIGINT/SIGTERM, then trigger shutdown.
    pub async fn wait_for_signal(&self) {
        self.shutdown.wait_for_signal().await;
    }

    /// Trigger shutdown and wait for the tasks to drain.
    pub async fn stop(self) {
        self.shutdown.shutdown();
        for task in self.tasks {
            let _ = tokio::time::timeout(Duration::from_secs(5), task).await;
        }
    }
}

/// An in-flight proof-of-work job.
struct MiningJob {
    /// The payload as submitted, before any mempool drain; restarts
    /// re-assemble from the then-current mempool.
    data: BlockData,
    reply: Option<BlockReply>,
    cancel: Arc<AtomicBool>,
}

struct Orchestrator {
    chain: Blockchain,
    mempool: Mempool,
    registry: PeerRegistry,
    self_addr: PeerAddress,
    events_tx: mpsc::Sender<PeerEvent>,
    mined_tx: mpsc::Sender<MinedBlock>,
    mining: Option<MiningJob>,
    /// Block submissions waiting for the miner, oldest first.
    pending: VecDeque<(BlockData, BlockReply)>,
}

impl Orchestrator {
    async fn run(
        mut self,
        mut api_rx: mpsc::Receiver<ApiRequest>,
        mut events_rx: mpsc::Receiver<PeerEvent>,
        mut mined_rx: mpsc::Receiver<MinedBlock>,
        mut shutdown_rx: tokio::sync::broadcast::Receiver<()>,
    ) {
        loop {
            // Peer events are drained before API commands: an `add_peer`
            // reply guarantees its session's Connected event is already
            // queued, and a follow-up `add_block` must see that session.
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    if let Some(job) = self.mining.take() {
                        job.cancel.store(true, Ordering::Relaxed);
                    }
                    tracing::info!("orchestrator shutting down");
                    break;
                }
                Some(event) = events_rx.recv() => self.handle_peer_event(event).await,
                Some(request) = api_rx.recv() => self.handle_api(request).await,
                Some(mined) = mined_rx.recv() => self.handle_mined(mined).await,
                else => break,
            }
        }
    }

    // ── HTTP-origin commands ───────────────────────────────────────────

    async fn handle_api(&mut self, request: ApiRequest) {
        match request {
            ApiRequest::AddBlock { data, reply } => self.handle_add_block(data, reply).await,
            ApiRequest::ListBlocks { reply } => {
                let _ = reply.send(BlocksView {
                    blocks: self.chain.blocks().to_vec(),
                    length: self.chain.len(),
                    valid: self.chain.validate().is_ok(),
                });
            }
            ApiRequest::AddPeer { peer, reply } => self.handle_add_peer(peer, reply).await,
            ApiRequest::ListPeers { reply } => {
                let _ = reply.send(self.registry.addresses());
            }
            ApiRequest::AddTransaction { transaction, reply } => {
                self.handle_add_transaction(transaction, reply).await;
            }
            ApiRequest::ListUnspent { reply } => {
                let result = if self.chain.params().transactions_enabled() {
                    Ok(self.chain.utxo().to_list())
                } else {
                    Err(ApiError::BadRequest("transactions are disabled".into()))
                };
                let _ = reply.send(result);
            }
            ApiRequest::ListUnconfirmed { reply } => {
                let result = if self.chain.params().transactions_enabled() {
                    Ok(self.mempool.transactions().to_vec())
                } else {
                    Err(ApiError::BadRequest("transactions are disabled".into()))
                };
                let _ = reply.send(result);
            }
        }
    }

    async fn handle_add_block(&mut self, data: BlockData, reply: BlockReply) {
        let payload_fits = match &data {
            BlockData::Text(_) => !self.chain.params().transactions_enabled(),
            BlockData::Transactions(_) => self.chain.params().transactions_enabled(),
        };
        if !payload_fits {
            let _ = reply.send(Err(ApiError::BadRequest(
                "block payload does not match the node's configured variant".into(),
            )));
            return;
        }

        // Reject invalid transaction payloads up front rather than after
        // (or worse, during) a nonce search.
        if let (BlockData::Transactions(txs), Some(tx_params)) =
            (&data, self.chain.params().transaction.as_ref())
        {
            if let Err(e) =
                ember_transactions::verify_block_transactions(txs, self.chain.utxo(), tx_params)
            {
                tracing::warn!(error = %e, "rejected block submission");
                let _ = reply.send(Err(ApiError::Conflict(e.to_string())));
                return;
            }
        }

        if self.chain.params().pow_enabled() {
            // Mining answers the request when the block lands.
            if self.mining.is_some() {
                self.pending.push_back((data, reply));
            } else {
                self.start_mining(data, Some(reply));
            }
            return;
        }

        let payload = self.assemble_payload(&data);
        let timestamp = self
            .chain
            .head()
            .map(|h| Timestamp::now().max(h.timestamp))
            .unwrap_or_else(Timestamp::now);
        let block = Block::new(
            self.chain.next_index(),
            timestamp,
            payload,
            self.chain.head().map(|h| h.hash).unwrap_or(Hash::ZERO),
            0,
        );

        match self.chain.append(block) {
            Ok(()) => {
                tracing::info!(index = self.chain.len() - 1, "appended block");
                let summary = self.head_summary();
                self.after_block_accepted(None).await;
                let _ = reply.send(Ok(summary));
            }
            Err(e) => {
                tracing::warn!(error = %e, "rejected submitted block data");
                let _ = reply.send(Err(chain_error_to_api(e)));
            }
        }
    }

    async fn handle_add_peer(
        &mut self,
        peer: PeerAddress,
        reply: oneshot::Sender<Result<(), ApiError>>,
    ) {
        if peer == self.self_addr {
            let _ = reply.send(Err(ApiError::BadRequest("cannot peer with self".into())));
            return;
        }
        if self.registry.contains(&peer) {
            let _ = reply.send(Ok(()));
            return;
        }

        tracing::info!(peer = %peer, "adding peer");
        let dial = ember_network::dial(self.self_addr.clone(), peer.clone(), self.events_tx.clone());
        let result = match tokio::time::timeout(DIAL_TIMEOUT, dial).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                tracing::warn!(peer = %peer, error = %e, "failed to connect to peer");
                Err(ApiError::Conflict(format!("failed to connect to {peer}: {e}")))
            }
            Err(_) => {
                tracing::warn!(peer = %peer, "connection to peer timed out");
                Err(ApiError::Conflict(format!("connection to {peer} timed out")))
            }
        };
        let _ = reply.send(result);
    }

    async fn handle_add_transaction(
        &mut self,
        transaction: Transaction,
        reply: oneshot::Sender<Result<(), ApiError>>,
    ) {
        let Some(tx_params) = self.chain.params().transaction.clone() else {
            let _ = reply.send(Err(ApiError::BadRequest(
                "transactions are disabled".into(),
            )));
            return;
        };

        match self
            .mempool
            .add(transaction.clone(), self.chain.utxo(), &tx_params)
        {
            Ok(true) => {
                tracing::info!(hash = %transaction.hash, "accepted transaction into mempool");
                let flood = PeerMessage::ResponseTransaction { transaction };
                self.registry.broadcast(&flood, None).await;
                let _ = reply.send(Ok(()));
            }
            Ok(false) => {
                let _ = reply.send(Ok(())); // resubmission is a no-op
            }
            Err(e) => {
                tracing::warn!(error = %e, "rejected transaction");
                let _ = reply.send(Err(ApiError::Conflict(e.to_string())));
            }
        }
    }

    // ── Peer-origin commands ───────────────────────────────────────────

    async fn handle_peer_event(&mut self, event: PeerEvent) {
        match event {
            PeerEvent::Connected { peer, sender, dialed } => {
                tracing::info!(peer = %peer, dialed, "peer session established");
                self.registry.insert(PeerHandle {
                    addr: peer.clone(),
                    sender,
                });
                if dialed {
                    self.registry
                        .send_to(&peer, PeerMessage::QueryLatestBlock)
                        .await;
                }
            }
            PeerEvent::Disconnected { peer } => {
                // Only drop the entry if it belongs to the session that
                // ended; a replacement session may already be registered.
                let gone = self
                    .registry
                    .get(&peer)
                    .map(|h| h.sender.is_closed())
                    .unwrap_or(false);
                if gone {
                    self.registry.remove(&peer);
                    tracing::info!(peer = %peer, "peer disconnected");
                }
            }
            PeerEvent::Message { peer, message } => self.handle_peer_message(peer, message).await,
        }
    }

    async fn handle_peer_message(&mut self, peer: PeerAddress, message: PeerMessage) {
        match message {
            PeerMessage::QueryLatestBlock => {
                if let Some(head) = self.chain.head() {
                    let response = PeerMessage::ResponseLatestBlock { block: head.clone() };
                    self.registry.send_to(&peer, response).await;
                } else {
                    tracing::debug!(peer = %peer, "no blocks to answer QUERY_LATEST_BLOCK");
                }
            }
            PeerMessage::QueryAllBlocks => {
                let response = PeerMessage::ResponseAllBlocks {
                    blocks: self.chain.blocks().to_vec(),
                };
                self.registry.send_to(&peer, response).await;
            }
            PeerMessage::ResponseLatestBlock { block } => {
                self.reconcile_head(&peer, block).await;
            }
            PeerMessage::ResponseAllBlocks { blocks } => {
                self.reconcile_chain(&peer, blocks).await;
            }
            PeerMessage::ResponseTransaction { transaction } => {
                self.handle_transaction_flood(&peer, transaction).await;
            }
            PeerMessage::Hello { .. } => {} // consumed by the session layer
        }
    }

    /// The §4.2 reconciliation algorithm for a received head block.
    async fn reconcile_head(&mut self, peer: &PeerAddress, block: Block) {
        enum Action {
            Append,
            Ignore,
            QueryAll,
        }

        let action = match self.chain.head() {
            None => {
                if block.index == 0 {
                    Action::Append
                } else {
                    Action::QueryAll
                }
            }
            Some(head) => {
                if block.index == head.index + 1 && block.previous_hash == head.hash {
                    Action::Append
                } else if block.index <= head.index {
                    let already_known = self
                        .chain
                        .blocks()
                        .get(block.index as usize)
                        .map(|known| known.hash == block.hash)
                        .unwrap_or(false);
                    if already_known {
                        Action::Ignore
                    } else {
                        Action::QueryAll
                    }
                } else {
                    Action::QueryAll
                }
            }
        };

        match action {
            Action::Append => match self.chain.append(block) {
                Ok(()) => {
                    tracing::info!(
                        peer = %peer,
                        index = self.chain.len() - 1,
                        "appended block from peer"
                    );
                    self.after_block_accepted(Some(peer)).await;
                }
                Err(e) if e.is_stale() => {
                    // Lost a successor race; resynchronize.
                    tracing::debug!(peer = %peer, error = %e, "stale block, re-querying");
                    self.registry
                        .send_to(peer, PeerMessage::QueryAllBlocks)
                        .await;
                }
                Err(e) => {
                    tracing::warn!(peer = %peer, error = %e, "dropping invalid block");
                }
            },
            Action::Ignore => {
                tracing::trace!(peer = %peer, "head already known");
            }
            Action::QueryAll => {
                tracing::debug!(peer = %peer, "head does not extend local chain, querying all");
                self.registry
                    .send_to(peer, PeerMessage::QueryAllBlocks)
                    .await;
            }
        }
    }

    /// Whole-chain replacement for a received full chain.
    async fn reconcile_chain(&mut self, peer: &PeerAddress, blocks: Vec<Block>) {
        match self.chain.replace(blocks) {
            Ok(()) => {
                if let Some(tx_params) = self.chain.params().transaction.clone() {
                    self.mempool.revalidate(self.chain.utxo(), &tx_params);
                }
                if let Some(head) = self.chain.head().cloned() {
                    let broadcast = PeerMessage::ResponseLatestBlock { block: head };
                    self.registry.broadcast(&broadcast, Some(peer)).await;
                }
                if let Some(job) = self.mining.take() {
                    job.cancel.store(true, Ordering::Relaxed);
                    self.start_mining(job.data, job.reply);
                }
            }
            Err(ChainError::NotPreferred) => {
                tracing::debug!(peer = %peer, "received chain is not preferred, dropping");
            }
            Err(e) => {
                tracing::warn!(peer = %peer, error = %e, "received invalid chain, dropping");
            }
        }
    }

    async fn handle_transaction_flood(&mut self, peer: &PeerAddress, transaction: Transaction) {
        let Some(tx_params) = self.chain.params().transaction.clone() else {
            tracing::debug!(peer = %peer, "ignoring transaction, transactions are disabled");
            return;
        };
        match self
            .mempool
            .add(transaction.clone(), self.chain.utxo(), &tx_params)
        {
            Ok(true) => {
                tracing::debug!(peer = %peer, hash = %transaction.hash, "learned transaction");
                let flood = PeerMessage::ResponseTransaction { transaction };
                self.registry.broadcast(&flood, Some(peer)).await;
            }
            Ok(false) => {} // already known, stop the flood here
            Err(e) => {
                tracing::debug!(peer = %peer, error = %e, "dropping peer transaction");
            }
        }
    }

    // ── Miner results ──────────────────────────────────────────────────

    async fn handle_mined(&mut self, mined: MinedBlock) {
        let Some(job) = self.mining.take() else {
            tracing::debug!("dropping mined block with no active job");
            return;
        };

        let block = mined.block;
        let extends_head = block.index == self.chain.next_index()
            && block.previous_hash == self.chain.head().map(|h| h.hash).unwrap_or(Hash::ZERO);
        if !extends_head {
            // A late result from a search that was already cancelled and
            // replaced: the active job's candidate always extends the
            // current head, so this block cannot be its result. Leave the
            // active search running.
            tracing::debug!(index = block.index, "dropping stale mined block");
            self.mining = Some(job);
            return;
        }

        match self.chain.append(block) {
            Ok(()) => {
                tracing::info!(index = self.chain.len() - 1, "appended mined block");
                let summary = self.head_summary();
                self.after_block_accepted(None).await;
                if let Some(reply) = job.reply {
                    let _ = reply.send(Ok(summary));
                }
                if let Some((data, reply)) = self.pending.pop_front() {
                    self.start_mining(data, Some(reply));
                }
            }
            Err(e) => {
                // The payload went invalid under the current chain (e.g.
                // its inputs were spent by a replacement); fail the
                // request rather than mine it forever.
                tracing::warn!(error = %e, "mined block failed validation, dropping job");
                if let Some(reply) = job.reply {
                    let _ = reply.send(Err(chain_error_to_api(e)));
                }
                if let Some((data, reply)) = self.pending.pop_front() {
                    self.start_mining(data, Some(reply));
                }
            }
        }
    }

    // ── Shared plumbing ────────────────────────────────────────────────

    /// Everything that follows any accepted block: mempool cleanup, the
    /// head broadcast (skipping the peer it came from), and a miner
    /// restart against the new head.
    async fn after_block_accepted(&mut self, from_peer: Option<&PeerAddress>) {
        let head = self
            .chain
            .head()
            .cloned()
            .expect("a block was just accepted");

        if let BlockData::Transactions(txs) = &head.data {
            let dropped = self.mempool.remove_confirmed(txs);
            if dropped > 0 {
                tracing::debug!(dropped, "pruned mempool after block acceptance");
            }
        }

        let broadcast = PeerMessage::ResponseLatestBlock { block: head };
        self.registry.broadcast(&broadcast, from_peer).await;

        if let Some(job) = self.mining.take() {
            job.cancel.store(true, Ordering::Relaxed);
            self.start_mining(job.data, job.reply);
        }
    }

    /// Spawn a nonce search for `data` against the current head.
    fn start_mining(&mut self, data: BlockData, reply: Option<BlockReply>) {
        let candidate = MiningCandidate {
            index: self.chain.next_index(),
            previous_hash: self.chain.head().map(|h| h.hash).unwrap_or(Hash::ZERO),
            data: self.assemble_payload(&data),
            target_bits: self.chain.target_bits().unwrap_or(0),
            floor_timestamp: self
                .chain
                .head()
                .map(|h| h.timestamp)
                .unwrap_or(Timestamp::EPOCH),
        };
        tracing::debug!(
            index = candidate.index,
            bits = candidate.target_bits,
            "starting nonce search"
        );
        let cancel = Arc::new(AtomicBool::new(false));
        miner::spawn(candidate, cancel.clone(), self.mined_tx.clone());
        self.mining = Some(MiningJob { data, reply, cancel });
    }

    /// In transaction mode, extend a submitted payload with mempool
    /// entries, in arrival order, after the reward.
    fn assemble_payload(&self, data: &BlockData) -> BlockData {
        match (data, self.chain.params().transactions_enabled()) {
            (BlockData::Transactions(txs), true) => {
                let mut all = txs.clone();
                let drained = self
                    .mempool
                    .select_for_block(self.chain.utxo(), all.len() as u64);
                if !drained.is_empty() {
                    tracing::debug!(count = drained.len(), "drained mempool into block");
                }
                all.extend(drained);
                BlockData::Transactions(all)
            }
            _ => data.clone(),
        }
    }

    fn head_summary(&self) -> HeadSummary {
        let head = self.chain.head().expect("chain is not empty");
        HeadSummary {
            index: head.index,
            hash: head.hash,
            length: self.chain.len(),
        }
    }
}

fn chain_error_to_api(e: ChainError) -> ApiError {
    match e {
        ChainError::BadPayload => {
            ApiError::BadRequest("block payload does not match the node's configured variant".into())
        }
        other => ApiError::Conflict(other.to_string()),
    }
}
