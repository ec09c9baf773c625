//! Wire messages for node-to-node gossip.
//!
//! One JSON object per WebSocket text frame, discriminated by the `type`
//! field. `HELLO` opens every session and carries the sender's listening
//! endpoint; the four query/response kinds drive chain reconciliation;
//! `RESPONSE_TRANSACTION` floods mempool entries.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use ember_ledger::Block;
use ember_transactions::Transaction;

/// A peer's listening endpoint. This is the peer's identity: sessions are
/// keyed by it regardless of which side dialed.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerAddress {
    pub host: String,
    pub port: u16,
}

impl PeerAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Canonical registry key, `"host:port"`.
    pub fn key(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The WebSocket URL for dialing this peer.
    pub fn ws_url(&self) -> String {
        format!("ws://{}:{}/", self.host, self.port)
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Every message exchanged between peers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PeerMessage {
    /// Session handshake: the sender's listening endpoint.
    #[serde(rename = "HELLO")]
    Hello { host: String, port: u16 },

    /// Ask the peer for its head block.
    #[serde(rename = "QUERY_LATEST_BLOCK")]
    QueryLatestBlock,

    /// Ask the peer for its full chain.
    #[serde(rename = "QUERY_ALL_BLOCKS")]
    QueryAllBlocks,

    /// The peer's head block; also the unsolicited broadcast sent on local
    /// chain extension.
    #[serde(rename = "RESPONSE_LATEST_BLOCK")]
    ResponseLatestBlock { block: Block },

    /// The peer's full chain, genesis first.
    #[serde(rename = "RESPONSE_ALL_BLOCKS")]
    ResponseAllBlocks { blocks: Vec<Block> },

    /// A mempool transaction being flooded through the mesh.
    #[serde(rename = "RESPONSE_TRANSACTION")]
    ResponseTransaction { transaction: Transaction },
}

impl PeerMessage {
    /// Encode for the wire.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("peer messages always serialize to JSON")
    }

    /// Decode a received frame.
    pub fn from_json(frame: &str) -> Result<Self, MessageError> {
        serde_json::from_str(frame).map_err(|e| MessageError::Malformed(e.to_string()))
    }
}

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("malformed peer message: {0}")]
    Malformed(String),
}
