//! The HTTP adapter: JSON request handling and status-code mapping. Thin
//! translation only — every operation is forwarded to the orchestrator
//! over its command channel.

mod api;
mod error;
mod server;

pub use api::{ApiError, ApiRequest, BlocksView, HeadSummary};
pub use error::RpcError;
pub use server::RpcServer;

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::{broadcast, mpsc};

    /// A stand-in orchestrator that answers with fixed data.
    fn spawn_stub_node(mut rx: mpsc::Receiver<ApiRequest>) {
        tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                match request {
                    ApiRequest::ListBlocks { reply } => {
                        let _ = reply.send(BlocksView {
                            blocks: Vec::new(),
                            length: 0,
                            valid: false,
                        });
                    }
                    ApiRequest::AddBlock { data, reply } => {
                        let block = ember_ledger::Block::genesis(
                            ember_types::Timestamp::from_millis(0),
                            data,
                        );
                        let _ = reply.send(Ok(HeadSummary {
                            index: block.index,
                            hash: block.hash,
                            length: 1,
                        }));
                    }
                    ApiRequest::ListPeers { reply } => {
                        let _ = reply.send(vec![ember_messages::PeerAddress::new("10.0.0.1", 7)]);
                    }
                    ApiRequest::AddPeer { reply, .. } => {
                        let _ = reply.send(Err(ApiError::Conflict("no route to peer".into())));
                    }
                    ApiRequest::AddTransaction { reply, .. } => {
                        let _ = reply.send(Err(ApiError::BadRequest(
                            "transactions are disabled".into(),
                        )));
                    }
                    ApiRequest::ListUnspent { reply } => {
                        let _ = reply.send(Ok(Vec::new()));
                    }
                    ApiRequest::ListUnconfirmed { reply } => {
                        let _ = reply.send(Ok(Vec::new()));
                    }
                }
            }
        });
    }

    async fn start_server() -> (String, broadcast::Sender<()>) {
        let (tx, rx) = mpsc::channel(16);
        spawn_stub_node(rx);

        let server = RpcServer::bind(("127.0.0.1", 0), tx).await.unwrap();
        let addr = server.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        tokio::spawn(async move {
            server.serve(shutdown_rx).await.unwrap();
        });
        (format!("http://{addr}"), shutdown_tx)
    }

    #[tokio::test]
    async fn get_blocks_returns_view() {
        let (base, _shutdown) = start_server().await;
        let body: serde_json::Value = reqwest::get(format!("{base}/blocks"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["length"], 0);
        assert_eq!(body["valid"], false);
        assert!(body["blocks"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn post_blocks_accepts_string_payload() {
        let (base, _shutdown) = start_server().await;
        let client = reqwest::Client::new();
        let response = client
            .post(format!("{base}/blocks"))
            .json(&serde_json::json!("first"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["index"], 0);
    }

    #[tokio::test]
    async fn post_blocks_rejects_numeric_payload() {
        let (base, _shutdown) = start_server().await;
        let client = reqwest::Client::new();
        let response = client
            .post(format!("{base}/blocks"))
            .json(&serde_json::json!(42))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400);
    }

    #[tokio::test]
    async fn conflict_maps_to_409() {
        let (base, _shutdown) = start_server().await;
        let client = reqwest::Client::new();
        let response = client
            .post(format!("{base}/peers"))
            .json(&serde_json::json!({"host": "10.0.0.1", "port": 7}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 409);
    }

    #[tokio::test]
    async fn malformed_peer_body_maps_to_400() {
        let (base, _shutdown) = start_server().await;
        let client = reqwest::Client::new();
        let response = client
            .post(format!("{base}/peers"))
            .json(&serde_json::json!({"host": "10.0.0.1"}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400);
    }

    #[tokio::test]
    async fn legacy_aliases_are_served() {
        let (base, _shutdown) = start_server().await;
        let client = reqwest::Client::new();

        let listed = client
            .get(format!("{base}/list-blocks"))
            .send()
            .await
            .unwrap();
        assert_eq!(listed.status(), 200);

        let added = client
            .post(format!("{base}/add-block"))
            .json(&serde_json::json!("legacy"))
            .send()
            .await
            .unwrap();
        assert_eq!(added.status(), 200);

        let peers = client
            .get(format!("{base}/list-peers"))
            .send()
            .await
            .unwrap();
        assert_eq!(peers.status(), 200);
    }
}
