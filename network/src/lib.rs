//! Peer-to-peer transport: the session registry, per-peer WebSocket
//! sessions, and the inbound accept loop.

mod error;
mod listener;
mod registry;
mod session;

use tokio::sync::mpsc;

use ember_messages::{PeerAddress, PeerMessage};

pub use error::NetworkError;
pub use listener::serve;
pub use registry::{BroadcastResult, PeerHandle, PeerRegistry};
pub use session::{accept, dial};

/// What a session reports to the orchestrator.
#[derive(Debug)]
pub enum PeerEvent {
    /// A session reached steady state. `sender` is the session's outbound
    /// queue; `dialed` is true on the initiating side (which follows up
    /// with `QUERY_LATEST_BLOCK`).
    Connected {
        peer: PeerAddress,
        sender: mpsc::Sender<PeerMessage>,
        dialed: bool,
    },
    /// A parsed frame, delivered in arrival order.
    Message {
        peer: PeerAddress,
        message: PeerMessage,
    },
    /// The session ended (close, error, or replacement).
    Disconnected { peer: PeerAddress },
}

#[cfg(test)]
mod session_tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn expect_connected(
        events: &mut mpsc::Receiver<PeerEvent>,
    ) -> (PeerAddress, mpsc::Sender<PeerMessage>, bool) {
        match tokio::time::timeout(std::time::Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
        {
            PeerEvent::Connected { peer, sender, dialed } => (peer, sender, dialed),
            other => panic!("expected Connected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn handshake_keys_session_by_advertised_endpoint() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let (acceptor_tx, mut acceptor_events) = mpsc::channel(16);
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            accept(stream, acceptor_tx).await.unwrap();
        });

        let (dialer_tx, mut dialer_events) = mpsc::channel(16);
        let advertised = PeerAddress::new("127.0.0.1", 4242);
        let remote = PeerAddress::new("127.0.0.1", port);
        dial(advertised.clone(), remote.clone(), dialer_tx)
            .await
            .unwrap();

        let (peer, _sender, dialed) = expect_connected(&mut dialer_events).await;
        assert_eq!(peer, remote);
        assert!(dialed);

        let (peer, _sender, dialed) = expect_connected(&mut acceptor_events).await;
        assert_eq!(peer, advertised, "acceptor keys the session by the HELLO endpoint");
        assert!(!dialed);
    }

    #[tokio::test]
    async fn messages_flow_both_ways_in_order() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let (acceptor_tx, mut acceptor_events) = mpsc::channel(16);
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            accept(stream, acceptor_tx).await.unwrap();
        });

        let (dialer_tx, mut dialer_events) = mpsc::channel(16);
        let advertised = PeerAddress::new("127.0.0.1", 4243);
        dial(
            advertised.clone(),
            PeerAddress::new("127.0.0.1", port),
            dialer_tx,
        )
        .await
        .unwrap();

        let (_, to_server, _) = expect_connected(&mut dialer_events).await;
        let (_, to_client, _) = expect_connected(&mut acceptor_events).await;

        to_server.send(PeerMessage::QueryLatestBlock).await.unwrap();
        to_server.send(PeerMessage::QueryAllBlocks).await.unwrap();

        for expected in [PeerMessage::QueryLatestBlock, PeerMessage::QueryAllBlocks] {
            match tokio::time::timeout(std::time::Duration::from_secs(5), acceptor_events.recv())
                .await
                .unwrap()
                .unwrap()
            {
                PeerEvent::Message { message, .. } => assert_eq!(message, expected),
                other => panic!("expected Message, got {other:?}"),
            }
        }

        to_client.send(PeerMessage::QueryAllBlocks).await.unwrap();
        match tokio::time::timeout(std::time::Duration::from_secs(5), dialer_events.recv())
            .await
            .unwrap()
            .unwrap()
        {
            PeerEvent::Message { message, .. } => {
                assert_eq!(message, PeerMessage::QueryAllBlocks)
            }
            other => panic!("expected Message, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn garbage_flood_closes_the_session() {
        use futures_util::SinkExt;
        use tokio_tungstenite::tungstenite::Message;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let (acceptor_tx, mut acceptor_events) = mpsc::channel(64);
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            accept(stream, acceptor_tx).await.unwrap();
        });

        // A raw client: a well-formed HELLO, then nothing but garbage.
        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://127.0.0.1:{port}/"))
            .await
            .unwrap();
        let hello = PeerMessage::Hello {
            host: "127.0.0.1".into(),
            port: 4245,
        };
        ws.send(Message::Text(hello.to_json())).await.unwrap();

        let (_, _keep_alive, _) = expect_connected(&mut acceptor_events).await;

        for _ in 0..32 {
            if ws.send(Message::Text("not a peer message".into())).await.is_err() {
                break; // session already closed under us
            }
        }

        loop {
            match tokio::time::timeout(std::time::Duration::from_secs(5), acceptor_events.recv())
                .await
                .expect("acceptor must close the session")
                .expect("event channel closed")
            {
                PeerEvent::Disconnected { .. } => break,
                PeerEvent::Message { message, .. } => {
                    panic!("garbage must not surface as a message: {message:?}")
                }
                PeerEvent::Connected { .. } => panic!("unexpected second session"),
            }
        }
    }

    #[tokio::test]
    async fn dropping_the_handle_disconnects_the_peer() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let (acceptor_tx, mut acceptor_events) = mpsc::channel(16);
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            accept(stream, acceptor_tx).await.unwrap();
        });

        let (dialer_tx, mut dialer_events) = mpsc::channel(16);
        dial(
            PeerAddress::new("127.0.0.1", 4244),
            PeerAddress::new("127.0.0.1", port),
            dialer_tx,
        )
        .await
        .unwrap();

        let (_, sender, _) = expect_connected(&mut dialer_events).await;
        let (_, _keep_alive, _) = expect_connected(&mut acceptor_events).await;
        drop(sender);

        match tokio::time::timeout(std::time::Duration::from_secs(5), acceptor_events.recv())
            .await
            .unwrap()
            .unwrap()
        {
            PeerEvent::Disconnected { .. } => {}
            other => panic!("expected Disconnected, got {other:?}"),
        }
    }
}
