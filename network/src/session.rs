//! One WebSocket session per peer pair.
//!
//! Both directions run through [`run_session`]: a single task that drains
//! the outbound channel into the sink and parses inbound text frames into
//! [`PeerMessage`]s, delivered to the orchestrator in arrival order via
//! the event channel. Sessions never touch node state directly.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, connect_async, WebSocketStream};

use ember_messages::{PeerAddress, PeerMessage};

use crate::error::NetworkError;
use crate::PeerEvent;

/// How long the acceptor waits for the opening `HELLO` frame.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Capacity of a session's outbound queue.
const OUTBOUND_CAPACITY: usize = 64;

/// Malformed frames tolerated before a session is closed. The peer is not
/// banned; a manual re-add opens a fresh session.
const MAX_MALFORMED_FRAMES: u32 = 16;

/// Dial a peer's listening endpoint and start a session.
///
/// `local` is this node's own listening endpoint, advertised in the
/// opening `HELLO` so the acceptor can key the session. Returns once the
/// connection is established; the session itself runs in a spawned task
/// and reports through `events`.
pub async fn dial(
    local: PeerAddress,
    remote: PeerAddress,
    events: mpsc::Sender<PeerEvent>,
) -> Result<(), NetworkError> {
    let (ws, _response) = connect_async(remote.ws_url()).await?;
    tracing::debug!(peer = %remote, "outbound session established");

    let (out_tx, out_rx) = mpsc::channel(OUTBOUND_CAPACITY);

    // The HELLO must be the first frame on the wire; it is queued before
    // the sender is handed to anyone else.
    let hello = PeerMessage::Hello {
        host: local.host.clone(),
        port: local.port,
    };
    out_tx
        .send(hello)
        .await
        .expect("freshly created channel cannot be closed");

    let connected = PeerEvent::Connected {
        peer: remote.clone(),
        sender: out_tx,
        dialed: true,
    };
    if events.send(connected).await.is_err() {
        return Ok(()); // node is shutting down
    }

    tokio::spawn(run_session(ws, remote, events, out_rx));
    Ok(())
}

/// Take over an inbound TCP connection: perform the WebSocket upgrade,
/// wait for the peer's `HELLO`, and start the session.
pub async fn accept(stream: TcpStream, events: mpsc::Sender<PeerEvent>) -> Result<(), NetworkError> {
    let remote_ip = stream
        .peer_addr()
        .map(|a| a.ip().to_string())
        .unwrap_or_else(|_| "unknown".into());
    let mut ws = accept_async(stream).await?;

    let peer = match tokio::time::timeout(HANDSHAKE_TIMEOUT, read_hello(&mut ws)).await {
        Ok(Ok(addr)) => addr,
        Ok(Err(e)) => {
            tracing::warn!(ip = %remote_ip, error = %e, "inbound handshake failed");
            return Err(e);
        }
        Err(_) => {
            tracing::warn!(ip = %remote_ip, "inbound handshake timed out");
            return Err(NetworkError::Handshake("timed out waiting for HELLO".into()));
        }
    };
    tracing::debug!(peer = %peer, ip = %remote_ip, "inbound session established");

    let (out_tx, out_rx) = mpsc::channel(OUTBOUND_CAPACITY);
    let connected = PeerEvent::Connected {
        peer: peer.clone(),
        sender: out_tx,
        dialed: false,
    };
    if events.send(connected).await.is_err() {
        return Ok(());
    }

    tokio::spawn(run_session(ws, peer, events, out_rx));
    Ok(())
}

/// Read frames until the opening `HELLO` arrives.
async fn read_hello<S>(ws: &mut WebSocketStream<S>) -> Result<PeerAddress, NetworkError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(frame) = ws.next().await {
        match frame? {
            Message::Text(text) => {
                return match PeerMessage::from_json(&text) {
                    Ok(PeerMessage::Hello { host, port }) => Ok(PeerAddress::new(host, port)),
                    Ok(other) => Err(NetworkError::Handshake(format!(
                        "expected HELLO, got {other:?}"
                    ))),
                    Err(e) => Err(NetworkError::Handshake(e.to_string())),
                };
            }
            Message::Close(_) => break,
            _ => continue,
        }
    }
    Err(NetworkError::Handshake("connection closed before HELLO".into()))
}

/// The session body: pump outbound messages and inbound frames until
/// either side goes away, then report the disconnect.
async fn run_session<S>(
    ws: WebSocketStream<S>,
    peer: PeerAddress,
    events: mpsc::Sender<PeerEvent>,
    mut outbound: mpsc::Receiver<PeerMessage>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut sink, mut stream) = ws.split();
    let mut malformed_frames: u32 = 0;

    loop {
        tokio::select! {
            queued = outbound.recv() => {
                match queued {
                    Some(message) => {
                        if let Err(e) = sink.send(Message::Text(message.to_json())).await {
                            tracing::debug!(peer = %peer, error = %e, "send failed, closing session");
                            break;
                        }
                    }
                    None => {
                        // Registry dropped this session; close cooperatively.
                        let _ = sink.close().await;
                        break;
                    }
                }
            }
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        match PeerMessage::from_json(&text) {
                            // A repeated HELLO after the handshake carries nothing new.
                            Ok(PeerMessage::Hello { .. }) => {}
                            Ok(message) => {
                                let event = PeerEvent::Message { peer: peer.clone(), message };
                                if events.send(event).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                malformed_frames += 1;
                                tracing::warn!(
                                    peer = %peer,
                                    error = %e,
                                    count = malformed_frames,
                                    "dropping malformed frame"
                                );
                                if malformed_frames >= MAX_MALFORMED_FRAMES {
                                    tracing::warn!(
                                        peer = %peer,
                                        "too many malformed frames, closing session"
                                    );
                                    let _ = sink.close().await;
                                    break;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::debug!(peer = %peer, "peer closed session");
                        break;
                    }
                    Some(Ok(_)) => {} // ping/pong/binary
                    Some(Err(e)) => {
                        tracing::debug!(peer = %peer, error = %e, "session transport error");
                        break;
                    }
                }
            }
        }
    }

    let _ = events.send(PeerEvent::Disconnected { peer }).await;
}
