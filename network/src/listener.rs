//! Accept loop for the P2P WebSocket endpoint.

use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};

use crate::session;
use crate::PeerEvent;

/// Accept inbound peer connections until shutdown.
///
/// The caller binds the listener so a bind failure can abort startup; this
/// function only runs the accept loop. Each accepted stream performs its
/// handshake on its own task, so a stalled dialer cannot block the loop.
pub async fn serve(
    listener: TcpListener,
    events: mpsc::Sender<PeerEvent>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("peer listener shutting down");
                break;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, addr)) => {
                        tracing::debug!(ip = %addr, "inbound peer connection");
                        let events = events.clone();
                        tokio::spawn(async move {
                            if let Err(e) = session::accept(stream, events).await {
                                tracing::warn!(ip = %addr, error = %e, "inbound session rejected");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                    }
                }
            }
        }
    }
}
