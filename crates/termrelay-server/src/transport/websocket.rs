//! WebSocket listener using tokio-tungstenite.
//!
//! Every accepted connection becomes one relay session. Events travel as
//! JSON text frames; binary frames are ignored.

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use termrelay_core::{RelayError, RelayResult};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

/// A handle to an accepted WebSocket connection.
pub struct WebSocketConnection {
    /// The WebSocket stream.
    pub ws_stream: tokio_tungstenite::WebSocketStream<TcpStream>,
    /// Remote address.
    pub remote_addr: SocketAddr,
}

/// Start the WebSocket listener.
///
/// Returns the bound address (useful when binding port 0) and a receiver
/// that yields connections whose handshake completed.
pub async fn start_listener(
    bind_addr: SocketAddr,
) -> RelayResult<(SocketAddr, mpsc::Receiver<WebSocketConnection>)> {
    let tcp_listener = TcpListener::bind(bind_addr)
        .await
        .map_err(|e| RelayError::Transport(format!("WS bind failed: {e}")))?;
    let local_addr = tcp_listener.local_addr()?;

    info!(addr = %local_addr, "WebSocket listener started");

    let (tx, rx) = mpsc::channel::<WebSocketConnection>(64);

    tokio::spawn(async move {
        loop {
            match tcp_listener.accept().await {
                Ok((stream, addr)) => {
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        match tokio_tungstenite::accept_async(stream).await {
                            Ok(ws_stream) => {
                                debug!(remote = %addr, "WebSocket connection accepted");
                                let conn = WebSocketConnection {
                                    ws_stream,
                                    remote_addr: addr,
                                };
                                if tx.send(conn).await.is_err() {
                                    warn!("WebSocket connection channel closed");
                                }
                            }
                            Err(e) => {
                                warn!(remote = %addr, error = %e, "WebSocket handshake failed");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "TCP accept failed");
                }
            }
            if tx.is_closed() {
                debug!("connection receiver dropped, listener exiting");
                break;
            }
        }
    });

    Ok((local_addr, rx))
}

/// Send a text frame.
pub async fn ws_send_text(
    ws: &mut tokio_tungstenite::WebSocketStream<TcpStream>,
    text: &str,
) -> RelayResult<()> {
    ws.send(Message::Text(text.to_string().into()))
        .await
        .map_err(|e| RelayError::Transport(format!("WS send failed: {e}")))
}

/// Send a close frame. Errors are ignored; the peer may already be gone.
pub async fn ws_close(ws: &mut tokio_tungstenite::WebSocketStream<TcpStream>) {
    let _ = ws.send(Message::Close(None)).await;
}

/// Maximum accepted frame size (1 MiB).
const MAX_WS_FRAME_SIZE: usize = 1_048_576;

/// Receive the next text frame.
///
/// Returns `None` once the connection is closed. Binary frames are ignored,
/// pings answered, and frames larger than 1 MiB rejected.
pub async fn ws_recv_text(
    ws: &mut tokio_tungstenite::WebSocketStream<TcpStream>,
) -> RelayResult<Option<String>> {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => {
                if text.len() > MAX_WS_FRAME_SIZE {
                    return Err(RelayError::InvalidMessage(format!(
                        "WS frame too large: {} bytes (max {})",
                        text.len(),
                        MAX_WS_FRAME_SIZE
                    )));
                }
                return Ok(Some(text.to_string()));
            }
            Some(Ok(Message::Close(_))) => return Ok(None),
            Some(Ok(Message::Ping(payload))) => {
                let _ = ws.send(Message::Pong(payload)).await;
            }
            Some(Ok(_)) => {
                // Binary, pong and raw frames carry no events.
                continue;
            }
            Some(Err(e)) => {
                return Err(RelayError::Transport(format!("WS recv failed: {e}")));
            }
            None => return Ok(None),
        }
    }
}
