//! WebSocket transport
//!
//! Accepts viewer connections and translates their frames into relay calls:
//! - Registers a `Connection` with the relay for each accepted socket
//! - Spawns a writer task draining the connection's bounded queue into the socket
//! - Routes `token:` handshakes and subscribe requests to the relay
//! - Unregisters the connection when the peer closes, the transport fails, or
//!   the writer stops; whichever happens first wins
//!
//! Malformed frames are logged and dropped; the connection stays open.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::spawn;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::accept_async;
use tracing::{debug, info, warn};
use tungstenite::protocol::Message as WsMessage;

use crate::connection::Connection;
use crate::relay::Relay;
use crate::transport::message::ClientMessage;

/// Binds `addr` and serves viewers until the listener fails.
pub async fn start_websocket_server(
    addr: String,
    relay: Arc<Relay>,
    queue_capacity: usize,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(&addr).await?;
    info!("WebSocket server listening on ws://{addr}");
    serve_websocket(listener, relay, queue_capacity).await
}

/// How long a peer gets to complete the WebSocket upgrade.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Serves viewers on an already bound listener.
pub async fn serve_websocket(
    listener: TcpListener,
    relay: Arc<Relay>,
    queue_capacity: usize,
) -> std::io::Result<()> {
    serve_with_handshake_timeout(listener, relay, queue_capacity, HANDSHAKE_TIMEOUT).await
}

pub(crate) async fn serve_with_handshake_timeout(
    listener: TcpListener,
    relay: Arc<Relay>,
    queue_capacity: usize,
    handshake_timeout: Duration,
) -> std::io::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        debug!(%peer, "tcp connection accepted");
        spawn(handle_connection(
            stream,
            relay.clone(),
            queue_capacity,
            handshake_timeout,
        ));
    }
}

async fn handle_connection(
    stream: TcpStream,
    relay: Arc<Relay>,
    queue_capacity: usize,
    handshake_timeout: Duration,
) {
    let ws_stream = match timeout(handshake_timeout, accept_async(stream)).await {
        Ok(Ok(ws)) => ws,
        Ok(Err(e)) => {
            warn!("WebSocket handshake error: {e}");
            return;
        }
        Err(_) => {
            warn!("WebSocket handshake timed out after {handshake_timeout:?}");
            return;
        }
    };
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (tx, mut rx) = mpsc::channel::<WsMessage>(queue_capacity.max(1));
    let connection = relay.register_connection(tx);
    info!(connection = %connection.id(), "web socket connected");

    // relay -> peer
    {
        let relay = relay.clone();
        let connection = connection.clone();

        spawn(async move {
            while let Some(msg) = rx.recv().await {
                if let Err(e) = ws_sender.send(msg).await {
                    warn!(connection = %connection.id(), "failed to send frame: {e}");
                    break;
                }
            }
            let _ = ws_sender.close().await;
            relay.unregister(&connection);
            debug!(connection = %connection.id(), "send loop closed");
        });
    }

    // peer -> relay
    while let Some(frame) = ws_receiver.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => handle_client_text(&relay, &connection, text.as_str()),
            Ok(WsMessage::Close(_)) => break,
            Ok(WsMessage::Binary(_)) => {
                warn!(connection = %connection.id(), "ignoring binary frame");
            }
            Ok(_) => {}
            Err(e) => {
                warn!(connection = %connection.id(), "web socket error: {e}");
                break;
            }
        }
        if connection.is_terminated() {
            break;
        }
    }

    relay.unregister(&connection);
    info!(connection = %connection.id(), "web socket closed");
}

/// Applies one text frame from `connection` to the relay.
pub fn handle_client_text(relay: &Relay, connection: &Arc<Connection>, text: &str) {
    match ClientMessage::parse(text) {
        Ok(ClientMessage::Credential(token)) => {
            debug!(connection = %connection.id(), "credential received");
            relay.handle_credential(connection, token);
        }
        Ok(ClientMessage::Subscribe(request)) => {
            debug!(
                connection = %connection.id(),
                topic = %request.topic,
                count = request.count,
                "subscribe request"
            );
            relay.subscribe(connection, &request.topic, request.count);
        }
        Err(err) => {
            warn!(
                connection = %connection.id(),
                "invalid web socket message: {err} | {}",
                text.chars().take(100).collect::<String>()
            );
        }
    }
}
