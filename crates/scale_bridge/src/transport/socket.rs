//! WebSocket transport.
//!
//! A connection stays open for many requests. Each inbound text frame is one
//! envelope; replies and pushes go back through a per-connection channel
//! drained by a dedicated send task.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response as HttpResponse};
use axum::routing::get;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use scale_net::names::SOCKET_PATH;
use scale_net::{NetError, Response, encode};

use crate::dispatch::Dispatcher;
use crate::invocation::ReplySink;
use crate::transport::filter::is_local_origin;

// ── Connections ─────────────────────────────────────────────────────────────

/// Open socket connections, keyed by connection id.
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<DashMap<Uuid, mpsc::UnboundedSender<String>>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a connection's outbound channel.
    pub fn register(&self, id: Uuid, sender: mpsc::UnboundedSender<String>) {
        self.connections.insert(id, sender);
    }

    /// Forget a connection.
    pub fn unregister(&self, id: Uuid) {
        self.connections.remove(&id);
    }

    /// Queue `text` on every connection.
    ///
    /// Returns how many connections accepted it.
    pub fn broadcast_text(&self, text: &str) -> usize {
        self.connections
            .iter()
            .filter(|entry| entry.value().send(text.to_string()).is_ok())
            .count()
    }

    /// Number of open connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Returns `true` if no connection is open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

// ── Reply sink ──────────────────────────────────────────────────────────────

/// Reply sink for one request on a socket connection.
///
/// Closing is a no-op; the connection belongs to the transport.
#[derive(Debug)]
pub struct SocketReplySink {
    connection_id: Uuid,
    uuid: Option<String>,
    outbound: mpsc::UnboundedSender<String>,
}

impl SocketReplySink {
    /// Create a sink writing to `outbound`.
    #[must_use]
    pub fn new(connection_id: Uuid, outbound: mpsc::UnboundedSender<String>) -> Self {
        Self {
            connection_id,
            uuid: None,
            outbound,
        }
    }
}

impl ReplySink for SocketReplySink {
    fn set_correlation_id(&mut self, id: Option<String>) {
        self.uuid = id;
    }

    fn send_reply(&mut self, mut response: Response) -> Result<(), NetError> {
        response.uuid = self.uuid.clone();
        let bytes = encode(&response)?;
        let text = String::from_utf8_lossy(&bytes).into_owned();
        self.outbound.send(text).map_err(|_| {
            debug!(connection_id = %self.connection_id, "socket closed before reply");
            NetError::Io(std::io::ErrorKind::BrokenPipe.into())
        })
    }

    fn close(&mut self) {}
}

// ── Server ──────────────────────────────────────────────────────────────────

/// Shared state of the socket handlers.
pub struct SocketState<T> {
    dispatcher: Dispatcher<T>,
    connections: ConnectionRegistry,
    local_subnet_only: bool,
}

impl<T> SocketState<T> {
    /// Bundle the handler state.
    #[must_use]
    pub fn new(dispatcher: Dispatcher<T>, connections: ConnectionRegistry, local_subnet_only: bool) -> Self {
        Self {
            dispatcher,
            connections,
            local_subnet_only,
        }
    }
}

/// Router exposing the socket at [`SOCKET_PATH`].
///
/// Requires [`ConnectInfo<SocketAddr>`] on every request, as provided by
/// [`serve_socket`].
pub fn router<T: Send + 'static>(state: Arc<SocketState<T>>) -> Router {
    Router::new()
        .route(SOCKET_PATH, get(ws_handler::<T>))
        .route_layer(middleware::from_fn_with_state(
            state.local_subnet_only,
            origin_filter,
        ))
        .with_state(state)
}

/// Serve the socket transport on `listener` until `shutdown` fires.
///
/// # Errors
///
/// Returns an I/O error if the server fails.
pub async fn serve_socket<T: Send + 'static>(
    listener: TcpListener,
    state: Arc<SocketState<T>>,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, path = SOCKET_PATH, "socket listener started");
    }
    let app = router(state);
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await?;
    info!("socket listener stopped");
    Ok(())
}

async fn origin_filter(
    State(local_subnet_only): State<bool>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> HttpResponse {
    if local_subnet_only && !is_local_origin(peer.ip()) {
        warn!(%peer, "refused socket connection from non-local peer");
        return StatusCode::FORBIDDEN.into_response();
    }
    next.run(request).await
}

async fn ws_handler<T: Send + 'static>(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<Arc<SocketState<T>>>,
) -> HttpResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, peer, state))
}

async fn handle_socket<T: Send + 'static>(socket: WebSocket, peer: SocketAddr, state: Arc<SocketState<T>>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let connection_id = Uuid::new_v4();

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    state.connections.register(connection_id, tx.clone());
    info!(%connection_id, %peer, "socket connection established");

    let send_task = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if ws_sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Text(text)) => {
                let sink = SocketReplySink::new(connection_id, tx.clone());
                state.dispatcher.dispatch_text(text.as_str(), Box::new(sink));
            }
            Ok(Message::Close(_)) => {
                info!(%connection_id, "socket closed by client");
                break;
            }
            Err(err) => {
                warn!(%connection_id, %err, "socket error");
                break;
            }
            Ok(_) => {}
        }
    }

    state.connections.unregister(connection_id);
    send_task.abort();
    info!(%connection_id, "socket connection terminated");
}
