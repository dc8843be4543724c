//! WebSocket chat server.
//!
//! ## Endpoints
//!
//! - `GET {ws_path}`: WebSocket upgrade; one [`Session`] per connection
//! - `GET /health`: liveness check, returns `ok`
//!
//! Each connection runs a single task that multiplexes three sources with
//! `tokio::select!`: inbound frames, events from the in-flight turn, and the
//! turn future itself. The turn is polled in place rather than spawned, so
//! closing the socket drops it and cancels its backend requests.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use futures_util::future::OptionFuture;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::error::{ChatError, Result};
use crate::pipeline::{TurnEvent, TurnSequencer};
use crate::protocol::{ServerMessage, parse_inbound};
use crate::session::{Session, TurnFuture};

/// Events buffered between the turn and the socket writer.
const EVENT_BUFFER: usize = 64;

/// Shared state for route handlers.
#[derive(Clone)]
struct ServerState {
    config: Arc<AppConfig>,
    sequencer: Arc<TurnSequencer>,
    shutdown: CancellationToken,
}

/// Running chat server.
pub struct ChatServer {
    /// The address the server is listening on.
    addr: SocketAddr,
    /// Handle to the background server task.
    handle: JoinHandle<()>,
    shutdown: CancellationToken,
}

impl ChatServer {
    /// Start the chat server.
    ///
    /// Binds to `{server.host}:{server.port}` (use port `0` for auto-assign)
    /// and begins serving in a background tokio task.
    ///
    /// # Errors
    ///
    /// Returns an error if the TCP listener cannot bind.
    pub async fn start(config: Arc<AppConfig>, sequencer: Arc<TurnSequencer>) -> Result<Self> {
        let shutdown = CancellationToken::new();
        let ws_path = config.server.ws_path.clone();
        let bind_addr = format!("{}:{}", config.server.host, config.server.port);

        let state = ServerState {
            config,
            sequencer,
            shutdown: shutdown.clone(),
        };
        let app = Router::new()
            .route(&ws_path, get(handle_upgrade))
            .route("/health", get(handle_health))
            .with_state(state);

        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| ChatError::Server(format!("bind {bind_addr} failed: {e}")))?;
        let addr = listener
            .local_addr()
            .map_err(|e| ChatError::Server(format!("failed to get local addr: {e}")))?;

        info!("chat server listening on ws://{addr}{ws_path}");

        let signal = shutdown.clone().cancelled_owned();
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(signal)
                .await
            {
                error!("chat server error: {e}");
            }
        });

        Ok(Self {
            addr,
            handle,
            shutdown,
        })
    }

    /// Returns the address the server is listening on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Returns the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Stop accepting connections and close open sockets.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Wait for the server task to exit after [`shutdown`](Self::shutdown).
    pub async fn wait(&mut self) {
        if let Err(e) = (&mut self.handle).await
            && !e.is_cancelled()
        {
            error!("chat server task failed: {e}");
        }
    }
}

impl Drop for ChatServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.handle.abort();
    }
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// `GET /health`
async fn handle_health() -> &'static str {
    "ok"
}

/// `GET {ws_path}`: upgrade to a chat socket.
async fn handle_upgrade(ws: WebSocketUpgrade, State(state): State<ServerState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Serve one connection until it closes or the server shuts down.
async fn handle_socket(socket: WebSocket, state: ServerState) {
    let mut session = Session::new(Arc::clone(&state.config), Arc::clone(&state.sequencer));
    let session_id = session.id();
    let (mut sink, mut incoming) = socket.split();
    let (events_tx, mut events_rx) = mpsc::channel::<TurnEvent>(EVENT_BUFFER);
    let mut turn: Option<TurnFuture> = None;

    loop {
        tokio::select! {
            Some(outcome) = OptionFuture::from(turn.as_mut()), if turn.is_some() => {
                turn = None;
                session.finish_turn(outcome);
            }
            Some(event) = events_rx.recv() => {
                debug!(session = %session_id, event = event.kind(), "sending event");
                if send_message(&mut sink, &ServerMessage::from(event)).await.is_err() {
                    break;
                }
            }
            frame = incoming.next() => {
                let text = match frame {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Binary(_))) => {
                        let reply = ServerMessage::error("Binary frames are not supported");
                        if send_message(&mut sink, &reply).await.is_err() {
                            break;
                        }
                        continue;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(session = %session_id, "client closed connection");
                        break;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        warn!(session = %session_id, error = %e, "websocket read failed");
                        break;
                    }
                };

                let started = parse_inbound(text.as_str())
                    .and_then(|prompt| session.begin_turn(&prompt, events_tx.clone()));
                match started {
                    Ok(future) => turn = Some(future),
                    Err(e) => {
                        debug!(session = %session_id, error = %e, "prompt rejected");
                        if send_message(&mut sink, &ServerMessage::error(e.message())).await.is_err() {
                            break;
                        }
                    }
                }
            }
            () = state.shutdown.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
        }
    }

    if turn.take().is_some() {
        info!(session = %session_id, "connection closed mid-turn, reply discarded");
    }
}

async fn send_message<S>(sink: &mut S, message: &ServerMessage) -> Result<()>
where
    S: futures_util::Sink<Message, Error = axum::Error> + Unpin,
{
    let json = message.to_json()?;
    sink.send(Message::Text(json.into()))
        .await
        .map_err(|e| ChatError::Server(format!("websocket send failed: {e}")))
}
