use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde::Deserialize;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{protocol::Message, transport::Transport, Result};

/// SSE server configuration
#[derive(Clone)]
pub struct SseServerConfig {
    /// Bind address
    pub addr: SocketAddr,
    /// Path of the SSE endpoint
    pub sse_path: String,
    /// Path of the message POST endpoint
    pub message_path: String,
}

impl Default for SseServerConfig {
    fn default() -> Self {
        Self {
            addr: ([127, 0, 0, 1], 0).into(),
            sse_path: "/sse".to_string(),
            message_path: "/message".to_string(),
        }
    }
}

struct SharedState {
    /// Active SSE streams keyed by session id
    sessions: StdMutex<HashMap<String, mpsc::UnboundedSender<Message>>>,
    inbound_tx: mpsc::Sender<Message>,
    message_path: String,
}

/// Server-side HTTP transport: exposes a `GET` SSE endpoint whose first event
/// announces the message-POST URL (carrying an opaque session id), then
/// streams server→client messages; client→server messages arrive as
/// individual POSTs against that URL.
pub struct SseServerTransport {
    state: Arc<SharedState>,
    local_addr: SocketAddr,
    inbound: Mutex<mpsc::Receiver<Message>>,
    server: StdMutex<Option<JoinHandle<()>>>,
}

#[derive(Deserialize)]
struct MessageQuery {
    #[serde(rename = "sessionId")]
    session_id: String,
}

impl SseServerTransport {
    /// Bind the listener and start serving
    pub async fn bind(config: SseServerConfig) -> Result<Self> {
        let (inbound_tx, inbound_rx) = mpsc::channel(64);
        let state = Arc::new(SharedState {
            sessions: StdMutex::new(HashMap::new()),
            inbound_tx,
            message_path: config.message_path.clone(),
        });

        let router = Router::new()
            .route(&config.sse_path, get(Self::sse_handler))
            .route(&config.message_path, post(Self::message_handler))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind(config.addr).await?;
        let local_addr = listener.local_addr()?;

        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                warn!(target: "mcpkit::sse", "server terminated: {}", e);
            }
        });

        Ok(Self {
            state,
            local_addr,
            inbound: Mutex::new(inbound_rx),
            server: StdMutex::new(Some(server)),
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    async fn sse_handler(
        State(state): State<Arc<SharedState>>,
    ) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let session_id = Uuid::new_v4().to_string();
        let endpoint = format!("{}?sessionId={}", state.message_path, session_id);

        state
            .sessions
            .lock()
            .unwrap()
            .insert(session_id.clone(), tx);
        debug!(target: "mcpkit::sse", "session {} connected", session_id);

        let sessions = Arc::clone(&state);
        let stream = async_stream::stream! {
            yield Ok(Event::default().event("endpoint").data(endpoint));

            while let Some(msg) = rx.recv().await {
                if let Ok(json) = serde_json::to_string(&msg) {
                    yield Ok(Event::default().event("message").data(json));
                }
            }

            // Stream ends when the transport closes this session's sender
            sessions.sessions.lock().unwrap().remove(&session_id);
        };

        Sse::new(stream).keep_alive(
            KeepAlive::new()
                .interval(Duration::from_secs(15))
                .text("ping"),
        )
    }

    async fn message_handler(
        State(state): State<Arc<SharedState>>,
        Query(query): Query<MessageQuery>,
        body: String,
    ) -> StatusCode {
        if !state
            .sessions
            .lock()
            .unwrap()
            .contains_key(&query.session_id)
        {
            return StatusCode::NOT_FOUND;
        }

        let message: Message = match serde_json::from_str(&body) {
            Ok(message) => message,
            Err(e) => {
                warn!(target: "mcpkit::sse", "rejecting malformed message: {}", e);
                return StatusCode::BAD_REQUEST;
            }
        };

        if state.inbound_tx.send(message).await.is_err() {
            return StatusCode::SERVICE_UNAVAILABLE;
        }
        StatusCode::OK
    }
}

#[async_trait]
impl Transport for SseServerTransport {
    async fn send(&self, message: Message) -> Result<()> {
        let sessions = self.state.sessions.lock().unwrap();
        if sessions.is_empty() {
            return Err(crate::Error::Transport("No connected session".into()));
        }
        for tx in sessions.values() {
            // A failed send means that client already went away; its entry is
            // cleaned up when the stream winds down
            let _ = tx.send(message.clone());
        }
        Ok(())
    }

    async fn receive(&self) -> Result<Message> {
        self.inbound
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(|| crate::Error::Transport("Transport closed".into()))
    }

    async fn close(&self) -> Result<()> {
        self.state.sessions.lock().unwrap().clear();
        if let Some(server) = self.server.lock().unwrap().take() {
            server.abort();
        }
        Ok(())
    }
}
