use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{oneshot, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::protocol::{
    error_codes, Message, Method, Notification, Request, RequestId, Response, ResponseError,
};
use crate::transport::Transport;
use crate::{Error, Result};

/// Bounds the inbound drain performed while closing
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// During the closing drain, how long to wait for a further message before
/// concluding the transport queue is empty
const DRAIN_IDLE: Duration = Duration::from_millis(25);

/// Boxed future returned by session handlers
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Handler for an inbound request: params in, result future out
pub type RequestHandler = Arc<dyn Fn(Option<Value>) -> BoxFuture<Result<Value>> + Send + Sync>;

/// Handler for an inbound notification; failures are logged and swallowed
pub type NotificationHandler = Arc<dyn Fn(Option<Value>) -> BoxFuture<Result<()>> + Send + Sync>;

/// Session lifecycle phase. Transitions are strictly monotonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionPhase {
    Uninitialized,
    Initializing,
    Operating,
    Closing,
    Closed,
}

/// Completion slot for an in-flight outbound request
type PendingMap = HashMap<i64, oneshot::Sender<Result<Value>>>;

/// A symmetric JSON-RPC peer engine.
///
/// Both client and server run the same engine; only the registered handler
/// tables differ. The engine owns the pending-request table, assigns ids from
/// a monotonic counter that is never reused within the session, pulls the
/// transport from a single read loop, and drives the lifecycle state machine.
pub struct Session {
    transport: Arc<dyn Transport>,
    next_id: AtomicI64,
    pending: Mutex<PendingMap>,
    request_handlers: RwLock<HashMap<String, RequestHandler>>,
    notification_handlers: RwLock<HashMap<String, Vec<NotificationHandler>>>,
    /// Inbound request ids currently being serviced
    in_flight: Mutex<HashSet<RequestId>>,
    phase_tx: watch::Sender<SessionPhase>,
    cancel: CancellationToken,
    read_task: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Create a session over the given transport and start its read loop
    pub fn new(transport: Arc<dyn Transport>) -> Arc<Self> {
        let (phase_tx, _) = watch::channel(SessionPhase::Uninitialized);
        let session = Arc::new(Self {
            transport,
            next_id: AtomicI64::new(1),
            pending: Mutex::new(HashMap::new()),
            request_handlers: RwLock::new(HashMap::new()),
            notification_handlers: RwLock::new(HashMap::new()),
            in_flight: Mutex::new(HashSet::new()),
            phase_tx,
            cancel: CancellationToken::new(),
            read_task: Mutex::new(None),
        });

        let handle = session.spawn_read_loop();
        if let Ok(mut guard) = session.read_task.try_lock() {
            *guard = Some(handle);
        }
        session
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> SessionPhase {
        *self.phase_tx.borrow()
    }

    /// Watch lifecycle transitions
    pub fn phase_watcher(&self) -> watch::Receiver<SessionPhase> {
        self.phase_tx.subscribe()
    }

    /// Advances the lifecycle; regressions are ignored so transitions stay
    /// monotonic under concurrent callers.
    pub(crate) fn advance_phase(&self, to: SessionPhase) {
        self.phase_tx.send_if_modified(|current| {
            if to > *current {
                debug!(target: "mcpkit::session", "phase {:?} -> {:?}", *current, to);
                *current = to;
                true
            } else {
                false
            }
        });
    }

    /// Registers the handler invoked for inbound requests with this method.
    /// A second registration for the same method replaces the first.
    pub async fn register_request_handler<F>(&self, method: impl Into<String>, handler: F)
    where
        F: Fn(Option<Value>) -> BoxFuture<Result<Value>> + Send + Sync + 'static,
    {
        self.request_handlers
            .write()
            .await
            .insert(method.into(), Arc::new(handler));
    }

    /// Appends a handler to the fan-out list for inbound notifications with
    /// this method. Handlers run sequentially in registration order.
    pub async fn register_notification_handler<F>(&self, method: impl Into<String>, handler: F)
    where
        F: Fn(Option<Value>) -> BoxFuture<Result<()>> + Send + Sync + 'static,
    {
        self.notification_handlers
            .write()
            .await
            .entry(method.into())
            .or_default()
            .push(Arc::new(handler));
    }

    /// Sends a request and awaits its response, an optional deadline, or
    /// session termination. The id comes from the session's monotonic counter
    /// and the completion slot is installed before the bytes leave, so the
    /// response can never race past it.
    pub async fn send_request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        self.check_send_phase(method)?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let request = Request::new(method, params, RequestId::Number(id));
        if let Err(e) = self.transport.send(Message::Request(request)).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        let completion = match timeout {
            Some(deadline) => match tokio::time::timeout(deadline, rx).await {
                Ok(completion) => completion,
                Err(_) => {
                    // Forget the slot; a late response for this id is dropped
                    self.pending.lock().await.remove(&id);
                    return Err(Error::Timeout(format!(
                        "no response to {} within {:?}",
                        method, deadline
                    )));
                }
            },
            None => rx.await,
        };

        match completion {
            Ok(result) => result,
            Err(_) => Err(Error::SessionClosed),
        }
    }

    /// Sends a fire-and-forget notification; completes when the transport
    /// accepted the bytes.
    pub async fn send_notification(&self, method: &str, params: Option<Value>) -> Result<()> {
        if self.phase() >= SessionPhase::Closing {
            return Err(Error::SessionClosed);
        }
        self.transport
            .send(Message::Notification(Notification::new(method, params)))
            .await
    }

    /// Initiates graceful shutdown: new work is refused, every pending
    /// request completes with `SessionClosed` exactly once, inbound messages
    /// already received by the transport are drained for a bounded grace
    /// period, then the transport closes. Idempotent.
    pub async fn close(&self) -> Result<()> {
        if self.phase() >= SessionPhase::Closing {
            return Ok(());
        }
        self.advance_phase(SessionPhase::Closing);

        self.fail_all_pending().await;
        self.cancel.cancel();
        if let Some(handle) = self.read_task.lock().await.take() {
            let _ = tokio::time::timeout(CLOSE_GRACE, handle).await;
        }

        let result = self.transport.close().await;
        self.advance_phase(SessionPhase::Closed);
        result
    }

    /// Only `initialize` may go out before the handshake (it moves the
    /// session to Initializing); `ping` is permitted in any non-closed state.
    fn check_send_phase(&self, method: &str) -> Result<()> {
        match self.phase() {
            SessionPhase::Closing | SessionPhase::Closed => Err(Error::SessionClosed),
            SessionPhase::Operating => Ok(()),
            phase => {
                if method == Method::Initialize.as_str() && phase == SessionPhase::Uninitialized {
                    self.advance_phase(SessionPhase::Initializing);
                    Ok(())
                } else if method == Method::Ping.as_str() {
                    Ok(())
                } else {
                    Err(Error::Initialization(format!(
                        "Cannot send {} before the session is initialized",
                        method
                    )))
                }
            }
        }
    }

    fn spawn_read_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let session = Arc::clone(self);
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => {
                        // Closing: messages already in the transport still get
                        // dispatched before the loop winds down
                        session.drain_inbound().await;
                        break;
                    }

                    received = session.transport.receive() => match received {
                        Ok(message) => session.dispatch(message).await,
                        Err(e) => {
                            debug!(target: "mcpkit::session", "transport terminated: {}", e);
                            session.fail_all_pending().await;
                            session.advance_phase(SessionPhase::Closed);
                            break;
                        }
                    }
                }
            }
        })
    }

    /// Bounded closing drain: keeps dispatching messages the transport has
    /// already received, stopping once it sits idle, fails, or the overall
    /// grace period elapses.
    async fn drain_inbound(self: &Arc<Self>) {
        let deadline = tokio::time::Instant::now() + CLOSE_GRACE;
        while tokio::time::Instant::now() < deadline {
            match tokio::time::timeout(DRAIN_IDLE, self.transport.receive()).await {
                Ok(Ok(message)) => self.dispatch(message).await,
                Ok(Err(_)) | Err(_) => break,
            }
        }
    }

    async fn dispatch(self: &Arc<Self>, message: Message) {
        match message {
            Message::Request(request) => self.dispatch_request(request).await,
            Message::Response(response) => self.dispatch_response(response).await,
            Message::Notification(notification) => {
                self.dispatch_notification(notification).await
            }
        }
    }

    async fn dispatch_request(self: &Arc<Self>, request: Request) {
        let phase = self.phase();
        let method = request.method.clone();

        if phase == SessionPhase::Uninitialized && method == Method::Initialize.as_str() {
            self.advance_phase(SessionPhase::Initializing);
        } else if phase < SessionPhase::Operating
            && method != Method::Initialize.as_str()
            && method != Method::Ping.as_str()
        {
            let error = ResponseError {
                code: error_codes::NOT_INITIALIZED,
                message: "Received request before initialization was complete".to_string(),
                data: None,
            };
            self.send_response(Response::error(error, request.id)).await;
            return;
        }

        // A peer reusing an id that is still in flight gets dropped
        if !self.in_flight.lock().await.insert(request.id.clone()) {
            warn!(
                target: "mcpkit::session",
                "dropping request with duplicate in-flight id {}", request.id
            );
            return;
        }

        let handler = self.request_handlers.read().await.get(&method).cloned();
        let session = Arc::clone(self);
        tokio::spawn(async move {
            let response = match handler {
                Some(handler) => match handler(request.params).await {
                    Ok(result) => Response::success(result, request.id.clone()),
                    Err(e) => Response::error(e.to_response_error(), request.id.clone()),
                },
                None => Response::error(
                    ResponseError {
                        code: error_codes::METHOD_NOT_FOUND,
                        message: format!("Method not found: {}", method),
                        data: None,
                    },
                    request.id.clone(),
                ),
            };

            // Results of handlers outlived by the session are discarded
            if session.phase() < SessionPhase::Closing {
                session.send_response(response).await;
            }
            session.in_flight.lock().await.remove(&request.id);
        });
    }

    async fn dispatch_response(&self, response: Response) {
        let id = match &response.id {
            RequestId::Number(n) => *n,
            RequestId::String(s) => {
                warn!(
                    target: "mcpkit::session",
                    "dropping response with foreign id {:?}", s
                );
                return;
            }
        };

        match self.pending.lock().await.remove(&id) {
            Some(slot) => {
                let completion = match response.error {
                    Some(error) => Err(Error::from(error)),
                    None => Ok(response.result.unwrap_or(Value::Null)),
                };
                // The requester may have timed out and walked away already
                let _ = slot.send(completion);
            }
            None => {
                debug!(
                    target: "mcpkit::session",
                    "dropping stale or unknown response for id {}", id
                );
            }
        }
    }

    async fn dispatch_notification(&self, notification: Notification) {
        if notification.method == Method::Initialized.as_str() {
            // Permission to begin peer-originated requests
            self.advance_phase(SessionPhase::Operating);
        }

        // Clone the fan-out list so registration during dispatch is deferred
        // past the current fan-out
        let handlers = self
            .notification_handlers
            .read()
            .await
            .get(&notification.method)
            .cloned()
            .unwrap_or_default();
        if handlers.is_empty() {
            return;
        }

        // Fan out off the read loop: a handler may itself perform a
        // request round trip, whose response arrives through this loop
        tokio::spawn(async move {
            for handler in handlers {
                if let Err(e) = handler(notification.params.clone()).await {
                    warn!(
                        target: "mcpkit::session",
                        "notification handler for {} failed: {}", notification.method, e
                    );
                }
            }
        });
    }

    async fn send_response(&self, response: Response) {
        if let Err(e) = self.transport.send(Message::Response(response)).await {
            warn!(target: "mcpkit::session", "failed to send response: {}", e);
        }
    }

    async fn fail_all_pending(&self) {
        let pending = std::mem::take(&mut *self.pending.lock().await);
        for (_, slot) in pending {
            let _ = slot.send(Err(Error::SessionClosed));
        }
    }
}

/// Invokes change listeners sequentially in registration order; a panicking
/// listener is contained so the rest still run.
pub(crate) fn fan_out<T: Clone>(listeners: &[Arc<dyn Fn(T) + Send + Sync>], update: T) {
    for listener in listeners {
        let listener = Arc::clone(listener);
        let update = update.clone();
        let outcome =
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || listener(update)));
        if outcome.is_err() {
            warn!(target: "mcpkit::session", "change listener panicked");
        }
    }
}

/// Deserializes request params, mapping failures to InvalidParams
pub(crate) fn parse_params<T: serde::de::DeserializeOwned>(params: Option<Value>) -> Result<T> {
    serde_json::from_value(params.unwrap_or(Value::Null)).map_err(|e| Error::JsonRpc {
        code: error_codes::INVALID_PARAMS,
        message: format!("Invalid params: {}", e),
    })
}
