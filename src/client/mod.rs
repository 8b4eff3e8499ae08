use std::sync::{Arc, RwLock as StdRwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::watch;

use crate::protocol::{
    CallToolParams, CallToolResult, ClientCapabilities, CreateMessageParams, CreateMessageResult,
    GetPromptParams, GetPromptResult, Implementation, InitializeParams, InitializeResult,
    ListPromptsResult, ListResourcesResult, ListRootsResult, ListToolsResult, LoggingLevel,
    LoggingMessageParams, Method, Prompt, ReadResourceParams, ReadResourceResult, Resource,
    ResourceUpdatedParams, Root, SetLevelParams, SubscribeParams, Tool, UnsubscribeParams,
    PROTOCOL_VERSION,
};
use crate::session::{fan_out, parse_params, Session, SessionPhase};
use crate::transport::Transport;
use crate::{Error, Result};

/// Default deadline applied to every outbound request
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Handles server-originated `sampling/createMessage` requests by asking the
/// client's assistant runtime to generate a message. Model preferences are
/// advisory only.
#[async_trait]
pub trait SamplingHandler: Send + Sync {
    async fn create_message(&self, request: CreateMessageParams) -> Result<CreateMessageResult>;
}

#[async_trait]
impl<F> SamplingHandler for F
where
    F: Fn(CreateMessageParams) -> Result<CreateMessageResult> + Send + Sync,
{
    async fn create_message(&self, request: CreateMessageParams) -> Result<CreateMessageResult> {
        (self)(request)
    }
}

type Listener<T> = Arc<dyn Fn(T) + Send + Sync>;

struct ClientState {
    info: Implementation,
    capabilities: ClientCapabilities,
    roots: StdRwLock<Vec<Root>>,
    server: StdRwLock<Option<InitializeResult>>,
    request_timeout: Duration,
}

impl ClientState {
    fn server(&self) -> Result<InitializeResult> {
        self.server
            .read()
            .unwrap()
            .clone()
            .ok_or_else(|| Error::Initialization("Client not initialized".to_string()))
    }

    fn require_tools(&self) -> Result<()> {
        if self.server()?.capabilities.tools.is_none() {
            return Err(Error::Capability("Server does not support tools".to_string()));
        }
        Ok(())
    }

    fn require_resources(&self) -> Result<()> {
        if self.server()?.capabilities.resources.is_none() {
            return Err(Error::Capability(
                "Server does not support resources".to_string(),
            ));
        }
        Ok(())
    }

    fn require_resource_subscription(&self) -> Result<()> {
        let supported = self
            .server()?
            .capabilities
            .resources
            .map(|r| r.subscribe)
            .unwrap_or(false);
        if !supported {
            return Err(Error::Capability(
                "Server does not support resource subscription".to_string(),
            ));
        }
        Ok(())
    }

    fn require_prompts(&self) -> Result<()> {
        if self.server()?.capabilities.prompts.is_none() {
            return Err(Error::Capability(
                "Server does not support prompts".to_string(),
            ));
        }
        Ok(())
    }

    fn require_logging(&self) -> Result<()> {
        if self.server()?.capabilities.logging.is_none() {
            return Err(Error::Capability(
                "Server does not support logging".to_string(),
            ));
        }
        Ok(())
    }

    fn advertises_roots_changes(&self) -> bool {
        self.capabilities
            .roots
            .as_ref()
            .map(|r| r.list_changed)
            .unwrap_or(false)
    }
}

/// Builder for [`McpClient`]
pub struct ClientBuilder {
    info: Implementation,
    capabilities: ClientCapabilities,
    roots: Vec<Root>,
    sampling_handler: Option<Arc<dyn SamplingHandler>>,
    tools_listeners: Vec<Listener<Vec<Tool>>>,
    prompts_listeners: Vec<Listener<Vec<Prompt>>>,
    resources_listeners: Vec<Listener<Vec<Resource>>>,
    resource_updated_listeners: Vec<Listener<ResourceUpdatedParams>>,
    logging_listeners: Vec<Listener<LoggingMessageParams>>,
    request_timeout: Duration,
}

impl ClientBuilder {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            info: Implementation::new(name, version),
            capabilities: ClientCapabilities::default(),
            roots: Vec::new(),
            sampling_handler: None,
            tools_listeners: Vec::new(),
            prompts_listeners: Vec::new(),
            resources_listeners: Vec::new(),
            resource_updated_listeners: Vec::new(),
            logging_listeners: Vec::new(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Capabilities advertised at initialization
    pub fn capabilities(mut self, capabilities: ClientCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Initial workspace roots
    pub fn roots(mut self, roots: Vec<Root>) -> Self {
        self.roots = roots;
        self
    }

    /// Handler for server-originated sampling requests
    pub fn sampling_handler(mut self, handler: impl SamplingHandler + 'static) -> Self {
        self.sampling_handler = Some(Arc::new(handler));
        self
    }

    /// Listener invoked with the refreshed tool list on change notifications
    pub fn on_tools_changed(mut self, listener: impl Fn(Vec<Tool>) + Send + Sync + 'static) -> Self {
        self.tools_listeners.push(Arc::new(listener));
        self
    }

    /// Listener invoked with the refreshed prompt list on change notifications
    pub fn on_prompts_changed(
        mut self,
        listener: impl Fn(Vec<Prompt>) + Send + Sync + 'static,
    ) -> Self {
        self.prompts_listeners.push(Arc::new(listener));
        self
    }

    /// Listener invoked with the refreshed resource list on change notifications
    pub fn on_resources_changed(
        mut self,
        listener: impl Fn(Vec<Resource>) + Send + Sync + 'static,
    ) -> Self {
        self.resources_listeners.push(Arc::new(listener));
        self
    }

    /// Listener invoked when a subscribed resource changes
    pub fn on_resource_updated(
        mut self,
        listener: impl Fn(ResourceUpdatedParams) + Send + Sync + 'static,
    ) -> Self {
        self.resource_updated_listeners.push(Arc::new(listener));
        self
    }

    /// Listener invoked for server log messages
    pub fn on_log_message(
        mut self,
        listener: impl Fn(LoggingMessageParams) + Send + Sync + 'static,
    ) -> Self {
        self.logging_listeners.push(Arc::new(listener));
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Wires the client onto a transport. The session starts its read loop
    /// here; call [`McpClient::initialize`] to perform the handshake.
    pub async fn build(self, transport: Arc<dyn Transport>) -> McpClient {
        let state = Arc::new(ClientState {
            info: self.info,
            capabilities: self.capabilities,
            roots: StdRwLock::new(self.roots),
            server: StdRwLock::new(None),
            request_timeout: self.request_timeout,
        });
        let session = Session::new(transport);

        register_inbound_handlers(&session, &state, self.sampling_handler).await;
        register_change_listeners(
            &session,
            &state,
            self.tools_listeners,
            self.prompts_listeners,
            self.resources_listeners,
            self.resource_updated_listeners,
            self.logging_listeners,
        )
        .await;

        McpClient { session, state }
    }
}

async fn register_inbound_handlers(
    session: &Arc<Session>,
    state: &Arc<ClientState>,
    sampling_handler: Option<Arc<dyn SamplingHandler>>,
) {
    session
        .register_request_handler(Method::Ping.as_str(), |_| Box::pin(async { Ok(json!({})) }))
        .await;

    session
        .register_request_handler(Method::CreateMessage.as_str(), move |params| {
            let handler = sampling_handler.clone();
            Box::pin(async move {
                let handler = handler.ok_or_else(|| {
                    Error::Capability(
                        "Client must be configured with sampling capabilities".to_string(),
                    )
                })?;
                let params: CreateMessageParams = parse_params(params)?;
                let result = handler.create_message(params).await?;
                Ok(serde_json::to_value(result)?)
            })
        })
        .await;

    let roots_state = Arc::clone(state);
    session
        .register_request_handler(Method::ListRoots.as_str(), move |_params| {
            let state = Arc::clone(&roots_state);
            Box::pin(async move {
                if state.capabilities.roots.is_none() {
                    return Err(Error::Capability("Roots not supported".to_string()));
                }
                let roots = state.roots.read().unwrap().clone();
                Ok(serde_json::to_value(ListRootsResult { roots })?)
            })
        })
        .await;
}

#[allow(clippy::too_many_arguments)]
async fn register_change_listeners(
    session: &Arc<Session>,
    state: &Arc<ClientState>,
    tools: Vec<Listener<Vec<Tool>>>,
    prompts: Vec<Listener<Vec<Prompt>>>,
    resources: Vec<Listener<Vec<Resource>>>,
    resource_updated: Vec<Listener<ResourceUpdatedParams>>,
    logging: Vec<Listener<LoggingMessageParams>>,
) {
    if !tools.is_empty() {
        let weak = Arc::downgrade(session);
        let state = Arc::clone(state);
        session
            .register_notification_handler(Method::ToolsListChanged.as_str(), move |_| {
                let weak = weak.clone();
                let state = Arc::clone(&state);
                let listeners = tools.clone();
                Box::pin(async move {
                    let session = weak.upgrade().ok_or(Error::SessionClosed)?;
                    let result = list_tools_inner(&session, &state).await?;
                    fan_out(&listeners, result.tools);
                    Ok(())
                })
            })
            .await;
    }

    if !prompts.is_empty() {
        let weak = Arc::downgrade(session);
        let state = Arc::clone(state);
        session
            .register_notification_handler(Method::PromptsListChanged.as_str(), move |_| {
                let weak = weak.clone();
                let state = Arc::clone(&state);
                let listeners = prompts.clone();
                Box::pin(async move {
                    let session = weak.upgrade().ok_or(Error::SessionClosed)?;
                    let result = list_prompts_inner(&session, &state).await?;
                    fan_out(&listeners, result.prompts);
                    Ok(())
                })
            })
            .await;
    }

    if !resources.is_empty() {
        let weak = Arc::downgrade(session);
        let state = Arc::clone(state);
        session
            .register_notification_handler(Method::ResourcesListChanged.as_str(), move |_| {
                let weak = weak.clone();
                let state = Arc::clone(&state);
                let listeners = resources.clone();
                Box::pin(async move {
                    let session = weak.upgrade().ok_or(Error::SessionClosed)?;
                    let result = list_resources_inner(&session, &state).await?;
                    fan_out(&listeners, result.resources);
                    Ok(())
                })
            })
            .await;
    }

    if !resource_updated.is_empty() {
        session
            .register_notification_handler(Method::ResourceUpdated.as_str(), move |params| {
                let listeners = resource_updated.clone();
                Box::pin(async move {
                    let params: ResourceUpdatedParams = parse_params(params)?;
                    fan_out(&listeners, params);
                    Ok(())
                })
            })
            .await;
    }

    if !logging.is_empty() {
        session
            .register_notification_handler(Method::LoggingMessage.as_str(), move |params| {
                let listeners = logging.clone();
                Box::pin(async move {
                    let params: LoggingMessageParams = parse_params(params)?;
                    fan_out(&listeners, params);
                    Ok(())
                })
            })
            .await;
    }
}

async fn list_tools_inner(session: &Session, state: &ClientState) -> Result<ListToolsResult> {
    state.require_tools()?;
    let value = session
        .send_request(Method::ListTools.as_str(), None, Some(state.request_timeout))
        .await?;
    Ok(serde_json::from_value(value)?)
}

async fn list_prompts_inner(session: &Session, state: &ClientState) -> Result<ListPromptsResult> {
    state.require_prompts()?;
    let value = session
        .send_request(
            Method::ListPrompts.as_str(),
            None,
            Some(state.request_timeout),
        )
        .await?;
    Ok(serde_json::from_value(value)?)
}

async fn list_resources_inner(
    session: &Session,
    state: &ClientState,
) -> Result<ListResourcesResult> {
    state.require_resources()?;
    let value = session
        .send_request(
            Method::ListResources.as_str(),
            None,
            Some(state.request_timeout),
        )
        .await?;
    Ok(serde_json::from_value(value)?)
}

/// The client's view of an MCP session: drives the handshake, calls the
/// server's tools/prompts/resources, owns the workspace root list, and
/// answers the server's sampling and roots callbacks.
pub struct McpClient {
    session: Arc<Session>,
    state: Arc<ClientState>,
}

impl McpClient {
    /// Performs the initialization handshake: sends `initialize`, verifies
    /// the protocol version, records the server's capabilities, and confirms
    /// with `notifications/initialized`.
    pub async fn initialize(&self) -> Result<InitializeResult> {
        let params = InitializeParams {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: self.state.capabilities.clone(),
            client_info: self.state.info.clone(),
        };
        let value = self
            .session
            .send_request(
                Method::Initialize.as_str(),
                Some(serde_json::to_value(&params)?),
                Some(self.state.request_timeout),
            )
            .await?;
        let result: InitializeResult = serde_json::from_value(value)?;

        if result.protocol_version != PROTOCOL_VERSION {
            let _ = self.session.close().await;
            return Err(Error::Initialization(format!(
                "Unsupported protocol version: {}",
                result.protocol_version
            )));
        }

        *self.state.server.write().unwrap() = Some(result.clone());
        // Enter Operating before the peer can possibly observe the
        // notification, so its follow-up requests are never refused
        self.session.advance_phase(SessionPhase::Operating);
        self.session
            .send_notification(Method::Initialized.as_str(), None)
            .await?;
        Ok(result)
    }

    /// Lists the server's tools
    pub async fn list_tools(&self) -> Result<ListToolsResult> {
        list_tools_inner(&self.session, &self.state).await
    }

    /// Calls a tool by name
    pub async fn call_tool(
        &self,
        name: impl Into<String>,
        arguments: Option<serde_json::Value>,
    ) -> Result<CallToolResult> {
        self.state.require_tools()?;
        let params = CallToolParams {
            name: name.into(),
            arguments,
        };
        let value = self
            .session
            .send_request(
                Method::CallTool.as_str(),
                Some(serde_json::to_value(&params)?),
                Some(self.state.request_timeout),
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Lists the server's resources
    pub async fn list_resources(&self) -> Result<ListResourcesResult> {
        list_resources_inner(&self.session, &self.state).await
    }

    /// Reads a resource by uri
    pub async fn read_resource(&self, uri: impl Into<String>) -> Result<ReadResourceResult> {
        self.state.require_resources()?;
        let params = ReadResourceParams { uri: uri.into() };
        let value = self
            .session
            .send_request(
                Method::ReadResource.as_str(),
                Some(serde_json::to_value(&params)?),
                Some(self.state.request_timeout),
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Subscribes to update notifications for a resource
    pub async fn subscribe_resource(&self, uri: impl Into<String>) -> Result<()> {
        self.state.require_resource_subscription()?;
        let params = SubscribeParams { uri: uri.into() };
        self.session
            .send_request(
                Method::SubscribeResource.as_str(),
                Some(serde_json::to_value(&params)?),
                Some(self.state.request_timeout),
            )
            .await?;
        Ok(())
    }

    /// Cancels a resource subscription
    pub async fn unsubscribe_resource(&self, uri: impl Into<String>) -> Result<()> {
        self.state.require_resource_subscription()?;
        let params = UnsubscribeParams { uri: uri.into() };
        self.session
            .send_request(
                Method::UnsubscribeResource.as_str(),
                Some(serde_json::to_value(&params)?),
                Some(self.state.request_timeout),
            )
            .await?;
        Ok(())
    }

    /// Lists the server's prompts
    pub async fn list_prompts(&self) -> Result<ListPromptsResult> {
        list_prompts_inner(&self.session, &self.state).await
    }

    /// Renders a prompt by name
    pub async fn get_prompt(
        &self,
        name: impl Into<String>,
        arguments: Option<serde_json::Value>,
    ) -> Result<GetPromptResult> {
        self.state.require_prompts()?;
        let params = GetPromptParams {
            name: name.into(),
            arguments,
        };
        let value = self
            .session
            .send_request(
                Method::GetPrompt.as_str(),
                Some(serde_json::to_value(&params)?),
                Some(self.state.request_timeout),
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Sets the minimum severity of server log notifications
    pub async fn set_logging_level(&self, level: LoggingLevel) -> Result<()> {
        self.state.require_logging()?;
        let params = SetLevelParams { level };
        self.session
            .send_request(
                Method::SetLoggingLevel.as_str(),
                Some(serde_json::to_value(&params)?),
                Some(self.state.request_timeout),
            )
            .await?;
        Ok(())
    }

    /// Liveness probe; permitted in any non-closed state
    pub async fn ping(&self) -> Result<()> {
        self.session
            .send_request(Method::Ping.as_str(), None, Some(self.state.request_timeout))
            .await?;
        Ok(())
    }

    /// Current workspace roots
    pub fn roots(&self) -> Vec<Root> {
        self.state.roots.read().unwrap().clone()
    }

    /// Adds a workspace root and announces the change
    pub async fn add_root(&self, root: Root) -> Result<()> {
        {
            let mut roots = self.state.roots.write().unwrap();
            if roots.iter().any(|r| r.uri == root.uri) {
                return Err(Error::Protocol(format!("Root already exists: {}", root.uri)));
            }
            roots.push(root);
        }
        self.announce_roots_changed().await
    }

    /// Removes a workspace root by uri and announces the change
    pub async fn remove_root(&self, uri: &str) -> Result<()> {
        {
            let mut roots = self.state.roots.write().unwrap();
            let before = roots.len();
            roots.retain(|r| r.uri != uri);
            if roots.len() == before {
                return Err(Error::Protocol(format!("Root not found: {}", uri)));
            }
        }
        self.announce_roots_changed().await
    }

    /// Emits `notifications/roots/list_changed`
    pub async fn roots_list_changed(&self) -> Result<()> {
        if !self.state.advertises_roots_changes() {
            return Err(Error::Capability(
                "Roots list change notifications not supported".to_string(),
            ));
        }
        self.session
            .send_notification(Method::RootsListChanged.as_str(), None)
            .await
    }

    async fn announce_roots_changed(&self) -> Result<()> {
        if self.state.advertises_roots_changes()
            && self.session.phase() == SessionPhase::Operating
        {
            self.session
                .send_notification(Method::RootsListChanged.as_str(), None)
                .await?;
        }
        Ok(())
    }

    /// Capabilities the server advertised at initialization
    pub fn server_capabilities(&self) -> Option<crate::protocol::ServerCapabilities> {
        self.state
            .server
            .read()
            .unwrap()
            .as_ref()
            .map(|init| init.capabilities.clone())
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> SessionPhase {
        self.session.phase()
    }

    /// Watch lifecycle transitions
    pub fn phase_watcher(&self) -> watch::Receiver<SessionPhase> {
        self.session.phase_watcher()
    }

    /// Closes the session
    pub async fn close(&self) -> Result<()> {
        self.session.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Message, Request, Response, ServerCapabilities};
    use crate::transport::MemoryTransport;

    /// Scripted peer: answers `initialize` with the given capabilities and
    /// swallows the `initialized` notification.
    async fn answer_handshake(peer: &MemoryTransport, capabilities: ServerCapabilities) {
        let request = match peer.receive().await.unwrap() {
            Message::Request(request) => request,
            other => panic!("expected initialize, got {:?}", other),
        };
        assert_eq!(request.method, "initialize");
        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities,
            server_info: Implementation::new("s", "1.0.0"),
            instructions: None,
        };
        peer.send(Message::Response(Response::success(
            serde_json::to_value(result).unwrap(),
            request.id,
        )))
        .await
        .unwrap();

        match peer.receive().await.unwrap() {
            Message::Notification(notification) => {
                assert_eq!(notification.method, "notifications/initialized")
            }
            other => panic!("expected initialized, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn capability_gated_calls_fail_locally_with_zero_wire_traffic() {
        let (a, b) = MemoryTransport::pair();
        let client = ClientBuilder::new("c", "0.0.0").build(a).await;

        let peer = tokio::spawn(async move {
            answer_handshake(&b, ServerCapabilities::default()).await;
            // Nothing further may arrive
            tokio::time::timeout(Duration::from_millis(100), b.receive())
                .await
                .is_err()
        });

        client.initialize().await.unwrap();

        assert!(matches!(client.list_tools().await, Err(Error::Capability(_))));
        assert!(matches!(
            client.call_tool("tool1", None).await,
            Err(Error::Capability(_))
        ));
        assert!(matches!(
            client.list_resources().await,
            Err(Error::Capability(_))
        ));
        assert!(matches!(
            client.list_prompts().await,
            Err(Error::Capability(_))
        ));
        assert!(matches!(
            client.set_logging_level(LoggingLevel::Info).await,
            Err(Error::Capability(_))
        ));

        assert!(peer.await.unwrap(), "capability failures must not touch the wire");
    }

    #[tokio::test]
    async fn operations_before_initialize_fail() {
        let (a, _b) = MemoryTransport::pair();
        let client = ClientBuilder::new("c", "0.0.0").build(a).await;
        assert!(matches!(
            client.list_tools().await,
            Err(Error::Initialization(_))
        ));
    }

    #[tokio::test]
    async fn version_mismatch_fails_handshake_and_closes() {
        let (a, b) = MemoryTransport::pair();
        let client = ClientBuilder::new("c", "0.0.0").build(a).await;

        tokio::spawn(async move {
            if let Ok(Message::Request(request)) = b.receive().await {
                let result = InitializeResult {
                    protocol_version: "1999-01-01".to_string(),
                    capabilities: ServerCapabilities::default(),
                    server_info: Implementation::new("s", "1.0.0"),
                    instructions: None,
                };
                let _ = b
                    .send(Message::Response(Response::success(
                        serde_json::to_value(result).unwrap(),
                        request.id,
                    )))
                    .await;
            }
        });

        assert!(matches!(
            client.initialize().await,
            Err(Error::Initialization(_))
        ));
        assert_eq!(client.phase(), SessionPhase::Closed);
    }

    #[tokio::test]
    async fn duplicate_root_is_rejected() {
        let (a, _b) = MemoryTransport::pair();
        let client = ClientBuilder::new("c", "0.0.0")
            .roots(vec![Root::new("uri1://", "root1")])
            .build(a)
            .await;

        let result = client.add_root(Root::new("uri1://", "again")).await;
        assert!(matches!(result, Err(Error::Protocol(_))));

        let result = client.remove_root("uri9://").await;
        assert!(matches!(result, Err(Error::Protocol(_))));

        client.remove_root("uri1://").await.unwrap();
        assert!(client.roots().is_empty());
    }

    #[tokio::test]
    async fn sampling_rejected_without_configured_handler() {
        let (a, b) = MemoryTransport::pair();
        let client = ClientBuilder::new("c", "0.0.0").build(a).await;

        let peer = tokio::spawn(async move {
            answer_handshake(&b, ServerCapabilities::default()).await;
            let request = Request::new(
                Method::CreateMessage.as_str(),
                Some(json!({"messages": []})),
                crate::protocol::RequestId::Number(1),
            );
            b.send(Message::Request(request)).await.unwrap();
            match b.receive().await.unwrap() {
                Message::Response(response) => response.error.unwrap(),
                other => panic!("expected response, got {:?}", other),
            }
        });

        client.initialize().await.unwrap();
        let error = peer.await.unwrap();
        assert!(error
            .message
            .contains("Client must be configured with sampling capabilities"));
    }

    #[tokio::test]
    async fn roots_list_rejected_without_capability() {
        let (a, b) = MemoryTransport::pair();
        let client = ClientBuilder::new("c", "0.0.0").build(a).await;

        let peer = tokio::spawn(async move {
            answer_handshake(&b, ServerCapabilities::default()).await;
            let request = Request::new(
                Method::ListRoots.as_str(),
                None,
                crate::protocol::RequestId::Number(1),
            );
            b.send(Message::Request(request)).await.unwrap();
            match b.receive().await.unwrap() {
                Message::Response(response) => response.error.unwrap(),
                other => panic!("expected response, got {:?}", other),
            }
        });

        client.initialize().await.unwrap();
        let error = peer.await.unwrap();
        assert_eq!(
            error.code,
            crate::protocol::error_codes::CAPABILITY_NOT_SUPPORTED
        );
        assert_eq!(error.message, "Roots not supported");
    }
}
