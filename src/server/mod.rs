use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, RwLock as StdRwLock};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::watch;

use crate::protocol::{
    error_codes, CallToolParams, CallToolResult, ClientCapabilities, CreateMessageParams,
    CreateMessageResult, GetPromptParams, GetPromptResult, Implementation, InitializeParams,
    InitializeResult, ListPromptsResult, ListResourcesResult, ListRootsResult, ListToolsResult,
    LoggingLevel, LoggingMessageParams, Method, Prompt, ReadResourceParams, ReadResourceResult,
    Resource, ResourceUpdatedParams, Root, ServerCapabilities, SetLevelParams, SubscribeParams,
    Tool, UnsubscribeParams, PROTOCOL_VERSION,
};
use crate::session::{fan_out, parse_params, BoxFuture, Session, SessionPhase};
use crate::transport::Transport;
use crate::{Error, Result};

/// Default deadline applied to every outbound request
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Handler invoked for `tools/call`; receives the exchange for callbacks into
/// the client and the raw arguments map
pub type ToolHandler =
    Arc<dyn Fn(ServerExchange, Option<Value>) -> BoxFuture<Result<CallToolResult>> + Send + Sync>;

/// Handler invoked for `prompts/get`
pub type PromptHandler =
    Arc<dyn Fn(ServerExchange, Option<Value>) -> BoxFuture<Result<GetPromptResult>> + Send + Sync>;

/// Handler invoked for `resources/read` with the requested uri
pub type ResourceReader =
    Arc<dyn Fn(ServerExchange, String) -> BoxFuture<Result<ReadResourceResult>> + Send + Sync>;

type RootsListener = Arc<dyn Fn(Vec<Root>) + Send + Sync>;

struct RegisteredTool {
    tool: Tool,
    handler: ToolHandler,
}

struct RegisteredPrompt {
    prompt: Prompt,
    handler: PromptHandler,
}

struct RegisteredResource {
    resource: Resource,
    reader: ResourceReader,
}

struct ClientHandshake {
    info: Implementation,
    capabilities: ClientCapabilities,
}

struct ServerState {
    info: Implementation,
    capabilities: ServerCapabilities,
    instructions: Option<String>,
    tools: StdRwLock<Vec<RegisteredTool>>,
    prompts: StdRwLock<Vec<RegisteredPrompt>>,
    resources: StdRwLock<Vec<RegisteredResource>>,
    /// Resource uris the client subscribed to
    subscriptions: StdRwLock<HashSet<String>>,
    client: StdRwLock<Option<ClientHandshake>>,
    /// Floor for emitted log notifications, set via `logging/setLevel`
    log_level: StdRwLock<LoggingLevel>,
    roots_listeners: Vec<RootsListener>,
    request_timeout: Duration,
}

impl ServerState {
    fn client_capabilities(&self) -> Option<ClientCapabilities> {
        self.client
            .read()
            .unwrap()
            .as_ref()
            .map(|handshake| handshake.capabilities.clone())
    }

    fn advertises_tool_changes(&self) -> bool {
        self.capabilities
            .tools
            .as_ref()
            .map(|c| c.list_changed)
            .unwrap_or(false)
    }

    fn advertises_prompt_changes(&self) -> bool {
        self.capabilities
            .prompts
            .as_ref()
            .map(|c| c.list_changed)
            .unwrap_or(false)
    }

    fn advertises_resource_changes(&self) -> bool {
        self.capabilities
            .resources
            .as_ref()
            .map(|c| c.list_changed)
            .unwrap_or(false)
    }
}

/// Handed to tool and prompt handlers; the server's window back into the
/// client for sampling and roots callbacks mid-call.
#[derive(Clone)]
pub struct ServerExchange {
    session: Arc<Session>,
    state: Arc<ServerState>,
}

impl ServerExchange {
    /// Asks the client's assistant runtime to generate a message. Fails
    /// locally, before any wire traffic, when the client did not advertise
    /// the sampling capability.
    pub async fn create_message(
        &self,
        params: CreateMessageParams,
    ) -> Result<CreateMessageResult> {
        let capabilities = self
            .state
            .client_capabilities()
            .ok_or_else(|| Error::Initialization("Session not initialized".to_string()))?;
        if capabilities.sampling.is_none() {
            return Err(Error::Capability(
                "Client must be configured with sampling capabilities".to_string(),
            ));
        }
        let value = self
            .session
            .send_request(
                Method::CreateMessage.as_str(),
                Some(serde_json::to_value(&params)?),
                Some(self.state.request_timeout),
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Fetches the client's current workspace roots. Fails locally when the
    /// client did not advertise the roots capability.
    pub async fn list_roots(&self) -> Result<ListRootsResult> {
        let capabilities = self
            .state
            .client_capabilities()
            .ok_or_else(|| Error::Initialization("Session not initialized".to_string()))?;
        if capabilities.roots.is_none() {
            return Err(Error::Capability("Roots not supported".to_string()));
        }
        let value = self
            .session
            .send_request(
                Method::ListRoots.as_str(),
                None,
                Some(self.state.request_timeout),
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Identity the client reported at initialization
    pub fn client_info(&self) -> Option<Implementation> {
        self.state
            .client
            .read()
            .unwrap()
            .as_ref()
            .map(|handshake| handshake.info.clone())
    }
}

/// Builder for [`McpServer`]
pub struct ServerBuilder {
    info: Implementation,
    capabilities: ServerCapabilities,
    instructions: Option<String>,
    tools: Vec<RegisteredTool>,
    prompts: Vec<RegisteredPrompt>,
    resources: Vec<RegisteredResource>,
    roots_listeners: Vec<RootsListener>,
    request_timeout: Duration,
}

impl ServerBuilder {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            info: Implementation::new(name, version),
            capabilities: ServerCapabilities::default(),
            instructions: None,
            tools: Vec::new(),
            prompts: Vec::new(),
            resources: Vec::new(),
            roots_listeners: Vec::new(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Capabilities advertised at initialization. Registering a tool, prompt,
    /// or resource enables the matching capability implicitly; use this to
    /// control the `listChanged`/`subscribe` flags.
    pub fn capabilities(mut self, capabilities: ServerCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Free-form guidance returned to the client at initialization
    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Registers a tool with its handler
    pub fn tool<F, Fut>(mut self, tool: Tool, handler: F) -> Self
    where
        F: Fn(ServerExchange, Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<CallToolResult>> + Send + 'static,
    {
        if self.capabilities.tools.is_none() {
            self.capabilities.tools = Some(Default::default());
        }
        self.tools.push(RegisteredTool {
            tool,
            handler: Arc::new(move |exchange, args| Box::pin(handler(exchange, args))),
        });
        self
    }

    /// Registers a prompt with its handler
    pub fn prompt<F, Fut>(mut self, prompt: Prompt, handler: F) -> Self
    where
        F: Fn(ServerExchange, Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<GetPromptResult>> + Send + 'static,
    {
        if self.capabilities.prompts.is_none() {
            self.capabilities.prompts = Some(Default::default());
        }
        self.prompts.push(RegisteredPrompt {
            prompt,
            handler: Arc::new(move |exchange, args| Box::pin(handler(exchange, args))),
        });
        self
    }

    /// Registers a resource with its reader
    pub fn resource<F, Fut>(mut self, resource: Resource, reader: F) -> Self
    where
        F: Fn(ServerExchange, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ReadResourceResult>> + Send + 'static,
    {
        if self.capabilities.resources.is_none() {
            self.capabilities.resources = Some(Default::default());
        }
        self.resources.push(RegisteredResource {
            resource,
            reader: Arc::new(move |exchange, uri| Box::pin(reader(exchange, uri))),
        });
        self
    }

    /// Listener invoked with the refreshed root list whenever the client
    /// announces a change
    pub fn on_roots_changed(
        mut self,
        listener: impl Fn(Vec<Root>) + Send + Sync + 'static,
    ) -> Self {
        self.roots_listeners.push(Arc::new(listener));
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Wires the server onto a transport and starts serving requests
    pub async fn build(self, transport: Arc<dyn Transport>) -> McpServer {
        let state = Arc::new(ServerState {
            info: self.info,
            capabilities: self.capabilities,
            instructions: self.instructions,
            tools: StdRwLock::new(self.tools),
            prompts: StdRwLock::new(self.prompts),
            resources: StdRwLock::new(self.resources),
            subscriptions: StdRwLock::new(HashSet::new()),
            client: StdRwLock::new(None),
            log_level: StdRwLock::new(LoggingLevel::Info),
            roots_listeners: self.roots_listeners,
            request_timeout: self.request_timeout,
        });
        let session = Session::new(transport);

        register_handlers(&session, &state).await;

        McpServer { session, state }
    }
}

async fn register_handlers(session: &Arc<Session>, state: &Arc<ServerState>) {
    let init_state = Arc::clone(state);
    session
        .register_request_handler(Method::Initialize.as_str(), move |params| {
            let state = Arc::clone(&init_state);
            Box::pin(async move {
                let params: InitializeParams = parse_params(params)?;
                *state.client.write().unwrap() = Some(ClientHandshake {
                    info: params.client_info,
                    capabilities: params.capabilities,
                });
                let result = InitializeResult {
                    protocol_version: PROTOCOL_VERSION.to_string(),
                    capabilities: state.capabilities.clone(),
                    server_info: state.info.clone(),
                    instructions: state.instructions.clone(),
                };
                Ok(serde_json::to_value(result)?)
            })
        })
        .await;

    session
        .register_request_handler(Method::Ping.as_str(), |_| Box::pin(async { Ok(json!({})) }))
        .await;

    if state.capabilities.tools.is_some() {
        let list_state = Arc::clone(state);
        session
            .register_request_handler(Method::ListTools.as_str(), move |_| {
                let state = Arc::clone(&list_state);
                Box::pin(async move {
                    let tools = state
                        .tools
                        .read()
                        .unwrap()
                        .iter()
                        .map(|r| r.tool.clone())
                        .collect();
                    Ok(serde_json::to_value(ListToolsResult {
                        tools,
                        next_cursor: None,
                    })?)
                })
            })
            .await;

        let call_state = Arc::clone(state);
        let weak = Arc::downgrade(session);
        session
            .register_request_handler(Method::CallTool.as_str(), move |params| {
                let state = Arc::clone(&call_state);
                let weak = weak.clone();
                Box::pin(async move {
                    let session = weak.upgrade().ok_or(Error::SessionClosed)?;
                    let params: CallToolParams = parse_params(params)?;
                    let handler = state
                        .tools
                        .read()
                        .unwrap()
                        .iter()
                        .find(|r| r.tool.name == params.name)
                        .map(|r| Arc::clone(&r.handler));
                    let handler = handler.ok_or_else(|| Error::JsonRpc {
                        code: error_codes::INVALID_PARAMS,
                        message: format!("Tool not found: {}", params.name),
                    })?;

                    let exchange = ServerExchange {
                        session,
                        state: Arc::clone(&state),
                    };
                    // Tool failures stay in-band so models can observe them;
                    // capability violations are protocol errors, not tool
                    // output
                    let result = match handler(exchange, params.arguments).await {
                        Ok(result) => result,
                        Err(e) if e.is_capability() => return Err(e),
                        Err(e) => CallToolResult::error(e.to_string()),
                    };
                    Ok(serde_json::to_value(result)?)
                })
            })
            .await;
    }

    if state.capabilities.prompts.is_some() {
        let list_state = Arc::clone(state);
        session
            .register_request_handler(Method::ListPrompts.as_str(), move |_| {
                let state = Arc::clone(&list_state);
                Box::pin(async move {
                    let prompts = state
                        .prompts
                        .read()
                        .unwrap()
                        .iter()
                        .map(|r| r.prompt.clone())
                        .collect();
                    Ok(serde_json::to_value(ListPromptsResult {
                        prompts,
                        next_cursor: None,
                    })?)
                })
            })
            .await;

        let get_state = Arc::clone(state);
        let weak = Arc::downgrade(session);
        session
            .register_request_handler(Method::GetPrompt.as_str(), move |params| {
                let state = Arc::clone(&get_state);
                let weak = weak.clone();
                Box::pin(async move {
                    let session = weak.upgrade().ok_or(Error::SessionClosed)?;
                    let params: GetPromptParams = parse_params(params)?;
                    let handler = state
                        .prompts
                        .read()
                        .unwrap()
                        .iter()
                        .find(|r| r.prompt.name == params.name)
                        .map(|r| Arc::clone(&r.handler));
                    let handler = handler.ok_or_else(|| Error::JsonRpc {
                        code: error_codes::INVALID_PARAMS,
                        message: format!("Prompt not found: {}", params.name),
                    })?;

                    let exchange = ServerExchange {
                        session,
                        state: Arc::clone(&state),
                    };
                    let result = handler(exchange, params.arguments).await?;
                    Ok(serde_json::to_value(result)?)
                })
            })
            .await;
    }

    if state.capabilities.resources.is_some() {
        let list_state = Arc::clone(state);
        session
            .register_request_handler(Method::ListResources.as_str(), move |_| {
                let state = Arc::clone(&list_state);
                Box::pin(async move {
                    let resources = state
                        .resources
                        .read()
                        .unwrap()
                        .iter()
                        .map(|r| r.resource.clone())
                        .collect();
                    Ok(serde_json::to_value(ListResourcesResult {
                        resources,
                        next_cursor: None,
                    })?)
                })
            })
            .await;

        let read_state = Arc::clone(state);
        let weak = Arc::downgrade(session);
        session
            .register_request_handler(Method::ReadResource.as_str(), move |params| {
                let state = Arc::clone(&read_state);
                let weak = weak.clone();
                Box::pin(async move {
                    let session = weak.upgrade().ok_or(Error::SessionClosed)?;
                    let params: ReadResourceParams = parse_params(params)?;
                    let reader = state
                        .resources
                        .read()
                        .unwrap()
                        .iter()
                        .find(|r| r.resource.uri == params.uri)
                        .map(|r| Arc::clone(&r.reader));
                    let reader = reader.ok_or_else(|| Error::JsonRpc {
                        code: error_codes::INVALID_PARAMS,
                        message: format!("Resource not found: {}", params.uri),
                    })?;

                    let exchange = ServerExchange {
                        session,
                        state: Arc::clone(&state),
                    };
                    let result = reader(exchange, params.uri).await?;
                    Ok(serde_json::to_value(result)?)
                })
            })
            .await;

        let subscribe_state = Arc::clone(state);
        session
            .register_request_handler(Method::SubscribeResource.as_str(), move |params| {
                let state = Arc::clone(&subscribe_state);
                Box::pin(async move {
                    let params: SubscribeParams = parse_params(params)?;
                    let known = state
                        .resources
                        .read()
                        .unwrap()
                        .iter()
                        .any(|r| r.resource.uri == params.uri);
                    if !known {
                        return Err(Error::JsonRpc {
                            code: error_codes::INVALID_PARAMS,
                            message: format!("Resource not found: {}", params.uri),
                        });
                    }
                    state.subscriptions.write().unwrap().insert(params.uri);
                    Ok(json!({}))
                })
            })
            .await;

        let unsubscribe_state = Arc::clone(state);
        session
            .register_request_handler(Method::UnsubscribeResource.as_str(), move |params| {
                let state = Arc::clone(&unsubscribe_state);
                Box::pin(async move {
                    let params: UnsubscribeParams = parse_params(params)?;
                    state.subscriptions.write().unwrap().remove(&params.uri);
                    Ok(json!({}))
                })
            })
            .await;
    }

    if state.capabilities.logging.is_some() {
        let level_state = Arc::clone(state);
        session
            .register_request_handler(Method::SetLoggingLevel.as_str(), move |params| {
                let state = Arc::clone(&level_state);
                Box::pin(async move {
                    let params: SetLevelParams = parse_params(params)?;
                    *state.log_level.write().unwrap() = params.level;
                    Ok(json!({}))
                })
            })
            .await;
    }

    if !state.roots_listeners.is_empty() {
        let roots_state = Arc::clone(state);
        let weak = Arc::downgrade(session);
        session
            .register_notification_handler(Method::RootsListChanged.as_str(), move |_| {
                let state = Arc::clone(&roots_state);
                let weak = weak.clone();
                Box::pin(async move {
                    let session = weak.upgrade().ok_or(Error::SessionClosed)?;
                    let exchange = ServerExchange {
                        session,
                        state: Arc::clone(&state),
                    };
                    let result = exchange.list_roots().await?;
                    fan_out(&state.roots_listeners, result.roots);
                    Ok(())
                })
            })
            .await;
    }
}

/// The server's view of an MCP session: owns the tool, prompt, and resource
/// registries, serves the client's requests, and reaches back into the client
/// for sampling and roots.
pub struct McpServer {
    session: Arc<Session>,
    state: Arc<ServerState>,
}

impl McpServer {
    /// Registers a tool after construction and announces the change
    pub async fn add_tool<F, Fut>(&self, tool: Tool, handler: F) -> Result<()>
    where
        F: Fn(ServerExchange, Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<CallToolResult>> + Send + 'static,
    {
        if self.state.capabilities.tools.is_none() {
            return Err(Error::Capability("Server does not support tools".to_string()));
        }
        {
            let mut tools = self.state.tools.write().unwrap();
            if tools.iter().any(|r| r.tool.name == tool.name) {
                return Err(Error::Protocol(format!(
                    "Tool already registered: {}",
                    tool.name
                )));
            }
            tools.push(RegisteredTool {
                tool,
                handler: Arc::new(move |exchange, args| Box::pin(handler(exchange, args))),
            });
        }
        self.announce(self.state.advertises_tool_changes(), Method::ToolsListChanged)
            .await
    }

    /// Removes a tool by name and announces the change
    pub async fn remove_tool(&self, name: &str) -> Result<()> {
        {
            let mut tools = self.state.tools.write().unwrap();
            let before = tools.len();
            tools.retain(|r| r.tool.name != name);
            if tools.len() == before {
                return Err(Error::Protocol(format!("Tool not found: {}", name)));
            }
        }
        self.announce(self.state.advertises_tool_changes(), Method::ToolsListChanged)
            .await
    }

    /// Registered tool descriptors
    pub fn list_tools(&self) -> Vec<Tool> {
        self.state
            .tools
            .read()
            .unwrap()
            .iter()
            .map(|r| r.tool.clone())
            .collect()
    }

    /// Registers a prompt after construction and announces the change
    pub async fn add_prompt<F, Fut>(&self, prompt: Prompt, handler: F) -> Result<()>
    where
        F: Fn(ServerExchange, Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<GetPromptResult>> + Send + 'static,
    {
        if self.state.capabilities.prompts.is_none() {
            return Err(Error::Capability(
                "Server does not support prompts".to_string(),
            ));
        }
        {
            let mut prompts = self.state.prompts.write().unwrap();
            if prompts.iter().any(|r| r.prompt.name == prompt.name) {
                return Err(Error::Protocol(format!(
                    "Prompt already registered: {}",
                    prompt.name
                )));
            }
            prompts.push(RegisteredPrompt {
                prompt,
                handler: Arc::new(move |exchange, args| Box::pin(handler(exchange, args))),
            });
        }
        self.announce(
            self.state.advertises_prompt_changes(),
            Method::PromptsListChanged,
        )
        .await
    }

    /// Removes a prompt by name and announces the change
    pub async fn remove_prompt(&self, name: &str) -> Result<()> {
        {
            let mut prompts = self.state.prompts.write().unwrap();
            let before = prompts.len();
            prompts.retain(|r| r.prompt.name != name);
            if prompts.len() == before {
                return Err(Error::Protocol(format!("Prompt not found: {}", name)));
            }
        }
        self.announce(
            self.state.advertises_prompt_changes(),
            Method::PromptsListChanged,
        )
        .await
    }

    /// Registered prompt descriptors
    pub fn list_prompts(&self) -> Vec<Prompt> {
        self.state
            .prompts
            .read()
            .unwrap()
            .iter()
            .map(|r| r.prompt.clone())
            .collect()
    }

    /// Registers a resource after construction and announces the change
    pub async fn add_resource<F, Fut>(&self, resource: Resource, reader: F) -> Result<()>
    where
        F: Fn(ServerExchange, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ReadResourceResult>> + Send + 'static,
    {
        if self.state.capabilities.resources.is_none() {
            return Err(Error::Capability(
                "Server does not support resources".to_string(),
            ));
        }
        {
            let mut resources = self.state.resources.write().unwrap();
            if resources.iter().any(|r| r.resource.uri == resource.uri) {
                return Err(Error::Protocol(format!(
                    "Resource already registered: {}",
                    resource.uri
                )));
            }
            resources.push(RegisteredResource {
                resource,
                reader: Arc::new(move |exchange, uri| Box::pin(reader(exchange, uri))),
            });
        }
        self.announce(
            self.state.advertises_resource_changes(),
            Method::ResourcesListChanged,
        )
        .await
    }

    /// Removes a resource by uri and announces the change
    pub async fn remove_resource(&self, uri: &str) -> Result<()> {
        {
            let mut resources = self.state.resources.write().unwrap();
            let before = resources.len();
            resources.retain(|r| r.resource.uri != uri);
            if resources.len() == before {
                return Err(Error::Protocol(format!("Resource not found: {}", uri)));
            }
        }
        self.announce(
            self.state.advertises_resource_changes(),
            Method::ResourcesListChanged,
        )
        .await
    }

    /// Registered resource descriptors
    pub fn list_resources(&self) -> Vec<Resource> {
        self.state
            .resources
            .read()
            .unwrap()
            .iter()
            .map(|r| r.resource.clone())
            .collect()
    }

    /// Emits `notifications/tools/list_changed`
    pub async fn notify_tools_list_changed(&self) -> Result<()> {
        self.session
            .send_notification(Method::ToolsListChanged.as_str(), None)
            .await
    }

    /// Emits `notifications/prompts/list_changed`
    pub async fn notify_prompts_list_changed(&self) -> Result<()> {
        self.session
            .send_notification(Method::PromptsListChanged.as_str(), None)
            .await
    }

    /// Emits `notifications/resources/list_changed`
    pub async fn notify_resources_list_changed(&self) -> Result<()> {
        self.session
            .send_notification(Method::ResourcesListChanged.as_str(), None)
            .await
    }

    /// Emits `notifications/resources/updated` if the client subscribed to
    /// this uri; otherwise a no-op
    pub async fn notify_resource_updated(&self, uri: &str) -> Result<()> {
        let subscribed = self.state.subscriptions.read().unwrap().contains(uri);
        if !subscribed {
            return Ok(());
        }
        let params = ResourceUpdatedParams {
            uri: uri.to_string(),
        };
        self.session
            .send_notification(
                Method::ResourceUpdated.as_str(),
                Some(serde_json::to_value(params)?),
            )
            .await
    }

    /// Emits a `notifications/message` log entry, honoring the level floor
    /// the client set via `logging/setLevel`
    pub async fn log_message(&self, params: LoggingMessageParams) -> Result<()> {
        if self.state.capabilities.logging.is_none() {
            return Err(Error::Capability("Logging not supported".to_string()));
        }
        if params.level < *self.state.log_level.read().unwrap() {
            return Ok(());
        }
        self.session
            .send_notification(
                Method::LoggingMessage.as_str(),
                Some(serde_json::to_value(params)?),
            )
            .await
    }

    /// Liveness probe; permitted in any non-closed state
    pub async fn ping(&self) -> Result<()> {
        self.session
            .send_request(
                Method::Ping.as_str(),
                None,
                Some(self.state.request_timeout),
            )
            .await?;
        Ok(())
    }

    /// Exchange for server-originated calls outside a handler
    pub fn exchange(&self) -> ServerExchange {
        ServerExchange {
            session: Arc::clone(&self.session),
            state: Arc::clone(&self.state),
        }
    }

    /// Identity the client reported at initialization
    pub fn client_info(&self) -> Option<Implementation> {
        self.state
            .client
            .read()
            .unwrap()
            .as_ref()
            .map(|handshake| handshake.info.clone())
    }

    /// Capabilities the client advertised at initialization
    pub fn client_capabilities(&self) -> Option<ClientCapabilities> {
        self.state.client_capabilities()
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

    /// Registry mutations announce themselves only when the capability was
    /// advertised and the session is live
    async fn announce(&self, advertised: bool, method: Method) -> Result<()> {
        if advertised && self.session.phase() == SessionPhase::Operating {
            self.session.send_notification(method.as_str(), None).await?;
        }
        Ok(())
    }
}
