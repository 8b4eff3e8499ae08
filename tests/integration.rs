//! End-to-end scenarios: a client and a server wired through the in-process
//! transport, exercising the handshake, tool calls with sampling callbacks,
//! capability gating, roots and tool-list change propagation, and shutdown.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;

use mcpkit::protocol::{
    CallToolResult, ClientCapabilities, Content, CreateMessageParams, CreateMessageResult,
    LoggingLevel, LoggingMessageParams, ModelPreferences, Role, Root, SamplingMessage,
    ServerCapabilities, StopReason, Tool,
};
use mcpkit::transport::MemoryTransport;
use mcpkit::{ClientBuilder, Error, McpClient, McpServer, ServerBuilder, SessionPhase};

fn empty_schema() -> serde_json::Value {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "properties": {}
    })
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn mock_sampling_handler(
    request: CreateMessageParams,
) -> mcpkit::Result<CreateMessageResult> {
    assert_eq!(request.messages.len(), 1);
    assert!(matches!(request.messages[0].content, Content::Text(_)));
    Ok(CreateMessageResult {
        role: Role::User,
        content: Content::text("Test message"),
        model: "MockModelName".to_string(),
        stop_reason: Some(StopReason::StopSequence),
    })
}

/// Polls until the predicate holds, failing the test after five seconds
async fn wait_until(mut predicate: impl FnMut() -> bool) {
    for _ in 0..100 {
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("condition not met within 5 seconds");
}

async fn wait_for_operating(peer: &str, mut watcher: tokio::sync::watch::Receiver<SessionPhase>) {
    tokio::time::timeout(
        Duration::from_secs(5),
        watcher.wait_for(|phase| *phase == SessionPhase::Operating),
    )
    .await
    .unwrap_or_else(|_| panic!("{} did not reach Operating", peer))
    .unwrap();
}

#[tokio::test]
async fn initialization_happy_path() {
    init_tracing();
    let (client_end, server_end) = MemoryTransport::pair();

    let server: McpServer = ServerBuilder::new("s", "1.0.0")
        .capabilities(ServerCapabilities::with_tools(false))
        .build(server_end)
        .await;

    let client: McpClient = ClientBuilder::new("c", "0.0.0")
        .capabilities(ClientCapabilities::with_roots(true).with_sampling())
        .build(client_end)
        .await;

    let client_phases = client.phase_watcher();
    let server_phases = server.phase_watcher();

    let result = client.initialize().await.unwrap();
    assert_eq!(result.protocol_version, "2024-11-05");
    assert_eq!(result.server_info.name, "s");
    assert!(result.capabilities.tools.is_some());

    wait_for_operating("client", client_phases).await;
    wait_for_operating("server", server_phases).await;

    // The server saw the client's identity and capabilities
    assert_eq!(server.client_info().map(|info| info.name), Some("c".to_string()));
    let negotiated = server.client_capabilities().unwrap();
    assert!(negotiated.roots.unwrap().list_changed);
    assert!(negotiated.sampling.is_some());

    client.close().await.unwrap();
    server.close().await.unwrap();
}

#[tokio::test]
async fn tool_call_with_remote_sampling() {
    init_tracing();
    let (client_end, server_end) = MemoryTransport::pair();

    let server = ServerBuilder::new("test-server", "1.0.0")
        .tool(
            Tool::new("tool1", "tool1 description", empty_schema()),
            |exchange, _args| async move {
                let request = CreateMessageParams {
                    messages: vec![SamplingMessage {
                        role: Role::User,
                        content: Content::text("Test message"),
                    }],
                    model_preferences: Some(ModelPreferences {
                        hints: Some(vec![]),
                        cost_priority: Some(1.0),
                        speed_priority: Some(1.0),
                        intelligence_priority: Some(1.0),
                    }),
                    system_prompt: None,
                    include_context: None,
                    temperature: None,
                    max_tokens: None,
                    stop_sequences: None,
                    metadata: None,
                };
                let result = exchange.create_message(request).await?;

                let expected = result.role == Role::User
                    && result.content == Content::text("Test message")
                    && result.model == "MockModelName"
                    && result.stop_reason == Some(StopReason::StopSequence);
                if !expected {
                    return Ok(CallToolResult::error("unexpected sampling result"));
                }
                Ok(CallToolResult::ok(vec![Content::text("CALL RESPONSE")]))
            },
        )
        .build(server_end)
        .await;

    let client = ClientBuilder::new("Sample client", "0.0.0")
        .capabilities(ClientCapabilities::default().with_sampling())
        .sampling_handler(mock_sampling_handler)
        .build(client_end)
        .await;

    client.initialize().await.unwrap();

    let response = client.call_tool("tool1", Some(json!({}))).await.unwrap();
    assert_eq!(response.content, vec![Content::text("CALL RESPONSE")]);
    assert!(response.is_error.is_none() || response.is_error == Some(false));

    client.close().await.unwrap();
    server.close().await.unwrap();
}

#[tokio::test]
async fn sampling_without_capability_fails_the_call() {
    init_tracing();
    let (client_end, server_end) = MemoryTransport::pair();

    let server = ServerBuilder::new("test-server", "1.0.0")
        .tool(
            Tool::new("tool1", "tool1 description", empty_schema()),
            |exchange, _args| async move {
                exchange
                    .create_message(CreateMessageParams {
                        messages: vec![],
                        model_preferences: None,
                        system_prompt: None,
                        include_context: None,
                        temperature: None,
                        max_tokens: None,
                        stop_sequences: None,
                        metadata: None,
                    })
                    .await?;
                Ok(CallToolResult::ok(vec![]))
            },
        )
        .build(server_end)
        .await;

    // Client without sampling capabilities
    let client = ClientBuilder::new("Sample client", "0.0.0")
        .build(client_end)
        .await;

    client.initialize().await.unwrap();

    let error = client.call_tool("tool1", Some(json!({}))).await.unwrap_err();
    assert!(
        error
            .to_string()
            .contains("Client must be configured with sampling capabilities"),
        "unexpected error: {}",
        error
    );

    client.close().await.unwrap();
    server.close().await.unwrap();
}

#[tokio::test]
async fn roots_lifecycle() {
    init_tracing();
    let (client_end, server_end) = MemoryTransport::pair();

    let observed: Arc<Mutex<Option<Vec<Root>>>> = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&observed);

    let server = ServerBuilder::new("s", "1.0.0")
        .on_roots_changed(move |roots| {
            *sink.lock().unwrap() = Some(roots);
        })
        .build(server_end)
        .await;

    let roots = vec![Root::new("uri1://", "root1"), Root::new("uri2://", "root2")];
    let client = ClientBuilder::new("c", "0.0.0")
        .capabilities(ClientCapabilities::with_roots(true))
        .roots(roots.clone())
        .build(client_end)
        .await;

    client.initialize().await.unwrap();
    assert!(observed.lock().unwrap().is_none());

    client.roots_list_changed().await.unwrap();
    let expected = roots.clone();
    wait_until(|| observed.lock().unwrap().as_deref() == Some(&expected[..])).await;

    client.remove_root("uri1://").await.unwrap();
    let expected = vec![roots[1].clone()];
    wait_until(|| observed.lock().unwrap().as_deref() == Some(&expected[..])).await;

    let root3 = Root::new("uri3://", "root3");
    client.add_root(root3.clone()).await.unwrap();
    let expected = vec![roots[1].clone(), root3];
    wait_until(|| observed.lock().unwrap().as_deref() == Some(&expected[..])).await;

    client.close().await.unwrap();
    server.close().await.unwrap();
}

#[tokio::test]
async fn roots_without_capability() {
    init_tracing();
    let (client_end, server_end) = MemoryTransport::pair();

    let server = ServerBuilder::new("s", "1.0.0").build(server_end).await;

    // Client without the roots capability
    let client = ClientBuilder::new("c", "0.0.0").build(client_end).await;
    client.initialize().await.unwrap();

    let error = server.exchange().list_roots().await.unwrap_err();
    assert!(
        error.to_string().contains("Roots not supported"),
        "unexpected error: {}",
        error
    );

    client.close().await.unwrap();
    server.close().await.unwrap();
}

#[tokio::test]
async fn tool_list_change_propagation() {
    init_tracing();
    let (client_end, server_end) = MemoryTransport::pair();

    let tool1 = Tool::new("tool1", "tool1 description", empty_schema());
    let server = ServerBuilder::new("s", "1.0.0")
        .capabilities(ServerCapabilities::with_tools(true))
        .tool(tool1.clone(), |_exchange, _args| async {
            Ok(CallToolResult::ok(vec![Content::text("CALL RESPONSE")]))
        })
        .build(server_end)
        .await;

    let observed: Arc<Mutex<Option<Vec<Tool>>>> = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&observed);
    let client = ClientBuilder::new("c", "0.0.0")
        .on_tools_changed(move |tools| {
            *sink.lock().unwrap() = Some(tools);
        })
        .build(client_end)
        .await;

    client.initialize().await.unwrap();
    assert!(observed.lock().unwrap().is_none());

    assert_eq!(client.list_tools().await.unwrap().tools, vec![tool1.clone()]);

    server.notify_tools_list_changed().await.unwrap();
    let expected = vec![tool1.clone()];
    wait_until(|| observed.lock().unwrap().as_deref() == Some(&expected[..])).await;

    server.remove_tool("tool1").await.unwrap();
    wait_until(|| observed.lock().unwrap().as_deref() == Some(&[][..])).await;

    let tool2 = Tool::new("tool2", "tool2 description", empty_schema());
    server
        .add_tool(tool2.clone(), |_exchange, _args| async {
            Ok(CallToolResult::ok(vec![Content::text("CALL RESPONSE")]))
        })
        .await
        .unwrap();
    let expected = vec![tool2];
    wait_until(|| observed.lock().unwrap().as_deref() == Some(&expected[..])).await;

    client.close().await.unwrap();
    server.close().await.unwrap();
}

#[tokio::test]
async fn graceful_close_with_active_subscription() {
    init_tracing();
    let (client_end, server_end) = MemoryTransport::pair();

    let observed: Arc<Mutex<Option<Vec<Root>>>> = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&observed);
    let server = ServerBuilder::new("s", "1.0.0")
        .tool(
            Tool::new("hang", "never returns", empty_schema()),
            |_exchange, _args| async {
                std::future::pending::<()>().await;
                Ok(CallToolResult::ok(vec![]))
            },
        )
        .on_roots_changed(move |roots| {
            *sink.lock().unwrap() = Some(roots);
        })
        .build(server_end)
        .await;

    let client = Arc::new(
        ClientBuilder::new("c", "0.0.0")
            .capabilities(ClientCapabilities::with_roots(true))
            .roots(vec![Root::new("uri1://", "root1")])
            .build(client_end)
            .await,
    );

    client.initialize().await.unwrap();
    client.roots_list_changed().await.unwrap();
    wait_until(|| observed.lock().unwrap().is_some()).await;

    // A request that will still be pending when the server goes away
    let pending = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.call_tool("hang", None).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    server.close().await.unwrap();

    let result = pending.await.unwrap();
    assert!(
        matches!(result, Err(Error::SessionClosed)),
        "expected SessionClosed, got {:?}",
        result
    );

    // The client notices the closure and its own close is a clean no-op
    let mut phases = client.phase_watcher();
    tokio::time::timeout(
        Duration::from_secs(5),
        phases.wait_for(|phase| *phase == SessionPhase::Closed),
    )
    .await
    .expect("client did not observe closure")
    .unwrap();

    client.close().await.unwrap();
    assert!(matches!(client.ping().await, Err(Error::SessionClosed)));
}

#[tokio::test]
async fn logging_notifications_honor_level_floor() {
    init_tracing();
    let (client_end, server_end) = MemoryTransport::pair();

    let server = ServerBuilder::new("s", "1.0.0")
        .capabilities(ServerCapabilities::default().with_logging())
        .build(server_end)
        .await;

    let observed: Arc<Mutex<Vec<LoggingLevel>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&observed);
    let client = ClientBuilder::new("c", "0.0.0")
        .on_log_message(move |entry| {
            sink.lock().unwrap().push(entry.level);
        })
        .build(client_end)
        .await;

    client.initialize().await.unwrap();
    client.set_logging_level(LoggingLevel::Warning).await.unwrap();

    // Below the floor: suppressed locally on the server
    server
        .log_message(LoggingMessageParams {
            level: LoggingLevel::Info,
            logger: None,
            data: json!("quiet"),
        })
        .await
        .unwrap();
    server
        .log_message(LoggingMessageParams {
            level: LoggingLevel::Error,
            logger: Some("core".to_string()),
            data: json!("loud"),
        })
        .await
        .unwrap();

    wait_until(|| observed.lock().unwrap().len() == 1).await;
    assert_eq!(observed.lock().unwrap()[0], LoggingLevel::Error);

    client.close().await.unwrap();
    server.close().await.unwrap();
}

#[tokio::test]
async fn resource_subscription_and_update() {
    init_tracing();
    let (client_end, server_end) = MemoryTransport::pair();

    let resource = mcpkit::protocol::Resource {
        uri: "file:///a.txt".to_string(),
        name: "a".to_string(),
        description: None,
        mime_type: Some("text/plain".to_string()),
    };
    let server = ServerBuilder::new("s", "1.0.0")
        .capabilities(ServerCapabilities::default().with_resources(true, false))
        .resource(resource.clone(), |_exchange, uri| async move {
            Ok(mcpkit::protocol::ReadResourceResult {
                contents: vec![mcpkit::protocol::ResourceContents::Text(
                    mcpkit::protocol::TextResourceContents {
                        uri,
                        mime_type: Some("text/plain".to_string()),
                        text: "body".to_string(),
                    },
                )],
            })
        })
        .build(server_end)
        .await;

    let observed: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&observed);
    let client = ClientBuilder::new("c", "0.0.0")
        .on_resource_updated(move |update| {
            sink.lock().unwrap().push(update.uri);
        })
        .build(client_end)
        .await;

    client.initialize().await.unwrap();

    let listed = client.list_resources().await.unwrap();
    assert_eq!(listed.resources, vec![resource.clone()]);

    let contents = client.read_resource("file:///a.txt").await.unwrap();
    assert_eq!(contents.contents.len(), 1);

    // Updates before any subscription are not delivered
    server.notify_resource_updated("file:///a.txt").await.unwrap();

    client.subscribe_resource("file:///a.txt").await.unwrap();
    server.notify_resource_updated("file:///a.txt").await.unwrap();
    wait_until(|| observed.lock().unwrap().len() == 1).await;
    assert_eq!(observed.lock().unwrap()[0], "file:///a.txt");

    client.unsubscribe_resource("file:///a.txt").await.unwrap();
    server.notify_resource_updated("file:///a.txt").await.unwrap();

    // Still exactly one observed update
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(observed.lock().unwrap().len(), 1);

    client.close().await.unwrap();
    server.close().await.unwrap();
}

#[tokio::test]
async fn unknown_tool_yields_invalid_params() {
    init_tracing();
    let (client_end, server_end) = MemoryTransport::pair();

    let server = ServerBuilder::new("s", "1.0.0")
        .tool(
            Tool::new("tool1", "tool1 description", empty_schema()),
            |_exchange, _args| async { Ok(CallToolResult::ok(vec![])) },
        )
        .build(server_end)
        .await;

    let client = ClientBuilder::new("c", "0.0.0").build(client_end).await;
    client.initialize().await.unwrap();

    let error = client.call_tool("missing", None).await.unwrap_err();
    match error {
        Error::JsonRpc { code, message } => {
            assert_eq!(code, -32602);
            assert!(message.contains("Tool not found"));
        }
        other => panic!("expected JSON-RPC error, got {:?}", other),
    }

    client.close().await.unwrap();
    server.close().await.unwrap();
}

#[tokio::test]
async fn tool_handler_failure_stays_in_band() {
    init_tracing();
    let (client_end, server_end) = MemoryTransport::pair();

    let server = ServerBuilder::new("s", "1.0.0")
        .tool(
            Tool::new("flaky", "always fails", empty_schema()),
            |_exchange, _args| async {
                Err(Error::Protocol("disk on fire".to_string()))
            },
        )
        .build(server_end)
        .await;

    let client = ClientBuilder::new("c", "0.0.0").build(client_end).await;
    client.initialize().await.unwrap();

    let result = client.call_tool("flaky", None).await.unwrap();
    assert_eq!(result.is_error, Some(true));
    match &result.content[0] {
        Content::Text(text) => assert!(text.text.contains("disk on fire")),
        other => panic!("expected text content, got {:?}", other),
    }

    client.close().await.unwrap();
    server.close().await.unwrap();
}
