use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use super::RequestId;

/// Base JSON-RPC message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    Request(Request),
    Response(Response),
    Notification(Notification),
}

/// JSON-RPC request message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Protocol version (must be "2.0")
    pub jsonrpc: String,
    /// Request ID
    pub id: RequestId,
    /// Request method
    pub method: String,
    /// Optional parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// JSON-RPC response message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Protocol version (must be "2.0")
    pub jsonrpc: String,
    /// Request ID
    pub id: RequestId,
    /// Response result
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
}

/// JSON-RPC notification message (request without ID)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    /// Protocol version (must be "2.0")
    pub jsonrpc: String,
    /// Notification method
    pub method: String,
    /// Optional parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseError {
    /// Error code
    pub code: i32,
    /// Error message
    pub message: String,
    /// Additional error data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Standard error codes
pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;

    // Reserved-range protocol codes
    pub const UNKNOWN_ERROR_CODE: i32 = -32001;
    pub const NOT_INITIALIZED: i32 = -32002;
    pub const CAPABILITY_NOT_SUPPORTED: i32 = -32003;
    pub const REQUEST_CANCELLED: i32 = -32800;
}

/// MCP method types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    // Lifecycle methods
    Initialize,
    Initialized,
    Ping,

    // Server feature methods
    ListTools,
    CallTool,
    ListResources,
    ReadResource,
    SubscribeResource,
    UnsubscribeResource,
    ListPrompts,
    GetPrompt,
    SetLoggingLevel,

    // Client feature methods
    ListRoots,
    CreateMessage,

    // Change notifications
    ToolsListChanged,
    ResourcesListChanged,
    ResourceUpdated,
    PromptsListChanged,
    RootsListChanged,
    LoggingMessage,
}

impl Method {
    /// Wire token for this method
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Initialize => "initialize",
            Method::Initialized => "notifications/initialized",
            Method::Ping => "ping",
            Method::ListTools => "tools/list",
            Method::CallTool => "tools/call",
            Method::ListResources => "resources/list",
            Method::ReadResource => "resources/read",
            Method::SubscribeResource => "resources/subscribe",
            Method::UnsubscribeResource => "resources/unsubscribe",
            Method::ListPrompts => "prompts/list",
            Method::GetPrompt => "prompts/get",
            Method::SetLoggingLevel => "logging/setLevel",
            Method::ListRoots => "roots/list",
            Method::CreateMessage => "sampling/createMessage",
            Method::ToolsListChanged => "notifications/tools/list_changed",
            Method::ResourcesListChanged => "notifications/resources/list_changed",
            Method::ResourceUpdated => "notifications/resources/updated",
            Method::PromptsListChanged => "notifications/prompts/list_changed",
            Method::RootsListChanged => "notifications/roots/list_changed",
            Method::LoggingMessage => "notifications/message",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Request {
    /// Creates a new request
    pub fn new(method: impl Into<String>, params: Option<Value>, id: RequestId) -> Self {
        Self {
            jsonrpc: super::JSONRPC_VERSION.to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

impl Response {
    /// Creates a new successful response
    pub fn success(result: Value, id: RequestId) -> Self {
        Self {
            jsonrpc: super::JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Creates a new error response
    pub fn error(error: ResponseError, id: RequestId) -> Self {
        Self {
            jsonrpc: super::JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

impl Notification {
    /// Creates a new notification
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: super::JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_id_serialization() {
        let json = serde_json::to_string(&RequestId::from("test-id")).unwrap();
        assert_eq!(json, r#""test-id""#);

        let json = serde_json::to_string(&RequestId::Number(42)).unwrap();
        assert_eq!(json, "42");

        // null is not a valid id
        let result: std::result::Result<RequestId, _> = serde_json::from_str("null");
        assert!(result.is_err());
    }

    #[test]
    fn message_classification() {
        let msg: Message =
            serde_json::from_value(json!({"jsonrpc": "2.0", "id": 1, "method": "ping"})).unwrap();
        assert!(matches!(msg, Message::Request(_)));

        let msg: Message =
            serde_json::from_value(json!({"jsonrpc": "2.0", "id": 1, "result": {}})).unwrap();
        assert!(matches!(msg, Message::Response(_)));

        let msg: Message = serde_json::from_value(
            json!({"jsonrpc": "2.0", "id": 1, "error": {"code": -32601, "message": "Method not found"}}),
        )
        .unwrap();
        assert!(matches!(msg, Message::Response(r) if r.error.is_some()));

        let msg: Message = serde_json::from_value(
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
        )
        .unwrap();
        assert!(matches!(msg, Message::Notification(_)));
    }

    #[test]
    fn notification_has_no_id_on_the_wire() {
        let notif = Notification::new(Method::Initialized.as_str(), None);
        let json = serde_json::to_value(Message::Notification(notif)).unwrap();
        assert!(json.get("id").is_none());
        assert_eq!(json["method"], "notifications/initialized");
    }

    #[test]
    fn response_omits_absent_result_and_error() {
        let resp = Response::success(json!({"ok": true}), RequestId::Number(7));
        let json = serde_json::to_value(&resp).unwrap();
        assert!(json.get("error").is_none());

        let resp = Response::error(
            ResponseError {
                code: error_codes::METHOD_NOT_FOUND,
                message: "Method not found".to_string(),
                data: None,
            },
            RequestId::Number(7),
        );
        let json = serde_json::to_value(&resp).unwrap();
        assert!(json.get("result").is_none());
        assert_eq!(json["error"]["code"], -32601);
    }

    #[test]
    fn unknown_fields_in_known_structures_are_ignored() {
        let msg: Message = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 3,
            "method": "tools/call",
            "params": {"name": "tool1"},
            "futureExtension": true
        }))
        .unwrap();
        match msg {
            Message::Request(req) => assert_eq!(req.method, "tools/call"),
            other => panic!("expected request, got {:?}", other),
        }
    }
}
