pub mod message;
pub mod schema;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use message::*;
pub use schema::*;

/// Current protocol version
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// JSON-RPC version token
pub const JSONRPC_VERSION: &str = "2.0";

/// Represents a unique identifier for JSON-RPC requests
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl From<i64> for RequestId {
    fn from(id: i64) -> Self {
        RequestId::Number(id)
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        RequestId::String(id.to_string())
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{}", n),
            RequestId::String(s) => write!(f, "{}", s),
        }
    }
}

/// Client capabilities
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ClientCapabilities {
    /// Workspace root capabilities
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roots: Option<RootsCapability>,
    /// Sampling capabilities
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling: Option<Value>,
    /// Experimental features
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experimental: Option<Value>,
}

impl ClientCapabilities {
    /// Capabilities advertising roots (with change notifications) support
    pub fn with_roots(list_changed: bool) -> Self {
        Self {
            roots: Some(RootsCapability { list_changed }),
            ..Default::default()
        }
    }

    /// Enables the sampling capability
    pub fn with_sampling(mut self) -> Self {
        self.sampling = Some(Value::Object(Default::default()));
        self
    }
}

/// Server capabilities
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServerCapabilities {
    /// Prompt capabilities
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompts: Option<FeatureCapability>,
    /// Resource capabilities
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceCapability>,
    /// Tool capabilities
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<FeatureCapability>,
    /// Logging capabilities
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<Value>,
    /// Experimental features
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experimental: Option<Value>,
}

impl ServerCapabilities {
    /// Capabilities advertising tools (with change notifications) support
    pub fn with_tools(list_changed: bool) -> Self {
        Self {
            tools: Some(FeatureCapability { list_changed }),
            ..Default::default()
        }
    }

    /// Enables the prompts capability
    pub fn with_prompts(mut self, list_changed: bool) -> Self {
        self.prompts = Some(FeatureCapability { list_changed });
        self
    }

    /// Enables the resources capability
    pub fn with_resources(mut self, subscribe: bool, list_changed: bool) -> Self {
        self.resources = Some(ResourceCapability {
            subscribe,
            list_changed,
        });
        self
    }

    /// Enables the logging capability
    pub fn with_logging(mut self) -> Self {
        self.logging = Some(Value::Object(Default::default()));
        self
    }
}

/// Workspace root capability
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootsCapability {
    /// Support for list change notifications
    #[serde(default)]
    pub list_changed: bool,
}

/// Resource capability
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceCapability {
    /// Support for subscribing to changes
    #[serde(default)]
    pub subscribe: bool,
    /// Support for list change notifications
    #[serde(default)]
    pub list_changed: bool,
}

/// Feature capability with list change support
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureCapability {
    /// Support for list change notifications
    #[serde(default)]
    pub list_changed: bool,
}

/// Implementation information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Implementation {
    /// Implementation name
    pub name: String,
    /// Implementation version
    pub version: String,
}

impl Implementation {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capabilities_omit_absent_features() {
        let caps = ClientCapabilities::default();
        let json = serde_json::to_string(&caps).unwrap();
        assert_eq!(json, "{}");

        let caps = ClientCapabilities::with_roots(true).with_sampling();
        let json = serde_json::to_value(&caps).unwrap();
        assert_eq!(json["roots"]["listChanged"], true);
        assert!(json["sampling"].is_object());
    }

    #[test]
    fn unknown_capability_fields_are_ignored() {
        let caps: ServerCapabilities = serde_json::from_str(
            r#"{"tools":{"listChanged":true,"futureFlag":42},"unknownCap":{}}"#,
        )
        .unwrap();
        assert!(caps.tools.unwrap().list_changed);
    }

    #[test]
    fn resource_capability_defaults_missing_flags() {
        let cap: ResourceCapability = serde_json::from_str("{}").unwrap();
        assert!(!cap.subscribe);
        assert!(!cap.list_changed);
    }
}
