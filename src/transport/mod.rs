use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::{protocol::Message, Result};

pub mod http;
pub mod memory;
pub mod stdio;

pub use http::{SseClientTransport, SseServerTransport};
pub use memory::MemoryTransport;
pub use stdio::{StdioClientTransport, StdioServerTransport};

/// Base trait for transport layers.
///
/// The session engine drives this contract from both ends: it sends only
/// well-formed messages, drains `receive` until it fails, and closes exactly
/// once. `send` completion signals local buffer acceptance, not remote
/// receipt. Order is preserved within each direction; nothing is guaranteed
/// across directions.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a message
    async fn send(&self, message: Message) -> Result<()>;
    /// Receive the next inbound message, in receipt order
    async fn receive(&self) -> Result<Message>;
    /// Close the transport; after completion no further traffic flows
    async fn close(&self) -> Result<()>;
}

/// Transport configuration
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Transport type
    pub transport_type: TransportType,
    /// Optional configuration parameters
    pub parameters: Option<Value>,
}

/// Transport type
#[derive(Debug, Clone)]
pub enum TransportType {
    /// Stdio transport
    Stdio {
        /// Server executable path (only required for clients)
        server_path: Option<String>,
        /// Server arguments (only required for clients)
        server_args: Option<Vec<String>>,
    },
    /// HTTP transport with SSE
    Sse {
        /// Server base URL (client) or bind address (server)
        url: String,
    },
}

/// Client transport factory
pub struct ClientTransportFactory;

impl ClientTransportFactory {
    /// Create and connect a new transport instance
    pub async fn create(&self, config: TransportConfig) -> Result<Arc<dyn Transport>> {
        match config.transport_type {
            TransportType::Stdio {
                server_path,
                server_args,
            } => {
                use stdio::client::StdioClientConfig;
                let config = StdioClientConfig {
                    server_path: server_path
                        .map(std::path::PathBuf::from)
                        .unwrap_or_default(),
                    server_args: server_args.unwrap_or_default(),
                    ..Default::default()
                };
                let client = StdioClientTransport::spawn(config)?;
                Ok(Arc::new(client))
            }
            TransportType::Sse { url } => {
                use http::client::SseClientConfig;
                let client = SseClientTransport::connect(SseClientConfig {
                    base_url: url,
                    ..Default::default()
                })
                .await?;
                Ok(Arc::new(client))
            }
        }
    }
}

/// Server transport factory
pub struct ServerTransportFactory;

impl ServerTransportFactory {
    /// Create and start a new transport instance
    pub async fn create(&self, config: TransportConfig) -> Result<Arc<dyn Transport>> {
        match config.transport_type {
            TransportType::Stdio { .. } => Ok(Arc::new(StdioServerTransport::new())),
            TransportType::Sse { url } => {
                use http::server::SseServerConfig;
                let addr = url
                    .parse()
                    .map_err(|e| crate::Error::Transport(format!("Invalid address: {}", e)))?;
                let server = SseServerTransport::bind(SseServerConfig {
                    addr,
                    ..Default::default()
                })
                .await?;
                Ok(Arc::new(server))
            }
        }
    }
}
