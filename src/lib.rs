pub mod client;
pub mod error;
pub mod protocol;
pub mod server;
pub mod session;
pub mod transport;

pub use client::{ClientBuilder, McpClient, SamplingHandler};
pub use error::Error;
pub use protocol::*;
pub use server::{McpServer, ServerBuilder, ServerExchange};
pub use session::{Session, SessionPhase};
pub use transport::Transport;

/// Result type for MCP operations
pub type Result<T> = std::result::Result<T, Error>;
