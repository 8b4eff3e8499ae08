pub mod client;
pub mod server;

pub use client::SseClientTransport;
pub use server::SseServerTransport;
