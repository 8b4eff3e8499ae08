use std::sync::Mutex as StdMutex;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{header, Client};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::warn;

use crate::{protocol::Message, transport::Transport, Result};

/// SSE client configuration
pub struct SseClientConfig {
    /// Server base URL
    pub base_url: String,
    /// Path of the SSE endpoint
    pub sse_path: String,
    /// How long to wait for the endpoint event after connecting
    pub connect_timeout: Duration,
}

impl Default for SseClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            sse_path: "/sse".to_string(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Client-side HTTP transport: a long-lived SSE stream carries server→client
/// messages; client→server messages are POSTed one per request to the
/// endpoint the server announces in its first SSE event.
pub struct SseClientTransport {
    client: Client,
    endpoint: String,
    inbound: Mutex<mpsc::Receiver<Message>>,
    pump: StdMutex<Option<JoinHandle<()>>>,
}

impl SseClientTransport {
    /// Connect to the server's SSE endpoint and wait for the endpoint event
    pub async fn connect(config: SseClientConfig) -> Result<Self> {
        let client = Client::new();
        let url = format!(
            "{}{}",
            config.base_url.trim_end_matches('/'),
            config.sse_path
        );

        let response = client
            .get(&url)
            .header(header::ACCEPT, "text/event-stream")
            .send()
            .await?
            .error_for_status()?;

        let (message_tx, message_rx) = mpsc::channel(64);
        let (endpoint_tx, endpoint_rx) = oneshot::channel();

        let mut stream = response.bytes_stream();
        let pump = tokio::spawn(async move {
            let mut buffer = String::new();
            let mut endpoint_tx = Some(endpoint_tx);

            while let Some(Ok(chunk)) = stream.next().await {
                match std::str::from_utf8(&chunk) {
                    Ok(text) => buffer.push_str(text),
                    Err(_) => continue,
                }

                // Process complete events, delimited by a blank line
                while let Some(end) = buffer.find("\n\n") {
                    let event = buffer[..end].to_string();
                    buffer.drain(..end + 2);

                    let (name, data) = parse_sse_event(&event);
                    match name.as_deref() {
                        Some("endpoint") => {
                            if let Some(tx) = endpoint_tx.take() {
                                let _ = tx.send(data);
                            }
                        }
                        Some("message") | None => match serde_json::from_str(&data) {
                            Ok(message) => {
                                if message_tx.send(message).await.is_err() {
                                    return;
                                }
                            }
                            Err(e) => {
                                warn!(target: "mcpkit::sse", "dropping unparseable event: {}", e)
                            }
                        },
                        Some(other) => {
                            warn!(target: "mcpkit::sse", "ignoring unknown event type: {}", other)
                        }
                    }
                }
            }
        });

        let endpoint = tokio::time::timeout(config.connect_timeout, endpoint_rx)
            .await
            .map_err(|_| {
                crate::Error::Transport("Timed out waiting for endpoint event".into())
            })?
            .map_err(|_| {
                crate::Error::Transport("SSE stream ended before endpoint event".into())
            })?;

        Ok(Self {
            client,
            endpoint: resolve_endpoint(&config.base_url, &endpoint),
            inbound: Mutex::new(message_rx),
            pump: StdMutex::new(Some(pump)),
        })
    }
}

/// Splits an SSE event block into its event name and joined data payload.
/// Comment lines (the server's keep-alive pings) are skipped.
fn parse_sse_event(event: &str) -> (Option<String>, String) {
    let mut name = None;
    let mut data_lines = Vec::new();

    for line in event.lines() {
        let line = line.trim_end_matches('\r');
        if line.starts_with(':') {
            continue;
        }
        if let Some(rest) = line.strip_prefix("event:") {
            name = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.trim_start());
        }
    }

    (name, data_lines.join("\n"))
}

/// The endpoint event may carry an absolute URL or a server-relative path
fn resolve_endpoint(base_url: &str, endpoint: &str) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("{}{}", base_url.trim_end_matches('/'), endpoint)
    }
}

#[async_trait]
impl Transport for SseClientTransport {
    async fn send(&self, message: Message) -> Result<()> {
        self.client
            .post(&self.endpoint)
            .json(&message)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn receive(&self) -> Result<Message> {
        self.inbound
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(|| crate::Error::Transport("SSE connection closed".into()))
    }

    async fn close(&self) -> Result<()> {
        if let Some(pump) = self.pump.lock().unwrap().take() {
            pump.abort();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_endpoint_event() {
        let (name, data) = parse_sse_event("event: endpoint\ndata: /message?sessionId=abc");
        assert_eq!(name.as_deref(), Some("endpoint"));
        assert_eq!(data, "/message?sessionId=abc");
    }

    #[test]
    fn parses_multiline_data_and_skips_comments() {
        let (name, data) = parse_sse_event(": ping\nevent: message\ndata: {\"a\":\ndata: 1}");
        assert_eq!(name.as_deref(), Some("message"));
        assert_eq!(data, "{\"a\":\n1}");
    }

    #[test]
    fn resolves_relative_endpoints() {
        assert_eq!(
            resolve_endpoint("http://localhost:3000/", "/message?sessionId=x"),
            "http://localhost:3000/message?sessionId=x"
        );
        assert_eq!(
            resolve_endpoint("http://localhost:3000", "http://other/message"),
            "http://other/message"
        );
    }
}
