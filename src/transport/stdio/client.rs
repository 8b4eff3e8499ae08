use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::debug;

use crate::{protocol::Message, transport::Transport, Error, Result};

use super::{encode_frame, read_frame};

/// How long `close` waits for the server to exit once its stdin is gone
const SHUTDOWN_WAIT: Duration = Duration::from_secs(5);

/// Stdio client configuration
pub struct StdioClientConfig {
    /// Server executable path
    pub server_path: PathBuf,
    /// Server arguments
    pub server_args: Vec<String>,
    /// Whether to forward the server's stderr into the host log
    pub capture_logs: bool,
}

impl Default for StdioClientConfig {
    fn default() -> Self {
        Self {
            server_path: PathBuf::from("mcp-server"),
            server_args: vec![],
            capture_logs: true,
        }
    }
}

/// Client-side stdio transport. Owns the server child process: protocol
/// frames flow over its stdin/stdout while stderr stays a log side-channel.
pub struct StdioClientTransport {
    child: Mutex<Option<Child>>,
    writer: Mutex<Option<ChildStdin>>,
    reader: Mutex<Option<BufReader<ChildStdout>>>,
}

impl StdioClientTransport {
    /// Spawns the server process and wires up its pipes
    pub fn spawn(config: StdioClientConfig) -> Result<Self> {
        let mut command = Command::new(&config.server_path);
        command
            .args(&config.server_args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(if config.capture_logs {
                Stdio::piped()
            } else {
                Stdio::inherit()
            })
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| {
            Error::Transport(format!(
                "could not launch {}: {}",
                config.server_path.display(),
                e
            ))
        })?;

        let (stdin, stdout) = match child.stdin.take().zip(child.stdout.take()) {
            Some(pipes) => pipes,
            None => {
                let _ = child.start_kill();
                return Err(Error::Transport(
                    "server process came up without piped stdio".into(),
                ));
            }
        };

        if let Some(stderr) = child.stderr.take() {
            forward_server_logs(stderr);
        }

        Ok(Self {
            child: Mutex::new(Some(child)),
            writer: Mutex::new(Some(stdin)),
            reader: Mutex::new(Some(BufReader::new(stdout))),
        })
    }
}

/// The server's stderr lines become host log entries
fn forward_server_logs(stderr: ChildStderr) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(target: "mcpkit::stdio", "server: {}", line);
        }
    });
}

#[async_trait]
impl Transport for StdioClientTransport {
    async fn send(&self, message: Message) -> Result<()> {
        let frame = encode_frame(&message)?;
        let mut writer = self.writer.lock().await;
        match writer.as_mut() {
            Some(writer) => {
                writer.write_all(&frame).await?;
                writer.flush().await?;
                Ok(())
            }
            None => Err(Error::Transport("stdio transport is closed".into())),
        }
    }

    async fn receive(&self) -> Result<Message> {
        let mut reader = self.reader.lock().await;
        match reader.as_mut() {
            Some(reader) => read_frame(reader).await,
            None => Err(Error::Transport("stdio transport is closed".into())),
        }
    }

    async fn close(&self) -> Result<()> {
        // EOF on its stdin is the server's shutdown signal
        self.writer.lock().await.take();
        self.reader.lock().await.take();

        let mut child = match self.child.lock().await.take() {
            Some(child) => child,
            None => return Ok(()),
        };

        match tokio::time::timeout(SHUTDOWN_WAIT, child.wait()).await {
            Ok(status) => {
                let status = status?;
                if status.success() {
                    Ok(())
                } else {
                    Err(Error::Transport(format!(
                        "server exited abnormally ({})",
                        status
                    )))
                }
            }
            Err(_) => {
                // Still running after the deadline
                child.start_kill()?;
                let _ = child.wait().await;
                Err(Error::Transport(
                    "server did not exit after stdin closed; killed".into(),
                ))
            }
        }
    }
}
