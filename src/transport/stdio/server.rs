use async_trait::async_trait;
use tokio::io::{AsyncWriteExt, BufReader, Stdin, Stdout};
use tokio::sync::Mutex;

use crate::{protocol::Message, transport::Transport, Error, Result};

use super::{encode_frame, read_frame};

/// Server-side stdio transport: frames flow over this process's own
/// stdin/stdout. stdout belongs to the protocol; anything the host wants to
/// say goes to stderr.
pub struct StdioServerTransport {
    reader: Mutex<Option<BufReader<Stdin>>>,
    writer: Mutex<Option<Stdout>>,
}

impl StdioServerTransport {
    pub fn new() -> Self {
        Self {
            reader: Mutex::new(Some(BufReader::new(tokio::io::stdin()))),
            writer: Mutex::new(Some(tokio::io::stdout())),
        }
    }
}

impl Default for StdioServerTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for StdioServerTransport {
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
        self.reader.lock().await.take();
        self.writer.lock().await.take();
        Ok(())
    }
}
