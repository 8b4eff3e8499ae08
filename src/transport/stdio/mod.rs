pub mod client;
pub mod server;

pub use client::StdioClientTransport;
pub use server::StdioServerTransport;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::{protocol::Message, Error, Result};

/// Largest frame either side will encode or accept
const MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

/// Encodes one message as a newline-terminated frame.
///
/// Stdio framing is one JSON document per line, so a serialized message that
/// itself contains a newline cannot be framed at all; it is refused before
/// any bytes reach the pipe.
pub(crate) fn encode_frame(message: &Message) -> Result<Vec<u8>> {
    let mut frame = serde_json::to_vec(message)?;
    if frame.contains(&b'\n') {
        return Err(Error::Transport(
            "refusing to frame a message spanning multiple lines".into(),
        ));
    }
    if frame.len() > MAX_FRAME_BYTES {
        return Err(Error::Transport(format!(
            "outbound frame of {} bytes exceeds the stdio limit",
            frame.len()
        )));
    }
    frame.push(b'\n');
    Ok(frame)
}

/// Reads and decodes the next frame. An empty read means the peer hung up.
pub(crate) async fn read_frame<R>(reader: &mut R) -> Result<Message>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Err(Error::Transport("stdio stream ended".into()));
    }
    if line.len() > MAX_FRAME_BYTES {
        return Err(Error::Transport(format!(
            "inbound frame of {} bytes exceeds the stdio limit",
            line.len()
        )));
    }
    serde_json::from_str(line.trim_end())
        .map_err(|e| Error::Transport(format!("undecodable frame on stdio: {}", e)))
}
