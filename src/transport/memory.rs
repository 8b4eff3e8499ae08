use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use crate::{protocol::Message, Result};

use super::Transport;

/// Queue depth of each direction
const CHANNEL_CAPACITY: usize = 64;

/// In-process transport: two message queues cross-wired between a pair of
/// endpoints. The test suite runs every end-to-end scenario over this.
pub struct MemoryTransport {
    outbound: StdMutex<Option<mpsc::Sender<Message>>>,
    inbound: Mutex<mpsc::Receiver<Message>>,
}

impl MemoryTransport {
    /// Create a connected pair of endpoints
    pub fn pair() -> (Arc<MemoryTransport>, Arc<MemoryTransport>) {
        let (a_tx, a_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (b_tx, b_rx) = mpsc::channel(CHANNEL_CAPACITY);

        let a = Arc::new(MemoryTransport {
            outbound: StdMutex::new(Some(b_tx)),
            inbound: Mutex::new(a_rx),
        });
        let b = Arc::new(MemoryTransport {
            outbound: StdMutex::new(Some(a_tx)),
            inbound: Mutex::new(b_rx),
        });
        (a, b)
    }

    fn sender(&self) -> Result<mpsc::Sender<Message>> {
        self.outbound
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| crate::Error::Transport("Transport closed".into()))
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, message: Message) -> Result<()> {
        self.sender()?
            .send(message)
            .await
            .map_err(|_| crate::Error::Transport("Peer disconnected".into()))
    }

    async fn receive(&self) -> Result<Message> {
        self.inbound
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(|| crate::Error::Transport("Transport closed".into()))
    }

    async fn close(&self) -> Result<()> {
        // Dropping the sender terminates the peer's receive stream
        self.outbound.lock().unwrap().take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Notification, RequestId, Request};

    #[tokio::test]
    async fn pair_delivers_in_order() {
        let (a, b) = MemoryTransport::pair();

        for i in 0..3 {
            let req = Request::new("ping", None, RequestId::Number(i));
            a.send(Message::Request(req)).await.unwrap();
        }

        for i in 0..3 {
            match b.receive().await.unwrap() {
                Message::Request(req) => assert_eq!(req.id, RequestId::Number(i)),
                other => panic!("unexpected message: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn close_terminates_peer_receive() {
        let (a, b) = MemoryTransport::pair();
        a.close().await.unwrap();
        assert!(b.receive().await.is_err());
    }

    #[tokio::test]
    async fn send_after_close_fails() {
        let (a, _b) = MemoryTransport::pair();
        a.close().await.unwrap();
        let notif = Notification::new("notifications/initialized", None);
        assert!(a.send(Message::Notification(notif)).await.is_err());
    }
}
