//! Client handle definition
//!
//! Represents a connected client: its identity and the producer side of
//! its bounded outbound queue. Handles are cheap to clone; every clone
//! shares the same queue.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, Notify};

use crate::error::SendError;
use crate::types::{ClientId, Frame};

/// Default outbound queue capacity
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 256;

/// Connected client information
///
/// The queue sender lives behind a shared slot so that closing it from
/// any clone drops the only sender, ending the writer task once the
/// already-queued frames are drained.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    /// Unique identifier for this client
    id: ClientId,
    /// Identity supplied by the upgrade handshake
    username: Arc<str>,
    /// Server → Client frame queue (None once closed)
    outbound: Arc<Mutex<Option<mpsc::Sender<Frame>>>>,
    /// Signalled when a room gives up on this client
    evicted: Arc<Notify>,
}

impl ClientHandle {
    /// Create a new client and the consumer side of its outbound queue
    pub fn new(
        id: ClientId,
        username: impl Into<Arc<str>>,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(capacity);
        let handle = Self {
            id,
            username: username.into(),
            outbound: Arc::new(Mutex::new(Some(tx))),
            evicted: Arc::new(Notify::new()),
        };
        (handle, rx)
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Push a frame without waiting
    ///
    /// A full queue is reported as `QueueSaturated`; the caller decides
    /// whether that means dropping the frame or evicting the client.
    pub fn try_send(&self, frame: Frame) -> Result<(), SendError> {
        let slot = self.slot();
        let Some(tx) = slot.as_ref() else {
            return Err(SendError::ChannelClosed);
        };
        tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::QueueSaturated,
            mpsc::error::TrySendError::Closed(_) => SendError::ChannelClosed,
        })
    }

    /// Close the outbound queue
    ///
    /// Idempotent. Returns true only for the call that actually closed it.
    pub fn close(&self) -> bool {
        self.slot().take().is_some()
    }

    /// Close the queue and tell the writer to stop sending
    ///
    /// Unlike `close`, nothing left in the queue is delivered: the
    /// consumer is stalled, so the writer abandons the connection instead
    /// of waiting on it.
    pub fn evict(&self) -> bool {
        let closed = self.close();
        self.evicted.notify_one();
        closed
    }

    /// Resolves once `evict` has been called
    ///
    /// Meant for the single writer task; a signal sent before anyone
    /// waits is kept for the next wait.
    pub async fn evicted(&self) {
        self.evicted.notified().await;
    }

    pub fn is_closed(&self) -> bool {
        self.slot().is_none()
    }

    fn slot(&self) -> MutexGuard<'_, Option<mpsc::Sender<Frame>>> {
        self.outbound.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_client_creation() {
        let (client, _rx) = ClientHandle::new(ClientId::new(), "alice", 4);

        assert_eq!(client.username(), "alice");
        assert!(!client.is_closed());
    }

    #[tokio::test]
    async fn test_full_queue_does_not_block() {
        let (client, mut rx) = ClientHandle::new(ClientId::new(), "alice", 2);

        assert!(client.try_send("1".into()).is_ok());
        assert!(client.try_send("2".into()).is_ok());
        assert_eq!(client.try_send("3".into()), Err(SendError::QueueSaturated));

        assert_eq!(&*rx.recv().await.unwrap(), "1");
        assert!(client.try_send("3".into()).is_ok());
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_drains() {
        let (client, mut rx) = ClientHandle::new(ClientId::new(), "alice", 4);
        let clone = client.clone();

        client.try_send("last".into()).unwrap();
        assert!(clone.close());
        assert!(!client.close());
        assert!(client.is_closed());
        assert_eq!(client.try_send("late".into()), Err(SendError::ChannelClosed));

        // Queued frames survive the close, then the queue ends
        assert_eq!(&*rx.recv().await.unwrap(), "last");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_evict_closes_and_signals() {
        let (client, _rx) = ClientHandle::new(ClientId::new(), "alice", 4);
        let writer_side = client.clone();

        assert!(client.evict());
        assert!(client.is_closed());

        // The signal is kept until the writer gets around to waiting
        tokio::time::timeout(std::time::Duration::from_secs(1), writer_side.evicted())
            .await
            .expect("eviction not signalled");
    }
}
