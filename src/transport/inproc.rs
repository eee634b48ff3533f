//! In-process paired transport.
//!
//! [`InprocTransport::pair`] returns two connected endpoints. Each direction
//! is a bounded mailbox; a full mailbox rejects further sends instead of
//! blocking the sender.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, warn};

use crate::error::Result;
use crate::protocol::Packet;

use super::Transport;

// ============================================================================
// Constants
// ============================================================================

/// Maximum packets queued per direction.
pub const MAILBOX_CAPACITY: usize = 128;

// ============================================================================
// InprocTransport
// ============================================================================

/// One end of an in-process packet channel.
///
/// Dropping an endpoint closes the channel: the peer's [`Transport::recv`]
/// returns `None` once it has drained what was already queued.
pub struct InprocTransport {
    /// Peer's mailbox.
    outgoing: mpsc::Sender<Packet>,
    /// Own mailbox.
    incoming: Mutex<mpsc::Receiver<Packet>>,
}

impl InprocTransport {
    /// Creates two connected endpoints with the default mailbox capacity.
    #[must_use]
    pub fn pair() -> (Self, Self) {
        Self::pair_with_capacity(MAILBOX_CAPACITY)
    }

    /// Creates two connected endpoints with a custom mailbox capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn pair_with_capacity(capacity: usize) -> (Self, Self) {
        let (a_tx, a_rx) = mpsc::channel(capacity);
        let (b_tx, b_rx) = mpsc::channel(capacity);

        let a = Self {
            outgoing: b_tx,
            incoming: Mutex::new(a_rx),
        };
        let b = Self {
            outgoing: a_tx,
            incoming: Mutex::new(b_rx),
        };
        (a, b)
    }

    /// Sends a packet, waiting for mailbox space instead of rejecting.
    ///
    /// Returns `false` only if the peer is gone. Intended for engine-side
    /// producers that stream more packets than the mailbox holds.
    pub async fn send_wait(&self, packet: Packet) -> bool {
        self.outgoing.send(packet).await.is_ok()
    }

    /// Returns `true` if the peer endpoint has been dropped.
    #[inline]
    #[must_use]
    pub fn is_peer_closed(&self) -> bool {
        self.outgoing.is_closed()
    }
}

#[async_trait]
impl Transport for InprocTransport {
    fn send(&self, packet: Packet) -> bool {
        match self.outgoing.try_send(packet) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(packet)) => {
                warn!(%packet, "Mailbox full, packet rejected");
                false
            }
            Err(mpsc::error::TrySendError::Closed(packet)) => {
                debug!(%packet, "Peer closed, packet rejected");
                false
            }
        }
    }

    async fn recv(&self) -> Result<Option<Packet>> {
        Ok(self.incoming.lock().await.recv().await)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifiers::TxId;

    #[tokio::test]
    async fn test_pair_delivers_both_ways() {
        let (client, engine) = InprocTransport::pair();
        let txid = TxId::generate();

        assert!(client.send(Packet::connect(txid, "1")));
        let received = engine.recv().await.expect("recv").expect("packet");
        assert_eq!(received.txid().expect("txid"), txid);

        assert!(engine.send(Packet::respond_ok(txid)));
        let received = client.recv().await.expect("recv").expect("packet");
        assert!(received.status());
    }

    #[tokio::test]
    async fn test_full_mailbox_rejects() {
        let (client, _engine) = InprocTransport::pair_with_capacity(1);
        assert!(client.send(Packet::disconnect(TxId::generate())));
        assert!(!client.send(Packet::disconnect(TxId::generate())));
    }

    #[tokio::test]
    async fn test_dropped_peer_closes() {
        let (client, engine) = InprocTransport::pair();
        assert!(engine.send(Packet::respond_ok(TxId::generate())));
        drop(engine);

        assert!(client.is_peer_closed());
        assert!(!client.send(Packet::disconnect(TxId::generate())));

        // Queued packets drain before the close is reported.
        assert!(client.recv().await.expect("recv").is_some());
        assert!(client.recv().await.expect("recv").is_none());
    }

    #[tokio::test]
    async fn test_send_wait_waits_for_room() {
        let (client, engine) = InprocTransport::pair_with_capacity(1);
        let txid = TxId::generate();
        assert!(engine.send(Packet::respond_ok(txid)));

        let producer = tokio::spawn(async move {
            engine.send_wait(Packet::respond_ok(txid)).await
        });

        assert!(client.recv().await.expect("recv").is_some());
        assert!(producer.await.expect("join"));
        assert!(client.recv().await.expect("recv").is_some());
    }
}
