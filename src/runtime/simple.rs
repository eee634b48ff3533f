//! Registry for single-outcome transactions.
//!
//! Correlates `connect`/`disconnect` (and any other `respond` traffic) with
//! the caller awaiting it. A response may arrive before its waiter
//! registers; it is then buffered until picked up.

// ============================================================================
// Imports
// ============================================================================

use rustc_hash::FxHashMap;
use tokio::sync::oneshot;
use tracing::{trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::TxId;
use crate::protocol::Packet;

// ============================================================================
// Outcome
// ============================================================================

/// Result of registering interest in a transaction.
#[derive(Debug)]
pub enum Pending {
    /// The response was already buffered and has been consumed.
    Ready(Packet),
    /// A waiter was registered; the response arrives on this receiver.
    Waiting(oneshot::Receiver<Packet>),
}

// ============================================================================
// SimpleRegistry
// ============================================================================

/// txid → waiter / buffered response.
#[derive(Debug, Default)]
pub struct SimpleRegistry {
    /// Registered waiters.
    waiters: FxHashMap<TxId, oneshot::Sender<Packet>>,
    /// Responses that arrived before their waiter.
    responses: FxHashMap<TxId, Packet>,
}

impl SimpleRegistry {
    /// Creates an empty registry.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers interest in the outcome of `txid`.
    ///
    /// Consumes a buffered response if one is present.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateWaiter`] if `txid` is already awaited.
    pub fn register(&mut self, txid: TxId) -> Result<Pending> {
        if let Some(packet) = self.responses.remove(&txid) {
            trace!(%txid, "Buffered response consumed");
            return Ok(Pending::Ready(packet));
        }

        if self.waiters.contains_key(&txid) {
            return Err(Error::duplicate_waiter(txid, 0));
        }

        let (tx, rx) = oneshot::channel();
        self.waiters.insert(txid, tx);
        Ok(Pending::Waiting(rx))
    }

    /// Routes a `respond` packet to its waiter or buffers it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the packet carries no valid txid.
    pub fn deliver(&mut self, packet: Packet) -> Result<()> {
        let txid = packet.txid()?;

        let packet = match self.waiters.remove(&txid) {
            Some(waiter) => match waiter.send(packet) {
                Ok(()) => {
                    trace!(%txid, "Response delivered");
                    return Ok(());
                }
                // Waiter went away between registration and delivery.
                Err(packet) => packet,
            },
            None => packet,
        };

        if self.responses.insert(txid, packet).is_some() {
            warn!(%txid, "Duplicate response replaced buffered one");
        }
        trace!(%txid, "Response buffered");
        Ok(())
    }

    /// Removes the waiter for `txid`.
    ///
    /// Returns `false` if no waiter was registered, meaning its response
    /// has already been handed to the receiver.
    pub fn cancel(&mut self, txid: TxId) -> bool {
        self.waiters.remove(&txid).is_some()
    }

    /// Puts back a response taken from a receiver that is going away.
    pub fn restore(&mut self, txid: TxId, packet: Packet) {
        trace!(%txid, "Response restored");
        self.responses.insert(txid, packet);
    }

    /// Number of registered waiters.
    #[inline]
    #[must_use]
    pub fn waiting(&self) -> usize {
        self.waiters.len()
    }

    /// Number of buffered responses.
    #[inline]
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.responses.len()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deliver_then_register_consumes_buffer() {
        let mut registry = SimpleRegistry::new();
        let txid = TxId::generate();

        registry.deliver(Packet::respond_ok(txid)).expect("deliver");
        assert_eq!(registry.buffered(), 1);

        let pending = registry.register(txid).expect("register");
        assert!(matches!(pending, Pending::Ready(ref p) if p.status()));
        assert_eq!(registry.buffered(), 0);
        assert_eq!(registry.waiting(), 0);
    }

    #[test]
    fn test_register_then_deliver_resolves_waiter() {
        let mut registry = SimpleRegistry::new();
        let txid = TxId::generate();

        let Pending::Waiting(mut rx) = registry.register(txid).expect("register") else {
            panic!("expected waiter");
        };
        registry.deliver(Packet::respond_err(txid, "x")).expect("deliver");

        let packet = rx.try_recv().expect("resolved");
        assert_eq!(packet.into_outcome().unwrap_err().remote_reason(), Some("x"));
        assert_eq!(registry.waiting(), 0);
        assert_eq!(registry.buffered(), 0);
    }

    #[test]
    fn test_other_txid_is_buffered() {
        let mut registry = SimpleRegistry::new();
        let mine = TxId::generate();
        let other = TxId::generate();

        let Pending::Waiting(mut rx) = registry.register(mine).expect("register") else {
            panic!("expected waiter");
        };
        registry.deliver(Packet::respond_ok(other)).expect("deliver");

        assert!(rx.try_recv().is_err());
        assert_eq!(registry.buffered(), 1);
    }

    #[test]
    fn test_duplicate_registration_is_rejected() {
        let mut registry = SimpleRegistry::new();
        let txid = TxId::generate();

        let _first = registry.register(txid).expect("register");
        let err = registry.register(txid).unwrap_err();
        assert!(matches!(err, Error::DuplicateWaiter { .. }));
    }

    #[test]
    fn test_dropped_waiter_response_is_buffered() {
        let mut registry = SimpleRegistry::new();
        let txid = TxId::generate();

        let pending = registry.register(txid).expect("register");
        drop(pending);
        registry.deliver(Packet::respond_ok(txid)).expect("deliver");

        assert_eq!(registry.buffered(), 1);
        assert!(matches!(registry.register(txid), Ok(Pending::Ready(_))));
    }

    #[test]
    fn test_cancel_removes_waiter() {
        let mut registry = SimpleRegistry::new();
        let txid = TxId::generate();

        let _pending = registry.register(txid).expect("register");
        assert!(registry.cancel(txid));
        assert!(!registry.cancel(txid));
        assert_eq!(registry.waiting(), 0);
        assert!(registry.register(txid).is_ok());
    }

    #[test]
    fn test_restore_after_delivery_is_picked_up() {
        let mut registry = SimpleRegistry::new();
        let txid = TxId::generate();

        let Pending::Waiting(mut rx) = registry.register(txid).expect("register") else {
            panic!("expected waiter");
        };
        registry.deliver(Packet::respond_ok(txid)).expect("deliver");
        assert!(!registry.cancel(txid));

        registry.restore(txid, rx.try_recv().expect("delivered"));
        assert!(matches!(registry.register(txid), Ok(Pending::Ready(_))));
    }

    #[test]
    fn test_deliver_without_txid_fails() {
        let mut registry = SimpleRegistry::new();
        let mut packet = Packet::respond_ok(TxId::generate());
        packet.headers.clear();
        assert!(matches!(registry.deliver(packet), Err(Error::Protocol { .. })));
    }
}
