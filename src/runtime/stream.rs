//! Registry for streaming transactions.
//!
//! Each txid yields an ordered sequence of `respond_execute` packets indexed
//! from 0. Consumers pull one index at a time; packets that arrive before
//! their index is requested are kept in a per-txid buffer, so raw arrival
//! order never matters.
//!
//! At most one waiter exists per txid. It is keyed by `(txid, index)` and
//! only a packet with exactly that index resolves it.

// ============================================================================
// Imports
// ============================================================================

use rustc_hash::{FxHashMap, FxHashSet};
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::identifiers::TxId;
use crate::protocol::Packet;

use super::options::AbandonPolicy;
use super::simple::Pending;

// ============================================================================
// Types
// ============================================================================

/// A consumer parked on one index.
#[derive(Debug)]
struct StepWaiter {
    index: u64,
    tx: oneshot::Sender<Packet>,
}

// ============================================================================
// StreamRegistry
// ============================================================================

/// txid → step waiter / buffered steps.
#[derive(Debug, Default)]
pub struct StreamRegistry {
    /// One waiter per txid.
    waiters: FxHashMap<TxId, StepWaiter>,
    /// Steps that arrived before being requested.
    buffered: FxHashMap<TxId, FxHashMap<u64, Packet>>,
    /// Abandoned transactions whose late packets are dropped.
    discarded: FxHashSet<TxId>,
}

impl StreamRegistry {
    /// Creates an empty registry.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the buffered step `(txid, index)` or registers a waiter for it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateWaiter`] if a waiter for `txid` already
    /// exists.
    pub fn take_or_register(&mut self, txid: TxId, index: u64) -> Result<Pending> {
        if let Some(steps) = self.buffered.get_mut(&txid)
            && let Some(packet) = steps.remove(&index)
        {
            if steps.is_empty() {
                self.buffered.remove(&txid);
            }
            trace!(%txid, index, "Buffered step consumed");
            return Ok(Pending::Ready(packet));
        }

        if self.waiters.contains_key(&txid) {
            return Err(Error::duplicate_waiter(txid, index));
        }

        let (tx, rx) = oneshot::channel();
        self.waiters.insert(txid, StepWaiter { index, tx });
        Ok(Pending::Waiting(rx))
    }

    /// Routes a `respond_execute` packet to its waiter or buffers it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if txid, sequence or finished headers are
    /// missing or malformed.
    pub fn deliver(&mut self, packet: Packet) -> Result<()> {
        let txid = packet.txid()?;
        let index = packet.sequence()?;
        let finished = packet.finished()?;

        if self.discarded.contains(&txid) {
            if finished {
                self.discarded.remove(&txid);
            }
            trace!(%txid, index, "Dropped step of abandoned stream");
            return Ok(());
        }

        let packet = match self.waiters.remove(&txid) {
            Some(waiter) if waiter.index == index => match waiter.tx.send(packet) {
                Ok(()) => {
                    trace!(%txid, index, finished, "Step delivered");
                    return Ok(());
                }
                // Waiter went away between registration and delivery.
                Err(packet) => packet,
            },
            Some(waiter) => {
                self.waiters.insert(txid, waiter);
                packet
            }
            None => packet,
        };

        self.buffered.entry(txid).or_default().insert(index, packet);
        trace!(%txid, index, finished, "Step buffered");
        Ok(())
    }

    /// Removes the waiter for `(txid, index)`, if that is the registered one.
    ///
    /// Returns `false` if no such waiter was registered, meaning its step
    /// has already been handed to the receiver.
    pub fn cancel(&mut self, txid: TxId, index: u64) -> bool {
        if self.waiters.get(&txid).is_some_and(|w| w.index == index) {
            self.waiters.remove(&txid);
            true
        } else {
            false
        }
    }

    /// Puts back a step taken from a receiver that is going away.
    pub fn restore(&mut self, txid: TxId, index: u64, packet: Packet) {
        trace!(%txid, index, "Step restored");
        self.buffered.entry(txid).or_default().insert(index, packet);
    }

    /// Forgets abandoned transactions whose finished step can no longer
    /// arrive.
    pub fn clear_discarded(&mut self) {
        if !self.discarded.is_empty() {
            debug!(count = self.discarded.len(), "Clearing abandoned streams");
            self.discarded.clear();
        }
    }

    /// Applies `policy` to a stream dropped before its finished step.
    pub fn abandon(&mut self, txid: TxId, policy: AbandonPolicy) {
        self.waiters.remove(&txid);

        match policy {
            AbandonPolicy::Retain => {
                debug!(%txid, buffered = self.buffered_for(txid), "Stream abandoned, buffers retained");
            }
            AbandonPolicy::Evict => {
                let steps = self.buffered.remove(&txid).unwrap_or_default();
                let finish_seen = steps
                    .values()
                    .any(|p| p.finished().unwrap_or(false));
                if !finish_seen {
                    self.discarded.insert(txid);
                }
                debug!(%txid, evicted = steps.len(), "Stream abandoned, buffers evicted");
            }
        }
    }

    /// Number of buffered steps for `txid`.
    #[must_use]
    pub fn buffered_for(&self, txid: TxId) -> usize {
        self.buffered.get(&txid).map_or(0, FxHashMap::len)
    }

    /// Total number of buffered steps.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffered.values().map(FxHashMap::len).sum()
    }

    /// Number of registered waiters.
    #[inline]
    #[must_use]
    pub fn waiting(&self) -> usize {
        self.waiters.len()
    }

    /// Number of abandoned transactions still expecting packets.
    #[inline]
    #[must_use]
    pub fn discarded(&self) -> usize {
        self.discarded.len()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn step(txid: TxId, index: u64, finished: bool) -> Packet {
        Packet::respond_execute_ok(txid, index, finished, json!(index))
    }

    fn take_ready(registry: &mut StreamRegistry, txid: TxId, index: u64) -> Packet {
        match registry.take_or_register(txid, index).expect("take") {
            Pending::Ready(packet) => packet,
            Pending::Waiting(_) => panic!("expected buffered step {index}"),
        }
    }

    #[test]
    fn test_buffer_then_request_in_order() {
        let mut registry = StreamRegistry::new();
        let txid = TxId::generate();

        for i in 0..3 {
            registry.deliver(step(txid, i, i == 2)).expect("deliver");
        }
        assert_eq!(registry.buffered_for(txid), 3);

        for i in 0..3 {
            let packet = take_ready(&mut registry, txid, i);
            assert_eq!(packet.out(), json!(i));
            assert_eq!(packet.finished().expect("finished"), i == 2);
        }
        assert_eq!(registry.buffered(), 0);
    }

    #[test]
    fn test_out_of_order_arrival_is_buffered() {
        let mut registry = StreamRegistry::new();
        let txid = TxId::generate();

        let Pending::Waiting(mut rx) = registry.take_or_register(txid, 0).expect("take") else {
            panic!("expected waiter");
        };

        registry.deliver(step(txid, 1, true)).expect("deliver");
        assert!(rx.try_recv().is_err());
        assert_eq!(registry.buffered_for(txid), 1);

        registry.deliver(step(txid, 0, false)).expect("deliver");
        assert_eq!(rx.try_recv().expect("resolved").out(), json!(0));

        assert_eq!(take_ready(&mut registry, txid, 1).out(), json!(1));
    }

    #[test]
    fn test_duplicate_waiter_is_rejected() {
        let mut registry = StreamRegistry::new();
        let txid = TxId::generate();

        let _first = registry.take_or_register(txid, 0).expect("take");
        let err = registry.take_or_register(txid, 0).unwrap_err();
        assert!(matches!(err, Error::DuplicateWaiter { index: 0, .. }));
    }

    #[test]
    fn test_streams_do_not_interfere() {
        let mut registry = StreamRegistry::new();
        let a = TxId::generate();
        let b = TxId::generate();

        registry.deliver(step(b, 0, false)).expect("deliver");
        let Pending::Waiting(mut rx) = registry.take_or_register(a, 0).expect("take") else {
            panic!("expected waiter");
        };
        registry.deliver(step(a, 0, true)).expect("deliver");

        assert_eq!(rx.try_recv().expect("resolved").txid().expect("txid"), a);
        assert_eq!(take_ready(&mut registry, b, 0).txid().expect("txid"), b);
    }

    #[test]
    fn test_cancelled_waiter_step_is_buffered() {
        let mut registry = StreamRegistry::new();
        let txid = TxId::generate();

        let pending = registry.take_or_register(txid, 0).expect("take");
        assert!(registry.cancel(txid, 0));
        drop(pending);
        assert_eq!(registry.waiting(), 0);

        registry.deliver(step(txid, 0, true)).expect("deliver");
        assert_eq!(take_ready(&mut registry, txid, 0).out(), json!(0));
    }

    #[test]
    fn test_cancel_ignores_other_index() {
        let mut registry = StreamRegistry::new();
        let txid = TxId::generate();

        let _pending = registry.take_or_register(txid, 4).expect("take");
        assert!(!registry.cancel(txid, 3));
        assert_eq!(registry.waiting(), 1);
    }

    #[test]
    fn test_restored_step_is_taken_again() {
        let mut registry = StreamRegistry::new();
        let txid = TxId::generate();

        let Pending::Waiting(mut rx) = registry.take_or_register(txid, 0).expect("take") else {
            panic!("expected waiter");
        };
        registry.deliver(step(txid, 0, false)).expect("deliver");
        assert!(!registry.cancel(txid, 0));

        registry.restore(txid, 0, rx.try_recv().expect("delivered"));
        assert_eq!(registry.buffered_for(txid), 1);
        assert_eq!(take_ready(&mut registry, txid, 0).out(), json!(0));
    }

    #[test]
    fn test_clear_discarded_forgets_evicted_streams() {
        let mut registry = StreamRegistry::new();
        let txid = TxId::generate();

        registry.deliver(step(txid, 0, false)).expect("deliver");
        registry.abandon(txid, AbandonPolicy::Evict);
        assert_eq!(registry.discarded(), 1);

        registry.clear_discarded();
        assert_eq!(registry.discarded(), 0);
    }

    #[test]
    fn test_abandon_retain_keeps_buffers() {
        let mut registry = StreamRegistry::new();
        let txid = TxId::generate();

        registry.deliver(step(txid, 1, false)).expect("deliver");
        registry.abandon(txid, AbandonPolicy::Retain);
        registry.deliver(step(txid, 2, true)).expect("deliver");

        assert_eq!(registry.buffered_for(txid), 2);
        assert_eq!(registry.discarded(), 0);
    }

    #[test]
    fn test_abandon_evict_drops_late_packets() {
        let mut registry = StreamRegistry::new();
        let txid = TxId::generate();

        registry.deliver(step(txid, 1, false)).expect("deliver");
        registry.abandon(txid, AbandonPolicy::Evict);
        assert_eq!(registry.buffered(), 0);
        assert_eq!(registry.discarded(), 1);

        registry.deliver(step(txid, 2, false)).expect("deliver");
        registry.deliver(step(txid, 3, true)).expect("deliver");
        assert_eq!(registry.buffered(), 0);
        assert_eq!(registry.discarded(), 0);
    }

    #[test]
    fn test_abandon_evict_after_finish_seen() {
        let mut registry = StreamRegistry::new();
        let txid = TxId::generate();

        registry.deliver(step(txid, 0, true)).expect("deliver");
        registry.abandon(txid, AbandonPolicy::Evict);
        assert_eq!(registry.buffered(), 0);
        assert_eq!(registry.discarded(), 0);
    }

    #[test]
    fn test_malformed_step_is_protocol_error() {
        let mut registry = StreamRegistry::new();
        let mut packet = step(TxId::generate(), 0, false);
        packet.headers.truncate(2);
        assert!(matches!(registry.deliver(packet), Err(Error::Protocol { .. })));
    }
}
