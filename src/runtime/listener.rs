//! Single-flight listener loop.
//!
//! The listener is the only component that reads from the transport. At
//! most one receive is in flight at any time: [`Listener::listen`] either
//! starts a receive or hands out a clone of the one already running, so all
//! concurrent callers await the same packet.
//!
//! # Receive Slot
//!
//! ```text
//! listen() ──► slot empty? ── yes ──► start recv, store Shared future ──┐
//!                 │                                                     │
//!                 no ──► clone stored Shared future ◄───────────────────┘
//!
//! recv done ──► clear slot ──► route packet:
//!                 respond          → SimpleRegistry
//!                 respond_execute  → StreamRegistry
//!                 anything else    → protocol error for every awaiting caller
//! ```
//!
//! The slot itself holds a clone of the shared future, so a receive is never
//! dropped half way when every caller stops waiting; the next `listen()`
//! resumes it. The future only holds a weak handle back to the slot, so
//! dropping the listener drops a parked receive and releases the transport.

// ============================================================================
// Imports
// ============================================================================

use std::future::Future;
use std::result::Result as StdResult;
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::protocol::{Packet, PacketType};
use crate::transport::Transport;

use super::simple::SimpleRegistry;
use super::stream::StreamRegistry;

// ============================================================================
// Types
// ============================================================================

/// Outcome shared by every caller awaiting the same receive.
type ReceiveOutcome = StdResult<(), Arc<Error>>;

/// The in-flight receive.
type SharedReceive = Shared<BoxFuture<'static, ReceiveOutcome>>;

// ============================================================================
// Registries
// ============================================================================

/// The two correlation registries owned by one runtime.
#[derive(Debug, Default)]
pub struct Registries {
    /// Single-outcome transactions.
    pub simple: Mutex<SimpleRegistry>,
    /// Streaming transactions.
    pub stream: Mutex<StreamRegistry>,
}

impl Registries {
    /// Routes an incoming packet by its type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] for packet types the runtime never
    /// receives, or for malformed correlation headers.
    pub fn route(&self, packet: Packet) -> Result<()> {
        match packet.packet_type {
            PacketType::Respond => self.simple.lock().deliver(packet),
            PacketType::RespondExecute => self.stream.lock().deliver(packet),
            other => Err(Error::protocol(format!("Undefined packet type {other}"))),
        }
    }
}

// ============================================================================
// Listener
// ============================================================================

/// Serialized access to the transport's receive path.
pub struct Listener {
    /// Transport to read from.
    transport: Arc<dyn Transport>,
    /// Routing targets.
    registries: Arc<Registries>,
    /// The receive currently in flight, if any.
    slot: Arc<Mutex<Option<SharedReceive>>>,
    /// Set once the transport reported close.
    closed: Arc<AtomicBool>,
}

impl Listener {
    /// Creates a listener reading from `transport` into `registries`.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, registries: Arc<Registries>) -> Self {
        Self {
            transport,
            registries,
            slot: Arc::new(Mutex::new(None)),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Waits for the next packet to be received and routed.
    ///
    /// Joins the in-flight receive if there is one. Resolves immediately
    /// once the transport has closed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Listener`] wrapping the receive or routing failure.
    /// Every caller sharing that receive gets the same error.
    pub fn listen(&self) -> impl Future<Output = Result<()>> + Send + 'static {
        let receive = if self.is_closed() {
            None
        } else {
            Some(self.in_flight())
        };

        async move {
            match receive {
                Some(receive) => receive.await.map_err(Error::listener),
                None => Ok(()),
            }
        }
    }

    /// Returns `true` once the transport has reported close.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Returns `true` while a receive is outstanding.
    #[inline]
    #[must_use]
    pub fn is_receiving(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Returns the in-flight receive, starting one if the slot is empty.
    fn in_flight(&self) -> SharedReceive {
        let mut slot = self.slot.lock();
        if let Some(receive) = slot.as_ref() {
            return receive.clone();
        }

        let transport = Arc::clone(&self.transport);
        let registries = Arc::clone(&self.registries);
        let slot_handle = Arc::downgrade(&self.slot);
        let closed = Arc::clone(&self.closed);

        let receive = async move {
            let received = transport.recv().await;
            if let Some(slot) = Weak::upgrade(&slot_handle) {
                slot.lock().take();
            }

            match received {
                Ok(Some(packet)) => {
                    trace!(%packet, "Packet received");
                    registries.route(packet).map_err(|e| {
                        warn!(error = %e, "Failed to route packet");
                        Arc::new(e)
                    })
                }
                Ok(None) => {
                    if !closed.swap(true, Ordering::AcqRel) {
                        debug!("Transport closed");
                        registries.stream.lock().clear_discarded();
                    }
                    Ok(())
                }
                Err(e) => {
                    warn!(error = %e, "Receive failed");
                    Err(Arc::new(e))
                }
            }
        }
        .boxed()
        .shared();

        *slot = Some(receive.clone());
        receive
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if self.slot.lock().take().is_some() {
            debug!("Dropped parked receive");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
