//! The runtime: public call surface over one transport.
//!
//! Every call generates a fresh [`TxId`], sends exactly one packet and then
//! waits on one of the two registries. Waiting means repeatedly joining the
//! shared [`Listener`] receive until the caller's own entry is satisfied,
//! so every packet that arrives moves all pending callers forward no matter
//! which transaction it belongs to.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{debug, info, trace};

use crate::error::{Error, Result};
use crate::identifiers::TxId;
use crate::protocol::Packet;
use crate::transport::{Transport, WsTransport};

use super::builder::RuntimeBuilder;
use super::call::CallStream;
use super::listener::{Listener, Registries};
use super::options::RuntimeOptions;
use super::simple::Pending;

// ============================================================================
// Runtime
// ============================================================================

/// Client runtime multiplexing logical calls over one transport.
///
/// Cheap to clone; clones share the same connection and registries.
///
/// # Example
///
/// ```no_run
/// use callmux::{Runtime, Result};
/// use serde_json::json;
///
/// # async fn example() -> Result<()> {
/// let runtime = Runtime::connect("ws://127.0.0.1:9000").await?;
///
/// let mut stream = runtime.call_stream("spell", json!({"text": "abc"}))?;
/// while let Some(letter) = stream.next().await {
///     println!("{}", letter?);
/// }
///
/// runtime.stop().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

/// Shared runtime state.
struct RuntimeInner {
    transport: Arc<dyn Transport>,
    registries: Arc<Registries>,
    listener: Listener,
    options: RuntimeOptions,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("options", &self.inner.options)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Runtime - Constructors
// ============================================================================

impl Runtime {
    /// Creates a runtime over `transport` with default options.
    ///
    /// The runtime is not connected yet; call [`Runtime::start`].
    #[must_use]
    pub fn new(transport: impl Transport) -> Self {
        Self::with_options(Arc::new(transport), RuntimeOptions::default())
    }

    /// Creates a builder for custom configuration.
    #[inline]
    #[must_use]
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Connects to a WebSocket engine and starts the session.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if `url` is not a WebSocket URL
    /// - [`Error::WebSocket`] if the handshake fails
    /// - any error from [`Runtime::start`]
    pub async fn connect(url: &str) -> Result<Self> {
        let runtime = Self::new(WsTransport::connect(url).await?);
        runtime.start().await?;
        Ok(runtime)
    }

    /// Creates a runtime from validated parts.
    pub(crate) fn with_options(transport: Arc<dyn Transport>, options: RuntimeOptions) -> Self {
        let registries = Arc::new(Registries::default());
        let listener = Listener::new(Arc::clone(&transport), Arc::clone(&registries));

        Self {
            inner: Arc::new(RuntimeInner {
                transport,
                registries,
                listener,
                options,
            }),
        }
    }
}

// ============================================================================
// Runtime - Lifecycle
// ============================================================================

impl Runtime {
    /// Opens the session with the engine.
    ///
    /// # Errors
    ///
    /// - [`Error::SendRejected`] if the transport refused the packet
    /// - [`Error::Remote`] if the engine refused the session
    pub async fn start(&self) -> Result<()> {
        let txid = TxId::generate();
        self.issue(Packet::connect(txid, &self.inner.options.protocol_version), "Connection")?;
        self.await_outcome(txid).await?.into_outcome()?;

        info!(%txid, "Session started");
        Ok(())
    }

    /// Closes the session with the engine.
    ///
    /// # Errors
    ///
    /// - [`Error::SendRejected`] if the transport refused the packet
    /// - [`Error::Remote`] if the engine refused the disconnect
    pub async fn stop(&self) -> Result<()> {
        let txid = TxId::generate();
        self.issue(Packet::disconnect(txid), "Disconnection")?;
        self.await_outcome(txid).await?.into_outcome()?;

        info!(%txid, "Session stopped");
        Ok(())
    }
}

// ============================================================================
// Runtime - Calls
// ============================================================================

impl Runtime {
    /// Calls a function and collects all of its results.
    ///
    /// Zero results yield `null`, one result is returned as is, more yield
    /// an array in sequence order.
    ///
    /// # Errors
    ///
    /// - [`Error::SendRejected`] if the transport refused the packet
    /// - [`Error::Remote`] if any step failed
    pub async fn call(&self, function: &str, input: Value) -> Result<Value> {
        self.call_stream(function, input)?.collect_collapsed().await
    }

    /// Calls a function and returns its results as a pull-based stream.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SendRejected`] if the transport refused the packet.
    pub fn call_stream(&self, function: &str, input: Value) -> Result<CallStream> {
        let txid = TxId::generate();
        self.issue(Packet::call_function(txid, function, input), "Call")?;
        Ok(CallStream::new(self.clone(), txid))
    }

    /// Calls a method on a named component and collects its results.
    ///
    /// # Errors
    ///
    /// - [`Error::SendRejected`] if the transport refused the packet
    /// - [`Error::Remote`] if any step failed
    pub async fn call_method(&self, component: &str, method: &str, input: Value) -> Result<Value> {
        self.call_method_stream(component, method, input)?
            .collect_collapsed()
            .await
    }

    /// Calls a method on a named component and returns a result stream.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SendRejected`] if the transport refused the packet.
    pub fn call_method_stream(
        &self,
        component: &str,
        method: &str,
        input: Value,
    ) -> Result<CallStream> {
        let txid = TxId::generate();
        self.issue(Packet::call_method(txid, component, method, input), "CallMethod")?;
        Ok(CallStream::new(self.clone(), txid))
    }

    /// Defines a named component of the given type.
    ///
    /// # Errors
    ///
    /// - [`Error::SendRejected`] if the transport refused the packet
    /// - [`Error::Remote`] carrying the engine's reason on failure
    pub async fn define(&self, component_type: &str, name: &str, attrs: Value) -> Result<bool> {
        let txid = TxId::generate();
        self.issue(
            Packet::define_component(txid, component_type, name, attrs),
            "Define",
        )?;
        self.await_single_step(txid).await
    }

    /// Deletes a named component.
    ///
    /// # Errors
    ///
    /// - [`Error::SendRejected`] if the transport refused the packet
    /// - [`Error::Remote`] carrying the engine's reason on failure
    pub async fn delete(&self, name: &str) -> Result<bool> {
        let txid = TxId::generate();
        self.issue(Packet::delete_component(txid, name), "Delete")?;
        self.await_single_step(txid).await
    }
}

// ============================================================================
// Runtime - Diagnostics
// ============================================================================

impl Runtime {
    /// Returns the active options.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &RuntimeOptions {
        &self.inner.options
    }

    /// Returns `true` once the transport has reported close.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.listener.is_closed()
    }

    /// Number of single-outcome transactions waiting or buffered.
    #[must_use]
    pub fn pending_simple(&self) -> usize {
        let simple = self.inner.registries.simple.lock();
        simple.waiting() + simple.buffered()
    }

    /// Number of stream steps received but not yet consumed.
    #[must_use]
    pub fn pending_stream_packets(&self) -> usize {
        self.inner.registries.stream.lock().buffered()
    }
}

// ============================================================================
// Runtime - Internals
// ============================================================================

impl Runtime {
    /// Sends the packet that opens a transaction.
    fn issue(&self, packet: Packet, operation: &'static str) -> Result<()> {
        let channel = packet.channel().ok();
        trace!(%packet, channel = channel.as_deref(), "Issuing");
        if self.inner.transport.send(packet) {
            Ok(())
        } else {
            debug!(operation, channel = channel.as_deref(), "Transport rejected packet");
            Err(Error::send_rejected(operation))
        }
    }

    /// Waits for the single `respond` packet of `txid`.
    pub(crate) async fn await_outcome(&self, txid: TxId) -> Result<Packet> {
        let pending = self.inner.registries.simple.lock().register(txid)?;
        self.resolve(txid, WaiterKey::Simple(txid), pending).await
    }

    /// Waits for step `index` of the stream `txid`.
    pub(crate) async fn await_step(&self, txid: TxId, index: u64) -> Result<Packet> {
        let pending = self
            .inner
            .registries
            .stream
            .lock()
            .take_or_register(txid, index)?;
        self.resolve(txid, WaiterKey::Step(txid, index), pending).await
    }

    /// Waits for step 0 of an `execute` answered by a single outcome.
    async fn await_single_step(&self, txid: TxId) -> Result<bool> {
        let packet = self.await_step(txid, 0).await?;
        if !packet.finished().unwrap_or(true) {
            self.abandon(txid);
        }
        packet.into_outcome()?;
        Ok(true)
    }

    /// Applies the abandon policy to an unfinished stream.
    pub(crate) fn abandon(&self, txid: TxId) {
        self.inner
            .registries
            .stream
            .lock()
            .abandon(txid, self.inner.options.abandon_policy);
    }

    /// Drives the listener until `pending` resolves.
    async fn resolve(&self, txid: TxId, key: WaiterKey, pending: Pending) -> Result<Packet> {
        let mut guard = match pending {
            Pending::Ready(packet) => return Ok(packet),
            Pending::Waiting(rx) => WaiterGuard::new(&self.inner.registries, key, rx),
        };

        let packet = match self.inner.options.call_timeout {
            Some(limit) => timeout(limit, self.wait(&mut guard))
                .await
                .map_err(|_| Error::request_timeout(txid, limit.as_millis() as u64))??,
            None => self.wait(&mut guard).await?,
        };

        guard.settle();
        Ok(packet)
    }

    /// Joins shared receives until the guarded waiter is resolved.
    async fn wait(&self, guard: &mut WaiterGuard<'_>) -> Result<Packet> {
        loop {
            tokio::select! {
                biased;

                packet = &mut guard.rx => return Ok(packet?),

                listened = self.inner.listener.listen() => {
                    listened?;
                    if self.inner.listener.is_closed() {
                        return guard.rx.try_recv().map_err(|_| Error::ConnectionClosed);
                    }
                }
            }
        }
    }
}

// ============================================================================
// WaiterGuard
// ============================================================================

/// Registry entry owned by one wait.
#[derive(Debug, Clone, Copy)]
enum WaiterKey {
    Simple(TxId),
    Step(TxId, u64),
}

/// Owns the receiving end of one registered waiter.
///
/// Dropped before settling, it removes the waiter if it is still
/// registered. If the packet was already routed into the receiver, the
/// packet is put back into the registry buffer so the next wait finds it.
struct WaiterGuard<'a> {
    registries: &'a Registries,
    key: WaiterKey,
    rx: oneshot::Receiver<Packet>,
    settled: bool,
}

impl<'a> WaiterGuard<'a> {
    fn new(registries: &'a Registries, key: WaiterKey, rx: oneshot::Receiver<Packet>) -> Self {
        Self {
            registries,
            key,
            rx,
            settled: false,
        }
    }

    /// Marks the packet as handed to the caller.
    fn settle(&mut self) {
        self.settled = true;
    }
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }

        // Delivery happens under the registry lock, so holding it here
        // means the waiter is either still registered or its packet is
        // already in `rx`.
        match self.key {
            WaiterKey::Simple(txid) => {
                let mut simple = self.registries.simple.lock();
                if !simple.cancel(txid)
                    && let Ok(packet) = self.rx.try_recv()
                {
                    simple.restore(txid, packet);
                }
            }
            WaiterKey::Step(txid, index) => {
                let mut stream = self.registries.stream.lock();
                if !stream.cancel(txid, index)
                    && let Ok(packet) = self.rx.try_recv()
                {
                    stream.restore(txid, index, packet);
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
