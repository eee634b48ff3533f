//! Packet transport layer.
//!
//! The runtime owns exactly one [`Transport`] and is its only reader. A
//! transport accepts or rejects outgoing packets immediately and hands out
//! incoming packets one at a time.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐                              ┌─────────────────┐
//! │  Runtime (Rust) │        in-process or         │  Compute engine │
//! │                 │          WebSocket           │                 │
//! │  Listener ──────│◄─────────────────────────────│  respond /      │
//! │  call surface ──│─────────────────────────────►│  respond_execute│
//! └─────────────────┘                              └─────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `inproc` | Paired in-process endpoints over bounded mailboxes |
//! | `websocket` | JSON packets over a WebSocket connection |

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;

use crate::error::Result;
use crate::protocol::Packet;

// ============================================================================
// Submodules
// ============================================================================

/// In-process paired transport.
pub mod inproc;

/// WebSocket transport.
pub mod websocket;

// ============================================================================
// Re-exports
// ============================================================================

pub use inproc::{InprocTransport, MAILBOX_CAPACITY};
pub use websocket::WsTransport;

// ============================================================================
// Transport
// ============================================================================

/// A packet-oriented, full-duplex channel.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Queues a packet for sending without waiting.
    ///
    /// Returns `false` if the transport refused the packet. The caller must
    /// treat that as an immediate failure of the whole call.
    fn send(&self, packet: Packet) -> bool;

    /// Receives the next packet.
    ///
    /// Returns `Ok(None)` once the connection has closed. Implementations
    /// must be cancel-safe: dropping the returned future before completion
    /// must not lose a packet.
    async fn recv(&self) -> Result<Option<Packet>>;
}
