//! callmux - Asynchronous call multiplexing over a single packet transport.
//!
//! This library lets a client issue many concurrent logical calls (function
//! calls, component lifecycle operations, method calls) to a remote compute
//! engine over one full-duplex connection, and consume single or streamed
//! results as they arrive.
//!
//! # Architecture
//!
//! - **Local End (Rust)**: Sends `execute` packets, correlates replies by txid
//! - **Remote End (Engine)**: Answers with `respond` / `respond_execute`
//!
//! Key design principles:
//!
//! - Every call is a transaction keyed by a fresh [`TxId`]
//! - Exactly one receive is in flight; all waiters share it
//! - Early packets are buffered, so arrival order never matters
//! - Streams are pulled one index at a time
//!
//! # Quick Start
//!
//! ```no_run
//! use callmux::{Result, Runtime};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let runtime = Runtime::connect("ws://127.0.0.1:9000").await?;
//!
//!     runtime.define("vector_store", "vs0", json!({"dim": 4})).await?;
//!     let hits = runtime.call_method("vs0", "query", json!([0.1, 0.2])).await?;
//!     println!("hits: {hits}");
//!
//!     runtime.delete("vs0").await?;
//!     runtime.stop().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Transaction ids |
//! | [`protocol`] | Packet envelope and discriminators |
//! | [`runtime`] | [`Runtime`], [`CallStream`] and the correlation machinery |
//! | [`transport`] | [`Transport`] trait, in-process and WebSocket transports |

// ============================================================================
// Modules
// ============================================================================

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Transaction identifiers.
pub mod identifiers;

/// Packet protocol types.
pub mod protocol;

/// Call runtime.
///
/// Use [`Runtime::new()`] or [`Runtime::builder()`] to create an instance.
pub mod runtime;

/// Packet transports.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::TxId;

// Protocol types
pub use protocol::{InstructionType, Packet, PacketType};

// Runtime types
pub use runtime::{AbandonPolicy, CallStream, Runtime, RuntimeBuilder, RuntimeOptions};

// Transport types
pub use transport::{InprocTransport, Transport, WsTransport};
