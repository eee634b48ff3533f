//! Error types for the call runtime.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use callmux::{Result, Runtime};
//!
//! async fn example(runtime: &Runtime) -> Result<()> {
//!     let out = runtime.call("echo", serde_json::json!({"text": "hi"})).await?;
//!     println!("{out}");
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Issuance | [`Error::SendRejected`] |
//! | Remote | [`Error::Remote`] |
//! | Connection | [`Error::ConnectionClosed`], [`Error::RequestTimeout`] |
//! | Protocol | [`Error::Protocol`], [`Error::Listener`] |
//! | Misuse | [`Error::DuplicateWaiter`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`], [`Error::ChannelClosed`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::TxId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when runtime or transport configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Issuance Errors
    // ========================================================================
    /// The transport refused an outgoing packet.
    ///
    /// No transaction is created and no response is awaited.
    #[error("{operation} failed")]
    SendRejected {
        /// Name of the operation whose packet was refused.
        operation: &'static str,
    },

    // ========================================================================
    // Remote Errors
    // ========================================================================
    /// The engine answered with `status == false`.
    #[error("Remote failure: {reason}")]
    Remote {
        /// Reason string supplied by the engine.
        reason: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Transport closed while a call was still waiting.
    #[error("Connection closed")]
    ConnectionClosed,

    /// A single wait exceeded the configured call timeout.
    #[error("Transaction {txid} timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// The transaction that timed out.
        txid: TxId,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Protocol violation or malformed packet.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    /// A shared receive failed.
    ///
    /// Every caller awaiting the same in-flight receive observes the same
    /// underlying error.
    #[error("Listener failed: {source}")]
    Listener {
        /// The error produced by the receive.
        source: Arc<Error>,
    },

    // ========================================================================
    // Misuse Errors
    // ========================================================================
    /// A second waiter was registered for a transaction already awaited.
    ///
    /// This is a bug in the caller, never a network condition.
    #[error("Waiter for {txid} already registered (requested index {index})")]
    DuplicateWaiter {
        /// The transaction already awaited.
        txid: TxId,
        /// The index the second waiter asked for.
        index: u64,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// Channel receive error.
    #[error("Channel closed")]
    ChannelClosed(#[from] RecvError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a send rejection error.
    #[inline]
    pub fn send_rejected(operation: &'static str) -> Self {
        Self::SendRejected { operation }
    }

    /// Creates a remote failure error.
    #[inline]
    pub fn remote(reason: impl Into<String>) -> Self {
        Self::Remote {
            reason: reason.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(txid: TxId, timeout_ms: u64) -> Self {
        Self::RequestTimeout { txid, timeout_ms }
    }

    /// Creates a duplicate waiter error.
    #[inline]
    pub fn duplicate_waiter(txid: TxId, index: u64) -> Self {
        Self::DuplicateWaiter { txid, index }
    }

    /// Wraps a shared receive failure.
    #[inline]
    pub fn listener(source: Arc<Error>) -> Self {
        Self::Listener { source }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns the remote reason if this is a remote failure.
    #[inline]
    #[must_use]
    pub fn remote_reason(&self) -> Option<&str> {
        match self {
            Self::Remote { reason } => Some(reason),
            _ => None,
        }
    }

    /// Returns `true` if the engine reported the failure.
    #[inline]
    #[must_use]
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote { .. })
    }

    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::RequestTimeout { .. })
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        match self {
            Self::ConnectionClosed | Self::WebSocket(_) | Self::SendRejected { .. } => true,
            Self::Listener { source } => source.is_connection_error(),
            _ => false,
        }
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed if the caller issues the call again.
    /// Nothing in this crate retries on its own.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::RequestTimeout { .. } | Self::SendRejected { .. })
    }
}

// ============================================================================
// Tests
// ============================================================================
