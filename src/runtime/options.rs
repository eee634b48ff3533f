//! Runtime configuration.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use callmux::{AbandonPolicy, RuntimeOptions};
//!
//! let options = RuntimeOptions::new()
//!     .with_call_timeout(Duration::from_secs(30))
//!     .with_abandon_policy(AbandonPolicy::Evict);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

// ============================================================================
// Constants
// ============================================================================

/// Protocol version announced in the `connect` packet.
pub const DEFAULT_PROTOCOL_VERSION: &str = "1";

// ============================================================================
// AbandonPolicy
// ============================================================================

/// What happens to a streaming call dropped before its finished packet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AbandonPolicy {
    /// Keep buffered packets for the transaction allocated.
    ///
    /// Late packets keep being buffered as well. Nothing is freed until the
    /// runtime itself is dropped.
    #[default]
    Retain,

    /// Free buffered packets and drop late packets for the transaction
    /// until its finished packet has gone by.
    Evict,
}

// ============================================================================
// RuntimeOptions
// ============================================================================

/// Runtime behaviour knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeOptions {
    /// Upper bound for each individual wait (one outcome, one stream step).
    ///
    /// `None` waits as long as the transport stays open.
    pub call_timeout: Option<Duration>,

    /// Handling of streams dropped before completion.
    pub abandon_policy: AbandonPolicy,

    /// Version string sent with `connect`.
    pub protocol_version: String,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl RuntimeOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            call_timeout: None,
            abandon_policy: AbandonPolicy::Retain,
            protocol_version: DEFAULT_PROTOCOL_VERSION.to_string(),
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl RuntimeOptions {
    /// Sets the per-wait timeout.
    #[inline]
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Sets the abandon policy.
    #[inline]
    #[must_use]
    pub fn with_abandon_policy(mut self, policy: AbandonPolicy) -> Self {
        self.abandon_policy = policy;
        self
    }

    /// Sets the protocol version sent with `connect`.
    #[inline]
    #[must_use]
    pub fn with_protocol_version(mut self, version: impl Into<String>) -> Self {
        self.protocol_version = version.into();
        self
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = RuntimeOptions::new();
        assert_eq!(options.call_timeout, None);
        assert_eq!(options.abandon_policy, AbandonPolicy::Retain);
        assert_eq!(options.protocol_version, "1");
        assert_eq!(options, RuntimeOptions::default());
    }

    #[test]
    fn test_builder_methods() {
        let options = RuntimeOptions::new()
            .with_call_timeout(Duration::from_millis(250))
            .with_abandon_policy(AbandonPolicy::Evict)
            .with_protocol_version("2");

        assert_eq!(options.call_timeout, Some(Duration::from_millis(250)));
        assert_eq!(options.abandon_policy, AbandonPolicy::Evict);
        assert_eq!(options.protocol_version, "2");
    }
}
