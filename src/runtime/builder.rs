//! Builder pattern for runtime configuration.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use callmux::{InprocTransport, Runtime};
//!
//! # fn example() -> callmux::Result<()> {
//! let (client, _engine) = InprocTransport::pair();
//! let runtime = Runtime::builder()
//!     .transport(client)
//!     .call_timeout(Duration::from_secs(30))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::transport::Transport;

use super::core::Runtime;
use super::options::{AbandonPolicy, RuntimeOptions};

// ============================================================================
// RuntimeBuilder
// ============================================================================

/// Builder for configuring a [`Runtime`] instance.
///
/// Use [`Runtime::builder()`] to create a new builder.
#[derive(Default, Clone)]
pub struct RuntimeBuilder {
    /// Transport the runtime will own.
    transport: Option<Arc<dyn Transport>>,
    /// Behaviour options.
    options: RuntimeOptions,
}

impl fmt::Debug for RuntimeBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeBuilder")
            .field("transport", &self.transport.is_some())
            .field("options", &self.options)
            .finish()
    }
}

// ============================================================================
// RuntimeBuilder Implementation
// ============================================================================

impl RuntimeBuilder {
    /// Creates a new builder with default options and no transport.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the transport.
    #[inline]
    #[must_use]
    pub fn transport(mut self, transport: impl Transport) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Sets an already shared transport.
    #[inline]
    #[must_use]
    pub fn shared_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Replaces all options at once.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: RuntimeOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the per-wait timeout.
    #[inline]
    #[must_use]
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.options.call_timeout = Some(timeout);
        self
    }

    /// Sets the abandon policy for streams dropped early.
    #[inline]
    #[must_use]
    pub fn abandon_policy(mut self, policy: AbandonPolicy) -> Self {
        self.options.abandon_policy = policy;
        self
    }

    /// Sets the protocol version sent with `connect`.
    #[inline]
    #[must_use]
    pub fn protocol_version(mut self, version: impl Into<String>) -> Self {
        self.options.protocol_version = version.into();
        self
    }

    /// Builds the runtime with validation.
    ///
    /// The runtime is not connected yet; call [`Runtime::start`].
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if no transport was set
    /// - [`Error::Config`] if the call timeout is zero
    /// - [`Error::Config`] if the protocol version is empty
    pub fn build(self) -> Result<Runtime> {
        let transport = self.transport.clone().ok_or_else(|| {
            Error::config(
                "Transport is required. Use .transport() to set it.\n\
                 Example: Runtime::builder().transport(InprocTransport::pair().0)",
            )
        })?;
        self.validate_options()?;

        Ok(Runtime::with_options(transport, self.options))
    }
}

// ============================================================================
// Validation
// ============================================================================

impl RuntimeBuilder {
    /// Validates the option values.
    fn validate_options(&self) -> Result<()> {
        if self.options.call_timeout.is_some_and(|t| t.is_zero()) {
            return Err(Error::config("call timeout must be greater than zero"));
        }

        if self.options.protocol_version.is_empty() {
            return Err(Error::config("protocol version must not be empty"));
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
