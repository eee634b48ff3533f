//! Call runtime: correlation registries, single-flight listener and the
//! public call surface.
//!
//! # Flow
//!
//! ```text
//! call_stream("spell", in) ──► send execute ──► CallStream
//!                                                  │ next()
//!                                                  ▼
//!                     StreamRegistry::take_or_register(txid, index)
//!                          │ buffered?  ── yes ──► value
//!                          ▼ no
//!                     Listener::listen() (shared receive) ──► route ──┐
//!                          ▲                                          │
//!                          └───────────── not yet resolved ◄──────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `builder` | [`RuntimeBuilder`] fluent configuration |
//! | `call` | [`CallStream`] pull-based result sequence |
//! | `core` | [`Runtime`] call surface and wait loop |
//! | `listener` | Single-flight receive and packet routing |
//! | `options` | [`RuntimeOptions`] and [`AbandonPolicy`] |
//! | `simple` | Registry for single-outcome transactions |
//! | `stream` | Registry for streaming transactions |

// ============================================================================
// Submodules
// ============================================================================

/// Runtime builder.
pub mod builder;

/// Streaming call handle.
pub mod call;

/// Runtime core.
pub mod core;

/// Shared receive loop.
pub mod listener;

/// Runtime options.
pub mod options;

/// Single-outcome registry.
pub mod simple;

/// Streaming registry.
pub mod stream;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::RuntimeBuilder;
pub use call::{CallStream, collapse};
pub use core::Runtime;
pub use listener::{Listener, Registries};
pub use options::{AbandonPolicy, DEFAULT_PROTOCOL_VERSION, RuntimeOptions};
pub use simple::{Pending, SimpleRegistry};
pub use stream::StreamRegistry;
