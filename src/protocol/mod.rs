//! Packet protocol types.
//!
//! This module defines the packet envelope exchanged between the runtime
//! (local end) and the compute engine (remote end).
//!
//! # Protocol Overview
//!
//! | Packet Type | Direction | Purpose |
//! |-------------|-----------|---------|
//! | `connect` / `disconnect` | Local → Remote | Session lifecycle |
//! | `execute` | Local → Remote | Run an instruction |
//! | `respond` | Remote → Local | Single outcome |
//! | `respond_execute` | Remote → Local | One indexed step of a result stream |
//!
//! `subscribe` / `unsubscribe` exist on the wire for engine-side handlers;
//! the runtime never receives them.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `packet` | The [`Packet`] envelope, constructors and accessors |
//! | `types` | [`PacketType`] and [`InstructionType`] |

// ============================================================================
// Submodules
// ============================================================================

/// Packet envelope.
pub mod packet;

/// Packet and instruction discriminators.
pub mod types;

// ============================================================================
// Re-exports
// ============================================================================

pub use packet::Packet;
pub use types::{InstructionType, PacketType};
