//! Packet and instruction discriminators.
//!
//! Both enums carry a stable numeric wire code as their discriminant,
//! alongside their snake_case serialized name.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// PacketType
// ============================================================================

/// Kind of a packet travelling over the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum PacketType {
    /// Open a session with the engine.
    Connect = 0,
    /// Close a session with the engine.
    Disconnect = 1,
    /// Register a handler channel (engine side).
    Subscribe = 2,
    /// Drop a handler channel (engine side).
    Unsubscribe = 3,
    /// Run an instruction.
    Execute = 4,
    /// Single response to connect/disconnect/subscribe/unsubscribe.
    Respond = 16,
    /// One step of a response to `execute`.
    RespondExecute = 17,
}

impl PacketType {
    /// Returns the snake_case name used on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::Subscribe => "subscribe",
            Self::Unsubscribe => "unsubscribe",
            Self::Execute => "execute",
            Self::Respond => "respond",
            Self::RespondExecute => "respond_execute",
        }
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// InstructionType
// ============================================================================

/// Instruction carried by `execute`, `subscribe` and `unsubscribe` packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstructionType {
    /// Invoke a free function.
    CallFunction,
    /// Instantiate a named component.
    DefineComponent,
    /// Destroy a named component.
    DeleteComponent,
    /// Invoke a method on a named component.
    CallMethod,
}

impl InstructionType {
    /// Returns the numeric wire code.
    #[inline]
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::CallFunction => 0,
            Self::DefineComponent => 1,
            Self::DeleteComponent => 2,
            Self::CallMethod => 3,
        }
    }

    /// Returns the snake_case name used on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CallFunction => "call_function",
            Self::DefineComponent => "define_component",
            Self::DeleteComponent => "delete_component",
            Self::CallMethod => "call_method",
        }
    }
}

impl fmt::Display for InstructionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_type_codes() {
        assert_eq!(PacketType::Execute as u8, 4);
        assert_eq!(PacketType::Respond as u8, 16);
        assert_eq!(PacketType::RespondExecute as u8, 17);
    }

    #[test]
    fn test_packet_type_serde_name() {
        let json = serde_json::to_string(&PacketType::RespondExecute).expect("serialize");
        assert_eq!(json, "\"respond_execute\"");
        assert_eq!(PacketType::RespondExecute.to_string(), "respond_execute");
    }

    #[test]
    fn test_unknown_packet_type_fails_to_parse() {
        let result = serde_json::from_str::<PacketType>("\"broadcast\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_instruction_type_codes() {
        assert_eq!(InstructionType::CallMethod.code(), 3);
        assert_eq!(InstructionType::DefineComponent.code(), 1);
        assert_eq!(InstructionType::DeleteComponent.as_str(), "delete_component");
    }
}
