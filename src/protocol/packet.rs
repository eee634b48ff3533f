//! The packet envelope.
//!
//! Every unit of traffic between the runtime and the engine is a [`Packet`].
//!
//! # Format
//!
//! ```json
//! {
//!   "packet_type": "respond_execute",
//!   "headers": ["<txid>", 2, true],
//!   "body": { "status": true, "out": "c" }
//! }
//! ```
//!
//! The first header is always the transaction id. `respond_execute` packets
//! add the sequence index and the finished flag; `execute` packets add the
//! routing target (function name, component type/name, method name).

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::identifiers::TxId;

use super::{InstructionType, PacketType};

// ============================================================================
// Packet
// ============================================================================

/// An addressed unit of protocol traffic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    /// Packet kind.
    pub packet_type: PacketType,

    /// Instruction, present on `execute`/`subscribe`/`unsubscribe`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction_type: Option<InstructionType>,

    /// Correlation headers, txid first.
    pub headers: Vec<Value>,

    /// Payload map (`in`, `out`, `status`, `reason`, ...).
    #[serde(default)]
    pub body: Map<String, Value>,
}

// ============================================================================
// Packet - Constructors
// ============================================================================

impl Packet {
    /// Creates a packet with the given kind and headers and an empty body.
    #[must_use]
    pub fn new(
        packet_type: PacketType,
        instruction_type: Option<InstructionType>,
        headers: Vec<Value>,
    ) -> Self {
        Self {
            packet_type,
            instruction_type,
            headers,
            body: Map::new(),
        }
    }

    /// Inserts a body field, builder style.
    #[must_use]
    pub fn with_body(mut self, key: &str, value: Value) -> Self {
        self.body.insert(key.to_string(), value);
        self
    }

    /// `connect` packet carrying the protocol version.
    #[must_use]
    pub fn connect(txid: TxId, version: &str) -> Self {
        Self::new(
            PacketType::Connect,
            None,
            vec![txid_value(txid), Value::from(version)],
        )
    }

    /// `disconnect` packet.
    #[must_use]
    pub fn disconnect(txid: TxId) -> Self {
        Self::new(PacketType::Disconnect, None, vec![txid_value(txid)])
    }

    /// `execute`/`call_function` packet.
    #[must_use]
    pub fn call_function(txid: TxId, function: &str, input: Value) -> Self {
        Self::new(
            PacketType::Execute,
            Some(InstructionType::CallFunction),
            vec![txid_value(txid), Value::from(function)],
        )
        .with_body("in", input)
    }

    /// `execute`/`define_component` packet.
    #[must_use]
    pub fn define_component(txid: TxId, component_type: &str, name: &str, attrs: Value) -> Self {
        Self::new(
            PacketType::Execute,
            Some(InstructionType::DefineComponent),
            vec![txid_value(txid), Value::from(component_type)],
        )
        .with_body("name", Value::from(name))
        .with_body("in", attrs)
    }

    /// `execute`/`delete_component` packet.
    #[must_use]
    pub fn delete_component(txid: TxId, name: &str) -> Self {
        Self::new(
            PacketType::Execute,
            Some(InstructionType::DeleteComponent),
            vec![txid_value(txid), Value::from(name)],
        )
    }

    /// `execute`/`call_method` packet.
    #[must_use]
    pub fn call_method(txid: TxId, component: &str, method: &str, input: Value) -> Self {
        Self::new(
            PacketType::Execute,
            Some(InstructionType::CallMethod),
            vec![txid_value(txid), Value::from(component), Value::from(method)],
        )
        .with_body("in", input)
    }

    /// Successful `respond` packet.
    #[must_use]
    pub fn respond_ok(txid: TxId) -> Self {
        Self::new(PacketType::Respond, None, vec![txid_value(txid)])
            .with_body("status", Value::Bool(true))
    }

    /// Failed `respond` packet.
    #[must_use]
    pub fn respond_err(txid: TxId, reason: &str) -> Self {
        Self::new(PacketType::Respond, None, vec![txid_value(txid)])
            .with_body("status", Value::Bool(false))
            .with_body("reason", Value::from(reason))
    }

    /// Successful `respond_execute` step.
    #[must_use]
    pub fn respond_execute_ok(txid: TxId, sequence: u64, finished: bool, out: Value) -> Self {
        Self::new(
            PacketType::RespondExecute,
            None,
            vec![txid_value(txid), Value::from(sequence), Value::Bool(finished)],
        )
        .with_body("status", Value::Bool(true))
        .with_body("out", out)
    }

    /// Failed `respond_execute` step. A failure always finishes the stream.
    #[must_use]
    pub fn respond_execute_err(txid: TxId, sequence: u64, reason: &str) -> Self {
        Self::new(
            PacketType::RespondExecute,
            None,
            vec![txid_value(txid), Value::from(sequence), Value::Bool(true)],
        )
        .with_body("status", Value::Bool(false))
        .with_body("reason", Value::from(reason))
    }
}

// ============================================================================
// Packet - Accessors
// ============================================================================

impl Packet {
    /// Returns the transaction id from the first header.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the header is missing or not a txid.
    pub fn txid(&self) -> Result<TxId> {
        self.headers
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| Error::protocol(format!("{} packet without txid", self.packet_type)))?
            .parse()
    }

    /// Returns the sequence index of a `respond_execute` packet.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the header is missing or not an integer.
    pub fn sequence(&self) -> Result<u64> {
        self.headers
            .get(1)
            .and_then(Value::as_u64)
            .ok_or_else(|| Error::protocol("respond_execute packet without sequence"))
    }

    /// Returns the finished flag of a `respond_execute` packet.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the header is missing or not a boolean.
    pub fn finished(&self) -> Result<bool> {
        self.headers
            .get(2)
            .and_then(Value::as_bool)
            .ok_or_else(|| Error::protocol("respond_execute packet without finished flag"))
    }

    /// Returns `body.status`, treating a missing status as failure.
    #[inline]
    #[must_use]
    pub fn status(&self) -> bool {
        self.body
            .get("status")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Returns `body.reason`, or a placeholder when absent.
    #[must_use]
    pub fn reason(&self) -> String {
        self.body
            .get("reason")
            .and_then(Value::as_str)
            .unwrap_or("unknown reason")
            .to_string()
    }

    /// Returns `body.out`, or `null` when absent.
    #[must_use]
    pub fn out(&self) -> Value {
        self.body.get("out").cloned().unwrap_or(Value::Null)
    }

    /// Converts the body into the call outcome.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Remote`] carrying `body.reason` when `status` is false.
    pub fn into_outcome(mut self) -> Result<Value> {
        if self.status() {
            Ok(self.body.remove("out").unwrap_or(Value::Null))
        } else {
            Err(Error::remote(self.reason()))
        }
    }

    /// Returns the engine routing key of an instruction packet.
    ///
    /// Format: `"<instruction code>/<target>"`, or
    /// `"<instruction code>/<component>/<method>"` for method calls.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the packet carries no instruction or
    /// the target headers are missing.
    pub fn channel(&self) -> Result<String> {
        let itype = self
            .instruction_type
            .ok_or_else(|| Error::protocol(format!("{} packet has no instruction", self.packet_type)))?;
        let header = |i: usize| {
            self.headers
                .get(i)
                .and_then(Value::as_str)
                .ok_or_else(|| Error::protocol(format!("{itype} packet missing header {i}")))
        };

        match itype {
            InstructionType::CallMethod => {
                Ok(format!("{}/{}/{}", itype.code(), header(1)?, header(2)?))
            }
            _ => Ok(format!("{}/{}", itype.code(), header(1)?)),
        }
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let txid = self
            .headers
            .first()
            .and_then(Value::as_str)
            .unwrap_or("?");

        match (self.packet_type, self.instruction_type) {
            (PacketType::RespondExecute, _) => write!(
                f,
                "{txid} {} idx {} fin {}",
                self.packet_type,
                self.headers.get(1).unwrap_or(&Value::Null),
                self.headers.get(2).unwrap_or(&Value::Null),
            ),
            (ptype, Some(itype)) => write!(f, "{txid} {ptype} {itype}"),
            (ptype, None) => write!(f, "{txid} {ptype}"),
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

#[inline]
fn txid_value(txid: TxId) -> Value {
    Value::String(txid.to_string())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_connect_carries_version() {
        let txid = TxId::generate();
        let packet = Packet::connect(txid, "1");
        assert_eq!(packet.packet_type, PacketType::Connect);
        assert_eq!(packet.txid().expect("txid"), txid);
        assert_eq!(packet.headers[1], json!("1"));
        assert!(packet.body.is_empty());
    }

    #[test]
    fn test_call_method_headers_and_channel() {
        let txid = TxId::generate();
        let packet = Packet::call_method(txid, "lm0", "infer", json!({"prompt": "hi"}));
        assert_eq!(packet.instruction_type, Some(InstructionType::CallMethod));
        assert_eq!(packet.headers.len(), 3);
        assert_eq!(packet.body["in"], json!({"prompt": "hi"}));
        assert_eq!(packet.channel().expect("channel"), "3/lm0/infer");
    }

    #[test]
    fn test_define_component_body() {
        let txid = TxId::generate();
        let packet = Packet::define_component(txid, "vector_store", "vs0", json!({"dim": 3}));
        assert_eq!(packet.body["name"], json!("vs0"));
        assert_eq!(packet.body["in"], json!({"dim": 3}));
        assert_eq!(packet.channel().expect("channel"), "1/vector_store");
    }

    #[test]
    fn test_channel_requires_instruction() {
        let packet = Packet::disconnect(TxId::generate());
        assert!(packet.channel().is_err());
    }

    #[test]
    fn test_stream_headers() {
        let txid = TxId::generate();
        let packet = Packet::respond_execute_ok(txid, 2, true, json!("c"));
        assert_eq!(packet.sequence().expect("sequence"), 2);
        assert!(packet.finished().expect("finished"));
        assert!(packet.status());
        assert_eq!(packet.out(), json!("c"));
    }

    #[test]
    fn test_failed_step_is_finished() {
        let packet = Packet::respond_execute_err(TxId::generate(), 0, "boom");
        assert!(packet.finished().expect("finished"));
        let err = packet.into_outcome().unwrap_err();
        assert_eq!(err.remote_reason(), Some("boom"));
    }

    #[test]
    fn test_into_outcome_success_defaults_to_null() {
        let packet = Packet::respond_ok(TxId::generate());
        assert_eq!(packet.into_outcome().expect("ok"), Value::Null);
    }

    #[test]
    fn test_missing_headers_are_protocol_errors() {
        let packet = Packet::new(PacketType::RespondExecute, None, vec![]);
        assert!(matches!(packet.txid(), Err(Error::Protocol { .. })));
        assert!(matches!(packet.sequence(), Err(Error::Protocol { .. })));
        assert!(matches!(packet.finished(), Err(Error::Protocol { .. })));
        assert!(!packet.status());
    }

    #[test]
    fn test_json_shape() {
        let txid = TxId::generate();
        let packet = Packet::respond_execute_ok(txid, 0, false, json!(1));
        let value = serde_json::to_value(&packet).expect("serialize");
        assert_eq!(value["packet_type"], json!("respond_execute"));
        assert!(value.get("instruction_type").is_none());
        assert_eq!(value["headers"], json!([txid.to_string(), 0, false]));

        let parsed: Packet = serde_json::from_value(value).expect("parse");
        assert_eq!(parsed, packet);
    }

    #[test]
    fn test_display_summary() {
        let txid = TxId::generate();
        let packet = Packet::respond_execute_ok(txid, 1, false, json!("b"));
        assert_eq!(
            packet.to_string(),
            format!("{txid} respond_execute idx 1 fin false")
        );

        let packet = Packet::call_function(txid, "spell", Value::Null);
        assert_eq!(packet.to_string(), format!("{txid} execute call_function"));
    }
}
