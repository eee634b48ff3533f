//! Type-safe transaction identifiers.
//!
//! A [`TxId`] correlates a logical call with every response packet the
//! engine sends for it. Identifiers are random v4 UUIDs, so a txid is never
//! reused while any state for it is alive.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

// ============================================================================
// TxId
// ============================================================================

/// Transaction identifier carried as the first header of every packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxId(Uuid);

impl TxId {
    /// Generates a fresh, globally unique identifier.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for TxId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| Error::protocol(format!("invalid txid {s:?}: {e}")))
    }
}

// ============================================================================
// Tests
// ============================================================================
