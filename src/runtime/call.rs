//! Pull-based result sequence of a streaming call.
//!
//! A [`CallStream`] is lazy, finite and non-restartable. Each
//! [`CallStream::next`] asks the runtime for the next sequence index and
//! suspends on the shared listener until that step is available. Once the
//! step flagged `finished` has been consumed the sequence ends without any
//! further transport interaction.

// ============================================================================
// Imports
// ============================================================================

use futures_util::Stream;
use futures_util::stream;
use serde_json::Value;
use tracing::trace;

use crate::error::Result;
use crate::identifiers::TxId;

use super::core::Runtime;

// ============================================================================
// CallStream
// ============================================================================

/// Ordered results of one streaming call.
///
/// Dropping the stream before it has finished applies the runtime's
/// [`AbandonPolicy`](super::AbandonPolicy) to the transaction.
#[must_use = "streams do nothing unless pulled"]
pub struct CallStream {
    /// Owning runtime.
    runtime: Runtime,
    /// Transaction being consumed.
    txid: TxId,
    /// Next sequence index to request.
    next_index: u64,
    /// Set once the finished step (or a failure) has been consumed.
    finished: bool,
}

impl CallStream {
    /// Creates a stream positioned at index 0.
    pub(crate) fn new(runtime: Runtime, txid: TxId) -> Self {
        Self {
            runtime,
            txid,
            next_index: 0,
            finished: false,
        }
    }

    /// Returns the transaction id of this call.
    #[inline]
    #[must_use]
    pub fn txid(&self) -> TxId {
        self.txid
    }

    /// Returns `true` once no further results will be produced.
    #[inline]
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Pulls the next result.
    ///
    /// Returns `None` after the finished step has been consumed. A remote
    /// failure is yielded once as `Some(Err(_))` and ends the sequence. A
    /// timed out pull leaves the position unchanged, so pulling again
    /// resumes waiting for the same step.
    pub async fn next(&mut self) -> Option<Result<Value>> {
        if self.finished {
            return None;
        }

        let packet = match self.runtime.await_step(self.txid, self.next_index).await {
            Ok(packet) => packet,
            Err(e) => return Some(Err(e)),
        };

        trace!(txid = %self.txid, index = self.next_index, "Step consumed");
        self.next_index += 1;

        // Sequence and finished headers were validated on delivery.
        if packet.finished().unwrap_or(true) {
            self.finished = true;
        }

        let outcome = packet.into_outcome();
        if outcome.is_err() {
            self.finished = true;
        }
        Some(outcome)
    }

    /// Drains the remaining results and collapses them by count.
    ///
    /// # Errors
    ///
    /// Returns the first error yielded by the stream.
    pub async fn collect_collapsed(mut self) -> Result<Value> {
        let mut values = Vec::new();
        while let Some(value) = self.next().await {
            values.push(value?);
        }
        Ok(collapse(values))
    }

    /// Adapts the pull interface into a [`futures_util::Stream`].
    pub fn into_stream(self) -> impl Stream<Item = Result<Value>> + Send {
        stream::unfold(self, |mut call| async move {
            let item = call.next().await?;
            Some((item, call))
        })
    }
}

impl Drop for CallStream {
    fn drop(&mut self) {
        if !self.finished {
            self.runtime.abandon(self.txid);
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Collapses call results by count.
///
/// Zero results become `null`, exactly one is returned as is, more than one
/// become an array in request order.
#[must_use]
pub fn collapse(mut values: Vec<Value>) -> Value {
    match values.len() {
        0 => Value::Null,
        1 => values.pop().unwrap_or(Value::Null),
        _ => Value::Array(values),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_collapse_zero_is_null() {
        assert_eq!(collapse(vec![]), Value::Null);
    }

    #[test]
    fn test_collapse_one_is_unwrapped() {
        assert_eq!(collapse(vec![json!([1, 2])]), json!([1, 2]));
    }

    #[test]
    fn test_collapse_many_is_ordered_array() {
        assert_eq!(
            collapse(vec![json!("a"), json!("b"), json!("c")]),
            json!(["a", "b", "c"])
        );
    }
}
