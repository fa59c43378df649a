//! Request envelopes and the process-wide id allocator.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use super::message::Payload;

/// Protocol version stamped on every request built by this crate.
pub const PROTOCOL_VERSION: &str = "2.0.0";

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate the next request id.
///
/// Ids are monotonically increasing for the process lifetime, starting at 1.
pub fn next_request_id() -> u64 {
    NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed)
}

/// An outgoing request envelope. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    id: u64,
    version: String,
    two_way: bool,
    event: bool,
    data: Payload,
}

impl Request {
    /// Build a two-way request carrying `data`, with a fresh id.
    pub fn two_way(data: impl Into<Payload>) -> Self {
        Self::build(next_request_id(), true, false, data.into())
    }

    /// Build a one-way request carrying `data`, with a fresh id.
    pub fn one_way(data: impl Into<Payload>) -> Self {
        Self::build(next_request_id(), false, false, data.into())
    }

    /// Build a two-way heartbeat event request.
    pub fn heartbeat() -> Self {
        Self::build(next_request_id(), true, true, Payload::empty())
    }

    /// Rebuild a request with a known id, e.g. after decoding it from the wire.
    pub fn with_id(id: u64, two_way: bool, event: bool, data: impl Into<Payload>) -> Self {
        Self::build(id, two_way, event, data.into())
    }

    fn build(id: u64, two_way: bool, event: bool, data: Payload) -> Self {
        Self {
            id,
            version: PROTOCOL_VERSION.to_string(),
            two_way,
            event,
            data,
        }
    }

    /// Request id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Protocol version.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Whether a response is expected.
    pub fn is_two_way(&self) -> bool {
        self.two_way
    }

    /// Whether this is a control event (heartbeat) rather than an invocation.
    pub fn is_event(&self) -> bool {
        self.event
    }

    /// The opaque payload.
    pub fn data(&self) -> &Payload {
        &self.data
    }

    /// Consume the request, returning its payload.
    pub fn into_data(self) -> Payload {
        self.data
    }
}
