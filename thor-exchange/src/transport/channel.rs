//! Transport channel identity, attributes, and the channel trait.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use crate::config::{EndpointUrl, HostAddress};
use crate::envelope::Message;
use crate::error::ExchangeResult;

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a transport channel.
///
/// Used as the map key wherever the exchange layer tracks per-channel state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(u64);

impl ChannelId {
    /// Allocate a fresh identity.
    pub fn next() -> Self {
        Self(NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch#{}", self.0)
    }
}

/// Value stored in a channel's attribute store.
pub type Attribute = Arc<dyn Any + Send + Sync>;

/// Thread-safe key/value attribute store for transport implementations.
#[derive(Default)]
pub struct AttributeStore {
    entries: RwLock<HashMap<String, Attribute>>,
}

impl AttributeStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Value stored under `key`.
    pub fn get(&self, key: &str) -> Option<Attribute> {
        self.entries.read().get(key).cloned()
    }

    /// Store `value` under `key`, replacing any previous value.
    pub fn set(&self, key: &str, value: Attribute) {
        self.entries.write().insert(key.to_string(), value);
    }

    /// Remove the value stored under `key`.
    pub fn remove(&self, key: &str) -> Option<Attribute> {
        self.entries.write().remove(key)
    }

    /// Whether a value is stored under `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Number of stored attributes.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl fmt::Debug for AttributeStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.read();
        let mut keys: Vec<&String> = entries.keys().collect();
        keys.sort();
        f.debug_struct("AttributeStore").field("keys", &keys).finish()
    }
}

/// One message-oriented transport connection.
///
/// Implementations must be safe to call from application threads and I/O
/// threads concurrently.
pub trait TransportChannel: Send + Sync + fmt::Display {
    /// Identity of this channel.
    fn id(&self) -> ChannelId;

    /// Endpoint descriptor this channel is currently bound to.
    fn url(&self) -> EndpointUrl;

    /// Hand `message` to the transport.
    ///
    /// With `sent` set, blocks until the write has left the local buffer;
    /// otherwise returns once queued.
    ///
    /// # Errors
    ///
    /// Returns `ExchangeError::Transport` if the transport cannot accept the message.
    fn send(&self, message: Message, sent: bool) -> ExchangeResult<()>;

    /// Local address, if bound.
    fn local_address(&self) -> Option<HostAddress>;

    /// Remote address, if known.
    fn remote_address(&self) -> Option<HostAddress>;

    /// Whether the connection is currently established.
    fn is_connected(&self) -> bool;

    /// Whether the channel has been closed.
    fn is_closed(&self) -> bool;

    /// Close immediately.
    fn close(&self) -> ExchangeResult<()>;

    /// Close, allowing the transport up to `timeout` to flush.
    fn close_with_timeout(&self, timeout: Duration) -> ExchangeResult<()> {
        let _ = timeout;
        self.close()
    }

    /// Attribute stored under `key`.
    fn attribute(&self, key: &str) -> Option<Attribute>;

    /// Store `value` under `key`.
    fn set_attribute(&self, key: &str, value: Attribute);

    /// Remove the attribute stored under `key`.
    fn remove_attribute(&self, key: &str);

    /// Whether an attribute is stored under `key`.
    fn has_attribute(&self, key: &str) -> bool {
        self.attribute(key).is_some()
    }
}
