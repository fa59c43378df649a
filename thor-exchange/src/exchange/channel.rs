//! ExchangeChannel: request/response framing over one transport channel.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use crate::config::{EndpointUrl, ExchangeConfig, HostAddress};
use crate::envelope::{Message, Payload, Request};
use crate::error::{ExchangeError, ExchangeResult};
use crate::future::{FutureRegistry, ResponseFuture};
use crate::transport::{Attribute, ChannelId, TransportChannel};

/// Attribute key under which a transport channel caches its wrapper.
const CHANNEL_KEY: &str = "thor_exchange::ExchangeChannel";

/// Wraps one transport channel with request/response semantics.
///
/// The wrapper holds only a weak reference to its transport: the transport's
/// owner decides how long the connection lives. Equality and hashing follow
/// the transport's identity.
pub struct ExchangeChannel {
    id: ChannelId,
    name: String,
    channel: Weak<dyn TransportChannel>,
    registry: FutureRegistry,
    closed: AtomicBool,
}

impl ExchangeChannel {
    /// Wrap `channel`, registering pending requests in `registry`.
    pub fn new(channel: &Arc<dyn TransportChannel>, registry: FutureRegistry) -> Self {
        Self {
            id: channel.id(),
            name: channel.to_string(),
            channel: Arc::downgrade(channel),
            registry,
            closed: AtomicBool::new(false),
        }
    }

    /// Return the wrapper cached on `channel`, creating one if needed.
    ///
    /// A new wrapper is only cached while the channel reports connected.
    pub fn get_or_create(
        channel: &Arc<dyn TransportChannel>,
        registry: &FutureRegistry,
    ) -> Arc<ExchangeChannel> {
        if let Some(existing) = channel
            .attribute(CHANNEL_KEY)
            .and_then(|attribute| attribute.downcast::<ExchangeChannel>().ok())
        {
            return existing;
        }
        let created = Arc::new(ExchangeChannel::new(channel, registry.clone()));
        if channel.is_connected() {
            channel.set_attribute(CHANNEL_KEY, created.clone());
        }
        created
    }

    /// Evict the cached wrapper if `channel` is no longer connected.
    pub fn remove_if_disconnected(channel: &Arc<dyn TransportChannel>) {
        if !channel.is_connected() {
            channel.remove_attribute(CHANNEL_KEY);
        }
    }

    /// Identity of the wrapped transport channel.
    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// Registry this channel registers pending requests in.
    pub fn registry(&self) -> &FutureRegistry {
        &self.registry
    }

    /// Send `message`, using the endpoint's `sent` parameter for write confirmation.
    ///
    /// # Errors
    ///
    /// Returns `ExchangeError::ChannelClosed` after close, or the transport's failure.
    pub fn send(&self, message: impl Into<Message>) -> ExchangeResult<()> {
        let transport = self.open_transport("send")?;
        let sent = ExchangeConfig::from_url(&transport.url()).sent;
        Self::forward(&*transport, message.into(), sent)
    }

    /// Send `message`; with `sent` set, block until the transport confirms the write.
    ///
    /// Unframed payloads are wrapped in a one-way request. Requests,
    /// responses, and raw text are forwarded unchanged.
    ///
    /// # Errors
    ///
    /// Returns `ExchangeError::ChannelClosed` after close, or the transport's failure.
    pub fn send_with(&self, message: impl Into<Message>, sent: bool) -> ExchangeResult<()> {
        let transport = self.open_transport("send")?;
        Self::forward(&*transport, message.into(), sent)
    }

    fn forward(transport: &dyn TransportChannel, message: Message, sent: bool) -> ExchangeResult<()> {
        let message = message.into_framed();
        tracing::trace!(channel = %transport, ?message, sent, "forwarding message");
        transport.send(message, sent)
    }

    /// Send `payload` as a two-way request with the endpoint's default timeout.
    ///
    /// # Errors
    ///
    /// See [`ExchangeChannel::request_with_timeout`].
    pub fn request(&self, payload: impl Into<Payload>) -> ExchangeResult<ResponseFuture> {
        let transport = self.open_transport("request")?;
        let timeout = ExchangeConfig::from_url(&transport.url()).timeout;
        self.dispatch(&*transport, payload.into(), timeout)
    }

    /// Send `payload` as a two-way request and return a handle on its response.
    ///
    /// The pending future is registered before the transport sees the request.
    /// This call does not wait for the response.
    ///
    /// # Errors
    ///
    /// Returns `ExchangeError::ChannelClosed` after close. A transport failure
    /// cancels the just-registered future and is returned as-is.
    pub fn request_with_timeout(
        &self,
        payload: impl Into<Payload>,
        timeout: Duration,
    ) -> ExchangeResult<ResponseFuture> {
        let transport = self.open_transport("request")?;
        self.dispatch(&*transport, payload.into(), timeout)
    }

    fn dispatch(
        &self,
        transport: &dyn TransportChannel,
        payload: Payload,
        timeout: Duration,
    ) -> ExchangeResult<ResponseFuture> {
        let request = Request::two_way(payload);
        let request_id = request.id();
        let future = self.registry.create(self.id, request_id, timeout)?;
        let sent = ExchangeConfig::from_url(&transport.url()).sent;
        if let Err(err) = transport.send(Message::Request(request), sent) {
            tracing::debug!(channel = %self, request_id, error = %err, "request send failed");
            self.registry.cancel(request_id, &err.to_string());
            return Err(err);
        }
        Ok(future)
    }

    /// Whether this channel has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close the transport immediately. Failures are logged, never returned.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let Some(channel) = self.channel.upgrade() else {
            return;
        };
        if let Err(err) = channel.close() {
            tracing::warn!(channel = %self, error = %err, "failed to close transport channel");
        }
    }

    /// Reject new sends now, wait up to `timeout` for pending requests on
    /// this channel to complete, then close the transport.
    ///
    /// Pending requests are not cancelled; they finish through a response or
    /// the registry's timeout sweep.
    pub fn close_gracefully(&self, timeout: Duration) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if !timeout.is_zero() && !self.registry.wait_drained(self.id, timeout) {
            tracing::debug!(channel = %self, ?timeout, "closing with requests still pending");
        }
        self.close();
    }

    /// Endpoint descriptor of the transport.
    pub fn url(&self) -> Option<EndpointUrl> {
        self.channel.upgrade().map(|channel| channel.url())
    }

    /// Local address of the transport.
    pub fn local_address(&self) -> Option<HostAddress> {
        self.channel
            .upgrade()
            .and_then(|channel| channel.local_address())
    }

    /// Remote address of the transport.
    pub fn remote_address(&self) -> Option<HostAddress> {
        self.channel
            .upgrade()
            .and_then(|channel| channel.remote_address())
    }

    /// Whether the transport is connected.
    pub fn is_connected(&self) -> bool {
        self.channel
            .upgrade()
            .is_some_and(|channel| channel.is_connected())
    }

    /// Attribute stored on the transport.
    pub fn attribute(&self, key: &str) -> Option<Attribute> {
        self.channel
            .upgrade()
            .and_then(|channel| channel.attribute(key))
    }

    /// Store an attribute on the transport.
    pub fn set_attribute(&self, key: &str, value: Attribute) {
        if let Some(channel) = self.channel.upgrade() {
            channel.set_attribute(key, value);
        }
    }

    /// Remove an attribute from the transport.
    pub fn remove_attribute(&self, key: &str) {
        if let Some(channel) = self.channel.upgrade() {
            channel.remove_attribute(key);
        }
    }

    /// Whether the transport has an attribute under `key`.
    pub fn has_attribute(&self, key: &str) -> bool {
        self.channel
            .upgrade()
            .is_some_and(|channel| channel.has_attribute(key))
    }

    fn open_transport(&self, operation: &str) -> ExchangeResult<Arc<dyn TransportChannel>> {
        if self.is_closed() {
            tracing::debug!(channel = %self, operation, "rejected on closed channel");
            return Err(self.closed_error());
        }
        self.channel.upgrade().ok_or_else(|| self.closed_error())
    }

    fn closed_error(&self) -> ExchangeError {
        ExchangeError::ChannelClosed {
            channel: self.name.clone(),
        }
    }
}

impl PartialEq for ExchangeChannel {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ExchangeChannel {}

impl Hash for ExchangeChannel {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for ExchangeChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl fmt::Debug for ExchangeChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExchangeChannel")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("closed", &self.is_closed())
            .finish()
    }
}
