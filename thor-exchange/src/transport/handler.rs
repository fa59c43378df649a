//! Receive-path callbacks and client-side transport traits.

use std::sync::Arc;

use crate::config::EndpointUrl;
use crate::envelope::Message;
use crate::error::{ExchangeError, ExchangeResult};

use super::channel::TransportChannel;

/// Callback a transport drives from its I/O threads.
///
/// Implementations must not block: a slow handler stalls the receive path.
pub trait ChannelHandler: Send + Sync {
    /// The channel finished connecting.
    fn connected(&self, channel: &Arc<dyn TransportChannel>) -> ExchangeResult<()>;

    /// The channel disconnected.
    fn disconnected(&self, channel: &Arc<dyn TransportChannel>) -> ExchangeResult<()>;

    /// `message` left the local send buffer.
    fn sent(&self, channel: &Arc<dyn TransportChannel>, message: &Message) -> ExchangeResult<()>;

    /// A complete message was decoded from the channel.
    fn received(&self, channel: &Arc<dyn TransportChannel>, message: Message) -> ExchangeResult<()>;

    /// The transport or a previous callback failed.
    fn caught(&self, channel: &Arc<dyn TransportChannel>, error: &ExchangeError);
}

/// Client side of a transport connection.
pub trait TransportClient: TransportChannel {
    /// Drop the current connection and connect again.
    ///
    /// # Errors
    ///
    /// Returns `ExchangeError::Transport` if the new connection cannot be established.
    fn reconnect(&self) -> ExchangeResult<()>;

    /// Rebind the client to a new endpoint descriptor.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport rejects the new descriptor.
    fn reset(&self, url: &EndpointUrl) -> ExchangeResult<()>;

    /// View this client as a plain channel.
    fn as_channel(self: Arc<Self>) -> Arc<dyn TransportChannel>;
}

/// Opens client connections.
pub trait Transporter: Send + Sync {
    /// Connect to `url`, delivering receive-path events to `handler`.
    ///
    /// # Errors
    ///
    /// Returns `ExchangeError::Transport` if the connection cannot be established.
    fn connect(
        &self,
        url: &EndpointUrl,
        handler: Arc<dyn ChannelHandler>,
    ) -> ExchangeResult<Arc<dyn TransportClient>>;
}
