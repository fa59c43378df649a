//! Exchange clients and the exchanger that builds them.

use std::sync::Arc;
use std::time::Duration;

use super::channel::ExchangeChannel;
use super::handler::{ExchangeHandler, HeaderExchangeHandler};
use crate::config::{EndpointUrl, HostAddress};
use crate::envelope::{Message, Payload};
use crate::error::ExchangeResult;
use crate::future::{FutureRegistry, ResponseFuture};
use crate::transport::{Attribute, ChannelHandler, TransportClient, Transporter};

/// Client side of an exchange endpoint.
pub trait ExchangeClient: Send + Sync {
    /// Endpoint descriptor of the client.
    fn url(&self) -> EndpointUrl;

    /// Send a two-way request with the endpoint's default timeout.
    ///
    /// # Errors
    ///
    /// Returns the connect, closed-channel, or transport failure.
    fn request(&self, payload: Payload) -> ExchangeResult<ResponseFuture>;

    /// Send a two-way request with an explicit timeout.
    ///
    /// # Errors
    ///
    /// Returns the connect, closed-channel, or transport failure.
    fn request_with_timeout(&self, payload: Payload, timeout: Duration) -> ExchangeResult<ResponseFuture>;

    /// Send a one-way message.
    ///
    /// # Errors
    ///
    /// Returns the connect, closed-channel, or transport failure.
    fn send(&self, message: Message) -> ExchangeResult<()>;

    /// Send a one-way message, optionally waiting for write confirmation.
    ///
    /// # Errors
    ///
    /// Returns the connect, closed-channel, or transport failure.
    fn send_with(&self, message: Message, sent: bool) -> ExchangeResult<()>;

    /// Application handler requests are dispatched to.
    fn exchange_handler(&self) -> Arc<dyn ExchangeHandler>;

    /// Transport-level handler of the underlying connection.
    ///
    /// # Errors
    ///
    /// Returns `ExchangeError::InvalidState` if there is no connection yet.
    fn channel_handler(&self) -> ExchangeResult<Arc<dyn ChannelHandler>>;

    /// Local address of the connection.
    fn local_address(&self) -> Option<HostAddress>;

    /// Remote address of the connection.
    fn remote_address(&self) -> Option<HostAddress>;

    /// Whether the client reports itself connected.
    fn is_connected(&self) -> bool;

    /// Whether the client is closed.
    fn is_closed(&self) -> bool;

    /// Close immediately.
    fn close(&self);

    /// Stop accepting sends, wait up to `timeout` for pending requests, then close.
    fn close_gracefully(&self, timeout: Duration);

    /// Rebind the connection to a new endpoint descriptor.
    ///
    /// # Errors
    ///
    /// Returns the transport failure, or `InvalidState` without a connection.
    fn reset(&self, url: &EndpointUrl) -> ExchangeResult<()>;

    /// Re-establish the connection.
    ///
    /// # Errors
    ///
    /// Returns the transport failure, or `InvalidState` without a connection.
    fn reconnect(&self) -> ExchangeResult<()>;

    /// Attribute stored on the connection.
    fn attribute(&self, key: &str) -> Option<Attribute>;

    /// Store an attribute on the connection.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` without a connection.
    fn set_attribute(&self, key: &str, value: Attribute) -> ExchangeResult<()>;

    /// Remove an attribute from the connection.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` without a connection.
    fn remove_attribute(&self, key: &str) -> ExchangeResult<()>;

    /// Whether the connection has an attribute under `key`.
    fn has_attribute(&self, key: &str) -> bool;
}

/// Exchange client over an established transport client.
pub struct HeaderExchangeClient {
    client: Arc<dyn TransportClient>,
    channel: Arc<ExchangeChannel>,
    handler: Arc<HeaderExchangeHandler>,
}

impl HeaderExchangeClient {
    /// Wrap `client`, whose inbound traffic is dispatched by `handler`.
    pub fn new(client: Arc<dyn TransportClient>, handler: Arc<HeaderExchangeHandler>) -> Self {
        let transport = client.clone().as_channel();
        let channel = ExchangeChannel::get_or_create(&transport, handler.registry());
        Self {
            client,
            channel,
            handler,
        }
    }

    /// The exchange channel requests are sent on.
    pub fn channel(&self) -> &Arc<ExchangeChannel> {
        &self.channel
    }
}

impl ExchangeClient for HeaderExchangeClient {
    fn url(&self) -> EndpointUrl {
        self.client.url()
    }

    fn request(&self, payload: Payload) -> ExchangeResult<ResponseFuture> {
        self.channel.request(payload)
    }

    fn request_with_timeout(&self, payload: Payload, timeout: Duration) -> ExchangeResult<ResponseFuture> {
        self.channel.request_with_timeout(payload, timeout)
    }

    fn send(&self, message: Message) -> ExchangeResult<()> {
        self.channel.send(message)
    }

    fn send_with(&self, message: Message, sent: bool) -> ExchangeResult<()> {
        self.channel.send_with(message, sent)
    }

    fn exchange_handler(&self) -> Arc<dyn ExchangeHandler> {
        self.handler.handler().clone()
    }

    fn channel_handler(&self) -> ExchangeResult<Arc<dyn ChannelHandler>> {
        Ok(self.handler.clone())
    }

    fn local_address(&self) -> Option<HostAddress> {
        self.client.local_address()
    }

    fn remote_address(&self) -> Option<HostAddress> {
        self.client.remote_address()
    }

    fn is_connected(&self) -> bool {
        self.client.is_connected()
    }

    fn is_closed(&self) -> bool {
        self.channel.is_closed() || self.client.is_closed()
    }

    fn close(&self) {
        self.channel.close();
    }

    fn close_gracefully(&self, timeout: Duration) {
        self.channel.close_gracefully(timeout);
    }

    fn reset(&self, url: &EndpointUrl) -> ExchangeResult<()> {
        self.client.reset(url)
    }

    fn reconnect(&self) -> ExchangeResult<()> {
        self.client.reconnect()
    }

    fn attribute(&self, key: &str) -> Option<Attribute> {
        self.client.attribute(key)
    }

    fn set_attribute(&self, key: &str, value: Attribute) -> ExchangeResult<()> {
        self.client.set_attribute(key, value);
        Ok(())
    }

    fn remove_attribute(&self, key: &str) -> ExchangeResult<()> {
        self.client.remove_attribute(key);
        Ok(())
    }

    fn has_attribute(&self, key: &str) -> bool {
        self.client.has_attribute(key)
    }
}

/// Builds connected exchange clients.
pub trait Exchanger: Send + Sync {
    /// Connect to `url`, dispatching inbound requests to `handler`.
    ///
    /// # Errors
    ///
    /// Returns the transport's connect failure.
    fn connect(
        &self,
        url: &EndpointUrl,
        handler: Arc<dyn ExchangeHandler>,
    ) -> ExchangeResult<Arc<dyn ExchangeClient>>;
}

/// Exchanger producing [`HeaderExchangeClient`]s over a [`Transporter`].
pub struct HeaderExchanger {
    transporter: Arc<dyn Transporter>,
    registry: FutureRegistry,
}

impl HeaderExchanger {
    /// Create an exchanger whose clients share `registry`.
    pub fn new(transporter: Arc<dyn Transporter>, registry: FutureRegistry) -> Self {
        Self {
            transporter,
            registry,
        }
    }

    /// Registry shared by every client this exchanger builds.
    pub fn registry(&self) -> &FutureRegistry {
        &self.registry
    }
}

impl Exchanger for HeaderExchanger {
    fn connect(
        &self,
        url: &EndpointUrl,
        handler: Arc<dyn ExchangeHandler>,
    ) -> ExchangeResult<Arc<dyn ExchangeClient>> {
        let channel_handler = Arc::new(HeaderExchangeHandler::new(handler, self.registry.clone()));
        let client = self.transporter.connect(url, channel_handler.clone())?;
        tracing::debug!(%url, channel = %client, "exchange client connected");
        Ok(Arc::new(HeaderExchangeClient::new(client, channel_handler)))
    }
}
