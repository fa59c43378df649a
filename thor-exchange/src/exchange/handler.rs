//! Receive-side dispatch between the transport and application handlers.

use std::sync::Arc;

use super::channel::ExchangeChannel;
use crate::envelope::{Message, Payload, Request, Response, Status};
use crate::error::{ExchangeError, ExchangeResult};
use crate::future::FutureRegistry;
use crate::transport::{ChannelHandler, TransportChannel};

/// Application-level handler for an exchange endpoint.
pub trait ExchangeHandler: Send + Sync {
    /// Produce the reply payload for a two-way request.
    ///
    /// # Errors
    ///
    /// An error is sent back to the peer as a `ServiceError` response.
    fn reply(&self, channel: &ExchangeChannel, request: Payload) -> ExchangeResult<Payload>;

    /// Handle a one-way payload or raw text.
    fn received(&self, channel: &ExchangeChannel, message: Message) -> ExchangeResult<()> {
        let _ = (channel, message);
        Ok(())
    }

    /// The channel was connected.
    fn connected(&self, channel: &ExchangeChannel) -> ExchangeResult<()> {
        let _ = channel;
        Ok(())
    }

    /// The channel was disconnected.
    fn disconnected(&self, channel: &ExchangeChannel) -> ExchangeResult<()> {
        let _ = channel;
        Ok(())
    }
}

/// Channel handler that routes responses into a [`FutureRegistry`] and
/// requests into an [`ExchangeHandler`].
pub struct HeaderExchangeHandler {
    handler: Arc<dyn ExchangeHandler>,
    registry: FutureRegistry,
}

impl HeaderExchangeHandler {
    /// Create a handler dispatching into `handler` and completing futures in `registry`.
    pub fn new(handler: Arc<dyn ExchangeHandler>, registry: FutureRegistry) -> Self {
        Self { handler, registry }
    }

    /// The wrapped application handler.
    pub fn handler(&self) -> &Arc<dyn ExchangeHandler> {
        &self.handler
    }

    /// Registry responses are delivered into.
    pub fn registry(&self) -> &FutureRegistry {
        &self.registry
    }

    fn handle_request(&self, exchange: &ExchangeChannel, request: Request) -> Response {
        let id = request.id();
        match self.handler.reply(exchange, request.into_data()) {
            Ok(result) => Response::ok(id, result),
            Err(err) => {
                tracing::warn!(channel = %exchange, request_id = id, error = %err, "reply failed");
                Response::error(id, Status::ServiceError, err.to_string())
            }
        }
    }
}

impl ChannelHandler for HeaderExchangeHandler {
    fn connected(&self, channel: &Arc<dyn TransportChannel>) -> ExchangeResult<()> {
        let exchange = ExchangeChannel::get_or_create(channel, &self.registry);
        self.handler.connected(&exchange)
    }

    fn disconnected(&self, channel: &Arc<dyn TransportChannel>) -> ExchangeResult<()> {
        let exchange = ExchangeChannel::get_or_create(channel, &self.registry);
        let result = self.handler.disconnected(&exchange);
        ExchangeChannel::remove_if_disconnected(channel);
        result
    }

    fn sent(&self, _channel: &Arc<dyn TransportChannel>, message: &Message) -> ExchangeResult<()> {
        if let Message::Request(request) = message {
            if request.is_two_way() {
                self.registry.mark_sent(request.id());
            }
        }
        Ok(())
    }

    fn received(&self, channel: &Arc<dyn TransportChannel>, message: Message) -> ExchangeResult<()> {
        match message {
            Message::Response(response) if response.is_event() => {
                tracing::trace!(channel = %channel, request_id = response.id(), "heartbeat response");
                Ok(())
            }
            Message::Response(response) => {
                self.registry.received(response);
                Ok(())
            }
            Message::Request(request) if request.is_event() => {
                if request.is_two_way() {
                    channel.send(Message::Response(Response::heartbeat(request.id())), false)?;
                }
                Ok(())
            }
            Message::Request(request) if request.is_two_way() => {
                let exchange = ExchangeChannel::get_or_create(channel, &self.registry);
                let response = self.handle_request(&exchange, request);
                // Replies bypass the wrapper so a gracefully closing channel
                // still answers what it already accepted.
                channel.send(Message::Response(response), false)
            }
            Message::Request(request) => {
                let exchange = ExchangeChannel::get_or_create(channel, &self.registry);
                self.handler
                    .received(&exchange, Message::Payload(request.into_data()))
            }
            other => {
                let exchange = ExchangeChannel::get_or_create(channel, &self.registry);
                self.handler.received(&exchange, other)
            }
        }
    }

    fn caught(&self, channel: &Arc<dyn TransportChannel>, error: &ExchangeError) {
        tracing::error!(channel = %channel, error = %error, "transport error");
    }
}
