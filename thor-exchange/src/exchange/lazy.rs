//! Exchange client that connects on first use.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::Mutex;

use super::client::{ExchangeClient, Exchanger};
use super::handler::ExchangeHandler;
use crate::config::{keys, EndpointUrl, ExchangeConfig, HostAddress};
use crate::envelope::{Message, Payload};
use crate::error::{ExchangeError, ExchangeResult};
use crate::future::ResponseFuture;
use crate::transport::{Attribute, ChannelHandler};

/// Lazy use is logged once every this many requests or sends.
const WARNING_PERIOD: u64 = 5000;

/// Local address reported before the first connect.
///
/// Loopback with port 0 stands in for "this host, no port bound yet". The
/// machine's host name is deliberately not resolved: a status query must not
/// block on DNS.
pub const UNCONNECTED_LOCAL_ADDRESS: (&str, u16) = ("127.0.0.1", 0);

/// Exchange client that defers connecting until the first request or send.
///
/// Until then, status queries answer from configuration: `is_connected`
/// reports the `lazy-connect-initial-state` parameter, `is_closed` reports
/// `true`, the remote address comes from the endpoint descriptor, and the
/// local address is a placeholder (see [`UNCONNECTED_LOCAL_ADDRESS`]). Operations
/// that need the live connection fail with `ExchangeError::InvalidState`.
/// Reading attributes never fails and simply finds nothing.
pub struct LazyConnectExchangeClient {
    url: EndpointUrl,
    handler: Arc<dyn ExchangeHandler>,
    exchanger: Arc<dyn Exchanger>,
    client: OnceLock<Arc<dyn ExchangeClient>>,
    connect_lock: Mutex<()>,
    initial_state: bool,
    request_with_warning: bool,
    lazy_calls: AtomicU64,
}

impl LazyConnectExchangeClient {
    /// Create a client for `url` that connects through `exchanger` on first use.
    ///
    /// The stored descriptor always carries `send-reconnect=true`.
    pub fn new(
        url: &EndpointUrl,
        handler: Arc<dyn ExchangeHandler>,
        exchanger: Arc<dyn Exchanger>,
    ) -> Self {
        let url = url.with_parameter(keys::SEND_RECONNECT, true);
        let config = ExchangeConfig::from_url(&url);
        Self {
            url,
            handler,
            exchanger,
            client: OnceLock::new(),
            connect_lock: Mutex::new(()),
            initial_state: config.lazy_connect_initial_state,
            request_with_warning: config.request_with_warning,
            lazy_calls: AtomicU64::new(0),
        }
    }

    /// Whether the underlying connection has been established.
    pub fn is_initialized(&self) -> bool {
        self.client.get().is_some()
    }

    /// Return the connected client, connecting on the first call.
    ///
    /// Concurrent first callers connect exactly once; a failed connect leaves
    /// the client uninitialized so a later call retries.
    fn init_client(&self) -> ExchangeResult<&Arc<dyn ExchangeClient>> {
        if let Some(client) = self.client.get() {
            return Ok(client);
        }
        let _guard = self.connect_lock.lock();
        if let Some(client) = self.client.get() {
            return Ok(client);
        }
        tracing::info!(url = %self.url, "lazy connecting");
        let connected = self.exchanger.connect(&self.url, self.handler.clone())?;
        Ok(self.client.get_or_init(|| connected))
    }

    fn check_client(&self, operation: &str) -> ExchangeResult<&Arc<dyn ExchangeClient>> {
        self.client.get().ok_or_else(|| {
            ExchangeError::invalid_state(format!(
                "lazy client for {} has not connected yet; {operation} needs a live connection",
                self.url
            ))
        })
    }

    /// Count one request or send and log every `WARNING_PERIOD`th.
    ///
    /// Returns whether this call logged.
    fn note_lazy_use(&self) -> bool {
        if !self.request_with_warning {
            return false;
        }
        let calls = self.lazy_calls.fetch_add(1, Ordering::Relaxed) + 1;
        if calls % WARNING_PERIOD != 0 {
            return false;
        }
        tracing::warn!(
            url = %self.url,
            calls,
            "lazy client used on a hot path; it is meant for rarely used endpoints"
        );
        true
    }
}

impl ExchangeClient for LazyConnectExchangeClient {
    fn url(&self) -> EndpointUrl {
        self.url.clone()
    }

    fn request(&self, payload: Payload) -> ExchangeResult<ResponseFuture> {
        self.note_lazy_use();
        self.init_client()?.request(payload)
    }

    fn request_with_timeout(&self, payload: Payload, timeout: Duration) -> ExchangeResult<ResponseFuture> {
        self.note_lazy_use();
        self.init_client()?.request_with_timeout(payload, timeout)
    }

    fn send(&self, message: Message) -> ExchangeResult<()> {
        self.note_lazy_use();
        self.init_client()?.send(message)
    }

    fn send_with(&self, message: Message, sent: bool) -> ExchangeResult<()> {
        self.note_lazy_use();
        self.init_client()?.send_with(message, sent)
    }

    fn exchange_handler(&self) -> Arc<dyn ExchangeHandler> {
        self.handler.clone()
    }

    fn channel_handler(&self) -> ExchangeResult<Arc<dyn ChannelHandler>> {
        self.check_client("channel_handler")?.channel_handler()
    }

    fn local_address(&self) -> Option<HostAddress> {
        match self.client.get() {
            Some(client) => client.local_address(),
            None => {
                let (host, port) = UNCONNECTED_LOCAL_ADDRESS;
                Some(HostAddress::new(host, port))
            }
        }
    }

    fn remote_address(&self) -> Option<HostAddress> {
        match self.client.get() {
            Some(client) => client.remote_address(),
            None => Some(self.url.address()),
        }
    }

    fn is_connected(&self) -> bool {
        match self.client.get() {
            Some(client) => client.is_connected(),
            None => self.initial_state,
        }
    }

    fn is_closed(&self) -> bool {
        self.client.get().map_or(true, |client| client.is_closed())
    }

    fn close(&self) {
        if let Some(client) = self.client.get() {
            client.close();
        }
    }

    fn close_gracefully(&self, timeout: Duration) {
        if let Some(client) = self.client.get() {
            client.close_gracefully(timeout);
        }
    }

    fn reset(&self, url: &EndpointUrl) -> ExchangeResult<()> {
        self.check_client("reset")?.reset(url)
    }

    fn reconnect(&self) -> ExchangeResult<()> {
        self.check_client("reconnect")?.reconnect()
    }

    fn attribute(&self, key: &str) -> Option<Attribute> {
        self.client.get().and_then(|client| client.attribute(key))
    }

    fn set_attribute(&self, key: &str, value: Attribute) -> ExchangeResult<()> {
        self.check_client("set_attribute")?.set_attribute(key, value)
    }

    fn remove_attribute(&self, key: &str) -> ExchangeResult<()> {
        self.check_client("remove_attribute")?.remove_attribute(key)
    }

    fn has_attribute(&self, key: &str) -> bool {
        self.client
            .get()
            .is_some_and(|client| client.has_attribute(key))
    }
}
