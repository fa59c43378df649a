//! Endpoint descriptors and typed configuration.
//!
//! An [`EndpointUrl`] is the immutable, parameter-carrying descriptor attached
//! to a target endpoint. The exchange layer only reads it; "changing" a
//! parameter produces a new descriptor.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Recognized endpoint parameter names.
pub mod keys {
    /// Default request timeout in milliseconds.
    pub const TIMEOUT: &str = "timeout";
    /// Default write-confirmation mode for one-way sends.
    pub const SENT: &str = "sent";
    /// Connectivity reported by a lazy client before its first connect.
    pub const LAZY_CONNECT_INITIAL_STATE: &str = "lazy-connect-initial-state";
    /// Enables the sampled lazy-use diagnostic.
    pub const REQUEST_WITH_WARNING: &str = "request-with-warning";
    /// Lets the transport reconnect when sending on a channel that is not connected.
    pub const SEND_RECONNECT: &str = "send-reconnect";
    /// Name of the payload serialization.
    pub const SERIALIZATION: &str = "serialization";
}

/// Default request timeout.
pub const DEFAULT_TIMEOUT_MS: u64 = 1000;

/// Default connectivity reported by a lazy client before it connects.
pub const DEFAULT_LAZY_CONNECT_INITIAL_STATE: bool = true;

/// Default serialization name.
pub const DEFAULT_SERIALIZATION: &str = "json";

/// Unresolved `host:port` address.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostAddress {
    host: String,
    port: u16,
}

impl HostAddress {
    /// Create an address without resolving the host.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Host name or literal IP.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port number.
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl From<std::net::SocketAddr> for HostAddress {
    fn from(addr: std::net::SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}

impl fmt::Display for HostAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Immutable endpoint descriptor carrying string parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointUrl {
    protocol: String,
    host: String,
    port: u16,
    path: String,
    parameters: BTreeMap<String, String>,
}

impl EndpointUrl {
    /// Create a descriptor with no parameters.
    pub fn new(protocol: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            protocol: protocol.into(),
            host: host.into(),
            port,
            path: String::new(),
            parameters: BTreeMap::new(),
        }
    }

    /// Return a copy with the given service path.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Return a copy with `key` set to `value`, replacing any previous value.
    pub fn with_parameter(&self, key: &str, value: impl ToString) -> Self {
        let mut url = self.clone();
        url.parameters.insert(key.to_string(), value.to_string());
        url
    }

    /// Protocol name.
    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    /// Host name.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port number.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Service path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Unresolved address of the endpoint.
    pub fn address(&self) -> HostAddress {
        HostAddress::new(self.host.clone(), self.port)
    }

    /// Raw parameter value.
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }

    /// Boolean parameter; unparsable values fall back to `default`.
    pub fn bool_parameter(&self, key: &str, default: bool) -> bool {
        match self.parameter(key) {
            Some(value) => value.trim().parse().unwrap_or(default),
            None => default,
        }
    }

    /// Positive integer parameter; zero, negative, or unparsable values fall
    /// back to `default`.
    pub fn positive_u64_parameter(&self, key: &str, default: u64) -> u64 {
        match self.parameter(key).and_then(|v| v.trim().parse::<u64>().ok()) {
            Some(value) if value > 0 => value,
            _ => default,
        }
    }

    /// Iterate over all parameters in key order.
    pub fn parameters(&self) -> impl Iterator<Item = (&str, &str)> {
        self.parameters
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for EndpointUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.protocol, self.host, self.port)?;
        if !self.path.is_empty() {
            write!(f, "/{}", self.path.trim_start_matches('/'))?;
        }
        let mut separator = '?';
        for (key, value) in &self.parameters {
            write!(f, "{separator}{key}={value}")?;
            separator = '&';
        }
        Ok(())
    }
}

/// Typed snapshot of the exchange parameters carried by an [`EndpointUrl`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExchangeConfig {
    /// Timeout applied when a request does not specify one.
    pub timeout: Duration,

    /// Whether one-way sends wait for the transport to confirm the write.
    pub sent: bool,

    /// Connectivity a lazy client reports before its first connect.
    pub lazy_connect_initial_state: bool,

    /// Whether lazy clients emit the sampled misuse diagnostic.
    pub request_with_warning: bool,

    /// Whether the transport may reconnect on send.
    pub send_reconnect: bool,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            sent: false,
            lazy_connect_initial_state: DEFAULT_LAZY_CONNECT_INITIAL_STATE,
            request_with_warning: false,
            send_reconnect: false,
        }
    }
}

impl ExchangeConfig {
    /// Read the recognized parameters from `url`, applying defaults.
    pub fn from_url(url: &EndpointUrl) -> Self {
        Self {
            timeout: Duration::from_millis(
                url.positive_u64_parameter(keys::TIMEOUT, DEFAULT_TIMEOUT_MS),
            ),
            sent: url.bool_parameter(keys::SENT, false),
            lazy_connect_initial_state: url.bool_parameter(
                keys::LAZY_CONNECT_INITIAL_STATE,
                DEFAULT_LAZY_CONNECT_INITIAL_STATE,
            ),
            request_with_warning: url.bool_parameter(keys::REQUEST_WITH_WARNING, false),
            send_reconnect: url.bool_parameter(keys::SEND_RECONNECT, false),
        }
    }
}

/// Configuration for a [`FutureRegistry`](crate::FutureRegistry).
#[derive(Clone, Debug)]
pub struct RegistryConfig {
    /// Interval between timeout sweeps.
    pub sweep_interval: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_millis(30),
        }
    }
}

impl RegistryConfig {
    /// Create a configuration with a custom sweep interval.
    pub fn with_sweep_interval(sweep_interval: Duration) -> Self {
        Self { sweep_interval }
    }
}
