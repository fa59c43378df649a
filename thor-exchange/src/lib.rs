//! # Thor Exchange
//!
//! Request/response exchange layer for the thor RPC stack.
//!
//! This crate sits between a message-oriented transport and the RPC
//! invocation layer:
//! - **Envelopes**: framed requests, responses, and the messages a channel carries
//! - **Future registry**: correlates responses with pending requests and sweeps timeouts
//! - **Exchange channels**: request/response semantics over one transport channel
//! - **Clients**: eager and lazily connecting exchange clients
//! - **Codec**: the JSON object serialization used for payloads
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  ExchangeClient / LazyConnectExchangeClient  │
//! ├──────────────────────────────────────────────┤
//! │  ExchangeChannel ──► FutureRegistry          │
//! │  HeaderExchangeHandler ──┘                   │
//! ├──────────────────────────────────────────────┤
//! │  TransportChannel / Transporter (external)   │
//! └──────────────────────────────────────────────┘
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

// =============================================================================
// Modules
// =============================================================================

/// Payload serialization.
pub mod codec;

/// Endpoint descriptors and exchange configuration.
pub mod config;

/// Request/response envelopes.
pub mod envelope;

/// Error types for exchange operations.
pub mod error;

/// Exchange channels, handlers, and clients.
pub mod exchange;

/// Pending-request correlation and timeouts.
pub mod future;

/// Transport collaborator interfaces.
pub mod transport;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use codec::{JsonSerialization, ObjectInput, ObjectOutput, Serialization, serialization_for};
pub use config::{EndpointUrl, ExchangeConfig, HostAddress, RegistryConfig};
pub use envelope::{Message, Payload, Request, Response, Status};
pub use error::{ExchangeError, ExchangeResult};
pub use exchange::{
    ExchangeChannel, ExchangeClient, ExchangeHandler, Exchanger, HeaderExchangeClient,
    HeaderExchangeHandler, HeaderExchanger, LazyConnectExchangeClient,
};
pub use future::{FutureRegistry, ResponseFuture, ResponseResult, SweeperHandle};
pub use transport::{
    Attribute, AttributeStore, ChannelHandler, ChannelId, TransportChannel, TransportClient,
    Transporter,
};
