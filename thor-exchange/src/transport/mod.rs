//! Transport collaborator interfaces.
//!
//! The exchange layer does not own sockets, framing, or byte-level I/O. It
//! consumes a transport through these narrow traits:
//!
//! - [`TransportChannel`]: one message-oriented connection
//! - [`TransportClient`]: a client-side channel that can reconnect
//! - [`Transporter`]: opens client channels for an endpoint
//! - [`ChannelHandler`]: the receive-path callback a transport drives

mod channel;
mod handler;

pub use channel::{Attribute, AttributeStore, ChannelId, TransportChannel};
pub use handler::{ChannelHandler, TransportClient, Transporter};
