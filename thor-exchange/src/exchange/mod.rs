//! Exchange layer: request/response semantics over a transport channel.
//!
//! - [`ExchangeChannel`]: frames sends and registers pending requests for one channel
//! - [`HeaderExchangeHandler`]: receive-path dispatch into the future registry
//! - [`HeaderExchangeClient`]: a connected client built on a transport client
//! - [`LazyConnectExchangeClient`]: defers the physical connect to first use

mod channel;
mod client;
mod handler;
mod lazy;

pub use channel::ExchangeChannel;
pub use client::{ExchangeClient, Exchanger, HeaderExchangeClient, HeaderExchanger};
pub use handler::{ExchangeHandler, HeaderExchangeHandler};
pub use lazy::{LazyConnectExchangeClient, UNCONNECTED_LOCAL_ADDRESS};
