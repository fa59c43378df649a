//! Envelope model: requests, responses, and the message variants a channel carries.
//!
//! Every value handed to a transport is a [`Message`]. Its variant is fixed
//! when the message is built, so the exchange channel never has to inspect
//! payload shapes at send time.

mod message;
mod request;
mod response;

pub use message::{Message, Payload};
pub use request::{next_request_id, Request, PROTOCOL_VERSION};
pub use response::{Response, Status};
