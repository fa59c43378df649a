//! Opaque payloads and the closed set of messages a channel carries.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::request::Request;
use super::response::Response;
use crate::codec::{ObjectInput, ObjectOutput, Serialization};
use crate::config::EndpointUrl;
use crate::error::ExchangeResult;

/// Opaque payload bytes produced by a [`Serialization`].
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Payload(Vec<u8>);

impl Payload {
    /// An empty payload.
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Serialize `value` with the given serialization.
    pub fn encode<S, T>(serialization: &S, url: &EndpointUrl, value: &T) -> ExchangeResult<Self>
    where
        S: Serialization,
        T: Serialize + ?Sized,
    {
        let mut bytes = Vec::new();
        let mut output = serialization.serialize(url, &mut bytes);
        output.write_object(value)?;
        output.flush_buffer()?;
        drop(output);
        Ok(Self(bytes))
    }

    /// Deserialize the payload with the given serialization.
    pub fn decode<S, T>(&self, serialization: &S, url: &EndpointUrl) -> ExchangeResult<T>
    where
        S: Serialization,
        T: DeserializeOwned,
    {
        serialization.deserialize(url, self.0.as_slice()).read_object()
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consume the payload, returning its bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Payload({} bytes)", self.0.len())
    }
}

/// Everything an exchange channel can hand to a transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// A framed request.
    Request(Request),
    /// A framed response.
    Response(Response),
    /// A raw text line, forwarded unframed.
    Text(String),
    /// An unframed payload; wrapped in a one-way request before sending.
    Payload(Payload),
}

impl Message {
    /// Whether the message is already an envelope or raw text, i.e. is
    /// forwarded to the transport unchanged.
    pub fn is_framed(&self) -> bool {
        !matches!(self, Message::Payload(_))
    }

    /// Wrap unframed payloads in a one-way request; leave the rest unchanged.
    pub fn into_framed(self) -> Message {
        match self {
            Message::Payload(payload) => Message::Request(Request::one_way(payload)),
            framed => framed,
        }
    }
}

impl From<Request> for Message {
    fn from(request: Request) -> Self {
        Message::Request(request)
    }
}

impl From<Response> for Message {
    fn from(response: Response) -> Self {
        Message::Response(response)
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Message::Text(text)
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Message::Text(text.to_string())
    }
}

impl From<Payload> for Message {
    fn from(payload: Payload) -> Self {
        Message::Payload(payload)
    }
}
