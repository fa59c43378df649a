//! Pluggable payload serialization.
//!
//! The exchange layer treats payloads as opaque bytes. A [`Serialization`] is
//! selected per endpoint (see [`keys::SERIALIZATION`]) and identified on the
//! wire by its content type id; the layer never inspects what it produces.
//!
//! [`keys::SERIALIZATION`]: crate::config::keys::SERIALIZATION

use std::io::{Read, Write};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::{keys, EndpointUrl, DEFAULT_SERIALIZATION};
use crate::error::{ExchangeError, ExchangeResult};

/// Writer half of a serialization.
pub trait ObjectOutput {
    /// Serialize one value to the underlying stream.
    fn write_object<T: Serialize + ?Sized>(&mut self, value: &T) -> ExchangeResult<()>;

    /// Flush buffered output to the underlying stream.
    fn flush_buffer(&mut self) -> ExchangeResult<()>;
}

/// Reader half of a serialization.
pub trait ObjectInput {
    /// Deserialize the next value from the underlying stream.
    fn read_object<T: DeserializeOwned>(&mut self) -> ExchangeResult<T>;
}

/// A payload serialization format.
pub trait Serialization {
    /// Writer produced by [`Serialization::serialize`].
    type Output<W: Write>: ObjectOutput;

    /// Reader produced by [`Serialization::deserialize`].
    type Input<R: Read>: ObjectInput;

    /// Identifier carried in the envelope header.
    fn content_type_id(&self) -> u8;

    /// MIME-style content type.
    fn content_type(&self) -> &'static str;

    /// Wrap `output` in a writer for this format.
    fn serialize<W: Write>(&self, url: &EndpointUrl, output: W) -> Self::Output<W>;

    /// Wrap `input` in a reader for this format.
    fn deserialize<R: Read>(&self, url: &EndpointUrl, input: R) -> Self::Input<R>;
}

/// Newline-delimited JSON serialization.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonSerialization;

impl JsonSerialization {
    /// Content type id of the JSON serialization.
    pub const CONTENT_TYPE_ID: u8 = 6;

    /// Name used in the `serialization` endpoint parameter.
    pub const NAME: &'static str = "json";
}

impl Serialization for JsonSerialization {
    type Output<W: Write> = JsonObjectOutput<W>;
    type Input<R: Read> = JsonObjectInput<R>;

    fn content_type_id(&self) -> u8 {
        Self::CONTENT_TYPE_ID
    }

    fn content_type(&self) -> &'static str {
        "text/json"
    }

    fn serialize<W: Write>(&self, _url: &EndpointUrl, output: W) -> JsonObjectOutput<W> {
        JsonObjectOutput { writer: output }
    }

    fn deserialize<R: Read>(&self, _url: &EndpointUrl, input: R) -> JsonObjectInput<R> {
        JsonObjectInput {
            de: serde_json::Deserializer::from_reader(input),
        }
    }
}

/// JSON writer: one value per line.
pub struct JsonObjectOutput<W: Write> {
    writer: W,
}

impl<W: Write> JsonObjectOutput<W> {
    /// Recover the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ObjectOutput for JsonObjectOutput<W> {
    fn write_object<T: Serialize + ?Sized>(&mut self, value: &T) -> ExchangeResult<()> {
        serde_json::to_writer(&mut self.writer, value)?;
        self.writer.write_all(b"\n").map_err(codec_io_error)
    }

    fn flush_buffer(&mut self) -> ExchangeResult<()> {
        self.writer.flush().map_err(codec_io_error)
    }
}

/// JSON reader over a stream of whitespace-separated values.
pub struct JsonObjectInput<R: Read> {
    de: serde_json::Deserializer<serde_json::de::IoRead<R>>,
}

impl<R: Read> ObjectInput for JsonObjectInput<R> {
    fn read_object<T: DeserializeOwned>(&mut self) -> ExchangeResult<T> {
        Ok(T::deserialize(&mut self.de)?)
    }
}

fn codec_io_error(err: std::io::Error) -> ExchangeError {
    ExchangeError::Codec {
        message: err.to_string(),
    }
}

/// Look up the serialization named by the endpoint's `serialization` parameter.
///
/// Only JSON ships with this crate; any other name is rejected.
pub fn serialization_for(url: &EndpointUrl) -> ExchangeResult<JsonSerialization> {
    let name = url
        .parameter(keys::SERIALIZATION)
        .unwrap_or(DEFAULT_SERIALIZATION);
    if name == JsonSerialization::NAME {
        Ok(JsonSerialization)
    } else {
        Err(ExchangeError::Codec {
            message: format!("unsupported serialization: {name}"),
        })
    }
}
