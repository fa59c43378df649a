//! Response envelopes and status codes.

use serde::{Deserialize, Serialize};

use super::message::Payload;
use crate::error::ExchangeError;

/// Outcome status carried by a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    /// The request succeeded.
    Ok,
    /// The client gave up before the request was sent.
    ClientTimeout,
    /// The server did not answer in time.
    ServerTimeout,
    /// The server could not decode the request.
    BadRequest,
    /// The client could not decode the response.
    BadResponse,
    /// No service is exported at the requested path.
    ServiceNotFound,
    /// The service raised an error while handling the request.
    ServiceError,
    /// The server failed outside the service.
    ServerError,
    /// The client failed outside the transport.
    ClientError,
}

impl Status {
    /// Numeric status code used on the wire.
    pub fn code(self) -> u8 {
        match self {
            Status::Ok => 20,
            Status::ClientTimeout => 30,
            Status::ServerTimeout => 31,
            Status::BadRequest => 40,
            Status::BadResponse => 50,
            Status::ServiceNotFound => 60,
            Status::ServiceError => 70,
            Status::ServerError => 80,
            Status::ClientError => 90,
        }
    }

    /// Decode a wire status code.
    pub fn from_code(code: u8) -> Option<Self> {
        let status = match code {
            20 => Status::Ok,
            30 => Status::ClientTimeout,
            31 => Status::ServerTimeout,
            40 => Status::BadRequest,
            50 => Status::BadResponse,
            60 => Status::ServiceNotFound,
            70 => Status::ServiceError,
            80 => Status::ServerError,
            90 => Status::ClientError,
            _ => return None,
        };
        Some(status)
    }
}

/// A response envelope, correlated to its request by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    id: u64,
    status: Status,
    result: Option<Payload>,
    error_message: Option<String>,
    event: bool,
}

impl Response {
    /// Successful response carrying `result`.
    pub fn ok(id: u64, result: impl Into<Payload>) -> Self {
        Self {
            id,
            status: Status::Ok,
            result: Some(result.into()),
            error_message: None,
            event: false,
        }
    }

    /// Failed response with the given status and message.
    pub fn error(id: u64, status: Status, message: impl Into<String>) -> Self {
        Self {
            id,
            status,
            result: None,
            error_message: Some(message.into()),
            event: false,
        }
    }

    /// Answer to a heartbeat event request.
    pub fn heartbeat(id: u64) -> Self {
        Self {
            id,
            status: Status::Ok,
            result: None,
            error_message: None,
            event: true,
        }
    }

    /// Id of the request this response answers.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Response status.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Result payload, if any.
    pub fn result(&self) -> Option<&Payload> {
        self.result.as_ref()
    }

    /// Error message, if any.
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Whether this answers a control event.
    pub fn is_event(&self) -> bool {
        self.event
    }

    /// Map the response to what a caller observes.
    ///
    /// `Ok` yields the result payload (empty when absent). Timeout statuses
    /// become [`ExchangeError::Timeout`]; every other status becomes
    /// [`ExchangeError::Remote`].
    pub fn into_result(self) -> Result<Payload, ExchangeError> {
        let message = self.error_message.unwrap_or_default();
        match self.status {
            Status::Ok => Ok(self.result.unwrap_or_default()),
            Status::ClientTimeout | Status::ServerTimeout => Err(ExchangeError::Timeout {
                id: self.id,
                elapsed: std::time::Duration::ZERO,
                sent: self.status == Status::ServerTimeout,
            }),
            status => Err(ExchangeError::Remote { status, message }),
        }
    }
}
