//! ResponseFuture: caller-side handle on a pending two-way request.
//!
//! Callers can block with [`ResponseFuture::wait`], poll with
//! [`ResponseFuture::is_done`], or `.await` the handle from async code.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

use super::registry::FutureRegistry;
use crate::envelope::{Payload, Response};
use crate::error::ExchangeError;
use crate::transport::ChannelId;

/// Outcome of a two-way request.
pub type ResponseResult = Result<Response, ExchangeError>;

/// Handle on the eventual outcome of a two-way request.
///
/// Resolves exactly once to the matching response, a timeout, or a
/// cancellation.
pub struct ResponseFuture {
    id: u64,
    channel: ChannelId,
    timeout: Duration,
    receiver: oneshot::Receiver<ResponseResult>,

    /// Outcome observed by `is_done` before the caller consumed it.
    outcome: Option<ResponseResult>,

    registry: FutureRegistry,
}

impl ResponseFuture {
    pub(super) fn new(
        id: u64,
        channel: ChannelId,
        timeout: Duration,
        receiver: oneshot::Receiver<ResponseResult>,
        registry: FutureRegistry,
    ) -> Self {
        Self {
            id,
            channel,
            timeout,
            receiver,
            outcome: None,
            registry,
        }
    }

    /// Id of the request this future tracks.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Channel the request was sent on.
    pub fn channel_id(&self) -> ChannelId {
        self.channel
    }

    /// Timeout the request was registered with.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether the outcome is available, without blocking.
    pub fn is_done(&mut self) -> bool {
        if self.outcome.is_some() {
            return true;
        }
        match self.receiver.try_recv() {
            Ok(outcome) => {
                self.outcome = Some(outcome);
                true
            }
            Err(TryRecvError::Empty) => false,
            Err(TryRecvError::Closed) => {
                self.outcome = Some(Err(self.abandoned()));
                true
            }
        }
    }

    /// Cancel the request if it is still pending.
    ///
    /// Returns `false` if it had already completed.
    pub fn cancel(&self) -> bool {
        self.registry.cancel(self.id, "cancelled by caller")
    }

    /// Block the current thread until the outcome is available.
    ///
    /// Must not be called from within an async runtime; `.await` the future
    /// there instead.
    pub fn wait(mut self) -> ResponseResult {
        if let Some(outcome) = self.outcome.take() {
            return outcome;
        }
        let abandoned = self.abandoned();
        self.receiver.blocking_recv().unwrap_or(Err(abandoned))
    }

    /// Block until the outcome is available and map it to the response's result payload.
    ///
    /// # Errors
    ///
    /// Returns the timeout or cancellation error, or the remote error carried
    /// by a non-OK response.
    pub fn wait_result(self) -> Result<Payload, ExchangeError> {
        self.wait()?.into_result()
    }

    fn abandoned(&self) -> ExchangeError {
        ExchangeError::Cancelled {
            id: self.id,
            reason: "completion slot dropped".to_string(),
        }
    }
}

impl Future for ResponseFuture {
    type Output = ResponseResult;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let Some(outcome) = this.outcome.take() {
            return Poll::Ready(outcome);
        }
        match Pin::new(&mut this.receiver).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Err(this.abandoned())),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl std::fmt::Debug for ResponseFuture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseFuture")
            .field("id", &self.id)
            .field("channel", &self.channel)
            .field("timeout", &self.timeout)
            .field("done", &self.outcome.is_some())
            .finish()
    }
}
