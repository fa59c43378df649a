//! Request/response correlation.
//!
//! A [`FutureRegistry`] owns every pending two-way request, indexed by request
//! id and by owning channel. Each pending entry is completed exactly once, by
//! whichever of response arrival, explicit cancel, or the timeout sweep
//! reaches it first. The caller observes the outcome through the
//! [`ResponseFuture`] returned at registration.

mod registry;
mod response_future;

pub use registry::{FutureRegistry, SweeperHandle};
pub use response_future::{ResponseFuture, ResponseResult};
