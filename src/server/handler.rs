use std::future::Future;
use std::sync::Arc;

use crate::error::Error;
use crate::metrics::Tag;

/// The only two user hooks a [`crate::server::ServiceServer`] is
/// parameterized by (§9 "Subclass hooks → interface abstraction"): what the
/// source modeled as overridable methods on a base class is exposed here as
/// a single trait the server is generic over.
pub trait ServiceHandler<Req>: Send {
    /// The response type written back to the wire.
    type Response: Send + 'static;

    /// The future returned by [`ServiceHandler::process_request`]. May
    /// resolve on the same poll (synchronous completion) or on a later
    /// turn of the event loop.
    type Future: Future<Output = Result<Self::Response, Error>> + Send + 'static;

    /// Process one decoded request. May complete synchronously or later;
    /// either way the server attaches a completion arm that converts a
    /// failure into a protocol response via [`ServiceHandler::process_failure`].
    fn process_request(&mut self, request: Arc<Req>) -> Self::Future;

    /// Synchronous, total conversion of an error into a protocol-level
    /// error response. Must never itself fail.
    fn process_failure(&mut self, request: &Req, cause: &Error) -> Self::Response;

    /// Tags attached to the per-request rate/latency metrics emitted by the
    /// ordering pass. Defaults to no tags.
    fn tags_for(&self, _request: &Req, _response: &Self::Response) -> Vec<Tag> {
        Vec::new()
    }
}
