//! The I/O controller contract (§6.1).
//!
//! Byte-level framing, parsing, and socket I/O are external collaborators:
//! this module only pins down the small surface the core needs to push
//! encoded messages onto the wire and to manage read/write backpressure. A
//! real transport-owning crate implements [`IoController`]; this crate only
//! ships the trait plus, under `#[cfg(test)]`, a minimal in-memory double
//! used by its own unit tests.

/// Outcome of a single `push`ed message once the controller has finished
/// (attempting) to write it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteResult {
    /// The message was written successfully.
    Success,
    /// Writing the message failed.
    Failure,
    /// The message was dropped before it could be written (e.g. purged, or
    /// timed out while still pending).
    Cancelled,
}

/// Capability for pushing encoded messages onto a connection and for
/// controlling read/write flow, consumed by both [`crate::server`] and
/// [`crate::client`] cores.
///
/// `Out` is the message type the core hands the controller for encoding
/// (a response on the server, a request on the client).
pub trait IoController<Out>: Send {
    /// Enqueue `message` for encoding and writing. `timestamp` is an
    /// opaque write tag the core attaches for its own bookkeeping (the
    /// server uses the originating request's creation time, purely to
    /// detect drops; it is not interpreted by the controller).
    ///
    /// Returns `false` if the controller's pending buffer is already full
    /// and the message was rejected outright (it is the caller's
    /// responsibility to invoke no completion callback in that case).
    fn push(
        &mut self,
        message: Out,
        timestamp: Option<i64>,
        on_result: Box<dyn FnOnce(WriteResult) + Send>,
    ) -> bool;

    /// Stop delivering `processMessage`/decoded-response callbacks.
    fn pause_reads(&mut self);

    /// Resume delivering `processMessage`/decoded-response callbacks.
    fn resume_reads(&mut self);

    /// Stop accepting new `push`ed messages for writing.
    fn pause_writes(&mut self);

    /// Resume accepting `push`ed messages for writing.
    fn resume_writes(&mut self);

    /// Signal that the handler is ready to receive decoded data again
    /// (called once after a fresh connection is established).
    fn ready_for_data(&mut self);

    /// Drop every message that has been `push`ed but not yet written,
    /// invoking each one's completion callback with [`WriteResult::Cancelled`].
    fn purge_outgoing(&mut self);

    /// Drop every message still waiting in the controller's own pending
    /// buffer (distinct from `purge_outgoing`: these never made it past
    /// admission), invoking each completion callback with
    /// [`WriteResult::Cancelled`].
    fn purge_pending(&mut self);
}
