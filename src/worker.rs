//! The worker/event-loop contract (§6.2).
//!
//! A concrete worker (the cooperative event loop that owns a server
//! handler or client instance) is out of scope for this crate, same as the
//! I/O controller. This module only pins down the one capability the core
//! needs from it directly: requesting a timed callback. Connection
//! establishment (`Connect`/`Reconnect`) and cross-thread request posting
//! (`Message`) are realized internally by [`crate::client::ServiceClient`]'s
//! own `drive()` loop (§9) rather than routed back through this trait, since
//! no concrete scheduler crate exists for this core to depend on.

use std::time::Duration;

/// Capability for requesting a one-shot timed callback, implemented by
/// whatever event loop owns a server handler or client instance.
pub trait Worker: Send + Sync + 'static {
    /// Request that `callback` run after `delay`. A worker that is
    /// shutting down is free to drop `callback` without running it.
    fn schedule(&self, delay: Duration, callback: Box<dyn FnOnce() + Send>);

    /// Asks the worker to redial the remote end after `delay` and, once
    /// (re)connected, call `connected`/`connection_failed` on the client
    /// it owns (§4.2 "Reconnect attempt"). Unlike `schedule`, this carries
    /// no callback: the worker already owns the client and is expected to
    /// drive the next attempt through the client's own event callbacks.
    fn reconnect(&self, delay: Duration);
}

/// A [`Worker`] that has never been bound to a real event loop: every
/// `schedule` call is a documented no-op, matching `schedule(delay,
/// message)`'s "no-op if the handler is unbound" contract (§4.1).
#[derive(Debug, Default, Clone, Copy)]
pub struct Unbound;

impl Worker for Unbound {
    fn schedule(&self, _delay: Duration, _callback: Box<dyn FnOnce() + Send>) {}

    fn reconnect(&self, _delay: Duration) {}
}
