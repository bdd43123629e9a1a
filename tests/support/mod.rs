//! Minimal public-API test doubles shared by the scenario tests.
//!
//! Unlike the crate's own `#[cfg(test)]` unit tests, integration tests only
//! see `pipeline_proto`'s public surface, so these doubles are built solely
//! against the `IoController`/`Worker` traits rather than the crate's
//! internal mock.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pipeline_proto::io::{IoController, WriteResult};
use pipeline_proto::worker::Worker;

#[derive(Default)]
struct Log<Out> {
    pushed: VecDeque<(Out, Option<i64>)>,
    reads_paused: bool,
    writes_paused: bool,
    outgoing_purges: u32,
    pending_purges: u32,
}

/// A handle retained by a test after its matching [`RecordingController`]
/// has been moved into a `ServiceServer`/`ServiceClient`, so the test can
/// still inspect what was pushed to the wire.
pub struct SharedLog<Out>(Arc<Mutex<Log<Out>>>);

impl<Out> Clone for SharedLog<Out> {
    fn clone(&self) -> Self {
        SharedLog(self.0.clone())
    }
}

impl<Out: Clone> SharedLog<Out> {
    pub fn pushed(&self) -> Vec<Out> {
        self.0.lock().unwrap().pushed.iter().map(|(m, _)| m.clone()).collect()
    }

    pub fn writes_paused(&self) -> bool {
        self.0.lock().unwrap().writes_paused
    }

    pub fn outgoing_purges(&self) -> u32 {
        self.0.lock().unwrap().outgoing_purges
    }

    pub fn pending_purges(&self) -> u32 {
        self.0.lock().unwrap().pending_purges
    }
}

/// Records every message pushed to it; resolves every push as `Success`
/// immediately, synchronously, the same way the crate's own internal mock
/// does. Paired with a [`SharedLog`] the test keeps after handing this
/// controller's ownership over to a `ServiceServer`/`ServiceClient`.
pub struct RecordingController<Out> {
    log: Arc<Mutex<Log<Out>>>,
}

impl<Out> RecordingController<Out> {
    pub fn new() -> (Self, SharedLog<Out>) {
        let log = Arc::new(Mutex::new(Log::default()));
        (
            RecordingController { log: log.clone() },
            SharedLog(log),
        )
    }
}

impl<Out> Default for RecordingController<Out> {
    fn default() -> Self {
        RecordingController::new().0
    }
}

impl<Out: Send + 'static> IoController<Out> for RecordingController<Out> {
    fn push(
        &mut self,
        message: Out,
        timestamp: Option<i64>,
        on_result: Box<dyn FnOnce(WriteResult) + Send>,
    ) -> bool {
        self.log.lock().unwrap().pushed.push_back((message, timestamp));
        on_result(WriteResult::Success);
        true
    }

    fn pause_reads(&mut self) {
        self.log.lock().unwrap().reads_paused = true;
    }

    fn resume_reads(&mut self) {
        self.log.lock().unwrap().reads_paused = false;
    }

    fn pause_writes(&mut self) {
        self.log.lock().unwrap().writes_paused = true;
    }

    fn resume_writes(&mut self) {
        self.log.lock().unwrap().writes_paused = false;
    }

    fn ready_for_data(&mut self) {}

    fn purge_outgoing(&mut self) {
        self.log.lock().unwrap().outgoing_purges += 1;
    }

    fn purge_pending(&mut self) {
        self.log.lock().unwrap().pending_purges += 1;
    }
}

/// Counts how many times a reconnect was scheduled, for the reconnect-bound
/// property (§8 invariant 6).
#[derive(Default, Clone)]
pub struct CountingWorker {
    pub reconnects: Arc<Mutex<u32>>,
}

impl Worker for CountingWorker {
    fn schedule(&self, _delay: Duration, callback: Box<dyn FnOnce() + Send>) {
        callback();
    }

    fn reconnect(&self, _delay: Duration) {
        *self.reconnects.lock().unwrap() += 1;
    }
}
