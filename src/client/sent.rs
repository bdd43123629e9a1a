use std::collections::VecDeque;

use tokio::sync::oneshot;

use crate::error::Error;

/// Single-shot handler a [`super::ServiceClient`] completes once a request's
/// response (or terminal error) is known.
pub(crate) type ResponseTx<Resp> = oneshot::Sender<Result<Resp, Error>>;

/// A sent request awaiting its response (§3 "Client SentQueue"): it has
/// already been written to the wire, so only the handler and the start
/// timestamp need to be kept around for correlation and latency metrics.
pub(crate) struct SentEntry<Resp> {
    pub(crate) handler: ResponseTx<Resp>,
    pub(crate) start: i64,
}

impl<Resp> SentEntry<Resp> {
    pub(crate) fn complete(self, result: Result<Resp, Error>) {
        let _ = self.handler.send(result);
    }
}

/// FIFO of requests that have been written to the wire but for which no
/// response has arrived yet. Invariant: the nth response decoded from the
/// connection completes the nth entry in this queue (§3, §4.3).
pub(crate) struct SentQueue<Resp> {
    entries: VecDeque<SentEntry<Resp>>,
}

impl<Resp> SentQueue<Resp> {
    pub(crate) fn new() -> Self {
        SentQueue {
            entries: VecDeque::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn push_back(&mut self, entry: SentEntry<Resp>) {
        self.entries.push_back(entry);
    }

    pub(crate) fn pop_front(&mut self) -> Option<SentEntry<Resp>> {
        self.entries.pop_front()
    }

    pub(crate) fn drain(&mut self) -> std::collections::vec_deque::Drain<'_, SentEntry<Resp>> {
        self.entries.drain(..)
    }
}
