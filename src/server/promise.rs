use std::collections::VecDeque;
use std::sync::Arc;

/// One received request awaiting a response (§3 "Server-side Promise").
///
/// Invariants: at most one response is ever assigned; a promise is never
/// observed completed twice (a second `complete` call is a no-op); the
/// promise's position in its owning [`PromiseQueue`] equals the order it
/// was read from the codec.
pub(crate) struct Promise<Req, Resp> {
    pub(crate) id: u64,
    pub(crate) request: Arc<Req>,
    pub(crate) created_at: i64,
    response: Option<Resp>,
}

impl<Req, Resp> Promise<Req, Resp> {
    pub(crate) fn new(id: u64, request: Arc<Req>, created_at: i64) -> Self {
        Promise {
            id,
            request,
            created_at,
            response: None,
        }
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.response.is_some()
    }

    /// Assigns the response if none has been assigned yet. Further calls
    /// are no-ops, matching the "at most one response" invariant.
    pub(crate) fn complete(&mut self, response: Resp) {
        if self.response.is_none() {
            self.response = Some(response);
        }
    }

    pub(crate) fn take_response(&mut self) -> Option<Resp> {
        self.response.take()
    }
}

/// Ordered buffer of in-flight request promises. The head is always the
/// oldest incomplete or completed-but-unflushed promise; responses are
/// written to the transport strictly in this order. There is no
/// reordering operation.
pub(crate) struct PromiseQueue<Req, Resp> {
    promises: VecDeque<Promise<Req, Resp>>,
}

impl<Req, Resp> PromiseQueue<Req, Resp> {
    pub(crate) fn new() -> Self {
        PromiseQueue {
            promises: VecDeque::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.promises.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.promises.is_empty()
    }

    pub(crate) fn push_back(&mut self, promise: Promise<Req, Resp>) {
        self.promises.push_back(promise);
    }

    pub(crate) fn front(&self) -> Option<&Promise<Req, Resp>> {
        self.promises.front()
    }

    pub(crate) fn pop_front(&mut self) -> Option<Promise<Req, Resp>> {
        self.promises.pop_front()
    }

    /// Locates the promise with `id` and completes it, returning `true` if
    /// found (an unknown id means the promise already flushed or the
    /// connection closed; this is treated as a silent no-op by callers).
    pub(crate) fn complete(&mut self, id: u64, response: Resp) -> bool {
        for promise in self.promises.iter_mut() {
            if promise.id == id {
                promise.complete(response);
                return true;
            }
        }
        false
    }
}
