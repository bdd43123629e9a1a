use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::stream::{FuturesUnordered, Stream};

use crate::common::now_ms;
use crate::error::Error;
use crate::io::{IoController, WriteResult};
use crate::metrics::{Metrics, MetricsSink, NoopSink};
use crate::worker::{Unbound, Worker};

use super::config::ServerConfig;
use super::handler::ServiceHandler;
use super::promise::{Promise, PromiseQueue};

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Connection state a [`ServiceServer`] moves through (§4.1 "State
/// machine").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Accepts new requests; the ordering pass writes responses.
    Active,
    /// Reads are paused, in-flight requests continue until the queue
    /// drains or they time out.
    Draining,
    /// Terminal.
    Closed,
}

/// Accepts decoded requests on a single connection, dispatches them to a
/// [`ServiceHandler`], and writes responses back in the order the requests
/// arrived (§4.1).
///
/// `Req` is the decoded request type; `H` supplies the user processing
/// logic; `C` is the transport-owning [`IoController`] this server writes
/// responses through; `S` is the metrics sink (defaults to a no-op).
pub struct ServiceServer<Req, H, C, S = NoopSink>
where
    Req: Send + Sync + 'static,
    H: ServiceHandler<Req>,
    C: IoController<H::Response>,
    S: MetricsSink,
{
    config: ServerConfig,
    handler: H,
    controller: Option<C>,
    queue: PromiseQueue<Req, H::Response>,
    in_flight: FuturesUnordered<BoxFuture<(u64, Arc<Req>, Result<H::Response, Error>)>>,
    next_id: u64,
    total_requests: u64,
    concurrent_requests: i64,
    disconnecting: bool,
    state: State,
    metrics: Arc<Metrics<S>>,
    worker: Arc<dyn Worker>,
}

impl<Req, H, C> ServiceServer<Req, H, C, NoopSink>
where
    Req: Send + Sync + 'static,
    H: ServiceHandler<Req>,
    C: IoController<H::Response>,
{
    /// Builds a server over a fresh connection, with metrics discarded.
    pub fn new(config: ServerConfig, handler: H, controller: C) -> Self {
        ServiceServer::with_metrics_sink(config, handler, controller, NoopSink)
    }
}

impl<Req, H, C, S> ServiceServer<Req, H, C, S>
where
    Req: Send + Sync + 'static,
    H: ServiceHandler<Req>,
    C: IoController<H::Response>,
    S: MetricsSink,
{
    /// Builds a server over a fresh connection, emitting metrics through
    /// `sink`.
    pub fn with_metrics_sink(config: ServerConfig, handler: H, controller: C, sink: S) -> Self {
        let metrics = Arc::new(Metrics::new(config.name.clone(), sink));
        ServiceServer {
            config,
            handler,
            controller: Some(controller),
            queue: PromiseQueue::new(),
            in_flight: FuturesUnordered::new(),
            next_id: 0,
            total_requests: 0,
            concurrent_requests: 0,
            disconnecting: false,
            state: State::Active,
            metrics,
            worker: Arc::new(Unbound),
        }
    }

    /// Binds this server to a real worker so that [`ServiceServer::schedule`]
    /// can actually deliver timed callbacks instead of discarding them.
    pub fn with_worker(mut self, worker: Arc<dyn Worker>) -> Self {
        self.worker = worker;
        self
    }

    /// Requests a timed callback from the bound worker (§4.1 `schedule`).
    /// A no-op if no worker has been bound.
    pub fn schedule(&self, delay: Duration, callback: impl FnOnce() + Send + 'static) {
        self.worker.schedule(delay, Box::new(callback));
    }

    /// Current connection state.
    pub fn state(&self) -> State {
        self.state
    }

    /// Number of requests accepted but not yet fully flushed.
    pub fn concurrent_requests(&self) -> i64 {
        self.concurrent_requests
    }

    /// `true` once `gracefulDisconnect` has been called.
    pub fn is_disconnecting(&self) -> bool {
        self.disconnecting
    }

    /// Inbound hook invoked by the codec layer per decoded request (§4.1
    /// "Dispatch policy"). Allocates a promise, enqueues it, and either
    /// dispatches it to the handler or immediately rejects it with
    /// overload, depending on the queue depth *before* this request was
    /// appended.
    pub fn process_message(&mut self, request: Req) {
        let now = now_ms();
        let id = self.next_id;
        self.next_id += 1;
        self.total_requests += 1;
        let depth_before_append = self.queue.len();

        let request = Arc::new(request);
        self.queue
            .push_back(Promise::new(id, request.clone(), now));
        self.concurrent_requests += 1;
        self.metrics.counter("concurrent_requests", self.concurrent_requests, &[]);

        if depth_before_append < self.config.request_buffer_size {
            let future = self.handler.process_request(request.clone());
            let mapped: BoxFuture<(u64, Arc<Req>, Result<H::Response, Error>)> =
                Box::pin(async move {
                    let result = future.await;
                    (id, request, result)
                });
            self.in_flight.push(mapped);
        } else {
            let response = self.handle_failure(&request, Error::new_overloaded());
            self.queue.complete(id, response);
            self.run_ordering_pass();
        }
    }

    /// `handleFailure`: increments the error rate (tagged with the cause's
    /// kind), optionally logs, then converts the error into a protocol
    /// response via the handler.
    fn handle_failure(&mut self, request: &Req, cause: Error) -> H::Response {
        let tag = sanitize_tag(cause.kind().tag());
        self.metrics.rate("errors", &[("kind", tag)]);
        if self.config.log_errors {
            tracing::warn!(kind = %cause.kind().tag(), "{}", cause);
        }
        self.handler.process_failure(request, &cause)
    }

    /// The only writer to the wire (§4.1 "Ordering pass"). While the
    /// connection is alive, the queue is non-empty, and the head is
    /// complete: dequeue, emit metrics, and push the response to the
    /// controller in arrival order.
    fn run_ordering_pass(&mut self) {
        loop {
            if self.controller.is_none() {
                break;
            }
            match self.queue.front() {
                Some(p) if p.is_complete() => {}
                _ => break,
            }

            let mut promise = self.queue.pop_front().expect("front checked Some above");
            let response = promise
                .take_response()
                .expect("front was checked complete");

            let tags = self.handler.tags_for(&promise.request, &response);
            self.metrics.rate("requests", &tags);
            let latency_ms = (now_ms() - promise.created_at) as f64;
            self.metrics.histogram("latency", latency_ms, &tags);

            self.concurrent_requests -= 1;
            self.metrics
                .counter("concurrent_requests", self.concurrent_requests, &[]);

            let metrics = self.metrics.clone();
            let controller = self
                .controller
                .as_mut()
                .expect("checked Some at top of loop");
            let accepted = controller.push(
                response,
                Some(promise.created_at),
                Box::new(move |result| {
                    if result != WriteResult::Success {
                        metrics.rate("dropped_replies", &[]);
                    }
                }),
            );
            if !accepted {
                self.metrics.rate("dropped_replies", &[]);
            }

            self.check_drain_complete();
        }
    }

    /// Periodic idle/timeout sweep (§4.1 "Idle / timeout sweep"). Walks
    /// the queue from the head while it is incomplete and older than
    /// `requestTimeout`, completing each with a timeout failure. Because
    /// completion triggers the ordering pass, timed-out heads immediately
    /// flush, unblocking any already-completed successors behind them.
    pub fn idle_check(&mut self, now: i64) {
        let timeout_ms = self.config.request_timeout.as_millis() as i64;
        loop {
            let expired = match self.queue.front() {
                Some(p) if !p.is_complete() && now - p.created_at > timeout_ms => {
                    Some((p.id, p.request.clone()))
                }
                _ => None,
            };
            let (id, request) = match expired {
                Some(pair) => pair,
                None => break,
            };
            let response = self.handle_failure(&request, Error::new_timeout());
            self.queue.complete(id, response);
            self.run_ordering_pass();
        }
    }

    /// Pauses reads and marks the connection as disconnecting; the
    /// connection closes once the promise queue drains (§4.1
    /// "gracefulDisconnect").
    pub fn graceful_disconnect(&mut self) {
        if self.disconnecting {
            return;
        }
        self.disconnecting = true;
        self.state = State::Draining;
        if let Some(controller) = self.controller.as_mut() {
            controller.pause_reads();
        }
        self.check_drain_complete();
    }

    fn check_drain_complete(&mut self) {
        if self.state == State::Draining && self.queue.is_empty() {
            self.state = State::Closed;
            self.controller = None;
        }
    }

    /// Called on connection close, clean or error (§4.1 "Connection
    /// close"). Emits `requests_per_connection`, decrements
    /// `concurrent_requests` by whatever is still queued, and discards any
    /// undelivered responses (the socket is gone).
    pub fn connection_closed(&mut self) {
        self.metrics
            .histogram("requests_per_connection", self.total_requests as f64, &[]);
        let still_queued = self.queue.len() as i64;
        self.concurrent_requests -= still_queued;
        self.metrics
            .counter("concurrent_requests", self.concurrent_requests, &[]);
        self.queue = PromiseQueue::new();
        self.in_flight = FuturesUnordered::new();
        self.controller = None;
        self.state = State::Closed;
    }

    /// Polls in-flight request futures, completing their promises and
    /// running the ordering pass as each resolves. Returns `Poll::Ready(())`
    /// once the connection is `Closed` and no work remains; otherwise
    /// `Poll::Pending`, to be polled again when the owning task wakes
    /// (including immediately after a `process_message` call pushes new
    /// work).
    pub fn poll_drive(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        loop {
            match Pin::new(&mut self.in_flight).poll_next(cx) {
                Poll::Ready(Some((id, request, result))) => {
                    let response = match result {
                        Ok(resp) => resp,
                        // §7 "User": whatever `processRequest` failed with is
                        // wrapped as the cause of a fresh `User` error, not
                        // forwarded under its own kind.
                        Err(err) => {
                            let cause: Arc<dyn std::error::Error + Send + Sync> = Arc::new(err);
                            self.handle_failure(&request, Error::new_user(cause))
                        }
                    };
                    self.queue.complete(id, response);
                    self.run_ordering_pass();
                }
                Poll::Ready(None) => {
                    return if self.state == State::Closed {
                        Poll::Ready(())
                    } else {
                        Poll::Pending
                    };
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }

    /// The long-running future a worker owns and awaits for this
    /// connection (§5, §9): drains every in-flight request future,
    /// ordering responses as they complete, until the connection closes.
    pub async fn drive(&mut self) {
        std::future::poll_fn(|cx| self.poll_drive(cx)).await
    }
}

impl<Req, H, C, S> std::fmt::Debug for ServiceServer<Req, H, C, S>
where
    Req: Send + Sync + 'static,
    H: ServiceHandler<Req>,
    C: IoController<H::Response>,
    S: MetricsSink,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceServer")
            .field("state", &self.state)
            .field("concurrent_requests", &self.concurrent_requests)
            .finish()
    }
}

fn sanitize_tag(raw: &str) -> String {
    raw.chars().filter(|c| c.is_alphanumeric()).collect()
}
