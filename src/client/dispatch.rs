use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::common::now_ms;
use crate::error::Error;
use crate::io::{IoController, WriteResult};
use crate::metrics::{Metrics, MetricsSink, NoopSink};
use crate::worker::{Unbound, Worker};

use super::config::ClientConfig;
use super::sent::{ResponseTx, SentEntry, SentQueue};

/// Connection state a [`ServiceClient`] moves through (§4.2 "State
/// machine").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Never connected and never asked to.
    Initial,
    /// `connect()` was called; waiting on the external dialer.
    Connecting,
    /// Bound to a live writer via [`ServiceClient::connected`].
    Connected,
    /// Connection was lost or failed and a retry is scheduled.
    Reconnecting,
    /// The retry budget (`connectionAttempts`) is exhausted.
    Failed,
    /// `gracefulDisconnect` was called; draining until `SentQueue` empties.
    Draining,
    /// Terminal.
    Closed,
}

struct SourcedRequest<Req, Resp> {
    request: Req,
    handler: ResponseTx<Resp>,
    start: i64,
}

struct AwaitingPush<Resp> {
    id: u64,
    handler: ResponseTx<Resp>,
    start: i64,
}

struct PushOutcome {
    id: u64,
    result: WriteResult,
}

/// A request sent through [`ServiceClient::shared`]'s thread-safe façade.
struct AsyncRequest<Req, Resp> {
    request: Req,
    handler: ResponseTx<Resp>,
}

/// The deferred response returned by [`ServiceClient::send`] and
/// [`SharedSender::send`] (§9 "Deferred result abstraction").
pub struct ResponseFuture<Resp> {
    rx: oneshot::Receiver<Result<Resp, Error>>,
}

impl<Resp> std::fmt::Debug for ResponseFuture<Resp> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseFuture").finish()
    }
}

impl<Resp> Future for ResponseFuture<Resp> {
    type Output = Result<Resp, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            // The owning `ServiceClient` (or its `drive()` task) was
            // dropped before completing this request.
            Poll::Ready(Err(_canceled)) => Poll::Ready(Err(Error::new_not_connected())),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Thread-safe handle that posts sends onto the owning worker instead of
/// requiring `&mut ServiceClient` (§4.2 `shared()`). Cloning is cheap; every
/// clone posts onto the same underlying channel.
pub struct SharedSender<Req, Resp> {
    tx: mpsc::UnboundedSender<AsyncRequest<Req, Resp>>,
}

impl<Req, Resp> Clone for SharedSender<Req, Resp> {
    fn clone(&self) -> Self {
        SharedSender {
            tx: self.tx.clone(),
        }
    }
}

impl<Req, Resp> std::fmt::Debug for SharedSender<Req, Resp> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSender").finish()
    }
}

impl<Req, Resp> SharedSender<Req, Resp> {
    /// Posts `request` to the owning worker's `ServiceClient`. If the
    /// client (and its `drive()` loop) is no longer around, fails
    /// immediately with `NotConnected` rather than hanging.
    pub fn send(&self, request: Req) -> ResponseFuture<Resp> {
        let (tx, rx) = oneshot::channel();
        match self.tx.send(AsyncRequest { request, handler: tx }) {
            Ok(()) => ResponseFuture { rx },
            Err(mpsc::error::SendError(AsyncRequest { handler, .. })) => {
                let _ = handler.send(Err(Error::new_not_connected()));
                ResponseFuture { rx }
            }
        }
    }
}

/// Sends requests on a single connection and correlates incoming responses
/// with outstanding handlers by FIFO order (§4.2).
///
/// `Req` is the message type pushed to the wire; `Resp` is the decoded
/// response type; `C` is the transport-owning [`IoController`] this client
/// writes requests through; `S` is the metrics sink (defaults to a no-op).
pub struct ServiceClient<Req, Resp, C, S = NoopSink>
where
    C: IoController<Req>,
    S: MetricsSink,
{
    config: ClientConfig,
    controller: Option<C>,
    sent: SentQueue<Resp>,
    /// Pre-connect holding area: requests accepted while `failFast` is
    /// false and no writer exists yet, replayed through the send pipeline
    /// once `connected()` fires.
    holding: std::collections::VecDeque<SourcedRequest<Req, Resp>>,
    awaiting: std::collections::VecDeque<AwaitingPush<Resp>>,
    next_push_id: u64,
    disconnecting: bool,
    manually_disconnected: bool,
    connection_attempts: u32,
    writes_paused: bool,
    state: State,
    metrics: Arc<Metrics<S>>,
    worker: Arc<dyn Worker>,
    outcome_tx: mpsc::UnboundedSender<PushOutcome>,
    outcome_rx: mpsc::UnboundedReceiver<PushOutcome>,
    async_tx: mpsc::UnboundedSender<AsyncRequest<Req, Resp>>,
    async_rx: mpsc::UnboundedReceiver<AsyncRequest<Req, Resp>>,
}

impl<Req, Resp, C> ServiceClient<Req, Resp, C, NoopSink>
where
    C: IoController<Req>,
{
    /// Builds a not-yet-connected client, with metrics discarded.
    pub fn new(config: ClientConfig) -> Self {
        ServiceClient::with_metrics_sink(config, NoopSink)
    }
}

impl<Req, Resp, C, S> ServiceClient<Req, Resp, C, S>
where
    C: IoController<Req>,
    S: MetricsSink,
{
    /// Builds a not-yet-connected client, emitting metrics through `sink`.
    pub fn with_metrics_sink(config: ClientConfig, sink: S) -> Self {
        let metrics = Arc::new(Metrics::new(config.name.clone(), sink));
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        let (async_tx, async_rx) = mpsc::unbounded_channel();
        ServiceClient {
            config,
            controller: None,
            sent: SentQueue::new(),
            holding: std::collections::VecDeque::new(),
            awaiting: std::collections::VecDeque::new(),
            next_push_id: 0,
            disconnecting: false,
            manually_disconnected: false,
            connection_attempts: 0,
            writes_paused: false,
            state: State::Initial,
            metrics,
            worker: Arc::new(Unbound),
            outcome_tx,
            outcome_rx,
            async_tx,
            async_rx,
        }
    }

    /// Binds this client to a real worker so reconnect attempts are
    /// actually scheduled instead of discarded.
    pub fn with_worker(mut self, worker: Arc<dyn Worker>) -> Self {
        self.worker = worker;
        self
    }

    /// Current state-machine state.
    pub fn state(&self) -> State {
        self.state
    }

    /// `true` iff there's a live writer and the client hasn't begun
    /// draining or reconnecting.
    pub fn is_connected(&self) -> bool {
        self.controller.is_some() && self.state == State::Connected
    }

    /// Alias matching §4.2's `connectionStatus` observer.
    pub fn connection_status(&self) -> State {
        self.state
    }

    /// Thread-safe façade: clone freely, send from any thread (§4.2
    /// `shared()`). Requires [`ServiceClient::drive`] to be polled by the
    /// owning worker in order to actually dispatch posted requests.
    pub fn shared(&self) -> SharedSender<Req, Resp> {
        SharedSender {
            tx: self.async_tx.clone(),
        }
    }

    /// Instructs the worker to initiate a connection (§4.2 `connect()`).
    /// The actual dialing is an external collaborator; this only
    /// transitions state and rejects attempts on a terminally
    /// disconnected client.
    pub fn connect(&mut self) -> Result<(), Error> {
        if self.manually_disconnected {
            return Err(Error::new_stale_client());
        }
        self.state = State::Connecting;
        Ok(())
    }

    /// Enqueues `request` for sending; completes with the response or a
    /// typed error (§4.2 `send()`). Must be called from the owning worker.
    pub fn send(&mut self, request: Req) -> ResponseFuture<Resp> {
        let (tx, rx) = oneshot::channel();
        let sourced = SourcedRequest {
            request,
            handler: tx,
            start: now_ms(),
        };
        self.attempt_write(sourced);
        ResponseFuture { rx }
    }

    /// Send pipeline (§4.2 "Send pipeline (attemptWrite)").
    fn attempt_write(&mut self, s: SourcedRequest<Req, Resp>) {
        if self.disconnecting {
            let _ = s.handler.send(Err(Error::new_not_connected()));
            return;
        }

        if self.controller.is_some() || !self.config.fail_fast {
            if let Some(controller) = self.controller.as_mut() {
                let id = self.next_push_id;
                self.next_push_id += 1;
                let start = s.start;
                let outcome_tx = self.outcome_tx.clone();
                let accepted = controller.push(
                    s.request,
                    Some(start),
                    Box::new(move |result| {
                        let _ = outcome_tx.send(PushOutcome { id, result });
                    }),
                );
                if accepted {
                    self.awaiting.push_back(AwaitingPush {
                        id,
                        handler: s.handler,
                        start,
                    });
                } else {
                    self.metrics
                        .rate("errors", &[("kind", "ClientOverloaded".to_string())]);
                    let _ = s.handler.send(Err(Error::new_client_overloaded()));
                }
            } else if self.holding.len() < self.config.pending_buffer_size {
                self.holding.push_back(s);
            } else {
                self.metrics
                    .rate("errors", &[("kind", "ClientOverloaded".to_string())]);
                let _ = s.handler.send(Err(Error::new_client_overloaded()));
            }
        } else {
            self.metrics.rate("dropped_requests", &[]);
            let _ = s.handler.send(Err(Error::new_not_connected()));
        }
    }

    fn handle_push_outcome(&mut self, outcome: PushOutcome) {
        let awaiting = match self.awaiting.pop_front() {
            Some(a) => a,
            // Stray outcome after a purge already completed everything.
            None => return,
        };
        debug_assert_eq!(
            awaiting.id, outcome.id,
            "a single connection's push outcomes must resolve in FIFO order"
        );
        match outcome.result {
            WriteResult::Success => {
                self.sent.push_back(SentEntry {
                    handler: awaiting.handler,
                    start: awaiting.start,
                });
                if self.sent.len() >= self.config.sent_buffer_size && !self.writes_paused {
                    self.writes_paused = true;
                    if let Some(controller) = self.controller.as_mut() {
                        controller.pause_writes();
                    }
                }
            }
            WriteResult::Failure => {
                self.metrics
                    .rate("errors", &[("kind", "NotConnected".to_string())]);
                let cause: Arc<dyn std::error::Error + Send + Sync> = Arc::new(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "error while sending",
                ));
                let _ = awaiting
                    .handler
                    .send(Err(Error::new_not_connected_with(cause)));
            }
            WriteResult::Cancelled => {
                self.metrics.rate("errors", &[("kind", "Timeout".to_string())]);
                let _ = awaiting.handler.send(Err(Error::new_timeout()));
            }
        }
    }

    /// On inbound decoded response (§4.2 "Response correlation").
    pub fn process_response(&mut self, response: Resp) -> Result<(), Error> {
        let entry = match self.sent.pop_front() {
            Some(entry) => entry,
            None => {
                self.metrics.rate("errors", &[("kind", "Data".to_string())]);
                return Err(Error::new_data());
            }
        };
        let latency_ms = (now_ms() - entry.start) as f64;
        self.metrics.histogram("latency", latency_ms, &[]);
        self.metrics.rate("requests", &[]);
        entry.complete(Ok(response));

        self.check_drain_complete();

        if self.writes_paused && self.sent.len() < self.config.sent_buffer_size {
            self.writes_paused = false;
            if let Some(controller) = self.controller.as_mut() {
                controller.resume_writes();
            }
        }
        Ok(())
    }

    /// `connected(endpoint)` (§4.2 "Connection lifecycle"): resets
    /// `connectionAttempts`, stores the writer, signals ready for data,
    /// then replays anything that queued up in the pre-connect holding
    /// area.
    pub fn connected(&mut self, mut controller: C) {
        self.connection_attempts = 0;
        self.writes_paused = false;
        controller.ready_for_data();
        self.controller = Some(controller);
        self.state = State::Connected;

        let held: Vec<_> = self.holding.drain(..).collect();
        for s in held {
            self.attempt_write(s);
        }
    }

    /// Clean connection close (§4.2 `connectionClosed`).
    pub fn connection_closed(&mut self) {
        self.manually_disconnected = true;
        self.purge_buffers(None);
        self.state = State::Closed;
    }

    /// Connection dropped with an error (§4.2 `connectionLost`).
    pub fn connection_lost(&mut self, cause: Arc<dyn std::error::Error + Send + Sync>) {
        self.purge_buffers(Some(cause));
        self.metrics.rate("disconnects", &[]);
        self.attempt_reconnect();
    }

    /// The very first connection attempt failed (§4.2 `connectionFailed`).
    pub fn connection_failed(&mut self) {
        self.metrics.rate("connection_failures", &[]);
        self.attempt_reconnect();
    }

    fn attempt_reconnect(&mut self) {
        if self.disconnecting {
            return;
        }
        if !self.config.connection_attempts.is_expended(self.connection_attempts) {
            self.connection_attempts += 1;
            self.state = State::Reconnecting;
            self.worker.reconnect(self.config.connection_attempts.interval);
        } else {
            tracing::warn!(
                attempts = self.connection_attempts,
                "giving up reconnecting"
            );
            self.state = State::Failed;
        }
    }

    /// `purgeBuffers(cause)` (§4.2): drops the writer, completes every
    /// `SentQueue` entry with `ConnectionLost`, and — only under
    /// `failFast` — also fails the pre-connect holding area.
    fn purge_buffers(&mut self, cause: Option<Arc<dyn std::error::Error + Send + Sync>>) {
        if let Some(controller) = self.controller.as_mut() {
            controller.purge_outgoing();
            if self.config.fail_fast {
                controller.purge_pending();
            }
        }
        self.controller = None;
        self.writes_paused = false;

        let metrics = self.metrics.clone();
        for entry in self.sent.drain() {
            metrics.rate("errors", &[("kind", "ConnectionLost".to_string())]);
            let mut err = Error::new_connection_lost();
            if let Some(ref c) = cause {
                err = err.with(c.clone());
            }
            entry.complete(Err(err));
        }

        if self.config.fail_fast {
            for s in self.holding.drain(..) {
                metrics.rate("errors", &[("kind", "NotConnected".to_string())]);
                let _ = s.handler.send(Err(Error::new_not_connected()));
            }
        }
    }

    /// Sets `disconnecting`/`manuallyDisconnected`, purges the
    /// controller's not-yet-written pending queue, and schedules the
    /// transition to `Closed` once `SentQueue` drains (§4.2
    /// `gracefulDisconnect()`).
    pub fn graceful_disconnect(&mut self) {
        if self.disconnecting {
            return;
        }
        self.disconnecting = true;
        self.manually_disconnected = true;
        if let Some(controller) = self.controller.as_mut() {
            controller.purge_pending();
        }
        self.check_drain_complete();
    }

    fn check_drain_complete(&mut self) {
        if !self.disconnecting {
            return;
        }
        if self.sent.is_empty() {
            self.state = State::Closed;
            self.controller = None;
        } else {
            self.state = State::Draining;
        }
    }

    /// Drains both internal channels — push-completion outcomes and
    /// requests posted through [`ServiceClient::shared`] — until neither
    /// has more work ready. Returns `Poll::Ready(())` once the client is
    /// `Closed` and nothing is left waiting; otherwise `Poll::Pending`.
    pub fn poll_drive(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        loop {
            let mut progressed = false;

            while let Poll::Ready(Some(outcome)) = Pin::new(&mut self.outcome_rx).poll_recv(cx) {
                self.handle_push_outcome(outcome);
                progressed = true;
            }

            while let Poll::Ready(Some(async_req)) = Pin::new(&mut self.async_rx).poll_recv(cx) {
                let AsyncRequest { request, handler } = async_req;
                self.attempt_write(SourcedRequest {
                    request,
                    handler,
                    start: now_ms(),
                });
                progressed = true;
            }

            if !progressed {
                break;
            }
        }

        if self.state == State::Closed && self.holding.is_empty() {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }

    /// The long-running future a worker owns and awaits for this client
    /// (§5, §9): multiplexes push-completion outcomes and `shared()`
    /// sends until the client closes.
    pub async fn drive(&mut self) {
        std::future::poll_fn(|cx| self.poll_drive(cx)).await
    }

    /// Requests a timed reconnect after `delay` from the bound worker.
    /// Exposed so a surrounding event loop can drive reconnects through
    /// the same `Worker` abstraction the client uses internally.
    pub fn schedule_reconnect(&self, delay: Duration) {
        self.worker.reconnect(delay);
    }
}

impl<Req, Resp, C, S> std::fmt::Debug for ServiceClient<Req, Resp, C, S>
where
    C: IoController<Req>,
    S: MetricsSink,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceClient")
            .field("state", &self.state)
            .field("sent", &self.sent.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::mock::MockIoController;

    fn config() -> ClientConfig {
        ClientConfig {
            sent_buffer_size: 2,
            ..ClientConfig::default()
        }
    }

    /// Push outcomes only move a request from `awaiting` into `SentQueue`
    /// once something drains the outcome channel; in production that's the
    /// worker polling `drive()`, so tests do the same after every send.
    async fn settle<Req, Resp, C: IoController<Req>, S: MetricsSink>(
        client: &mut ServiceClient<Req, Resp, C, S>,
    ) {
        for _ in 0..8 {
            let _ = std::future::poll_fn(|cx| Poll::Ready(client.poll_drive(cx))).await;
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn s4_client_correlation_pauses_and_resumes_writes() {
        let mut client: ServiceClient<&'static str, &'static str, MockIoController<&'static str>> =
            ServiceClient::new(config());
        client.connect().unwrap();
        client.connected(MockIoController::default());

        let f1 = client.send("q1");
        settle(&mut client).await;
        let f2 = client.send("q2");
        settle(&mut client).await;
        // sent_buffer_size=2: the queue is now at the soft cap, writes pause.
        assert!(client.writes_paused);
        assert_eq!(client.sent.len(), 2);

        let f3 = client.send("q3");
        settle(&mut client).await;
        assert_eq!(client.holding.len(), 0);

        client.process_response("s1").unwrap();
        assert!(!client.writes_paused);
        assert_eq!(f1.await.unwrap(), "s1");

        client.process_response("s2").unwrap();
        assert_eq!(f2.await.unwrap(), "s2");

        client.process_response("s3").unwrap();
        assert_eq!(f3.await.unwrap(), "s3");
    }

    #[tokio::test]
    async fn s5_fail_fast_purge_fails_everything_before_reconnect() {
        let config = ClientConfig {
            fail_fast: true,
            ..ClientConfig::default()
        };
        let mut client: ServiceClient<&'static str, &'static str, MockIoController<&'static str>> =
            ServiceClient::new(config);
        client.connect().unwrap();
        client.connected(MockIoController::default());

        let f1 = client.send("q1");
        let f2 = client.send("q2");
        settle(&mut client).await;
        assert_eq!(client.sent.len(), 2);

        let cause: Arc<dyn std::error::Error + Send + Sync> =
            Arc::new(std::io::Error::new(std::io::ErrorKind::Other, "reset"));
        client.connection_lost(cause);

        assert!(f1.await.unwrap_err().is_connection_lost());
        assert!(f2.await.unwrap_err().is_connection_lost());
        assert_eq!(client.state(), State::Reconnecting);
    }

    #[tokio::test]
    async fn s6_stale_client_rejects_connect_after_graceful_disconnect() {
        let mut client: ServiceClient<&'static str, &'static str, MockIoController<&'static str>> =
            ServiceClient::new(ClientConfig::default());
        client.connect().unwrap();
        client.connected(MockIoController::default());
        client.graceful_disconnect();
        assert_eq!(client.state(), State::Closed);

        let err = client.connect().unwrap_err();
        assert!(err.is_stale_client());
    }

    #[tokio::test]
    async fn data_error_on_unmatched_response() {
        let mut client: ServiceClient<&'static str, &'static str, MockIoController<&'static str>> =
            ServiceClient::new(ClientConfig::default());
        client.connect().unwrap();
        client.connected(MockIoController::default());
        let err = client.process_response("unexpected").unwrap_err();
        assert!(err.is_data());
    }

    #[tokio::test]
    async fn holding_area_replays_in_order_once_connected() {
        let mut client: ServiceClient<&'static str, &'static str, MockIoController<&'static str>> =
            ServiceClient::new(ClientConfig::default());
        client.connect().unwrap();

        let f1 = client.send("q1");
        let f2 = client.send("q2");
        assert_eq!(client.holding.len(), 2);

        client.connected(MockIoController::default());
        assert_eq!(client.holding.len(), 0);
        settle(&mut client).await;
        assert_eq!(client.sent.len(), 2);

        client.process_response("s1").unwrap();
        client.process_response("s2").unwrap();
        assert_eq!(f1.await.unwrap(), "s1");
        assert_eq!(f2.await.unwrap(), "s2");
    }

    #[tokio::test]
    async fn graceful_disconnect_drains_before_closing() {
        let mut client: ServiceClient<&'static str, &'static str, MockIoController<&'static str>> =
            ServiceClient::new(ClientConfig::default());
        client.connect().unwrap();
        client.connected(MockIoController::default());
        let f1 = client.send("q1");
        settle(&mut client).await;

        client.graceful_disconnect();
        assert_eq!(client.state(), State::Draining);

        client.process_response("s1").unwrap();
        assert_eq!(client.state(), State::Closed);
        assert_eq!(f1.await.unwrap(), "s1");
    }

    #[tokio::test]
    async fn reconnect_bound_stops_after_max_attempts() {
        let config = ClientConfig {
            connection_attempts: crate::client::config::ReconnectPolicy {
                interval: Duration::from_millis(1),
                max_attempts: Some(2),
            },
            ..ClientConfig::default()
        };
        let mut client: ServiceClient<&'static str, &'static str, MockIoController<&'static str>> =
            ServiceClient::new(config);
        client.connect().unwrap();
        client.connected(MockIoController::default());

        client.connection_failed();
        assert_eq!(client.state(), State::Reconnecting);
        client.connected(MockIoController::default());
        client.connection_failed();
        assert_eq!(client.state(), State::Reconnecting);
        client.connected(MockIoController::default());
        client.connection_failed();
        assert_eq!(client.state(), State::Failed);
    }
}
