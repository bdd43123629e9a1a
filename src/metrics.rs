//! Pluggable metrics sink consumed by the server and client cores.
//!
//! The core never talks to a concrete metrics backend directly; it emits
//! through a [`MetricsSink`] implementation supplied by the embedding
//! framework. A no-op default is provided for when metrics aren't wired up.

/// Key/value tag attached to a metric observation.
pub type Tag = (&'static str, String);

/// Sink for the three metric shapes the core emits.
///
/// All methods have no-op default implementations so that a consumer only
/// needs to override the ones it cares about. `Sync` is required because
/// the server's write-completion callback captures an `Arc<Metrics<S>>`
/// inside a `Send` closure handed to the I/O controller.
pub trait MetricsSink: Send + Sync + 'static {
    /// Increment a named rate/counter-like metric by one occurrence.
    fn rate(&self, _name: &str, _tags: &[Tag]) {}

    /// Record an observation (e.g. latency in milliseconds) into a named
    /// histogram.
    fn histogram(&self, _name: &str, _value: f64, _tags: &[Tag]) {}

    /// Set/record a named counter to an absolute value.
    fn counter(&self, _name: &str, _value: i64, _tags: &[Tag]) {}
}

/// A `MetricsSink` that discards every observation.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl MetricsSink for NoopSink {}

/// Thin handle that prefixes every metric name with the configured `name`
/// before forwarding to the injected sink.
pub(crate) struct Metrics<S> {
    prefix: String,
    sink: S,
}

impl<S: MetricsSink> Metrics<S> {
    pub(crate) fn new(prefix: impl Into<String>, sink: S) -> Self {
        Metrics {
            prefix: prefix.into(),
            sink,
        }
    }

    fn full(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", self.prefix, name)
        }
    }

    pub(crate) fn rate(&self, name: &str, tags: &[Tag]) {
        self.sink.rate(&self.full(name), tags);
    }

    pub(crate) fn histogram(&self, name: &str, value: f64, tags: &[Tag]) {
        self.sink.histogram(&self.full(name), value, tags);
    }

    pub(crate) fn counter(&self, name: &str, value: i64, tags: &[Tag]) {
        self.sink.counter(&self.full(name), value, tags);
    }
}
