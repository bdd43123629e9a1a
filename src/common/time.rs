use std::sync::OnceLock;
use std::time::Instant;

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Monotonic milliseconds since this process first asked for the time.
///
/// Promises and `SourcedRequest`s stamp their creation/start time with this
/// so that timeout and latency math is immune to wall-clock adjustments.
pub(crate) fn now_ms() -> i64 {
    let epoch = EPOCH.get_or_init(Instant::now);
    epoch.elapsed().as_millis() as i64
}
