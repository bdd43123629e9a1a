use std::time::Duration;

/// Bounded retry policy for connect/reconnect (§4.2 `connectionAttempts`).
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Delay between a disconnect and the next reconnect attempt.
    pub interval: Duration,
    /// Maximum number of reconnect attempts. `None` means unbounded.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        ReconnectPolicy {
            interval: Duration::from_secs(1),
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    /// Returns `true` once `attempts` has exhausted this policy's retry
    /// budget (§9 "Open Question — `isExpended` polarity": resolved in
    /// favor of the name, so a reconnect is attempted exactly while this
    /// returns `false`).
    pub fn is_expended(&self, attempts: u32) -> bool {
        match self.max_attempts {
            Some(max) => attempts >= max,
            None => false,
        }
    }
}

/// Configuration for a [`crate::client::ServiceClient`] (§4.2, §6.4).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// The remote endpoint this client connects to. Opaque to the core;
    /// interpreted only by whatever external connector dials it.
    pub address: String,
    /// Per-request timeout. Enforced by the controller's pending-buffer
    /// cancellation mechanism, not by a client-side idle sweep (§9).
    pub request_timeout: Duration,
    /// Prefix used for every metric this client emits.
    pub name: String,
    /// Hard cap on total outstanding requests (written or not); beyond
    /// this, `send` is refused with `ClientOverloaded`.
    pub pending_buffer_size: usize,
    /// Soft cap on the sent queue; once reached, further writes are
    /// paused until the queue drains back below it.
    pub sent_buffer_size: usize,
    /// When `true`, a `send` while disconnected fails immediately rather
    /// than waiting in the pre-connect holding area for a connection.
    pub fail_fast: bool,
    /// Retry policy governing reconnect attempts.
    pub connection_attempts: ReconnectPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            address: String::new(),
            request_timeout: Duration::from_secs(30),
            name: String::new(),
            pending_buffer_size: 100,
            sent_buffer_size: 20,
            fail_fast: false,
            connection_attempts: ReconnectPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// A config pointed at `address` with an otherwise-default policy.
    pub fn new(address: impl Into<String>) -> Self {
        ClientConfig {
            address: address.into(),
            ..ClientConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.pending_buffer_size, 100);
        assert_eq!(cfg.sent_buffer_size, 20);
        assert!(!cfg.fail_fast);
    }

    #[test]
    fn is_expended_matches_name_not_source_polarity() {
        let unbounded = ReconnectPolicy {
            interval: Duration::from_millis(1),
            max_attempts: None,
        };
        assert!(!unbounded.is_expended(1_000_000));

        let bounded = ReconnectPolicy {
            interval: Duration::from_millis(1),
            max_attempts: Some(3),
        };
        assert!(!bounded.is_expended(0));
        assert!(!bounded.is_expended(2));
        assert!(bounded.is_expended(3));
        assert!(bounded.is_expended(4));
    }
}
