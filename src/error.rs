//! Error and Result module.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

/// Result type returned from methods in this crate that can fail.
pub type Result<T> = std::result::Result<T, Error>;

type Cause = Arc<dyn StdError + Send + Sync>;

/// Opaque error type covering every failure this crate's core can produce.
///
/// The cause is reference-counted rather than uniquely boxed: fail-fast and
/// purge paths in [`crate::client`] hand the *same* cause to several
/// outstanding request handlers at once.
pub struct Error {
    inner: Box<ErrorImpl>,
}

struct ErrorImpl {
    kind: Kind,
    cause: Option<Cause>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Kind {
    /// Request exceeded `requestTimeout`.
    Timeout,
    /// Server promise queue was at capacity; request rejected.
    Overloaded,
    /// Client send refused because the pending buffer (or pre-connect
    /// holding area) was full.
    ClientOverloaded,
    /// Attempted to send while not connected, or after graceful disconnect
    /// began.
    NotConnected,
    /// Request was in flight when the connection dropped.
    ConnectionLost,
    /// `connect()` called on a terminally-disconnected client.
    StaleClient,
    /// Protocol desynchronization: a response arrived with no outstanding
    /// request to match it against.
    Data,
    /// Error returned by user-provided request processing.
    User,
}

impl Kind {
    /// Tag name for this kind, used for metrics tagging and `handleFailure`.
    /// Matches the variant name with non-alphanumerics stripped (there are
    /// none in these names, so this is the identity).
    pub(crate) fn tag(self) -> &'static str {
        match self {
            Kind::Timeout => "Timeout",
            Kind::Overloaded => "Overloaded",
            Kind::ClientOverloaded => "ClientOverloaded",
            Kind::NotConnected => "NotConnected",
            Kind::ConnectionLost => "ConnectionLost",
            Kind::StaleClient => "StaleClient",
            Kind::Data => "Data",
            Kind::User => "User",
        }
    }

    fn description(self) -> &'static str {
        match self {
            Kind::Timeout => "request exceeded its timeout",
            Kind::Overloaded => "request queue overloaded",
            Kind::ClientOverloaded => "client request buffer overloaded",
            Kind::NotConnected => "not connected",
            Kind::ConnectionLost => "connection lost while request was in transit",
            Kind::StaleClient => "client has been manually disconnected",
            Kind::Data => "protocol desynchronization",
            Kind::User => "error from user request processing",
        }
    }
}

impl Error {
    pub(crate) fn new(kind: Kind) -> Error {
        Error {
            inner: Box::new(ErrorImpl { kind, cause: None }),
        }
    }

    pub(crate) fn with<C: Into<Cause>>(mut self, cause: C) -> Error {
        self.inner.cause = Some(cause.into());
        self
    }

    pub(crate) fn kind(&self) -> Kind {
        self.inner.kind
    }

    pub(crate) fn new_timeout() -> Error {
        Error::new(Kind::Timeout)
    }

    pub(crate) fn new_overloaded() -> Error {
        Error::new(Kind::Overloaded)
    }

    pub(crate) fn new_client_overloaded() -> Error {
        Error::new(Kind::ClientOverloaded)
    }

    pub(crate) fn new_not_connected() -> Error {
        Error::new(Kind::NotConnected)
    }

    pub(crate) fn new_not_connected_with<C: Into<Cause>>(cause: C) -> Error {
        Error::new(Kind::NotConnected).with(cause)
    }

    pub(crate) fn new_connection_lost() -> Error {
        Error::new(Kind::ConnectionLost)
    }

    pub(crate) fn new_stale_client() -> Error {
        Error::new(Kind::StaleClient)
    }

    pub(crate) fn new_data() -> Error {
        Error::new(Kind::Data)
    }

    pub(crate) fn new_user<C: Into<Cause>>(cause: C) -> Error {
        Error::new(Kind::User).with(cause)
    }

    /// Returns true if this error was caused by a request timing out.
    pub fn is_timeout(&self) -> bool {
        self.inner.kind == Kind::Timeout
    }

    /// Returns true if this error is an overload rejection (server or
    /// client side).
    pub fn is_overloaded(&self) -> bool {
        matches!(self.inner.kind, Kind::Overloaded | Kind::ClientOverloaded)
    }

    /// Returns true if this error means the connection was not, or is no
    /// longer, usable.
    pub fn is_not_connected(&self) -> bool {
        self.inner.kind == Kind::NotConnected
    }

    /// Returns true if the request was in flight when the connection was
    /// lost.
    pub fn is_connection_lost(&self) -> bool {
        self.inner.kind == Kind::ConnectionLost
    }

    /// Returns true if this was a reconnect attempt on a terminally
    /// disconnected client.
    pub fn is_stale_client(&self) -> bool {
        self.inner.kind == Kind::StaleClient
    }

    /// Returns true if this indicates a protocol desynchronization.
    pub fn is_data(&self) -> bool {
        self.inner.kind == Kind::Data
    }

    /// Returns true if this error originated from user request-processing
    /// code.
    pub fn is_user(&self) -> bool {
        self.inner.kind == Kind::User
    }

    /// The underlying cause, if one was attached.
    pub fn cause(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.inner.cause.as_deref()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref cause) = self.inner.cause {
            write!(f, "{}: {}", self.inner.kind.description(), cause)
        } else {
            f.write_str(self.inner.kind.description())
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Error")
            .field("kind", &self.inner.kind)
            .field("cause", &self.inner.cause)
            .finish()
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner
            .cause
            .as_ref()
            .map(|cause| &**cause as &(dyn StdError + 'static))
    }
}
