//! The client half of the pipelining engine (§4.2): sends requests on a
//! single connection and correlates incoming responses with outstanding
//! handlers by FIFO order, reconnecting with bounded retry on loss.

mod config;
mod dispatch;
mod sent;

pub use config::{ClientConfig, ReconnectPolicy};
pub use dispatch::{ResponseFuture, ServiceClient, SharedSender, State};
