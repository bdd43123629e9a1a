#![deny(missing_docs)]
#![deny(missing_debug_implementations)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! # pipeline-proto
//!
//! The core of a per-connection request/response pipelining engine for a
//! non-blocking network framework.
//!
//! Two peer components live here: [`server::ServiceServer`] accepts
//! decoded requests on a single connection, dispatches them to a
//! user-supplied handler, and writes responses back in the order the
//! requests arrived, independent of completion order; [`client::ServiceClient`]
//! sends requests on a single connection and correlates incoming responses
//! with outstanding handlers by FIFO order, reconnecting with bounded retry
//! on loss.
//!
//! Both halves are codec-agnostic: they compose with an external
//! framing/parsing layer through the [`io::IoController`] trait, and with
//! an external event loop through the [`worker::Worker`] trait. Neither is
//! thread-safe on its own — each instance is confined to the single worker
//! that owns it — but [`client::ServiceClient::shared`] exposes a
//! thread-safe façade for posting requests from off-worker code.
//!
//! ## Feature flags
//!
//! - `server`: enables [`mod@server`].
//! - `client`: enables [`mod@client`].
//! - `full`: enables both.
//!
//! Enable whichever side(s) your framework actually needs; there is no
//! default feature.

#[macro_use]
mod cfg;

pub mod error;
pub mod io;
pub mod metrics;
pub mod worker;

mod common;

pub use crate::error::{Error, Result};

cfg_server! {
    pub mod server;
}

cfg_client! {
    pub mod client;
}
