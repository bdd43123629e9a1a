//! The server half of the pipelining engine (§4.1): accepts decoded
//! requests on a single connection, dispatches them to a user-supplied
//! [`ServiceHandler`], and writes responses back in the order the requests
//! arrived, regardless of completion order.

mod config;
mod dispatch;
mod handler;
mod promise;

pub use config::ServerConfig;
pub use dispatch::{ServiceServer, State};
pub use handler::ServiceHandler;
