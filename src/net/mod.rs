//! TCP surface: line protocol parsing and the listener/worker pool.

pub mod listener;
pub mod protocol;

pub use listener::{BrokerServer, ServerConfig, ServerHandle};
pub use protocol::{ProtocolError, Request};
