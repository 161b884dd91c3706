#![forbid(unsafe_code)]

//! Streamhub: a single-node topic broker.
//!
//! Clients publish and consume topic-addressed messages over a newline-
//! delimited TCP protocol. Every message lands in the primary store; two
//! periodic jobs project aggregates of that store into an analytics store
//! and a graph store, and an on-demand job rebuilds the analytics store
//! from the graph store.

pub mod broker;
pub mod cli;
pub mod config;
pub mod error;
pub mod net;
pub mod store;
pub mod sync;
pub mod telemetry;

// Test utilities shared by unit and integration tests.
pub mod test_support;

pub use error::{Error, Result};
