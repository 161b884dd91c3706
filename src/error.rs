//! Top-level error type for the CLI surface.

use thiserror::Error;

use crate::config::ConfigError;
use crate::store::StoreError;
use crate::store::graph::GraphError;
use crate::sync::SyncError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("graph store error: {0}")]
    Graph(#[from] GraphError),
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),
}

pub type Result<T> = std::result::Result<T, Error>;
