//! Replication pipeline: periodic forward sync into the secondary stores
//! and the on-demand reverse rebuild of the analytics store.

use thiserror::Error;

pub mod forward;
pub mod reverse;
pub mod seed;

pub use forward::{AnalyticsSyncJob, GraphSyncJob, TickerHandle, spawn_ticker};
pub use reverse::{ReverseSyncReport, run_reverse_sync};

use crate::store::StoreError;
use crate::store::graph::GraphError;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("graph error: {0}")]
    Graph(#[from] GraphError),
    /// The reverse sync aborted after clearing the analytics store; the
    /// derived tables are partially empty until the job is re-run.
    #[error("reverse sync aborted at stage {stage}: {source}")]
    Partial {
        stage: &'static str,
        #[source]
        source: Box<SyncError>,
    },
}
