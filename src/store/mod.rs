//! Store gateways: the primary message log, the analytics mirror, and the
//! graph store client.

use std::time::{SystemTime, UNIX_EPOCH};

pub mod analytics;
pub mod graph;
pub mod pool;
pub mod primary;

pub use analytics::AnalyticsStore;
pub use pool::{PooledConnection, SqlitePool, StoreError};
pub use primary::PrimaryStore;

/// Wall clock in unix milliseconds. All persisted timestamps use this.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
