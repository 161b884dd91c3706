//! Forward replication: periodic projection of primary-store aggregates
//! into the analytics store and the graph store.
//!
//! Each job runs on its own ticker thread. A tick that cannot reach its
//! target store is skipped; the next tick is the retry. Nothing is ever
//! surfaced to ingestion clients.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{RecvTimeoutError, Sender, bounded};

use super::SyncError;
use super::seed;
use crate::store::graph::GraphStore;
use crate::store::primary::PrimaryStore;
use crate::store::{AnalyticsStore, now_ms};

/// Cancellable periodic job handle. Stopping drops the channel sender,
/// which wakes the ticker thread immediately; the thread is then joined,
/// so shutdown is deterministic.
pub struct TickerHandle {
    stop_tx: Sender<()>,
    join: JoinHandle<()>,
}

impl TickerHandle {
    pub fn stop(self) {
        drop(self.stop_tx);
        let _ = self.join.join();
    }
}

/// Spawn a named ticker thread running `tick` every `interval`. The first
/// tick fires immediately.
pub fn spawn_ticker<F>(name: &str, interval: Duration, tick: F) -> std::io::Result<TickerHandle>
where
    F: Fn(i64) + Send + 'static,
{
    let (stop_tx, stop_rx) = bounded::<()>(0);
    let join = thread::Builder::new().name(name.to_string()).spawn(move || {
        tick(now_ms());
        loop {
            match stop_rx.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => tick(now_ms()),
                Err(RecvTimeoutError::Disconnected) => break,
                Ok(()) => break,
            }
        }
    })?;
    Ok(TickerHandle { stop_tx, join })
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AnalyticsSyncReport {
    pub producer_topic_stats: usize,
    pub topics: usize,
}

/// Projects per-(producer, topic) and per-topic counts into the analytics
/// store. Idempotent: unchanged primary data only refreshes timestamps.
pub struct AnalyticsSyncJob {
    primary: PrimaryStore,
    analytics: AnalyticsStore,
}

impl AnalyticsSyncJob {
    pub fn new(primary: PrimaryStore, analytics: AnalyticsStore) -> Self {
        Self { primary, analytics }
    }

    pub fn run_once(&self, now_ms: i64) -> Result<AnalyticsSyncReport, SyncError> {
        let mut report = AnalyticsSyncReport::default();

        for stat in self.primary.producer_topic_counts()? {
            self.analytics.upsert_producer_topic_stat(
                &stat.producer_id,
                &stat.topic,
                stat.count,
                now_ms,
            )?;
            report.producer_topic_stats += 1;
        }
        for topic in self.primary.topic_counts()? {
            self.analytics
                .upsert_topic_count(&topic.topic, topic.count, now_ms)?;
            report.topics += 1;
        }
        Ok(report)
    }

    /// One scheduled tick. Failures are swallowed; the next tick retries.
    pub fn tick(&self, now_ms: i64) {
        match self.run_once(now_ms) {
            Ok(report) if report.producer_topic_stats > 0 => {
                tracing::debug!(
                    stats = report.producer_topic_stats,
                    topics = report.topics,
                    "analytics sync applied"
                );
            }
            Ok(_) => {}
            Err(err) => tracing::debug!("analytics sync skipped: {err}"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GraphSyncReport {
    pub topics: usize,
    pub producers: usize,
    pub publish_edges: usize,
    pub consumers: usize,
    pub subscriptions: usize,
}

/// Projects topics, producers and publish edges into the graph store and
/// re-applies the synthetic consumer catalog.
pub struct GraphSyncJob {
    primary: PrimaryStore,
    graph: Arc<dyn GraphStore>,
}

impl GraphSyncJob {
    pub fn new(primary: PrimaryStore, graph: Arc<dyn GraphStore>) -> Self {
        Self { primary, graph }
    }

    pub fn run_once(&self, now_ms: i64) -> Result<GraphSyncReport, SyncError> {
        let mut report = GraphSyncReport::default();

        for topic in self.primary.topic_counts()? {
            self.graph.upsert_topic(&topic.topic, topic.count, now_ms)?;
            report.topics += 1;
        }
        for producer in self.primary.distinct_producers()? {
            self.graph.upsert_producer(&producer, now_ms)?;
            report.producers += 1;
        }
        for stat in self.primary.producer_topic_counts()? {
            self.graph
                .merge_publishes_to(&stat.producer_id, &stat.topic, stat.count, now_ms)?;
            report.publish_edges += 1;
        }

        // Fixed demo fixtures, re-seeded on every tick regardless of
        // message volume.
        for consumer in &seed::SAMPLE_CONSUMERS {
            self.graph.upsert_consumer(consumer, now_ms)?;
            report.consumers += 1;
        }
        for (consumer, topic) in seed::subscriptions() {
            self.graph.merge_subscribes_to(consumer, topic, now_ms)?;
            report.subscriptions += 1;
        }
        Ok(report)
    }

    /// One scheduled tick. Failures are swallowed; the next tick retries.
    pub fn tick(&self, now_ms: i64) {
        match self.run_once(now_ms) {
            Ok(report) if report.topics > 0 => {
                tracing::debug!(
                    topics = report.topics,
                    producers = report.producers,
                    edges = report.publish_edges,
                    "graph sync applied"
                );
            }
            Ok(_) => {}
            Err(err) => tracing::debug!("graph sync skipped: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::test_support::MemoryGraphStore;

    fn temp_stores() -> (tempfile::TempDir, PrimaryStore, AnalyticsStore) {
        let dir = tempfile::tempdir().unwrap();
        let primary = PrimaryStore::open(&dir.path().join("primary.db"), 4).unwrap();
        let analytics = AnalyticsStore::open(&dir.path().join("analytics.db"), 4).unwrap();
        (dir, primary, analytics)
    }

    #[test]
    fn analytics_sync_matches_primary_counts() {
        let (_dir, primary, analytics) = temp_stores();
        primary.append_message("a", Some("p1"), "x", 1).unwrap();
        primary.append_message("a", Some("p1"), "y", 2).unwrap();
        primary.append_message("b", Some("p2"), "z", 3).unwrap();

        let job = AnalyticsSyncJob::new(primary.clone(), analytics.clone());
        let report = job.run_once(100).unwrap();
        assert_eq!(report.topics, 2);
        assert_eq!(report.producer_topic_stats, 2);

        let expected = primary.topic_counts().unwrap();
        let mut synced = analytics.topics_with_counts().unwrap();
        synced.sort_by(|a, b| a.topic.cmp(&b.topic));
        assert_eq!(synced, expected);
    }

    #[test]
    fn analytics_sync_rerun_is_idempotent() {
        let (_dir, primary, analytics) = temp_stores();
        primary.append_message("a", Some("p1"), "x", 1).unwrap();

        let job = AnalyticsSyncJob::new(primary, analytics.clone());
        job.run_once(100).unwrap();
        let first = (
            analytics.topics_with_counts().unwrap(),
            analytics.producer_topic_stats().unwrap(),
        );
        job.run_once(100).unwrap();
        let second = (
            analytics.topics_with_counts().unwrap(),
            analytics.producer_topic_stats().unwrap(),
        );
        assert_eq!(first, second);
    }

    #[test]
    fn graph_sync_projects_aggregates_and_seeds_fixtures() {
        let (_dir, primary, _analytics) = temp_stores();
        primary.append_message("a", Some("p1"), "x", 1).unwrap();
        primary.append_message("a", Some("p2"), "y", 2).unwrap();

        let graph = Arc::new(MemoryGraphStore::new());
        let job = GraphSyncJob::new(primary, Arc::clone(&graph) as Arc<dyn GraphStore>);
        let report = job.run_once(100).unwrap();

        assert_eq!(report.topics, 1);
        assert_eq!(report.producers, 2);
        assert_eq!(report.publish_edges, 2);
        assert_eq!(report.consumers, seed::SAMPLE_CONSUMERS.len());

        let topics = graph.topics().unwrap();
        assert!(topics.iter().any(|t| t.name == "a" && t.message_count == 2));
        assert_eq!(graph.producers().unwrap(), vec!["p1", "p2"]);
        assert_eq!(graph.consumers().unwrap().len(), seed::SAMPLE_CONSUMERS.len());

        // Re-running converges instead of duplicating.
        job.run_once(200).unwrap();
        assert_eq!(graph.consumers().unwrap().len(), seed::SAMPLE_CONSUMERS.len());
    }

    #[test]
    fn unreachable_graph_skips_tick_without_panic() {
        let (_dir, primary, _analytics) = temp_stores();
        primary.append_message("a", Some("p1"), "x", 1).unwrap();

        let graph = Arc::new(MemoryGraphStore::new());
        graph.fail_writes(true);
        let job = GraphSyncJob::new(primary, Arc::clone(&graph) as Arc<dyn GraphStore>);

        assert!(job.run_once(100).is_err());
        // tick() swallows the failure.
        job.tick(100);

        // Store recovers; the next tick succeeds.
        graph.fail_writes(false);
        assert!(job.run_once(200).is_ok());
    }

    #[test]
    fn ticker_runs_and_stops() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let ticker = spawn_ticker("test-ticker", Duration::from_millis(10), move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        thread::sleep(Duration::from_millis(50));
        ticker.stop();
        let ticks = count.load(Ordering::SeqCst);
        assert!(ticks >= 2, "expected several ticks, got {ticks}");

        // No further ticks after stop.
        thread::sleep(Duration::from_millis(30));
        assert_eq!(count.load(Ordering::SeqCst), ticks);
    }
}
