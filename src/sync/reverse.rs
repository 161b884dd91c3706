//! Reverse sync: on-demand full rebuild of the analytics store from the
//! graph store's current contents.
//!
//! Clear-then-insert, not transactional. A failure after the clear leaves
//! the analytics store partially empty; the caller must be able to tell a
//! half-applied refresh from a completed one, so failures carry the stage
//! they died in and are logged distinctly. Re-running is always safe.

use std::fmt;

use super::SyncError;
use crate::store::AnalyticsStore;
use crate::store::graph::GraphStore;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReverseSyncReport {
    pub topics: usize,
    pub producers: usize,
    pub consumers: usize,
    pub partitions: usize,
    pub consumer_groups: usize,
    pub publish_edges: usize,
}

impl fmt::Display for ReverseSyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "topics={} producers={} consumers={} partitions={} groups={} edges={}",
            self.topics,
            self.producers,
            self.consumers,
            self.partitions,
            self.consumer_groups,
            self.publish_edges
        )
    }
}

/// Rebuild every derived analytics table from the graph store.
pub fn run_reverse_sync(
    graph: &dyn GraphStore,
    analytics: &AnalyticsStore,
    now_ms: i64,
) -> Result<ReverseSyncReport, SyncError> {
    let mut report = ReverseSyncReport::default();

    analytics
        .clear_derived_tables()
        .map_err(|err| partial("clear", err.into()))?;

    let topics = graph.topics().map_err(|err| partial("topics", err.into()))?;
    for topic in &topics {
        analytics
            .upsert_topic_count(&topic.name, topic.message_count, now_ms)
            .map_err(|err| partial("topics", err.into()))?;
        report.topics += 1;
    }

    let producers = graph
        .producers()
        .map_err(|err| partial("producers", err.into()))?;
    for producer in &producers {
        analytics
            .upsert_producer(producer, now_ms)
            .map_err(|err| partial("producers", err.into()))?;
        report.producers += 1;
    }

    let consumers = graph
        .consumers()
        .map_err(|err| partial("consumers", err.into()))?;
    for consumer in &consumers {
        analytics
            .upsert_consumer(&consumer.id, consumer.group.as_deref(), now_ms)
            .map_err(|err| partial("consumers", err.into()))?;
        report.consumers += 1;
    }

    let partitions = graph
        .partitions()
        .map_err(|err| partial("partitions", err.into()))?;
    for partition in &partitions {
        analytics
            .upsert_partition(
                &partition.id,
                &partition.topic,
                partition.leader.as_deref(),
                partition.replicas,
                now_ms,
            )
            .map_err(|err| partial("partitions", err.into()))?;
        report.partitions += 1;
    }

    let groups = graph
        .consumer_groups()
        .map_err(|err| partial("consumer_groups", err.into()))?;
    for group in &groups {
        analytics
            .upsert_consumer_group(&group.id, group.member_count, now_ms)
            .map_err(|err| partial("consumer_groups", err.into()))?;
        report.consumer_groups += 1;
    }

    let edges = graph
        .publishes_edges()
        .map_err(|err| partial("publish_edges", err.into()))?;
    for edge in &edges {
        analytics
            .upsert_producer_topic_stat(&edge.producer_id, &edge.topic, edge.message_count, now_ms)
            .map_err(|err| partial("publish_edges", err.into()))?;
        report.publish_edges += 1;
    }

    tracing::info!(%report, "reverse sync completed");
    Ok(report)
}

fn partial(stage: &'static str, source: SyncError) -> SyncError {
    SyncError::Partial {
        stage,
        source: Box::new(source),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MemoryGraphStore;

    fn temp_analytics() -> (tempfile::TempDir, AnalyticsStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = AnalyticsStore::open(&dir.path().join("analytics.db"), 4).unwrap();
        (dir, store)
    }

    fn populated_graph() -> MemoryGraphStore {
        let graph = MemoryGraphStore::new();
        graph.upsert_topic("orders", 5, 0).unwrap();
        graph.upsert_topic("logs", 2, 0).unwrap();
        graph.upsert_producer("p1", 0).unwrap();
        graph.upsert_consumer("dashboard", 0).unwrap();
        graph.merge_publishes_to("p1", "orders", 5, 0).unwrap();
        graph.insert_partition("part-0", "orders", Some("n1"), 3);
        graph.insert_consumer_group("readers", 2);
        graph
    }

    #[test]
    fn rebuild_populates_every_table() {
        let (_dir, analytics) = temp_analytics();
        let graph = populated_graph();

        // Stale rows that the clear step must remove.
        analytics.upsert_topic_count("stale", 99, 0).unwrap();
        analytics.upsert_producer("stale-producer", 0).unwrap();

        let report = run_reverse_sync(&graph, &analytics, 100).unwrap();
        assert_eq!(
            report,
            ReverseSyncReport {
                topics: 2,
                producers: 1,
                consumers: 1,
                partitions: 1,
                consumer_groups: 1,
                publish_edges: 1,
            }
        );

        let topics = analytics.topics_with_counts().unwrap();
        assert_eq!(topics.len(), 2);
        assert!(!topics.iter().any(|t| t.topic == "stale"));
        assert_eq!(analytics.producers().unwrap(), vec!["p1"]);
        assert_eq!(analytics.partitions().unwrap()[0].partition_id, "part-0");
        assert_eq!(analytics.consumer_groups().unwrap()[0].member_count, 2);
    }

    #[test]
    fn rerun_with_unchanged_graph_is_idempotent() {
        let (_dir, analytics) = temp_analytics();
        let graph = populated_graph();

        run_reverse_sync(&graph, &analytics, 100).unwrap();
        let first = (
            analytics.topics_with_counts().unwrap(),
            analytics.producers().unwrap(),
            analytics.consumers().unwrap(),
            analytics.partitions().unwrap(),
            analytics.consumer_groups().unwrap(),
            analytics.producer_topic_stats().unwrap(),
        );

        run_reverse_sync(&graph, &analytics, 100).unwrap();
        let second = (
            analytics.topics_with_counts().unwrap(),
            analytics.producers().unwrap(),
            analytics.consumers().unwrap(),
            analytics.partitions().unwrap(),
            analytics.consumer_groups().unwrap(),
            analytics.producer_topic_stats().unwrap(),
        );
        assert_eq!(first, second);
    }

    #[test]
    fn failure_after_clear_reports_stage_and_leaves_partial_state() {
        let (_dir, analytics) = temp_analytics();
        let graph = populated_graph();
        graph.fail_producer_reads(true);

        analytics.upsert_consumer("stale", None, 0).unwrap();

        let err = run_reverse_sync(&graph, &analytics, 100).unwrap_err();
        match err {
            SyncError::Partial { stage, .. } => assert_eq!(stage, "producers"),
            other => panic!("expected partial failure, got {other}"),
        }

        // Cleared, then only the topics stage was applied before the abort.
        assert!(analytics.consumers().unwrap().is_empty());
        assert_eq!(analytics.topics_with_counts().unwrap().len(), 2);
        assert!(analytics.producers().unwrap().is_empty());

        // Re-running after recovery completes the rebuild.
        graph.fail_producer_reads(false);
        let report = run_reverse_sync(&graph, &analytics, 100).unwrap();
        assert_eq!(report.producers, 1);
        assert_eq!(analytics.consumers().unwrap().len(), 1);
    }
}
