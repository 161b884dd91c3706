//! In-memory `GraphStore` used by unit and integration tests.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::store::graph::{
    GraphConsumer, GraphConsumerGroup, GraphError, GraphPartition, GraphStore, GraphTopic,
    PublishesEdge,
};

#[derive(Default)]
struct GraphState {
    topics: BTreeMap<String, i64>,
    producers: BTreeSet<String>,
    consumers: BTreeMap<String, Option<String>>,
    publishes: BTreeMap<(String, String), i64>,
    subscribes: BTreeSet<(String, String)>,
    partitions: BTreeMap<String, GraphPartition>,
    consumer_groups: BTreeMap<String, i64>,
}

/// Graph store backed by plain maps. `fail_writes` / `fail_producer_reads`
/// simulate an unreachable store for skip-and-retry and partial-failure
/// tests.
#[derive(Default)]
pub struct MemoryGraphStore {
    state: Mutex<GraphState>,
    fail_writes: AtomicBool,
    fail_producer_reads: AtomicBool,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_producer_reads(&self, fail: bool) {
        self.fail_producer_reads.store(fail, Ordering::SeqCst);
    }

    pub fn insert_partition(&self, id: &str, topic: &str, leader: Option<&str>, replicas: i64) {
        let mut state = self.state.lock().unwrap();
        state.partitions.insert(
            id.to_string(),
            GraphPartition {
                id: id.to_string(),
                topic: topic.to_string(),
                leader: leader.map(str::to_string),
                replicas,
            },
        );
    }

    pub fn insert_consumer_group(&self, id: &str, member_count: i64) {
        let mut state = self.state.lock().unwrap();
        state.consumer_groups.insert(id.to_string(), member_count);
    }

    pub fn subscription_count(&self) -> usize {
        self.state.lock().unwrap().subscribes.len()
    }

    fn check_writes(&self) -> Result<(), GraphError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(GraphError::Unavailable("simulated outage".to_string()))
        } else {
            Ok(())
        }
    }
}

impl GraphStore for MemoryGraphStore {
    fn ensure_constraints(&self) -> Result<(), GraphError> {
        self.check_writes()
    }

    fn upsert_topic(&self, name: &str, message_count: i64, _now_ms: i64) -> Result<(), GraphError> {
        self.check_writes()?;
        let mut state = self.state.lock().unwrap();
        state.topics.insert(name.to_string(), message_count);
        Ok(())
    }

    fn upsert_producer(&self, id: &str, _now_ms: i64) -> Result<(), GraphError> {
        self.check_writes()?;
        let mut state = self.state.lock().unwrap();
        state.producers.insert(id.to_string());
        Ok(())
    }

    fn upsert_consumer(&self, id: &str, _now_ms: i64) -> Result<(), GraphError> {
        self.check_writes()?;
        let mut state = self.state.lock().unwrap();
        state.consumers.entry(id.to_string()).or_insert(None);
        Ok(())
    }

    fn merge_publishes_to(
        &self,
        producer_id: &str,
        topic: &str,
        message_count: i64,
        _now_ms: i64,
    ) -> Result<(), GraphError> {
        self.check_writes()?;
        let mut state = self.state.lock().unwrap();
        state
            .publishes
            .insert((producer_id.to_string(), topic.to_string()), message_count);
        Ok(())
    }

    fn merge_subscribes_to(
        &self,
        consumer_id: &str,
        topic: &str,
        _now_ms: i64,
    ) -> Result<(), GraphError> {
        self.check_writes()?;
        let mut state = self.state.lock().unwrap();
        state.topics.entry(topic.to_string()).or_insert(0);
        state
            .subscribes
            .insert((consumer_id.to_string(), topic.to_string()));
        Ok(())
    }

    fn topics(&self) -> Result<Vec<GraphTopic>, GraphError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .topics
            .iter()
            .map(|(name, count)| GraphTopic {
                name: name.clone(),
                message_count: *count,
            })
            .collect())
    }

    fn producers(&self) -> Result<Vec<String>, GraphError> {
        if self.fail_producer_reads.load(Ordering::SeqCst) {
            return Err(GraphError::Unavailable("simulated outage".to_string()));
        }
        let state = self.state.lock().unwrap();
        Ok(state.producers.iter().cloned().collect())
    }

    fn consumers(&self) -> Result<Vec<GraphConsumer>, GraphError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .consumers
            .iter()
            .map(|(id, group)| GraphConsumer {
                id: id.clone(),
                group: group.clone(),
            })
            .collect())
    }

    fn partitions(&self) -> Result<Vec<GraphPartition>, GraphError> {
        let state = self.state.lock().unwrap();
        Ok(state.partitions.values().cloned().collect())
    }

    fn consumer_groups(&self) -> Result<Vec<GraphConsumerGroup>, GraphError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .consumer_groups
            .iter()
            .map(|(id, member_count)| GraphConsumerGroup {
                id: id.clone(),
                member_count: *member_count,
            })
            .collect())
    }

    fn publishes_edges(&self) -> Result<Vec<PublishesEdge>, GraphError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .publishes
            .iter()
            .map(|((producer_id, topic), count)| PublishesEdge {
                producer_id: producer_id.clone(),
                topic: topic.clone(),
                message_count: *count,
            })
            .collect())
    }
}
