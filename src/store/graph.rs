//! Graph store client.
//!
//! Talks to a Neo4j-compatible server over the HTTP transactional Cypher
//! endpoint (`POST /db/{name}/tx/commit`). The `GraphStore` trait is the
//! seam the sync jobs depend on; tests substitute an in-memory
//! implementation.

use std::time::Duration;

use base64::Engine;
use serde_json::{Value, json};
use thiserror::Error;

use crate::config::GraphSection;

const REQUEST_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("graph store unavailable: {0}")]
    Unavailable(String),
    #[error("graph store rejected statement: {code}: {message}")]
    Server { code: String, message: String },
    #[error("graph response decode failed: {0}")]
    Decode(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GraphTopic {
    pub name: String,
    pub message_count: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GraphConsumer {
    pub id: String,
    pub group: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GraphPartition {
    pub id: String,
    pub topic: String,
    pub leader: Option<String>,
    pub replicas: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GraphConsumerGroup {
    pub id: String,
    pub member_count: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublishesEdge {
    pub producer_id: String,
    pub topic: String,
    pub message_count: i64,
}

/// Write and read operations the replication jobs need from the graph
/// store. Writes are upserts keyed on the node's unique property.
pub trait GraphStore: Send + Sync {
    fn ensure_constraints(&self) -> Result<(), GraphError>;

    fn upsert_topic(&self, name: &str, message_count: i64, now_ms: i64) -> Result<(), GraphError>;
    fn upsert_producer(&self, id: &str, now_ms: i64) -> Result<(), GraphError>;
    fn upsert_consumer(&self, id: &str, now_ms: i64) -> Result<(), GraphError>;
    fn merge_publishes_to(
        &self,
        producer_id: &str,
        topic: &str,
        message_count: i64,
        now_ms: i64,
    ) -> Result<(), GraphError>;
    fn merge_subscribes_to(
        &self,
        consumer_id: &str,
        topic: &str,
        now_ms: i64,
    ) -> Result<(), GraphError>;

    fn topics(&self) -> Result<Vec<GraphTopic>, GraphError>;
    fn producers(&self) -> Result<Vec<String>, GraphError>;
    fn consumers(&self) -> Result<Vec<GraphConsumer>, GraphError>;
    fn partitions(&self) -> Result<Vec<GraphPartition>, GraphError>;
    fn consumer_groups(&self) -> Result<Vec<GraphConsumerGroup>, GraphError>;
    fn publishes_edges(&self) -> Result<Vec<PublishesEdge>, GraphError>;
}

/// HTTP Cypher client.
pub struct CypherHttpStore {
    http: reqwest::blocking::Client,
    endpoint: String,
    auth_header: String,
}

impl CypherHttpStore {
    pub fn new(config: &GraphSection) -> Result<Self, GraphError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_millis(REQUEST_TIMEOUT_MS))
            .build()
            .map_err(|err| GraphError::Unavailable(format!("http client: {err}")))?;
        let credentials = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", config.user, config.password));
        Ok(Self {
            http,
            endpoint: format!(
                "{}/db/{}/tx/commit",
                config.url.trim_end_matches('/'),
                config.database
            ),
            auth_header: format!("Basic {credentials}"),
        })
    }

    /// Run one Cypher statement and return its result rows.
    fn run(&self, statement: &str, parameters: Value) -> Result<Vec<Vec<Value>>, GraphError> {
        let body = json!({
            "statements": [{ "statement": statement, "parameters": parameters }]
        });
        let response = self
            .http
            .post(&self.endpoint)
            .header("Authorization", &self.auth_header)
            .json(&body)
            .send()
            .map_err(|err| GraphError::Unavailable(err.to_string()))?;

        let status = response.status();
        let payload: Value = response
            .json()
            .map_err(|err| GraphError::Decode(err.to_string()))?;

        if let Some(error) = payload
            .get("errors")
            .and_then(Value::as_array)
            .and_then(|errors| errors.first())
        {
            return Err(GraphError::Server {
                code: json_str(error, "code"),
                message: json_str(error, "message"),
            });
        }
        if !status.is_success() {
            return Err(GraphError::Unavailable(format!("http status {status}")));
        }

        let rows = payload
            .get("results")
            .and_then(Value::as_array)
            .and_then(|results| results.first())
            .and_then(|result| result.get("data"))
            .and_then(Value::as_array)
            .map(|data| {
                data.iter()
                    .filter_map(|entry| entry.get("row").and_then(Value::as_array).cloned())
                    .collect()
            })
            .unwrap_or_default();
        Ok(rows)
    }
}

impl GraphStore for CypherHttpStore {
    fn ensure_constraints(&self) -> Result<(), GraphError> {
        for statement in [
            "CREATE CONSTRAINT IF NOT EXISTS FOR (t:Topic) REQUIRE t.name IS UNIQUE",
            "CREATE CONSTRAINT IF NOT EXISTS FOR (p:Producer) REQUIRE p.id IS UNIQUE",
            "CREATE CONSTRAINT IF NOT EXISTS FOR (c:Consumer) REQUIRE c.id IS UNIQUE",
        ] {
            self.run(statement, json!({}))?;
        }
        Ok(())
    }

    fn upsert_topic(&self, name: &str, message_count: i64, now_ms: i64) -> Result<(), GraphError> {
        self.run(
            "MERGE (t:Topic {name: $name}) \
             SET t.messageCount = $message_count, t.lastUpdated = $now_ms",
            json!({ "name": name, "message_count": message_count, "now_ms": now_ms }),
        )?;
        Ok(())
    }

    fn upsert_producer(&self, id: &str, now_ms: i64) -> Result<(), GraphError> {
        self.run(
            "MERGE (p:Producer {id: $id}) SET p.lastSeen = $now_ms",
            json!({ "id": id, "now_ms": now_ms }),
        )?;
        Ok(())
    }

    fn upsert_consumer(&self, id: &str, now_ms: i64) -> Result<(), GraphError> {
        self.run(
            "MERGE (c:Consumer {id: $id}) SET c.lastSeen = $now_ms",
            json!({ "id": id, "now_ms": now_ms }),
        )?;
        Ok(())
    }

    fn merge_publishes_to(
        &self,
        producer_id: &str,
        topic: &str,
        message_count: i64,
        now_ms: i64,
    ) -> Result<(), GraphError> {
        self.run(
            "MATCH (p:Producer {id: $producer_id}) \
             MATCH (t:Topic {name: $topic}) \
             MERGE (p)-[r:PUBLISHES_TO]->(t) \
             SET r.messageCount = $message_count, r.lastUpdated = $now_ms",
            json!({
                "producer_id": producer_id,
                "topic": topic,
                "message_count": message_count,
                "now_ms": now_ms,
            }),
        )?;
        Ok(())
    }

    fn merge_subscribes_to(
        &self,
        consumer_id: &str,
        topic: &str,
        now_ms: i64,
    ) -> Result<(), GraphError> {
        // MERGE the topic too: subscriptions are seeded fixtures and may
        // reference topics no producer has published to yet.
        self.run(
            "MATCH (c:Consumer {id: $consumer_id}) \
             MERGE (t:Topic {name: $topic}) \
             MERGE (c)-[r:SUBSCRIBES_TO]->(t) \
             SET r.lastUpdated = $now_ms",
            json!({ "consumer_id": consumer_id, "topic": topic, "now_ms": now_ms }),
        )?;
        Ok(())
    }

    fn topics(&self) -> Result<Vec<GraphTopic>, GraphError> {
        let rows = self.run(
            "MATCH (t:Topic) RETURN t.name, t.messageCount ORDER BY t.name",
            json!({}),
        )?;
        rows.into_iter()
            .map(|row| {
                Ok(GraphTopic {
                    name: row_str(&row, 0)?,
                    message_count: row_i64_or_zero(&row, 1),
                })
            })
            .collect()
    }

    fn producers(&self) -> Result<Vec<String>, GraphError> {
        let rows = self.run("MATCH (p:Producer) RETURN p.id ORDER BY p.id", json!({}))?;
        rows.into_iter().map(|row| row_str(&row, 0)).collect()
    }

    fn consumers(&self) -> Result<Vec<GraphConsumer>, GraphError> {
        let rows = self.run(
            "MATCH (c:Consumer) \
             OPTIONAL MATCH (c)-[:BELONGS_TO]->(g:ConsumerGroup) \
             RETURN c.id, g.id ORDER BY c.id",
            json!({}),
        )?;
        rows.into_iter()
            .map(|row| {
                Ok(GraphConsumer {
                    id: row_str(&row, 0)?,
                    group: row_opt_str(&row, 1),
                })
            })
            .collect()
    }

    fn partitions(&self) -> Result<Vec<GraphPartition>, GraphError> {
        let rows = self.run(
            "MATCH (p:Partition) \
             OPTIONAL MATCH (p)-[:BELONGS_TO]->(t:Topic) \
             RETURN p.id, t.name, p.leader, p.replicas ORDER BY p.id",
            json!({}),
        )?;
        rows.into_iter()
            .map(|row| {
                Ok(GraphPartition {
                    id: row_str(&row, 0)?,
                    topic: row_opt_str(&row, 1).unwrap_or_default(),
                    leader: row_opt_str(&row, 2),
                    replicas: row.get(3).and_then(Value::as_i64).unwrap_or(1),
                })
            })
            .collect()
    }

    fn consumer_groups(&self) -> Result<Vec<GraphConsumerGroup>, GraphError> {
        let rows = self.run(
            "MATCH (g:ConsumerGroup) \
             OPTIONAL MATCH (c:Consumer)-[:BELONGS_TO]->(g) \
             RETURN g.id, COUNT(c) ORDER BY g.id",
            json!({}),
        )?;
        rows.into_iter()
            .map(|row| {
                Ok(GraphConsumerGroup {
                    id: row_str(&row, 0)?,
                    member_count: row_i64_or_zero(&row, 1),
                })
            })
            .collect()
    }

    fn publishes_edges(&self) -> Result<Vec<PublishesEdge>, GraphError> {
        let rows = self.run(
            "MATCH (p:Producer)-[r:PUBLISHES_TO]->(t:Topic) \
             RETURN p.id, t.name, r.messageCount ORDER BY p.id, t.name",
            json!({}),
        )?;
        rows.into_iter()
            .map(|row| {
                Ok(PublishesEdge {
                    producer_id: row_str(&row, 0)?,
                    topic: row_str(&row, 1)?,
                    message_count: row_i64_or_zero(&row, 2),
                })
            })
            .collect()
    }
}

fn json_str(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string()
}

fn row_str(row: &[Value], index: usize) -> Result<String, GraphError> {
    row.get(index)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| GraphError::Decode(format!("expected string at column {index}")))
}

fn row_opt_str(row: &[Value], index: usize) -> Option<String> {
    row.get(index).and_then(Value::as_str).map(str::to_string)
}

fn row_i64_or_zero(row: &[Value], index: usize) -> i64 {
    row.get(index).and_then(Value::as_i64).unwrap_or(0)
}
