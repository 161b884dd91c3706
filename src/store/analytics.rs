//! Analytics store gateway: derived aggregate tables.
//!
//! Populated by the forward analytics sync and the on-demand reverse sync.
//! Every write is an upsert keyed on the table's natural unique key, so
//! reruns with unchanged input only refresh timestamps.

use std::path::Path;

use rusqlite::params;

use super::pool::{SqlitePool, StoreError};
use super::primary::TopicCount;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProducerRank {
    pub producer_id: String,
    pub topic_count: i64,
    pub total_messages: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProducerTopicStat {
    pub producer_id: String,
    pub topic: String,
    pub message_count: i64,
    pub last_seen: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsumerRow {
    pub consumer_id: String,
    pub consumer_group: Option<String>,
    pub last_seen: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartitionRow {
    pub partition_id: String,
    pub topic: String,
    pub leader: Option<String>,
    pub replicas: i64,
    pub last_updated: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsumerGroupRow {
    pub group_id: String,
    pub member_count: i64,
    pub last_updated: i64,
}

#[derive(Clone)]
pub struct AnalyticsStore {
    pool: SqlitePool,
}

impl AnalyticsStore {
    pub fn open(path: &Path, pool_size: usize) -> Result<Self, StoreError> {
        let pool = SqlitePool::open(path, pool_size)?;
        let store = Self { pool };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.pool.checkout()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS topics (
               id INTEGER PRIMARY KEY AUTOINCREMENT,
               name TEXT UNIQUE NOT NULL,
               message_count INTEGER NOT NULL DEFAULT 0,
               last_updated INTEGER NOT NULL
             );
             CREATE TABLE IF NOT EXISTS ip_topic_stats (
               id INTEGER PRIMARY KEY AUTOINCREMENT,
               producer_id TEXT NOT NULL,
               topic TEXT NOT NULL,
               message_count INTEGER NOT NULL DEFAULT 1,
               last_seen INTEGER NOT NULL,
               UNIQUE (producer_id, topic)
             );
             CREATE TABLE IF NOT EXISTS producers (
               id INTEGER PRIMARY KEY AUTOINCREMENT,
               producer_id TEXT UNIQUE NOT NULL,
               last_seen INTEGER NOT NULL
             );
             CREATE TABLE IF NOT EXISTS consumers (
               id INTEGER PRIMARY KEY AUTOINCREMENT,
               consumer_id TEXT UNIQUE NOT NULL,
               consumer_group TEXT,
               last_seen INTEGER NOT NULL
             );
             CREATE TABLE IF NOT EXISTS partitions (
               id INTEGER PRIMARY KEY AUTOINCREMENT,
               partition_id TEXT UNIQUE NOT NULL,
               topic TEXT NOT NULL,
               leader TEXT,
               replicas INTEGER NOT NULL DEFAULT 1,
               last_updated INTEGER NOT NULL
             );
             CREATE TABLE IF NOT EXISTS consumer_groups (
               id INTEGER PRIMARY KEY AUTOINCREMENT,
               group_id TEXT UNIQUE NOT NULL,
               member_count INTEGER NOT NULL DEFAULT 0,
               last_updated INTEGER NOT NULL
             );",
        )?;
        Ok(())
    }

    pub fn upsert_topic_count(
        &self,
        name: &str,
        message_count: i64,
        now_ms: i64,
    ) -> Result<(), StoreError> {
        let conn = self.pool.checkout()?;
        conn.execute(
            "INSERT INTO topics (name, message_count, last_updated) VALUES (?1, ?2, ?3) \
             ON CONFLICT(name) DO UPDATE SET \
               message_count = excluded.message_count, \
               last_updated = excluded.last_updated",
            params![name, message_count, now_ms],
        )?;
        Ok(())
    }

    pub fn upsert_producer_topic_stat(
        &self,
        producer_id: &str,
        topic: &str,
        message_count: i64,
        now_ms: i64,
    ) -> Result<(), StoreError> {
        let conn = self.pool.checkout()?;
        conn.execute(
            "INSERT INTO ip_topic_stats (producer_id, topic, message_count, last_seen) \
             VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(producer_id, topic) DO UPDATE SET \
               message_count = excluded.message_count, \
               last_seen = excluded.last_seen",
            params![producer_id, topic, message_count, now_ms],
        )?;
        Ok(())
    }

    pub fn upsert_producer(&self, producer_id: &str, now_ms: i64) -> Result<(), StoreError> {
        let conn = self.pool.checkout()?;
        conn.execute(
            "INSERT INTO producers (producer_id, last_seen) VALUES (?1, ?2) \
             ON CONFLICT(producer_id) DO UPDATE SET last_seen = excluded.last_seen",
            params![producer_id, now_ms],
        )?;
        Ok(())
    }

    pub fn upsert_consumer(
        &self,
        consumer_id: &str,
        consumer_group: Option<&str>,
        now_ms: i64,
    ) -> Result<(), StoreError> {
        let conn = self.pool.checkout()?;
        conn.execute(
            "INSERT INTO consumers (consumer_id, consumer_group, last_seen) VALUES (?1, ?2, ?3) \
             ON CONFLICT(consumer_id) DO UPDATE SET \
               consumer_group = excluded.consumer_group, \
               last_seen = excluded.last_seen",
            params![consumer_id, consumer_group, now_ms],
        )?;
        Ok(())
    }

    pub fn upsert_partition(
        &self,
        partition_id: &str,
        topic: &str,
        leader: Option<&str>,
        replicas: i64,
        now_ms: i64,
    ) -> Result<(), StoreError> {
        let conn = self.pool.checkout()?;
        conn.execute(
            "INSERT INTO partitions (partition_id, topic, leader, replicas, last_updated) \
             VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT(partition_id) DO UPDATE SET \
               topic = excluded.topic, \
               leader = excluded.leader, \
               replicas = excluded.replicas, \
               last_updated = excluded.last_updated",
            params![partition_id, topic, leader, replicas, now_ms],
        )?;
        Ok(())
    }

    pub fn upsert_consumer_group(
        &self,
        group_id: &str,
        member_count: i64,
        now_ms: i64,
    ) -> Result<(), StoreError> {
        let conn = self.pool.checkout()?;
        conn.execute(
            "INSERT INTO consumer_groups (group_id, member_count, last_updated) \
             VALUES (?1, ?2, ?3) \
             ON CONFLICT(group_id) DO UPDATE SET \
               member_count = excluded.member_count, \
               last_updated = excluded.last_updated",
            params![group_id, member_count, now_ms],
        )?;
        Ok(())
    }

    /// Delete every row from every derived table. First step of the reverse
    /// sync; deliberately not wrapped in a transaction with the re-inserts.
    pub fn clear_derived_tables(&self) -> Result<(), StoreError> {
        let conn = self.pool.checkout()?;
        conn.execute_batch(
            "DELETE FROM ip_topic_stats;
             DELETE FROM topics;
             DELETE FROM producers;
             DELETE FROM consumers;
             DELETE FROM partitions;
             DELETE FROM consumer_groups;",
        )?;
        Ok(())
    }

    /// Producers ranked by distinct-topic count, then total messages. Read
    /// entry point for the dashboard and exporters.
    pub fn top_producers(&self, limit: u32) -> Result<Vec<ProducerRank>, StoreError> {
        let conn = self.pool.checkout()?;
        let mut stmt = conn.prepare(
            "SELECT producer_id, COUNT(DISTINCT topic), SUM(message_count) \
             FROM ip_topic_stats \
             GROUP BY producer_id \
             ORDER BY 2 DESC, 3 DESC \
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], |row| {
            Ok(ProducerRank {
                producer_id: row.get(0)?,
                topic_count: row.get(1)?,
                total_messages: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// All topics with their aggregate counts, largest first.
    pub fn topics_with_counts(&self) -> Result<Vec<TopicCount>, StoreError> {
        let conn = self.pool.checkout()?;
        let mut stmt = conn.prepare(
            "SELECT name, message_count FROM topics ORDER BY message_count DESC, name",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(TopicCount {
                topic: row.get(0)?,
                count: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn producer_topic_stats(&self) -> Result<Vec<ProducerTopicStat>, StoreError> {
        let conn = self.pool.checkout()?;
        let mut stmt = conn.prepare(
            "SELECT producer_id, topic, message_count, last_seen FROM ip_topic_stats \
             ORDER BY producer_id, topic",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(ProducerTopicStat {
                producer_id: row.get(0)?,
                topic: row.get(1)?,
                message_count: row.get(2)?,
                last_seen: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn producers(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.pool.checkout()?;
        let mut stmt = conn.prepare("SELECT producer_id FROM producers ORDER BY producer_id")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn consumers(&self) -> Result<Vec<ConsumerRow>, StoreError> {
        let conn = self.pool.checkout()?;
        let mut stmt = conn.prepare(
            "SELECT consumer_id, consumer_group, last_seen FROM consumers ORDER BY consumer_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(ConsumerRow {
                consumer_id: row.get(0)?,
                consumer_group: row.get(1)?,
                last_seen: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn partitions(&self) -> Result<Vec<PartitionRow>, StoreError> {
        let conn = self.pool.checkout()?;
        let mut stmt = conn.prepare(
            "SELECT partition_id, topic, leader, replicas, last_updated FROM partitions \
             ORDER BY partition_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(PartitionRow {
                partition_id: row.get(0)?,
                topic: row.get(1)?,
                leader: row.get(2)?,
                replicas: row.get(3)?,
                last_updated: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn consumer_groups(&self) -> Result<Vec<ConsumerGroupRow>, StoreError> {
        let conn = self.pool.checkout()?;
        let mut stmt = conn.prepare(
            "SELECT group_id, member_count, last_updated FROM consumer_groups ORDER BY group_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(ConsumerGroupRow {
                group_id: row.get(0)?,
                member_count: row.get(1)?,
                last_updated: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, AnalyticsStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = AnalyticsStore::open(&dir.path().join("analytics.db"), 4).unwrap();
        (dir, store)
    }

    #[test]
    fn topic_upsert_is_idempotent() {
        let (_dir, store) = temp_store();
        store.upsert_topic_count("orders", 3, 100).unwrap();
        store.upsert_topic_count("orders", 3, 200).unwrap();

        let topics = store.topics_with_counts().unwrap();
        assert_eq!(topics.len(), 1);
        assert_eq!(topics[0].topic, "orders");
        assert_eq!(topics[0].count, 3);
    }

    #[test]
    fn producer_topic_stat_updates_in_place() {
        let (_dir, store) = temp_store();
        store.upsert_producer_topic_stat("p1", "a", 1, 100).unwrap();
        store.upsert_producer_topic_stat("p1", "a", 5, 200).unwrap();
        store.upsert_producer_topic_stat("p1", "b", 2, 200).unwrap();

        let stats = store.producer_topic_stats().unwrap();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].message_count, 5);
        assert_eq!(stats[0].last_seen, 200);
    }

    #[test]
    fn top_producers_ranked_by_distinct_topics_then_volume() {
        let (_dir, store) = temp_store();
        store.upsert_producer_topic_stat("wide", "a", 1, 0).unwrap();
        store.upsert_producer_topic_stat("wide", "b", 1, 0).unwrap();
        store.upsert_producer_topic_stat("loud", "a", 50, 0).unwrap();

        let ranks = store.top_producers(10).unwrap();
        assert_eq!(ranks[0].producer_id, "wide");
        assert_eq!(ranks[0].topic_count, 2);
        assert_eq!(ranks[1].producer_id, "loud");
        assert_eq!(ranks[1].total_messages, 50);
    }

    #[test]
    fn clear_derived_tables_empties_everything() {
        let (_dir, store) = temp_store();
        store.upsert_topic_count("t", 1, 0).unwrap();
        store.upsert_producer("p", 0).unwrap();
        store.upsert_consumer("c", Some("g"), 0).unwrap();
        store.upsert_partition("part-0", "t", Some("n1"), 3, 0).unwrap();
        store.upsert_consumer_group("g", 2, 0).unwrap();
        store.upsert_producer_topic_stat("p", "t", 1, 0).unwrap();

        store.clear_derived_tables().unwrap();

        assert!(store.topics_with_counts().unwrap().is_empty());
        assert!(store.producers().unwrap().is_empty());
        assert!(store.consumers().unwrap().is_empty());
        assert!(store.partitions().unwrap().is_empty());
        assert!(store.consumer_groups().unwrap().is_empty());
        assert!(store.producer_topic_stats().unwrap().is_empty());
    }
}
