//! Primary store gateway: the append-only message log.
//!
//! All ingestion writes and all replication reads go through this type.
//! Messages are immutable and insert-only; deletion/retention is out of
//! scope.

use std::path::Path;

use rusqlite::params;

use super::pool::{SqlitePool, StoreError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageRecord {
    pub id: i64,
    pub topic: String,
    pub producer_id: Option<String>,
    pub content: String,
    pub timestamp: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TopicCount {
    pub topic: String,
    pub count: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProducerTopicCount {
    pub producer_id: String,
    pub topic: String,
    pub count: i64,
}

#[derive(Clone)]
pub struct PrimaryStore {
    pool: SqlitePool,
}

impl PrimaryStore {
    /// Open the message log at `path` and ensure its schema exists.
    pub fn open(path: &Path, pool_size: usize) -> Result<Self, StoreError> {
        let pool = SqlitePool::open(path, pool_size)?;
        let store = Self { pool };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.pool.checkout()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS messages (
               id INTEGER PRIMARY KEY AUTOINCREMENT,
               topic TEXT NOT NULL,
               producer_id TEXT,
               content TEXT NOT NULL,
               timestamp INTEGER NOT NULL
             );
             CREATE INDEX IF NOT EXISTS messages_by_topic ON messages (topic, id);",
        )?;
        Ok(())
    }

    /// Append one message. Returns the assigned monotonic id.
    pub fn append_message(
        &self,
        topic: &str,
        producer_id: Option<&str>,
        content: &str,
        now_ms: i64,
    ) -> Result<i64, StoreError> {
        let conn = self.pool.checkout()?;
        conn.execute(
            "INSERT INTO messages (topic, producer_id, content, timestamp) VALUES (?1, ?2, ?3, ?4)",
            params![topic, producer_id, content, now_ms],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Full history of a topic's message contents, in insertion order.
    ///
    /// This is the consume contract: complete replay on every call, no
    /// cursor, no delta.
    pub fn messages_for_topic(&self, topic: &str) -> Result<Vec<String>, StoreError> {
        let conn = self.pool.checkout()?;
        let mut stmt =
            conn.prepare("SELECT content FROM messages WHERE topic = ?1 ORDER BY id")?;
        let rows = stmt.query_map(params![topic], |row| row.get(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Most recent messages, newest first. Read entry point for the
    /// dashboard and exporters.
    pub fn recent_messages(&self, limit: u32) -> Result<Vec<MessageRecord>, StoreError> {
        let conn = self.pool.checkout()?;
        let mut stmt = conn.prepare(
            "SELECT id, topic, producer_id, content, timestamp FROM messages \
             ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], |row| {
            Ok(MessageRecord {
                id: row.get(0)?,
                topic: row.get(1)?,
                producer_id: row.get(2)?,
                content: row.get(3)?,
                timestamp: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Per-topic message counts over the whole log.
    pub fn topic_counts(&self) -> Result<Vec<TopicCount>, StoreError> {
        let conn = self.pool.checkout()?;
        let mut stmt = conn.prepare(
            "SELECT topic, COUNT(*) FROM messages GROUP BY topic ORDER BY topic",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(TopicCount {
                topic: row.get(0)?,
                count: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Per-(producer, topic) message counts. Messages without a producer id
    /// are excluded.
    pub fn producer_topic_counts(&self) -> Result<Vec<ProducerTopicCount>, StoreError> {
        let conn = self.pool.checkout()?;
        let mut stmt = conn.prepare(
            "SELECT producer_id, topic, COUNT(*) FROM messages \
             WHERE producer_id IS NOT NULL \
             GROUP BY producer_id, topic \
             ORDER BY producer_id, topic",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(ProducerTopicCount {
                producer_id: row.get(0)?,
                topic: row.get(1)?,
                count: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Distinct producer ids observed in the log.
    pub fn distinct_producers(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.pool.checkout()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT producer_id FROM messages \
             WHERE producer_id IS NOT NULL ORDER BY producer_id",
        )?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, PrimaryStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = PrimaryStore::open(&dir.path().join("primary.db"), 4).unwrap();
        (dir, store)
    }

    #[test]
    fn append_then_read_back_in_order() {
        let (_dir, store) = temp_store();
        store.append_message("orders", Some("p1"), "first", 1).unwrap();
        store.append_message("orders", Some("p1"), "second", 2).unwrap();
        store.append_message("other", Some("p2"), "elsewhere", 3).unwrap();

        let messages = store.messages_for_topic("orders").unwrap();
        assert_eq!(messages, vec!["first".to_string(), "second".to_string()]);
        assert!(store.messages_for_topic("missing").unwrap().is_empty());
    }

    #[test]
    fn recent_messages_newest_first() {
        let (_dir, store) = temp_store();
        for i in 0..5 {
            store
                .append_message("t", Some("p"), &format!("m{i}"), i)
                .unwrap();
        }
        let recent = store.recent_messages(3).unwrap();
        let contents: Vec<_> = recent.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m4", "m3", "m2"]);
    }

    #[test]
    fn aggregate_counts() {
        let (_dir, store) = temp_store();
        store.append_message("a", Some("p1"), "x", 1).unwrap();
        store.append_message("a", Some("p1"), "y", 2).unwrap();
        store.append_message("a", Some("p2"), "z", 3).unwrap();
        store.append_message("b", None, "anon", 4).unwrap();

        let topics = store.topic_counts().unwrap();
        assert_eq!(
            topics,
            vec![
                TopicCount { topic: "a".into(), count: 3 },
                TopicCount { topic: "b".into(), count: 1 },
            ]
        );

        let pairs = store.producer_topic_counts().unwrap();
        assert_eq!(
            pairs,
            vec![
                ProducerTopicCount { producer_id: "p1".into(), topic: "a".into(), count: 2 },
                ProducerTopicCount { producer_id: "p2".into(), topic: "a".into(), count: 1 },
            ]
        );

        assert_eq!(store.distinct_producers().unwrap(), vec!["p1", "p2"]);
    }
}
