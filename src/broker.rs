//! Broker core: maps protocol requests onto the primary store.
//!
//! Deliberately a direct pass-through. No in-memory queue, no buffering,
//! no deduplication; consume returns the complete topic history on every
//! call.

use crate::store::primary::PrimaryStore;
use crate::store::{StoreError, now_ms};

#[derive(Clone)]
pub struct Broker {
    primary: PrimaryStore,
}

impl Broker {
    pub fn new(primary: PrimaryStore) -> Self {
        Self { primary }
    }

    /// Persist one message.
    pub fn publish(&self, topic: &str, producer_id: &str, content: &str) -> Result<(), StoreError> {
        let id = self
            .primary
            .append_message(topic, Some(producer_id), content, now_ms())?;
        tracing::debug!(topic, id, "message persisted");
        Ok(())
    }

    /// Everything ever published to `topic`, in insertion order.
    pub fn consume(&self, topic: &str) -> Result<Vec<String>, StoreError> {
        self.primary.messages_for_topic(topic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_then_consume_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let primary = PrimaryStore::open(&dir.path().join("primary.db"), 2).unwrap();
        let broker = Broker::new(primary);

        broker.publish("orders", "p1", "order-created-42").unwrap();
        broker.publish("orders", "p1", "order-created-43").unwrap();

        let history = broker.consume("orders").unwrap();
        assert_eq!(history, vec!["order-created-42", "order-created-43"]);

        // Repeated consume replays the full history, not a delta.
        assert_eq!(broker.consume("orders").unwrap(), history);
        assert!(broker.consume("empty").unwrap().is_empty());
    }
}
