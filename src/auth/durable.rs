//! Durable session tier over the document store.
//!
//! Store trouble degrades to "no observation" on reads and a `false` on
//! writes; the synchronizer decides what that means. An unreachable store
//! therefore never logs a user out — the cache keeps answering for this
//! process.

use super::SessionTier;
use crate::store::{DocumentStore, SessionRecord};
use async_trait::async_trait;
use std::sync::Arc;

pub struct DurableTier {
    store: Arc<dyn DocumentStore>,
}

impl DurableTier {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SessionTier for DurableTier {
    async fn get(&self, user_id: &str) -> Option<SessionRecord> {
        match self.store.read_session(user_id).await {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!(user_id, error = %err, "durable session read failed");
                None
            }
        }
    }

    async fn put(&self, session: &SessionRecord) -> bool {
        match self.store.put_session(session).await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(user_id = %session.user_id, error = %err, "durable session write failed");
                false
            }
        }
    }

    async fn remove(&self, user_id: &str) -> bool {
        match self.store.delete_session(user_id).await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(user_id, error = %err, "durable session delete failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use chrono::Utc;

    #[tokio::test]
    async fn tier_reflects_store_contents() {
        let store = Arc::new(InMemoryStore::new());
        let tier = DurableTier::new(store.clone());
        let session = SessionRecord {
            user_id: "u1".to_string(),
            display_name: "Alice".to_string(),
            bearer_token: "tok".to_string(),
            authenticated_at: Utc::now(),
        };

        assert!(tier.get("u1").await.is_none());
        assert!(tier.put(&session).await);
        assert!(store.read_session("u1").await.unwrap().is_some());
        assert!(tier.remove("u1").await);
        assert!(tier.get("u1").await.is_none());
    }
}
