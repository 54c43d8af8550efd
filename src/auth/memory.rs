//! Process-local session cache tier. Lost on restart by design; the
//! durable tier exists to survive that.

use super::SessionTier;
use crate::store::SessionRecord;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct MemoryTier {
    sessions: RwLock<HashMap<String, SessionRecord>>,
}

impl MemoryTier {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionTier for MemoryTier {
    async fn get(&self, user_id: &str) -> Option<SessionRecord> {
        self.sessions.read().await.get(user_id).cloned()
    }

    async fn put(&self, session: &SessionRecord) -> bool {
        self.sessions
            .write()
            .await
            .insert(session.user_id.clone(), session.clone());
        true
    }

    async fn remove(&self, user_id: &str) -> bool {
        self.sessions.write().await.remove(user_id);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn put_get_remove() {
        let tier = MemoryTier::new();
        let session = SessionRecord {
            user_id: "u1".to_string(),
            display_name: "Alice".to_string(),
            bearer_token: "tok".to_string(),
            authenticated_at: Utc::now(),
        };

        assert!(tier.get("u1").await.is_none());
        assert!(tier.put(&session).await);
        assert_eq!(tier.get("u1").await.unwrap().display_name, "Alice");
        assert!(tier.remove("u1").await);
        assert!(tier.get("u1").await.is_none());
    }
}
