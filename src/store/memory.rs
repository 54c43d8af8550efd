//! In-Memory Document Store
//!
//! Backs the store trait with plain maps behind an async `RwLock`. The
//! conditional summary write runs entirely inside one write-lock scope,
//! which is what makes it atomic here. Suitable for tests and ephemeral
//! deployments; data is lost when the process exits.

use super::{
    sort_chronologically, ConversationSummary, DocumentStore, MessageRecord, SessionRecord,
    Version, WriteOutcome,
};
use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct Collections {
    messages: Vec<MessageRecord>,
    summaries: HashMap<String, (ConversationSummary, Version)>,
    sessions: HashMap<String, SessionRecord>,
}

/// In-memory backend. Cheap to clone records in and out; the append-only
/// message log is never mutated in place.
#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Collections>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn put_message(&self, record: &MessageRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.messages.push(record.clone());
        tracing::debug!(id = %record.id, conversation_id = %record.conversation_id, "stored message");
        Ok(())
    }

    async fn messages_for_conversation(
        &self,
        conversation_id: &str,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<MessageRecord>, StoreError> {
        let inner = self.inner.read().await;
        let mut records: Vec<MessageRecord> = inner
            .messages
            .iter()
            .filter(|r| r.conversation_id == conversation_id && r.user_id == user_id)
            .cloned()
            .collect();
        sort_chronologically(&mut records);
        if records.len() > limit {
            records.drain(..records.len() - limit);
        }
        Ok(records)
    }

    async fn messages_for_user(&self, user_id: &str) -> Result<Vec<MessageRecord>, StoreError> {
        let inner = self.inner.read().await;
        let mut records: Vec<MessageRecord> = inner
            .messages
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        sort_chronologically(&mut records);
        Ok(records)
    }

    async fn read_summary(
        &self,
        conversation_id: &str,
    ) -> Result<Option<(ConversationSummary, Version)>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.summaries.get(conversation_id).cloned())
    }

    async fn write_summary(
        &self,
        summary: &ConversationSummary,
        expected: Option<Version>,
    ) -> Result<WriteOutcome, StoreError> {
        let mut inner = self.inner.write().await;
        let current = inner
            .summaries
            .get(&summary.conversation_id)
            .map(|(_, version)| *version);
        match (current, expected) {
            (None, None) => {
                inner
                    .summaries
                    .insert(summary.conversation_id.clone(), (summary.clone(), 1));
                Ok(WriteOutcome::Applied)
            }
            (Some(version), Some(want)) if version == want => {
                inner
                    .summaries
                    .insert(summary.conversation_id.clone(), (summary.clone(), want + 1));
                Ok(WriteOutcome::Applied)
            }
            _ => Ok(WriteOutcome::Conflict),
        }
    }

    async fn active_summaries(&self) -> Result<Vec<ConversationSummary>, StoreError> {
        let inner = self.inner.read().await;
        let mut summaries: Vec<ConversationSummary> = inner
            .summaries
            .values()
            .filter(|(s, _)| s.is_active)
            .map(|(s, _)| s.clone())
            .collect();
        summaries.sort_by(|a, b| b.last_activity_at.cmp(&a.last_activity_at));
        Ok(summaries)
    }

    async fn read_session(&self, user_id: &str) -> Result<Option<SessionRecord>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.sessions.get(user_id).cloned())
    }

    async fn put_session(&self, record: &SessionRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.sessions.insert(record.user_id.clone(), record.clone());
        Ok(())
    }

    async fn delete_session(&self, user_id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.sessions.remove(user_id);
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut inner = self.inner.write().await;
        let before = inner.messages.len();
        inner
            .messages
            .retain(|r| r.expires_at.map_or(true, |at| at > now));
        Ok((before - inner.messages.len()) as u64)
    }
}
