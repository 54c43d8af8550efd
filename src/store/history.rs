//! History Reader
//!
//! Reconstructs ordered conversation history for prompt construction.
//! The primary strategy is the exact `(conversation_id, user_id)` query;
//! a user-wide scan filtered in application code runs only when the
//! primary comes back empty even though the conversation summary says
//! messages were recorded. The fallback is a compensating control for
//! inconsistent partitioning in the backing store, so each strategy logs
//! under its own label and a rising fallback rate means the primary path
//! has a bug.
//!
//! Never returns an error: a missing conversation and an unreachable
//! store both read as empty history.

use super::{sort_chronologically, DocumentStore, MessageRecord};
use std::sync::Arc;

pub struct HistoryReader {
    store: Arc<dyn DocumentStore>,
}

impl HistoryReader {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// The most recent `limit` records of a conversation, ascending by
    /// `(created_at, id)`, roles already normalized by the store layer.
    pub async fn history(
        &self,
        conversation_id: &str,
        user_id: &str,
        limit: usize,
    ) -> Vec<MessageRecord> {
        if limit == 0 {
            return Vec::new();
        }

        match self
            .store
            .messages_for_conversation(conversation_id, user_id, limit)
            .await
        {
            Ok(mut records) if !records.is_empty() => {
                sort_chronologically(&mut records);
                tracing::debug!(
                    strategy = "conversation",
                    conversation_id,
                    count = records.len(),
                    "history loaded"
                );
                return records;
            }
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(
                    strategy = "conversation",
                    conversation_id,
                    error = %err,
                    "history unavailable, continuing without context"
                );
                return Vec::new();
            }
        }

        // Empty primary result. Only worth the wide scan when the summary
        // claims this conversation has recorded messages.
        let expected = match self.store.read_summary(conversation_id).await {
            Ok(Some((summary, _))) => summary.message_count > 0,
            Ok(None) => false,
            Err(err) => {
                tracing::debug!(conversation_id, error = %err, "summary probe failed");
                false
            }
        };
        if !expected {
            tracing::debug!(strategy = "conversation", conversation_id, "no history");
            return Vec::new();
        }

        match self.store.messages_for_user(user_id).await {
            Ok(all) => {
                let mut records: Vec<MessageRecord> = all
                    .into_iter()
                    .filter(|r| r.conversation_id == conversation_id)
                    .collect();
                sort_chronologically(&mut records);
                if records.len() > limit {
                    records.drain(..records.len() - limit);
                }
                tracing::warn!(
                    strategy = "user_scan",
                    conversation_id,
                    user_id,
                    count = records.len(),
                    "history recovered through fallback scan"
                );
                records
            }
            Err(err) => {
                tracing::warn!(
                    strategy = "user_scan",
                    conversation_id,
                    error = %err,
                    "fallback scan unavailable"
                );
                Vec::new()
            }
        }
    }
}
