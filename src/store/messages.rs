//! Message Record Store
//!
//! Append-only writes of individual turns. An append returns as soon as
//! the record is durable; the conversation summary update is dispatched to
//! a background task and never awaited on the turn's critical path, so a
//! late or failed summary write can never hold up delivery.

use super::{DocumentStore, MessageRecord, Role, SummaryStore};
use crate::error::AppendError;
use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

pub struct MessageStore {
    store: Arc<dyn DocumentStore>,
    summaries: Arc<SummaryStore>,
    max_text_chars: usize,
    retention: Option<Duration>,
}

impl MessageStore {
    /// `retention_days = 0` disables per-record expiry.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        summaries: Arc<SummaryStore>,
        max_text_chars: usize,
        retention_days: i64,
    ) -> Self {
        Self {
            store,
            summaries,
            max_text_chars: max_text_chars.max(1),
            retention: (retention_days > 0).then(|| Duration::days(retention_days)),
        }
    }

    /// Durably append one turn. Returns the immutable record as written,
    /// or a sentinel failure; store trouble never propagates as a raw
    /// error.
    pub async fn append(
        &self,
        conversation_id: &str,
        user_id: &str,
        display_name: &str,
        role: Role,
        text: &str,
    ) -> Result<MessageRecord, AppendError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AppendError::Validation("message text is empty"));
        }
        if conversation_id.trim().is_empty() || user_id.trim().is_empty() {
            return Err(AppendError::Validation(
                "conversation id and user id are required",
            ));
        }

        let text = if text.chars().count() > self.max_text_chars {
            tracing::debug!(
                conversation_id,
                cap = self.max_text_chars,
                "message text truncated to storage cap"
            );
            text.chars().take(self.max_text_chars).collect()
        } else {
            text.to_string()
        };

        let now = Utc::now();
        let record = MessageRecord {
            id: Uuid::now_v7().to_string(),
            conversation_id: conversation_id.to_string(),
            user_id: user_id.to_string(),
            role,
            text,
            created_at: now,
            expires_at: self.retention.map(|horizon| now + horizon),
        };

        self.store.put_message(&record).await.map_err(|err| {
            tracing::warn!(conversation_id, error = %err, "message append failed");
            AppendError::Unavailable(err.to_string())
        })?;

        self.dispatch_touch(conversation_id, user_id, display_name);
        Ok(record)
    }

    /// Summary upkeep is advisory; hand it to the runtime and move on.
    fn dispatch_touch(&self, conversation_id: &str, user_id: &str, display_name: &str) {
        let summaries = Arc::clone(&self.summaries);
        let conversation_id = conversation_id.to_string();
        let user_id = user_id.to_string();
        let display_name = display_name.to_string();
        tokio::spawn(async move {
            summaries.touch(&conversation_id, &user_id, &display_name).await;
        });
    }
}
