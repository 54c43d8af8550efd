//! Conversation Summary Store
//!
//! One mutable record per conversation. Every mutation goes through a
//! read, compute, write-with-precondition loop over the store's
//! conditional write, capped at a small attempt budget. Two concurrent
//! turns for the same conversation therefore never both apply the same
//! stale count; the loser observes a conflict and re-reads.

use super::{ConversationSummary, DocumentStore, WriteOutcome};
use crate::error::TouchError;
use chrono::Utc;
use std::sync::Arc;

pub struct SummaryStore {
    store: Arc<dyn DocumentStore>,
    max_attempts: u32,
}

impl SummaryStore {
    pub fn new(store: Arc<dyn DocumentStore>, max_attempts: u32) -> Self {
        Self {
            store,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Record one more turn against a conversation, creating the summary on
    /// first contact. Best-effort: returns `false` on any failure and never
    /// blocks message delivery.
    pub async fn touch(&self, conversation_id: &str, user_id: &str, display_name: &str) -> bool {
        match self.try_touch(conversation_id, user_id, display_name).await {
            Ok(summary) => {
                tracing::debug!(
                    conversation_id,
                    message_count = summary.message_count,
                    "conversation summary updated"
                );
                true
            }
            Err(err) => {
                tracing::warn!(conversation_id, error = %err, "conversation summary update failed");
                false
            }
        }
    }

    async fn try_touch(
        &self,
        conversation_id: &str,
        user_id: &str,
        display_name: &str,
    ) -> Result<ConversationSummary, TouchError> {
        for attempt in 1..=self.max_attempts {
            let observed = self.store.read_summary(conversation_id).await?;
            let now = Utc::now();
            let (candidate, expected) = match observed {
                None => (
                    ConversationSummary {
                        conversation_id: conversation_id.to_string(),
                        user_id: user_id.to_string(),
                        display_name: display_name.to_string(),
                        message_count: 1,
                        created_at: now,
                        last_activity_at: now,
                        is_active: true,
                    },
                    None,
                ),
                Some((current, version)) => {
                    let mut next = current;
                    // created_at is set once and carried through untouched.
                    next.message_count += 1;
                    next.last_activity_at = now;
                    next.display_name = display_name.to_string();
                    (next, Some(version))
                }
            };

            match self.store.write_summary(&candidate, expected).await? {
                WriteOutcome::Applied => return Ok(candidate),
                WriteOutcome::Conflict => {
                    tracing::debug!(conversation_id, attempt, "summary write conflict, retrying");
                }
            }
        }
        Err(TouchError::RetryExhausted {
            attempts: self.max_attempts,
        })
    }

    /// Mark a conversation archived. Goes through the same conditional
    /// write; returns `false` when the summary doesn't exist or the
    /// attempt budget runs out.
    pub async fn archive(&self, conversation_id: &str) -> bool {
        for attempt in 1..=self.max_attempts {
            let observed = match self.store.read_summary(conversation_id).await {
                Ok(observed) => observed,
                Err(err) => {
                    tracing::warn!(conversation_id, error = %err, "archive read failed");
                    return false;
                }
            };
            let Some((current, version)) = observed else {
                return false;
            };
            if !current.is_active {
                return true;
            }
            let mut next = current;
            next.is_active = false;
            match self.store.write_summary(&next, Some(version)).await {
                Ok(WriteOutcome::Applied) => {
                    tracing::info!(conversation_id, "conversation archived");
                    return true;
                }
                Ok(WriteOutcome::Conflict) => {
                    tracing::debug!(conversation_id, attempt, "archive conflict, retrying");
                }
                Err(err) => {
                    tracing::warn!(conversation_id, error = %err, "archive write failed");
                    return false;
                }
            }
        }
        false
    }

    /// Current summary, or `None` when missing or the store is down.
    pub async fn read(&self, conversation_id: &str) -> Option<ConversationSummary> {
        match self.store.read_summary(conversation_id).await {
            Ok(observed) => observed.map(|(summary, _)| summary),
            Err(err) => {
                tracing::warn!(conversation_id, error = %err, "summary read failed");
                None
            }
        }
    }

    /// Conversations still marked active, most recently active first.
    pub async fn active(&self) -> Vec<ConversationSummary> {
        match self.store.active_summaries().await {
            Ok(summaries) => summaries,
            Err(err) => {
                tracing::warn!(error = %err, "active summary listing failed");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    fn store() -> (Arc<InMemoryStore>, SummaryStore) {
        let backing = Arc::new(InMemoryStore::new());
        let summaries = SummaryStore::new(backing.clone(), 4);
        (backing, summaries)
    }

    #[tokio::test]
    async fn first_touch_creates_with_count_one() {
        let (_, summaries) = store();
        assert!(summaries.touch("c1", "u1", "Alice").await);

        let summary = summaries.read("c1").await.unwrap();
        assert_eq!(summary.message_count, 1);
        assert!(summary.is_active);
        assert_eq!(summary.display_name, "Alice");
    }

    #[tokio::test]
    async fn repeated_touches_increment_and_keep_created_at() {
        let (_, summaries) = store();
        summaries.touch("c1", "u1", "Alice").await;
        let created = summaries.read("c1").await.unwrap().created_at;

        summaries.touch("c1", "u1", "Alice").await;
        summaries.touch("c1", "u1", "Alice").await;

        let summary = summaries.read("c1").await.unwrap();
        assert_eq!(summary.message_count, 3);
        assert_eq!(summary.created_at, created);
        assert!(summary.last_activity_at >= created);
    }

    #[tokio::test]
    async fn concurrent_touches_lose_no_increments() {
        let backing: Arc<InMemoryStore> = Arc::new(InMemoryStore::new());
        let summaries = Arc::new(SummaryStore::new(backing, 16));

        let tasks: Vec<_> = (0..12)
            .map(|_| {
                let summaries = Arc::clone(&summaries);
                tokio::spawn(async move { summaries.touch("c1", "u1", "Alice").await })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap());
        }

        assert_eq!(summaries.read("c1").await.unwrap().message_count, 12);
    }

    #[tokio::test]
    async fn archive_flips_active_flag() {
        let (_, summaries) = store();
        summaries.touch("c1", "u1", "Alice").await;

        assert!(summaries.archive("c1").await);
        assert!(!summaries.read("c1").await.unwrap().is_active);
        assert!(summaries.active().await.is_empty());

        // Archiving twice is a no-op, not a failure.
        assert!(summaries.archive("c1").await);
    }

    #[tokio::test]
    async fn archive_without_summary_reports_false() {
        let (_, summaries) = store();
        assert!(!summaries.archive("missing").await);
    }
}
