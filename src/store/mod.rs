//! Conversation Store Abstraction
//!
//! One logical document collection holds three record kinds (messages,
//! conversation summaries, session records), keyed by `(conversation_id,
//! user_id)` for partition locality. Backends are hidden behind the
//! [`DocumentStore`] trait; the only mutation primitives are an append for
//! immutable messages and a version-preconditioned conditional write for
//! summaries, so no component ever does a blind read-modify-write.

use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod history;
pub mod memory;
pub mod messages;
pub mod sqlite;
pub mod summary;

pub use history::HistoryReader;
pub use memory::InMemoryStore;
pub use messages::MessageStore;
pub use sqlite::SqliteStore;
pub use summary::SummaryStore;

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }

    /// Normalize a stored role string. Foreign values fall back to `user`
    /// so history handed to the completion provider always carries a known
    /// role.
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "user" => Self::User,
            "assistant" => Self::Assistant,
            "system" => Self::System,
            other => {
                tracing::debug!(role = other, "unknown stored role, normalizing to user");
                Self::User
            }
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable conversation turn. Never updated after the write; only
/// retention cleanup may remove it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    pub conversation_id: String,
    pub user_id: String,
    pub role: Role,
    pub text: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Mutable per-conversation aggregate, lazily created on first message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub conversation_id: String,
    pub user_id: String,
    pub display_name: String,
    pub message_count: u64,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub is_active: bool,
}

/// Durable half of a user's authentication state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub user_id: String,
    pub display_name: String,
    pub bearer_token: String,
    pub authenticated_at: DateTime<Utc>,
}

/// Version observed when reading a summary, used as the precondition for
/// the next conditional write.
pub type Version = u64;

/// Result of a conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Applied,
    /// The precondition no longer held; a concurrent writer got there first.
    Conflict,
}

/// Document-database surface the conversation store is built on.
///
/// Implementations must make `write_summary` atomic with respect to its
/// version precondition; everything else is plain reads and appends.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Durably append one message record.
    async fn put_message(&self, record: &MessageRecord) -> Result<(), StoreError>;

    /// The most recent `limit` records of a conversation, ascending by
    /// `created_at` (ties broken by `id`).
    async fn messages_for_conversation(
        &self,
        conversation_id: &str,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<MessageRecord>, StoreError>;

    /// Every record a user has ever written, any conversation. This is the
    /// wide scan behind the history fallback strategy, not a normal path.
    async fn messages_for_user(&self, user_id: &str) -> Result<Vec<MessageRecord>, StoreError>;

    async fn read_summary(
        &self,
        conversation_id: &str,
    ) -> Result<Option<(ConversationSummary, Version)>, StoreError>;

    /// Conditional write. `expected = None` asserts no summary exists yet;
    /// `expected = Some(v)` asserts the stored version is still `v`.
    async fn write_summary(
        &self,
        summary: &ConversationSummary,
        expected: Option<Version>,
    ) -> Result<WriteOutcome, StoreError>;

    /// Summaries still marked active, most recently active first.
    async fn active_summaries(&self) -> Result<Vec<ConversationSummary>, StoreError>;

    async fn read_session(&self, user_id: &str) -> Result<Option<SessionRecord>, StoreError>;

    /// Unconditional upsert; last login wins.
    async fn put_session(&self, record: &SessionRecord) -> Result<(), StoreError>;

    async fn delete_session(&self, user_id: &str) -> Result<(), StoreError>;

    /// Remove message records past their retention horizon. Returns the
    /// number of records removed.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}

/// Ascending `(created_at, id)`. The id tiebreak is stable because ids are
/// creation-ordered UUIDv7.
pub(crate) fn sort_chronologically(records: &mut [MessageRecord]) {
    records.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(id: &str, ts: i64) -> MessageRecord {
        MessageRecord {
            id: id.to_string(),
            conversation_id: "c1".to_string(),
            user_id: "u1".to_string(),
            role: Role::User,
            text: "x".to_string(),
            created_at: Utc.timestamp_opt(ts, 0).unwrap(),
            expires_at: None,
        }
    }

    #[test]
    fn role_normalization() {
        assert_eq!(Role::normalize("Assistant"), Role::Assistant);
        assert_eq!(Role::normalize(" system "), Role::System);
        assert_eq!(Role::normalize("bot"), Role::User);
    }

    #[test]
    fn sort_orders_by_timestamp_then_id() {
        let mut records = vec![record("b", 20), record("z", 10), record("a", 20)];
        sort_chronologically(&mut records);
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["z", "a", "b"]);
    }
}
