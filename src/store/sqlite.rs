//! SQLite Document Store
//!
//! Durable backend. All three record kinds live in one `records` table
//! discriminated by a `kind` column, mirroring the single-collection
//! layout of the document database this store models. Summary writes are
//! version-guarded UPDATE/INSERT statements, so the precondition check and
//! the write are one statement.

use super::{
    ConversationSummary, DocumentStore, MessageRecord, Role, SessionRecord, Version, WriteOutcome,
};
use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const KIND_MESSAGE: &str = "message";
const KIND_SUMMARY: &str = "summary";
const KIND_SESSION: &str = "session";

/// SQLite-backed store. The connection sits behind a mutex; every
/// operation is a single short statement, so contention stays negligible.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Unavailable(format!("create store directory: {e}")))?;
        }
        let conn = Connection::open(path)
            .map_err(|e| StoreError::Unavailable(format!("open database: {e}")))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                conversation_id TEXT NOT NULL DEFAULT '',
                user_id TEXT NOT NULL,
                display_name TEXT NOT NULL DEFAULT '',
                role TEXT,
                text TEXT,
                bearer_token TEXT,
                message_count INTEGER NOT NULL DEFAULT 0,
                is_active INTEGER NOT NULL DEFAULT 1,
                version INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                last_activity_at TEXT,
                authenticated_at TEXT,
                expires_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_records_conversation
                ON records(kind, conversation_id, user_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_records_user
                ON records(kind, user_id, created_at);
            "#,
        )
        .map_err(store_err)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("connection lock poisoned".to_string()))
    }
}

fn store_err(err: rusqlite::Error) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

fn summary_key(conversation_id: &str) -> String {
    format!("summary#{conversation_id}")
}

fn session_key(user_id: &str) -> String {
    format!("session#{user_id}")
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StoreError::Unavailable(format!("corrupt timestamp {raw:?}: {e}")))
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<(String, String, String, String, String, String, Option<String>)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn build_message(
    (id, conversation_id, user_id, role, text, created_at, expires_at): (
        String,
        String,
        String,
        String,
        String,
        String,
        Option<String>,
    ),
) -> Result<MessageRecord, StoreError> {
    Ok(MessageRecord {
        id,
        conversation_id,
        user_id,
        role: Role::normalize(&role),
        text,
        created_at: parse_ts(&created_at)?,
        expires_at: expires_at.as_deref().map(parse_ts).transpose()?,
    })
}

const MESSAGE_COLUMNS: &str = "id, conversation_id, user_id, role, text, created_at, expires_at";

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn put_message(&self, record: &MessageRecord) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO records (id, kind, conversation_id, user_id, role, text, created_at, expires_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                record.id,
                KIND_MESSAGE,
                record.conversation_id,
                record.user_id,
                record.role.as_str(),
                record.text,
                record.created_at.to_rfc3339(),
                record.expires_at.map(|at| at.to_rfc3339()),
            ],
        )
        .map_err(store_err)?;
        Ok(())
    }

    async fn messages_for_conversation(
        &self,
        conversation_id: &str,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<MessageRecord>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                r#"
                SELECT {MESSAGE_COLUMNS} FROM records
                WHERE kind = ?1 AND conversation_id = ?2 AND user_id = ?3
                ORDER BY created_at DESC, id DESC
                LIMIT ?4
                "#
            ))
            .map_err(store_err)?;
        let rows = stmt
            .query_map(
                params![KIND_MESSAGE, conversation_id, user_id, limit as i64],
                message_from_row,
            )
            .map_err(store_err)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(build_message(row.map_err(store_err)?)?);
        }
        // Query walked newest-first to apply the limit; callers get ascending.
        records.reverse();
        Ok(records)
    }

    async fn messages_for_user(&self, user_id: &str) -> Result<Vec<MessageRecord>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                r#"
                SELECT {MESSAGE_COLUMNS} FROM records
                WHERE kind = ?1 AND user_id = ?2
                ORDER BY created_at ASC, id ASC
                "#
            ))
            .map_err(store_err)?;
        let rows = stmt
            .query_map(params![KIND_MESSAGE, user_id], message_from_row)
            .map_err(store_err)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(build_message(row.map_err(store_err)?)?);
        }
        Ok(records)
    }

    async fn read_summary(
        &self,
        conversation_id: &str,
    ) -> Result<Option<(ConversationSummary, Version)>, StoreError> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                r#"
                SELECT conversation_id, user_id, display_name, message_count,
                       created_at, last_activity_at, is_active, version
                FROM records WHERE id = ?1
                "#,
                params![summary_key(conversation_id)],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, Option<String>>(5)?,
                        row.get::<_, bool>(6)?,
                        row.get::<_, i64>(7)?,
                    ))
                },
            )
            .optional()
            .map_err(store_err)?;

        let Some((cid, user_id, display_name, count, created, last, is_active, version)) = row
        else {
            return Ok(None);
        };
        let created_at = parse_ts(&created)?;
        let summary = ConversationSummary {
            conversation_id: cid,
            user_id,
            display_name,
            message_count: count.max(0) as u64,
            created_at,
            last_activity_at: last.as_deref().map(parse_ts).transpose()?.unwrap_or(created_at),
            is_active,
        };
        Ok(Some((summary, version.max(0) as Version)))
    }

    async fn write_summary(
        &self,
        summary: &ConversationSummary,
        expected: Option<Version>,
    ) -> Result<WriteOutcome, StoreError> {
        let conn = self.conn()?;
        let changed = match expected {
            // Insert-if-absent: OR IGNORE makes the existence check and the
            // insert one atomic statement.
            None => conn
                .execute(
                    r#"
                    INSERT OR IGNORE INTO records
                        (id, kind, conversation_id, user_id, display_name, message_count,
                         is_active, version, created_at, last_activity_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8, ?9)
                    "#,
                    params![
                        summary_key(&summary.conversation_id),
                        KIND_SUMMARY,
                        summary.conversation_id,
                        summary.user_id,
                        summary.display_name,
                        summary.message_count as i64,
                        summary.is_active,
                        summary.created_at.to_rfc3339(),
                        summary.last_activity_at.to_rfc3339(),
                    ],
                )
                .map_err(store_err)?,
            // Update-if-version-matches.
            Some(version) => conn
                .execute(
                    r#"
                    UPDATE records
                    SET user_id = ?1, display_name = ?2, message_count = ?3,
                        is_active = ?4, last_activity_at = ?5, version = version + 1
                    WHERE id = ?6 AND version = ?7
                    "#,
                    params![
                        summary.user_id,
                        summary.display_name,
                        summary.message_count as i64,
                        summary.is_active,
                        summary.last_activity_at.to_rfc3339(),
                        summary_key(&summary.conversation_id),
                        version as i64,
                    ],
                )
                .map_err(store_err)?,
        };

        Ok(if changed == 1 {
            WriteOutcome::Applied
        } else {
            WriteOutcome::Conflict
        })
    }

    async fn active_summaries(&self) -> Result<Vec<ConversationSummary>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                r#"
                SELECT conversation_id, user_id, display_name, message_count,
                       created_at, last_activity_at, is_active
                FROM records
                WHERE kind = ?1 AND is_active = 1
                ORDER BY last_activity_at DESC
                "#,
            )
            .map_err(store_err)?;
        let rows = stmt
            .query_map(params![KIND_SUMMARY], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, bool>(6)?,
                ))
            })
            .map_err(store_err)?;

        let mut summaries = Vec::new();
        for row in rows {
            let (conversation_id, user_id, display_name, count, created, last, is_active) =
                row.map_err(store_err)?;
            let created_at = parse_ts(&created)?;
            summaries.push(ConversationSummary {
                conversation_id,
                user_id,
                display_name,
                message_count: count.max(0) as u64,
                created_at,
                last_activity_at: last.as_deref().map(parse_ts).transpose()?.unwrap_or(created_at),
                is_active,
            });
        }
        Ok(summaries)
    }

    async fn read_session(&self, user_id: &str) -> Result<Option<SessionRecord>, StoreError> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT user_id, display_name, bearer_token, authenticated_at FROM records WHERE id = ?1",
                params![session_key(user_id)],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()
            .map_err(store_err)?;

        let Some((user_id, display_name, bearer_token, authenticated_at)) = row else {
            return Ok(None);
        };
        Ok(Some(SessionRecord {
            user_id,
            display_name,
            bearer_token,
            authenticated_at: parse_ts(&authenticated_at)?,
        }))
    }

    async fn put_session(&self, record: &SessionRecord) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO records (id, kind, user_id, display_name, bearer_token, created_at, authenticated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
            ON CONFLICT(id) DO UPDATE SET
                display_name = excluded.display_name,
                bearer_token = excluded.bearer_token,
                authenticated_at = excluded.authenticated_at
            "#,
            params![
                session_key(&record.user_id),
                KIND_SESSION,
                record.user_id,
                record.display_name,
                record.bearer_token,
                record.authenticated_at.to_rfc3339(),
            ],
        )
        .map_err(store_err)?;
        Ok(())
    }

    async fn delete_session(&self, user_id: &str) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM records WHERE id = ?1",
            params![session_key(user_id)],
        )
        .map_err(store_err)?;
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let conn = self.conn()?;
        let removed = conn
            .execute(
                "DELETE FROM records WHERE kind = ?1 AND expires_at IS NOT NULL AND expires_at <= ?2",
                params![KIND_MESSAGE, now.to_rfc3339()],
            )
            .map_err(store_err)?;
        Ok(removed as u64)
    }
}
