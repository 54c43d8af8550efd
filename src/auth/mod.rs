//! Auth State Synchronization
//!
//! A user's authentication state lives in two places with different
//! lifetimes: a process-local cache (authoritative for "this process saw a
//! fresh login", lost on restart) and a durable session record
//! (authoritative across restarts and instances). The synchronizer owns
//! the reconciliation table:
//!
//! | cache | record | action                      | result            |
//! |-------|--------|-----------------------------|-------------------|
//! | yes   | yes    | none                        | authenticated     |
//! | yes   | no     | write cache through to record | authenticated   |
//! | no    | yes    | hydrate record into cache   | authenticated     |
//! | no    | no     | none                        | not authenticated |
//!
//! Reconciliation always repairs toward consistency at access time; it
//! never rejects a user because the tiers disagree. Forcing a valid user
//! back through login costs more than a brief window of duplicated state.

use crate::store::SessionRecord;
use async_trait::async_trait;
use std::sync::Arc;

pub mod durable;
pub mod memory;

pub use durable::DurableTier;
pub use memory::MemoryTier;

/// Loggable stand-in for a bearer token. The full token never reaches the
/// log stream.
pub fn token_fingerprint(token: &str) -> String {
    let prefix: String = token.chars().take(6).collect();
    format!("{prefix}…")
}

/// One storage tier for session state. Tier failures are reported, not
/// propagated; an unavailable tier reads as "no observation".
#[async_trait]
pub trait SessionTier: Send + Sync {
    async fn get(&self, user_id: &str) -> Option<SessionRecord>;

    /// Returns `false` when the tier could not take the write.
    async fn put(&self, session: &SessionRecord) -> bool;

    /// Returns `false` when the tier could not take the delete.
    async fn remove(&self, user_id: &str) -> bool;
}

/// Composes the two tiers and owns every auth state transition.
pub struct AuthSynchronizer {
    cache: Arc<dyn SessionTier>,
    durable: Arc<dyn SessionTier>,
}

impl AuthSynchronizer {
    pub fn new(cache: Arc<dyn SessionTier>, durable: Arc<dyn SessionTier>) -> Self {
        Self { cache, durable }
    }

    pub async fn is_authenticated(&self, user_id: &str) -> bool {
        self.session(user_id).await.is_some()
    }

    /// Resolve the current session, repairing whichever tier is behind.
    pub async fn session(&self, user_id: &str) -> Option<SessionRecord> {
        if let Some(session) = self.cache.get(user_id).await {
            if self.durable.get(user_id).await.is_none() {
                if self.durable.put(&session).await {
                    tracing::debug!(user_id, "session written through to durable tier");
                } else {
                    tracing::warn!(user_id, "session write-through failed, cache remains authoritative");
                }
            }
            return Some(session);
        }

        match self.durable.get(user_id).await {
            Some(session) => {
                if self.cache.put(&session).await {
                    tracing::debug!(user_id, "session hydrated into cache");
                } else {
                    tracing::warn!(user_id, "session cache hydration failed");
                }
                Some(session)
            }
            None => None,
        }
    }

    /// Record a fresh login in both tiers, unconditionally overwriting any
    /// prior state. Only the owning user drives logins, so last-login-wins
    /// needs no concurrency control.
    pub async fn login(&self, session: SessionRecord) {
        let user_id = session.user_id.clone();
        let cached = self.cache.put(&session).await;
        let persisted = self.durable.put(&session).await;
        tracing::info!(
            user_id,
            token = %token_fingerprint(&session.bearer_token),
            cached,
            persisted,
            "user logged in"
        );
        if !persisted {
            tracing::warn!(user_id, "durable session write failed, login held in cache only");
        }
    }

    /// Clear both tiers.
    pub async fn logout(&self, user_id: &str) {
        let cache_cleared = self.cache.remove(user_id).await;
        let record_cleared = self.durable.remove(user_id).await;
        tracing::info!(user_id, cache_cleared, record_cleared, "user logged out");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn session(user_id: &str) -> SessionRecord {
        SessionRecord {
            user_id: user_id.to_string(),
            display_name: "Alice".to_string(),
            bearer_token: "tok-secret-material".to_string(),
            authenticated_at: Utc::now(),
        }
    }

    fn synchronizer() -> (Arc<MemoryTier>, Arc<MemoryTier>, AuthSynchronizer) {
        let cache = Arc::new(MemoryTier::new());
        let durable = Arc::new(MemoryTier::new());
        let auth = AuthSynchronizer::new(cache.clone(), durable.clone());
        (cache, durable, auth)
    }

    #[test]
    fn fingerprint_hides_token_body() {
        let print = token_fingerprint("tok-secret-material");
        assert_eq!(print, "tok-se…");
        assert!(!print.contains("secret-material"));
    }

    #[tokio::test]
    async fn unknown_user_is_not_authenticated() {
        let (_, _, auth) = synchronizer();
        assert!(!auth.is_authenticated("u1").await);
    }

    #[tokio::test]
    async fn login_sets_both_tiers() {
        let (cache, durable, auth) = synchronizer();
        auth.login(session("u1")).await;

        assert!(auth.is_authenticated("u1").await);
        assert!(cache.get("u1").await.is_some());
        assert!(durable.get("u1").await.is_some());
    }

    #[tokio::test]
    async fn cache_hit_writes_through_missing_record() {
        let (cache, durable, auth) = synchronizer();
        // Simulate a login recorded in-process whose durable write was lost.
        cache.put(&session("u1")).await;
        assert!(durable.get("u1").await.is_none());

        assert!(auth.is_authenticated("u1").await);
        assert!(durable.get("u1").await.is_some());
    }

    #[tokio::test]
    async fn durable_record_hydrates_cold_cache() {
        let (cache, durable, auth) = synchronizer();
        // Simulate a restart: the durable record survived, the cache did not.
        durable.put(&session("u1")).await;
        assert!(cache.get("u1").await.is_none());

        assert!(auth.is_authenticated("u1").await);
        assert!(cache.get("u1").await.is_some());
    }

    #[tokio::test]
    async fn repeated_checks_are_idempotent_and_converged() {
        let (cache, durable, auth) = synchronizer();
        durable.put(&session("u1")).await;

        let first = auth.is_authenticated("u1").await;
        let second = auth.is_authenticated("u1").await;
        assert_eq!(first, second);
        assert_eq!(cache.get("u1").await.is_some(), durable.get("u1").await.is_some());

        let first = auth.is_authenticated("nobody").await;
        let second = auth.is_authenticated("nobody").await;
        assert_eq!(first, second);
        assert!(!first);
    }

    #[tokio::test]
    async fn logout_clears_both_tiers() {
        let (cache, durable, auth) = synchronizer();
        auth.login(session("u1")).await;
        auth.logout("u1").await;

        assert!(!auth.is_authenticated("u1").await);
        assert!(cache.get("u1").await.is_none());
        assert!(durable.get("u1").await.is_none());
    }

    #[tokio::test]
    async fn relogin_overwrites_previous_token() {
        let (_, durable, auth) = synchronizer();
        auth.login(session("u1")).await;

        let mut renewed = session("u1");
        renewed.bearer_token = "tok-renewed".to_string();
        auth.login(renewed).await;

        assert_eq!(durable.get("u1").await.unwrap().bearer_token, "tok-renewed");
    }
}
