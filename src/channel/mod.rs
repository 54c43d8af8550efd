//! Channel Adapter boundary.
//!
//! The messaging transport is opaque to the core: it delivers inbound
//! turns and accepts outbound replies, nothing more. A structured payload
//! carrying `{username, password}` is how a submitted sign-in form reaches
//! the bot.

pub mod console;

pub use console::ConsoleAdapter;

use async_trait::async_trait;
use serde_json::{json, Value};

/// One inbound user turn as delivered by the channel.
#[derive(Debug, Clone)]
pub struct InboundTurn {
    pub conversation_id: String,
    pub user_id: String,
    pub display_name: String,
    pub text: String,
    /// Structured activity payload, if the turn carried one.
    pub payload: Option<Value>,
}

impl InboundTurn {
    pub fn text(
        conversation_id: impl Into<String>,
        user_id: impl Into<String>,
        display_name: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            user_id: user_id.into(),
            display_name: display_name.into(),
            text: text.into(),
            payload: None,
        }
    }

    /// Credentials from a submitted sign-in form, if present and complete.
    pub fn login_submission(&self) -> Option<(String, String)> {
        let payload = self.payload.as_ref()?;
        let username = payload.get("username")?.as_str()?.trim();
        let password = payload.get("password")?.as_str()?;
        if username.is_empty() || password.is_empty() {
            return None;
        }
        Some((username.to_string(), password.to_string()))
    }
}

/// What the bot hands back to the channel.
#[derive(Debug, Clone)]
pub enum OutboundReply {
    Text(String),
    Card(Value),
}

/// Opaque messaging transport.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    async fn send(&self, conversation_id: &str, reply: OutboundReply) -> anyhow::Result<()>;
}

/// Minimal sign-in form card.
pub fn sign_in_card() -> Value {
    json!({
        "type": "AdaptiveCard",
        "version": "1.3",
        "body": [
            {"type": "TextBlock", "text": "Sign in to continue", "weight": "Bolder"},
            {"type": "Input.Text", "id": "username", "label": "Username"},
            {"type": "Input.Text", "id": "password", "label": "Password", "style": "Password"}
        ],
        "actions": [
            {"type": "Action.Submit", "title": "Sign in"}
        ]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_submission_requires_both_fields() {
        let mut turn = InboundTurn::text("c1", "u1", "Alice", "");
        assert!(turn.login_submission().is_none());

        turn.payload = Some(json!({"username": "alice"}));
        assert!(turn.login_submission().is_none());

        turn.payload = Some(json!({"username": "  ", "password": "pw"}));
        assert!(turn.login_submission().is_none());

        turn.payload = Some(json!({"username": " alice ", "password": "pw"}));
        let (user, pass) = turn.login_submission().unwrap();
        assert_eq!(user, "alice");
        assert_eq!(pass, "pw");
    }

    #[test]
    fn sign_in_card_is_submittable() {
        let card = sign_in_card();
        assert_eq!(card["type"], "AdaptiveCard");
        assert_eq!(card["actions"][0]["type"], "Action.Submit");
    }
}
