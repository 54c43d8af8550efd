//! Console channel adapter for local development. Renders text replies
//! directly and cards as a short hint, since a terminal has no form
//! support.

use super::{ChannelAdapter, OutboundReply};
use crate::utils;
use async_trait::async_trait;

#[derive(Default)]
pub struct ConsoleAdapter;

impl ConsoleAdapter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ChannelAdapter for ConsoleAdapter {
    async fn send(&self, _conversation_id: &str, reply: OutboundReply) -> anyhow::Result<()> {
        match reply {
            OutboundReply::Text(text) => utils::print_bot(&text),
            OutboundReply::Card(card) => {
                if card["type"] == "AdaptiveCard" {
                    utils::print_system("(sign-in form) use `/login <username> <password>`");
                } else {
                    utils::print_system(&card.to_string());
                }
            }
        }
        Ok(())
    }
}
