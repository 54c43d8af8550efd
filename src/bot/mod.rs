//! Turn handler.
//!
//! One inbound turn is handled to completion: resolve authentication,
//! run the login flow for form submissions, otherwise reconstruct history
//! and drive the completion provider's tool loop, send the reply, then
//! persist both sides of the exchange. Persistence trouble never stops a
//! reply; completion trouble aborts the turn with an apology. Raw errors
//! never cross the channel boundary.

use crate::auth::AuthSynchronizer;
use crate::channel::{sign_in_card, ChannelAdapter, InboundTurn, OutboundReply};
use crate::core::completion::{ChatMessage, CompletionClient, CompletionOutcome};
use crate::core::verifier::{CredentialVerifier, VerifyOutcome};
use crate::store::{HistoryReader, MessageStore, Role, SessionRecord};
use crate::tools::{executor::ToolExecutor, registry::ToolRegistry, ToolResult};
use chrono::Utc;
use std::sync::Arc;

const SYSTEM_PROMPT: &str = "You are a helpful corporate assistant. Answer \
concisely. When a question concerns internal procedures, tooling, or \
policies, search the knowledge base before answering and ground your \
answer in what you find.";

const APOLOGY: &str = "Sorry, I couldn't finish handling that. Please try again.";

pub struct Bot {
    auth: AuthSynchronizer,
    history: HistoryReader,
    messages: MessageStore,
    completion: CompletionClient,
    verifier: CredentialVerifier,
    tools: Arc<ToolRegistry>,
    executor: ToolExecutor,
    history_limit: usize,
    max_tool_rounds: u32,
}

impl Bot {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        auth: AuthSynchronizer,
        history: HistoryReader,
        messages: MessageStore,
        completion: CompletionClient,
        verifier: CredentialVerifier,
        tools: Arc<ToolRegistry>,
        executor: ToolExecutor,
        history_limit: usize,
        max_tool_rounds: u32,
    ) -> Self {
        Self {
            auth,
            history,
            messages,
            completion,
            verifier,
            tools,
            executor,
            history_limit,
            max_tool_rounds,
        }
    }

    pub async fn handle_turn(
        &self,
        turn: &InboundTurn,
        channel: &dyn ChannelAdapter,
    ) -> anyhow::Result<()> {
        if let Some((username, password)) = turn.login_submission() {
            return self.handle_login(turn, &username, &password, channel).await;
        }

        if turn.text.trim().eq_ignore_ascii_case("logout") {
            self.auth.logout(&turn.user_id).await;
            return channel
                .send(
                    &turn.conversation_id,
                    OutboundReply::Text("You're signed out.".to_string()),
                )
                .await;
        }

        if !self.auth.is_authenticated(&turn.user_id).await {
            tracing::debug!(user_id = %turn.user_id, "unauthenticated turn, prompting for sign-in");
            return channel
                .send(&turn.conversation_id, OutboundReply::Card(sign_in_card()))
                .await;
        }

        let reply = self.respond(turn).await;
        channel
            .send(&turn.conversation_id, OutboundReply::Text(reply.clone()))
            .await?;

        // The reply is out; persistence is best-effort from here. User turn
        // first so its timestamp precedes the reply's.
        self.persist(turn, Role::User, &turn.text).await;
        self.persist(turn, Role::Assistant, &reply).await;
        Ok(())
    }

    async fn handle_login(
        &self,
        turn: &InboundTurn,
        username: &str,
        password: &str,
        channel: &dyn ChannelAdapter,
    ) -> anyhow::Result<()> {
        let reply = match self.verifier.verify(username, password).await {
            Ok(VerifyOutcome::Valid(profile)) => {
                let display_name = profile.display_name.clone();
                self.auth
                    .login(SessionRecord {
                        user_id: turn.user_id.clone(),
                        display_name: profile.display_name,
                        bearer_token: profile.bearer_token,
                        authenticated_at: Utc::now(),
                    })
                    .await;
                format!("Welcome, {display_name}! You're signed in.")
            }
            Ok(VerifyOutcome::Rejected { message }) => message,
            Err(err) => {
                tracing::warn!(user_id = %turn.user_id, error = %err, "credential verification failed");
                err.user_message()
            }
        };

        channel
            .send(&turn.conversation_id, OutboundReply::Text(reply))
            .await
    }

    /// History plus the current turn through the completion provider's
    /// tool loop, down to a final text reply.
    async fn respond(&self, turn: &InboundTurn) -> String {
        let history = self
            .history
            .history(&turn.conversation_id, &turn.user_id, self.history_limit)
            .await;

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(SYSTEM_PROMPT));
        messages.extend(history.iter().map(ChatMessage::from_record));
        messages.push(ChatMessage::user(turn.text.clone()));

        let specs = self.tools.specs();
        for round in 0..=self.max_tool_rounds {
            match self.completion.complete(&messages, &specs).await {
                Ok(CompletionOutcome::Reply(text)) if text.trim().is_empty() => {
                    tracing::warn!(conversation_id = %turn.conversation_id, "provider returned empty reply");
                    return APOLOGY.to_string();
                }
                Ok(CompletionOutcome::Reply(text)) => return text,
                Ok(CompletionOutcome::ToolCalls { assistant, calls }) => {
                    if round == self.max_tool_rounds {
                        tracing::warn!(
                            conversation_id = %turn.conversation_id,
                            rounds = self.max_tool_rounds,
                            "tool round budget exhausted"
                        );
                        return APOLOGY.to_string();
                    }
                    messages.push(assistant);
                    for call in calls {
                        let content = self.run_tool(&call.function.name, &call.function.arguments).await;
                        messages.push(ChatMessage::tool(call.id, content));
                    }
                }
                Err(err) => {
                    tracing::warn!(conversation_id = %turn.conversation_id, error = %err, "completion failed");
                    return err.user_message();
                }
            }
        }

        APOLOGY.to_string()
    }

    async fn run_tool(&self, name: &str, raw_arguments: &str) -> String {
        let Some(tool) = self.tools.get(name) else {
            tracing::warn!(tool = name, "provider requested unknown tool");
            return ToolResult::failure(format!("unknown tool '{name}'")).into_tool_content();
        };
        let args = match serde_json::from_str(raw_arguments) {
            Ok(args) => args,
            Err(err) => {
                tracing::warn!(tool = name, error = %err, "tool arguments were not valid JSON");
                return ToolResult::failure("invalid arguments: not a JSON object").into_tool_content();
            }
        };
        tracing::info!(tool = name, "executing tool");
        self.executor.execute(tool, args).await.into_tool_content()
    }

    async fn persist(&self, turn: &InboundTurn, role: Role, text: &str) {
        if let Err(err) = self
            .messages
            .append(
                &turn.conversation_id,
                &turn.user_id,
                &turn.display_name,
                role,
                text,
            )
            .await
        {
            tracing::warn!(
                conversation_id = %turn.conversation_id,
                role = %role,
                error = %err,
                "turn not persisted, conversation continues without it"
            );
        }
    }
}
