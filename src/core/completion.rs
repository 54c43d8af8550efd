//! Completion Provider client.
//!
//! Speaks the chat-completions wire shape: an ordered message list plus
//! function-tool definitions goes out, and either an assistant reply or a
//! set of tool invocations comes back. The turn handler owns the loop that
//! executes tools and feeds their results back in.

use crate::config::CompletionConfig;
use crate::error::UpstreamError;
use crate::store::MessageRecord;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::{sleep, timeout, Duration};

const SERVICE: &str = "assistant service";
const MAX_RETRIES: u32 = 3;
const BASE_DELAY_MS: u64 = 500;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl ChatMessage {
    fn plain(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
            tool_call_id: None,
            tool_calls: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain("assistant", content)
    }

    /// Result of a tool invocation, keyed back to the call that asked.
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: "tool".to_string(),
            content: content.into(),
            tool_call_id: Some(tool_call_id.into()),
            tool_calls: None,
        }
    }

    pub fn from_record(record: &MessageRecord) -> Self {
        Self::plain(record.role.as_str(), record.text.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded argument object, as the provider sends it.
    pub arguments: String,
}

/// Function-tool definition advertised to the provider.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    #[serde(rename = "type")]
    pub spec_type: String,
    pub function: FunctionSpec,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Serialize)]
struct CompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ToolSpec>>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCall>,
}

/// What the provider asked for next.
#[derive(Debug)]
pub enum CompletionOutcome {
    Reply(String),
    /// The assistant message to echo into the transcript plus the calls to
    /// execute before asking again.
    ToolCalls {
        assistant: ChatMessage,
        calls: Vec<ToolCall>,
    },
}

pub struct CompletionClient {
    client: Client,
    api_key: String,
    config: CompletionConfig,
}

impl CompletionClient {
    pub fn new(api_key: String, config: CompletionConfig) -> Self {
        Self {
            client: Client::new(),
            api_key,
            config,
        }
    }

    pub async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<CompletionOutcome, UpstreamError> {
        let request = CompletionRequest {
            model: self.config.model.clone(),
            messages: messages.to_vec(),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            tools: (!tools.is_empty()).then(|| tools.to_vec()),
        };

        let mut last_error = None;
        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay = BASE_DELAY_MS * 2_u64.pow(attempt - 1);
                tracing::warn!(
                    "[CompletionClient] Retrying (attempt {}/{}) after {}ms",
                    attempt + 1,
                    MAX_RETRIES,
                    delay
                );
                sleep(Duration::from_millis(delay)).await;
            }

            match self.attempt(&request).await {
                Ok(outcome) => return Ok(outcome),
                Err(err) => {
                    tracing::warn!("[CompletionClient] Request failed: {}", err);
                    last_error = Some(err);
                }
            }
        }

        Err(last_error.unwrap_or(UpstreamError::Transport {
            service: SERVICE,
            detail: "all retry attempts failed".to_string(),
        }))
    }

    async fn attempt(&self, request: &CompletionRequest) -> Result<CompletionOutcome, UpstreamError> {
        let send = self
            .client
            .post(&self.config.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(request)
            .send();

        let response = match timeout(Duration::from_secs(self.config.timeout_secs), send).await {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => {
                return Err(UpstreamError::Transport {
                    service: SERVICE,
                    detail: err.to_string(),
                })
            }
            Err(_) => {
                return Err(UpstreamError::Timeout {
                    service: SERVICE,
                    secs: self.config.timeout_secs,
                })
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Status {
                service: SERVICE,
                status: status.as_u16(),
            });
        }

        let body: CompletionResponse = response.json().await.map_err(|err| {
            UpstreamError::Transport {
                service: SERVICE,
                detail: format!("response decode: {err}"),
            }
        })?;

        let Some(choice) = body.choices.into_iter().next() else {
            return Err(UpstreamError::Transport {
                service: SERVICE,
                detail: "response carried no choices".to_string(),
            });
        };

        let message = choice.message;
        if message.tool_calls.is_empty() {
            Ok(CompletionOutcome::Reply(
                message.content.unwrap_or_default(),
            ))
        } else {
            let assistant = ChatMessage {
                role: "assistant".to_string(),
                content: message.content.unwrap_or_default(),
                tool_call_id: None,
                tool_calls: Some(message.tool_calls.clone()),
            };
            Ok(CompletionOutcome::ToolCalls {
                assistant,
                calls: message.tool_calls,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> CompletionClient {
        CompletionClient::new(
            "test-key".to_string(),
            CompletionConfig {
                endpoint: format!("{}/v1/chat/completions", server.uri()),
                model: "test-model".to_string(),
                max_tokens: 256,
                temperature: 0.0,
                timeout_secs: 5,
                max_tool_rounds: 4,
            },
        )
    }

    #[tokio::test]
    async fn plain_reply_is_returned() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "Hello back"}}]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let outcome = client
            .complete(&[ChatMessage::user("Hello")], &[])
            .await
            .unwrap();
        match outcome {
            CompletionOutcome::Reply(text) => assert_eq!(text, "Hello back"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn tool_calls_are_surfaced_with_echo_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call-1",
                        "type": "function",
                        "function": {"name": "search_knowledge_base", "arguments": "{\"query\":\"vpn\"}"}
                    }]
                }}]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let outcome = client
            .complete(&[ChatMessage::user("how do I set up vpn?")], &[])
            .await
            .unwrap();
        match outcome {
            CompletionOutcome::ToolCalls { assistant, calls } => {
                assert_eq!(calls.len(), 1);
                assert_eq!(calls[0].function.name, "search_knowledge_base");
                assert!(assistant.tool_calls.is_some());
                assert_eq!(assistant.role, "assistant");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn server_error_maps_to_status_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .complete(&[ChatMessage::user("hi")], &[])
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::Status { status: 503, .. }));
        assert!(!err.user_message().contains("503"));
    }

    #[tokio::test]
    async fn transient_failure_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "recovered"}}]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let outcome = client
            .complete(&[ChatMessage::user("hi")], &[])
            .await
            .unwrap();
        assert!(matches!(outcome, CompletionOutcome::Reply(text) if text == "recovered"));
    }
}
