//! Credential Verifier client.
//!
//! One POST against the corporate identity API. The response carries a
//! numeric `code` whose sign convention (`0` means valid) is owned by
//! exactly one predicate here, checked by equality and never truthiness.
//! Transport trouble and non-2xx statuses become a generic
//! "authentication unavailable" outcome; the raw detail goes to the log
//! only.

use crate::config::VerifierConfig;
use crate::error::UpstreamError;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::time::{timeout, Duration};

const SERVICE: &str = "authentication service";
const DEFAULT_REJECTION: &str = "Invalid username or password.";

#[derive(Debug, Serialize)]
struct VerifyRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    #[serde(default)]
    code: i64,
    #[serde(rename = "displayName", default)]
    display_name: Option<String>,
    #[serde(default)]
    surname1: Option<String>,
    #[serde(default)]
    surname2: Option<String>,
    #[serde(rename = "bearerToken", default)]
    bearer_token: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl VerifyResponse {
    // Confirmed convention: 0 is the success code, any other value a
    // rejection. See DESIGN.md.
    fn is_valid(&self) -> bool {
        self.code == 0
    }

    fn full_name(&self, fallback: &str) -> String {
        let parts: Vec<&str> = [
            self.display_name.as_deref(),
            self.surname1.as_deref(),
            self.surname2.as_deref(),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect();

        if parts.is_empty() {
            fallback.to_string()
        } else {
            parts.join(" ")
        }
    }
}

/// Profile returned for a verified user.
#[derive(Debug, Clone)]
pub struct VerifiedProfile {
    pub display_name: String,
    pub bearer_token: String,
}

/// Outcome of a credential check that reached the verifier.
#[derive(Debug)]
pub enum VerifyOutcome {
    Valid(VerifiedProfile),
    Rejected { message: String },
}

pub struct CredentialVerifier {
    client: Client,
    config: VerifierConfig,
}

impl CredentialVerifier {
    pub fn new(config: VerifierConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub async fn verify(
        &self,
        username: &str,
        password: &str,
    ) -> Result<VerifyOutcome, UpstreamError> {
        let send = self
            .client
            .post(&self.config.endpoint)
            .json(&VerifyRequest { username, password })
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
            tracing::warn!("[CredentialVerifier] Verifier returned status {}", status);
            return Err(UpstreamError::Status {
                service: SERVICE,
                status: status.as_u16(),
            });
        }

        let body: VerifyResponse = response.json().await.map_err(|err| {
            UpstreamError::Transport {
                service: SERVICE,
                detail: format!("response decode: {err}"),
            }
        })?;

        if !body.is_valid() {
            let message = body
                .message
                .clone()
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_REJECTION.to_string());
            tracing::info!("[CredentialVerifier] Credentials rejected (code {})", body.code);
            return Ok(VerifyOutcome::Rejected { message });
        }

        let Some(bearer_token) = body.bearer_token.clone().filter(|t| !t.is_empty()) else {
            // A "valid" verdict without a token is a broken verifier, not a
            // rejected user.
            return Err(UpstreamError::Transport {
                service: SERVICE,
                detail: "valid response carried no bearer token".to_string(),
            });
        };

        Ok(VerifyOutcome::Valid(VerifiedProfile {
            display_name: body.full_name(username),
            bearer_token,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn verifier_for(server: &MockServer) -> CredentialVerifier {
        CredentialVerifier::new(VerifierConfig {
            endpoint: format!("{}/api/credentials/validate", server.uri()),
            timeout_secs: 5,
        })
    }

    #[tokio::test]
    async fn valid_credentials_yield_profile_and_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/credentials/validate"))
            .and(body_json(json!({"username": "alice", "password": "s3cret"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 0,
                "displayName": "Alice",
                "surname1": "Anders",
                "surname2": "Berg",
                "bearerToken": "tok-abc",
                "message": "ok"
            })))
            .mount(&server)
            .await;

        let verifier = verifier_for(&server);
        let outcome = verifier.verify("alice", "s3cret").await.unwrap();
        match outcome {
            VerifyOutcome::Valid(profile) => {
                assert_eq!(profile.display_name, "Alice Anders Berg");
                assert_eq!(profile.bearer_token, "tok-abc");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn nonzero_code_is_a_rejection_with_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/credentials/validate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 17,
                "message": "Account locked"
            })))
            .mount(&server)
            .await;

        let verifier = verifier_for(&server);
        let outcome = verifier.verify("alice", "wrong").await.unwrap();
        assert!(matches!(
            outcome,
            VerifyOutcome::Rejected { message } if message == "Account locked"
        ));
    }

    #[tokio::test]
    async fn rejection_without_message_uses_default() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/credentials/validate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"code": 1})))
            .mount(&server)
            .await;

        let verifier = verifier_for(&server);
        let outcome = verifier.verify("alice", "wrong").await.unwrap();
        assert!(matches!(
            outcome,
            VerifyOutcome::Rejected { message } if message == DEFAULT_REJECTION
        ));
    }

    #[tokio::test]
    async fn server_failure_maps_to_generic_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/credentials/validate"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let verifier = verifier_for(&server);
        let err = verifier.verify("alice", "s3cret").await.unwrap_err();
        assert!(matches!(err, UpstreamError::Status { status: 500, .. }));
        let msg = err.user_message();
        assert!(msg.contains("authentication service"));
        assert!(!msg.contains("500"));
    }

    #[tokio::test]
    async fn valid_without_token_is_an_upstream_fault() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/credentials/validate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 0,
                "displayName": "Alice"
            })))
            .mount(&server)
            .await;

        let verifier = verifier_for(&server);
        let err = verifier.verify("alice", "s3cret").await.unwrap_err();
        assert!(matches!(err, UpstreamError::Transport { .. }));
    }
}
