//! Document Index client.
//!
//! Thin wrapper over the search backend: a query and a result budget go
//! out, ranked chunks come back. Exposed to the completion provider as a
//! function tool (see `tools::search`).

use crate::config::IndexConfig;
use crate::error::UpstreamError;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::time::{timeout, Duration};

const SERVICE: &str = "search service";

#[derive(Debug, Serialize)]
struct IndexRequest<'a> {
    query: &'a str,
    #[serde(rename = "topK")]
    top_k: usize,
}

/// One ranked chunk.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexHit {
    #[serde(rename = "sourceId")]
    pub source_id: String,
    pub text: String,
    pub score: f64,
}

#[derive(Debug, Deserialize)]
struct IndexResponse {
    #[serde(default)]
    results: Vec<IndexHit>,
}

pub struct DocumentIndex {
    client: Client,
    config: IndexConfig,
}

impl DocumentIndex {
    pub fn new(config: IndexConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub async fn search(&self, query: &str) -> Result<Vec<IndexHit>, UpstreamError> {
        let request = IndexRequest {
            query,
            top_k: self.config.top_k,
        };
        let send = self.client.post(&self.config.endpoint).json(&request).send();

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

        let body: IndexResponse = response.json().await.map_err(|err| {
            UpstreamError::Transport {
                service: SERVICE,
                detail: format!("response decode: {err}"),
            }
        })?;
        Ok(body.results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn index_for(server: &MockServer) -> DocumentIndex {
        DocumentIndex::new(IndexConfig {
            endpoint: format!("{}/api/query", server.uri()),
            top_k: 3,
            timeout_secs: 5,
        })
    }

    #[tokio::test]
    async fn search_returns_ranked_hits() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/query"))
            .and(body_partial_json(json!({"query": "vpn setup", "topK": 3})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    {"sourceId": "kb-12", "text": "Open the VPN client", "score": 0.92},
                    {"sourceId": "kb-40", "text": "Request remote access", "score": 0.61}
                ]
            })))
            .mount(&server)
            .await;

        let index = index_for(&server);
        let hits = index.search("vpn setup").await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].source_id, "kb-12");
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn missing_results_field_reads_as_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let index = index_for(&server);
        assert!(index.search("anything").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn outage_maps_to_typed_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/query"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let index = index_for(&server);
        let err = index.search("anything").await.unwrap_err();
        assert!(matches!(err, UpstreamError::Status { status: 502, .. }));
    }
}
