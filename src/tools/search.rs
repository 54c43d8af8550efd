//! Knowledge-base search tool backed by the Document Index.

use super::{Tool, ToolMetadata, ToolParameter, ToolResult};
use crate::core::index::{DocumentIndex, IndexHit};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

pub struct KnowledgeSearchTool {
    index: Arc<DocumentIndex>,
}

impl KnowledgeSearchTool {
    pub fn new(index: Arc<DocumentIndex>) -> Self {
        Self { index }
    }
}

/// Compact numbered context block the model can cite from.
fn render_hits(hits: &[IndexHit]) -> String {
    hits.iter()
        .enumerate()
        .map(|(i, hit)| {
            format!(
                "[{}] ({}, score {:.2}) {}",
                i + 1,
                hit.source_id,
                hit.score,
                hit.text.trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl Tool for KnowledgeSearchTool {
    fn metadata(&self) -> ToolMetadata {
        ToolMetadata {
            name: "search_knowledge_base".to_string(),
            description: "Search the corporate knowledge base for documentation relevant to the user's question.".to_string(),
            parameters: vec![ToolParameter {
                name: "query".to_string(),
                param_type: "string".to_string(),
                description: "Search terms describing what to look for".to_string(),
                required: true,
            }],
        }
    }

    fn validate(&self, args: &Value) -> Result<()> {
        let query = args["query"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("'query' parameter is required and must be a string"))?;
        if query.trim().is_empty() {
            anyhow::bail!("'query' must not be empty");
        }
        Ok(())
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        self.validate(&args)?;
        let query = args["query"].as_str().unwrap_or_default();

        tracing::info!(query, "searching knowledge base");
        match self.index.search(query).await {
            Ok(hits) if hits.is_empty() => {
                Ok(ToolResult::success("No matching documents found."))
            }
            Ok(hits) => Ok(ToolResult::success(render_hits(&hits))),
            Err(err) => {
                tracing::warn!(error = %err, "knowledge base search failed");
                Ok(ToolResult::failure(format!("search unavailable: {err}")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexConfig;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn tool_for(server: &MockServer) -> KnowledgeSearchTool {
        KnowledgeSearchTool::new(Arc::new(DocumentIndex::new(IndexConfig {
            endpoint: format!("{}/api/query", server.uri()),
            top_k: 3,
            timeout_secs: 5,
        })))
    }

    #[tokio::test]
    async fn hits_render_as_numbered_block() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    {"sourceId": "kb-1", "text": "Reset via the portal", "score": 0.9},
                    {"sourceId": "kb-2", "text": "Call the helpdesk", "score": 0.5}
                ]
            })))
            .mount(&server)
            .await;

        let tool = tool_for(&server).await;
        let result = tool.execute(json!({"query": "password reset"})).await.unwrap();
        assert!(result.success);
        assert!(result.output.starts_with("[1] (kb-1"));
        assert!(result.output.contains("[2] (kb-2"));
    }

    #[tokio::test]
    async fn empty_query_fails_validation() {
        let server = MockServer::start().await;
        let tool = tool_for(&server).await;
        assert!(tool.validate(&json!({"query": "  "})).is_err());
        assert!(tool.validate(&json!({})).is_err());
        assert!(tool.validate(&json!({"query": "vpn"})).is_ok());
    }

    #[tokio::test]
    async fn index_outage_becomes_tool_failure_not_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/query"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let tool = tool_for(&server).await;
        let result = tool.execute(json!({"query": "vpn"})).await.unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("search unavailable"));
    }
}
