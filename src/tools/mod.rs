//! Function-calling tools offered to the completion provider.
//!
//! Each tool hides its backend behind the [`Tool`] trait; the registry
//! owns the set advertised for a turn and the executor wraps invocations
//! with bounded retries. Tool output always flows back to the provider as
//! a tool-role message, success or not, so the model can recover in
//! conversation instead of the turn aborting.

pub mod executor;
pub mod registry;
pub mod search;

use crate::core::completion::{FunctionSpec, ToolSpec};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// One named parameter in a tool's schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    pub param_type: String,
    pub description: String,
    pub required: bool,
}

/// What the tool does and how to call it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolMetadata {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ToolParameter>,
}

impl ToolMetadata {
    /// Function-tool definition in the shape the completion provider
    /// expects.
    pub fn to_spec(&self) -> ToolSpec {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();
        for param in &self.parameters {
            properties.insert(
                param.name.clone(),
                json!({"type": param.param_type, "description": param.description}),
            );
            if param.required {
                required.push(param.name.clone());
            }
        }

        ToolSpec {
            spec_type: "function".to_string(),
            function: FunctionSpec {
                name: self.name.clone(),
                description: self.description.clone(),
                parameters: json!({
                    "type": "object",
                    "properties": Value::Object(properties),
                    "required": required,
                }),
            },
        }
    }
}

/// Result of a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
}

impl ToolResult {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error.into()),
        }
    }

    /// The content handed back to the provider as the tool-role message.
    pub fn into_tool_content(self) -> String {
        if self.success {
            self.output
        } else {
            format!(
                "Tool failed: {}",
                self.error.unwrap_or_else(|| "unknown error".to_string())
            )
        }
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn metadata(&self) -> ToolMetadata;

    async fn execute(&self, args: Value) -> Result<ToolResult>;

    /// Argument check before execution (optional).
    fn validate(&self, _args: &Value) -> Result<()> {
        Ok(())
    }
}

/// Execution limits shared by all tools.
#[derive(Debug, Clone)]
pub struct ToolConfig {
    pub max_retries: u32,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self { max_retries: 2 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_converts_to_function_spec() {
        let metadata = ToolMetadata {
            name: "search_knowledge_base".to_string(),
            description: "Search the corporate knowledge base".to_string(),
            parameters: vec![
                ToolParameter {
                    name: "query".to_string(),
                    param_type: "string".to_string(),
                    description: "What to look for".to_string(),
                    required: true,
                },
                ToolParameter {
                    name: "section".to_string(),
                    param_type: "string".to_string(),
                    description: "Optional section filter".to_string(),
                    required: false,
                },
            ],
        };

        let spec = metadata.to_spec();
        assert_eq!(spec.spec_type, "function");
        assert_eq!(spec.function.name, "search_knowledge_base");
        assert_eq!(spec.function.parameters["required"], json!(["query"]));
        assert_eq!(
            spec.function.parameters["properties"]["query"]["type"],
            json!("string")
        );
    }

    #[test]
    fn failure_result_renders_as_tool_content() {
        let content = ToolResult::failure("index offline").into_tool_content();
        assert_eq!(content, "Tool failed: index offline");
        assert_eq!(ToolResult::success("hit").into_tool_content(), "hit");
    }
}
