//! Tool executor. Wraps tool invocations with validation, a bounded
//! retry budget, and retryability classification; a tool that keeps
//! failing yields a failure result, never an error that could abort the
//! turn.

use super::{Tool, ToolConfig, ToolResult};
use serde_json::Value;
use std::sync::Arc;
use tokio::time::{sleep, Duration};

pub struct ToolExecutor {
    config: ToolConfig,
}

impl ToolExecutor {
    pub fn new(config: ToolConfig) -> Self {
        Self { config }
    }

    pub async fn execute(&self, tool: Arc<dyn Tool>, args: Value) -> ToolResult {
        let name = tool.metadata().name;

        if let Err(err) = tool.validate(&args) {
            // Bad arguments stay bad; no point retrying.
            return ToolResult::failure(format!("invalid arguments: {err}"));
        }

        let attempts = self.config.max_retries.max(1);
        let mut last_error = None;
        for attempt in 1..=attempts {
            if attempt > 1 {
                let backoff = backoff_ms(attempt);
                tracing::warn!(tool = %name, attempt, "retrying tool after {}ms", backoff);
                sleep(Duration::from_millis(backoff)).await;
            }

            match tool.execute(args.clone()).await {
                Ok(result) if result.success => return result,
                Ok(result) => {
                    if !is_retryable(&result) {
                        return result;
                    }
                    last_error = result.error;
                }
                Err(err) => last_error = Some(err.to_string()),
            }
        }

        ToolResult::failure(format!(
            "'{name}' failed after {attempts} attempts: {}",
            last_error.unwrap_or_else(|| "unknown error".to_string())
        ))
    }
}

fn backoff_ms(attempt: u32) -> u64 {
    (100 * 2_u64.pow(attempt.saturating_sub(2))).min(2_000)
}

/// Only transient trouble earns another attempt.
fn is_retryable(result: &ToolResult) -> bool {
    let Some(error) = result.error.as_deref() else {
        return true;
    };
    let error = error.to_lowercase();
    if error.contains("invalid") || error.contains("not allowed") {
        return false;
    }
    error.contains("timed out")
        || error.contains("timeout")
        || error.contains("unavailable")
        || error.contains("transport")
}
