//! Tool call records, descriptors, and the remote provider seam.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// A structured tool invocation produced by the turn executor.
///
/// Created once per streamed tool call, consumed exactly once by the tool
/// gateway, never reused across turns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Opaque caller-correlatable id
    pub id: String,
    /// Tool name
    pub name: String,
    /// Untyped argument map as streamed by the model
    pub input: serde_json::Value,
}

impl ToolCallRequest {
    /// The free-text query argument, if this call carries one.
    pub fn sql_text(&self) -> Option<&str> {
        self.input
            .get("sql")
            .or_else(|| self.input.get("query"))
            .and_then(|v| v.as_str())
    }
}

/// Normalized result of one tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub tool_use_id: String,
    pub tool_name: String,
    pub content: String,
    pub is_error: bool,
}

impl ToolOutcome {
    /// Create a successful outcome
    pub fn ok(call: &ToolCallRequest, content: impl Into<String>) -> Self {
        Self {
            tool_use_id: call.id.clone(),
            tool_name: call.name.clone(),
            content: content.into(),
            is_error: false,
        }
    }

    /// Create an error outcome
    pub fn error(call: &ToolCallRequest, message: impl Into<String>) -> Self {
        Self {
            tool_use_id: call.id.clone(),
            tool_name: call.name.clone(),
            content: message.into(),
            is_error: true,
        }
    }
}

/// A tool advertised to the model: name, description, argument schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's arguments
    pub schema: serde_json::Value,
}

impl ToolDescriptor {
    /// Convert to the provider-facing tool definition
    pub fn to_api_tool(&self) -> vizier_ai::Tool {
        vizier_ai::Tool::new(self.name.clone(), self.description.clone(), self.schema.clone())
    }
}

/// Errors from the external tool provider.
#[derive(Error, Debug)]
pub enum ToolProviderError {
    #[error("tool provider transport error: {0}")]
    Transport(String),

    #[error("tool execution timed out")]
    Timeout,

    #[error("tool provider rejected the call: {0}")]
    Remote(String),
}

/// The external request/response tool provider, specified only at this
/// boundary: discovery of the advertised tool catalog and per-call
/// execution.
#[async_trait]
pub trait ToolProvider: Send + Sync {
    /// Discover the advertised tools
    async fn discover(&self) -> Result<Vec<ToolDescriptor>, ToolProviderError>;

    /// Execute one tool call, returning its textual result
    async fn execute(
        &self,
        name: &str,
        input: &serde_json::Value,
        cancel: CancellationToken,
    ) -> Result<String, ToolProviderError>;
}
