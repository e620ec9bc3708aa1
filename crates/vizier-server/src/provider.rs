//! Remote tool provider client and the model stream factory.

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use vizier_agent::tool::{ToolDescriptor, ToolProvider, ToolProviderError};
use vizier_agent::turn::ModelStream;
use vizier_ai::providers::anthropic::AnthropicProvider;
use vizier_ai::{Context, MessageEventStream, Model, StreamOptions};

/// Provider-advertised tools withheld from the model. Source enumeration is
/// the server's concern; the allow-list already fixes what may be queried.
const FILTERED_TOOLS: &[&str] = &["list_sources"];

/// Tool advertisement as the remote provider serves it
#[derive(Debug, Deserialize)]
struct RemoteToolInfo {
    name: String,
    #[serde(default)]
    description: String,
    input_schema: serde_json::Value,
}

/// Result payload from a remote tool call
#[derive(Debug, Deserialize)]
struct RemoteToolResult {
    content: String,
    #[serde(default)]
    is_error: bool,
}

/// HTTP client for the external data-query tool provider.
pub struct HttpToolProvider {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpToolProvider {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            timeout,
        }
    }
}

#[async_trait]
impl ToolProvider for HttpToolProvider {
    /// Discover the advertised catalog, dropping tools the model should
    /// never see.
    async fn discover(&self) -> Result<Vec<ToolDescriptor>, ToolProviderError> {
        let url = format!("{}/tools", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ToolProviderError::Transport(e.to_string()))?
            .error_for_status()
            .map_err(|e| ToolProviderError::Transport(e.to_string()))?;

        let tools: Vec<RemoteToolInfo> = response
            .json()
            .await
            .map_err(|e| ToolProviderError::Transport(e.to_string()))?;

        Ok(tools
            .into_iter()
            .filter(|t| !FILTERED_TOOLS.contains(&t.name.as_str()))
            .map(|t| ToolDescriptor {
                name: t.name,
                description: t.description,
                schema: t.input_schema,
            })
            .collect())
    }

    async fn execute(
        &self,
        name: &str,
        input: &serde_json::Value,
        cancel: CancellationToken,
    ) -> Result<String, ToolProviderError> {
        let url = format!("{}/tools/{}", self.base_url, name);
        let request = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(input)
            .send();

        let response = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(ToolProviderError::Transport("cancelled".to_string()));
            }
            response = request => response,
        };

        let response = match response {
            Ok(r) => r,
            Err(e) if e.is_timeout() => return Err(ToolProviderError::Timeout),
            Err(e) => return Err(ToolProviderError::Transport(e.to_string())),
        };
        let response = response
            .error_for_status()
            .map_err(|e| ToolProviderError::Transport(e.to_string()))?;

        let result: RemoteToolResult = response
            .json()
            .await
            .map_err(|e| ToolProviderError::Transport(e.to_string()))?;

        if result.is_error {
            Err(ToolProviderError::Remote(result.content))
        } else {
            Ok(result.content)
        }
    }
}

/// Builds one `ModelStream` per exchange for a requested model id.
pub trait ModelFactory: Send + Sync {
    fn model(&self, id: Option<&str>) -> Arc<dyn ModelStream>;
}

/// Factory over the Anthropic provider.
pub struct AnthropicFactory {
    api_key: String,
    template: crate::config::Config,
}

impl AnthropicFactory {
    pub fn new(api_key: String, config: crate::config::Config) -> Self {
        Self {
            api_key,
            template: config,
        }
    }
}

impl ModelFactory for AnthropicFactory {
    fn model(&self, id: Option<&str>) -> Arc<dyn ModelStream> {
        Arc::new(ProviderModel {
            provider: AnthropicProvider::new(self.api_key.clone()),
            model: self.template.api_model(id),
        })
    }
}

/// Adapts the provider call to the orchestration seam, ending the stream
/// at the next suspension point after cancellation.
pub struct ProviderModel {
    provider: AnthropicProvider,
    model: Model,
}

#[async_trait]
impl ModelStream for ProviderModel {
    async fn stream(
        &self,
        context: Context,
        cancel: CancellationToken,
    ) -> vizier_ai::Result<MessageEventStream> {
        let inner = self
            .provider
            .stream(&self.model, &context, &StreamOptions::default())
            .await?;

        Ok(Box::pin(async_stream::stream! {
            let mut inner = inner;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = inner.next() => match event {
                        Some(event) => yield event,
                        None => break,
                    },
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_tool_info_deserializes() {
        let info: RemoteToolInfo = serde_json::from_str(
            r#"{"name": "query", "description": "Run a query", "input_schema": {"type": "object"}}"#,
        )
        .unwrap();
        assert_eq!(info.name, "query");
        assert_eq!(info.input_schema["type"], "object");
    }

    #[test]
    fn test_filtered_tools_list() {
        assert!(FILTERED_TOOLS.contains(&"list_sources"));
    }

    #[test]
    fn test_remote_result_defaults_not_error() {
        let result: RemoteToolResult =
            serde_json::from_str(r#"{"content": "3 rows"}"#).unwrap();
        assert!(!result.is_error);
    }
}
