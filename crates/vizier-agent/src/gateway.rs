//! Tool gateway: validation, access control, and dispatch.

use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::access::AccessPolicy;
use crate::frames::{ChartSpec, FrameSink, MapSpec};
use crate::tool::{ToolCallRequest, ToolDescriptor, ToolOutcome, ToolProvider};

/// Synthetic chart tool name
pub const CHART_TOOL: &str = "render_chart";
/// Synthetic map tool name
pub const MAP_TOOL: &str = "render_map";

/// Fixed acknowledgment returned to the model for a rendered chart
const CHART_ACK: &str = "Chart generated and displayed to the user.";
/// Fixed acknowledgment returned to the model for a rendered map
const MAP_ACK: &str = "Map generated and displayed to the user.";

/// Descriptor for the synthetic chart tool
pub fn chart_tool() -> ToolDescriptor {
    ToolDescriptor {
        name: CHART_TOOL.to_string(),
        description: "Render a chart from tabular data. Use after querying the data to visualize."
            .to_string(),
        schema: serde_json::json!({
            "type": "object",
            "properties": {
                "type": {
                    "type": "string",
                    "enum": ["bar", "line", "area", "pie", "scatter"],
                    "description": "Chart form"
                },
                "title": { "type": "string" },
                "data": {
                    "type": "array",
                    "items": { "type": "object" },
                    "description": "Rows to plot"
                },
                "xKey": { "type": "string", "description": "Field used for the x axis" },
                "yKey": { "type": "string", "description": "Field used for the y axis" }
            },
            "required": ["type", "title", "data", "xKey", "yKey"]
        }),
    }
}

/// Descriptor for the synthetic map tool
pub fn map_tool() -> ToolDescriptor {
    ToolDescriptor {
        name: MAP_TOOL.to_string(),
        description: "Render a map of geographic points with values.".to_string(),
        schema: serde_json::json!({
            "type": "object",
            "properties": {
                "title": { "type": "string" },
                "data": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "lat": { "type": "number" },
                            "lng": { "type": "number" },
                            "label": { "type": "string" },
                            "value": { "type": "number" },
                            "details": { "type": "string" }
                        },
                        "required": ["lat", "lng", "label", "value"]
                    }
                },
                "center": {
                    "type": "array",
                    "items": { "type": "number" },
                    "minItems": 2,
                    "maxItems": 2
                },
                "zoom": { "type": "number" },
                "valueLabel": { "type": "string" }
            },
            "required": ["title", "data"]
        }),
    }
}

/// Typed dispatch target for one call, keyed by tool name. Unknown tools
/// are a distinct variant that is always rejected.
enum Invocation {
    Chart(ChartSpec),
    Map(MapSpec),
    Remote,
    Invalid(String),
    Unknown,
}

/// Validates tool calls, enforces the access policy, and dispatches to the
/// remote provider or the local synthetic tools. Holds no per-call state.
pub struct ToolGateway {
    provider: Option<Arc<dyn ToolProvider>>,
    policy: AccessPolicy,
    remote: Vec<ToolDescriptor>,
    /// Cached compiled JSON schema validators keyed by tool name
    validators: HashMap<String, Arc<jsonschema::Validator>>,
    offer_synthetic: bool,
}

impl ToolGateway {
    /// Create a gateway over a remote catalog plus the synthetic tools
    pub fn new(
        provider: Arc<dyn ToolProvider>,
        policy: AccessPolicy,
        remote: Vec<ToolDescriptor>,
    ) -> Self {
        Self::build(Some(provider), policy, remote, true)
    }

    /// Create a gateway restricted to remote data tools (no chart/map)
    pub fn remote_only(
        provider: Arc<dyn ToolProvider>,
        policy: AccessPolicy,
        remote: Vec<ToolDescriptor>,
    ) -> Self {
        Self::build(Some(provider), policy, remote, false)
    }

    /// Create a gateway that offers no tools and rejects every call
    pub fn disabled() -> Self {
        Self::build(None, AccessPolicy::default(), vec![], false)
    }

    fn build(
        provider: Option<Arc<dyn ToolProvider>>,
        policy: AccessPolicy,
        remote: Vec<ToolDescriptor>,
        offer_synthetic: bool,
    ) -> Self {
        let mut validators = HashMap::new();
        let synthetic = if offer_synthetic {
            vec![chart_tool(), map_tool()]
        } else {
            vec![]
        };
        for descriptor in remote.iter().chain(synthetic.iter()) {
            match jsonschema::validator_for(&descriptor.schema) {
                Ok(validator) => {
                    validators.insert(descriptor.name.clone(), Arc::new(validator));
                }
                Err(e) => {
                    tracing::warn!(
                        "Invalid tool parameter schema for '{}', skipping validation: {}",
                        descriptor.name,
                        e
                    );
                }
            }
        }
        Self {
            provider,
            policy,
            remote,
            validators,
            offer_synthetic,
        }
    }

    /// Whether any tools are offered at all
    pub fn has_tools(&self) -> bool {
        self.offer_synthetic || !self.remote.is_empty()
    }

    /// The tool catalog to advertise to the model
    pub fn api_tools(&self) -> Vec<vizier_ai::Tool> {
        let mut tools: Vec<vizier_ai::Tool> = vec![];
        if self.offer_synthetic {
            tools.push(chart_tool().to_api_tool());
            tools.push(map_tool().to_api_tool());
        }
        tools.extend(self.remote.iter().map(|d| d.to_api_tool()));
        tools
    }

    fn classify(&self, call: &ToolCallRequest) -> Invocation {
        if self.offer_synthetic && call.name == CHART_TOOL {
            return match serde_json::from_value::<ChartSpec>(call.input.clone()) {
                Ok(spec) => Invocation::Chart(spec),
                Err(e) => Invocation::Invalid(format!("Invalid chart specification: {}", e)),
            };
        }
        if self.offer_synthetic && call.name == MAP_TOOL {
            return match serde_json::from_value::<MapSpec>(call.input.clone()) {
                Ok(spec) => Invocation::Map(spec),
                Err(e) => Invocation::Invalid(format!("Invalid map specification: {}", e)),
            };
        }
        if self.remote.iter().any(|d| d.name == call.name) {
            return Invocation::Remote;
        }
        Invocation::Unknown
    }

    /// Validate arguments against the tool's compiled schema.
    fn validate(&self, call: &ToolCallRequest) -> Option<String> {
        let validator = self.validators.get(&call.name)?;
        let errors: Vec<String> = validator
            .iter_errors(&call.input)
            .map(|e| {
                let path = e.instance_path.to_string();
                if path.is_empty() {
                    e.to_string()
                } else {
                    format!("{}: {}", path, e)
                }
            })
            .collect();

        if errors.is_empty() {
            None
        } else {
            Some(format!(
                "Tool argument validation failed:\n{}",
                errors.join("\n")
            ))
        }
    }

    /// Execute one tool call, normalizing every failure into an error
    /// outcome so sibling calls in the same batch are never aborted.
    pub async fn execute(
        &self,
        call: &ToolCallRequest,
        sink: &FrameSink,
        cancel: CancellationToken,
    ) -> ToolOutcome {
        if cancel.is_cancelled() {
            return ToolOutcome::error(call, "Cancelled before execution");
        }

        if let Some(message) = self.validate(call) {
            return ToolOutcome::error(call, message);
        }

        match self.classify(call) {
            Invocation::Chart(spec) => {
                sink.chart(spec).await;
                ToolOutcome::ok(call, CHART_ACK)
            }
            Invocation::Map(spec) => {
                sink.map(spec).await;
                ToolOutcome::ok(call, MAP_ACK)
            }
            Invocation::Remote => {
                if let Err(violation) = self.policy.check(&call.input) {
                    tracing::warn!(tool = %call.name, %violation, "tool call denied");
                    return ToolOutcome::error(call, violation.to_string());
                }
                let Some(provider) = &self.provider else {
                    return ToolOutcome::error(call, format!("Tool not found: {}", call.name));
                };
                match provider.execute(&call.name, &call.input, cancel).await {
                    Ok(content) => ToolOutcome::ok(call, content),
                    Err(e) => {
                        tracing::warn!(tool = %call.name, error = %e, "tool execution failed");
                        ToolOutcome::error(call, format!("Tool execution failed: {}", e))
                    }
                }
            }
            Invocation::Invalid(message) => ToolOutcome::error(call, message),
            Invocation::Unknown => ToolOutcome::error(call, format!("Tool not found: {}", call.name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::{ColumnFrame, EventFrame};
    use crate::tool::ToolProviderError;
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    /// A scripted remote provider for tests.
    struct MockProvider {
        fail: bool,
    }

    #[async_trait]
    impl ToolProvider for MockProvider {
        async fn discover(&self) -> Result<Vec<ToolDescriptor>, ToolProviderError> {
            Ok(vec![query_descriptor()])
        }

        async fn execute(
            &self,
            name: &str,
            _input: &serde_json::Value,
            _cancel: CancellationToken,
        ) -> Result<String, ToolProviderError> {
            if self.fail {
                Err(ToolProviderError::Transport("connection refused".into()))
            } else {
                Ok(format!("{} ok: 3 rows", name))
            }
        }
    }

    fn query_descriptor() -> ToolDescriptor {
        ToolDescriptor {
            name: "query".into(),
            description: "Run a read-only query".into(),
            schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "source": { "type": "string" },
                    "sql": { "type": "string" }
                },
                "required": ["sql"]
            }),
        }
    }

    fn policy() -> AccessPolicy {
        AccessPolicy::new(vec!["sales".to_string()])
    }

    fn gateway(fail: bool) -> ToolGateway {
        ToolGateway::new(
            Arc::new(MockProvider { fail }),
            policy(),
            vec![query_descriptor()],
        )
    }

    fn sink_pair() -> (FrameSink, mpsc::Receiver<ColumnFrame>) {
        let (tx, rx) = mpsc::channel(16);
        (FrameSink::new(tx, CancellationToken::new()), rx)
    }

    fn call(name: &str, input: serde_json::Value) -> ToolCallRequest {
        ToolCallRequest {
            id: "c1".into(),
            name: name.into(),
            input,
        }
    }

    #[tokio::test]
    async fn test_remote_call_dispatched() {
        let (sink, _rx) = sink_pair();
        let outcome = gateway(false)
            .execute(
                &call("query", serde_json::json!({"sql": "SELECT region FROM sales.orders"})),
                &sink,
                CancellationToken::new(),
            )
            .await;
        assert!(!outcome.is_error);
        assert!(outcome.content.contains("3 rows"));
    }

    #[tokio::test]
    async fn test_denied_call_never_reaches_provider() {
        let (sink, _rx) = sink_pair();
        let outcome = gateway(false)
            .execute(
                &call(
                    "query",
                    serde_json::json!({"source": "forbidden_source", "sql": "SELECT 1"}),
                ),
                &sink,
                CancellationToken::new(),
            )
            .await;
        assert!(outcome.is_error);
        assert!(outcome.content.contains("Access denied"));
    }

    #[tokio::test]
    async fn test_provider_error_becomes_error_outcome() {
        let (sink, _rx) = sink_pair();
        let outcome = gateway(true)
            .execute(
                &call("query", serde_json::json!({"sql": "SELECT 1"})),
                &sink,
                CancellationToken::new(),
            )
            .await;
        assert!(outcome.is_error);
        assert!(outcome.content.contains("Tool execution failed"));
    }

    #[tokio::test]
    async fn test_schema_validation_rejects_bad_args() {
        let (sink, _rx) = sink_pair();
        let outcome = gateway(false)
            .execute(
                &call("query", serde_json::json!({"limit": 5})),
                &sink,
                CancellationToken::new(),
            )
            .await;
        assert!(outcome.is_error);
        assert!(outcome.content.contains("validation failed"));
    }

    #[tokio::test]
    async fn test_chart_tool_emits_frame_and_ack() {
        let (sink, mut rx) = sink_pair();
        let input = serde_json::json!({
            "type": "bar",
            "title": "Sales by region",
            "data": [{"region": "EMEA", "total": 42}],
            "xKey": "region",
            "yKey": "total"
        });
        let outcome = gateway(false)
            .execute(&call(CHART_TOOL, input), &sink, CancellationToken::new())
            .await;
        assert!(!outcome.is_error);
        assert_eq!(outcome.content, CHART_ACK);
        let frame = rx.try_recv().unwrap();
        assert!(matches!(frame.frame, EventFrame::Chart { .. }));
    }

    #[tokio::test]
    async fn test_map_tool_emits_frame_and_ack() {
        let (sink, mut rx) = sink_pair();
        let input = serde_json::json!({
            "title": "Offices",
            "data": [{"lat": 52.5, "lng": 13.4, "label": "Berlin", "value": 10.0}]
        });
        let outcome = gateway(false)
            .execute(&call(MAP_TOOL, input), &sink, CancellationToken::new())
            .await;
        assert!(!outcome.is_error);
        assert_eq!(outcome.content, MAP_ACK);
        let frame = rx.try_recv().unwrap();
        assert!(matches!(frame.frame, EventFrame::Map { .. }));
    }

    #[tokio::test]
    async fn test_unknown_tool_rejected() {
        let (sink, _rx) = sink_pair();
        let outcome = gateway(false)
            .execute(
                &call("drop_everything", serde_json::json!({})),
                &sink,
                CancellationToken::new(),
            )
            .await;
        assert!(outcome.is_error);
        assert!(outcome.content.contains("Tool not found"));
    }

    #[tokio::test]
    async fn test_remote_only_gateway_rejects_synthetic() {
        let (sink, _rx) = sink_pair();
        let gateway = ToolGateway::remote_only(
            Arc::new(MockProvider { fail: false }),
            policy(),
            vec![query_descriptor()],
        );
        assert_eq!(gateway.api_tools().len(), 1);
        let outcome = gateway
            .execute(
                &call(CHART_TOOL, serde_json::json!({})),
                &sink,
                CancellationToken::new(),
            )
            .await;
        assert!(outcome.is_error);
    }

    #[tokio::test]
    async fn test_disabled_gateway_offers_nothing() {
        let gateway = ToolGateway::disabled();
        assert!(!gateway.has_tools());
        assert!(gateway.api_tools().is_empty());
        let (sink, _rx) = sink_pair();
        let outcome = gateway
            .execute(
                &call("query", serde_json::json!({"sql": "SELECT 1"})),
                &sink,
                CancellationToken::new(),
            )
            .await;
        assert!(outcome.is_error);
    }
}
