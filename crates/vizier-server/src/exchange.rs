//! Exchange drivers: standalone, two-phase pipeline, and fan-out.
//!
//! The driver owns terminal frame emission: the orchestration layer streams
//! progress, and once it settles the driver persists any generated
//! document, threads `content_saved` back, and closes the sequence with
//! exactly one terminal frame.

use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use vizier_agent::document;
use vizier_agent::frames::{ColumnFrame, FrameSink};
use vizier_agent::tool::{ToolDescriptor, ToolProvider};
use vizier_agent::{
    AccessPolicy, ConversationState, ExchangeOutcome, Orchestrator, OrchestratorConfig,
    PipelineCoordinator, ToolGateway,
};
use vizier_ai::Message;

use crate::config::Config;
use crate::documents::DocumentStore;
use crate::prompts;
use crate::provider::ModelFactory;

/// Shared server state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub tools: Arc<dyn ToolProvider>,
    pub store: Arc<dyn DocumentStore>,
    pub models: Arc<dyn ModelFactory>,
}

/// Inbound chat request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub messages: Vec<InboundMessage>,
    #[serde(default)]
    pub is_mobile: bool,
    #[serde(default)]
    pub include_metadata: bool,
    pub model: String,
}

/// One inbound conversation message
#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    pub role: String,
    pub content: String,
}

/// What the request's `model` field selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSelection {
    /// One orchestrator; `None` uses the configured default model
    Standalone(Option<String>),
    /// Two-phase pipeline
    Pipeline,
    /// N independent orchestrators over the same input
    Compare(Vec<String>),
}

impl ModelSelection {
    /// Parse a model selector: `"standalone"`, `"pipeline"`,
    /// `"compare:<id>,<id>,..."`, or a bare model id.
    pub fn parse(selector: &str) -> Option<Self> {
        let selector = selector.trim();
        if selector.is_empty() {
            return None;
        }
        if selector == "pipeline" {
            return Some(Self::Pipeline);
        }
        if selector == "standalone" {
            return Some(Self::Standalone(None));
        }
        if let Some(ids) = selector.strip_prefix("compare:") {
            let ids: Vec<String> = ids
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            if ids.is_empty() {
                return None;
            }
            return Some(Self::Compare(ids));
        }
        Some(Self::Standalone(Some(selector.to_string())))
    }
}

/// Validate an inbound request, resolving its model selection.
pub fn validate(request: &ChatRequest) -> Result<ModelSelection, String> {
    if request.messages.is_empty() {
        return Err("messages must not be empty".to_string());
    }
    for message in &request.messages {
        if message.role != "user" && message.role != "assistant" {
            return Err(format!("unknown message role: {}", message.role));
        }
    }
    if request.messages.last().map(|m| m.role.as_str()) != Some("user") {
        return Err("last message must be from the user".to_string());
    }
    ModelSelection::parse(&request.model)
        .ok_or_else(|| format!("unknown model selector: {}", request.model))
}

fn convert_messages(messages: &[InboundMessage]) -> Vec<Message> {
    messages
        .iter()
        .map(|m| {
            if m.role == "assistant" {
                Message::assistant(vec![vizier_ai::Content::text(&m.content)])
            } else {
                Message::user(&m.content)
            }
        })
        .collect()
}

/// Run one exchange, streaming frames into `tx` until terminal.
pub async fn run_exchange(
    state: AppState,
    request: ChatRequest,
    selection: ModelSelection,
    catalog: Vec<ToolDescriptor>,
    tx: mpsc::Sender<ColumnFrame>,
) {
    match selection {
        ModelSelection::Standalone(model_id) => {
            let sink = FrameSink::new(tx, CancellationToken::new());
            drive_standalone(&state, &request, model_id.as_deref(), catalog, sink).await;
        }
        ModelSelection::Pipeline => {
            let sink = FrameSink::new(tx, CancellationToken::new());
            drive_pipeline(&state, &request, catalog, sink).await;
        }
        ModelSelection::Compare(ids) => {
            // Fully independent columns: own state, own cancellation
            let drives = ids.iter().enumerate().map(|(column, id)| {
                let sink = FrameSink::for_column(tx.clone(), column, CancellationToken::new());
                drive_standalone(&state, &request, Some(id.as_str()), catalog.clone(), sink)
            });
            futures::future::join_all(drives).await;
        }
    }
}

fn orchestrator_config(state: &AppState, system_prompt: String) -> OrchestratorConfig {
    OrchestratorConfig {
        system_prompt: Some(system_prompt),
        max_turns: state.config.max_turns,
        retry: state.config.retry_policy(),
        turn_timeout: state.config.turn_timeout(),
    }
}

async fn drive_standalone(
    state: &AppState,
    request: &ChatRequest,
    model_id: Option<&str>,
    catalog: Vec<ToolDescriptor>,
    sink: FrameSink,
) {
    let policy = AccessPolicy::new(state.config.allowed_sources.clone());
    let gateway = Arc::new(ToolGateway::new(Arc::clone(&state.tools), policy, catalog));
    let config = orchestrator_config(
        state,
        prompts::with_hints(
            prompts::ANALYST_PROMPT,
            request.is_mobile,
            request.include_metadata,
        ),
    );
    let orchestrator = Orchestrator::new(
        config,
        state.models.model(model_id),
        gateway,
        sink.clone(),
        sink.cancellation(),
    );

    let mut conversation = ConversationState::from_messages(convert_messages(&request.messages));
    let result = orchestrator.run(&mut conversation).await;
    settle(state, result, &sink).await;
}

async fn drive_pipeline(
    state: &AppState,
    request: &ChatRequest,
    catalog: Vec<ToolDescriptor>,
    sink: FrameSink,
) {
    let question = request
        .messages
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .map(|m| m.content.clone())
        .unwrap_or_default();

    let policy = AccessPolicy::new(state.config.allowed_sources.clone());
    let gateway = Arc::new(ToolGateway::remote_only(
        Arc::clone(&state.tools),
        policy,
        catalog,
    ));
    let coordinator = PipelineCoordinator::new(
        orchestrator_config(state, prompts::GATHER_PROMPT.to_string()),
        orchestrator_config(
            state,
            prompts::with_hints(
                prompts::REPORT_PROMPT,
                request.is_mobile,
                request.include_metadata,
            ),
        ),
        state.models.model(None),
        gateway,
        sink.clone(),
        sink.cancellation(),
    );

    let result = coordinator.run(&question).await;
    settle(state, result, &sink).await;
}

/// Close the frame sequence: persist any generated document, then emit the
/// terminal frame. Fatal errors become an `error` frame followed by `done`;
/// partial output already streamed is never retracted.
async fn settle(
    state: &AppState,
    result: vizier_agent::Result<ExchangeOutcome>,
    sink: &FrameSink,
) {
    match result {
        Ok(outcome) if outcome.is_cancelled() => {
            sink.cancelled().await;
        }
        Ok(outcome) => {
            if let Some(final_text) = outcome.final_text() {
                if let Some(doc) = document::extract(final_text) {
                    let id = state.store.save(doc.body).await;
                    sink.content_saved(id).await;
                }
            }
            sink.done().await;
        }
        Err(e) => {
            tracing::error!(error = %e, "exchange failed");
            sink.error(e.to_string()).await;
            sink.done().await;
        }
    }
}
