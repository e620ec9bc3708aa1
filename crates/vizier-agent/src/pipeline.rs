//! Two-phase pipeline: data gathering, then report generation.

use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use vizier_ai::{Content, Message};

use crate::conversation::ConversationState;
use crate::error::Result;
use crate::frames::FrameSink;
use crate::gateway::ToolGateway;
use crate::orchestrator::{ExchangeOutcome, Orchestrator, OrchestratorConfig};
use crate::turn::ModelStream;

/// Composes two orchestrators in sequence: a data-gathering phase whose
/// tool results feed a report-generation phase that has no tool access.
///
/// The client tells the phases apart by frame type: phase-1 text arrives as
/// `intermediate_text` and its tool results as `intermediate_output`, while
/// phase-2 text streams as the final answer. A phase-1 failure aborts the
/// whole exchange; a phase-2 failure after a successful phase 1 is also
/// terminal, and intermediate content already streamed stays visible.
pub struct PipelineCoordinator {
    gather: OrchestratorConfig,
    report: OrchestratorConfig,
    model: Arc<dyn ModelStream>,
    /// Gateway for the gathering phase; must offer remote data tools only
    gateway: Arc<ToolGateway>,
    sink: FrameSink,
    cancel: CancellationToken,
}

impl PipelineCoordinator {
    pub fn new(
        gather: OrchestratorConfig,
        report: OrchestratorConfig,
        model: Arc<dyn ModelStream>,
        gateway: Arc<ToolGateway>,
        sink: FrameSink,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            gather,
            report,
            model,
            gateway,
            sink,
            cancel,
        }
    }

    /// Run both phases for one user question.
    pub async fn run(&self, question: &str) -> Result<ExchangeOutcome> {
        // Phase 1: gather. Text and tool results stream as intermediate
        // content and accumulate into the collected-data buffer.
        let gather_orchestrator = Orchestrator::new(
            self.gather.clone(),
            Arc::clone(&self.model),
            Arc::clone(&self.gateway),
            self.sink.intermediate(),
            self.cancel.clone(),
        );
        let mut gather_state = ConversationState::from_messages(vec![Message::user(question)]);
        let gather_outcome = gather_orchestrator.run(&mut gather_state).await?;
        if gather_outcome.is_cancelled() {
            return Ok(gather_outcome);
        }

        let collected = collect_data(&gather_state);
        tracing::debug!(
            exchange = %gather_state.id,
            collected_bytes = collected.len(),
            "data-gathering phase complete"
        );

        // Phase 2: report. One synthetic user message, zero tools. Runs
        // even when phase 1 collected nothing.
        let report_orchestrator = Orchestrator::new(
            self.report.clone(),
            Arc::clone(&self.model),
            Arc::new(ToolGateway::disabled()),
            self.sink.clone(),
            self.cancel.clone(),
        );
        let mut report_state = ConversationState::from_messages(vec![Message::user(
            report_prompt(question, &collected),
        )]);
        let report_outcome = report_orchestrator.run(&mut report_state).await?;

        Ok(ExchangeOutcome {
            status: report_outcome.status,
            turns: gather_outcome.turns + report_outcome.turns,
        })
    }
}

/// Build the synthetic phase-2 user message.
fn report_prompt(question: &str, collected: &str) -> String {
    let data = if collected.is_empty() {
        "(no data was collected)"
    } else {
        collected
    };
    format!(
        "Original question: {}\n\nCollected data:\n{}",
        question, data
    )
}

/// Fold everything the gathering phase produced into one buffer: assistant
/// narration in order, plus each tool result labeled with its tool name.
fn collect_data(state: &ConversationState) -> String {
    let mut tool_names: HashMap<&str, &str> = HashMap::new();
    for message in &state.messages {
        for (id, name, _) in message.tool_uses() {
            tool_names.insert(id, name);
        }
    }

    let mut parts: Vec<String> = vec![];
    for message in &state.messages {
        match message {
            Message::Assistant { content, .. } => {
                for block in content {
                    if let Some(text) = block.as_text() {
                        if !text.trim().is_empty() {
                            parts.push(text.trim().to_string());
                        }
                    }
                }
            }
            Message::User { content, .. } => {
                for block in content {
                    if let Content::ToolResult {
                        tool_use_id,
                        content,
                        ..
                    } = block
                    {
                        let name = tool_names
                            .get(tool_use_id.as_str())
                            .copied()
                            .unwrap_or("tool");
                        parts.push(format!("--- {} result ---\n{}", name, content));
                    }
                }
            }
        }
    }
    parts.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::AccessPolicy;
    use crate::frames::{ColumnFrame, EventFrame};
    use crate::retry::RetryPolicy;
    use crate::tool::{ToolDescriptor, ToolProvider, ToolProviderError};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use vizier_ai::{Context, MessageEvent, MessageEventStream, StopReason, Usage};

    enum Script {
        Events(Vec<MessageEvent>),
        ConnectError(vizier_ai::Error),
    }

    /// Pops one script per call and records every context it was given.
    struct MockModel {
        scripts: Mutex<Vec<Script>>,
        contexts: Mutex<Vec<Context>>,
    }

    impl MockModel {
        fn new(scripts: Vec<Script>) -> Arc<Self> {
            Arc::new(Self {
                scripts: Mutex::new(scripts),
                contexts: Mutex::new(vec![]),
            })
        }
    }

    #[async_trait]
    impl ModelStream for MockModel {
        async fn stream(
            &self,
            context: Context,
            _cancel: CancellationToken,
        ) -> vizier_ai::Result<MessageEventStream> {
            self.contexts.lock().unwrap().push(context);
            let script = {
                let mut scripts = self.scripts.lock().unwrap();
                if scripts.is_empty() {
                    Script::Events(vec![done_event()])
                } else {
                    scripts.remove(0)
                }
            };
            match script {
                Script::ConnectError(e) => Err(e),
                Script::Events(events) => Ok(Box::pin(async_stream::stream! {
                    for event in events {
                        yield event;
                    }
                })),
            }
        }
    }

    struct MockProvider;

    #[async_trait]
    impl ToolProvider for MockProvider {
        async fn discover(&self) -> std::result::Result<Vec<ToolDescriptor>, ToolProviderError> {
            Ok(vec![])
        }

        async fn execute(
            &self,
            _name: &str,
            _input: &serde_json::Value,
            _cancel: CancellationToken,
        ) -> std::result::Result<String, ToolProviderError> {
            Ok("region,total\nEMEA,42".to_string())
        }
    }

    fn done_event() -> MessageEvent {
        MessageEvent::Done {
            stop_reason: StopReason::Stop,
            usage: Usage::default(),
        }
    }

    fn text_turn(text: &str) -> Script {
        Script::Events(vec![
            MessageEvent::TextDelta {
                content_index: 0,
                delta: text.to_string(),
            },
            done_event(),
        ])
    }

    fn query_turn(id: &str, sql: &str) -> Script {
        Script::Events(vec![
            MessageEvent::TextDelta {
                content_index: 0,
                delta: "Checking the numbers.".to_string(),
            },
            MessageEvent::ToolUseStart {
                content_index: 1,
                id: id.to_string(),
                name: "query".to_string(),
            },
            MessageEvent::ToolUseDelta {
                content_index: 1,
                delta: serde_json::json!({ "sql": sql }).to_string(),
            },
            MessageEvent::ToolUseEnd {
                content_index: 1,
                id: id.to_string(),
                name: "query".to_string(),
            },
            done_event(),
        ])
    }

    fn remote_gateway() -> Arc<ToolGateway> {
        Arc::new(ToolGateway::remote_only(
            Arc::new(MockProvider),
            AccessPolicy::new(vec!["sales".to_string()]),
            vec![ToolDescriptor {
                name: "query".into(),
                description: "Run a query".into(),
                schema: serde_json::json!({"type": "object"}),
            }],
        ))
    }

    fn fast_config() -> OrchestratorConfig {
        OrchestratorConfig {
            retry: RetryPolicy {
                max_retries: 1,
                initial_delay: Duration::ZERO,
                max_delay: Duration::ZERO,
            },
            ..Default::default()
        }
    }

    fn pipeline(
        model: Arc<MockModel>,
    ) -> (PipelineCoordinator, mpsc::Receiver<ColumnFrame>) {
        let (tx, rx) = mpsc::channel(256);
        let cancel = CancellationToken::new();
        let sink = FrameSink::new(tx, cancel.clone());
        (
            PipelineCoordinator::new(
                fast_config(),
                fast_config(),
                model,
                remote_gateway(),
                sink,
                cancel,
            ),
            rx,
        )
    }

    async fn drain(mut rx: mpsc::Receiver<ColumnFrame>) -> Vec<EventFrame> {
        let mut frames = vec![];
        while let Ok(f) = rx.try_recv() {
            frames.push(f.frame);
        }
        frames
    }

    #[tokio::test]
    async fn test_phases_stream_distinct_frame_types() {
        let model = MockModel::new(vec![
            query_turn("c1", "SELECT region, SUM(amount) FROM sales.orders GROUP BY region"),
            text_turn("Gathered what I need."),
            text_turn("Here is the report."),
        ]);
        let (pipeline, rx) = pipeline(Arc::clone(&model));

        let outcome = pipeline.run("sales by region").await.unwrap();
        assert_eq!(outcome.final_text(), Some("Here is the report."));

        let frames = drain(rx).await;
        // Phase-1 narration arrives as intermediate text
        assert!(frames
            .iter()
            .any(|f| matches!(f, EventFrame::IntermediateText { text } if text.contains("Checking"))));
        // Phase-1 tool results surface as intermediate output
        assert!(frames.iter().any(|f| matches!(
            f,
            EventFrame::IntermediateOutput { source, content }
                if source == "query" && content.contains("EMEA")
        )));
        // Phase-2 text streams as the final answer
        assert!(frames
            .iter()
            .any(|f| matches!(f, EventFrame::Text { text } if text.contains("report"))));
        // No terminal frames; the driver owns those
        assert!(frames.iter().all(|f| !f.is_terminal()));
    }

    #[tokio::test]
    async fn test_collected_data_embedded_in_report_prompt() {
        let model = MockModel::new(vec![
            query_turn("c1", "SELECT 1"),
            text_turn("done gathering"),
            text_turn("report"),
        ]);
        let (pipeline, _rx) = pipeline(Arc::clone(&model));
        pipeline.run("sales by region").await.unwrap();

        let contexts = model.contexts.lock().unwrap();
        // Last call is the report phase
        let report_context = contexts.last().unwrap();
        assert!(report_context.tools.is_empty());
        let prompt = report_context.messages[0].text();
        assert!(prompt.contains("Original question: sales by region"));
        assert!(prompt.contains("--- query result ---"));
        assert!(prompt.contains("EMEA,42"));
        assert!(prompt.contains("Checking the numbers."));
    }

    #[tokio::test]
    async fn test_phase_two_runs_on_empty_buffer() {
        let model = MockModel::new(vec![
            // Phase 1 ends immediately with no tools and no text
            Script::Events(vec![done_event()]),
            text_turn("report from nothing"),
        ]);
        let (pipeline, _rx) = pipeline(Arc::clone(&model));

        let outcome = pipeline.run("anything?").await.unwrap();
        assert_eq!(outcome.final_text(), Some("report from nothing"));

        let contexts = model.contexts.lock().unwrap();
        assert_eq!(contexts.len(), 2);
        let prompt = contexts[1].messages[0].text();
        assert!(prompt.contains("(no data was collected)"));
    }

    #[tokio::test]
    async fn test_phase_one_failure_aborts_exchange() {
        let model = MockModel::new(vec![
            Script::ConnectError(vizier_ai::Error::InvalidApiKey),
            text_turn("never generated"),
        ]);
        let (pipeline, _rx) = pipeline(Arc::clone(&model));

        assert!(pipeline.run("q").await.is_err());
        // Phase 2 never ran
        assert_eq!(model.contexts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_phase_two_failure_is_terminal() {
        let model = MockModel::new(vec![
            text_turn("gathered"),
            Script::ConnectError(vizier_ai::Error::InvalidApiKey),
        ]);
        let (pipeline, rx) = pipeline(Arc::clone(&model));

        assert!(pipeline.run("q").await.is_err());
        // Intermediate content already streamed remains on the wire
        let frames = drain(rx).await;
        assert!(frames
            .iter()
            .any(|f| matches!(f, EventFrame::IntermediateText { .. })));
    }
}
