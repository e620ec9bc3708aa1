//! Turn executor: drives one model call to completion.

use async_trait::async_trait;
use futures::StreamExt;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use vizier_ai::{Content, Context, MessageBuilder, MessageEvent, MessageEventStream, StopReason, Usage};

use crate::frames::FrameSink;
use crate::retry::is_transient_error;
use crate::tool::ToolCallRequest;

/// The black-box streaming model call.
#[async_trait]
pub trait ModelStream: Send + Sync {
    /// Open one streaming model call for the given context
    async fn stream(
        &self,
        context: Context,
        cancel: CancellationToken,
    ) -> vizier_ai::Result<MessageEventStream>;
}

/// Errors surfaced by a single turn. The executor never retries; an
/// in-flight partial turn must be discarded, so retry is the orchestrator's
/// responsibility.
#[derive(Error, Debug)]
pub enum TurnError {
    /// The stream could not be opened
    #[error("model call failed: {0}")]
    Connect(#[from] vizier_ai::Error),

    /// The stream failed mid-turn
    #[error("model stream error: {0}")]
    Stream(String),

    /// The turn was cancelled cooperatively
    #[error("cancelled")]
    Cancelled,
}

impl TurnError {
    /// Whether the orchestrator should consult the retry policy
    pub fn is_transient(&self) -> bool {
        match self {
            TurnError::Connect(e) => e.is_transient() || is_transient_error(&e.to_string()),
            TurnError::Stream(message) => is_transient_error(message),
            TurnError::Cancelled => false,
        }
    }
}

/// The completed output of one turn: ordered content plus the structured
/// tool-call requests split out for the gateway.
#[derive(Debug)]
pub struct TurnOutput {
    /// Ordered text and tool_use blocks as the model produced them
    pub content: Vec<Content>,
    /// Tool calls extracted from `content`, in order
    pub tool_calls: Vec<ToolCallRequest>,
    pub usage: Usage,
    pub stop_reason: Option<StopReason>,
}

impl TurnOutput {
    /// The turn's text segments in order
    pub fn text_segments(&self) -> Vec<&str> {
        self.content
            .iter()
            .filter_map(|c| c.as_text())
            .filter(|t| !t.is_empty())
            .collect()
    }

    /// All text concatenated
    pub fn text(&self) -> String {
        self.text_segments().concat()
    }
}

/// Consumes one model stream, splitting it into ordered text segments and
/// tool-call requests while forwarding text to the frame sink.
///
/// Text received before any tool call begins is flushed immediately to keep
/// latency low. Once a tool call has started, further text is withheld and
/// replayed as one frame when the call's terminator commits it, so narration
/// around tool activity arrives in consistent units.
pub struct TurnExecutor<'a> {
    model: &'a dyn ModelStream,
    sink: &'a FrameSink,
}

impl<'a> TurnExecutor<'a> {
    pub fn new(model: &'a dyn ModelStream, sink: &'a FrameSink) -> Self {
        Self { model, sink }
    }

    /// Run one turn to completion.
    pub async fn run(
        &self,
        context: Context,
        cancel: &CancellationToken,
    ) -> Result<TurnOutput, TurnError> {
        if cancel.is_cancelled() {
            return Err(TurnError::Cancelled);
        }

        let mut stream = self.model.stream(context, cancel.clone()).await?;

        let mut builder = MessageBuilder::new();
        let mut tool_seen = false;
        let mut withheld = String::new();
        let mut finished: Option<(StopReason, Usage)> = None;

        while let Some(event) = stream.next().await {
            if cancel.is_cancelled() {
                return Err(TurnError::Cancelled);
            }

            builder.process_event(&event);

            match event {
                MessageEvent::TextDelta { delta, .. } => {
                    if tool_seen {
                        withheld.push_str(&delta);
                    } else {
                        self.sink.text(delta).await;
                    }
                }
                MessageEvent::ToolUseStart { .. } => {
                    tool_seen = true;
                }
                MessageEvent::ToolUseEnd { .. } => {
                    if !withheld.is_empty() {
                        self.sink.text(std::mem::take(&mut withheld)).await;
                    }
                }
                MessageEvent::Error { message } => {
                    return Err(TurnError::Stream(message));
                }
                MessageEvent::Done { stop_reason, usage } => {
                    finished = Some((stop_reason, usage));
                }
                _ => {}
            }
        }

        let Some((stop_reason, usage)) = finished else {
            return Err(TurnError::Stream(
                "provider stream ended without a terminal event".to_string(),
            ));
        };

        // Text that trailed the last committed tool call
        if !withheld.is_empty() {
            self.sink.text(withheld).await;
        }

        let message = builder.build();
        let content = message.content().to_vec();
        let tool_calls = content
            .iter()
            .filter_map(|c| match c {
                Content::ToolUse { id, name, input } => Some(ToolCallRequest {
                    id: id.clone(),
                    name: name.clone(),
                    input: input.clone(),
                }),
                _ => None,
            })
            .collect();

        Ok(TurnOutput {
            content,
            tool_calls,
            usage,
            stop_reason: Some(stop_reason),
        })
    }
}
