//! Conversation orchestrator: the multi-turn tool-use loop.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use vizier_ai::{Content, Context, Message};

use crate::conversation::ConversationState;
use crate::error::{Error, Result};
use crate::frames::FrameSink;
use crate::gateway::ToolGateway;
use crate::retry::{RetryPolicy, RetryState};
use crate::turn::{ModelStream, TurnError, TurnExecutor, TurnOutput};

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// System prompt for every model call in the exchange
    pub system_prompt: Option<String>,
    /// Hard ceiling on model calls per exchange; exceeding it is fatal
    pub max_turns: u32,
    /// Retry policy for transient stream failures
    pub retry: RetryPolicy,
    /// Optional wall-clock bound on a single model call; expiry is treated
    /// as a transient failure
    pub turn_timeout: Option<Duration>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            system_prompt: None,
            max_turns: 12,
            retry: RetryPolicy::default(),
            turn_timeout: None,
        }
    }
}

/// How an exchange ended (fatal errors are reported via `Error` instead).
#[derive(Debug, Clone)]
pub enum ExchangeStatus {
    /// The model produced a turn with no tool calls
    Completed { final_text: String },
    /// Cooperatively cancelled; partial output stands
    Cancelled,
}

/// Result of one exchange.
#[derive(Debug, Clone)]
pub struct ExchangeOutcome {
    pub status: ExchangeStatus,
    pub turns: u32,
}

impl ExchangeOutcome {
    fn cancelled(turns: u32) -> Self {
        Self {
            status: ExchangeStatus::Cancelled,
            turns,
        }
    }

    /// The final answer text, if the exchange completed
    pub fn final_text(&self) -> Option<&str> {
        match &self.status {
            ExchangeStatus::Completed { final_text } => Some(final_text),
            ExchangeStatus::Cancelled => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.status, ExchangeStatus::Cancelled)
    }
}

/// Runs the multi-turn loop: call the turn executor, run any requested
/// tools through the gateway, append results to conversation state, repeat
/// until a turn produces no tool calls.
///
/// The loop owns its `ConversationState` for the lifetime of one exchange.
/// Terminal frames are emitted by the caller, never here, so a driver can
/// interleave frames like `content_saved` before `done`.
pub struct Orchestrator {
    config: OrchestratorConfig,
    model: Arc<dyn ModelStream>,
    gateway: Arc<ToolGateway>,
    sink: FrameSink,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        model: Arc<dyn ModelStream>,
        gateway: Arc<ToolGateway>,
        sink: FrameSink,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            model,
            gateway,
            sink,
            cancel,
        }
    }

    /// Build the outbound context from conversation state.
    fn build_context(&self, state: &ConversationState) -> Context {
        Context {
            system_prompt: self.config.system_prompt.clone(),
            messages: state.messages.clone(),
            tools: self.gateway.api_tools(),
        }
    }

    /// Run one exchange to completion.
    pub async fn run(&self, state: &mut ConversationState) -> Result<ExchangeOutcome> {
        let executor = TurnExecutor::new(self.model.as_ref(), &self.sink);
        let mut turns = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                return Ok(ExchangeOutcome::cancelled(turns));
            }
            if turns >= self.config.max_turns {
                tracing::error!(
                    exchange = %state.id,
                    max_turns = self.config.max_turns,
                    "tool-use loop hit the turn ceiling"
                );
                return Err(Error::MaxTurnsExceeded(self.config.max_turns));
            }
            turns += 1;

            let output = match self.run_turn_with_retry(&executor, state).await? {
                Some(output) => output,
                // Cancelled mid-stream
                None => return Ok(ExchangeOutcome::cancelled(turns)),
            };

            let assistant = Message::assistant(output.content.clone());

            if output.tool_calls.is_empty() {
                state.push(assistant);
                tracing::debug!(exchange = %state.id, turns, "exchange finished");
                return Ok(ExchangeOutcome {
                    status: ExchangeStatus::Completed {
                        final_text: output.text(),
                    },
                    turns,
                });
            }

            // ToolPhase: announce, fan out, fan in. Partial failures degrade
            // to error tool-results and never abort sibling calls.
            for call in &output.tool_calls {
                self.sink.tool_start(call).await;
            }

            let batch = output
                .tool_calls
                .iter()
                .map(|call| self.gateway.execute(call, &self.sink, self.cancel.clone()));
            let outcomes = futures::future::join_all(batch).await;

            let mut results = Vec::with_capacity(outcomes.len());
            for outcome in &outcomes {
                self.sink.tool_end(&outcome.tool_name).await;
                self.sink
                    .tool_output(&outcome.tool_name, &outcome.content)
                    .await;
                results.push(Content::tool_result(
                    &outcome.tool_use_id,
                    &outcome.content,
                    outcome.is_error,
                ));
            }

            // Every tool_use is answered before the next model call: one
            // assistant message with all text+tool_use blocks, one user
            // message with all tool_result blocks.
            state.push(assistant);
            state.push(Message::user_with_content(results));

            if self.cancel.is_cancelled() {
                // Completed tool results stay in the conversation
                return Ok(ExchangeOutcome::cancelled(turns));
            }
        }
    }

    /// Run one model call, retrying transient failures under the policy.
    /// Returns `Ok(None)` when cancelled mid-stream.
    async fn run_turn_with_retry(
        &self,
        executor: &TurnExecutor<'_>,
        state: &ConversationState,
    ) -> Result<Option<TurnOutput>> {
        // Retry bookkeeping is scoped to this single model call
        let mut retry = RetryState::new();

        loop {
            let context = self.build_context(state);
            let attempt = match self.config.turn_timeout {
                Some(limit) => {
                    match tokio::time::timeout(limit, executor.run(context, &self.cancel)).await {
                        Ok(result) => result,
                        Err(_) => Err(TurnError::Stream(format!(
                            "model call timeout after {:?}",
                            limit
                        ))),
                    }
                }
                None => executor.run(context, &self.cancel).await,
            };

            match attempt {
                Ok(output) => return Ok(Some(output)),
                Err(TurnError::Cancelled) => return Ok(None),
                Err(e) => {
                    let transient = e.is_transient();
                    retry.record(e.to_string());

                    if transient && retry.retries_remain(&self.config.retry) {
                        let delay = self.config.retry.delay_for_attempt(retry.attempt - 1);
                        tracing::warn!(
                            exchange = %state.id,
                            attempt = retry.attempt,
                            max = self.config.retry.max_retries,
                            error = %retry.last_error_message(),
                            "transient stream failure, retrying in {:?}",
                            delay
                        );
                        self.sink
                            .text(format!(
                                "\nRetrying after a transient error (attempt {} of {})...\n",
                                retry.attempt, self.config.retry.max_retries
                            ))
                            .await;
                        tokio::time::sleep(delay).await;
                        if self.cancel.is_cancelled() {
                            return Ok(None);
                        }
                        continue;
                    }

                    return Err(if transient {
                        Error::RetriesExhausted {
                            attempts: retry.attempt,
                            last_error: retry.last_error_message(),
                        }
                    } else {
                        Error::Stream(retry.last_error_message())
                    });
                }
            }
        }
    }
}
