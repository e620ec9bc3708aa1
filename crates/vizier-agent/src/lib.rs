//! vizier-agent: streaming tool-use orchestration
//!
//! This crate drives a language model through repeated rounds of
//! "respond, optionally call tools, feed results back" while forwarding
//! partial output to a client as ordered event frames. It contains the
//! retry policy, the event protocol and emitter, the turn executor, the
//! conversation orchestrator, the tool gateway with its access policy,
//! and the two-phase pipeline coordinator.

pub mod access;
pub mod conversation;
pub mod document;
pub mod error;
pub mod frames;
pub mod gateway;
pub mod orchestrator;
pub mod pipeline;
pub mod retry;
pub mod tool;
pub mod turn;

pub use access::{AccessPolicy, AccessViolation};
pub use conversation::ConversationState;
pub use error::{Error, Result};
pub use frames::{ChartSpec, ColumnFrame, EventFrame, FrameSink, MapPoint, MapSpec};
pub use gateway::{CHART_TOOL, MAP_TOOL, ToolGateway};
pub use orchestrator::{ExchangeOutcome, ExchangeStatus, Orchestrator, OrchestratorConfig};
pub use pipeline::PipelineCoordinator;
pub use retry::{ErrorClass, RetryPolicy, RetryState};
pub use tool::{ToolCallRequest, ToolDescriptor, ToolOutcome, ToolProvider, ToolProviderError};
pub use turn::{ModelStream, TurnError, TurnExecutor, TurnOutput};
