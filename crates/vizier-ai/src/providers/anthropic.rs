//! Anthropic Claude API provider

use crate::{
    error::{Error, Result},
    stream::{MessageEvent, MessageEventStream},
    types::{Content, Context, Message, Model, StopReason, StreamOptions, Tool, Usage},
};
use async_stream::stream;
use futures::StreamExt;
use reqwest_eventsource::{Event, EventSource};
use serde::{Deserialize, Serialize};

/// Anthropic API client
pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider with an API key
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
        }
    }

    /// Create from environment variable
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY").map_err(|_| Error::InvalidApiKey)?;
        Ok(Self::new(api_key))
    }

    /// Stream a response from Claude
    pub async fn stream(
        &self,
        model: &Model,
        context: &Context,
        options: &StreamOptions,
    ) -> Result<MessageEventStream> {
        let request = build_request(model, context, options);
        let url = format!("{}/v1/messages", model.base_url);

        tracing::debug!("Anthropic API URL: {}", url);

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "x-api-key",
            self.api_key
                .parse()
                .map_err(|_| Error::InvalidApiKey)?,
        );
        headers.insert("accept", "application/json".parse().unwrap());
        headers.insert(
            "content-type",
            "application/json".parse().unwrap(),
        );
        headers.insert(
            "anthropic-version",
            "2023-06-01".parse().unwrap(),
        );

        // Model-specific headers
        for (key, value) in &model.headers {
            if let (Ok(name), Ok(val)) = (
                key.parse::<reqwest::header::HeaderName>(),
                value.parse::<reqwest::header::HeaderValue>(),
            ) {
                headers.insert(name, val);
            }
        }

        let request_builder = self.client.post(&url).headers(headers).json(&request);

        let event_source = EventSource::new(request_builder)
            .map_err(|e| Error::Sse(format!("Failed to create event source: {}", e)))?;

        Ok(Box::pin(create_stream(event_source)))
    }
}

fn build_request(model: &Model, context: &Context, options: &StreamOptions) -> AnthropicRequest {
    let messages = convert_messages(&context.messages);
    let tools = if context.tools.is_empty() {
        None
    } else {
        Some(convert_tools(&context.tools))
    };

    AnthropicRequest {
        model: model.id.clone(),
        messages,
        max_tokens: options.max_tokens.unwrap_or(model.max_tokens),
        stream: true,
        system: context.system_prompt.clone(),
        temperature: options.temperature,
        tools,
    }
}

/// Create the event stream from SSE events
fn create_stream(mut event_source: EventSource) -> impl futures::Stream<Item = MessageEvent> {
    stream! {
        let mut usage = Usage::default();
        let mut stop_reason = StopReason::Stop;
        let mut blocks: Vec<BlockKind> = vec![];
        let mut error_message: Option<String> = None;

        while let Some(event_result) = event_source.next().await {
            match event_result {
                Ok(Event::Open) => {}
                Ok(Event::Message(message)) => {
                    match message.event.as_str() {
                        "message_start" => {
                            if let Ok(data) = serde_json::from_str::<MessageStartEvent>(&message.data) {
                                usage.input = data.message.usage.input_tokens;
                                usage.output = data.message.usage.output_tokens;
                                usage.cache_read =
                                    data.message.usage.cache_read_input_tokens.unwrap_or(0);
                                usage.cache_write =
                                    data.message.usage.cache_creation_input_tokens.unwrap_or(0);
                            }
                        }
                        "content_block_start" => {
                            if let Ok(data) =
                                serde_json::from_str::<ContentBlockStartEvent>(&message.data)
                            {
                                let index = data.index as usize;
                                while blocks.len() <= index {
                                    blocks.push(BlockKind::Empty);
                                }
                                match data.content_block.block_type.as_str() {
                                    "text" => {
                                        blocks[index] = BlockKind::Text { text: String::new() };
                                        yield MessageEvent::TextStart { content_index: index };
                                    }
                                    "tool_use" => {
                                        let id = data.content_block.id.unwrap_or_default();
                                        let name = data.content_block.name.unwrap_or_default();
                                        blocks[index] = BlockKind::ToolUse {
                                            id: id.clone(),
                                            name: name.clone(),
                                        };
                                        yield MessageEvent::ToolUseStart {
                                            content_index: index,
                                            id,
                                            name,
                                        };
                                    }
                                    _ => {}
                                }
                            }
                        }
                        "content_block_delta" => {
                            if let Ok(data) =
                                serde_json::from_str::<ContentBlockDeltaEvent>(&message.data)
                            {
                                let index = data.index as usize;
                                match data.delta.delta_type.as_str() {
                                    "text_delta" => {
                                        let delta = data.delta.text.unwrap_or_default();
                                        if let Some(BlockKind::Text { text }) = blocks.get_mut(index) {
                                            text.push_str(&delta);
                                        }
                                        yield MessageEvent::TextDelta {
                                            content_index: index,
                                            delta,
                                        };
                                    }
                                    "input_json_delta" => {
                                        yield MessageEvent::ToolUseDelta {
                                            content_index: index,
                                            delta: data.delta.partial_json.unwrap_or_default(),
                                        };
                                    }
                                    _ => {}
                                }
                            }
                        }
                        "content_block_stop" => {
                            if let Ok(data) =
                                serde_json::from_str::<ContentBlockStopEvent>(&message.data)
                            {
                                let index = data.index as usize;
                                match blocks.get(index) {
                                    Some(BlockKind::Text { text }) => {
                                        yield MessageEvent::TextEnd {
                                            content_index: index,
                                            text: text.clone(),
                                        };
                                    }
                                    Some(BlockKind::ToolUse { id, name }) => {
                                        yield MessageEvent::ToolUseEnd {
                                            content_index: index,
                                            id: id.clone(),
                                            name: name.clone(),
                                        };
                                    }
                                    _ => {}
                                }
                            }
                        }
                        "message_delta" => {
                            if let Ok(data) =
                                serde_json::from_str::<MessageDeltaEvent>(&message.data)
                            {
                                if let Some(reason) = data.delta.stop_reason {
                                    stop_reason = map_stop_reason(&reason);
                                }
                                usage.output = data.usage.output_tokens;
                            }
                        }
                        "message_stop" => break,
                        "error" => {
                            if let Ok(data) = serde_json::from_str::<ErrorEvent>(&message.data) {
                                error_message = Some(data.error.message);
                            } else {
                                error_message = Some("provider error".to_string());
                            }
                            break;
                        }
                        _ => {}
                    }
                }
                Err(e) => {
                    error_message = Some(e.to_string());
                    break;
                }
            }
        }

        if let Some(error_msg) = error_message {
            yield MessageEvent::Error { message: error_msg };
        } else {
            yield MessageEvent::Done { stop_reason, usage };
        }
    }
}

fn map_stop_reason(reason: &str) -> StopReason {
    match reason {
        "end_turn" | "stop_sequence" => StopReason::Stop,
        "max_tokens" => StopReason::Length,
        "tool_use" => StopReason::ToolUse,
        _ => StopReason::Stop,
    }
}

/// Per-index block state, tracked so `content_block_stop` can be attributed
/// and text blocks can report their full content at the stop event.
#[derive(Debug, Default)]
enum BlockKind {
    #[default]
    Empty,
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
    },
}

// ============================================================================
// Request types
// ============================================================================

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    max_tokens: u32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<AnthropicTool>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

// ============================================================================
// Response event types
// ============================================================================

#[derive(Debug, Deserialize)]
struct MessageStartEvent {
    message: MessageInfo,
}

#[derive(Debug, Deserialize)]
struct MessageInfo {
    usage: UsageInfo,
}

#[derive(Debug, Deserialize)]
struct UsageInfo {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
    cache_read_input_tokens: Option<u32>,
    cache_creation_input_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ContentBlockStartEvent {
    index: u32,
    content_block: ContentBlockInfo,
}

#[derive(Debug, Deserialize)]
struct ContentBlockInfo {
    #[serde(rename = "type")]
    block_type: String,
    id: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentBlockDeltaEvent {
    index: u32,
    delta: DeltaInfo,
}

#[derive(Debug, Deserialize)]
struct DeltaInfo {
    #[serde(rename = "type")]
    delta_type: String,
    text: Option<String>,
    partial_json: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentBlockStopEvent {
    index: u32,
}

#[derive(Debug, Deserialize)]
struct MessageDeltaEvent {
    delta: MessageDelta,
    usage: UsageInfo,
}

#[derive(Debug, Deserialize)]
struct MessageDelta {
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEvent {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(rename = "type")]
    #[allow(dead_code)]
    error_type: String,
    message: String,
}

// ============================================================================
// Conversion functions
// ============================================================================

fn convert_messages(messages: &[Message]) -> Vec<AnthropicMessage> {
    let mut result = vec![];

    for message in messages {
        match message {
            Message::User { content, .. } => {
                let blocks: Vec<serde_json::Value> = content
                    .iter()
                    .map(|c| match c {
                        Content::Text { text } => {
                            serde_json::json!({ "type": "text", "text": text })
                        }
                        Content::ToolResult {
                            tool_use_id,
                            content,
                            is_error,
                        } => serde_json::json!({
                            "type": "tool_result",
                            "tool_use_id": tool_use_id,
                            "content": content,
                            "is_error": is_error,
                        }),
                        Content::ToolUse { .. } => {
                            // Tool calls never appear in user messages
                            serde_json::json!({ "type": "text", "text": "" })
                        }
                    })
                    .collect();

                result.push(AnthropicMessage {
                    role: "user".to_string(),
                    content: serde_json::Value::Array(blocks),
                });
            }
            Message::Assistant { content, .. } => {
                let blocks: Vec<serde_json::Value> = content
                    .iter()
                    .filter_map(|c| match c {
                        Content::Text { text } => {
                            if text.is_empty() {
                                None
                            } else {
                                Some(serde_json::json!({ "type": "text", "text": text }))
                            }
                        }
                        Content::ToolUse { id, name, input } => Some(serde_json::json!({
                            "type": "tool_use",
                            "id": id,
                            "name": name,
                            "input": input,
                        })),
                        Content::ToolResult { .. } => None,
                    })
                    .collect();

                result.push(AnthropicMessage {
                    role: "assistant".to_string(),
                    content: serde_json::Value::Array(blocks),
                });
            }
        }
    }

    result
}

fn convert_tools(tools: &[Tool]) -> Vec<AnthropicTool> {
    tools
        .iter()
        .map(|t| AnthropicTool {
            name: t.name.clone(),
            description: t.description.clone(),
            input_schema: t.parameters.clone(),
        })
        .collect()
}
