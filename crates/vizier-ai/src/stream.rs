//! Streaming event types and utilities

use crate::types::{Content, Message, StopReason, Usage};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio_stream::Stream;

/// Events emitted during message streaming
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageEvent {
    /// Text content started
    TextStart { content_index: usize },
    /// Text content delta
    TextDelta { content_index: usize, delta: String },
    /// Text content completed
    TextEnd { content_index: usize, text: String },
    /// Tool call started
    ToolUseStart {
        content_index: usize,
        id: String,
        name: String,
    },
    /// Tool call arguments delta (partial serialized JSON)
    ToolUseDelta { content_index: usize, delta: String },
    /// Tool call completed (the call's terminator)
    ToolUseEnd {
        content_index: usize,
        id: String,
        name: String,
    },
    /// Message completed successfully
    Done {
        stop_reason: StopReason,
        usage: Usage,
    },
    /// Error occurred
    Error { message: String },
}

impl MessageEvent {
    /// Check if this is a terminal event (Done or Error)
    pub fn is_terminal(&self) -> bool {
        matches!(self, MessageEvent::Done { .. } | MessageEvent::Error { .. })
    }
}

/// A stream of message events
pub type MessageEventStream = Pin<Box<dyn Stream<Item = MessageEvent> + Send>>;

/// Builder for reconstructing an assistant message from streaming events.
///
/// Tool-call argument fragments arrive as a serialized-JSON byte stream and
/// are buffered until the call's terminator; a parse failure at that point
/// degrades to an empty argument object rather than failing the message.
#[derive(Debug, Default)]
pub struct MessageBuilder {
    content_buffers: Vec<ContentBuffer>,
    usage: Usage,
    stop_reason: Option<StopReason>,
}

#[derive(Debug)]
enum ContentBuffer {
    Text(String),
    ToolUse {
        id: String,
        name: String,
        arguments_json: String,
        committed: Option<serde_json::Value>,
    },
}

impl MessageBuilder {
    /// Create a new message builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Process a streaming event and update the message state
    pub fn process_event(&mut self, event: &MessageEvent) {
        match event {
            MessageEvent::TextStart { content_index } => {
                self.ensure_buffer(*content_index, ContentBuffer::Text(String::new()));
            }
            MessageEvent::TextDelta {
                content_index,
                delta,
            } => {
                // Tolerate providers that skip the start event
                while self.content_buffers.len() <= *content_index {
                    self.content_buffers.push(ContentBuffer::Text(String::new()));
                }
                if let ContentBuffer::Text(text) = &mut self.content_buffers[*content_index] {
                    text.push_str(delta);
                }
            }
            MessageEvent::TextEnd {
                content_index,
                text,
            } => {
                if *content_index < self.content_buffers.len() {
                    self.content_buffers[*content_index] = ContentBuffer::Text(text.clone());
                }
            }
            MessageEvent::ToolUseStart {
                content_index,
                id,
                name,
            } => {
                self.ensure_buffer(
                    *content_index,
                    ContentBuffer::ToolUse {
                        id: id.clone(),
                        name: name.clone(),
                        arguments_json: String::new(),
                        committed: None,
                    },
                );
            }
            MessageEvent::ToolUseDelta {
                content_index,
                delta,
            } => {
                if let Some(ContentBuffer::ToolUse { arguments_json, .. }) =
                    self.content_buffers.get_mut(*content_index)
                {
                    arguments_json.push_str(delta);
                }
            }
            MessageEvent::ToolUseEnd { content_index, .. } => {
                if let Some(ContentBuffer::ToolUse {
                    arguments_json,
                    committed,
                    ..
                }) = self.content_buffers.get_mut(*content_index)
                {
                    *committed = Some(parse_arguments(arguments_json));
                }
            }
            MessageEvent::Done {
                stop_reason, usage, ..
            } => {
                self.stop_reason = Some(*stop_reason);
                self.usage = usage.clone();
            }
            _ => {}
        }
    }

    /// Build the final message
    pub fn build(self) -> Message {
        let content: Vec<Content> = self
            .content_buffers
            .into_iter()
            .map(|buf| match buf {
                ContentBuffer::Text(text) => Content::Text { text },
                ContentBuffer::ToolUse {
                    id,
                    name,
                    arguments_json,
                    committed,
                } => {
                    let input = committed.unwrap_or_else(|| parse_arguments(&arguments_json));
                    Content::ToolUse { id, name, input }
                }
            })
            .collect();

        Message::Assistant {
            content,
            metadata: crate::types::AssistantMetadata {
                usage: self.usage,
                stop_reason: self.stop_reason,
                timestamp: chrono::Utc::now().timestamp_millis(),
                ..Default::default()
            },
        }
    }

    /// Get the current partial content state
    pub fn current_content(&self) -> Vec<Content> {
        self.content_buffers
            .iter()
            .map(|buf| match buf {
                ContentBuffer::Text(text) => Content::Text { text: text.clone() },
                ContentBuffer::ToolUse {
                    id,
                    name,
                    arguments_json,
                    committed,
                } => Content::ToolUse {
                    id: id.clone(),
                    name: name.clone(),
                    input: committed
                        .clone()
                        .unwrap_or_else(|| parse_arguments(arguments_json)),
                },
            })
            .collect()
    }

    fn ensure_buffer(&mut self, index: usize, default: ContentBuffer) {
        while self.content_buffers.len() <= index {
            self.content_buffers.push(ContentBuffer::Text(String::new()));
        }
        self.content_buffers[index] = default;
    }
}

/// Parse buffered tool-call arguments, degrading to an empty object when the
/// buffered JSON is empty or malformed.
pub fn parse_arguments(arguments_json: &str) -> serde_json::Value {
    if arguments_json.trim().is_empty() {
        return serde_json::json!({});
    }
    serde_json::from_str(arguments_json).unwrap_or_else(|_| serde_json::json!({}))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_text_only() {
        let mut b = MessageBuilder::new();
        b.process_event(&MessageEvent::TextStart { content_index: 0 });
        b.process_event(&MessageEvent::TextDelta {
            content_index: 0,
            delta: "hel".into(),
        });
        b.process_event(&MessageEvent::TextDelta {
            content_index: 0,
            delta: "lo".into(),
        });
        let msg = b.build();
        assert_eq!(msg.text(), "hello");
    }

    #[test]
    fn test_builder_tool_use_arguments_parsed_at_terminator() {
        let mut b = MessageBuilder::new();
        b.process_event(&MessageEvent::ToolUseStart {
            content_index: 0,
            id: "c1".into(),
            name: "query".into(),
        });
        b.process_event(&MessageEvent::ToolUseDelta {
            content_index: 0,
            delta: "{\"sql\":".into(),
        });
        b.process_event(&MessageEvent::ToolUseDelta {
            content_index: 0,
            delta: "\"SELECT 1\"}".into(),
        });
        b.process_event(&MessageEvent::ToolUseEnd {
            content_index: 0,
            id: "c1".into(),
            name: "query".into(),
        });
        let msg = b.build();
        let calls = msg.tool_uses();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].2["sql"], "SELECT 1");
    }

    #[test]
    fn test_builder_malformed_arguments_degrade_to_empty_object() {
        let mut b = MessageBuilder::new();
        b.process_event(&MessageEvent::ToolUseStart {
            content_index: 0,
            id: "c1".into(),
            name: "query".into(),
        });
        b.process_event(&MessageEvent::ToolUseDelta {
            content_index: 0,
            delta: "{\"sql\": \"SELECT".into(),
        });
        b.process_event(&MessageEvent::ToolUseEnd {
            content_index: 0,
            id: "c1".into(),
            name: "query".into(),
        });
        let msg = b.build();
        let calls = msg.tool_uses();
        assert_eq!(*calls[0].2, serde_json::json!({}));
    }

    #[test]
    fn test_builder_interleaved_text_and_tool() {
        let mut b = MessageBuilder::new();
        b.process_event(&MessageEvent::TextStart { content_index: 0 });
        b.process_event(&MessageEvent::TextDelta {
            content_index: 0,
            delta: "checking".into(),
        });
        b.process_event(&MessageEvent::ToolUseStart {
            content_index: 1,
            id: "c1".into(),
            name: "query".into(),
        });
        b.process_event(&MessageEvent::ToolUseEnd {
            content_index: 1,
            id: "c1".into(),
            name: "query".into(),
        });
        let content = b.build();
        assert_eq!(content.content().len(), 2);
        assert!(content.content()[1].is_tool_use());
    }

    #[test]
    fn test_builder_delta_without_start() {
        let mut b = MessageBuilder::new();
        b.process_event(&MessageEvent::TextDelta {
            content_index: 0,
            delta: "no start event".into(),
        });
        assert_eq!(b.build().text(), "no start event");
    }

    #[test]
    fn test_parse_arguments_empty_is_object() {
        assert_eq!(parse_arguments(""), serde_json::json!({}));
        assert_eq!(parse_arguments("   "), serde_json::json!({}));
    }
}
