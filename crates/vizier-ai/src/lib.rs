//! vizier-ai: streaming model provider layer
//!
//! This crate provides the message/content types shared across the
//! workspace, the streaming event vocabulary, and one concrete provider
//! that speaks the Anthropic Messages API over SSE. Everything above this
//! layer treats the provider as a black-box streaming call.

pub mod error;
pub mod providers;
pub mod stream;
pub mod types;

pub use error::{Error, Result};
pub use stream::{MessageBuilder, MessageEvent, MessageEventStream};
pub use types::{
    AssistantMetadata, Content, Context, Message, Model, StopReason, StreamOptions, Tool, Usage,
};
