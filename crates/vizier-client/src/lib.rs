//! vizier-client: incremental stream reducer
//!
//! Consumes the event frame sequence produced by the server and folds it
//! into a typed, displayable message: narration, tool activity, charts,
//! maps, and partially-streamed generated documents, reconstructed without
//! ever seeing the whole message at once. Rendering is out of scope; the
//! output is a list of display blocks for some rendering surface to draw.

pub mod blocks;
pub mod decode;
pub mod reducer;
pub mod session;

pub use blocks::{DisplayBlock, ThoughtSegment};
pub use decode::{DecodeError, FrameDecoder};
pub use reducer::{ReducedMessage, Reducer, TurnStatus};
pub use session::ComparisonSession;
