//! Typed display blocks: the reducer's output vocabulary.

use serde::{Deserialize, Serialize};
use vizier_agent::frames::{ChartSpec, MapSpec};

/// One segment of the visible reasoning/activity trail, in arrival order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ThoughtSegment {
    /// Narration prose
    Prose { text: String },
    /// A query the agent ran, shown as a collapsible block
    Query { sql: String },
}

/// A displayable unit of one assistant turn. The reducer rebuilds the full
/// ordered block list on every incoming frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DisplayBlock {
    /// Final-answer prose
    Text { text: String },

    /// Aggregated narration + query trail preceding the answer
    ChainOfThought { segments: Vec<ThoughtSegment> },

    /// A rendered chart
    Chart { spec: ChartSpec },

    /// A rendered map
    Map { spec: MapSpec },

    /// A generated document, possibly still streaming
    Document {
        content: String,
        is_complete: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        saved_id: Option<String>,
    },

    /// Data-gathering output from the two-phase pipeline
    Intermediate { source: String, content: String },

    /// Follow-up suggestions offered with the final answer
    Suggestions { items: Vec<String> },
}

impl DisplayBlock {
    /// The query statements inside a chain-of-thought block, in order.
    pub fn sql_statements(&self) -> Vec<&str> {
        match self {
            DisplayBlock::ChainOfThought { segments } => segments
                .iter()
                .filter_map(|s| match s {
                    ThoughtSegment::Query { sql } => Some(sql.as_str()),
                    _ => None,
                })
                .collect(),
            _ => vec![],
        }
    }

    /// Whether this is a document block
    pub fn is_document(&self) -> bool {
        matches!(self, DisplayBlock::Document { .. })
    }
}
