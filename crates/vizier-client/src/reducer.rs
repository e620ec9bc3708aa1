//! The incremental fold from event frames to display blocks.
//!
//! `reduce` is a pure function `(state, frame) -> state` and `render`
//! rebuilds the full block list from state; nothing mutates blocks
//! field-by-field. The `Reducer` shell applies the result, keeping the
//! fold independently testable without a rendering surface.

use vizier_agent::document::{self, DocumentStart};
use vizier_agent::frames::{ChartSpec, EventFrame, MapSpec};

use crate::blocks::{DisplayBlock, ThoughtSegment};

/// Lifecycle of one assistant turn on the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStatus {
    Streaming,
    Done,
    Cancelled,
}

/// Arrival-ordered non-text artifacts.
#[derive(Debug, Clone, PartialEq)]
enum Artifact {
    Chart(ChartSpec),
    Map(MapSpec),
    Output { source: String, content: String },
}

/// Accumulated state for one assistant turn.
///
/// `live` holds text since the last commit boundary; a `tool_start` frame
/// irrevocably moves it into the chain-of-thought aggregate, so text is
/// never duplicated between the trail and the final answer.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnState {
    thought: Vec<ThoughtSegment>,
    live: String,
    doc: Option<DocumentStart>,
    artifacts: Vec<Artifact>,
    intermediate_text: String,
    saved_id: Option<String>,
    notes: Vec<String>,
    status: TurnStatus,
}

impl TurnState {
    pub fn new() -> Self {
        Self {
            thought: Vec::new(),
            live: String::new(),
            doc: None,
            artifacts: Vec::new(),
            intermediate_text: String::new(),
            saved_id: None,
            notes: Vec::new(),
            status: TurnStatus::Streaming,
        }
    }
}

impl Default for TurnState {
    fn default() -> Self {
        Self::new()
    }
}

/// Fold one frame into the state. Pure: the inputs are never mutated.
///
/// Once a terminal frame has been applied the state is frozen; replaying a
/// terminal frame (or anything else) is a no-op at the block level.
pub fn reduce(state: &TurnState, frame: &EventFrame) -> TurnState {
    if state.status != TurnStatus::Streaming {
        return state.clone();
    }

    let mut next = state.clone();
    match frame {
        EventFrame::Text { text } => {
            next.live.push_str(text);
            // Document-start detection runs against the full accumulated
            // text; until it fires, everything is ordinary narration.
            if next.doc.is_none() {
                next.doc = document::detect_start(&next.live);
            }
        }
        EventFrame::IntermediateText { text } => {
            next.intermediate_text.push_str(text);
        }
        EventFrame::IntermediateOutput { source, content } => {
            next.artifacts.push(Artifact::Output {
                source: source.clone(),
                content: content.clone(),
            });
        }
        EventFrame::ToolStart { args, sql, .. } => {
            // Commit boundary: live text moves into the trail and the
            // buffer clears.
            let committed = std::mem::take(&mut next.live);
            next.thought.extend(split_narration(&committed));
            next.doc = None;

            let statement = sql.clone().or_else(|| {
                args.get("sql")
                    .or_else(|| args.get("query"))
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
            });
            if let Some(sql) = statement {
                next.thought.push(ThoughtSegment::Query { sql });
            }
        }
        EventFrame::ToolEnd { .. } => {}
        EventFrame::Chart { spec } => {
            next.artifacts.push(Artifact::Chart(spec.clone()));
        }
        EventFrame::Map { spec } => {
            next.artifacts.push(Artifact::Map(spec.clone()));
        }
        EventFrame::ContentSaved { id } => {
            next.saved_id = Some(id.clone());
        }
        EventFrame::Error { message } => {
            // Appended as a note; prior content is never retracted
            next.notes.push(message.clone());
        }
        EventFrame::Done => {
            next.status = TurnStatus::Done;
        }
        EventFrame::Cancelled => {
            next.status = TurnStatus::Cancelled;
        }
    }
    next
}

/// Rebuild the ordered display block list from state.
pub fn render(state: &TurnState) -> Vec<DisplayBlock> {
    let mut blocks = Vec::new();

    if !state.intermediate_text.trim().is_empty() {
        blocks.push(DisplayBlock::Intermediate {
            source: "analysis".to_string(),
            content: state.intermediate_text.trim().to_string(),
        });
    }

    for artifact in &state.artifacts {
        blocks.push(match artifact {
            Artifact::Chart(spec) => DisplayBlock::Chart { spec: spec.clone() },
            Artifact::Map(spec) => DisplayBlock::Map { spec: spec.clone() },
            Artifact::Output { source, content } => DisplayBlock::Intermediate {
                source: source.clone(),
                content: content.clone(),
            },
        });
    }

    if !state.thought.is_empty() {
        blocks.push(DisplayBlock::ChainOfThought {
            segments: state.thought.clone(),
        });
    }

    match state.status {
        TurnStatus::Done => render_final(&mut blocks, &state.live, state.saved_id.as_ref()),
        TurnStatus::Streaming | TurnStatus::Cancelled => {
            render_streaming(&mut blocks, &state.live, state.doc.as_ref(), state.saved_id.as_ref())
        }
    }

    for note in &state.notes {
        blocks.push(DisplayBlock::Text {
            text: format!("Error: {}", note),
        });
    }

    blocks
}

/// Render the live region while streaming (or after cancellation, which
/// keeps whatever accumulated).
fn render_streaming(
    blocks: &mut Vec<DisplayBlock>,
    live: &str,
    doc: Option<&DocumentStart>,
    saved_id: Option<&String>,
) {
    match doc {
        Some(start) => {
            let prefix = live[..start.prefix_end].trim();
            if !prefix.is_empty() {
                blocks.push(DisplayBlock::Text {
                    text: prefix.to_string(),
                });
            }
            // Replace, not append: the body is recomputed from the stored
            // offset on every frame, so reissued overlapping text upstream
            // cannot corrupt it.
            blocks.push(DisplayBlock::Document {
                content: document::streaming_body(live, start).trim_start().to_string(),
                is_complete: false,
                saved_id: saved_id.cloned(),
            });
        }
        None => {
            let text = live.trim();
            if !text.is_empty() {
                blocks.push(DisplayBlock::Text {
                    text: text.to_string(),
                });
            }
        }
    }
}

/// Classify remaining live text at the `done` boundary: final answer prose,
/// or an embedded document with leading/trailing prose kept as separate
/// blocks.
fn render_final(blocks: &mut Vec<DisplayBlock>, live: &str, saved_id: Option<&String>) {
    match document::extract(live) {
        Some(doc) => {
            let prefix = doc.prefix.trim();
            if !prefix.is_empty() {
                blocks.push(DisplayBlock::Text {
                    text: prefix.to_string(),
                });
            }
            blocks.push(DisplayBlock::Document {
                content: doc.body,
                is_complete: true,
                saved_id: saved_id.cloned(),
            });
            render_prose(blocks, &doc.suffix);
        }
        None => render_prose(blocks, live),
    }
}

/// Render completed prose, splitting out a trailing suggestions fence.
fn render_prose(blocks: &mut Vec<DisplayBlock>, text: &str) {
    let (prose, suggestions) = split_suggestions(text);
    let prose = prose.trim();
    if !prose.is_empty() {
        blocks.push(DisplayBlock::Text {
            text: prose.to_string(),
        });
    }
    if !suggestions.is_empty() {
        blocks.push(DisplayBlock::Suggestions { items: suggestions });
    }
}

/// Split narration into alternating prose and fenced-query segments,
/// preserving arrival order, so a user can audit what was queried and why
/// without reading raw events.
fn split_narration(text: &str) -> Vec<ThoughtSegment> {
    let mut segments = Vec::new();
    let mut prose = String::new();
    let mut query = String::new();
    let mut in_query = false;

    let flush_prose = |segments: &mut Vec<ThoughtSegment>, prose: &mut String| {
        let trimmed = prose.trim();
        if !trimmed.is_empty() {
            segments.push(ThoughtSegment::Prose {
                text: trimmed.to_string(),
            });
        }
        prose.clear();
    };

    for line in text.lines() {
        let trimmed = line.trim();
        if !in_query && trimmed.eq_ignore_ascii_case("```sql") {
            flush_prose(&mut segments, &mut prose);
            in_query = true;
            continue;
        }
        if in_query && trimmed == "```" {
            segments.push(ThoughtSegment::Query {
                sql: query.trim().to_string(),
            });
            query.clear();
            in_query = false;
            continue;
        }
        if in_query {
            query.push_str(line);
            query.push('\n');
        } else {
            prose.push_str(line);
            prose.push('\n');
        }
    }

    // An unterminated fence still counts as a query segment
    if in_query && !query.trim().is_empty() {
        segments.push(ThoughtSegment::Query {
            sql: query.trim().to_string(),
        });
    }
    flush_prose(&mut segments, &mut prose);

    segments
}

/// Split a trailing ```suggestions fence (one item per line) out of prose.
fn split_suggestions(text: &str) -> (String, Vec<String>) {
    let mut prose_lines: Vec<&str> = Vec::new();
    let mut items: Vec<String> = Vec::new();
    let mut in_fence = false;
    let mut found = false;

    for line in text.lines() {
        let trimmed = line.trim();
        if !in_fence && trimmed.eq_ignore_ascii_case("```suggestions") {
            in_fence = true;
            found = true;
            continue;
        }
        if in_fence && trimmed == "```" {
            in_fence = false;
            continue;
        }
        if in_fence {
            if !trimmed.is_empty() {
                items.push(trimmed.to_string());
            }
        } else {
            prose_lines.push(line);
        }
    }

    if !found {
        return (text.to_string(), vec![]);
    }
    (prose_lines.join("\n"), items)
}

/// The reducer's output: the rebuilt block list plus the turn lifecycle,
/// so a shell can annotate cancelled turns without the reducer knowing
/// anything about rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct ReducedMessage {
    pub blocks: Vec<DisplayBlock>,
    pub status: TurnStatus,
}

/// Thin stateful shell over the pure fold.
#[derive(Debug, Default)]
pub struct Reducer {
    state: TurnState,
}

impl Reducer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one frame and return the rebuilt message.
    pub fn apply(&mut self, frame: &EventFrame) -> ReducedMessage {
        self.state = reduce(&self.state, frame);
        self.message()
    }

    /// The current rebuilt message.
    pub fn message(&self) -> ReducedMessage {
        ReducedMessage {
            blocks: render(&self.state),
            status: self.state.status,
        }
    }

    pub fn status(&self) -> TurnStatus {
        self.state.status
    }
}
