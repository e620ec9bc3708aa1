//! Event frame protocol and the emitter that serializes orchestrator
//! progress into an ordered frame sequence.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::tool::ToolCallRequest;

/// Chart specification produced by the synthetic chart tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSpec {
    /// Chart form: "bar", "line", "pie", ...
    #[serde(rename = "type")]
    pub chart_type: String,
    pub title: String,
    pub data: Vec<serde_json::Value>,
    pub x_key: String,
    pub y_key: String,
}

/// One plotted location on a map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapPoint {
    pub lat: f64,
    pub lng: f64,
    pub label: String,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Map specification produced by the synthetic map tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapSpec {
    pub title: String,
    pub data: Vec<MapPoint>,
    /// [lat, lng] center override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub center: Option<[f64; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zoom: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_label: Option<String>,
}

/// Typed frames sent to the client over a single long-lived response.
///
/// Strictly ordered; at most one terminal frame (`done` or `cancelled`)
/// per turn sequence, always last. Fatal errors arrive as an `error`
/// frame immediately followed by `done`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventFrame {
    /// Final-answer or narration text delta
    Text { text: String },

    /// A tool call is about to execute. For query tools the statement is
    /// lifted out of `args` so clients need not re-parse the argument map.
    ToolStart {
        tool: String,
        args: serde_json::Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sql: Option<String>,
    },

    /// A tool call settled (successfully or not)
    ToolEnd { tool: String },

    /// A chart was synthesized
    Chart { spec: ChartSpec },

    /// A map was synthesized
    Map { spec: MapSpec },

    /// A generated document was persisted under the given id
    ContentSaved { id: String },

    /// Data-gathering phase text (two-phase pipeline only)
    IntermediateText { text: String },

    /// A data-gathering tool result (two-phase pipeline only)
    IntermediateOutput { source: String, content: String },

    /// Fatal exchange error
    Error { message: String },

    /// The exchange was cancelled; accumulated output stands
    Cancelled,

    /// The exchange completed
    Done,
}

impl EventFrame {
    /// Check if this frame terminates the sequence. A fatal `error` frame
    /// is always followed by `done`, so only `done` and `cancelled` close
    /// the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, EventFrame::Done | EventFrame::Cancelled)
    }
}

/// An event frame tagged with the conversation column it belongs to.
///
/// Fan-out comparison runs N independent orchestrators over one response
/// body; `column` tells the client which reducer the frame feeds. The field
/// is omitted on the wire for the common single-column case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnFrame {
    #[serde(default, skip_serializing_if = "is_zero")]
    pub column: usize,
    #[serde(flatten)]
    pub frame: EventFrame,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

impl ColumnFrame {
    pub fn new(column: usize, frame: EventFrame) -> Self {
        Self { column, frame }
    }
}

impl From<EventFrame> for ColumnFrame {
    fn from(frame: EventFrame) -> Self {
        Self { column: 0, frame }
    }
}

/// Serializes orchestrator progress into the ordered frame sequence.
///
/// Cheap to clone; all sinks derived from the same root share the terminal
/// latch, so whoever emits the terminal frame first wins and every later
/// frame is dropped. When the receiving side goes away the sink cancels its
/// token, which cooperatively aborts the exchange that feeds it.
#[derive(Clone)]
pub struct FrameSink {
    tx: mpsc::Sender<ColumnFrame>,
    column: usize,
    terminal_sent: Arc<AtomicBool>,
    intermediate: bool,
    cancel: CancellationToken,
}

impl FrameSink {
    /// Create a sink for column 0
    pub fn new(tx: mpsc::Sender<ColumnFrame>, cancel: CancellationToken) -> Self {
        Self::for_column(tx, 0, cancel)
    }

    /// Create a sink for a specific fan-out column
    pub fn for_column(
        tx: mpsc::Sender<ColumnFrame>,
        column: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            tx,
            column,
            terminal_sent: Arc::new(AtomicBool::new(false)),
            intermediate: false,
            cancel,
        }
    }

    /// A view of this sink that rewrites `text` frames to
    /// `intermediate_text` and surfaces tool outputs, for the pipeline's
    /// data-gathering phase.
    pub fn intermediate(&self) -> FrameSink {
        let mut sink = self.clone();
        sink.intermediate = true;
        sink
    }

    /// Whether this sink is the data-gathering view
    pub fn is_intermediate(&self) -> bool {
        self.intermediate
    }

    /// The cancellation token tripped when the wire closes
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Send a frame, enforcing the single-terminal guarantee.
    pub async fn send(&self, frame: EventFrame) {
        let frame = match (self.intermediate, frame) {
            (true, EventFrame::Text { text }) => EventFrame::IntermediateText { text },
            (_, f) => f,
        };

        if self.terminal_sent.load(Ordering::Acquire) {
            return;
        }
        if frame.is_terminal() {
            // Latch before sending so a racing emitter cannot slip a second
            // terminal frame in between.
            if self.terminal_sent.swap(true, Ordering::AcqRel) {
                return;
            }
        }

        if self
            .tx
            .send(ColumnFrame::new(self.column, frame))
            .await
            .is_err()
        {
            tracing::debug!(column = self.column, "frame receiver dropped, cancelling");
            self.cancel.cancel();
        }
    }

    /// Emit a text frame
    pub async fn text(&self, text: impl Into<String>) {
        self.send(EventFrame::Text { text: text.into() }).await;
    }

    /// Announce a pending tool call
    pub async fn tool_start(&self, call: &ToolCallRequest) {
        self.send(EventFrame::ToolStart {
            tool: call.name.clone(),
            args: call.input.clone(),
            sql: call.sql_text().map(str::to_string),
        })
        .await;
    }

    /// Announce a settled tool call
    pub async fn tool_end(&self, tool: impl Into<String>) {
        self.send(EventFrame::ToolEnd { tool: tool.into() }).await;
    }

    /// Emit a synthesized chart
    pub async fn chart(&self, spec: ChartSpec) {
        self.send(EventFrame::Chart { spec }).await;
    }

    /// Emit a synthesized map
    pub async fn map(&self, spec: MapSpec) {
        self.send(EventFrame::Map { spec }).await;
    }

    /// Announce a persisted document
    pub async fn content_saved(&self, id: impl Into<String>) {
        self.send(EventFrame::ContentSaved { id: id.into() }).await;
    }

    /// Surface a tool result to the client. Only the data-gathering view
    /// forwards these; in standalone mode tool results reach the client
    /// through the model's narration instead.
    pub async fn tool_output(&self, source: impl Into<String>, content: impl Into<String>) {
        if self.intermediate {
            self.send(EventFrame::IntermediateOutput {
                source: source.into(),
                content: content.into(),
            })
            .await;
        }
    }

    /// Emit a fatal error frame
    pub async fn error(&self, message: impl Into<String>) {
        self.send(EventFrame::Error {
            message: message.into(),
        })
        .await;
    }

    /// Emit the cancelled terminal frame
    pub async fn cancelled(&self) {
        self.send(EventFrame::Cancelled).await;
    }

    /// Emit the done terminal frame
    pub async fn done(&self) {
        self.send(EventFrame::Done).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sink_pair(buffer: usize) -> (FrameSink, mpsc::Receiver<ColumnFrame>) {
        let (tx, rx) = mpsc::channel(buffer);
        (FrameSink::new(tx, CancellationToken::new()), rx)
    }

    async fn drain(mut rx: mpsc::Receiver<ColumnFrame>) -> Vec<ColumnFrame> {
        let mut frames = vec![];
        while let Ok(f) = rx.try_recv() {
            frames.push(f);
        }
        rx.close();
        frames
    }

    #[tokio::test]
    async fn test_single_terminal_frame() {
        let (sink, rx) = sink_pair(16);
        sink.text("hello").await;
        sink.done().await;
        sink.done().await;
        sink.error("too late").await;
        let frames = drain(rx).await;
        assert_eq!(frames.len(), 2);
        assert!(matches!(frames[1].frame, EventFrame::Done));
    }

    #[tokio::test]
    async fn test_error_frame_precedes_done() {
        let (sink, rx) = sink_pair(16);
        sink.error("boom").await;
        sink.done().await;
        let frames = drain(rx).await;
        assert_eq!(frames.len(), 2);
        assert!(matches!(frames[0].frame, EventFrame::Error { .. }));
        assert!(matches!(frames[1].frame, EventFrame::Done));
    }

    #[tokio::test]
    async fn test_no_frames_after_terminal() {
        let (sink, rx) = sink_pair(16);
        sink.done().await;
        sink.text("late").await;
        let frames = drain(rx).await;
        assert_eq!(frames.len(), 1);
    }

    #[tokio::test]
    async fn test_intermediate_view_rewrites_text() {
        let (sink, rx) = sink_pair(16);
        let phase1 = sink.intermediate();
        phase1.text("gathering").await;
        phase1.tool_output("query", "3 rows").await;
        sink.text("final").await;
        sink.tool_output("query", "suppressed outside phase 1").await;
        let frames = drain(rx).await;
        assert_eq!(frames.len(), 3);
        assert!(matches!(
            frames[0].frame,
            EventFrame::IntermediateText { .. }
        ));
        assert!(matches!(
            frames[1].frame,
            EventFrame::IntermediateOutput { .. }
        ));
        assert!(matches!(frames[2].frame, EventFrame::Text { .. }));
    }

    #[tokio::test]
    async fn test_closed_receiver_cancels_token() {
        let (tx, rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let sink = FrameSink::new(tx, cancel.clone());
        drop(rx);
        sink.text("anyone there?").await;
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_terminal_latch_shared_with_intermediate_view() {
        let (sink, rx) = sink_pair(16);
        sink.intermediate().done().await;
        sink.done().await;
        let frames = drain(rx).await;
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_tool_start_lifts_sql() {
        let call = ToolCallRequest {
            id: "c1".into(),
            name: "query".into(),
            input: serde_json::json!({"sql": "SELECT region FROM sales.orders"}),
        };
        let frame = EventFrame::ToolStart {
            tool: call.name.clone(),
            args: call.input.clone(),
            sql: call.sql_text().map(str::to_string),
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "tool_start");
        assert_eq!(json["sql"], "SELECT region FROM sales.orders");
    }

    #[test]
    fn test_column_frame_wire_shape() {
        let f = ColumnFrame::new(0, EventFrame::Done);
        let json = serde_json::to_string(&f).unwrap();
        assert_eq!(json, r#"{"type":"done"}"#);

        let f = ColumnFrame::new(2, EventFrame::Text { text: "hi".into() });
        let json = serde_json::to_value(&f).unwrap();
        assert_eq!(json["column"], 2);
        assert_eq!(json["type"], "text");
        assert_eq!(json["text"], "hi");
    }

    #[test]
    fn test_chart_spec_camel_case() {
        let spec = ChartSpec {
            chart_type: "bar".into(),
            title: "Sales by region".into(),
            data: vec![serde_json::json!({"region": "EMEA", "total": 42})],
            x_key: "region".into(),
            y_key: "total".into(),
        };
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["type"], "bar");
        assert!(json.get("xKey").is_some());
        assert!(json.get("yKey").is_some());
    }
}
