//! Per-session state for one exchange, including multi-model comparison.
//!
//! Each conversation column is a fully independent reducer with its own
//! state; nothing is shared between columns, and session state is an
//! explicit object injected by the caller rather than an ambient global.

use vizier_agent::frames::ColumnFrame;

use crate::reducer::{ReducedMessage, Reducer, TurnStatus};

/// Demultiplexes column-tagged frames into one reducer per column.
///
/// Works for the single-column case too: standalone exchanges simply never
/// tag a frame with a column above 0.
#[derive(Debug, Default)]
pub struct ComparisonSession {
    columns: Vec<Reducer>,
}

impl ComparisonSession {
    /// Create a session with no columns yet; columns appear as frames
    /// reference them.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session with a known number of columns up front.
    pub fn with_columns(count: usize) -> Self {
        Self {
            columns: (0..count).map(|_| Reducer::new()).collect(),
        }
    }

    fn reducer_mut(&mut self, column: usize) -> &mut Reducer {
        while self.columns.len() <= column {
            self.columns.push(Reducer::new());
        }
        &mut self.columns[column]
    }

    /// Route one frame to its column's reducer and return that column's
    /// rebuilt message.
    pub fn apply(&mut self, frame: &ColumnFrame) -> ReducedMessage {
        self.reducer_mut(frame.column).apply(&frame.frame)
    }

    /// Number of columns seen so far
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// The rebuilt message for a column, if it exists
    pub fn message(&self, column: usize) -> Option<ReducedMessage> {
        self.columns.get(column).map(|r| r.message())
    }

    /// Whether every column has reached a terminal frame
    pub fn all_settled(&self) -> bool {
        !self.columns.is_empty()
            && self
                .columns
                .iter()
                .all(|r| r.status() != TurnStatus::Streaming)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::DisplayBlock;
    use vizier_agent::frames::EventFrame;

    fn frame(column: usize, frame: EventFrame) -> ColumnFrame {
        ColumnFrame::new(column, frame)
    }

    fn text(t: &str) -> EventFrame {
        EventFrame::Text {
            text: t.to_string(),
        }
    }

    #[test]
    fn test_columns_are_independent() {
        let mut session = ComparisonSession::new();
        session.apply(&frame(0, text("from model A")));
        session.apply(&frame(1, text("from model B")));
        session.apply(&frame(0, EventFrame::Done));

        let a = session.message(0).unwrap();
        let b = session.message(1).unwrap();
        assert_eq!(a.status, TurnStatus::Done);
        assert_eq!(b.status, TurnStatus::Streaming);
        assert!(matches!(
            &a.blocks[0],
            DisplayBlock::Text { text } if text == "from model A"
        ));
        assert!(matches!(
            &b.blocks[0],
            DisplayBlock::Text { text } if text == "from model B"
        ));
    }

    #[test]
    fn test_all_settled_waits_for_every_column() {
        let mut session = ComparisonSession::with_columns(2);
        assert!(!session.all_settled());
        session.apply(&frame(0, EventFrame::Done));
        assert!(!session.all_settled());
        session.apply(&frame(1, EventFrame::Cancelled));
        assert!(session.all_settled());
    }

    #[test]
    fn test_columns_grow_on_demand() {
        let mut session = ComparisonSession::new();
        assert_eq!(session.column_count(), 0);
        session.apply(&frame(2, text("hi")));
        assert_eq!(session.column_count(), 3);
        assert!(session.message(5).is_none());
    }
}
