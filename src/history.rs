//! Branchable board history with an undo/redo cursor.

use crate::games::reversi::Board;
use derive_new::new;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// One recorded position: the board and the turn number it was reached on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, new)]
pub struct HistoryEntry {
    /// Board after the move (and any forced pass).
    pub board: Board,
    /// Turn counter at this point.
    pub turn: u32,
}

/// Ordered log of positions navigable by a cursor.
///
/// Invariant: `cursor < entries.len()` and `entries` is never empty.
/// Entries before the cursor are reachable by undo, entries after it by
/// redo until a divergent position is recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryTimeline {
    entries: Vec<HistoryEntry>,
    cursor: usize,
}

impl HistoryTimeline {
    /// Creates a timeline holding only the starting position at turn 0.
    pub fn new(initial: Board) -> Self {
        Self {
            entries: vec![HistoryEntry::new(initial, 0)],
            cursor: 0,
        }
    }

    /// Entry under the cursor.
    pub fn current(&self) -> HistoryEntry {
        self.entries[self.cursor]
    }

    /// Number of recorded entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false; a timeline holds at least its starting position.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cursor index.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// All entries in move order.
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// Records a position reached from the current one.
    ///
    /// Replaying the board already waiting in the redo branch just moves the
    /// cursor onto it. Any other board truncates the redo branch first.
    #[instrument(skip(self, board), fields(cursor = self.cursor, len = self.entries.len()))]
    pub fn record(&mut self, board: Board, turn: u32) {
        let next = self.cursor + 1;
        if next < self.entries.len() {
            if self.entries[next].board == board {
                debug!("Replayed redo branch, advancing cursor");
                self.cursor = next;
                return;
            }
            debug!(discarded = self.entries.len() - next, "Abandoning redo branch");
            self.entries.truncate(next);
        }
        self.entries.push(HistoryEntry::new(board, turn));
        self.cursor = next;
    }

    /// Steps back one entry. No-op at the start.
    pub fn undo(&mut self) {
        if self.can_undo() {
            self.cursor -= 1;
        }
    }

    /// Steps forward one entry. No-op at the end.
    pub fn redo(&mut self) {
        if self.can_redo() {
            self.cursor += 1;
        }
    }

    /// True if an earlier entry exists.
    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    /// True if a later entry exists.
    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.entries.len()
    }

    /// Drops everything and starts again from `initial` at turn 0.
    pub fn reset(&mut self, initial: Board) {
        self.entries.clear();
        self.entries.push(HistoryEntry::new(initial, 0));
        self.cursor = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board(n: u64) -> Board {
        Board::from_masks(n, 0)
    }

    #[test]
    fn test_append_at_tip() {
        let mut timeline = HistoryTimeline::new(board(1));
        timeline.record(board(2), 1);
        timeline.record(board(3), 2);
        assert_eq!(timeline.len(), 3);
        assert_eq!(timeline.cursor(), 2);
        assert_eq!(timeline.current(), HistoryEntry::new(board(3), 2));
    }

    #[test]
    fn test_boundaries_are_noops() {
        let mut timeline = HistoryTimeline::new(board(1));
        timeline.undo();
        timeline.redo();
        assert_eq!(timeline.cursor(), 0);
        assert!(!timeline.can_undo());
        assert!(!timeline.can_redo());
    }
}
