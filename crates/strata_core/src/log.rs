//! Cursor-addressable transaction log with bounded undo/redo.
//!
//! The log is an ordered list of commits plus a cursor naming the "current"
//! commit. Rolling back and advancing only move the cursor; the entries on
//! either side stay available until a new commit abandons the redo branch:
//!
//! ```text
//! commit a..e          [a b c d e]   cursor = e
//! rollback(2)          [a b c d e]   cursor = c
//! commit f             [a b c f]     cursor = f
//! ```
//!
//! With a capacity set, committing past it evicts the oldest entries, so a
//! long rollback stops at the oldest surviving commit.

use crate::events::{Event, EventEmitter};
use crate::ids::{default_generator, CommitId, SharedIdGenerator};
use std::collections::VecDeque;
use std::fmt;
use std::time::SystemTime;
use tracing::trace;

/// Events emitted by a [`TransactionLog`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEvent {
    /// A value was committed.
    Commit(CommitId),
    /// The cursor moved backward to this commit.
    Rollback(CommitId),
    /// The cursor moved forward to this commit.
    Advance(CommitId),
    /// The log was cleared.
    Reset,
    /// Completion signal emitted after a reset, or by a funnel.
    Done,
}

impl Event for LogEvent {
    fn name(&self) -> &str {
        match self {
            LogEvent::Commit(_) => "commit",
            LogEvent::Rollback(_) => "rollback",
            LogEvent::Advance(_) => "advance",
            LogEvent::Reset => "reset",
            LogEvent::Done => "done",
        }
    }
}

/// A single log entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Commit<T> {
    /// Unique identifier of the entry.
    pub id: CommitId,
    /// Committed value.
    pub value: T,
    /// Wall-clock time of the commit.
    pub timestamp: SystemTime,
}

/// Bounded, cursor-addressable history of values.
///
/// Invariant: `cursor` is `None` exactly when the log is empty, and
/// otherwise indexes an existing entry.
pub struct TransactionLog<T> {
    entries: VecDeque<Commit<T>>,
    cursor: Option<usize>,
    max_entries: Option<usize>,
    ids: SharedIdGenerator,
    events: EventEmitter<LogEvent>,
}

impl<T> TransactionLog<T> {
    /// Creates an unbounded log.
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
            cursor: None,
            max_entries: None,
            ids: default_generator(),
            events: EventEmitter::new(),
        }
    }

    /// Creates a log that keeps at most `max_entries` commits.
    ///
    /// A capacity of zero is treated as one.
    pub fn with_max_entries(max_entries: usize) -> Self {
        let mut log = Self::new();
        log.max_entries = Some(max_entries.max(1));
        log
    }

    /// Uses `ids` for commit identifiers.
    #[must_use]
    pub fn with_id_generator(mut self, ids: SharedIdGenerator) -> Self {
        self.ids = ids;
        self
    }

    /// Appends a value and moves the cursor to it.
    ///
    /// Entries after the cursor are discarded first. If the log then holds
    /// more than its capacity, the oldest entries are evicted.
    pub fn commit(&mut self, value: T) -> CommitId {
        if let Some(cursor) = self.cursor {
            self.entries.truncate(cursor + 1);
        }

        let id = CommitId::generate(self.ids.as_ref());
        self.entries.push_back(Commit {
            id: id.clone(),
            value,
            timestamp: SystemTime::now(),
        });

        if let Some(max) = self.max_entries {
            while self.entries.len() > max {
                if let Some(evicted) = self.entries.pop_front() {
                    trace!(commit = %evicted.id, "evicted oldest log entry");
                }
            }
        }
        self.cursor = Some(self.entries.len() - 1);

        self.events.emit(LogEvent::Commit(id.clone()));
        id
    }

    /// Moves the cursor back by `n`, stopping at the oldest entry.
    ///
    /// Returns `true` if the cursor moved. `n == 0` and an empty log are
    /// no-ops.
    pub fn rollback(&mut self, n: usize) -> bool {
        let Some(cursor) = self.cursor else {
            return false;
        };
        if n == 0 {
            return false;
        }

        let target = cursor.saturating_sub(n);
        self.move_cursor(cursor, target, LogEvent::Rollback)
    }

    /// Moves the cursor forward by `n`, stopping at the newest entry.
    ///
    /// Returns `true` if the cursor moved. `n == 0` and an empty log are
    /// no-ops.
    pub fn advance(&mut self, n: usize) -> bool {
        let Some(cursor) = self.cursor else {
            return false;
        };
        if n == 0 {
            return false;
        }

        let last = self.entries.len() - 1;
        let target = cursor.saturating_add(n).min(last);
        self.move_cursor(cursor, target, LogEvent::Advance)
    }

    fn move_cursor(
        &mut self,
        from: usize,
        to: usize,
        event: impl FnOnce(CommitId) -> LogEvent,
    ) -> bool {
        if from == to {
            return false;
        }
        self.cursor = Some(to);
        let id = self.entries[to].id.clone();
        self.events.emit(event(id));
        true
    }

    /// Looks up a commit by identifier.
    pub fn get_commit(&self, id: &CommitId) -> Option<&Commit<T>> {
        self.entries.iter().find(|c| &c.id == id)
    }

    /// Discards every entry after the cursor.
    ///
    /// History before the cursor stays available for rollback.
    pub fn flush(&mut self) {
        if let Some(cursor) = self.cursor {
            self.entries.truncate(cursor + 1);
        }
    }

    /// Clears the log.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.cursor = None;
        self.events.emit(LogEvent::Reset);
        self.events.emit(LogEvent::Done);
    }

    /// Identifier of the current commit.
    pub fn cursor(&self) -> Option<&CommitId> {
        self.current().map(|c| &c.id)
    }

    /// Position of the current commit.
    pub fn cursor_index(&self) -> Option<usize> {
        self.cursor
    }

    /// The current commit.
    pub fn current(&self) -> Option<&Commit<T>> {
        self.cursor.and_then(|i| self.entries.get(i))
    }

    /// Value of the current commit.
    pub fn current_value(&self) -> Option<&T> {
        self.current().map(|c| &c.value)
    }

    /// Commit at `index`, oldest first.
    pub fn get(&self, index: usize) -> Option<&Commit<T>> {
        self.entries.get(index)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Capacity, if bounded.
    pub fn max_entries(&self) -> Option<usize> {
        self.max_entries
    }

    /// All entries, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &Commit<T>> {
        self.entries.iter()
    }

    /// Event emitter for this log.
    pub fn events(&self) -> &EventEmitter<LogEvent> {
        &self.events
    }
}

impl<T> Default for TransactionLog<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for TransactionLog<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionLog")
            .field("len", &self.entries.len())
            .field("cursor", &self.cursor)
            .field("max_entries", &self.max_entries)
            .finish_non_exhaustive()
    }
}
