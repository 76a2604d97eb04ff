//! Turn registry — per-session ring buffer of metadata-bearing turn records.
//!
//! Replaces the single-slot `latest_turn: Option<Vec<u8>>` per session
//! with a bounded ring buffer of [`TurnRecord`] entries carrying stable
//! turn IDs and metadata.

use std::collections::VecDeque;

/// A single completed turn stored in the ring buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnRecord {
    /// Stable turn identifier: `<session_id>:<seq>`.
    pub turn_id: String,
    /// Raw turn content (bytes, no interpretation).
    pub content: Vec<u8>,
    /// Unix epoch milliseconds when the turn was stored.
    pub timestamp: u64,
    /// Length of the original content in bytes (before truncation).
    pub byte_length: u32,
    /// Whether the turn was interrupted (signal-terminated).
    pub interrupted: bool,
    /// Whether the content was truncated to fit `max_turn_bytes`.
    pub truncated: bool,
}

/// Per-session ring buffer of completed turns.
///
/// Backed by a `VecDeque` with newest turns at the front.
/// When capacity is reached, the oldest turn is silently evicted.
#[derive(Debug)]
pub struct TurnRingBuffer {
    entries: VecDeque<TurnRecord>,
    capacity: usize,
    max_turn_bytes: usize,
    next_seq: u64,
    session_id: String,
}

impl TurnRingBuffer {
    /// Create a new ring buffer for the given session.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0. The ring buffer must hold at least one turn.
    pub fn new(session_id: String, capacity: usize, max_turn_bytes: usize) -> Self {
        assert!(capacity >= 1, "ring buffer capacity must be >= 1");
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            max_turn_bytes,
            next_seq: 1,
            session_id,
        }
    }

    /// Push a new turn into the ring buffer.
    ///
    /// Assigns a monotonically increasing turn ID, truncates content
    /// if it exceeds `max_turn_bytes`, and evicts the oldest turn if
    /// the buffer is at capacity.
    ///
    /// `timestamp` is the detection-time Unix epoch millis, set by the
    /// wrapper when the turn was completed.
    ///
    /// Returns a reference to the newly inserted record.
    pub fn push(&mut self, mut content: Vec<u8>, interrupted: bool, timestamp: u64) -> &TurnRecord {
        let turn_id = format!("{}:{}", self.session_id, self.next_seq);
        self.next_seq += 1;

        let byte_length = content.len() as u32;
        let truncated = content.len() > self.max_turn_bytes;
        if truncated {
            content.truncate(self.max_turn_bytes);
        }

        let record = TurnRecord {
            turn_id,
            content,
            timestamp,
            byte_length,
            interrupted,
            truncated,
        };

        if self.entries.len() == self.capacity {
            self.entries.pop_back();
        }

        self.entries.push_front(record);
        &self.entries[0]
    }

    /// Get the most recent turn (ring head), or `None` if empty.
    pub fn head(&self) -> Option<&TurnRecord> {
        self.entries.front()
    }

    /// Look up a turn by its ID. Linear scan (capacity is small).
    #[allow(dead_code)]
    pub fn get(&self, turn_id: &str) -> Option<&TurnRecord> {
        self.entries.iter().find(|r| r.turn_id == turn_id)
    }

    /// Iterate turns newest-first, with an optional limit.
    #[allow(dead_code)]
    pub fn iter_newest_first(&self, limit: Option<usize>) -> impl Iterator<Item = &TurnRecord> {
        self.entries.iter().take(limit.unwrap_or(usize::MAX))
    }

    /// Number of turns currently stored.
    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the ring buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Force the truncated flag on the most recently pushed turn.
    ///
    /// Used when truncation happened upstream of this ring (the turn
    /// detector's own memory cap) before `push`'s `max_turn_bytes`
    /// check ran. No-op if the ring is empty.
    pub fn mark_head_truncated(&mut self) {
        if let Some(head) = self.entries.front_mut() {
            head.truncated = true;
        }
    }
}
