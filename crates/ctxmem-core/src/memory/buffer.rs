//! Short-term buffer of recent turns.
//!
//! Bounded two ways: at most `max_messages` turns, and no turn older than
//! `window` relative to the most recent append. Both bounds are enforced
//! on every append, oldest turns first.

use std::collections::VecDeque;
use std::sync::RwLock;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::message::Message;
use super::{read_lock, write_lock};

/// Point-in-time view of the buffer's occupancy.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowInfo {
    pub message_count: usize,
    pub max_messages: usize,
    pub window: Duration,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
}

impl WindowInfo {
    /// Time between the oldest and newest retained turn.
    pub fn span(&self) -> chrono::Duration {
        match (self.oldest, self.newest) {
            (Some(oldest), Some(newest)) => newest - oldest,
            _ => chrono::Duration::zero(),
        }
    }
}

#[derive(Debug)]
struct BufferState {
    messages: VecDeque<Message>,
    updated_at: DateTime<Utc>,
}

/// Recent turns in arrival order.
#[derive(Debug)]
pub struct ShortTermBuffer {
    max_messages: usize,
    window: Duration,
    state: RwLock<BufferState>,
}

impl ShortTermBuffer {
    /// Empty buffer holding at most `max_messages` turns no older than
    /// `window`.
    pub fn new(max_messages: usize, window: Duration) -> Self {
        Self {
            max_messages,
            window,
            state: RwLock::new(BufferState {
                messages: VecDeque::new(),
                updated_at: Utc::now(),
            }),
        }
    }

    /// Append a turn, evicting by age then by count. Returns how many
    /// turns were evicted.
    pub fn append(&self, message: Message) -> usize {
        self.append_at(message, Utc::now())
    }

    /// [`append`](Self::append) with an explicit notion of "now".
    pub fn append_at(&self, message: Message, now: DateTime<Utc>) -> usize {
        let mut state = write_lock(&self.state);
        state.messages.push_back(message);
        state.updated_at = now;

        let before = state.messages.len();
        if let Some(cutoff) = self.cutoff(now) {
            while state
                .messages
                .front()
                .is_some_and(|m| m.timestamp < cutoff)
            {
                state.messages.pop_front();
            }
        }
        while state.messages.len() > self.max_messages {
            state.messages.pop_front();
        }
        before - state.messages.len()
    }

    /// The last `n` turns, oldest first. `0` returns everything.
    pub fn recent(&self, n: usize) -> Vec<Message> {
        let state = read_lock(&self.state);
        let skip = if n == 0 {
            0
        } else {
            state.messages.len().saturating_sub(n)
        };
        state.messages.iter().skip(skip).cloned().collect()
    }

    /// All retained turns, oldest first.
    pub fn messages(&self) -> Vec<Message> {
        self.recent(0)
    }

    /// Number of retained turns.
    pub fn len(&self) -> usize {
        read_lock(&self.state).messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Count bound.
    pub fn max_messages(&self) -> usize {
        self.max_messages
    }

    /// Age bound, measured back from the latest append.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Time of the last append or clear.
    pub fn updated_at(&self) -> DateTime<Utc> {
        read_lock(&self.state).updated_at
    }

    /// Overwrite the last-update time, e.g. with the value recorded in a
    /// snapshot being restored.
    pub fn set_updated_at(&self, updated_at: DateTime<Utc>) {
        write_lock(&self.state).updated_at = updated_at;
    }

    /// Drop every turn and mark the buffer as updated now.
    pub fn clear(&self) {
        let mut state = write_lock(&self.state);
        state.messages.clear();
        state.updated_at = Utc::now();
    }

    /// Occupancy and the timestamps of the oldest and newest turn.
    pub fn window_info(&self) -> WindowInfo {
        let state = read_lock(&self.state);
        WindowInfo {
            message_count: state.messages.len(),
            max_messages: self.max_messages,
            window: self.window,
            oldest: state.messages.front().map(|m| m.timestamp),
            newest: state.messages.back().map(|m| m.timestamp),
        }
    }

    // A window too large to represent disables age eviction.
    fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let window = chrono::Duration::from_std(self.window).ok()?;
        now.checked_sub_signed(window)
    }
}
