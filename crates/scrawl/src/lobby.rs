//! Lobby chat: the server-wide channel every joined connection hears.

use std::collections::VecDeque;

use scrawl_protocol::ChatLine;

/// Lines kept for `lobby.history`.
pub const LOBBY_HISTORY_LEN: usize = 50;

/// Bounded history of lobby chat lines, oldest first.
#[derive(Debug)]
pub struct LobbyChat {
    lines: VecDeque<ChatLine>,
    capacity: usize,
}

impl LobbyChat {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a line, evicting the oldest once full.
    pub fn push(&mut self, line: ChatLine) {
        if self.capacity == 0 {
            return;
        }
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    pub fn history(&self) -> Vec<ChatLine> {
        self.lines.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl Default for LobbyChat {
    fn default() -> Self {
        Self::new(LOBBY_HISTORY_LEN)
    }
}
