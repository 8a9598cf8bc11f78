// Copyright 2026 The Refract Project
// SPDX-License-Identifier: Apache-2.0

use std::collections::VecDeque;

/// How many trailing payloads the summary frame covers.
pub const RECENT_EVENT_CAPACITY: usize = 3;

/// Bounded FIFO of the most recent `data:` payloads.
///
/// Owned by one relay session; never shared or persisted. Pushing past
/// capacity evicts the oldest entry.
#[derive(Debug, Default)]
pub struct RecentEvents {
    events: VecDeque<String>,
}

impl RecentEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, payload: String) {
        if self.events.len() == RECENT_EVENT_CAPACITY {
            self.events.pop_front();
        }
        self.events.push_back(payload);
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Oldest-first view of the retained payloads.
    pub fn snapshot(&self) -> Vec<String> {
        self.events.iter().cloned().collect()
    }
}
