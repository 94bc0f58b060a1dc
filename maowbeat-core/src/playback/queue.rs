use std::collections::VecDeque;

use maowbeat_common::models::TrackRequest;

/// FIFO backlog of requests waiting behind the current track.
///
/// Carries no locking: only the owning controller's task ever touches it.
#[derive(Debug, Default)]
pub struct TrackQueue {
    pending: VecDeque<TrackRequest>,
}

impl TrackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends and returns the 1-based position of the new entry.
    pub fn enqueue(&mut self, request: TrackRequest) -> usize {
        self.pending.push_back(request);
        self.pending.len()
    }

    pub fn advance(&mut self) -> Option<TrackRequest> {
        self.pending.pop_front()
    }

    /// Returns how many requests were discarded.
    pub fn clear(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrackRequest> {
        self.pending.iter()
    }
}
