use std::fmt;

use serde::{Deserialize, Serialize};

use super::track::ResolvedTrack;

/// Lifecycle of one guild's playback controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlaybackState {
    Idle,
    Resolving,
    Playing,
    Paused,
    Advancing,
    Draining,
    Terminated,
}

impl PlaybackState {
    /// Whether `self -> next` is an edge of the controller's state machine.
    ///
    /// `Terminated` is reachable from anywhere (explicit stop). Nothing leaves it.
    pub fn can_transition_to(self, next: PlaybackState) -> bool {
        use PlaybackState::*;
        match (self, next) {
            (Terminated, _) => false,
            (_, Terminated) => true,
            (Idle, Resolving) => true,
            (Resolving, Playing) | (Resolving, Advancing) => true,
            (Playing, Paused) | (Paused, Playing) => true,
            (Playing, Advancing) => true,
            // The transport may end a paused track on its own (stream error, forced disconnect).
            (Paused, Advancing) => true,
            (Advancing, Resolving) | (Advancing, Draining) => true,
            (Draining, Resolving) => true,
            _ => false,
        }
    }

    /// A track is loaded into the transport (possibly paused).
    pub fn has_active_track(self) -> bool {
        matches!(self, PlaybackState::Playing | PlaybackState::Paused)
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PlaybackState::Idle => "idle",
            PlaybackState::Resolving => "resolving",
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
            PlaybackState::Advancing => "advancing",
            PlaybackState::Draining => "draining",
            PlaybackState::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// Snapshot returned by the queue command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatus {
    pub state: PlaybackState,
    pub length: usize,
    pub now_playing: Option<String>,
    pub pending: Vec<String>,
}

/// Successful reply to a music command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The request became the current candidate and is being resolved.
    Started,
    Queued { position: usize },
    Paused,
    Resumed,
    Skipped,
    Stopped,
    Status(QueueStatus),
}

/// Structured notification for whatever renders user-visible output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackNotice {
    NowPlaying(ResolvedTrack),
    Queued { query: String, position: usize },
    Paused,
    Resumed,
    Skipped,
    Stopped,
    DisconnectedIdle,
    Failed { reason: String },
    /// Too many consecutive failures; the rest of the queue was dropped.
    GaveUp { failures: u32, dropped: usize },
}

#[cfg(test)]
mod tests {
    use super::PlaybackState::*;

    #[test]
    fn state_machine_edges() {
        assert!(Idle.can_transition_to(Resolving));
        assert!(Draining.can_transition_to(Resolving));
        assert!(Paused.can_transition_to(Terminated));
        assert!(!Idle.can_transition_to(Playing));
        assert!(!Draining.can_transition_to(Playing));
        assert!(!Paused.can_transition_to(Draining));
        assert!(!Playing.can_transition_to(Resolving));
        assert!(!Terminated.can_transition_to(Idle));
    }
}
