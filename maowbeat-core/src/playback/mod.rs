//! Playback orchestration: per-guild queue, controller, registry and the
//! completion bridge between the voice transport and the controller.

pub mod bridge;
pub mod controller;
pub mod mailbox;
pub mod queue;
pub mod registry;

pub use bridge::{Completion, CompletionBridge};
pub use controller::PlaybackController;
pub use mailbox::{ControllerSnapshot, SessionHandle};
pub use queue::TrackQueue;
pub use registry::SessionRegistry;
