pub mod music_traits;

pub use music_traits::{CompletionCallback, TrackResolver, VoiceHandle, VoiceTransport};
