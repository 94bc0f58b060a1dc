pub mod music_command;
pub mod music_service;

pub use music_command::MusicCommand;
pub use music_service::{MusicService, RequestContext};
