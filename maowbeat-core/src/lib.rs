// src/lib.rs

pub mod adapters;
pub mod config;
pub mod eventbus;
pub mod playback;
pub mod services;
pub mod test_utils;

pub use config::MusicConfig;
pub use maowbeat_common::error::Error;
pub use playback::{SessionHandle, SessionRegistry};
pub use services::{MusicService, RequestContext};
