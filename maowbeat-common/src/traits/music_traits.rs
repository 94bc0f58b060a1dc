use async_trait::async_trait;

use crate::error::Error;
use crate::models::{ChannelId, GuildId, ResolvedTrack};

/// Fired exactly once per `VoiceTransport::play`, from the transport's own thread.
/// `None` means the track ended normally (or was stopped).
pub type CompletionCallback = Box<dyn FnOnce(Option<Error>) + Send + 'static>;

/// Turns a query or URL into something the voice transport can stream.
#[async_trait]
pub trait TrackResolver: Send + Sync {
    /// Fails with `Error::Resolution` on bad queries or unreachable sources.
    async fn resolve(&self, query: &str) -> Result<ResolvedTrack, Error>;
}

/// Identifies one live voice connection held by a transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VoiceHandle {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub connection_id: u64,
}

/// Voice connection and playback primitives.
///
/// Only `connect` touches the network from the caller's point of view; the
/// control operations return as soon as the transport has accepted them.
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    /// Fails with `Error::Connect`.
    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<VoiceHandle, Error>;

    fn play(
        &self,
        handle: &VoiceHandle,
        track: &ResolvedTrack,
        on_complete: CompletionCallback,
    ) -> Result<(), Error>;

    fn pause(&self, handle: &VoiceHandle) -> Result<(), Error>;

    fn resume(&self, handle: &VoiceHandle) -> Result<(), Error>;

    /// Must make the pending completion fire with `None`.
    fn stop(&self, handle: &VoiceHandle) -> Result<(), Error>;

    fn disconnect(&self, handle: &VoiceHandle) -> Result<(), Error>;
}
