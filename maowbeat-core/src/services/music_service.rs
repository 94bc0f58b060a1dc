use std::sync::Arc;

use maowbeat_common::error::Error;
use maowbeat_common::models::{
    ChannelId, CommandOutcome, GuildId, PlaybackState, QueueStatus, TrackRequest, UserId,
};
use tracing::{debug, info};

use crate::playback::{SessionHandle, SessionRegistry};

pub const PLAY_USAGE: &str = "Please provide a song name or URL. Usage: `!play <song name or URL>`";

/// Who issued a command, and where.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestContext {
    pub guild_id: GuildId,
    pub user_id: UserId,
    /// Voice channel the requester is currently in, if any.
    pub voice_channel: Option<ChannelId>,
}

/// Command surface for music: validates the requester, then routes to the
/// guild's controller through the registry.
pub struct MusicService {
    registry: Arc<SessionRegistry>,
}

impl MusicService {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        debug!("Initializing MusicService");
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub async fn play(&self, ctx: &RequestContext, query: &str) -> Result<CommandOutcome, Error> {
        let request = TrackRequest::new(query, ctx.user_id);
        if request.query.is_empty() {
            return Err(Error::InvalidRequest(PLAY_USAGE.to_string()));
        }
        let channel_id = ctx.voice_channel.ok_or(Error::NotInVoice)?;
        info!("(Music) guild {} => play '{}' from user {}", ctx.guild_id, request.query, ctx.user_id);

        // A session can retire between lookup and send (idle timeout); the
        // registry has already dropped it by then, so one retry gets a fresh one.
        let mut retried = false;
        loop {
            let handle = self.registry.get_or_create(ctx.guild_id);
            match handle.play(request.clone(), channel_id).await {
                Err(Error::SessionClosed) if !retried => {
                    debug!("(Music) guild {} => session closed under us, retrying", ctx.guild_id);
                    retried = true;
                }
                other => return other,
            }
        }
    }

    pub async fn pause(&self, guild_id: GuildId) -> Result<CommandOutcome, Error> {
        let handle = self.existing(guild_id, "Nothing is playing!")?;
        closed_as(handle.pause().await, "Nothing is playing!")
    }

    pub async fn resume(&self, guild_id: GuildId) -> Result<CommandOutcome, Error> {
        let handle = self.existing(guild_id, "Nothing is paused!")?;
        closed_as(handle.resume().await, "Nothing is paused!")
    }

    pub async fn skip(&self, guild_id: GuildId) -> Result<CommandOutcome, Error> {
        let handle = self.existing(guild_id, "Nothing is playing!")?;
        closed_as(handle.skip().await, "Nothing is playing!")
    }

    pub async fn stop(&self, guild_id: GuildId) -> Result<CommandOutcome, Error> {
        let handle = self.existing(guild_id, "I'm not in a voice channel!")?;
        closed_as(handle.stop().await, "I'm not in a voice channel!")
    }

    pub async fn queue_status(&self, guild_id: GuildId) -> Result<CommandOutcome, Error> {
        let idle = || {
            CommandOutcome::Status(QueueStatus {
                state: PlaybackState::Idle,
                length: 0,
                now_playing: None,
                pending: Vec::new(),
            })
        };
        match self.registry.get(guild_id) {
            Some(handle) => match handle.queue_status().await {
                Err(Error::SessionClosed) => Ok(idle()),
                other => other,
            },
            None => Ok(idle()),
        }
    }

    fn existing(&self, guild_id: GuildId, msg: &str) -> Result<SessionHandle, Error> {
        self.registry
            .get(guild_id)
            .ok_or_else(|| Error::invalid_state(msg))
    }
}

/// A session that closed mid-request means there was nothing to act on.
fn closed_as(res: Result<CommandOutcome, Error>, msg: &str) -> Result<CommandOutcome, Error> {
    match res {
        Err(Error::SessionClosed) => Err(Error::invalid_state(msg)),
        other => other,
    }
}
