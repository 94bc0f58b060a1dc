use maowbeat_common::error::Error;
use maowbeat_common::models::{
    ChannelId, CommandOutcome, GuildId, PlaybackState, ResolvedTrack, TrackRequest,
};
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::oneshot;
use uuid::Uuid;

use super::bridge::Completion;

pub type Reply = oneshot::Sender<Result<CommandOutcome, Error>>;

/// User commands, each answered exactly once over its `reply`.
#[derive(Debug)]
pub enum SessionCommand {
    Play {
        request: TrackRequest,
        channel_id: ChannelId,
        reply: Reply,
    },
    Pause { reply: Reply },
    Resume { reply: Reply },
    Skip { reply: Reply },
    Stop { reply: Reply },
    QueueStatus { reply: Reply },
    Inspect { reply: oneshot::Sender<ControllerSnapshot> },
}

/// Everything a controller's task consumes, in admission order.
#[derive(Debug)]
pub enum SessionMessage {
    Command(SessionCommand),
    Resolved(Result<ResolvedTrack, Error>),
    Completed(Completion),
    IdleExpired { ticket: u64 },
}

/// Point-in-time view of a controller, for diagnostics and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerSnapshot {
    pub session_id: Uuid,
    pub state: PlaybackState,
    pub generation: u64,
    pub queue_len: usize,
    pub now_playing: Option<String>,
    pub consecutive_failures: u32,
    pub idle_timer_armed: bool,
    /// Most recent transitions, oldest first.
    pub trace: Vec<(PlaybackState, PlaybackState)>,
}

/// Registry-side handle to a running controller.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub guild_id: GuildId,
    pub session_id: Uuid,
    pub(crate) tx: UnboundedSender<SessionMessage>,
}

impl SessionHandle {
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub async fn play(&self, request: TrackRequest, channel_id: ChannelId) -> Result<CommandOutcome, Error> {
        self.request(|reply| SessionCommand::Play { request, channel_id, reply }).await
    }

    pub async fn pause(&self) -> Result<CommandOutcome, Error> {
        self.request(|reply| SessionCommand::Pause { reply }).await
    }

    pub async fn resume(&self) -> Result<CommandOutcome, Error> {
        self.request(|reply| SessionCommand::Resume { reply }).await
    }

    pub async fn skip(&self) -> Result<CommandOutcome, Error> {
        self.request(|reply| SessionCommand::Skip { reply }).await
    }

    pub async fn stop(&self) -> Result<CommandOutcome, Error> {
        self.request(|reply| SessionCommand::Stop { reply }).await
    }

    pub async fn queue_status(&self) -> Result<CommandOutcome, Error> {
        self.request(|reply| SessionCommand::QueueStatus { reply }).await
    }

    pub async fn inspect(&self) -> Result<ControllerSnapshot, Error> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SessionMessage::Command(SessionCommand::Inspect { reply }))
            .map_err(|_| Error::SessionClosed)?;
        Ok(rx.await?)
    }

    async fn request<F>(&self, build: F) -> Result<CommandOutcome, Error>
    where
        F: FnOnce(Reply) -> SessionCommand,
    {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SessionMessage::Command(build(reply)))
            .map_err(|_| Error::SessionClosed)?;
        rx.await?
    }
}
