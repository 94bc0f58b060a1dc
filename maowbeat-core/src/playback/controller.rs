//! Per-guild playback state machine.
//!
//! Each controller runs as one tokio task that drains one mailbox. That task is
//! the guild's serialized context: user commands, resolution results, track
//! completions (via `CompletionBridge`) and idle-timer firings are all
//! messages, handled one at a time in the order they were admitted.
//!
//! Track resolution runs in a spawned task that posts its result back, so the
//! guild keeps accepting commands while `Resolving`. Voice connect is awaited
//! inline; it only holds up this guild's mailbox.

use std::collections::VecDeque;
use std::sync::Arc;

use maowbeat_common::error::Error;
use maowbeat_common::models::{
    ChannelId, CommandOutcome, GuildId, PlaybackNotice, PlaybackState, QueueStatus, ResolvedTrack,
    TrackRequest,
};
use maowbeat_common::traits::VoiceHandle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use super::bridge::{Completion, CompletionBridge};
use super::mailbox::{ControllerSnapshot, Reply, SessionCommand, SessionHandle, SessionMessage};
use super::queue::TrackQueue;
use super::registry::SessionRegistry;

pub struct PlaybackController {
    guild_id: GuildId,
    session_id: Uuid,
    state: PlaybackState,
    queue: TrackQueue,
    current: Option<ResolvedTrack>,
    voice: Option<VoiceHandle>,
    /// Bumped every time a track starts; completions tagged with an older value are stale.
    generation: u64,
    /// Bumped on every arm/cancel of the idle timer.
    idle_ticket: u64,
    idle_timer: Option<JoinHandle<()>>,
    consecutive_failures: u32,
    trace: VecDeque<(PlaybackState, PlaybackState)>,
    tx: UnboundedSender<SessionMessage>,
    bridge: CompletionBridge,
    registry: Arc<SessionRegistry>,
}

impl PlaybackController {
    /// Spawns the controller task and returns the handle the registry stores.
    pub(crate) fn spawn(guild_id: GuildId, registry: Arc<SessionRegistry>) -> SessionHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let session_id = Uuid::new_v4();
        let controller = Self::new(guild_id, session_id, tx.clone(), registry);
        tokio::spawn(controller.run(rx));
        SessionHandle {
            guild_id,
            session_id,
            tx,
        }
    }

    fn new(
        guild_id: GuildId,
        session_id: Uuid,
        tx: UnboundedSender<SessionMessage>,
        registry: Arc<SessionRegistry>,
    ) -> Self {
        Self {
            guild_id,
            session_id,
            state: PlaybackState::Idle,
            queue: TrackQueue::new(),
            current: None,
            voice: None,
            generation: 0,
            idle_ticket: 0,
            idle_timer: None,
            consecutive_failures: 0,
            trace: VecDeque::new(),
            bridge: CompletionBridge::new(guild_id, tx.clone()),
            tx,
            registry,
        }
    }

    async fn run(mut self, mut rx: UnboundedReceiver<SessionMessage>) {
        debug!("(Music) guild {} => controller {} started", self.guild_id, self.session_id);

        while let Some(msg) = rx.recv().await {
            self.handle(msg).await;
            // A controller with no voice session and nothing in flight has no reason to exist.
            if matches!(self.state, PlaybackState::Idle | PlaybackState::Terminated) {
                break;
            }
        }

        self.registry.remove(self.guild_id, self.session_id);
        rx.close();
        let mut orphaned = 0usize;
        while rx.recv().await.is_some() {
            orphaned += 1;
        }
        if orphaned > 0 {
            debug!("(Music) guild {} => dropped {} message(s) after teardown", self.guild_id, orphaned);
        }
        info!("(Music) guild {} => controller {} finished", self.guild_id, self.session_id);
    }

    async fn handle(&mut self, msg: SessionMessage) {
        match msg {
            SessionMessage::Command(cmd) => self.handle_command(cmd).await,
            SessionMessage::Resolved(result) => self.on_resolved(result).await,
            SessionMessage::Completed(completion) => self.on_completed(completion).await,
            SessionMessage::IdleExpired { ticket } => self.on_idle_expired(ticket).await,
        }
    }

    async fn handle_command(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::Play { request, channel_id, reply } => {
                let res = self.play(request, channel_id).await;
                respond(reply, res);
            }
            SessionCommand::Pause { reply } => {
                let res = self.pause().await;
                respond(reply, res);
            }
            SessionCommand::Resume { reply } => {
                let res = self.resume().await;
                respond(reply, res);
            }
            SessionCommand::Skip { reply } => {
                let res = self.skip().await;
                respond(reply, res);
            }
            SessionCommand::Stop { reply } => {
                self.registry.event_bus.notify(self.guild_id, PlaybackNotice::Stopped).await;
                self.terminate("stop command");
                respond(reply, Ok(CommandOutcome::Stopped));
            }
            SessionCommand::QueueStatus { reply } => {
                respond(reply, Ok(CommandOutcome::Status(self.status())));
            }
            SessionCommand::Inspect { reply } => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    // ----------------------------------------------------------------
    // Commands
    // ----------------------------------------------------------------

    async fn play(&mut self, request: TrackRequest, channel_id: ChannelId) -> Result<CommandOutcome, Error> {
        if let Some(voice) = &self.voice {
            if voice.channel_id != channel_id {
                return Err(Error::DifferentChannel);
            }
        }

        match self.state {
            PlaybackState::Idle => {
                if self.voice.is_none() {
                    let handle = self
                        .registry
                        .transport
                        .connect(self.guild_id, channel_id)
                        .await
                        .map_err(|e| {
                            warn!("(Music) guild {} => connect to {} failed: {}", self.guild_id, channel_id, e);
                            match e {
                                Error::Connect(_) => e,
                                other => Error::Connect(other.to_string()),
                            }
                        })?;
                    info!("(Music) guild {} => joined voice channel {}", self.guild_id, channel_id);
                    self.voice = Some(handle);
                }
                self.begin_resolve(request);
                Ok(CommandOutcome::Started)
            }
            PlaybackState::Draining => {
                self.cancel_idle_timer();
                self.begin_resolve(request);
                Ok(CommandOutcome::Started)
            }
            PlaybackState::Resolving
            | PlaybackState::Playing
            | PlaybackState::Paused
            | PlaybackState::Advancing => {
                let query = request.query.clone();
                let position = self.queue.enqueue(request);
                debug!("(Music) guild {} => queued '{}' at {}", self.guild_id, query, position);
                self.registry
                    .event_bus
                    .notify(self.guild_id, PlaybackNotice::Queued { query, position })
                    .await;
                Ok(CommandOutcome::Queued { position })
            }
            PlaybackState::Terminated => Err(Error::SessionClosed),
        }
    }

    async fn pause(&mut self) -> Result<CommandOutcome, Error> {
        if self.state != PlaybackState::Playing {
            return Err(Error::invalid_state("Nothing is playing!"));
        }
        let voice = self.voice_handle()?;
        self.registry.transport.pause(&voice)?;
        self.transition(PlaybackState::Paused);
        self.registry.event_bus.notify(self.guild_id, PlaybackNotice::Paused).await;
        Ok(CommandOutcome::Paused)
    }

    async fn resume(&mut self) -> Result<CommandOutcome, Error> {
        if self.state != PlaybackState::Paused {
            return Err(Error::invalid_state("Nothing is paused!"));
        }
        let voice = self.voice_handle()?;
        self.registry.transport.resume(&voice)?;
        self.transition(PlaybackState::Playing);
        self.registry.event_bus.notify(self.guild_id, PlaybackNotice::Resumed).await;
        Ok(CommandOutcome::Resumed)
    }

    /// While playing, stops the transport and lets the resulting completion
    /// drive the advance. While draining, skips the idle wait and leaves now.
    async fn skip(&mut self) -> Result<CommandOutcome, Error> {
        match self.state {
            PlaybackState::Playing => {
                let voice = self.voice_handle()?;
                self.registry.transport.stop(&voice)?;
            }
            PlaybackState::Draining => self.terminate("skip while idle"),
            _ => return Err(Error::invalid_state("Nothing is playing!")),
        }
        self.registry.event_bus.notify(self.guild_id, PlaybackNotice::Skipped).await;
        Ok(CommandOutcome::Skipped)
    }

    // ----------------------------------------------------------------
    // Async results
    // ----------------------------------------------------------------

    /// At most one resolution is in flight, and only while `Resolving`.
    async fn on_resolved(&mut self, result: Result<ResolvedTrack, Error>) {
        if self.state != PlaybackState::Resolving {
            debug!("(Music) guild {} => discarding resolution in state {}", self.guild_id, self.state);
            return;
        }

        let track = match result {
            Ok(track) => track,
            Err(e) => {
                warn!("(Music) guild {} => resolution failed: {}", self.guild_id, e);
                self.fail_candidate(e).await;
                return;
            }
        };

        if let Err(e) = self.start_playback(&track) {
            warn!("(Music) guild {} => transport refused '{}': {}", self.guild_id, track.title, e);
            self.fail_candidate(e).await;
            return;
        }

        info!("(Music) guild {} => now playing '{}' (gen {})", self.guild_id, track.title, self.generation);
        self.consecutive_failures = 0;
        self.current = Some(track.clone());
        self.transition(PlaybackState::Playing);
        self.registry.event_bus.notify(self.guild_id, PlaybackNotice::NowPlaying(track)).await;
    }

    async fn on_completed(&mut self, completion: Completion) {
        if completion.generation != self.generation || !self.state.has_active_track() {
            let stale = Error::StaleCallback {
                received: completion.generation,
                current: self.generation,
            };
            debug!("(Music) guild {} => ignoring completion in state {}: {}", self.guild_id, self.state, stale);
            return;
        }

        let finished = self.current.take();
        trace!(
            "(Music) guild {} => '{}' ended",
            self.guild_id,
            finished.as_ref().map(|t| t.title.as_str()).unwrap_or("?")
        );
        if let Some(err) = completion.error {
            warn!("(Music) guild {} => playback error: {}", self.guild_id, err);
            self.registry
                .event_bus
                .notify(self.guild_id, PlaybackNotice::Failed { reason: err.to_string() })
                .await;
        }

        self.transition(PlaybackState::Advancing);
        self.advance();
    }

    async fn on_idle_expired(&mut self, ticket: u64) {
        if ticket != self.idle_ticket || self.state != PlaybackState::Draining {
            debug!("(Music) guild {} => ignoring superseded idle timer", self.guild_id);
            return;
        }
        self.idle_timer = None;
        info!("(Music) guild {} => idle timeout, disconnecting", self.guild_id);
        self.terminate("idle timeout");
        self.registry
            .event_bus
            .notify(self.guild_id, PlaybackNotice::DisconnectedIdle)
            .await;
    }

    // ----------------------------------------------------------------
    // Transitions
    // ----------------------------------------------------------------

    fn begin_resolve(&mut self, request: TrackRequest) {
        self.transition(PlaybackState::Resolving);
        let resolver = Arc::clone(&self.registry.resolver);
        let tx = self.tx.clone();
        let query = request.resolver_query();
        debug!("(Music) guild {} => resolving '{}'", self.guild_id, query);

        tokio::spawn(async move {
            let result = resolver.resolve(&query).await.map_err(|e| match e {
                Error::Resolution(_) => e,
                other => Error::Resolution(other.to_string()),
            });
            let _ = tx.send(SessionMessage::Resolved(result));
        });
    }

    fn start_playback(&mut self, track: &ResolvedTrack) -> Result<(), Error> {
        let voice = self.voice_handle()?;
        self.generation += 1;
        let callback = self.bridge.callback(self.generation);
        self.registry.transport.play(&voice, track, callback)
    }

    /// The current candidate could not be played: report, count, move on.
    async fn fail_candidate(&mut self, err: Error) {
        self.consecutive_failures += 1;
        self.registry
            .event_bus
            .notify(self.guild_id, PlaybackNotice::Failed { reason: err.to_string() })
            .await;
        self.transition(PlaybackState::Advancing);

        let limit = self.registry.config.max_consecutive_failures;
        if self.consecutive_failures >= limit {
            let dropped = self.queue.clear();
            warn!(
                "(Music) guild {} => {} failures in a row, dropping {} queued request(s)",
                self.guild_id, self.consecutive_failures, dropped
            );
            self.registry
                .event_bus
                .notify(
                    self.guild_id,
                    PlaybackNotice::GaveUp { failures: self.consecutive_failures, dropped },
                )
                .await;
            self.consecutive_failures = 0;
            self.start_draining();
        } else {
            self.advance();
        }
    }

    /// From `Advancing`: next queued request, or start the idle countdown.
    fn advance(&mut self) {
        match self.queue.advance() {
            Some(next) => self.begin_resolve(next),
            None => self.start_draining(),
        }
    }

    fn start_draining(&mut self) {
        self.transition(PlaybackState::Draining);
        self.current = None;
        self.idle_ticket += 1;
        let ticket = self.idle_ticket;
        let timeout = self.registry.config.idle_timeout();
        let tx = self.tx.clone();
        debug!("(Music) guild {} => queue empty, idle timer {:?}", self.guild_id, timeout);

        self.idle_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = tx.send(SessionMessage::IdleExpired { ticket });
        }));
    }

    fn cancel_idle_timer(&mut self) {
        if let Some(timer) = self.idle_timer.take() {
            timer.abort();
            // A firing already sitting in the mailbox now carries a stale ticket.
            self.idle_ticket += 1;
            trace!("(Music) guild {} => idle timer cancelled", self.guild_id);
        }
    }

    /// Clear, disconnect, cancel. The run loop deregisters afterwards.
    fn terminate(&mut self, reason: &str) {
        if self.state == PlaybackState::Terminated {
            return;
        }
        self.cancel_idle_timer();
        let dropped = self.queue.clear();
        self.current = None;
        // Late completions must not match anything any more.
        self.generation += 1;
        if let Some(voice) = self.voice.take() {
            if let Err(e) = self.registry.transport.disconnect(&voice) {
                error!("(Music) guild {} => disconnect failed: {}", self.guild_id, e);
            }
        }
        info!("(Music) guild {} => terminated ({}), {} queued request(s) dropped", self.guild_id, reason, dropped);
        self.transition(PlaybackState::Terminated);
    }

    fn transition(&mut self, next: PlaybackState) {
        let prev = self.state;
        if !prev.can_transition_to(next) {
            error!("(Music) guild {} => illegal transition {} -> {}", self.guild_id, prev, next);
            debug_assert!(false, "illegal transition {prev} -> {next}");
        }
        trace!("(Music) guild {} => {} -> {}", self.guild_id, prev, next);
        self.state = next;
        if self.trace.len() == self.registry.config.trace_capacity.max(1) {
            self.trace.pop_front();
        }
        self.trace.push_back((prev, next));
    }

    // ----------------------------------------------------------------
    // Helpers
    // ----------------------------------------------------------------

    fn voice_handle(&self) -> Result<VoiceHandle, Error> {
        self.voice
            .clone()
            .ok_or_else(|| Error::Transport("not connected to a voice channel".into()))
    }

    fn status(&self) -> QueueStatus {
        QueueStatus {
            state: self.state,
            length: self.queue.len(),
            now_playing: self.current.as_ref().map(|t| t.title.clone()),
            pending: self.queue.iter().map(|r| r.query.clone()).collect(),
        }
    }

    fn snapshot(&self) -> ControllerSnapshot {
        ControllerSnapshot {
            session_id: self.session_id,
            state: self.state,
            generation: self.generation,
            queue_len: self.queue.len(),
            now_playing: self.current.as_ref().map(|t| t.title.clone()),
            consecutive_failures: self.consecutive_failures,
            idle_timer_armed: self.idle_timer.is_some(),
            trace: self.trace.iter().copied().collect(),
        }
    }
}

fn respond(reply: Reply, res: Result<CommandOutcome, Error>) {
    if let Err(e) = &res {
        debug!("(Music) command rejected: {}", e);
    }
    // Caller may have given up waiting.
    let _ = reply.send(res);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::helpers::*;
    use std::time::Duration;
    use twilight_model::id::Id;

    const GUILD: GuildId = Id::new(11);
    const CHANNEL: ChannelId = Id::new(12);

    fn req(q: &str) -> TrackRequest {
        TrackRequest::new(q, Id::new(13))
    }

    fn inject(handle: &SessionHandle, generation: u64) {
        handle
            .tx
            .send(SessionMessage::Completed(Completion {
                guild_id: GUILD,
                generation,
                error: None,
            }))
            .unwrap();
    }

    #[tokio::test]
    async fn stale_completion_changes_nothing() {
        let transport = Arc::new(ManualTransport::new());
        let (registry, mut events) = setup_registry(
            Arc::new(ScriptedResolver::new()),
            transport.clone(),
            test_config(Duration::from_secs(30)),
        )
        .await;
        let session = registry.get_or_create(GUILD);

        session.play(req("first"), CHANNEL).await.unwrap();
        wait_for_notice(&mut events, |n| matches!(n, PlaybackNotice::NowPlaying(_))).await;
        session.play(req("second"), CHANNEL).await.unwrap();
        assert!(transport.finish(GUILD));
        wait_for_notice(&mut events, |n| matches!(n, PlaybackNotice::NowPlaying(_))).await;

        let before = session.inspect().await.unwrap();
        assert_eq!(before.generation, 2);
        inject(&session, 1);
        let after = session.inspect().await.unwrap();

        assert_eq!(after, before);
        assert_eq!(after.state, PlaybackState::Playing);
        assert_eq!(after.now_playing.as_deref(), Some("second"));
        assert_eq!(transport.played(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn completion_while_draining_is_ignored() {
        let transport = Arc::new(ManualTransport::new());
        let (registry, mut events) = setup_registry(
            Arc::new(ScriptedResolver::new()),
            transport.clone(),
            test_config(Duration::from_secs(30)),
        )
        .await;
        let session = registry.get_or_create(GUILD);

        session.play(req("only"), CHANNEL).await.unwrap();
        wait_for_notice(&mut events, |n| matches!(n, PlaybackNotice::NowPlaying(_))).await;
        assert!(transport.finish(GUILD));
        let before = wait_for_state(&session, PlaybackState::Draining).await;

        // Even the current generation is stale once nothing is playing.
        inject(&session, before.generation);
        let after = session.inspect().await.unwrap();
        assert_eq!(after, before);
        assert!(after.idle_timer_armed);
    }

    #[tokio::test]
    async fn trace_is_bounded_and_legal() {
        let transport = Arc::new(ManualTransport::new());
        let config = crate::config::MusicConfig {
            trace_capacity: 4,
            ..test_config(Duration::from_secs(30))
        };
        let (registry, mut events) =
            setup_registry(Arc::new(ScriptedResolver::new()), transport.clone(), config).await;
        let session = registry.get_or_create(GUILD);

        for q in ["a", "b", "c"] {
            session.play(req(q), CHANNEL).await.unwrap();
        }
        for _ in 0..3 {
            wait_for_notice(&mut events, |n| matches!(n, PlaybackNotice::NowPlaying(_))).await;
            assert!(transport.finish(GUILD));
        }
        let snap = wait_for_state(&session, PlaybackState::Draining).await;
        assert_eq!(snap.trace.len(), 4);
        assert_eq!(snap.trace.last(), Some(&(PlaybackState::Advancing, PlaybackState::Draining)));
        assert_valid_trace(&snap.trace);
    }
}
