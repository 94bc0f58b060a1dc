// File: maowbeat-core/src/test_utils/helpers.rs
//
// Fakes for the resolver and transport seams, plus small waiting helpers.
// Shared by the unit tests and the integration tests under `tests/`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use maowbeat_common::error::Error;
use maowbeat_common::models::track::SEARCH_PREFIX;
use maowbeat_common::models::{ChannelId, GuildId, PlaybackNotice, PlaybackState, ResolvedTrack};
use maowbeat_common::traits::{CompletionCallback, TrackResolver, VoiceHandle, VoiceTransport};
use parking_lot::Mutex;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::{sleep, timeout, Instant};

use crate::config::MusicConfig;
use crate::eventbus::{EventBus, MusicEvent};
use crate::playback::{ControllerSnapshot, SessionHandle, SessionRegistry};

/// How long helpers wait for something asynchronous before giving up.
pub const WAIT: Duration = Duration::from_secs(3);

pub fn track(title: &str) -> ResolvedTrack {
    ResolvedTrack {
        title: title.to_string(),
        url: format!("sim://{title}"),
        webpage_url: Some(format!("https://example.com/{title}")),
        duration_secs: Some(60),
        thumbnail: None,
    }
}

// ----------------------------------------------------------------
// Resolver
// ----------------------------------------------------------------

/// Resolves every query to a track titled after it, unless told to fail.
///
/// When gated, each `resolve` waits for a permit released with `release`.
#[derive(Default)]
pub struct ScriptedResolver {
    failures: Mutex<HashMap<String, String>>,
    calls: Mutex<Vec<String>>,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gated() -> Self {
        Self {
            gate: Some(Arc::new(Semaphore::new(0))),
            ..Self::default()
        }
    }

    /// Make `query` (without the search prefix) fail with `reason`.
    pub fn fail(&self, query: &str, reason: &str) {
        self.failures.lock().insert(query.to_string(), reason.to_string());
    }

    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    /// Queries seen so far, search prefix stripped.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl TrackResolver for ScriptedResolver {
    async fn resolve(&self, query: &str) -> Result<ResolvedTrack, Error> {
        let name = query.strip_prefix(SEARCH_PREFIX).unwrap_or(query).to_string();
        self.calls.lock().push(name.clone());

        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|_| Error::Resolution("resolver shut down".into()))?
                .forget();
        }

        if let Some(reason) = self.failures.lock().get(&name) {
            return Err(Error::Resolution(reason.clone()));
        }
        Ok(track(&name))
    }
}

// ----------------------------------------------------------------
// Transport
// ----------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Connect(ChannelId),
    Play(String),
    Pause,
    Resume,
    Stop,
    Disconnect,
}

/// Transport whose tracks only end when the test says so.
///
/// Completions are always fired from a freshly spawned OS thread, never from
/// the caller's thread, so every test goes through the real bridge path.
#[derive(Default)]
pub struct ManualTransport {
    calls: Mutex<Vec<TransportCall>>,
    pending: Mutex<HashMap<GuildId, CompletionCallback>>,
    refuse_play: Mutex<HashSet<String>>,
    fail_connect: AtomicBool,
    next_connection: AtomicU64,
}

impl ManualTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_connects(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// `play` of a track with this title returns an error.
    pub fn refuse(&self, title: &str) {
        self.refuse_play.lock().insert(title.to_string());
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().clone()
    }

    pub fn played(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                TransportCall::Play(title) => Some(title),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, call: &TransportCall) -> usize {
        self.calls.lock().iter().filter(|c| *c == call).count()
    }

    pub fn has_pending(&self, guild_id: GuildId) -> bool {
        self.pending.lock().contains_key(&guild_id)
    }

    /// Take the pending callback without firing it, to replay it late.
    pub fn take_callback(&self, guild_id: GuildId) -> Option<CompletionCallback> {
        self.pending.lock().remove(&guild_id)
    }

    /// The current track ends naturally. Returns `false` if nothing was playing.
    pub fn finish(&self, guild_id: GuildId) -> bool {
        self.fire(guild_id, None)
    }

    /// The current track dies mid-stream.
    pub fn break_stream(&self, guild_id: GuildId, reason: &str) -> bool {
        self.fire(guild_id, Some(Error::Transport(reason.to_string())))
    }

    fn fire(&self, guild_id: GuildId, error: Option<Error>) -> bool {
        match self.take_callback(guild_id) {
            Some(cb) => {
                fire_on_thread(cb, error);
                true
            }
            None => false,
        }
    }
}

/// Invoke a completion callback from a separate OS thread and wait for it to return.
pub fn fire_on_thread(cb: CompletionCallback, error: Option<Error>) {
    std::thread::spawn(move || cb(error))
        .join()
        .expect("completion thread panicked");
}

#[async_trait]
impl VoiceTransport for ManualTransport {
    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<VoiceHandle, Error> {
        self.calls.lock().push(TransportCall::Connect(channel_id));
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(Error::Connect("missing permissions".into()));
        }
        Ok(VoiceHandle {
            guild_id,
            channel_id,
            connection_id: self.next_connection.fetch_add(1, Ordering::SeqCst),
        })
    }

    fn play(&self, handle: &VoiceHandle, track: &ResolvedTrack, on_complete: CompletionCallback) -> Result<(), Error> {
        self.calls.lock().push(TransportCall::Play(track.title.clone()));
        if self.refuse_play.lock().contains(&track.title) {
            return Err(Error::Transport("Already playing audio.".into()));
        }
        self.pending.lock().insert(handle.guild_id, on_complete);
        Ok(())
    }

    fn pause(&self, _handle: &VoiceHandle) -> Result<(), Error> {
        self.calls.lock().push(TransportCall::Pause);
        Ok(())
    }

    fn resume(&self, _handle: &VoiceHandle) -> Result<(), Error> {
        self.calls.lock().push(TransportCall::Resume);
        Ok(())
    }

    fn stop(&self, handle: &VoiceHandle) -> Result<(), Error> {
        self.calls.lock().push(TransportCall::Stop);
        if let Some(cb) = self.take_callback(handle.guild_id) {
            // Detached, like a media thread noticing the stop flag.
            std::thread::spawn(move || cb(None));
        }
        Ok(())
    }

    fn disconnect(&self, handle: &VoiceHandle) -> Result<(), Error> {
        self.calls.lock().push(TransportCall::Disconnect);
        // A real transport tears the stream down; the callback may still fire later.
        drop(self.take_callback(handle.guild_id));
        Ok(())
    }
}

// ----------------------------------------------------------------
// Wiring and waiting
// ----------------------------------------------------------------

pub fn test_config(idle: Duration) -> MusicConfig {
    MusicConfig {
        idle_timeout_ms: idle.as_millis() as u64,
        ..MusicConfig::default()
    }
}

/// Registry over the given fakes, plus a subscription to its event bus.
pub async fn setup_registry(
    resolver: Arc<dyn TrackResolver>,
    transport: Arc<dyn VoiceTransport>,
    config: MusicConfig,
) -> (Arc<SessionRegistry>, mpsc::Receiver<MusicEvent>) {
    let bus = Arc::new(EventBus::new());
    let events = bus.subscribe(Some(256)).await;
    (SessionRegistry::new(resolver, transport, bus, config), events)
}

/// Next notice on the bus, or panic after `WAIT`.
pub async fn next_notice(events: &mut mpsc::Receiver<MusicEvent>) -> PlaybackNotice {
    timeout(WAIT, events.recv())
        .await
        .expect("timed out waiting for a notice")
        .expect("event bus closed")
        .notice
}

/// Skip notices until one matches, returning it.
pub async fn wait_for_notice<F>(events: &mut mpsc::Receiver<MusicEvent>, mut pred: F) -> PlaybackNotice
where
    F: FnMut(&PlaybackNotice) -> bool,
{
    loop {
        let notice = next_notice(events).await;
        if pred(&notice) {
            return notice;
        }
    }
}

/// Poll the controller until it reports `state`.
pub async fn wait_for_state(handle: &SessionHandle, state: PlaybackState) -> ControllerSnapshot {
    let deadline = Instant::now() + WAIT;
    loop {
        let snap = handle.inspect().await.expect("session closed while waiting");
        if snap.state == state {
            return snap;
        }
        assert!(Instant::now() < deadline, "timed out waiting for {state}, still {}", snap.state);
        sleep(Duration::from_millis(5)).await;
    }
}

/// Poll the registry until the guild's entry is gone.
pub async fn wait_for_removal(registry: &SessionRegistry, guild_id: GuildId) {
    let deadline = Instant::now() + WAIT;
    while registry.get(guild_id).is_some() {
        assert!(Instant::now() < deadline, "session for {guild_id} was never removed");
        sleep(Duration::from_millis(5)).await;
    }
}

/// Every consecutive pair in the trace is a legal edge and chains onto the next.
pub fn assert_valid_trace(trace: &[(PlaybackState, PlaybackState)]) {
    for (from, to) in trace {
        assert!(from.can_transition_to(*to), "illegal transition {from} -> {to} in {trace:?}");
    }
    for pair in trace.windows(2) {
        assert_eq!(pair[0].1, pair[1].0, "broken chain in {trace:?}");
    }
}
