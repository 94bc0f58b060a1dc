//! A `VoiceTransport` that pretends to stream.
//!
//! Every `play` starts an OS thread that sleeps for the track's duration
//! (scaled by `speed`) and then fires the completion callback from that
//! thread, exactly like a real media thread would. Pause/resume/stop reach the
//! thread over a crossbeam channel.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use maowbeat_common::error::Error;
use maowbeat_common::models::{ChannelId, GuildId, ResolvedTrack};
use maowbeat_common::traits::{CompletionCallback, VoiceHandle, VoiceTransport};
use parking_lot::Mutex;
use tracing::{debug, trace};

/// Used when the resolver could not tell how long a track is.
pub const DEFAULT_TRACK_LENGTH: Duration = Duration::from_secs(180);

#[derive(Debug, Clone, Copy)]
enum Control {
    Pause,
    Resume,
    Stop,
}

pub struct SimulatedTransport {
    next_connection: AtomicU64,
    connected: Mutex<HashSet<u64>>,
    players: Arc<Mutex<HashMap<u64, Sender<Control>>>>,
    /// 1.0 is real time, 60.0 plays a minute per second.
    speed: f64,
}

impl SimulatedTransport {
    pub fn new(speed: f64) -> Self {
        Self {
            next_connection: AtomicU64::new(1),
            connected: Mutex::new(HashSet::new()),
            players: Arc::new(Mutex::new(HashMap::new())),
            speed: if speed > 0.0 { speed } else { 1.0 },
        }
    }

    pub fn is_connected(&self, handle: &VoiceHandle) -> bool {
        self.connected.lock().contains(&handle.connection_id)
    }

    fn control(&self, handle: &VoiceHandle, msg: Control) -> Result<(), Error> {
        let players = self.players.lock();
        let tx = players
            .get(&handle.connection_id)
            .ok_or_else(|| Error::Transport("nothing is playing on this connection".into()))?;
        // The thread may have just finished on its own; that is not an error.
        let _ = tx.send(msg);
        Ok(())
    }

    fn track_length(&self, track: &ResolvedTrack) -> Duration {
        let base = track
            .duration_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TRACK_LENGTH);
        base.div_f64(self.speed)
    }
}

#[async_trait]
impl VoiceTransport for SimulatedTransport {
    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<VoiceHandle, Error> {
        let connection_id = self.next_connection.fetch_add(1, Ordering::Relaxed);
        self.connected.lock().insert(connection_id);
        debug!("(SimVoice) guild {} => connected to {} (conn {})", guild_id, channel_id, connection_id);
        Ok(VoiceHandle {
            guild_id,
            channel_id,
            connection_id,
        })
    }

    fn play(
        &self,
        handle: &VoiceHandle,
        track: &ResolvedTrack,
        on_complete: CompletionCallback,
    ) -> Result<(), Error> {
        if !self.is_connected(handle) {
            return Err(Error::Transport("not connected to voice".into()));
        }
        let (tx, rx) = crossbeam_channel::unbounded();
        let length = self.track_length(track);
        let connection_id = handle.connection_id;
        let players = Arc::clone(&self.players);

        if let Some(previous) = players.lock().insert(connection_id, tx.clone()) {
            let _ = previous.send(Control::Stop);
        }

        let title = track.title.clone();
        std::thread::Builder::new()
            .name(format!("sim-voice-{connection_id}"))
            .spawn(move || {
                run_player(&rx, length);
                trace!("(SimVoice) conn {} => '{}' ended", connection_id, title);
                let mut players = players.lock();
                if players.get(&connection_id).is_some_and(|cur| cur.same_channel(&tx)) {
                    players.remove(&connection_id);
                }
                drop(players);
                on_complete(None);
            })
            .map_err(|e| Error::Transport(format!("could not start player thread: {e}")))?;
        Ok(())
    }

    fn pause(&self, handle: &VoiceHandle) -> Result<(), Error> {
        self.control(handle, Control::Pause)
    }

    fn resume(&self, handle: &VoiceHandle) -> Result<(), Error> {
        self.control(handle, Control::Resume)
    }

    /// A track that already ended has its completion in flight; nothing to stop.
    fn stop(&self, handle: &VoiceHandle) -> Result<(), Error> {
        if let Some(tx) = self.players.lock().get(&handle.connection_id) {
            let _ = tx.send(Control::Stop);
        } else {
            trace!("(SimVoice) conn {} => stop with no player running", handle.connection_id);
        }
        Ok(())
    }

    fn disconnect(&self, handle: &VoiceHandle) -> Result<(), Error> {
        if let Some(tx) = self.players.lock().remove(&handle.connection_id) {
            let _ = tx.send(Control::Stop);
        }
        self.connected.lock().remove(&handle.connection_id);
        debug!("(SimVoice) guild {} => disconnected (conn {})", handle.guild_id, handle.connection_id);
        Ok(())
    }
}

/// Blocks until the track has "played" for `length` of unpaused time, or is stopped.
fn run_player(rx: &Receiver<Control>, length: Duration) {
    let mut remaining = length;
    let mut paused = false;
    loop {
        if paused {
            match rx.recv() {
                Ok(Control::Resume) => paused = false,
                Ok(Control::Pause) => {}
                Ok(Control::Stop) | Err(_) => return,
            }
        } else {
            let started = Instant::now();
            match rx.recv_timeout(remaining) {
                Ok(Control::Pause) => {
                    remaining = remaining.saturating_sub(started.elapsed());
                    paused = true;
                }
                Ok(Control::Resume) => remaining = remaining.saturating_sub(started.elapsed()),
                Ok(Control::Stop) | Err(RecvTimeoutError::Disconnected) => return,
                Err(RecvTimeoutError::Timeout) => return,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use twilight_model::id::Id;

    fn track(secs: u64) -> ResolvedTrack {
        ResolvedTrack {
            title: "sim".into(),
            url: "sim://track".into(),
            webpage_url: None,
            duration_secs: Some(secs),
            thumbnail: None,
        }
    }

    #[tokio::test]
    async fn completes_on_its_own_thread() {
        let transport = SimulatedTransport::new(1000.0);
        let handle = transport.connect(Id::new(1), Id::new(2)).await.unwrap();

        let (done_tx, done_rx) = mpsc::channel();
        let main_thread = std::thread::current().id();
        transport
            .play(&handle, &track(1), Box::new(move |err| {
                done_tx.send((err.is_none(), std::thread::current().id())).unwrap();
            }))
            .unwrap();

        let (ok, thread) = done_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(ok);
        assert_ne!(thread, main_thread);
    }

    #[tokio::test]
    async fn stop_fires_completion_without_error() {
        let transport = SimulatedTransport::new(1.0);
        let handle = transport.connect(Id::new(1), Id::new(2)).await.unwrap();

        let (done_tx, done_rx) = mpsc::channel();
        transport
            .play(&handle, &track(600), Box::new(move |err| done_tx.send(err.is_none()).unwrap()))
            .unwrap();
        transport.pause(&handle).unwrap();
        transport.stop(&handle).unwrap();

        assert!(done_rx.recv_timeout(Duration::from_secs(2)).unwrap());
    }

    #[tokio::test]
    async fn stop_after_track_ended_is_ok() {
        let transport = SimulatedTransport::new(1.0);
        let handle = transport.connect(Id::new(1), Id::new(2)).await.unwrap();

        let (done_tx, done_rx) = mpsc::channel();
        transport
            .play(&handle, &track(0), Box::new(move |_| done_tx.send(()).unwrap()))
            .unwrap();
        done_rx.recv_timeout(Duration::from_secs(2)).unwrap();

        // Player thread is gone; the controller may still think it is playing.
        assert!(transport.stop(&handle).is_ok());
        assert!(matches!(transport.pause(&handle), Err(Error::Transport(_))));
    }

    #[tokio::test]
    async fn play_requires_connection() {
        let transport = SimulatedTransport::new(1.0);
        let handle = transport.connect(Id::new(1), Id::new(2)).await.unwrap();
        transport.disconnect(&handle).unwrap();
        assert!(!transport.is_connected(&handle));

        let res = transport.play(&handle, &track(1), Box::new(|_| {}));
        assert!(matches!(res, Err(Error::Transport(_))));
        assert!(transport.pause(&handle).is_err());
    }
}
