//! src/eventbus/mod.rs
//!
//! In-process event bus carrying playback notices to whoever renders them
//! (chat embeds, the console driver, tests). Delivery is guaranteed to every
//! subscriber via bounded MPSC queues.

use std::sync::Arc;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch, Mutex};
use maowbeat_common::models::{GuildId, PlaybackNotice};

/// One user-visible notice, scoped to the guild it happened in.
#[derive(Debug, Clone)]
pub struct MusicEvent {
    pub guild_id: GuildId,
    pub notice: PlaybackNotice,
    pub timestamp: DateTime<Utc>,
}

impl MusicEvent {
    pub fn new(guild_id: GuildId, notice: PlaybackNotice) -> Self {
        Self {
            guild_id,
            notice,
            timestamp: Utc::now(),
        }
    }

    /// Stable name for logs and filters.
    pub fn event_type(&self) -> &'static str {
        match &self.notice {
            PlaybackNotice::NowPlaying(_) => "music.now_playing",
            PlaybackNotice::Queued { .. } => "music.queued",
            PlaybackNotice::Paused => "music.paused",
            PlaybackNotice::Resumed => "music.resumed",
            PlaybackNotice::Skipped => "music.skipped",
            PlaybackNotice::Stopped => "music.stopped",
            PlaybackNotice::DisconnectedIdle => "music.disconnected_idle",
            PlaybackNotice::Failed { .. } => "music.failed",
            PlaybackNotice::GaveUp { .. } => "music.gave_up",
        }
    }
}

/// Each subscriber gets its own `mpsc::Sender<MusicEvent>`.
///
/// - If a subscriber's buffer fills, `publish` waits for space (backpressure).
/// - If a subscriber dropped its `Receiver`, it is skipped.
#[derive(Clone)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<mpsc::Sender<MusicEvent>>>>,
    shutdown_tx: watch::Sender<bool>,
    pub shutdown_rx: watch::Receiver<bool>,
}

/// Default size for each subscriber's buffer.
const DEFAULT_BUFFER_SIZE: usize = 1024;

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            subscribers: Arc::new(Mutex::new(vec![])),
            shutdown_tx: tx,
            shutdown_rx: rx,
        }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    /// Returns a receiver on which events will be delivered.
    pub async fn subscribe(&self, buffer_size: Option<usize>) -> mpsc::Receiver<MusicEvent> {
        let size = buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE);
        let (tx, rx) = mpsc::channel(size);
        let mut subs = self.subscribers.lock().await;
        subs.push(tx);
        rx
    }

    /// Publish an event to all live subscribers. No-op after shutdown.
    pub async fn publish(&self, event: MusicEvent) {
        if self.is_shutdown() {
            return;
        }
        let senders = {
            let mut subs = self.subscribers.lock().await;
            subs.retain(|s| !s.is_closed());
            subs.clone()
        };
        for s in senders {
            let _ = s.send(event.clone()).await;
        }
    }

    /// Convenience method: publish a notice for a guild.
    pub async fn notify(&self, guild_id: GuildId, notice: PlaybackNotice) {
        self.publish(MusicEvent::new(guild_id, notice)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{sleep, timeout, Duration};
    use twilight_model::id::Id;

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let bus = EventBus::new();

        let mut rx1 = bus.subscribe(Some(5)).await;
        let mut rx2 = bus.subscribe(Some(5)).await;

        bus.notify(Id::new(1), PlaybackNotice::Paused).await;

        let evt1 = rx1.recv().await.expect("rx1 should get event");
        let evt2 = rx2.recv().await.expect("rx2 should get event");

        assert_eq!(evt1.notice, PlaybackNotice::Paused);
        assert_eq!(evt2.event_type(), "music.paused");
        assert_eq!(evt2.guild_id, Id::new(1));
    }

    #[tokio::test]
    async fn test_backpressure_blocking() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe(Some(1)).await;

        bus.notify(Id::new(1), PlaybackNotice::Skipped).await;

        let handle = tokio::spawn(async move {
            sleep(Duration::from_millis(50)).await;
            let first = rx.recv().await.expect("expected first message");
            let second = rx.recv().await.expect("expected second message");
            (first, second)
        });

        // Waits until the reader makes room.
        let second_publish = bus.notify(Id::new(1), PlaybackNotice::Stopped);
        let result = timeout(Duration::from_millis(500), second_publish).await;
        assert!(result.is_ok(), "publish should eventually unblock");

        let (evt1, evt2) = handle.await.unwrap();
        assert_eq!(evt1.notice, PlaybackNotice::Skipped);
        assert_eq!(evt2.notice, PlaybackNotice::Stopped);
    }

    #[tokio::test]
    async fn test_dropped_subscriber_and_shutdown() {
        let bus = EventBus::new();
        let rx_dead = bus.subscribe(Some(1)).await;
        let mut rx = bus.subscribe(Some(4)).await;
        drop(rx_dead);

        bus.notify(Id::new(3), PlaybackNotice::Resumed).await;
        bus.notify(Id::new(3), PlaybackNotice::Resumed).await;
        assert_eq!(rx.recv().await.unwrap().notice, PlaybackNotice::Resumed);
        assert_eq!(rx.recv().await.unwrap().notice, PlaybackNotice::Resumed);

        bus.shutdown();
        assert!(bus.is_shutdown());
        bus.notify(Id::new(3), PlaybackNotice::Paused).await;
        assert!(rx.try_recv().is_err());
    }
}
