use std::sync::Arc;

use dashmap::DashMap;
use maowbeat_common::models::GuildId;
use maowbeat_common::traits::{TrackResolver, VoiceTransport};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::MusicConfig;
use crate::eventbus::EventBus;

use super::controller::PlaybackController;
use super::mailbox::SessionHandle;

/// Process-wide guild -> controller map.
///
/// `get_or_create` goes through the DashMap entry API, so two commands racing
/// for the same guild always see the same controller. Only a controller's own
/// teardown removes its entry, and only if the entry is still its own.
pub struct SessionRegistry {
    sessions: DashMap<GuildId, SessionHandle>,
    pub(crate) resolver: Arc<dyn TrackResolver>,
    pub(crate) transport: Arc<dyn VoiceTransport>,
    pub(crate) event_bus: Arc<EventBus>,
    pub(crate) config: MusicConfig,
}

impl SessionRegistry {
    pub fn new(
        resolver: Arc<dyn TrackResolver>,
        transport: Arc<dyn VoiceTransport>,
        event_bus: Arc<EventBus>,
        config: MusicConfig,
    ) -> Arc<Self> {
        debug!("Initializing SessionRegistry");
        Arc::new(Self {
            sessions: DashMap::new(),
            resolver,
            transport,
            event_bus,
            config,
        })
    }

    /// Existing controller for the guild, or a freshly spawned `Idle` one.
    ///
    /// Must be called from inside a tokio runtime.
    pub fn get_or_create(self: &Arc<Self>, guild_id: GuildId) -> SessionHandle {
        let entry = self
            .sessions
            .entry(guild_id)
            .or_insert_with(|| {
                let handle = PlaybackController::spawn(guild_id, Arc::clone(self));
                info!("(Music) guild {} => new session {}", guild_id, handle.session_id);
                handle
            });
        entry.value().clone()
    }

    pub fn get(&self, guild_id: GuildId) -> Option<SessionHandle> {
        self.sessions.get(&guild_id).map(|h| h.value().clone())
    }

    /// Called by a terminating controller. No-op if a successor already owns the slot.
    pub fn remove(&self, guild_id: GuildId, session_id: Uuid) -> bool {
        let removed = self
            .sessions
            .remove_if(&guild_id, |_, h| h.session_id == session_id)
            .is_some();
        if removed {
            debug!("(Music) guild {} => session {} deregistered", guild_id, session_id);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn guilds(&self) -> Vec<GuildId> {
        self.sessions.iter().map(|e| *e.key()).collect()
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn config(&self) -> &MusicConfig {
        &self.config
    }

    /// Stops every live session, e.g. on process shutdown.
    pub async fn shutdown_all(&self) {
        let handles: Vec<SessionHandle> = self.sessions.iter().map(|e| e.value().clone()).collect();
        info!("(Music) stopping {} session(s)", handles.len());
        for handle in handles {
            if let Err(e) = handle.stop().await {
                warn!("(Music) guild {} => stop during shutdown failed: {}", handle.guild_id, e);
            }
        }
    }
}
