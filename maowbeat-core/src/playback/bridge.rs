//! Hands completion notifications from the voice transport's playback thread
//! back to the owning controller's task.
//!
//! The controller's fields are not behind any lock, so a transport thread must
//! never touch them. Instead it pushes a `Completion` into the controller's
//! mailbox, where it is ordered with every command the guild receives.

use maowbeat_common::error::Error;
use maowbeat_common::models::GuildId;
use maowbeat_common::traits::CompletionCallback;
use tokio::sync::mpsc::UnboundedSender;
use tracing::trace;

use super::mailbox::SessionMessage;

/// Result of one `VoiceTransport::play` call, tagged with the generation it was issued under.
#[derive(Debug)]
pub struct Completion {
    pub guild_id: GuildId,
    pub generation: u64,
    /// `None` when the track ended normally or was stopped.
    pub error: Option<Error>,
}

/// Cloneable, `Send + Sync` sender side of a controller's mailbox.
///
/// Sending never blocks and needs no runtime, so it is safe to call from a
/// plain OS thread.
#[derive(Debug, Clone)]
pub struct CompletionBridge {
    guild_id: GuildId,
    tx: UnboundedSender<SessionMessage>,
}

impl CompletionBridge {
    pub(crate) fn new(guild_id: GuildId, tx: UnboundedSender<SessionMessage>) -> Self {
        Self { guild_id, tx }
    }

    /// Queue a completion for the controller. Returns `false` if the controller is gone.
    pub fn schedule(&self, generation: u64, error: Option<Error>) -> bool {
        let completion = Completion {
            guild_id: self.guild_id,
            generation,
            error,
        };
        match self.tx.send(SessionMessage::Completed(completion)) {
            Ok(()) => true,
            Err(_) => {
                trace!(
                    "(Bridge) guild {} => controller gone, dropping completion gen={}",
                    self.guild_id, generation
                );
                false
            }
        }
    }

    /// The callback handed to `VoiceTransport::play` for a track of `generation`.
    pub fn callback(&self, generation: u64) -> CompletionCallback {
        let bridge = self.clone();
        Box::new(move |error| {
            bridge.schedule(generation, error);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use twilight_model::id::Id;

    #[tokio::test]
    async fn callback_from_os_thread_lands_in_mailbox() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let bridge = CompletionBridge::new(Id::new(42), tx);

        let cb = bridge.callback(7);
        std::thread::spawn(move || cb(Some(Error::Transport("ffmpeg died".into()))))
            .join()
            .unwrap();

        match rx.recv().await {
            Some(SessionMessage::Completed(c)) => {
                assert_eq!(c.guild_id, Id::new(42));
                assert_eq!(c.generation, 7);
                assert!(matches!(c.error, Some(Error::Transport(_))));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn schedule_after_controller_dropped_is_harmless() {
        let (tx, rx) = mpsc::unbounded_channel();
        let bridge = CompletionBridge::new(Id::new(1), tx);
        drop(rx);
        assert!(!bridge.schedule(1, None));
    }
}
