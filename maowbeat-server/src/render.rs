// maowbeat-server/src/render.rs
//
// Text rendering of command outcomes, errors and playback notices, worded the
// way the chat bot answers in a text channel.

use maowbeat_common::error::Error;
use maowbeat_common::models::{CommandOutcome, PlaybackNotice, PlaybackState, QueueStatus, ResolvedTrack};
use maowbeat_core::eventbus::MusicEvent;
use maowbeat_core::services::music_command::COMMANDS;

pub fn outcome(outcome: &CommandOutcome) -> Option<String> {
    match outcome {
        // The matching notice (now playing, failure) follows on the event bus.
        CommandOutcome::Started => Some("🔍 Searching for song...".to_string()),
        // Rendered from the `Queued` notice instead.
        CommandOutcome::Queued { .. } => None,
        CommandOutcome::Paused => Some("⏸️ Paused.".to_string()),
        CommandOutcome::Resumed => Some("▶️ Resumed.".to_string()),
        CommandOutcome::Skipped => Some("⏭️ Skipped.".to_string()),
        CommandOutcome::Stopped => Some("🛑 Stopped and disconnected from voice channel.".to_string()),
        CommandOutcome::Status(status) => Some(queue(status)),
    }
}

pub fn error(err: &Error) -> String {
    match err {
        Error::InvalidRequest(msg) | Error::InvalidState(msg) => format!("❌ {msg}"),
        Error::Resolution(_) | Error::Connect(_) | Error::NotInVoice | Error::DifferentChannel => {
            format!("❌ {err}")
        }
        other => format!("❌ Error: {other}"),
    }
}

/// `None` for notices the console echoes through the command reply instead.
pub fn notice(event: &MusicEvent) -> Option<String> {
    let stamp = event.timestamp.format("%H:%M:%S");
    let body = match &event.notice {
        PlaybackNotice::NowPlaying(track) => now_playing(track),
        PlaybackNotice::Queued { query, position } => {
            format!("➕ Added to Queue: {query}\n   Position in Queue: {position}")
        }
        PlaybackNotice::Failed { reason } => format!("❌ {reason}"),
        PlaybackNotice::GaveUp { failures, dropped } => format!(
            "❌ {failures} songs in a row could not be played; cleared {dropped} queued song(s)."
        ),
        PlaybackNotice::DisconnectedIdle => "🔌 Disconnected from voice channel (inactive).".to_string(),
        PlaybackNotice::Paused
        | PlaybackNotice::Resumed
        | PlaybackNotice::Skipped
        | PlaybackNotice::Stopped => return None,
    };
    Some(format!("[{stamp}] [guild {}] {body}", event.guild_id))
}

fn now_playing(track: &ResolvedTrack) -> String {
    let mut out = format!("🎵 Now Playing: {} <{}>", track.title, track.link());
    if let Some(duration) = track.display_duration() {
        out.push_str(&format!("\n   Duration: {duration}"));
    }
    out
}

fn queue(status: &QueueStatus) -> String {
    let mut out = String::new();
    match (&status.now_playing, status.state) {
        (Some(title), PlaybackState::Paused) => out.push_str(&format!("⏸️ Paused: {title}\n")),
        (Some(title), _) => out.push_str(&format!("🎵 Now Playing: {title}\n")),
        (None, _) => {}
    }
    if status.pending.is_empty() {
        out.push_str("📭 Queue is empty.");
        return out;
    }
    out.push_str(&format!("📋 Music Queue: {} song(s) in queue", status.length));
    for (i, query) in status.pending.iter().enumerate() {
        out.push_str(&format!("\n   {}. {}", i + 1, query));
    }
    out
}

pub fn help() -> String {
    let mut out = String::from("🎵 Music Commands");
    for (name, aliases, description) in COMMANDS {
        let alias_text = if aliases.is_empty() {
            String::new()
        } else {
            format!(" (aliases: {})", aliases.iter().map(|a| format!("!{a}")).collect::<Vec<_>>().join(", "))
        };
        out.push_str(&format!("\n  !{name}{alias_text} - {description}"));
    }
    out.push_str("\nConsole: :guild <id>, :channel <id|none>, :status, quit");
    out
}
