//! Parsing of `!`-prefixed music commands from a chat line.

use maowbeat_common::error::Error;
use maowbeat_common::models::{CommandOutcome, GuildId};

use super::music_service::{MusicService, RequestContext};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MusicCommand {
    Play(String),
    Pause,
    Resume,
    Skip,
    Stop,
    Queue,
    Help,
}

/// `(name, aliases, description)` for every command, in help order.
pub const COMMANDS: &[(&str, &[&str], &str)] = &[
    ("play", &["p"], "Play a song from YouTube. Usage: !play <song name or URL>"),
    ("pause", &[], "Pause the currently playing song"),
    ("resume", &[], "Resume the paused song"),
    ("skip", &["next"], "Skip the currently playing song"),
    ("stop", &["disconnect", "leave"], "Stop the music and disconnect from voice channel"),
    ("queue", &["q"], "Show the current music queue"),
    ("help", &[], "Show this list"),
];

impl MusicCommand {
    /// `None` if the line is not a music command at all.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        let body = line.strip_prefix('!')?;
        let (name, args) = match body.split_once(char::is_whitespace) {
            Some((n, rest)) => (n, rest.trim()),
            None => (body, ""),
        };

        let canonical = COMMANDS
            .iter()
            .find(|(n, aliases, _)| n.eq_ignore_ascii_case(name) || aliases.iter().any(|a| a.eq_ignore_ascii_case(name)))
            .map(|(n, _, _)| *n)?;

        Some(match canonical {
            "play" => MusicCommand::Play(args.to_string()),
            "pause" => MusicCommand::Pause,
            "resume" => MusicCommand::Resume,
            "skip" => MusicCommand::Skip,
            "stop" => MusicCommand::Stop,
            "queue" => MusicCommand::Queue,
            _ => MusicCommand::Help,
        })
    }

    /// Runs the command. `Help` is answered by the caller and yields `None`.
    pub async fn execute(
        self,
        service: &MusicService,
        ctx: &RequestContext,
    ) -> Option<Result<CommandOutcome, Error>> {
        let guild: GuildId = ctx.guild_id;
        Some(match self {
            MusicCommand::Play(query) => service.play(ctx, &query).await,
            MusicCommand::Pause => service.pause(guild).await,
            MusicCommand::Resume => service.resume(guild).await,
            MusicCommand::Skip => service.skip(guild).await,
            MusicCommand::Stop => service.stop(guild).await,
            MusicCommand::Queue => service.queue_status(guild).await,
            MusicCommand::Help => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names_and_aliases() {
        assert_eq!(MusicCommand::parse("!play never gonna"), Some(MusicCommand::Play("never gonna".into())));
        assert_eq!(MusicCommand::parse("!p   https://x.y/z "), Some(MusicCommand::Play("https://x.y/z".into())));
        assert_eq!(MusicCommand::parse("!next"), Some(MusicCommand::Skip));
        assert_eq!(MusicCommand::parse("!LEAVE"), Some(MusicCommand::Stop));
        assert_eq!(MusicCommand::parse("!q"), Some(MusicCommand::Queue));
        assert_eq!(MusicCommand::parse("!play"), Some(MusicCommand::Play(String::new())));
    }

    #[test]
    fn ignores_non_commands() {
        assert_eq!(MusicCommand::parse("play something"), None);
        assert_eq!(MusicCommand::parse("!dance"), None);
        assert_eq!(MusicCommand::parse(""), None);
    }
}
