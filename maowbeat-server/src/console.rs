// maowbeat-server/src/console.rs
//
// Line-oriented stand-in for a guild text channel. Bot commands go through
// `MusicCommand`; lines starting with ':' change who is "typing" them.

use std::io::{BufRead, BufReader, Write};
use std::sync::Arc;
use std::thread;

use tokio::sync::mpsc;
use tracing::{debug, error, info};
use twilight_model::id::Id;

use maowbeat_common::models::{ChannelId, GuildId};
use maowbeat_core::eventbus::{EventBus, MusicEvent};
use maowbeat_core::services::{MusicCommand, MusicService, RequestContext};

use crate::render;

/// Console-only commands, not part of the bot's command set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Guild(GuildId),
    Channel(Option<ChannelId>),
    Status,
    Quit,
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Option<Result<Self, String>> {
        let line = line.trim();
        if line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit") {
            return Some(Ok(ConsoleCommand::Quit));
        }
        let body = line.strip_prefix(':')?;
        let mut parts = body.split_whitespace();
        let cmd = parts.next().unwrap_or("");
        let arg = parts.next();

        Some(match (cmd, arg) {
            ("guild", Some(id)) => parse_id(id).map(ConsoleCommand::Guild),
            ("channel", Some("none")) => Ok(ConsoleCommand::Channel(None)),
            ("channel", Some(id)) => parse_id(id).map(|c| ConsoleCommand::Channel(Some(c))),
            ("status", None) => Ok(ConsoleCommand::Status),
            ("quit", None) => Ok(ConsoleCommand::Quit),
            _ => Err(format!("Unknown console command '{line}'. Type 'help' for usage.")),
        })
    }
}

fn parse_id<T>(raw: &str) -> Result<Id<T>, String> {
    raw.parse::<u64>()
        .ok()
        .and_then(Id::new_checked)
        .ok_or_else(|| format!("'{raw}' is not a valid id"))
}

/// Reads stdin on a plain thread and forwards each line. The channel closes on EOF.
pub fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    thread::spawn(move || {
        let mut reader = BufReader::new(std::io::stdin());
        loop {
            print!("music> ");
            let _ = std::io::stdout().flush();

            let mut line = String::new();
            match reader.read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    eprintln!("Error reading from stdin: {e}");
                    break;
                }
            }
        }
        debug!("(Console) stdin reader finished");
    });
    rx
}

/// Prints every notice published on the bus until the bus shuts down.
pub async fn spawn_notice_printer(event_bus: &Arc<EventBus>, buffer: usize) -> tokio::task::JoinHandle<()> {
    let mut rx: mpsc::Receiver<MusicEvent> = event_bus.subscribe(Some(buffer)).await;
    let mut shutdown_rx = event_bus.shutdown_rx.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(event) = rx.recv() => {
                    debug!("(Console) event {}", event.event_type());
                    if let Some(text) = render::notice(&event) {
                        println!("{text}");
                    }
                }
                Ok(_) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
                else => break,
            }
        }
    })
}

pub struct ConsoleDriver {
    service: MusicService,
    ctx: RequestContext,
}

impl ConsoleDriver {
    pub fn new(service: MusicService, ctx: RequestContext) -> Self {
        Self { service, ctx }
    }

    pub fn service(&self) -> &MusicService {
        &self.service
    }

    /// Handles one line. Returns `false` once the user asked to quit.
    pub async fn handle_line(&mut self, line: &str) -> bool {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return true;
        }
        if trimmed.eq_ignore_ascii_case("help") {
            println!("{}", render::help());
            return true;
        }

        if let Some(parsed) = ConsoleCommand::parse(trimmed) {
            return match parsed {
                Ok(cmd) => self.console_command(cmd).await,
                Err(msg) => {
                    println!("{msg}");
                    true
                }
            };
        }

        let Some(cmd) = MusicCommand::parse(trimmed) else {
            println!("Unknown command '{trimmed}'. Type 'help' for usage.");
            return true;
        };
        match cmd.execute(&self.service, &self.ctx).await {
            None => println!("{}", render::help()),
            Some(Ok(outcome)) => {
                if let Some(text) = render::outcome(&outcome) {
                    println!("{text}");
                }
            }
            Some(Err(e)) => println!("{}", render::error(&e)),
        }
        true
    }

    async fn console_command(&mut self, cmd: ConsoleCommand) -> bool {
        match cmd {
            ConsoleCommand::Guild(guild_id) => {
                self.ctx.guild_id = guild_id;
                println!("(Console) now typing in guild {guild_id}");
            }
            ConsoleCommand::Channel(channel) => {
                self.ctx.voice_channel = channel;
                match channel {
                    Some(id) => println!("(Console) you joined voice channel {id}"),
                    None => println!("(Console) you left voice"),
                }
            }
            ConsoleCommand::Status => self.print_status().await,
            ConsoleCommand::Quit => {
                info!("(Console) quit requested");
                return false;
            }
        }
        true
    }

    async fn print_status(&self) {
        let registry = self.service.registry();
        println!(
            "(Console) guild={} user={} voice={}",
            self.ctx.guild_id,
            self.ctx.user_id,
            self.ctx
                .voice_channel
                .map(|c| c.to_string())
                .unwrap_or_else(|| "none".to_string())
        );
        println!("(Console) {} live session(s)", registry.len());
        for guild_id in registry.guilds() {
            let Some(handle) = registry.get(guild_id) else { continue };
            match handle.inspect().await {
                Ok(snap) => println!(
                    "   guild {} => {} (gen {}, queued {}, failures {}, idle timer {})",
                    guild_id,
                    snap.state,
                    snap.generation,
                    snap.queue_len,
                    snap.consecutive_failures,
                    if snap.idle_timer_armed { "armed" } else { "off" }
                ),
                Err(e) => error!("(Console) guild {} => could not inspect: {}", guild_id, e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_console_commands() {
        assert_eq!(ConsoleCommand::parse(":guild 42"), Some(Ok(ConsoleCommand::Guild(Id::new(42)))));
        assert_eq!(ConsoleCommand::parse(":channel none"), Some(Ok(ConsoleCommand::Channel(None))));
        assert_eq!(
            ConsoleCommand::parse(":channel 9"),
            Some(Ok(ConsoleCommand::Channel(Some(Id::new(9)))))
        );
        assert_eq!(ConsoleCommand::parse("quit"), Some(Ok(ConsoleCommand::Quit)));
        assert_eq!(ConsoleCommand::parse(":status"), Some(Ok(ConsoleCommand::Status)));
    }

    #[test]
    fn rejects_bad_console_input() {
        assert!(matches!(ConsoleCommand::parse(":guild 0"), Some(Err(_))));
        assert!(matches!(ConsoleCommand::parse(":guild abc"), Some(Err(_))));
        assert!(matches!(ConsoleCommand::parse(":dance"), Some(Err(_))));
        assert_eq!(ConsoleCommand::parse("!play x"), None);
    }
}
