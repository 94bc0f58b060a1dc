use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};
use twilight_model::id::Id;

use maowbeat_core::adapters::{SimulatedTransport, YtDlpResolver};
use maowbeat_core::eventbus::EventBus;
use maowbeat_core::services::{MusicService, RequestContext};
use maowbeat_core::{MusicConfig, SessionRegistry};

mod console;
mod render;

use console::{spawn_notice_printer, spawn_stdin_reader, ConsoleDriver};

#[derive(Parser, Debug, Clone)]
#[command(name = "maowbeat")]
#[command(author, version, about = "MaowBeat - per-server music queue driven from the console")]
struct Args {
    /// Guild the console starts typing in
    #[arg(long, default_value_t = 1)]
    guild: u64,

    /// Console user's id
    #[arg(long, default_value_t = 1)]
    user: u64,

    /// Voice channel the console user sits in; 0 means not in voice
    #[arg(long, default_value_t = 1)]
    channel: u64,

    /// Simulated playback speed (60 plays a minute of audio per second)
    #[arg(long, default_value_t = 1.0)]
    speed: f64,

    /// Seconds with nothing queued before leaving voice (default: MAOWBEAT_IDLE_TIMEOUT_SECS or 300)
    #[arg(long)]
    idle_timeout_secs: Option<u64>,

    /// Failed songs in a row before the queue is dropped (default: MAOWBEAT_MAX_FAILURES or 3)
    #[arg(long)]
    max_failures: Option<u32>,

    /// yt-dlp executable (default: MAOWBEAT_YTDLP or "yt-dlp")
    #[arg(long)]
    ytdlp: Option<String>,
}

impl Args {
    fn music_config(&self) -> anyhow::Result<MusicConfig> {
        let mut cfg = MusicConfig::from_env()?;
        if let Some(secs) = self.idle_timeout_secs {
            cfg.set_idle_timeout_secs(secs)?;
        }
        if let Some(n) = self.max_failures {
            cfg.max_consecutive_failures = n;
        }
        if let Some(path) = &self.ytdlp {
            cfg.ytdlp_path = path.clone();
        }
        cfg.validate()?;
        Ok(cfg)
    }

    fn request_context(&self) -> anyhow::Result<RequestContext> {
        let guild_id = Id::new_checked(self.guild).ok_or_else(|| anyhow::anyhow!("--guild must be non-zero"))?;
        let user_id = Id::new_checked(self.user).ok_or_else(|| anyhow::anyhow!("--user must be non-zero"))?;
        Ok(RequestContext {
            guild_id,
            user_id,
            voice_channel: Id::new_checked(self.channel),
        })
    }
}

fn init_tracing() {
    tracing_log::LogTracer::init().ok();
    let filter = EnvFilter::from_default_env()
        .add_directive("maowbeat=info".parse().unwrap_or_default());
    let sub = fmt().with_env_filter(filter).with_writer(std::io::stderr).finish();
    tracing::subscriber::set_global_default(sub)
        .expect("Failed to set global subscriber");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();
    let args = Args::parse();

    let config = args.music_config()?;
    let ctx = args.request_context()?;
    info!(
        "MaowBeat starting. idle_timeout={:?}, max_failures={}, yt-dlp={}",
        config.idle_timeout(),
        config.max_consecutive_failures,
        config.ytdlp_path
    );

    let event_bus = Arc::new(EventBus::new());
    let printer = spawn_notice_printer(&event_bus, config.event_buffer).await;

    let resolver = Arc::new(YtDlpResolver::new(config.ytdlp_path.clone()));
    let transport = Arc::new(SimulatedTransport::new(args.speed));
    let registry = SessionRegistry::new(resolver, transport, event_bus.clone(), config);
    let mut driver = ConsoleDriver::new(MusicService::new(registry), ctx);

    // Handle Ctrl-C to signal shutdown
    let eb_clone = event_bus.clone();
    let _ctrlc_handle = tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {:?}", e);
            return;
        }
        info!("Ctrl-C detected; shutting down event bus...");
        eb_clone.shutdown();
    });

    println!("{}", render::help());
    let mut lines = spawn_stdin_reader();
    let mut shutdown_rx = event_bus.shutdown_rx.clone();
    loop {
        tokio::select! {
            line = lines.recv() => match line {
                Some(line) => {
                    if !driver.handle_line(&line).await {
                        break;
                    }
                }
                None => {
                    info!("stdin closed; exiting.");
                    break;
                }
            },
            Ok(_) = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    info!("Shutdown signaled; exiting console loop.");
                    break;
                }
            }
        }
    }

    driver.service().registry().shutdown_all().await;
    event_bus.shutdown();
    if let Err(e) = printer.await {
        warn!("notice printer ended abnormally: {:?}", e);
    }
    info!("Main finished. Goodbye!");
    Ok(())
}
