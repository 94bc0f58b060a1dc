// maowbeat-core/src/config.rs

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Error;

/// How long a session with nothing left to play stays connected.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 3;

/// Tunables shared by every guild session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MusicConfig {
    pub idle_timeout_ms: u64,
    /// Resolution failures in a row before the queue is abandoned.
    pub max_consecutive_failures: u32,
    /// Per-subscriber buffer on the event bus.
    pub event_buffer: usize,
    /// Most recent state transitions kept per controller.
    pub trace_capacity: usize,
    pub ytdlp_path: String,
}

impl Default for MusicConfig {
    fn default() -> Self {
        Self {
            idle_timeout_ms: DEFAULT_IDLE_TIMEOUT.as_millis() as u64,
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
            event_buffer: 1024,
            trace_capacity: 64,
            ytdlp_path: "yt-dlp".to_string(),
        }
    }
}

impl MusicConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    /// Env and CLI take whole seconds.
    pub fn set_idle_timeout_secs(&mut self, secs: u64) -> Result<(), Error> {
        self.idle_timeout_ms = secs
            .checked_mul(1000)
            .ok_or_else(|| Error::Config(format!("idle timeout of {secs}s is too large")))?;
        Ok(())
    }

    /// Defaults overridden by `MAOWBEAT_*` variables (a `.env` file is honoured).
    pub fn from_env() -> Result<Self, Error> {
        dotenv::dotenv().ok();
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("MAOWBEAT_IDLE_TIMEOUT_SECS") {
            cfg.set_idle_timeout_secs(v.trim().parse()?)?;
        }
        if let Ok(v) = std::env::var("MAOWBEAT_MAX_FAILURES") {
            cfg.max_consecutive_failures = v.trim().parse()?;
        }
        if let Ok(v) = std::env::var("MAOWBEAT_YTDLP") {
            cfg.ytdlp_path = v;
        }
        cfg.validate()?;
        debug!("Loaded music config: {:?}", cfg);
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.max_consecutive_failures == 0 {
            return Err(Error::Config("max_consecutive_failures must be at least 1".into()));
        }
        if self.event_buffer == 0 {
            return Err(Error::Config("event_buffer must be non-zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_five_minute_idle_window() {
        let cfg = MusicConfig::default();
        assert_eq!(cfg.idle_timeout(), Duration::from_secs(300));
        assert_eq!(cfg.max_consecutive_failures, 3);
        tokio_test::assert_ok!(cfg.validate());
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let cfg: MusicConfig = serde_json::from_str(r#"{"idle_timeout_ms": 30000}"#).unwrap();
        assert_eq!(cfg.idle_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.event_buffer, 1024);
    }

    #[test]
    fn idle_timeout_seconds_are_checked() {
        let mut cfg = MusicConfig::default();
        tokio_test::assert_ok!(cfg.set_idle_timeout_secs(45));
        assert_eq!(cfg.idle_timeout(), Duration::from_secs(45));

        let err = tokio_test::assert_err!(cfg.set_idle_timeout_secs(u64::MAX));
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(cfg.idle_timeout(), Duration::from_secs(45));
    }

    #[test]
    fn zero_failures_is_rejected() {
        let cfg = MusicConfig { max_consecutive_failures: 0, ..Default::default() };
        let err = tokio_test::assert_err!(cfg.validate());
        assert!(matches!(err, Error::Config(_)));
    }
}
