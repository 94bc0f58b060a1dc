//! `TrackResolver` backed by the `yt-dlp` executable.

use async_trait::async_trait;
use maowbeat_common::error::Error;
use maowbeat_common::models::ResolvedTrack;
use maowbeat_common::traits::TrackResolver;
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

/// Subset of yt-dlp's `--dump-single-json` output we care about.
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    title: Option<String>,
    url: Option<String>,
    webpage_url: Option<String>,
    duration: Option<f64>,
    thumbnail: Option<String>,
    #[serde(default)]
    entries: Option<Vec<YtDlpInfo>>,
}

pub struct YtDlpResolver {
    program: String,
}

impl YtDlpResolver {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into() }
    }
}

#[async_trait]
impl TrackResolver for YtDlpResolver {
    async fn resolve(&self, query: &str) -> Result<ResolvedTrack, Error> {
        debug!("(yt-dlp) resolving '{}'", query);
        let output = Command::new(&self.program)
            .args([
                "--dump-single-json",
                "--format",
                "bestaudio/best",
                "--no-playlist",
                "--default-search",
                "auto",
                "--no-warnings",
                "--quiet",
                "--",
                query,
            ])
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::Resolution(format!("could not run {}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = stderr.lines().last().unwrap_or("extraction failed").trim().to_string();
            return Err(Error::Resolution(reason));
        }

        parse_info(&output.stdout)
    }
}

/// Turns yt-dlp JSON into a track. Playlists and searches yield their first entry.
pub fn parse_info(json: &[u8]) -> Result<ResolvedTrack, Error> {
    let mut info: YtDlpInfo = serde_json::from_slice(json)?;
    if let Some(entries) = info.entries.take() {
        info = entries
            .into_iter()
            .next()
            .ok_or_else(|| Error::Resolution("No results found.".into()))?;
    }

    let url = info
        .url
        .clone()
        .or_else(|| info.webpage_url.clone())
        .ok_or_else(|| Error::Resolution("Could not find a valid URL for this song.".into()))?;

    Ok(ResolvedTrack {
        title: info.title.unwrap_or_else(|| "Unknown".to_string()),
        url,
        webpage_url: info.webpage_url,
        duration_secs: info.duration.filter(|d| *d >= 0.0).map(|d| d as u64),
        thumbnail: info.thumbnail,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_video() {
        let json = br#"{"title":"Song","url":"https://cdn/a.webm","webpage_url":"https://youtube.com/watch?v=a","duration":187.0,"thumbnail":"https://i/a.jpg"}"#;
        let t = parse_info(json).unwrap();
        assert_eq!(t.title, "Song");
        assert_eq!(t.url, "https://cdn/a.webm");
        assert_eq!(t.display_duration().as_deref(), Some("3:07"));
        assert_eq!(t.link(), "https://youtube.com/watch?v=a");
    }

    #[test]
    fn search_takes_first_entry() {
        let json = br#"{"_type":"playlist","entries":[{"title":"First","url":"https://cdn/1"},{"title":"Second","url":"https://cdn/2"}]}"#;
        let t = parse_info(json).unwrap();
        assert_eq!(t.title, "First");
        assert_eq!(t.duration_secs, None);
    }

    #[test]
    fn empty_search_and_missing_url_fail() {
        assert!(matches!(parse_info(br#"{"entries":[]}"#), Err(Error::Resolution(_))));
        assert!(matches!(parse_info(br#"{"title":"x"}"#), Err(Error::Resolution(_))));
        assert!(matches!(parse_info(b"not json"), Err(Error::Json(_))));
    }
}
