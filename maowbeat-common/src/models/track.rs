use serde::{Deserialize, Serialize};

use super::UserId;

/// Prefix the extractor understands as "search and take the first hit".
pub const SEARCH_PREFIX: &str = "ytsearch:";

/// A pending play request, exactly as the user typed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackRequest {
    pub query: String,
    pub requested_by: UserId,
}

impl TrackRequest {
    pub fn new(query: impl Into<String>, requested_by: UserId) -> Self {
        Self {
            query: query.into().trim().to_string(),
            requested_by,
        }
    }

    pub fn is_url(&self) -> bool {
        self.query.starts_with("http://") || self.query.starts_with("https://")
    }

    /// What gets handed to the resolver: URLs unchanged, anything else as a search.
    pub fn resolver_query(&self) -> String {
        if self.is_url() {
            self.query.clone()
        } else {
            format!("{SEARCH_PREFIX}{}", self.query)
        }
    }
}

/// Playable descriptor produced by a `TrackResolver`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedTrack {
    pub title: String,
    /// Direct stream URL handed to the voice transport.
    pub url: String,
    /// Human-facing page, used for "now playing" links.
    pub webpage_url: Option<String>,
    pub duration_secs: Option<u64>,
    pub thumbnail: Option<String>,
}

impl ResolvedTrack {
    pub fn link(&self) -> &str {
        self.webpage_url.as_deref().unwrap_or(&self.url)
    }

    /// `m:ss`, minutes unbounded (a 61 minute track is `61:01`).
    pub fn display_duration(&self) -> Option<String> {
        self.duration_secs.map(format_duration)
    }
}

pub fn format_duration(secs: u64) -> String {
    let (minutes, seconds) = (secs / 60, secs % 60);
    format!("{minutes}:{seconds:02}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use twilight_model::id::Id;

    #[test]
    fn search_queries_get_prefixed() {
        let req = TrackRequest::new("  lofi beats ", Id::new(7));
        assert_eq!(req.query, "lofi beats");
        assert!(!req.is_url());
        assert_eq!(req.resolver_query(), "ytsearch:lofi beats");

        let url = TrackRequest::new("https://youtu.be/abc", Id::new(7));
        assert!(url.is_url());
        assert_eq!(url.resolver_query(), "https://youtu.be/abc");
    }

    #[test]
    fn durations_render_like_the_embed() {
        assert_eq!(format_duration(5), "0:05");
        assert_eq!(format_duration(187), "3:07");
        assert_eq!(format_duration(3661), "61:01");

        let track = ResolvedTrack {
            title: "t".into(),
            url: "https://cdn/stream".into(),
            webpage_url: None,
            duration_secs: None,
            thumbnail: None,
        };
        assert_eq!(track.display_duration(), None);
        assert_eq!(track.link(), "https://cdn/stream");
    }
}
