//! Online metadata enrichment.
//!
//! Fills in the online catalog id and lyrics for assembled tracks. Every
//! failure here is logged and swallowed: enrichment is best-effort and must
//! never block an album from being processed.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::album::Track;

pub const DEFAULT_API_BASE: &str = "http://music.163.com";

#[async_trait]
pub trait MetadataFetcher: Send + Sync {
    /// Look the track up online and fill in `online_id` and `lyrics`.
    async fn enrich(&self, track: &mut Track);
}

/// Fetcher that leaves tracks untouched; used when enrichment is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopFetcher;

#[async_trait]
impl MetadataFetcher for NoopFetcher {
    async fn enrich(&self, _track: &mut Track) {}
}

#[derive(Debug, Deserialize, Default)]
struct SearchResponse {
    #[serde(default)]
    result: SearchResult,
}

#[derive(Debug, Deserialize, Default)]
struct SearchResult {
    #[serde(default)]
    songs: Vec<SongHit>,
}

#[derive(Debug, Deserialize)]
struct SongHit {
    id: i64,
    name: String,
}

#[derive(Debug, Deserialize, Default)]
struct LyricResponse {
    #[serde(default)]
    lrc: Lyric,
}

#[derive(Debug, Deserialize, Default)]
struct Lyric {
    #[serde(default)]
    lyric: String,
}

/// Netease Cloud Music client: first search hit wins, then lyrics by id.
pub struct NeteaseClient {
    base_url: String,
    http: reqwest::Client,
}

impl NeteaseClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(NeteaseClient {
            base_url: base_url.into(),
            http: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }

    async fn search(&self, track: &Track) -> Result<Option<SongHit>, reqwest::Error> {
        let query = format!("{} {}", track.title, track.artist);
        let response: SearchResponse = self
            .http
            .get(format!("{}/api/search/get/web", self.base_url))
            .query(&[("s", query.as_str()), ("type", "1"), ("limit", "5")])
            .send()
            .await?
            .json()
            .await?;
        Ok(response.result.songs.into_iter().next())
    }

    async fn fetch_lyrics(&self, online_id: i64) -> Result<Option<String>, reqwest::Error> {
        let response: LyricResponse = self
            .http
            .get(format!("{}/api/song/lyric", self.base_url))
            .query(&[
                ("id", online_id.to_string().as_str()),
                ("lv", "1"),
                ("kv", "1"),
                ("tv", "-1"),
            ])
            .send()
            .await?
            .json()
            .await?;
        if response.lrc.lyric.is_empty() {
            Ok(None)
        } else {
            Ok(Some(response.lrc.lyric))
        }
    }
}

#[async_trait]
impl MetadataFetcher for NeteaseClient {
    async fn enrich(&self, track: &mut Track) {
        debug!("searching online for [{} - {}]", track.artist, track.title);
        let hit = match self.search(track).await {
            Ok(Some(hit)) => hit,
            Ok(None) => {
                warn!("no online match for '{}'", track.title);
                return;
            }
            Err(e) => {
                warn!("online search failed for '{}': {}", track.title, e);
                return;
            }
        };
        info!("matched song: {} (id {})", hit.name, hit.id);
        track.online_id = Some(hit.id);

        match self.fetch_lyrics(hit.id).await {
            Ok(Some(lyrics)) => {
                debug!("lyrics downloaded for '{}'", track.title);
                track.lyrics = Some(lyrics);
            }
            Ok(None) => {}
            Err(e) => warn!("lyrics fetch failed for '{}': {}", track.title, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_response_tolerates_missing_fields() {
        let parsed: SearchResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.result.songs.is_empty());

        let parsed: SearchResponse = serde_json::from_str(
            r#"{"result":{"songs":[{"id":42,"name":"Song","artists":[{"name":"A"}]}]}}"#,
        )
        .unwrap();
        assert_eq!(parsed.result.songs[0].id, 42);
    }

    #[test]
    fn lyric_response_tolerates_missing_fields() {
        let parsed: LyricResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.lrc.lyric.is_empty());

        let parsed: LyricResponse =
            serde_json::from_str(r#"{"lrc":{"lyric":"[00:00.00] hello"}}"#).unwrap();
        assert_eq!(parsed.lrc.lyric, "[00:00.00] hello");
    }
}
