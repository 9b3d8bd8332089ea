use async_process::Command;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serenity::model::id::UserId;
use std::{sync::LazyLock, time::Duration};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use url::Url;

use super::{direct_url, MediaResolver};
use crate::{
    audio::queue::Track,
    error::{ResolutionError, Restriction},
};

static YOUTUBE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(https?://)?(www\.|m\.|music\.)?(youtube\.com|youtu\.be)/.+").expect("valid regex")
});

/// Resolver de consultas basado en yt-dlp.
pub struct YtDlpResolver {
    binary: String,
    rate_limiter: Semaphore,
}

/// Información extraída de yt-dlp
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    title: String,
    duration: Option<f64>,
    webpage_url: Option<String>,
    url: Option<String>,
    is_live: Option<bool>,
}

/// Entrada de `--flat-playlist`
#[derive(Debug, Deserialize)]
struct FlatEntry {
    id: Option<String>,
    url: Option<String>,
}

impl YtDlpResolver {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            // Limitar procesos concurrentes para evitar rate limiting
            rate_limiter: Semaphore::new(3),
        }
    }

    async fn run(&self, query: &str, args: &[&str]) -> Result<String, ResolutionError> {
        let _permit = self.rate_limiter.acquire().await.map_err(|e| ResolutionError::Failed {
            query: query.to_string(),
            reason: e.to_string(),
        })?;

        let output = Command::new(&self.binary)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ResolutionError::Failed {
                query: query.to_string(),
                reason: format!("no se pudo ejecutar {}: {}", self.binary, e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!("yt-dlp stderr: {}", stderr.trim());
            return Err(classify_failure(query, &stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl MediaResolver for YtDlpResolver {
    async fn resolve_one(&self, query: &str, requested_by: UserId) -> Result<Track, ResolutionError> {
        if let Some(track) = direct_url::track_for(query, requested_by) {
            return Ok(track);
        }

        let target = search_target(query);
        debug!("🔍 yt-dlp: {}", target);
        let stdout = self
            .run(
                query,
                &[
                    "--no-playlist",
                    "--dump-json",
                    "--no-warnings",
                    "-f",
                    "bestaudio/best",
                    &target,
                ],
            )
            .await?;

        let info = stdout
            .lines()
            .find(|line| !line.trim().is_empty())
            .ok_or_else(|| ResolutionError::NotFound(query.to_string()))?;
        let info: YtDlpInfo = serde_json::from_str(info).map_err(|e| ResolutionError::Failed {
            query: query.to_string(),
            reason: format!("respuesta de yt-dlp inválida: {}", e),
        })?;

        Ok(info_to_track(info, query, requested_by))
    }

    async fn expand_playlist(&self, url: &str, limit: usize) -> Result<Vec<String>, ResolutionError> {
        info!("📋 Obteniendo playlist: {}", url);
        let limit = limit.to_string();
        let stdout = self
            .run(
                url,
                &["--flat-playlist", "--dump-json", "--playlist-end", &limit, "--no-warnings", url],
            )
            .await?;

        let entries: Vec<String> = stdout
            .lines()
            .filter_map(|line| serde_json::from_str::<FlatEntry>(line).ok())
            .filter_map(entry_url)
            .collect();

        if entries.is_empty() {
            warn!("⚠️ Playlist sin entradas: {}", url);
            return Err(ResolutionError::NotFound(url.to_string()));
        }

        Ok(entries)
    }
}

pub fn is_youtube_url(url: &str) -> bool {
    YOUTUBE_URL.is_match(url)
}

/// Playlist de plataforma de video (`/playlist` o parámetro `list=`).
pub fn is_playlist_url(query: &str) -> bool {
    if !is_youtube_url(query) {
        return false;
    }
    let Ok(url) = Url::parse(query) else {
        return false;
    };

    url.path() == "/playlist" || url.query_pairs().any(|(key, _)| key == "list")
}

fn search_target(query: &str) -> String {
    if query.starts_with("http://") || query.starts_with("https://") || query.starts_with("ytsearch") {
        query.to_string()
    } else {
        format!("ytsearch1:{}", query)
    }
}

fn info_to_track(info: YtDlpInfo, query: &str, requested_by: UserId) -> Track {
    let mut track = Track::new(info.title, query, requested_by);

    if let Some(page) = info.webpage_url {
        track = track.with_page_url(page);
    }
    if let Some(stream) = info.url {
        track = track.with_stream_url(stream);
    }
    if !info.is_live.unwrap_or(false) {
        if let Some(seconds) = info.duration.filter(|s| s.is_finite() && *s >= 0.0) {
            track = track.with_duration(Duration::from_secs_f64(seconds));
        }
    }

    track
}

fn entry_url(entry: FlatEntry) -> Option<String> {
    match (entry.url, entry.id) {
        (Some(url), _) if url.starts_with("http") => Some(url),
        (_, Some(id)) => Some(format!("https://www.youtube.com/watch?v={}", id)),
        (Some(url), None) => Some(url),
        (None, None) => None,
    }
}

/// Traduce el stderr de yt-dlp a un motivo de fallo concreto.
fn classify_failure(query: &str, stderr: &str) -> ResolutionError {
    let lower = stderr.to_lowercase();
    let restriction = if lower.contains("private video") {
        Some(Restriction::Private)
    } else if lower.contains("in your country") || lower.contains("geo restrict") {
        Some(Restriction::RegionLocked)
    } else if lower.contains("sign in") || lower.contains("login required") {
        Some(Restriction::LoginRequired)
    } else if lower.contains("video unavailable") || lower.contains("has been removed") {
        Some(Restriction::Removed)
    } else if lower.contains("requested format is not available") {
        Some(Restriction::NoAudio)
    } else {
        None
    };

    match restriction {
        Some(reason) => ResolutionError::Unavailable {
            query: query.to_string(),
            reason,
        },
        None if lower.contains("no video results") || lower.contains("unable to find") => {
            ResolutionError::NotFound(query.to_string())
        }
        None => ResolutionError::Failed {
            query: query.to_string(),
            reason: stderr
                .lines()
                .rev()
                .find(|line| !line.trim().is_empty())
                .unwrap_or("yt-dlp terminó con error")
                .trim()
                .to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_youtube_url_detection() {
        assert!(is_youtube_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ"));
        assert!(is_youtube_url("https://youtu.be/dQw4w9WgXcQ"));
        assert!(is_youtube_url("https://music.youtube.com/watch?v=test"));
        assert!(!is_youtube_url("https://example.com/video"));
    }

    #[test]
    fn playlist_detection() {
        assert!(is_playlist_url("https://www.youtube.com/playlist?list=PL123"));
        assert!(is_playlist_url("https://www.youtube.com/watch?v=abc&list=PL123"));
        assert!(!is_playlist_url("https://www.youtube.com/watch?v=abc"));
        assert!(!is_playlist_url("https://example.com/playlist?list=1"));
        assert!(!is_playlist_url("lofi playlist"));
    }

    #[test]
    fn free_text_becomes_a_single_result_search() {
        assert_eq!(search_target("daft punk"), "ytsearch1:daft punk");
        assert_eq!(search_target("https://youtu.be/x"), "https://youtu.be/x");
        assert_eq!(search_target("ytsearch5:x"), "ytsearch5:x");
    }

    #[test]
    fn parses_dump_json_into_a_track() {
        let json = r#"{"id":"abc","title":"Song","duration":213.0,"webpage_url":"https://www.youtube.com/watch?v=abc","url":"https://rr1.googlevideo.com/x","is_live":false}"#;
        let info: YtDlpInfo = serde_json::from_str(json).unwrap();

        let track = info_to_track(info, "song", UserId::new(3));

        assert_eq!(track.title(), "Song");
        assert_eq!(track.source_query(), "song");
        assert_eq!(track.page_url(), Some("https://www.youtube.com/watch?v=abc"));
        assert_eq!(track.duration(), Some(Duration::from_secs(213)));
    }

    #[test]
    fn live_streams_have_no_duration() {
        let json = r#"{"title":"Radio","duration":0.0,"webpage_url":"https://youtu.be/r","is_live":true}"#;
        let info: YtDlpInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info_to_track(info, "radio", UserId::new(3)).duration(), None);
    }

    #[test]
    fn flat_entries_prefer_full_urls() {
        let full = FlatEntry {
            id: Some("a".into()),
            url: Some("https://www.youtube.com/watch?v=a".into()),
        };
        let bare = FlatEntry {
            id: Some("b".into()),
            url: Some("b".into()),
        };
        assert_eq!(entry_url(full).as_deref(), Some("https://www.youtube.com/watch?v=a"));
        assert_eq!(entry_url(bare).as_deref(), Some("https://www.youtube.com/watch?v=b"));
    }

    #[test]
    fn stderr_is_classified() {
        let private = classify_failure("q", "ERROR: [youtube] abc: Private video. Sign in if you've been granted access");
        assert_eq!(
            private,
            ResolutionError::Unavailable {
                query: "q".into(),
                reason: Restriction::Private
            }
        );

        let geo = classify_failure("q", "ERROR: The uploader has not made this video available in your country");
        assert!(matches!(geo, ResolutionError::Unavailable { reason: Restriction::RegionLocked, .. }));

        let other = classify_failure("q", "ERROR: HTTP Error 503\n");
        assert_eq!(
            other,
            ResolutionError::Failed {
                query: "q".into(),
                reason: "ERROR: HTTP Error 503".into()
            }
        );
    }
}
