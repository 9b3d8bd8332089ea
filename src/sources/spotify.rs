use async_trait::async_trait;
use regex::Regex;
use reqwest::{header::RETRY_AFTER, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use std::{
    sync::LazyLock,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::CatalogExpander;
use crate::error::ExpansionError;

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const API_BASE: &str = "https://api.spotify.com/v1";

static SPOTIFY_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"open\.spotify\.com/(?:intl-[a-z]+/)?(track|playlist|album)/([A-Za-z0-9]+)").expect("valid regex")
});
static PAGE_TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<title>(.*?)</title>").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkKind {
    Track,
    Playlist,
    Album,
}

/// Cliente de la Web API de Spotify (client credentials).
pub struct SpotifyClient {
    http: reqwest::Client,
    credentials: Option<(String, String)>,
    token: Mutex<Option<CachedToken>>,
}

struct CachedToken {
    token: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct SpotifyArtist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct SpotifyTrack {
    name: String,
    #[serde(default)]
    artists: Vec<SpotifyArtist>,
}

#[derive(Debug, Deserialize)]
struct PlaylistItem {
    track: Option<SpotifyTrack>,
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    items: Vec<T>,
    next: Option<String>,
}

impl SpotifyTrack {
    fn search_text(&self) -> String {
        match self.artists.first() {
            Some(artist) => format!("{} {}", self.name, artist.name),
            None => self.name.clone(),
        }
    }
}

impl SpotifyClient {
    pub fn new(credentials: Option<(String, String)>) -> Self {
        if credentials.is_none() {
            info!("ℹ️ Spotify sin credenciales: solo se usará el título de la página");
        }
        Self {
            http: reqwest::Client::new(),
            credentials,
            token: Mutex::new(None),
        }
    }

    async fn access_token(&self) -> Result<String, ExpansionError> {
        let Some((client_id, client_secret)) = self.credentials.as_ref() else {
            return Err(ExpansionError::MissingCredentials);
        };

        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            // Margen para que no caduque en mitad de la paginación
            if token.expires_at > Instant::now() + Duration::from_secs(30) {
                return Ok(token.token.clone());
            }
        }

        debug!("🔑 Renovando token de Spotify");
        let response = self
            .http
            .post(TOKEN_URL)
            .basic_auth(client_id, Some(client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| ExpansionError::Request(e.to_string()))?;
        let body: TokenResponse = read_json(response).await?;

        let token = body.access_token.clone();
        *cached = Some(CachedToken {
            token: body.access_token,
            expires_at: Instant::now() + Duration::from_secs(body.expires_in),
        });
        Ok(token)
    }

    async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T, ExpansionError> {
        let token = self.access_token().await?;
        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ExpansionError::Request(e.to_string()))?;

        if response.status() == StatusCode::UNAUTHORIZED {
            // Token revocado antes de tiempo
            self.token.lock().await.take();
        }
        read_json(response).await
    }

    /// Sigue el campo `next` hasta reunir `limit` elementos.
    async fn collect_pages<T: DeserializeOwned>(
        &self,
        first_url: String,
        limit: usize,
        mut pick: impl FnMut(T) -> Option<String>,
    ) -> Result<Vec<String>, ExpansionError> {
        let mut items = Vec::new();
        let mut next = Some(first_url);

        while let Some(url) = next.take() {
            let page: Page<T> = self.get(&url).await?;
            items.extend(page.items.into_iter().filter_map(&mut pick));
            if items.len() >= limit {
                items.truncate(limit);
                break;
            }
            next = page.next;
        }

        Ok(items)
    }
}

#[async_trait]
impl CatalogExpander for SpotifyClient {
    fn is_catalog_link(&self, query: &str) -> bool {
        query.contains("open.spotify.com/")
    }

    async fn expand(&self, url: &str, limit: usize) -> Result<Vec<String>, ExpansionError> {
        let (kind, id) = parse_link(url).ok_or_else(|| ExpansionError::UnsupportedLink(url.to_string()))?;
        info!("🎧 Expandiendo enlace de Spotify ({:?} {})", kind, id);

        match kind {
            LinkKind::Track => {
                let track: SpotifyTrack = self.get(&format!("{}/tracks/{}", API_BASE, id)).await?;
                Ok(vec![track.search_text()])
            }
            LinkKind::Playlist => {
                self.collect_pages(
                    format!("{}/playlists/{}/tracks?limit=100", API_BASE, id),
                    limit,
                    |item: PlaylistItem| item.track.map(|track| track.search_text()),
                )
                .await
            }
            LinkKind::Album => {
                self.collect_pages(
                    format!("{}/albums/{}/tracks?limit=50", API_BASE, id),
                    limit,
                    |track: SpotifyTrack| Some(track.search_text()),
                )
                .await
            }
        }
    }

    async fn scrape_title(&self, url: &str) -> Option<String> {
        let response = match self.http.get(url).send().await {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                warn!("⚠️ Página de Spotify respondió {}", response.status());
                return None;
            }
            Err(e) => {
                warn!("⚠️ No se pudo descargar la página de Spotify: {}", e);
                return None;
            }
        };
        let html = response.text().await.ok()?;
        title_from_html(&html)
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ExpansionError> {
    let status = response.status();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            let body = response.text().await.unwrap_or_default();
            Err(ExpansionError::Unauthorized(format!("{} {}", status, body.trim())))
        }
        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<u64>().ok())
                .unwrap_or(1);
            Err(ExpansionError::RateLimited {
                retry_after: Duration::from_secs(retry_after),
            })
        }
        status if !status.is_success() => Err(ExpansionError::Request(format!("HTTP {}", status))),
        _ => response
            .json::<T>()
            .await
            .map_err(|e| ExpansionError::Request(e.to_string())),
    }
}

fn parse_link(url: &str) -> Option<(LinkKind, String)> {
    let captures = SPOTIFY_LINK.captures(url)?;
    let kind = match &captures[1] {
        "track" => LinkKind::Track,
        "playlist" => LinkKind::Playlist,
        "album" => LinkKind::Album,
        _ => return None,
    };
    Some((kind, captures[2].to_string()))
}

/// "Song - song and lyrics by Artist | Spotify" → "Song Artist"
fn title_from_html(html: &str) -> Option<String> {
    let raw = PAGE_TITLE.captures(html)?.get(1)?.as_str();
    let title = raw
        .replace(" | Spotify", "")
        .replace(" - song and lyrics by ", " ")
        .replace(" - song by ", " ")
        .replace("&amp;", "&")
        .trim()
        .to_string();

    (!title.is_empty() && title != "Spotify").then_some(title)
}
