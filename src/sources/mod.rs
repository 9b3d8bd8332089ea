//! # Sources Module
//!
//! Turns what users type after `!play` into [`Track`]s.
//!
//! Two collaborators sit behind traits:
//!
//! - [`MediaResolver`]: one query (URL or search text) → one playable track,
//!   plus video-platform playlist expansion. Implemented by
//!   [`youtube::YtDlpResolver`].
//! - [`CatalogExpander`]: external catalog links (Spotify) → search queries,
//!   with a best-effort page title scrape. Implemented by
//!   [`spotify::SpotifyClient`].
//!
//! [`ResolverAdapter`] is what the rest of the bot talks to. It classifies
//! the request, expands it, and resolves the resulting batch with bounded
//! concurrency while keeping the original order.

pub mod direct_url;
pub mod spotify;
pub mod youtube;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serenity::model::id::UserId;
use std::{sync::Arc, time::Duration};
use tracing::{debug, info, warn};

use crate::{
    audio::queue::Track,
    error::{ExpansionError, PlayerError, ResolutionError},
};

/// Resolución de consultas individuales a tracks reproducibles.
#[async_trait]
pub trait MediaResolver: Send + Sync {
    /// Resolves a URL or free-text search into a single track.
    async fn resolve_one(&self, query: &str, requested_by: UserId) -> Result<Track, ResolutionError>;

    /// Lists the entry URLs of a video-platform playlist, at most `limit`.
    async fn expand_playlist(&self, url: &str, limit: usize) -> Result<Vec<String>, ResolutionError>;
}

/// Expansión de enlaces de catálogos externos (Spotify).
#[async_trait]
pub trait CatalogExpander: Send + Sync {
    fn is_catalog_link(&self, query: &str) -> bool;

    /// Expands a catalog link into search queries, in catalog order.
    async fn expand(&self, url: &str, limit: usize) -> Result<Vec<String>, ExpansionError>;

    /// Best-effort "title artist" guess taken from the public page.
    async fn scrape_title(&self, url: &str) -> Option<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Catalog,
    Playlist,
    Url,
    Search,
}

#[derive(Debug, Clone)]
pub struct ResolveSettings {
    pub timeout: Duration,
    pub playlist_timeout: Duration,
    pub concurrency: usize,
    pub max_batch: usize,
}

impl Default for ResolveSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            playlist_timeout: Duration::from_secs(120),
            concurrency: 4,
            max_batch: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchFailure {
    pub index: usize,
    pub query: String,
    pub error: ResolutionError,
}

/// Result of resolving one play request.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Resolved tracks, in the order their queries were listed.
    pub tracks: Vec<Track>,
    pub failures: Vec<BatchFailure>,
}

pub struct ResolverAdapter {
    media: Arc<dyn MediaResolver>,
    catalog: Option<Arc<dyn CatalogExpander>>,
    settings: ResolveSettings,
}

impl ResolverAdapter {
    pub fn new(
        media: Arc<dyn MediaResolver>,
        catalog: Option<Arc<dyn CatalogExpander>>,
        settings: ResolveSettings,
    ) -> Self {
        Self {
            media,
            catalog,
            settings,
        }
    }

    pub fn classify(&self, query: &str) -> QueryKind {
        if self
            .catalog
            .as_ref()
            .is_some_and(|catalog| catalog.is_catalog_link(query))
        {
            QueryKind::Catalog
        } else if youtube::is_playlist_url(query) {
            QueryKind::Playlist
        } else if query.starts_with("http://") || query.starts_with("https://") {
            QueryKind::Url
        } else {
            QueryKind::Search
        }
    }

    /// Resolves a full play request into an ordered batch.
    ///
    /// Single-query requests surface their own [`ResolutionError`]; multi-track
    /// requests report per-item failures in the outcome and only fail as a
    /// whole when expansion itself fails.
    pub async fn resolve_request(&self, query: &str, requested_by: UserId) -> Result<BatchOutcome, PlayerError> {
        let query = query.trim();
        let kind = self.classify(query);
        debug!("🔎 Resolviendo '{}' como {:?}", query, kind);

        match kind {
            QueryKind::Url | QueryKind::Search => {
                let track = self.resolve_one(query, requested_by).await?;
                Ok(BatchOutcome {
                    tracks: vec![track],
                    failures: Vec::new(),
                })
            }
            QueryKind::Playlist => {
                let entries = match tokio::time::timeout(
                    self.settings.playlist_timeout,
                    self.media.expand_playlist(query, self.settings.max_batch),
                )
                .await
                {
                    Ok(result) => result?,
                    Err(_) => {
                        return Err(ResolutionError::Timeout {
                            query: query.to_string(),
                            after: self.settings.playlist_timeout,
                        }
                        .into())
                    }
                };
                info!("📋 Playlist con {} entradas", entries.len());
                Ok(self.resolve_batch(entries, requested_by).await)
            }
            QueryKind::Catalog => {
                let queries = self.expand_catalog(query).await?;
                Ok(self.resolve_batch(queries, requested_by).await)
            }
        }
    }

    async fn expand_catalog(&self, url: &str) -> Result<Vec<String>, PlayerError> {
        let Some(catalog) = self.catalog.as_ref() else {
            return Err(ExpansionError::UnsupportedLink(url.to_string()).into());
        };

        let error = match catalog.expand(url, self.settings.max_batch).await {
            Ok(items) if !items.is_empty() => {
                info!("🎧 Catálogo expandido a {} búsquedas", items.len());
                return Ok(items.iter().map(|item| search_for_catalog_item(item)).collect());
            }
            Ok(_) => ExpansionError::Request("el catálogo no devolvió canciones".to_string()),
            Err(e) => e,
        };

        warn!("⚠️ Falló la expansión de {}: {} (probando con el título de la página)", url, error);
        match catalog.scrape_title(url).await {
            Some(title) => Ok(vec![search_for_catalog_item(&title)]),
            None => Err(error.into()),
        }
    }

    /// Resolves queries concurrently (bounded) and returns them in input order.
    ///
    /// Every item carries its own timeout; a slow or failing item never
    /// cancels its siblings.
    pub async fn resolve_batch(&self, queries: Vec<String>, requested_by: UserId) -> BatchOutcome {
        let results: Vec<(usize, String, Result<Track, ResolutionError>)> = stream::iter(
            queries.into_iter().take(self.settings.max_batch).enumerate(),
        )
        .map(|(index, query)| async move {
            let result = self.resolve_one(&query, requested_by).await;
            (index, query, result)
        })
        .buffered(self.settings.concurrency.max(1))
        .collect()
        .await;

        let mut outcome = BatchOutcome::default();
        for (index, query, result) in results {
            match result {
                Ok(track) => outcome.tracks.push(track),
                Err(error) => {
                    let kind = if error.retryable() { "transitorio" } else { "definitivo" };
                    debug!("❌ Entrada {} ('{}') falló ({}): {}", index + 1, query, kind, error);
                    outcome.failures.push(BatchFailure { index, query, error });
                }
            }
        }

        if !outcome.failures.is_empty() {
            warn!(
                "⚠️ Lote resuelto con {} éxitos y {} fallos",
                outcome.tracks.len(),
                outcome.failures.len()
            );
        }

        outcome
    }

    pub async fn resolve_one(&self, query: &str, requested_by: UserId) -> Result<Track, ResolutionError> {
        match tokio::time::timeout(self.settings.timeout, self.media.resolve_one(query, requested_by)).await {
            Ok(result) => result,
            Err(_) => Err(ResolutionError::Timeout {
                query: query.to_string(),
                after: self.settings.timeout,
            }),
        }
    }

    /// Resolves a track's source query again for loop replay.
    pub async fn refresh(&self, track: &Track) -> Result<Track, ResolutionError> {
        self.resolve_one(track.source_query(), track.requested_by()).await
    }
}

fn search_for_catalog_item(item: &str) -> String {
    format!("{} audio", item.trim())
}
