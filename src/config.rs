use anyhow::{Context, Result};
use std::{str::FromStr, time::Duration};

use crate::{audio::PlayerSettings, sources::ResolveSettings};

#[derive(Debug, Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub command_prefix: String,

    // Audio
    pub default_volume: f32,
    pub max_consecutive_failures: u32,

    // Resolución
    pub ytdlp_path: String,
    pub max_playlist_size: usize,
    pub resolve_concurrency: usize,
    pub resolve_timeout: Duration,
    pub playlist_timeout: Duration,

    // Inactividad
    pub idle_timeout: Duration,
    pub alone_timeout: Duration,

    // Spotify (opcional)
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// [`Config::load`] feeds it the process environment; tests feed it a map
    /// so they never touch global state. Missing keys fall back to
    /// [`Config::default`], except `DISCORD_TOKEN` which is required.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let config = Self {
            discord_token: var("DISCORD_TOKEN").context("DISCORD_TOKEN no está definido")?,
            command_prefix: var("COMMAND_PREFIX").unwrap_or(defaults.command_prefix),

            default_volume: parse_or(var("DEFAULT_VOLUME"), "DEFAULT_VOLUME", defaults.default_volume)?,
            max_consecutive_failures: parse_or(
                var("MAX_CONSECUTIVE_FAILURES"),
                "MAX_CONSECUTIVE_FAILURES",
                defaults.max_consecutive_failures,
            )?,

            ytdlp_path: var("YTDLP_PATH").unwrap_or(defaults.ytdlp_path),
            max_playlist_size: parse_or(var("MAX_PLAYLIST_SIZE"), "MAX_PLAYLIST_SIZE", defaults.max_playlist_size)?,
            resolve_concurrency: parse_or(
                var("RESOLVE_CONCURRENCY"),
                "RESOLVE_CONCURRENCY",
                defaults.resolve_concurrency,
            )?,
            resolve_timeout: duration_or(var("RESOLVE_TIMEOUT"), "RESOLVE_TIMEOUT", defaults.resolve_timeout)?,
            playlist_timeout: duration_or(var("PLAYLIST_TIMEOUT"), "PLAYLIST_TIMEOUT", defaults.playlist_timeout)?,

            idle_timeout: duration_or(var("IDLE_TIMEOUT"), "IDLE_TIMEOUT", defaults.idle_timeout)?,
            alone_timeout: duration_or(var("ALONE_TIMEOUT"), "ALONE_TIMEOUT", defaults.alone_timeout)?,

            spotify_client_id: var("SPOTIFY_CLIENT_ID"),
            spotify_client_secret: var("SPOTIFY_CLIENT_SECRET"),
        };

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Volume must be between 0.0 and 1.0
    /// - Playlist cap, resolver concurrency and failure limit must be > 0
    /// - Every timeout must be non-zero
    /// - Spotify credentials come in pairs
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.default_volume) {
            anyhow::bail!("Default volume must be between 0.0 and 1.0, got: {}", self.default_volume);
        }

        if self.command_prefix.trim().is_empty() {
            anyhow::bail!("Command prefix cannot be empty");
        }

        if self.max_playlist_size == 0 {
            anyhow::bail!("Max playlist size must be greater than 0");
        }

        if self.resolve_concurrency == 0 {
            anyhow::bail!("Resolve concurrency must be greater than 0");
        }

        if self.max_consecutive_failures == 0 {
            anyhow::bail!("Max consecutive failures must be greater than 0");
        }

        for (name, value) in [
            ("resolve timeout", self.resolve_timeout),
            ("playlist timeout", self.playlist_timeout),
            ("idle timeout", self.idle_timeout),
            ("alone timeout", self.alone_timeout),
        ] {
            if value.is_zero() {
                anyhow::bail!("The {} must be greater than zero", name);
            }
        }

        if self.spotify_client_id.is_some() != self.spotify_client_secret.is_some() {
            anyhow::bail!("SPOTIFY_CLIENT_ID and SPOTIFY_CLIENT_SECRET must be set together");
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Tokens and secrets are never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Commands: prefix '{}'\n  \
            Audio: {}% vol, gives up after {} failures\n  \
            Resolver: {} ({} parallel, {} max playlist, {} / {} timeouts)\n  \
            Idle: leaves after {} idle, {} alone\n  \
            Spotify: {}",
            self.command_prefix,
            (self.default_volume * 100.0) as u32,
            self.max_consecutive_failures,
            self.ytdlp_path,
            self.resolve_concurrency,
            self.max_playlist_size,
            humantime::format_duration(self.resolve_timeout),
            humantime::format_duration(self.playlist_timeout),
            humantime::format_duration(self.idle_timeout),
            humantime::format_duration(self.alone_timeout),
            if self.spotify_credentials().is_some() { "API" } else { "solo scraping" },
        )
    }

    pub fn spotify_credentials(&self) -> Option<(String, String)> {
        self.spotify_client_id
            .clone()
            .zip(self.spotify_client_secret.clone())
    }

    pub fn player_settings(&self) -> PlayerSettings {
        PlayerSettings {
            default_volume: self.default_volume,
            idle_timeout: self.idle_timeout,
            alone_timeout: self.alone_timeout,
            max_consecutive_failures: self.max_consecutive_failures,
        }
    }

    pub fn resolve_settings(&self) -> ResolveSettings {
        ResolveSettings {
            timeout: self.resolve_timeout,
            playlist_timeout: self.playlist_timeout,
            concurrency: self.resolve_concurrency,
            max_batch: self.max_playlist_size,
        }
    }
}

fn parse_or<T>(raw: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw {
        Some(value) => value
            .trim()
            .parse()
            .with_context(|| format!("{} tiene un valor inválido: {}", key, value)),
        None => Ok(default),
    }
}

fn duration_or(raw: Option<String>, key: &str, default: Duration) -> Result<Duration> {
    match raw {
        Some(value) => humantime::parse_duration(value.trim())
            .with_context(|| format!("{} no es una duración válida: {}", key, value)),
        None => Ok(default),
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (el token no tiene default)
            discord_token: String::new(),
            command_prefix: "!".to_string(),

            default_volume: 0.5,
            max_consecutive_failures: 3,

            ytdlp_path: "yt-dlp".to_string(),
            max_playlist_size: 50,
            resolve_concurrency: 4,
            resolve_timeout: Duration::from_secs(60),
            playlist_timeout: Duration::from_secs(120),

            idle_timeout: Duration::from_secs(180),
            alone_timeout: Duration::from_secs(60),

            spotify_client_id: None,
            spotify_client_secret: None,
        }
    }
}
