use chrono::{DateTime, Utc};
use serenity::model::id::UserId;
use std::{collections::VecDeque, fmt, str::FromStr, time::Duration};
use tracing::{debug, info, warn};

use crate::sources::ResolverAdapter;

/// A resolved, queueable unit of audio.
///
/// Tracks are immutable. Loop replay never reuses a track's stream URL:
/// it resolves `source_query` again and gets a brand new `Track`.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    title: String,
    source_query: String,
    page_url: Option<String>,
    stream_url: Option<String>,
    duration: Option<Duration>,
    requested_by: UserId,
    requested_at: DateTime<Utc>,
}

impl Track {
    pub fn new(title: impl Into<String>, source_query: impl Into<String>, requested_by: UserId) -> Self {
        Self {
            title: title.into(),
            source_query: source_query.into(),
            page_url: None,
            stream_url: None,
            duration: None,
            requested_by,
            requested_at: Utc::now(),
        }
    }

    pub fn with_page_url(mut self, url: impl Into<String>) -> Self {
        self.page_url = Some(url.into());
        self
    }

    pub fn with_stream_url(mut self, url: impl Into<String>) -> Self {
        self.stream_url = Some(url.into());
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Input originally handed to the resolver.
    pub fn source_query(&self) -> &str {
        &self.source_query
    }

    pub fn page_url(&self) -> Option<&str> {
        self.page_url.as_deref()
    }

    pub fn stream_url(&self) -> Option<&str> {
        self.stream_url.as_deref()
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    pub fn requested_by(&self) -> UserId {
        self.requested_by
    }

    pub fn requested_at(&self) -> DateTime<Utc> {
        self.requested_at
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopMode {
    #[default]
    Off,
    Track,
    Queue,
}

impl LoopMode {
    /// Off → Track → Queue → Off
    pub fn cycle(self) -> Self {
        match self {
            LoopMode::Off => LoopMode::Track,
            LoopMode::Track => LoopMode::Queue,
            LoopMode::Queue => LoopMode::Off,
        }
    }

    /// Sufijo para los mensajes de "reproduciendo ahora".
    pub fn badge(self) -> &'static str {
        match self {
            LoopMode::Off => "",
            LoopMode::Track => " 🔂",
            LoopMode::Queue => " 🔁",
        }
    }
}

impl fmt::Display for LoopMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LoopMode::Off => "desactivado",
            LoopMode::Track => "canción",
            LoopMode::Queue => "cola",
        };
        f.write_str(label)
    }
}

impl FromStr for LoopMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "off" | "none" | "disable" | "no" => Ok(LoopMode::Off),
            "track" | "song" | "single" | "one" | "t" => Ok(LoopMode::Track),
            "queue" | "all" | "q" => Ok(LoopMode::Queue),
            other => Err(format!("Modo de repetición desconocido: `{}`", other)),
        }
    }
}

/// Pending tracks, the current slot and the loop mode of one guild.
#[derive(Debug, Default)]
pub struct GuildQueue {
    items: VecDeque<Track>,
    current: Option<Track>,
    loop_mode: LoopMode,
}

impl GuildQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Añade tracks al final respetando el orden recibido.
    pub fn enqueue(&mut self, tracks: impl IntoIterator<Item = Track>) -> usize {
        let before = self.items.len();
        self.items.extend(tracks);
        let added = self.items.len() - before;
        debug!("📝 {} tracks añadidos a la cola ({} en espera)", added, self.items.len());
        added
    }

    pub fn dequeue_next(&mut self) -> Option<Track> {
        self.items.pop_front()
    }

    /// Vacía la cola sin tocar el track actual.
    pub fn clear(&mut self) -> usize {
        let removed = self.items.len();
        self.items.clear();
        removed
    }

    pub fn current(&self) -> Option<&Track> {
        self.current.as_ref()
    }

    pub fn set_current(&mut self, track: Track) {
        self.current = Some(track);
    }

    pub fn take_current(&mut self) -> Option<Track> {
        self.current.take()
    }

    pub fn loop_mode(&self) -> LoopMode {
        self.loop_mode
    }

    pub fn set_loop_mode(&mut self, mode: LoopMode) {
        if self.loop_mode != mode {
            info!("🔁 Modo de repetición: {} → {}", self.loop_mode, mode);
        }
        self.loop_mode = mode;
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn upcoming(&self) -> impl Iterator<Item = &Track> {
        self.items.iter()
    }

    /// Retires the current track and picks the next one per the loop mode.
    ///
    /// - `Off`: the head of the queue.
    /// - `Track`: a fresh resolution of the retiring track's source query;
    ///   falls back to the head of the queue if that fails.
    /// - `Queue`: the retiring track is re-resolved and appended to the tail,
    ///   then the head is returned. A failed re-resolution only drops the
    ///   re-append.
    ///
    /// `current` is always empty on return; the caller sets it once the
    /// transport actually accepted the track.
    pub async fn next_track(&mut self, resolver: &ResolverAdapter) -> Option<Track> {
        let retiring = self.current.take();

        match (self.loop_mode, retiring) {
            (LoopMode::Track, Some(retiring)) => match resolver.refresh(&retiring).await {
                Ok(fresh) => {
                    debug!("🔂 Repitiendo: {}", fresh.title());
                    return Some(fresh);
                }
                Err(e) => {
                    warn!("⚠️ No se pudo repetir '{}': {} (sigo con la cola)", retiring.title(), e);
                }
            },
            (LoopMode::Queue, Some(retiring)) => match resolver.refresh(&retiring).await {
                Ok(fresh) => {
                    debug!("🔁 '{}' vuelve al final de la cola", fresh.title());
                    self.items.push_back(fresh);
                }
                Err(e) => {
                    warn!("⚠️ '{}' sale de la rotación: {}", retiring.title(), e);
                }
            },
            _ => {}
        }

        self.dequeue_next()
    }
}
