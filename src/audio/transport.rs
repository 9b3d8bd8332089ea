use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serenity::model::id::GuildId;
use songbird::{
    input::{HttpRequest, Input, YoutubeDl},
    tracks::{PlayMode, TrackHandle},
    Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::{audio::player::GuildCommand, audio::queue::Track, error::TransportError};

/// Audio output for a guild's voice connection.
///
/// `play` hands over a [`PlaybackCompletion`] that must be fired exactly once
/// when the track ends, errors, or is stopped. Everything else is a plain
/// control call; none of these methods may call back into the player.
#[async_trait]
pub trait AudioTransport: Send + Sync {
    async fn play(
        &self,
        guild_id: GuildId,
        track: &Track,
        volume: f32,
        on_finished: PlaybackCompletion,
    ) -> Result<(), TransportError>;

    async fn stop(&self, guild_id: GuildId) -> Result<(), TransportError>;

    async fn pause(&self, guild_id: GuildId) -> Result<(), TransportError>;

    async fn resume(&self, guild_id: GuildId) -> Result<(), TransportError>;

    async fn is_playing(&self, guild_id: GuildId) -> bool;

    async fn is_paused(&self, guild_id: GuildId) -> bool;

    async fn volume(&self, guild_id: GuildId) -> Option<f32>;

    async fn set_volume(&self, guild_id: GuildId, volume: f32) -> Result<(), TransportError>;
}

/// One-shot "track finished" signal, routed back to the guild's mailbox.
///
/// Carries the play id it was issued for; the player ignores completions
/// for any play other than the one it is waiting on.
#[derive(Debug)]
pub struct PlaybackCompletion {
    guild_id: GuildId,
    play_id: u64,
    mailbox: mpsc::UnboundedSender<GuildCommand>,
}

impl PlaybackCompletion {
    pub(crate) fn new(guild_id: GuildId, play_id: u64, mailbox: mpsc::UnboundedSender<GuildCommand>) -> Self {
        Self {
            guild_id,
            play_id,
            mailbox,
        }
    }

    pub fn play_id(&self) -> u64 {
        self.play_id
    }

    pub fn finished(self, error: Option<String>) {
        let message = GuildCommand::TrackEnded {
            play_id: self.play_id,
            error,
        };
        if self.mailbox.send(message).is_err() {
            debug!("🔇 Reproductor de guild {} ya cerrado, se descarta el fin de track", self.guild_id);
        }
    }
}

/// [`AudioTransport`] backed by songbird calls.
pub struct SongbirdTransport {
    songbird: Arc<Songbird>,
    http: reqwest::Client,
    handles: DashMap<GuildId, TrackHandle>,
}

impl SongbirdTransport {
    pub fn new(songbird: Arc<Songbird>) -> Self {
        Self {
            songbird,
            http: reqwest::Client::new(),
            handles: DashMap::new(),
        }
    }

    /// Las URLs de stream caducan: si hay página se deja que yt-dlp la
    /// resuelva al empezar a sonar; el stream directo solo para enlaces
    /// de archivo.
    fn input_for(&self, track: &Track) -> Input {
        match (track.page_url(), track.stream_url()) {
            (Some(page), _) => YoutubeDl::new(self.http.clone(), page.to_string()).into(),
            (None, Some(stream)) => HttpRequest::new(self.http.clone(), stream.to_string()).into(),
            (None, None) => YoutubeDl::new(self.http.clone(), track.source_query().to_string()).into(),
        }
    }

    fn handle(&self, guild_id: GuildId) -> Result<TrackHandle, TransportError> {
        self.handles
            .get(&guild_id)
            .map(|entry| entry.value().clone())
            .ok_or(TransportError::Idle)
    }

    async fn play_mode(&self, guild_id: GuildId) -> Option<PlayMode> {
        let handle = self.handles.get(&guild_id).map(|entry| entry.value().clone())?;
        handle.get_info().await.ok().map(|state| state.playing)
    }
}

#[async_trait]
impl AudioTransport for SongbirdTransport {
    async fn play(
        &self,
        guild_id: GuildId,
        track: &Track,
        volume: f32,
        on_finished: PlaybackCompletion,
    ) -> Result<(), TransportError> {
        let call = self.songbird.get(guild_id).ok_or(TransportError::NotConnected)?;
        let input = self.input_for(track);

        let handle = {
            let mut call = call.lock().await;
            call.play_input(input)
        };

        if let Err(e) = handle.set_volume(volume) {
            debug!("No se pudo ajustar el volumen inicial: {:?}", e);
        }

        // End y Error comparten la misma señal: solo el primero la dispara
        let completion = Arc::new(Mutex::new(Some(on_finished)));
        for event in [TrackEvent::End, TrackEvent::Error] {
            let notifier = TrackCompletionHandler {
                guild_id,
                completion: completion.clone(),
            };
            if let Err(e) = handle.add_event(Event::Track(event), notifier) {
                let _ = handle.stop();
                return Err(TransportError::Start(format!("no se pudo registrar el evento {:?}: {}", event, e)));
            }
        }

        info!("▶️ Enviado a songbird: {}", track.title());
        self.handles.insert(guild_id, handle);
        Ok(())
    }

    async fn stop(&self, guild_id: GuildId) -> Result<(), TransportError> {
        let (_, handle) = self.handles.remove(&guild_id).ok_or(TransportError::Idle)?;
        handle
            .stop()
            .map_err(|e| TransportError::Control(e.to_string()))
    }

    async fn pause(&self, guild_id: GuildId) -> Result<(), TransportError> {
        self.handle(guild_id)?
            .pause()
            .map_err(|e| TransportError::Control(e.to_string()))
    }

    async fn resume(&self, guild_id: GuildId) -> Result<(), TransportError> {
        self.handle(guild_id)?
            .play()
            .map_err(|e| TransportError::Control(e.to_string()))
    }

    async fn is_playing(&self, guild_id: GuildId) -> bool {
        matches!(self.play_mode(guild_id).await, Some(PlayMode::Play))
    }

    async fn is_paused(&self, guild_id: GuildId) -> bool {
        matches!(self.play_mode(guild_id).await, Some(PlayMode::Pause))
    }

    async fn volume(&self, guild_id: GuildId) -> Option<f32> {
        let handle = self.handles.get(&guild_id).map(|entry| entry.value().clone())?;
        handle.get_info().await.ok().map(|state| state.volume)
    }

    async fn set_volume(&self, guild_id: GuildId, volume: f32) -> Result<(), TransportError> {
        self.handle(guild_id)?
            .set_volume(volume)
            .map_err(|e| TransportError::Control(e.to_string()))
    }
}

/// Handler de songbird que convierte End/Error en un [`PlaybackCompletion`].
struct TrackCompletionHandler {
    guild_id: GuildId,
    completion: Arc<Mutex<Option<PlaybackCompletion>>>,
}

#[async_trait]
impl VoiceEventHandler for TrackCompletionHandler {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let mut failure = None;
        if let EventContext::Track(track_list) = ctx {
            for (state, _handle) in *track_list {
                if let PlayMode::Errored(e) = &state.playing {
                    error!("❌ Error en track para guild {}: {:?}", self.guild_id, e);
                    failure = Some(format!("{:?}", e));
                }
            }
        }

        if let Some(completion) = self.completion.lock().take() {
            debug!("🏁 Fin del play {} en guild {}", completion.play_id(), self.guild_id);
            completion.finished(failure);
        }

        Some(Event::Cancel)
    }
}
