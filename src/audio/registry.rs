use serenity::model::id::{ChannelId, GuildId, UserId};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::{
    audio::{
        player::{GuildCommand, GuildHandle, GuildMap, GuildPlayer, QueueSnapshot},
        queue::LoopMode,
        PlayerDeps,
    },
    error::PlayerError,
};

/// What a successful play request did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnqueueReceipt {
    pub added: usize,
    pub failed: usize,
    pub first_title: String,
    pub started_playback: bool,
}

/// Process-wide entry point for playback commands.
///
/// Guild players are spawned on first use and remove themselves from the
/// map when they shut down (leave, idle or alone timeout). Each spawn gets a
/// new epoch so a player that is shutting down can never evict its
/// replacement.
pub struct GuildRegistry {
    guilds: Arc<GuildMap>,
    deps: Arc<PlayerDeps>,
    epochs: AtomicU64,
}

impl GuildRegistry {
    pub fn new(deps: PlayerDeps) -> Self {
        Self {
            guilds: Arc::new(GuildMap::new()),
            deps: Arc::new(deps),
            epochs: AtomicU64::new(0),
        }
    }

    pub fn is_active(&self, guild_id: GuildId) -> bool {
        self.guilds.contains_key(&guild_id)
    }

    pub fn active_guilds(&self) -> usize {
        self.guilds.len()
    }

    /// Resolves `query` and appends the result to the guild's queue.
    ///
    /// Resolution happens here, outside the guild player, so a long playlist
    /// never delays skips or pauses. Nothing is created for the guild unless
    /// at least one track resolved.
    pub async fn enqueue(
        &self,
        guild_id: GuildId,
        requested_by: UserId,
        voice_channel: Option<ChannelId>,
        query: &str,
    ) -> Result<EnqueueReceipt, PlayerError> {
        let channel_id = voice_channel.ok_or(PlayerError::NotInVoice)?;
        self.post(guild_id, GuildCommand::Touch);

        let outcome = self.deps.resolver.resolve_request(query, requested_by).await?;
        let failed = outcome.failures.len();
        let Some(first_title) = outcome.tracks.first().map(|t| t.title().to_string()) else {
            return Err(PlayerError::NothingResolved { failed });
        };

        let tracks = outcome.tracks;
        let ack = self
            .request(guild_id, true, |reply| GuildCommand::Enqueue {
                tracks: tracks.clone(),
                channel_id,
                reply,
            })
            .await
            .ok_or(PlayerError::Unavailable)??;

        info!(
            "➕ {} tracks añadidos en guild {} ({} fallidos)",
            ack.added, guild_id, failed
        );

        Ok(EnqueueReceipt {
            added: ack.added,
            failed,
            first_title,
            started_playback: ack.started_playback,
        })
    }

    /// Skips the track that is live right now.
    ///
    /// If that track ends on its own before the player reads the command,
    /// the skip is spent and the next track keeps playing.
    pub async fn skip(&self, guild_id: GuildId) -> Result<(), PlayerError> {
        let play_id = self.guilds.get(&guild_id).and_then(|entry| entry.value().now_playing());
        self.request(guild_id, false, |reply| GuildCommand::Skip { play_id, reply })
            .await
            .unwrap_or(Err(PlayerError::NothingPlaying))
    }

    pub async fn pause(&self, guild_id: GuildId) -> Result<(), PlayerError> {
        self.request(guild_id, false, |reply| GuildCommand::Pause { reply })
            .await
            .unwrap_or(Err(PlayerError::NothingPlaying))
    }

    pub async fn resume(&self, guild_id: GuildId) -> Result<(), PlayerError> {
        self.request(guild_id, false, |reply| GuildCommand::Resume { reply })
            .await
            .unwrap_or(Err(PlayerError::NothingPaused))
    }

    /// Vacía la cola, corta el audio y quita la repetición.
    pub async fn stop(&self, guild_id: GuildId) {
        self.request(guild_id, false, |reply| GuildCommand::Stop { reply })
            .await;
    }

    pub async fn clear(&self, guild_id: GuildId) -> usize {
        self.request(guild_id, false, |reply| GuildCommand::Clear { reply })
            .await
            .unwrap_or(0)
    }

    pub async fn leave(&self, guild_id: GuildId) -> Result<(), PlayerError> {
        if let Some(result) = self
            .request(guild_id, false, |reply| GuildCommand::Leave { reply })
            .await
        {
            return result;
        }

        // Sin reproductor, pero puede quedar una conexión huérfana
        let voice = &self.deps.voice;
        if voice.current_channel(guild_id).await.is_none() {
            return Err(PlayerError::NotConnected);
        }
        voice.disconnect(guild_id).await?;
        Ok(())
    }

    /// Solo para reproductores existentes; un guild sin actividad no se crea aquí.
    pub async fn set_loop_mode(&self, guild_id: GuildId, mode: LoopMode) -> Result<(), PlayerError> {
        self.request(guild_id, false, |reply| GuildCommand::SetLoopMode { mode, reply })
            .await
            .ok_or(PlayerError::NotConnected)
    }

    /// `percent` por encima de 100 se recorta.
    pub async fn set_volume(&self, guild_id: GuildId, percent: u8) -> Result<(), PlayerError> {
        self.request(guild_id, false, |reply| GuildCommand::SetVolume { percent, reply })
            .await
            .unwrap_or(Err(PlayerError::NothingPlaying))
    }

    pub async fn snapshot(&self, guild_id: GuildId) -> QueueSnapshot {
        match self
            .request(guild_id, false, |reply| GuildCommand::Snapshot { reply })
            .await
        {
            Some(snapshot) => snapshot,
            None => QueueSnapshot {
                volume: self.deps.settings.default_volume,
                ..QueueSnapshot::default()
            },
        }
    }

    /// Someone joined or left a voice channel in this guild.
    pub fn presence_changed(&self, guild_id: GuildId) {
        self.post(guild_id, GuildCommand::PresenceChanged);
    }

    /// The bot lost its voice connection without us asking for it.
    pub fn detach(&self, guild_id: GuildId) {
        self.post(guild_id, GuildCommand::Detach);
    }

    /// Envía sin esperar respuesta, solo si el guild ya tiene reproductor.
    pub(crate) fn post(&self, guild_id: GuildId, command: GuildCommand) {
        let Some(handle) = self.guilds.get(&guild_id).map(|entry| entry.value().clone()) else {
            return;
        };
        if handle.mailbox.send(command).is_err() {
            self.evict(guild_id, handle.epoch);
        }
    }

    /// Sends a command and waits for its reply.
    ///
    /// A player that is gone (its mailbox closed before replying) is evicted
    /// and the command retried once, on a fresh player when `spawn` is set.
    /// Returns `None` when no player could answer.
    async fn request<T>(
        &self,
        guild_id: GuildId,
        spawn: bool,
        make: impl Fn(oneshot::Sender<T>) -> GuildCommand,
    ) -> Option<T> {
        for attempt in 0..2 {
            let handle = if spawn {
                self.get_or_spawn(guild_id)
            } else {
                self.guilds.get(&guild_id)?.value().clone()
            };

            let (reply, response) = oneshot::channel();
            if handle.mailbox.send(make(reply)).is_ok() {
                if let Ok(value) = response.await {
                    return Some(value);
                }
            }

            debug!("Reproductor de guild {} cerrado (intento {}), reintentando", guild_id, attempt + 1);
            self.evict(guild_id, handle.epoch);
        }

        warn!("⚠️ Ningún reproductor respondió en guild {}", guild_id);
        None
    }

    fn get_or_spawn(&self, guild_id: GuildId) -> GuildHandle {
        self.guilds
            .entry(guild_id)
            .or_insert_with(|| {
                let epoch = self.epochs.fetch_add(1, Ordering::Relaxed) + 1;
                info!("🆕 Creando reproductor para guild {}", guild_id);
                GuildPlayer::spawn(guild_id, epoch, self.deps.clone(), self.guilds.clone())
            })
            .value()
            .clone()
    }

    fn evict(&self, guild_id: GuildId, epoch: u64) {
        self.guilds.remove_if(&guild_id, |_, handle| handle.epoch == epoch);
    }
}
