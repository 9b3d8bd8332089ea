use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::{
    audio::{
        idle::{IdleTimers, TimerKind},
        queue::{GuildQueue, LoopMode, Track},
        transport::PlaybackCompletion,
        PlayerDeps,
    },
    error::PlayerError,
    ui::messages,
};

pub(crate) type Reply<T> = oneshot::Sender<T>;

/// Everything a guild player reacts to, in mailbox order.
pub(crate) enum GuildCommand {
    Enqueue {
        tracks: Vec<Track>,
        channel_id: ChannelId,
        reply: Reply<Result<EnqueueAck, PlayerError>>,
    },
    /// A play request started resolving; restart the idle countdown.
    Touch,
    /// `play_id` is the play that was live when the user asked; if it has
    /// already ended the skip is spent.
    Skip {
        play_id: Option<u64>,
        reply: Reply<Result<(), PlayerError>>,
    },
    Pause {
        reply: Reply<Result<(), PlayerError>>,
    },
    Resume {
        reply: Reply<Result<(), PlayerError>>,
    },
    Stop {
        reply: Reply<()>,
    },
    Clear {
        reply: Reply<usize>,
    },
    SetLoopMode {
        mode: LoopMode,
        reply: Reply<()>,
    },
    SetVolume {
        percent: u8,
        reply: Reply<Result<(), PlayerError>>,
    },
    Snapshot {
        reply: Reply<QueueSnapshot>,
    },
    Leave {
        reply: Reply<Result<(), PlayerError>>,
    },
    TrackEnded {
        play_id: u64,
        error: Option<String>,
    },
    IdleElapsed {
        token: u64,
    },
    AloneElapsed {
        token: u64,
    },
    PresenceChanged,
    /// The voice connection was dropped from outside (kick, channel deleted).
    Detach,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Idle,
    Playing,
    Paused,
    /// The transport was told to stop; waiting for its completion.
    Advancing,
}

/// Read-only view of a guild's playback, for display.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueueSnapshot {
    pub current: Option<Track>,
    pub upcoming: Vec<Track>,
    pub loop_mode: LoopMode,
    pub state: PlaybackState,
    pub volume: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EnqueueAck {
    pub added: usize,
    pub started_playback: bool,
}

#[derive(Clone)]
pub(crate) struct GuildHandle {
    pub epoch: u64,
    pub mailbox: mpsc::UnboundedSender<GuildCommand>,
    now_playing: Arc<AtomicU64>,
}

impl GuildHandle {
    /// Play id of the live track as last published by the player.
    pub(crate) fn now_playing(&self) -> Option<u64> {
        match self.now_playing.load(Ordering::Acquire) {
            0 => None,
            play_id => Some(play_id),
        }
    }
}

pub(crate) type GuildMap = DashMap<GuildId, GuildHandle>;

enum Flow {
    Continue,
    Exit,
}

/// Owner of one guild's playback state.
///
/// Runs as its own task and is the only code that ever touches the guild's
/// queue, driver state or timers. Transport completions are tagged with the
/// play id they belong to; only the one matching `awaiting` is acted on.
pub(crate) struct GuildPlayer {
    guild_id: GuildId,
    epoch: u64,
    deps: Arc<PlayerDeps>,
    guilds: Arc<GuildMap>,
    mailbox: mpsc::UnboundedSender<GuildCommand>,
    queue: GuildQueue,
    state: PlaybackState,
    volume: f32,
    plays_started: u64,
    awaiting: Option<u64>,
    now_playing: Arc<AtomicU64>,
    consecutive_failures: u32,
    timers: IdleTimers,
}

impl GuildPlayer {
    pub(crate) fn spawn(guild_id: GuildId, epoch: u64, deps: Arc<PlayerDeps>, guilds: Arc<GuildMap>) -> GuildHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let settings = &deps.settings;
        let timers = IdleTimers::new(guild_id, settings.idle_timeout, settings.alone_timeout);
        let now_playing = Arc::new(AtomicU64::new(0));

        let player = Self {
            guild_id,
            epoch,
            volume: settings.default_volume,
            deps: deps.clone(),
            guilds,
            mailbox: tx.clone(),
            queue: GuildQueue::new(),
            state: PlaybackState::Idle,
            plays_started: 0,
            awaiting: None,
            now_playing: now_playing.clone(),
            consecutive_failures: 0,
            timers,
        };
        tokio::spawn(player.run(rx));

        GuildHandle {
            epoch,
            mailbox: tx,
            now_playing,
        }
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<GuildCommand>) {
        debug!("🎛️ Reproductor iniciado para guild {} (epoch {})", self.guild_id, self.epoch);
        self.timers.arm(TimerKind::Idle, &self.mailbox);

        while let Some(command) = rx.recv().await {
            if let Flow::Exit = self.handle(command).await {
                break;
            }
        }

        let (guild_id, epoch) = (self.guild_id, self.epoch);
        self.guilds.remove_if(&guild_id, |_, handle| handle.epoch == epoch);
        debug!("🎛️ Reproductor finalizado para guild {}", guild_id);
    }

    async fn handle(&mut self, command: GuildCommand) -> Flow {
        match command {
            GuildCommand::Enqueue {
                tracks,
                channel_id,
                reply,
            } => {
                let result = self.enqueue(tracks, channel_id).await;
                let _ = reply.send(result);
            }
            GuildCommand::Touch => {
                if self.state == PlaybackState::Idle {
                    self.timers.arm(TimerKind::Idle, &self.mailbox);
                }
            }
            GuildCommand::Skip { play_id, reply } => {
                let result = self.skip(play_id).await;
                let _ = reply.send(result);
            }
            GuildCommand::Pause { reply } => {
                let result = self.pause().await;
                let _ = reply.send(result);
            }
            GuildCommand::Resume { reply } => {
                let result = self.resume().await;
                let _ = reply.send(result);
            }
            GuildCommand::Stop { reply } => {
                self.stop().await;
                let _ = reply.send(());
            }
            GuildCommand::Clear { reply } => {
                let removed = self.queue.clear();
                info!("🗑️ {} tracks eliminados de la cola en guild {}", removed, self.guild_id);
                let _ = reply.send(removed);
            }
            GuildCommand::SetLoopMode { mode, reply } => {
                self.queue.set_loop_mode(mode);
                let _ = reply.send(());
            }
            GuildCommand::SetVolume { percent, reply } => {
                let result = self.set_volume(percent).await;
                let _ = reply.send(result);
            }
            GuildCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            GuildCommand::Leave { reply } => {
                let result = self.leave().await;
                let _ = reply.send(result);
                return Flow::Exit;
            }
            GuildCommand::TrackEnded { play_id, error } => {
                self.on_track_ended(play_id, error).await;
            }
            GuildCommand::IdleElapsed { token } => {
                return self.on_idle_elapsed(token).await;
            }
            GuildCommand::AloneElapsed { token } => {
                return self.on_alone_elapsed(token).await;
            }
            GuildCommand::PresenceChanged => {
                self.on_presence_changed().await;
            }
            GuildCommand::Detach => {
                // Evento tardío de una conexión anterior; la actual sigue viva
                if self.in_voice().await {
                    debug!("Detach obsoleto ignorado en guild {}", self.guild_id);
                    return Flow::Continue;
                }
                info!("🔌 Conexión de voz perdida en guild {}, limpiando estado", self.guild_id);
                self.teardown().await;
                return Flow::Exit;
            }
        }

        Flow::Continue
    }

    async fn enqueue(&mut self, tracks: Vec<Track>, channel_id: ChannelId) -> Result<EnqueueAck, PlayerError> {
        self.ensure_connected(channel_id).await?;
        self.timers.disarm(TimerKind::Idle);

        let added = self.queue.enqueue(tracks);
        let started_playback = self.state == PlaybackState::Idle;
        if started_playback {
            self.advance().await;
        }

        Ok(EnqueueAck {
            added,
            started_playback,
        })
    }

    async fn ensure_connected(&mut self, channel_id: ChannelId) -> Result<(), PlayerError> {
        let voice = &self.deps.voice;
        match voice.current_channel(self.guild_id).await {
            None => {
                voice.connect(self.guild_id, channel_id).await?;
                self.on_presence_changed().await;
            }
            // Solo se cambia de canal si no hay nada sonando para otros
            Some(current) if current != channel_id && self.state == PlaybackState::Idle => {
                voice.move_to(self.guild_id, channel_id).await?;
                self.on_presence_changed().await;
            }
            Some(_) => {}
        }
        Ok(())
    }

    /// Retires the current track and starts the next one per loop policy.
    ///
    /// Start failures are reported and skipped, up to the consecutive
    /// failure limit. Leaves the player `Playing` or `Idle`.
    async fn advance(&mut self) {
        self.state = PlaybackState::Advancing;
        self.set_awaiting(None);

        loop {
            let Some(track) = self.queue.next_track(&self.deps.resolver).await else {
                info!("📭 Cola terminada en guild {}", self.guild_id);
                self.enter_idle();
                return;
            };

            self.plays_started += 1;
            let play_id = self.plays_started;
            let completion = PlaybackCompletion::new(self.guild_id, play_id, self.mailbox.clone());

            match self
                .deps
                .transport
                .play(self.guild_id, &track, self.volume, completion)
                .await
            {
                Ok(()) => {
                    info!("🎵 Reproduciendo en guild {}: {}", self.guild_id, track.title());
                    self.notify(messages::now_playing(&track, self.queue.loop_mode()));
                    self.queue.set_current(track);
                    self.set_awaiting(Some(play_id));
                    self.state = PlaybackState::Playing;
                    self.timers.disarm(TimerKind::Idle);
                    return;
                }
                Err(e) => {
                    warn!("⚠️ No se pudo iniciar '{}' en guild {}: {}", track.title(), self.guild_id, e);
                    self.notify(messages::start_failed(&track, &e));
                    if self.record_failure() {
                        return;
                    }
                }
            }
        }
    }

    /// Cuenta un fallo; al llegar al límite vacía la cola y pasa a idle.
    fn record_failure(&mut self) -> bool {
        self.consecutive_failures += 1;
        if self.consecutive_failures < self.deps.settings.max_consecutive_failures {
            return false;
        }

        error!(
            "❌ {} fallos seguidos en guild {}, deteniendo la reproducción",
            self.consecutive_failures, self.guild_id
        );
        self.notify(messages::gave_up(self.consecutive_failures));
        self.queue.clear();
        self.enter_idle();
        true
    }

    fn enter_idle(&mut self) {
        self.queue.take_current();
        self.set_awaiting(None);
        self.consecutive_failures = 0;
        self.state = PlaybackState::Idle;
        self.timers.arm(TimerKind::Idle, &self.mailbox);
    }

    async fn on_track_ended(&mut self, play_id: u64, error: Option<String>) {
        if self.awaiting != Some(play_id) {
            debug!("Fin de track obsoleto (play {}) ignorado en guild {}", play_id, self.guild_id);
            return;
        }
        self.set_awaiting(None);

        match error {
            Some(reason) => {
                let title = self.queue.current().map(|t| t.title().to_string()).unwrap_or_default();
                warn!("⚠️ Error de stream en guild {} ('{}'): {}", self.guild_id, title, reason);
                self.notify(messages::stream_failed(&title, &reason));
                if self.record_failure() {
                    return;
                }
            }
            None => self.consecutive_failures = 0,
        }

        self.advance().await;
    }

    async fn skip(&mut self, play_id: Option<u64>) -> Result<(), PlayerError> {
        match self.state {
            PlaybackState::Playing | PlaybackState::Paused => {
                // El track que el usuario quería saltar ya terminó solo
                if play_id.is_some_and(|id| self.awaiting != Some(id)) {
                    debug!("Skip de un track ya terminado ignorado en guild {}", self.guild_id);
                    return Ok(());
                }
                match self.deps.transport.stop(self.guild_id).await {
                    // La completion del transporte hará el advance
                    Ok(()) => self.state = PlaybackState::Advancing,
                    Err(e) => {
                        warn!("⚠️ stop falló en guild {} ({}), avanzando directamente", self.guild_id, e);
                        self.set_awaiting(None);
                        self.advance().await;
                    }
                }
                info!("⏭️ Track saltado en guild {}", self.guild_id);
                Ok(())
            }
            PlaybackState::Advancing => Ok(()),
            PlaybackState::Idle => Err(PlayerError::NothingPlaying),
        }
    }

    async fn pause(&mut self) -> Result<(), PlayerError> {
        if self.state != PlaybackState::Playing {
            return Err(PlayerError::NothingPlaying);
        }
        self.deps.transport.pause(self.guild_id).await?;
        self.state = PlaybackState::Paused;
        info!("⏸️ Reproducción pausada en guild {}", self.guild_id);
        Ok(())
    }

    async fn resume(&mut self) -> Result<(), PlayerError> {
        if self.state != PlaybackState::Paused {
            return Err(PlayerError::NothingPaused);
        }
        self.deps.transport.resume(self.guild_id).await?;
        self.state = PlaybackState::Playing;
        info!("▶️ Reproducción reanudada en guild {}", self.guild_id);
        Ok(())
    }

    async fn stop(&mut self) {
        self.queue.clear();
        self.queue.set_loop_mode(LoopMode::Off);
        self.halt_transport().await;
        self.enter_idle();
        info!("⏹️ Reproducción detenida en guild {}", self.guild_id);
    }

    async fn set_volume(&mut self, percent: u8) -> Result<(), PlayerError> {
        if self.queue.current().is_none() {
            return Err(PlayerError::NothingPlaying);
        }
        let volume = f32::from(percent.min(100)) / 100.0;
        self.deps.transport.set_volume(self.guild_id, volume).await?;
        self.volume = volume;
        info!("🔊 Volumen en guild {}: {}%", self.guild_id, percent.min(100));
        Ok(())
    }

    fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            current: self.queue.current().cloned(),
            upcoming: self.queue.upcoming().cloned().collect(),
            loop_mode: self.queue.loop_mode(),
            state: self.state,
            volume: self.volume,
        }
    }

    async fn leave(&mut self) -> Result<(), PlayerError> {
        let connected = self.deps.voice.current_channel(self.guild_id).await.is_some();
        self.teardown().await;
        if !connected {
            return Err(PlayerError::NotConnected);
        }
        self.disconnect().await;
        Ok(())
    }

    async fn on_idle_elapsed(&mut self, token: u64) -> Flow {
        if !self.timers.take(TimerKind::Idle, token) {
            return Flow::Continue;
        }

        let transport = &self.deps.transport;
        let still_idle = self.state == PlaybackState::Idle
            && self.queue.is_empty()
            && self.queue.current().is_none()
            && !transport.is_playing(self.guild_id).await
            && !transport.is_paused(self.guild_id).await;
        if !still_idle {
            debug!("Timer de inactividad obsoleto en guild {}", self.guild_id);
            return Flow::Continue;
        }
        if !self.in_voice().await {
            return self.retire_quietly().await;
        }

        info!("💤 Guild {} inactivo, desconectando", self.guild_id);
        self.notify(messages::idle_farewell());
        self.teardown().await;
        self.disconnect().await;
        Flow::Exit
    }

    async fn on_alone_elapsed(&mut self, token: u64) -> Flow {
        if !self.timers.take(TimerKind::Alone, token) {
            return Flow::Continue;
        }
        if !self.in_voice().await {
            return self.retire_quietly().await;
        }
        if self.deps.voice.human_listeners(self.guild_id).await != Some(0) {
            debug!("Ya no estoy solo en guild {}", self.guild_id);
            return Flow::Continue;
        }

        info!("🚪 Solo en el canal de guild {}, desconectando", self.guild_id);
        self.notify(messages::alone_farewell());
        self.teardown().await;
        self.disconnect().await;
        Flow::Exit
    }

    async fn on_presence_changed(&mut self) {
        match self.deps.voice.human_listeners(self.guild_id).await {
            Some(0) => {
                if !self.timers.is_armed(TimerKind::Alone) {
                    info!("👀 Nadie escuchando en guild {}", self.guild_id);
                    self.timers.arm(TimerKind::Alone, &self.mailbox);
                }
            }
            Some(_) => {
                if self.timers.disarm(TimerKind::Alone) {
                    info!("👋 Alguien volvió al canal en guild {}", self.guild_id);
                }
            }
            None => {}
        }
    }

    fn set_awaiting(&mut self, play_id: Option<u64>) {
        self.awaiting = play_id;
        self.now_playing.store(play_id.unwrap_or(0), Ordering::Release);
    }

    async fn in_voice(&self) -> bool {
        self.deps.voice.current_channel(self.guild_id).await.is_some()
    }

    /// Cierra un reproductor que nunca llegó a un canal de voz: sin despedida ni disconnect.
    async fn retire_quietly(&mut self) -> Flow {
        debug!("Reproductor sin canal de voz en guild {}, cerrando", self.guild_id);
        self.teardown().await;
        Flow::Exit
    }

    /// Detiene el transporte e invalida la completion pendiente.
    async fn halt_transport(&mut self) {
        self.set_awaiting(None);
        if self.queue.current().is_some() || self.state != PlaybackState::Idle {
            if let Err(e) = self.deps.transport.stop(self.guild_id).await {
                debug!("stop en guild {}: {}", self.guild_id, e);
            }
        }
    }

    async fn teardown(&mut self) {
        self.halt_transport().await;
        self.queue.clear();
        self.queue.take_current();
        self.timers.cancel_all();
        self.state = PlaybackState::Idle;
    }

    async fn disconnect(&self) {
        if let Err(e) = self.deps.voice.disconnect(self.guild_id).await {
            error!("❌ Error al desconectar de guild {}: {}", self.guild_id, e);
        }
    }

    fn notify(&self, message: String) {
        self.deps.notifier.notify(self.guild_id, message);
    }
}
