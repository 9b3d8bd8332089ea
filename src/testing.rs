//! In-memory collaborators for driving players and resolvers in tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::{
    collections::{HashMap, HashSet},
    ops::Range,
    sync::Arc,
    time::Duration,
};

use crate::{
    audio::{
        queue::Track,
        transport::{AudioTransport, PlaybackCompletion},
        voice::VoiceConnection,
        Notifier,
    },
    error::{ExpansionError, ResolutionError, Restriction, TransportError, VoiceError},
    sources::{CatalogExpander, MediaResolver, ResolveSettings, ResolverAdapter},
};

pub fn resolver_adapter(resolver: Arc<FakeResolver>) -> ResolverAdapter {
    ResolverAdapter::new(
        resolver,
        None,
        ResolveSettings {
            timeout: Duration::from_secs(5),
            ..ResolveSettings::default()
        },
    )
}

/// Resolves every query to a track titled after it.
///
/// Each resolution gets a distinct page URL so a replayed track can be told
/// apart from the one it replaced.
#[derive(Default)]
pub struct FakeResolver {
    latency_ms: Option<Range<u64>>,
    state: Mutex<ResolverState>,
}

#[derive(Default)]
struct ResolverState {
    failing: HashSet<String>,
    restricted: HashMap<String, Restriction>,
    delays: HashMap<String, Duration>,
    playlists: HashMap<String, Vec<String>>,
    calls: HashMap<String, usize>,
    issued: u64,
}

impl FakeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency_ms: Range<u64>) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }

    pub fn fail(&self, query: &str) {
        self.state.lock().failing.insert(query.to_string());
    }

    pub fn succeed(&self, query: &str) {
        self.state.lock().failing.remove(query);
    }

    pub fn restrict(&self, query: &str, reason: Restriction) {
        self.state.lock().restricted.insert(query.to_string(), reason);
    }

    pub fn delay(&self, query: &str, delay: Duration) {
        self.state.lock().delays.insert(query.to_string(), delay);
    }

    pub fn set_playlist(&self, url: &str, entries: &[&str]) {
        let entries = entries.iter().map(|e| e.to_string()).collect();
        self.state.lock().playlists.insert(url.to_string(), entries);
    }

    pub fn calls(&self, query: &str) -> usize {
        self.state.lock().calls.get(query).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.state.lock().calls.values().sum()
    }
}

#[async_trait]
impl MediaResolver for FakeResolver {
    async fn resolve_one(&self, query: &str, requested_by: UserId) -> Result<Track, ResolutionError> {
        let fixed = {
            let mut state = self.state.lock();
            *state.calls.entry(query.to_string()).or_default() += 1;
            let fixed = state.delays.get(query).copied();
            fixed
        };
        let delay = fixed.or_else(|| {
            self.latency_ms
                .clone()
                .map(|range| Duration::from_millis(fastrand::u64(range)))
        });

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        if let Some(reason) = state.restricted.get(query) {
            return Err(ResolutionError::Unavailable {
                query: query.to_string(),
                reason: *reason,
            });
        }
        if state.failing.contains(query) {
            return Err(ResolutionError::Failed {
                query: query.to_string(),
                reason: "fallo simulado".to_string(),
            });
        }

        state.issued += 1;
        Ok(Track::new(query, query, requested_by)
            .with_page_url(format!("https://media.test/{}?v={}", query, state.issued)))
    }

    async fn expand_playlist(&self, url: &str, limit: usize) -> Result<Vec<String>, ResolutionError> {
        self.state
            .lock()
            .playlists
            .get(url)
            .map(|entries| entries.iter().take(limit).cloned().collect())
            .ok_or_else(|| ResolutionError::NotFound(url.to_string()))
    }
}

/// Catalog whose links start with `catalog:`.
#[derive(Default)]
pub struct FakeCatalog {
    state: Mutex<CatalogState>,
}

#[derive(Default)]
struct CatalogState {
    items: Vec<String>,
    error: Option<ExpansionError>,
    scraped_title: Option<String>,
}

impl FakeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_items(&self, items: &[&str]) {
        self.state.lock().items = items.iter().map(|i| i.to_string()).collect();
    }

    pub fn set_error(&self, error: ExpansionError) {
        self.state.lock().error = Some(error);
    }

    pub fn set_scraped_title(&self, title: Option<&str>) {
        self.state.lock().scraped_title = title.map(str::to_string);
    }
}

#[async_trait]
impl CatalogExpander for FakeCatalog {
    fn is_catalog_link(&self, query: &str) -> bool {
        query.starts_with("catalog:")
    }

    async fn expand(&self, _url: &str, limit: usize) -> Result<Vec<String>, ExpansionError> {
        let state = self.state.lock();
        match &state.error {
            Some(error) => Err(error.clone()),
            None => Ok(state.items.iter().take(limit).cloned().collect()),
        }
    }

    async fn scrape_title(&self, _url: &str) -> Option<String> {
        self.state.lock().scraped_title.clone()
    }
}

struct ActivePlay {
    title: String,
    paused: bool,
    volume: f32,
    completion: PlaybackCompletion,
}

/// Transport that plays nothing; tests end tracks with [`FakeTransport::finish`].
#[derive(Default)]
pub struct FakeTransport {
    state: Mutex<TransportState>,
}

#[derive(Default)]
struct TransportState {
    active: HashMap<GuildId, ActivePlay>,
    played: Vec<String>,
    overlaps: usize,
    failing_starts: HashSet<String>,
    fail_stop: bool,
    orphaned: Vec<PlaybackCompletion>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Titles of every track that started, in order.
    pub fn played(&self) -> Vec<String> {
        self.state.lock().played.clone()
    }

    /// Times `play` was called while the guild already had a live track.
    pub fn overlaps(&self) -> usize {
        self.state.lock().overlaps
    }

    pub fn fail_start(&self, title: &str) {
        self.state.lock().failing_starts.insert(title.to_string());
    }

    /// Makes `stop` cut the audio but report an error and hold back the
    /// completion until [`FakeTransport::fire_orphaned`].
    pub fn fail_stop(&self, fail: bool) {
        self.state.lock().fail_stop = fail;
    }

    pub fn fire_orphaned(&self) {
        let orphaned = std::mem::take(&mut self.state.lock().orphaned);
        for completion in orphaned {
            completion.finished(None);
        }
    }

    /// Ends the guild's live track, as the audio driver would.
    pub fn finish(&self, guild_id: GuildId, error: Option<&str>) -> bool {
        let active = self.state.lock().active.remove(&guild_id);
        match active {
            Some(play) => {
                play.completion.finished(error.map(str::to_string));
                true
            }
            None => false,
        }
    }

    /// Ends the guild's live track but holds its completion back until
    /// [`FakeTransport::fire_orphaned`], like a driver event still in flight.
    pub fn end_silently(&self, guild_id: GuildId) -> bool {
        let mut state = self.state.lock();
        match state.active.remove(&guild_id) {
            Some(play) => {
                state.orphaned.push(play.completion);
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self, guild_id: GuildId) -> bool {
        self.state.lock().active.contains_key(&guild_id)
    }

    pub fn active_title(&self, guild_id: GuildId) -> Option<String> {
        self.state.lock().active.get(&guild_id).map(|play| play.title.clone())
    }

    pub fn volume_of(&self, guild_id: GuildId) -> Option<f32> {
        self.state.lock().active.get(&guild_id).map(|play| play.volume)
    }
}

#[async_trait]
impl AudioTransport for FakeTransport {
    async fn play(
        &self,
        guild_id: GuildId,
        track: &Track,
        volume: f32,
        on_finished: PlaybackCompletion,
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if state.failing_starts.contains(track.title()) {
            return Err(TransportError::Start("decoder rechazó la entrada".to_string()));
        }
        if state.active.contains_key(&guild_id) {
            state.overlaps += 1;
        }

        state.played.push(track.title().to_string());
        state.active.insert(
            guild_id,
            ActivePlay {
                title: track.title().to_string(),
                paused: false,
                volume,
                completion: on_finished,
            },
        );
        Ok(())
    }

    async fn stop(&self, guild_id: GuildId) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        let play = state.active.remove(&guild_id).ok_or(TransportError::Idle)?;
        if state.fail_stop {
            state.orphaned.push(play.completion);
            return Err(TransportError::Control("stop simulado falló".to_string()));
        }
        drop(state);

        play.completion.finished(None);
        Ok(())
    }

    async fn pause(&self, guild_id: GuildId) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        let play = state.active.get_mut(&guild_id).ok_or(TransportError::Idle)?;
        play.paused = true;
        Ok(())
    }

    async fn resume(&self, guild_id: GuildId) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        let play = state.active.get_mut(&guild_id).ok_or(TransportError::Idle)?;
        play.paused = false;
        Ok(())
    }

    async fn is_playing(&self, guild_id: GuildId) -> bool {
        self.state.lock().active.get(&guild_id).is_some_and(|play| !play.paused)
    }

    async fn is_paused(&self, guild_id: GuildId) -> bool {
        self.state.lock().active.get(&guild_id).is_some_and(|play| play.paused)
    }

    async fn volume(&self, guild_id: GuildId) -> Option<f32> {
        self.volume_of(guild_id)
    }

    async fn set_volume(&self, guild_id: GuildId, volume: f32) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        let play = state.active.get_mut(&guild_id).ok_or(TransportError::Idle)?;
        play.volume = volume;
        Ok(())
    }
}

/// Voice connection bookkeeping; one human listener unless told otherwise.
#[derive(Default)]
pub struct FakeVoice {
    state: Mutex<VoiceState>,
}

#[derive(Default)]
struct VoiceState {
    channels: HashMap<GuildId, ChannelId>,
    humans: HashMap<GuildId, usize>,
    connects: usize,
    moves: usize,
    disconnects: usize,
    fail_connect: bool,
}

impl FakeVoice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_humans(&self, guild_id: GuildId, humans: usize) {
        self.state.lock().humans.insert(guild_id, humans);
    }

    pub fn fail_connect(&self, fail: bool) {
        self.state.lock().fail_connect = fail;
    }

    pub fn connects(&self) -> usize {
        self.state.lock().connects
    }

    pub fn moves(&self) -> usize {
        self.state.lock().moves
    }

    pub fn disconnects(&self) -> usize {
        self.state.lock().disconnects
    }

    /// Drops the connection from outside, as a kick or channel deletion would.
    pub fn lose_connection(&self, guild_id: GuildId) {
        self.state.lock().channels.remove(&guild_id);
    }

    pub fn channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        self.state.lock().channels.get(&guild_id).copied()
    }
}

#[async_trait]
impl VoiceConnection for FakeVoice {
    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), VoiceError> {
        let mut state = self.state.lock();
        if state.fail_connect {
            return Err(VoiceError::Join("sin permisos".to_string()));
        }
        state.connects += 1;
        state.channels.insert(guild_id, channel_id);
        Ok(())
    }

    async fn move_to(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), VoiceError> {
        let mut state = self.state.lock();
        state.moves += 1;
        state.channels.insert(guild_id, channel_id);
        Ok(())
    }

    async fn disconnect(&self, guild_id: GuildId) -> Result<(), VoiceError> {
        let mut state = self.state.lock();
        state.disconnects += 1;
        state.channels.remove(&guild_id);
        Ok(())
    }

    async fn current_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        self.channel(guild_id)
    }

    async fn human_listeners(&self, guild_id: GuildId) -> Option<usize> {
        let state = self.state.lock();
        state.channels.get(&guild_id)?;
        Some(state.humans.get(&guild_id).copied().unwrap_or(1))
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<(GuildId, String)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self, guild_id: GuildId) -> Vec<String> {
        self.messages
            .lock()
            .iter()
            .filter(|(guild, _)| *guild == guild_id)
            .map(|(_, message)| message.clone())
            .collect()
    }

    pub fn contains(&self, guild_id: GuildId, needle: &str) -> bool {
        self.messages(guild_id).iter().any(|message| message.contains(needle))
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, guild_id: GuildId, message: String) {
        self.messages.lock().push((guild_id, message));
    }
}
