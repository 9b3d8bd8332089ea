use dashmap::DashMap;
use serenity::{
    http::Http,
    model::id::{ChannelId, GuildId},
};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::audio::Notifier;

/// Envía los avisos del reproductor al último canal de texto usado en el servidor.
pub struct ChannelNotifier {
    http: Arc<Http>,
    channels: DashMap<GuildId, ChannelId>,
}

impl ChannelNotifier {
    pub fn new(http: Arc<Http>) -> Self {
        Self {
            http,
            channels: DashMap::new(),
        }
    }

    pub fn bind(&self, guild_id: GuildId, channel_id: ChannelId) {
        self.channels.insert(guild_id, channel_id);
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, guild_id: GuildId, message: String) {
        let Some(channel_id) = self.channels.get(&guild_id).map(|entry| *entry.value()) else {
            debug!("Sin canal de texto para guild {}, aviso descartado", guild_id);
            return;
        };

        let http = self.http.clone();
        tokio::spawn(async move {
            if let Err(e) = channel_id.say(&http, message).await {
                warn!("⚠️ No se pudo enviar aviso a {}: {:?}", channel_id, e);
            }
        });
    }
}
