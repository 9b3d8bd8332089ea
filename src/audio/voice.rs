use async_trait::async_trait;
use serenity::{
    cache::Cache,
    model::id::{ChannelId, GuildId},
};
use songbird::{error::JoinError, Songbird};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::VoiceError;

/// Voice channel membership of the bot, one connection per guild.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VoiceConnection: Send + Sync {
    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), VoiceError>;

    async fn move_to(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), VoiceError>;

    async fn disconnect(&self, guild_id: GuildId) -> Result<(), VoiceError>;

    async fn current_channel(&self, guild_id: GuildId) -> Option<ChannelId>;

    /// Non-bot members sharing the bot's channel, `None` when not connected.
    async fn human_listeners(&self, guild_id: GuildId) -> Option<usize>;
}

pub struct SongbirdVoice {
    songbird: Arc<Songbird>,
    cache: Arc<Cache>,
}

impl SongbirdVoice {
    pub fn new(songbird: Arc<Songbird>, cache: Arc<Cache>) -> Self {
        Self { songbird, cache }
    }

    async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), VoiceError> {
        self.songbird
            .join(guild_id, channel_id)
            .await
            .map(|_| ())
            .map_err(|e| VoiceError::Join(e.to_string()))
    }
}

#[async_trait]
impl VoiceConnection for SongbirdVoice {
    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), VoiceError> {
        self.join(guild_id, channel_id).await?;
        info!("🔊 Conectado al canal {} en guild {}", channel_id, guild_id);
        Ok(())
    }

    async fn move_to(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), VoiceError> {
        self.join(guild_id, channel_id).await?;
        info!("🔀 Movido al canal {} en guild {}", channel_id, guild_id);
        Ok(())
    }

    async fn disconnect(&self, guild_id: GuildId) -> Result<(), VoiceError> {
        match self.songbird.remove(guild_id).await {
            Ok(()) => {
                info!("👋 Desconectado de guild {}", guild_id);
                Ok(())
            }
            Err(JoinError::NoCall) => {
                debug!("Guild {} ya no tenía llamada activa", guild_id);
                Ok(())
            }
            Err(e) => Err(VoiceError::Leave(e.to_string())),
        }
    }

    async fn current_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        let call = self.songbird.get(guild_id)?;
        let channel = call.lock().await.current_channel();
        channel.map(|id| ChannelId::from(id.0))
    }

    async fn human_listeners(&self, guild_id: GuildId) -> Option<usize> {
        let channel = self.current_channel(guild_id).await?;
        let bot_id = self.cache.current_user().id;
        let guild = self.cache.guild(guild_id)?;

        let humans = guild
            .voice_states
            .values()
            .filter(|state| state.channel_id == Some(channel) && state.user_id != bot_id)
            .filter(|state| {
                let is_bot = state
                    .member
                    .as_ref()
                    .map(|member| member.user.bot)
                    .or_else(|| guild.members.get(&state.user_id).map(|member| member.user.bot))
                    .unwrap_or(false);
                !is_bot
            })
            .count();

        Some(humans)
    }
}
