//! # Bot Module
//!
//! Discord front end for TuneBot.
//!
//! - [`commands`]: prefix command parsing (`!play`, `!skip`, ...)
//! - [`handlers`]: runs a parsed command against the [`GuildRegistry`] and
//!   answers in the channel
//! - [`notifier`]: delivers player notices (now playing, errors, farewells)
//!   to the last text channel a command came from
//!
//! ## Architecture
//!
//! [`MusicBot`] implements Serenity's [`EventHandler`]. It holds no state of
//! its own: the registry, notifier and configuration are built in `main`
//! once the client exists (they need its HTTP client and cache) and stored
//! in the client's type map as [`BotState`].

use serenity::{
    all::{ActivityData, Context, EventHandler, Message, Ready, VoiceState},
    async_trait,
    prelude::TypeMapKey,
};
use std::sync::Arc;
use tracing::{error, info, warn};

pub mod commands;
pub mod handlers;
pub mod notifier;

use crate::{audio::GuildRegistry, config::Config};
use notifier::ChannelNotifier;

/// Shared services every event handler needs.
pub struct BotState {
    pub registry: Arc<GuildRegistry>,
    pub notifier: Arc<ChannelNotifier>,
    pub config: Arc<Config>,
}

impl TypeMapKey for BotState {
    type Value = Arc<BotState>;
}

async fn bot_state(ctx: &Context) -> Option<Arc<BotState>> {
    let state = ctx.data.read().await.get::<BotState>().cloned();
    if state.is_none() {
        warn!("⚠️ Evento recibido antes de inicializar el estado del bot");
    }
    state
}

/// Main Discord event handler.
pub struct MusicBot;

#[async_trait]
impl EventHandler for MusicBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Some(state) = bot_state(&ctx).await {
            let prefix = &state.config.command_prefix;
            ctx.set_activity(Some(ActivityData::listening(format!("{}help", prefix))));
        }
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }
        let Some(state) = bot_state(&ctx).await else {
            return;
        };

        if let Err(e) = handlers::handle_message(&ctx, &msg, &state).await {
            error!("Error manejando comando: {:?}", e);
        }
    }

    /// Voice channel membership changed somewhere in a guild.
    ///
    /// - **Bot disconnected** (kicked, channel deleted): the guild's player
    ///   drops its state without trying to leave again
    /// - **Anyone else moved**: the player re-checks whether it is alone
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let Some(guild_id) = new.guild_id.or_else(|| old.as_ref().and_then(|state| state.guild_id)) else {
            return;
        };
        let Some(state) = bot_state(&ctx).await else {
            return;
        };

        // Sin reproductor no hay nada que limpiar ni temporizar
        if !state.registry.is_active(guild_id) {
            return;
        }

        let bot_id = ctx.cache.current_user().id;
        if new.user_id == bot_id && new.channel_id.is_none() {
            info!("🔌 Bot desconectado en guild {}", guild_id);
            state.registry.detach(guild_id);
            return;
        }

        state.registry.presence_changed(guild_id);
    }
}
