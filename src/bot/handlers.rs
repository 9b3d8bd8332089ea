use anyhow::Result;
use serenity::{
    builder::{CreateEmbed, CreateMessage},
    model::{
        channel::Message,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{debug, info};

use crate::{
    bot::{
        commands::{self, Command},
        BotState,
    },
    error::PlayerError,
    ui::{embeds, messages},
};

/// Maneja un mensaje de texto que puede contener un comando
pub async fn handle_message(ctx: &Context, msg: &Message, state: &BotState) -> Result<()> {
    let Some(guild_id) = msg.guild_id else {
        return Ok(());
    };
    let Some(parsed) = commands::parse(&state.config.command_prefix, &msg.content) else {
        return Ok(());
    };

    info!(
        "📝 Comando '{}' usado por {} en guild {}",
        msg.content.trim(),
        msg.author.name,
        guild_id
    );

    let command = match parsed {
        Ok(command) => command,
        Err(usage) => return send_error(ctx, msg, &usage.to_string()).await,
    };

    // Los avisos del reproductor van al canal donde se usó el último comando
    state.notifier.bind(guild_id, msg.channel_id);
    let registry = &state.registry;

    match command {
        Command::Play(query) => handle_play(ctx, msg, state, guild_id, &query).await?,
        Command::Skip => reply(ctx, msg, registry.skip(guild_id).await, "⏭️ Canción saltada").await?,
        Command::Pause => reply(ctx, msg, registry.pause(guild_id).await, "⏸️ Reproducción pausada").await?,
        Command::Resume => reply(ctx, msg, registry.resume(guild_id).await, "▶️ Reproducción reanudada").await?,
        Command::Stop => {
            registry.stop(guild_id).await;
            say(ctx, msg, "⏹️ Reproducción detenida y cola limpiada").await?;
        }
        Command::Leave => reply(ctx, msg, registry.leave(guild_id).await, "👋 Desconectado del canal de voz").await?,
        Command::Queue => {
            let snapshot = registry.snapshot(guild_id).await;
            send_embed(ctx, msg, embeds::create_queue_embed(&snapshot)).await?;
        }
        Command::NowPlaying => {
            let snapshot = registry.snapshot(guild_id).await;
            match &snapshot.current {
                Some(track) => send_embed(ctx, msg, embeds::create_now_playing_embed(track, &snapshot)).await?,
                None => send_error(ctx, msg, &PlayerError::NothingPlaying.to_string()).await?,
            }
        }
        Command::Loop(mode) => {
            let mode = match mode {
                Some(mode) => mode,
                None => registry.snapshot(guild_id).await.loop_mode.cycle(),
            };
            let result = registry.set_loop_mode(guild_id, mode).await;
            reply(ctx, msg, result, messages::loop_mode_changed(mode)).await?;
        }
        Command::Clear => {
            let removed = registry.clear(guild_id).await;
            say(ctx, msg, format!("🗑️ {} canciones eliminadas de la cola", removed)).await?;
        }
        Command::Volume(None) => {
            let volume = registry.snapshot(guild_id).await.volume;
            say(ctx, msg, format!("🔊 Volumen actual: {}%", (volume * 100.0).round() as u32)).await?;
        }
        Command::Volume(Some(percent)) => {
            let result = registry.set_volume(guild_id, percent).await;
            reply(ctx, msg, result, format!("🔊 Volumen ajustado a {}%", percent)).await?;
        }
        Command::Help => {
            send_embed(ctx, msg, embeds::create_help_embed(&state.config.command_prefix)).await?;
        }
    }

    Ok(())
}

async fn handle_play(ctx: &Context, msg: &Message, state: &BotState, guild_id: GuildId, query: &str) -> Result<()> {
    let voice_channel = user_voice_channel(ctx, guild_id, msg.author.id);

    // Resolver una playlist puede tardar
    if let Err(e) = msg.channel_id.broadcast_typing(&ctx.http).await {
        debug!("No se pudo mostrar 'escribiendo': {:?}", e);
    }

    match state
        .registry
        .enqueue(guild_id, msg.author.id, voice_channel, query)
        .await
    {
        Ok(receipt) => say(ctx, msg, messages::enqueued(&receipt)).await,
        Err(e) => send_error(ctx, msg, &e.to_string()).await,
    }
}

// Funciones auxiliares

fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    let channel_id = guild.voice_states.get(&user_id).and_then(|voice_state| voice_state.channel_id);
    channel_id
}

async fn reply(
    ctx: &Context,
    msg: &Message,
    result: Result<(), PlayerError>,
    success: impl Into<String>,
) -> Result<()> {
    match result {
        Ok(()) => say(ctx, msg, success).await,
        Err(e) => send_error(ctx, msg, &e.to_string()).await,
    }
}

async fn say(ctx: &Context, msg: &Message, content: impl Into<String>) -> Result<()> {
    msg.channel_id.say(&ctx.http, content).await?;
    Ok(())
}

async fn send_embed(ctx: &Context, msg: &Message, embed: CreateEmbed) -> Result<()> {
    msg.channel_id
        .send_message(&ctx.http, CreateMessage::new().embed(embed))
        .await?;
    Ok(())
}

async fn send_error(ctx: &Context, msg: &Message, description: &str) -> Result<()> {
    send_embed(ctx, msg, embeds::create_error_embed(description)).await
}
