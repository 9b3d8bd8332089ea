use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info};

mod audio;
mod bot;
mod config;
mod error;
mod sources;
mod ui;

#[cfg(test)]
mod testing;

use crate::audio::{transport::SongbirdTransport, voice::SongbirdVoice, GuildRegistry, PlayerDeps};
use crate::bot::{notifier::ChannelNotifier, BotState, MusicBot};
use crate::config::Config;
use crate::sources::{spotify::SpotifyClient, youtube::YtDlpResolver, CatalogExpander, ResolverAdapter};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tunebot=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check().await;
    }

    info!("🎵 Iniciando TuneBot v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Config::load()?;
    info!("⚙️ {}", config.summary());

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    // Construir cliente
    let songbird = Songbird::serenity();
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(MusicBot)
        .register_songbird_with(songbird.clone())
        .await?;

    // Resolución: yt-dlp para búsquedas y URLs, Spotify para catálogos
    let catalog: Arc<dyn CatalogExpander> = Arc::new(SpotifyClient::new(config.spotify_credentials()));
    let resolver = ResolverAdapter::new(
        Arc::new(YtDlpResolver::new(config.ytdlp_path.clone())),
        Some(catalog),
        config.resolve_settings(),
    );

    let notifier = Arc::new(ChannelNotifier::new(client.http.clone()));
    let registry = Arc::new(GuildRegistry::new(PlayerDeps {
        resolver: Arc::new(resolver),
        transport: Arc::new(SongbirdTransport::new(songbird.clone())),
        voice: Arc::new(SongbirdVoice::new(songbird, client.cache.clone())),
        notifier: notifier.clone(),
        settings: config.player_settings(),
    }));

    {
        let mut data = client.data.write().await;
        data.insert::<BotState>(Arc::new(BotState {
            registry: registry.clone(),
            notifier,
            config: Arc::new(config),
        }));
    }

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!(
                    "⚠️ Señal de shutdown recibida, cerrando ({} servidores con reproductor)...",
                    registry.active_guilds()
                );
                shard_manager.shutdown_all().await;
            }
            Err(e) => error!("Error al registrar Ctrl+C: {:?}", e),
        }
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

async fn health_check() -> Result<()> {
    dotenvy::dotenv().ok();
    let yt_dlp_path = std::env::var("YTDLP_PATH").unwrap_or_else(|_| "yt-dlp".to_string());

    // Verificar dependencias críticas
    let yt_dlp = async_process::Command::new(&yt_dlp_path)
        .arg("--version")
        .output()
        .await?;

    let ffmpeg = async_process::Command::new("ffmpeg")
        .arg("-version")
        .output()
        .await?;

    if yt_dlp.status.success() && ffmpeg.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("Dependencias faltantes");
    }
}
