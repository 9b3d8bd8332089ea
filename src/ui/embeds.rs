use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::audio::{
    queue::{LoopMode, Track},
    PlaybackState, QueueSnapshot,
};

/// Canciones listadas en `queue` antes de resumir el resto.
pub const QUEUE_PREVIEW_LEN: usize = 15;

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 TuneBot";

/// Crea un embed para mostrar la canción actual
pub fn create_now_playing_embed(track: &Track, snapshot: &QueueSnapshot) -> CreateEmbed {
    let status = match snapshot.state {
        PlaybackState::Paused => "⏸️ En pausa",
        _ => "🎵 Reproduciendo Ahora",
    };

    let mut embed = CreateEmbed::default()
        .title(status)
        .description(format!("**{}**{}", track.title(), snapshot.loop_mode.badge()))
        .color(colors::SUCCESS_GREEN);

    embed = match track.duration() {
        Some(duration) => embed.field("⏱️ Duración", format_duration(duration), true),
        None => embed.field("⏱️ Duración", "🔴 En vivo / desconocida", true),
    };

    embed = embed
        .field(
            "👤 Solicitado por",
            format!("<@{}> <t:{}:R>", track.requested_by(), track.requested_at().timestamp()),
            true,
        )
        .field("🔊 Volumen", format!("{}%", (snapshot.volume * 100.0).round() as u32), true);

    if let Some(url) = track.page_url() {
        embed = embed.url(url);
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea el embed de la cola: canción actual y las próximas
pub fn create_queue_embed(snapshot: &QueueSnapshot) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE);

    if snapshot.current.is_none() && snapshot.upcoming.is_empty() {
        return embed
            .description("😴 **La cola está vacía**\n\n💡 Usa `play <canción>` para agregar música")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
            .timestamp(Timestamp::now());
    }

    if let Some(current) = &snapshot.current {
        let status = match (snapshot.state, snapshot.loop_mode) {
            (PlaybackState::Paused, _) => "⏸️",
            (_, LoopMode::Track) => "🔂",
            (_, LoopMode::Queue) => "🔁",
            (_, LoopMode::Off) => "▶️",
        };
        embed = embed.field(format!("{} Reproduciendo", status), format!("**{}**", current.title()), false);
    }

    if !snapshot.upcoming.is_empty() {
        embed = embed.field("Próximas canciones", upcoming_lines(&snapshot.upcoming), false);
    }

    let mut info = format!("**En espera:** {} canciones", snapshot.upcoming.len());
    let total = total_duration(&snapshot.upcoming);
    if total > Duration::ZERO {
        info.push_str(&format!(" • **Duración:** {}", format_duration(total)));
    }
    info.push_str(&format!(" • **Repetición:** {}", snapshot.loop_mode));

    embed
        .field("Información", info, false)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now())
}

/// Crea un embed de ayuda general
pub fn create_help_embed(prefix: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title("🎵 TuneBot - Comandos")
        .color(colors::INFO_BLUE)
        .field(
            "🎵 Reproducción",
            format!(
                "• `{p}play <canción|url>` (`{p}p`) - Reproduce o añade a la cola\n\
                • `{p}pause` - Pausa la reproducción\n\
                • `{p}resume` (`{p}r`) - Reanuda la reproducción\n\
                • `{p}skip` (`{p}s`) - Salta la canción actual\n\
                • `{p}stop` - Detiene y limpia la cola",
                p = prefix
            ),
            false,
        )
        .field(
            "📜 Cola",
            format!(
                "• `{p}queue` (`{p}q`) - Muestra la cola\n\
                • `{p}nowplaying` (`{p}np`) - Canción actual\n\
                • `{p}loop [off|track|queue]` (`{p}l`) - Configura repetición\n\
                • `{p}clear` - Vacía la cola",
                p = prefix
            ),
            false,
        )
        .field(
            "🔊 Audio y conexión",
            format!(
                "• `{p}volume [0-100]` (`{p}vol`) - Ajusta el volumen\n\
                • `{p}leave` (`{p}dc`) - Desconecta del canal",
                p = prefix
            ),
            false,
        )
        .field(
            "🎵 Fuentes Soportadas",
            "• YouTube (videos y playlists)\n\
            • Spotify (canciones, playlists y álbumes)\n\
            • URLs directas de audio\n\
            • Búsqueda por texto",
            false,
        )
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now())
}

pub fn create_error_embed(description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title("❌ Error")
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
}

fn upcoming_lines(upcoming: &[Track]) -> String {
    let mut lines: Vec<String> = upcoming
        .iter()
        .take(QUEUE_PREVIEW_LEN)
        .enumerate()
        .map(|(i, track)| match track.duration() {
            Some(duration) => format!("**{}**. {} `[{}]`", i + 1, track.title(), format_duration(duration)),
            None => format!("**{}**. {}", i + 1, track.title()),
        })
        .collect();

    if upcoming.len() > QUEUE_PREVIEW_LEN {
        lines.push(format!("...y {} más", upcoming.len() - QUEUE_PREVIEW_LEN));
    }

    lines.join("\n")
}

fn total_duration(tracks: &[Track]) -> Duration {
    tracks.iter().filter_map(Track::duration).sum()
}

pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serenity::model::id::UserId;

    #[test]
    fn durations_render_like_a_clock() {
        assert_eq!(format_duration(Duration::from_secs(59)), "0:59");
        assert_eq!(format_duration(Duration::from_secs(213)), "3:33");
        assert_eq!(format_duration(Duration::from_secs(3723)), "1:02:03");
    }

    #[test]
    fn long_queues_are_summarised() {
        let tracks: Vec<Track> = (1..=18)
            .map(|i| Track::new(format!("t{}", i), format!("t{}", i), UserId::new(1)))
            .collect();

        let text = upcoming_lines(&tracks);
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), QUEUE_PREVIEW_LEN + 1);
        assert_eq!(lines[0], "**1**. t1");
        assert_eq!(lines[QUEUE_PREVIEW_LEN], "...y 3 más");
    }

    #[test]
    fn upcoming_lines_include_known_durations() {
        let tracks = vec![Track::new("a", "a", UserId::new(1)).with_duration(Duration::from_secs(90))];
        assert_eq!(upcoming_lines(&tracks), "**1**. a `[1:30]`");
        assert_eq!(total_duration(&tracks), Duration::from_secs(90));
    }
}
