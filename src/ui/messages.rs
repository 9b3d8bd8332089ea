//! Avisos de texto plano que el reproductor envía al canal del servidor.

use crate::{
    audio::{queue::LoopMode, queue::Track, EnqueueReceipt},
    error::TransportError,
};

pub fn now_playing(track: &Track, loop_mode: LoopMode) -> String {
    format!("🎵 Reproduciendo: **{}**{}", track.title(), loop_mode.badge())
}

pub fn start_failed(track: &Track, error: &TransportError) -> String {
    format!("⚠️ No se pudo reproducir **{}**: {}. Pasando a la siguiente.", track.title(), error)
}

pub fn stream_failed(title: &str, reason: &str) -> String {
    format!("⚠️ Error durante **{}**: {}. Pasando a la siguiente.", title, reason)
}

pub fn gave_up(failures: u32) -> String {
    format!(
        "❌ {} fallos de reproducción seguidos. Detengo la música y vacío la cola.",
        failures
    )
}

pub fn idle_farewell() -> String {
    "👋 Me desconecto por inactividad. ¡Hasta luego! 💤".to_string()
}

pub fn alone_farewell() -> String {
    "👋 Me quedé solo en el canal de voz, me desconecto.".to_string()
}

/// Respuesta a `play`, con el recuento de fallos si los hubo.
pub fn enqueued(receipt: &EnqueueReceipt) -> String {
    let mut text = match (receipt.added, receipt.started_playback) {
        (1, true) => format!("▶️ Reproduciendo ahora: **{}**", receipt.first_title),
        (1, false) => format!("✅ Añadido a la cola: **{}**", receipt.first_title),
        (added, true) => format!(
            "▶️ **{}** canciones añadidas, empezando por **{}**",
            added, receipt.first_title
        ),
        (added, false) => format!("✅ **{}** canciones añadidas a la cola", added),
    };

    if receipt.failed > 0 {
        text.push_str(&format!(" (⚠️ {} fallaron)", receipt.failed));
    }

    text
}

pub fn loop_mode_changed(mode: LoopMode) -> String {
    match mode {
        LoopMode::Off => "➡️ Repetición desactivada".to_string(),
        LoopMode::Track => "🔂 Repitiendo la canción actual".to_string(),
        LoopMode::Queue => "🔁 Repitiendo toda la cola".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serenity::model::id::UserId;

    #[test]
    fn now_playing_shows_loop_badge() {
        let track = Track::new("Song", "song", UserId::new(1));
        assert_eq!(now_playing(&track, LoopMode::Off), "🎵 Reproduciendo: **Song**");
        assert_eq!(now_playing(&track, LoopMode::Track), "🎵 Reproduciendo: **Song** 🔂");
        assert_eq!(now_playing(&track, LoopMode::Queue), "🎵 Reproduciendo: **Song** 🔁");
    }

    #[test]
    fn batch_receipt_reports_failures() {
        let single = EnqueueReceipt {
            added: 1,
            failed: 0,
            first_title: "Song".into(),
            started_playback: true,
        };
        let batch = EnqueueReceipt {
            added: 3,
            failed: 2,
            first_title: "Song".into(),
            started_playback: false,
        };

        assert_eq!(enqueued(&single), "▶️ Reproduciendo ahora: **Song**");
        assert_eq!(enqueued(&batch), "✅ **3** canciones añadidas a la cola (⚠️ 2 fallaron)");
    }

    #[test]
    fn receipt_says_whether_playback_started() {
        let queued = EnqueueReceipt {
            added: 1,
            failed: 0,
            first_title: "Song".into(),
            started_playback: false,
        };
        let batch_started = EnqueueReceipt {
            added: 4,
            failed: 0,
            first_title: "Intro".into(),
            started_playback: true,
        };

        assert_eq!(enqueued(&queued), "✅ Añadido a la cola: **Song**");
        assert_eq!(enqueued(&batch_started), "▶️ **4** canciones añadidas, empezando por **Intro**");
    }
}
