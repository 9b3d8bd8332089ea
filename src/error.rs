//! Error taxonomy shared by the playback core and its collaborators.
//!
//! Collaborator failures (resolver, catalog, transport, voice) are converted
//! into these types at the core boundary. [`PlayerError`] is what the command
//! dispatcher receives; its `Display` text is shown to users as-is.

use std::{fmt, time::Duration};
use thiserror::Error;

/// Motivo por el que un medio existe pero no se puede reproducir.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Restriction {
    Private,
    RegionLocked,
    LoginRequired,
    Removed,
    NoAudio,
}

impl fmt::Display for Restriction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Restriction::Private => "es privado",
            Restriction::RegionLocked => "no está disponible en esta región",
            Restriction::LoginRequired => "requiere iniciar sesión",
            Restriction::Removed => "fue eliminado",
            Restriction::NoAudio => "no tiene stream de audio",
        };
        f.write_str(reason)
    }
}

/// Failure to turn one query into a playable [`Track`](crate::audio::queue::Track).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolutionError {
    #[error("Tiempo agotado ({}s) resolviendo `{query}`", .after.as_secs())]
    Timeout { query: String, after: Duration },

    #[error("No se encontraron resultados para `{0}`")]
    NotFound(String),

    #[error("`{query}` {reason}")]
    Unavailable { query: String, reason: Restriction },

    #[error("No se pudo resolver `{query}`: {reason}")]
    Failed { query: String, reason: String },
}

impl ResolutionError {
    /// Whether trying the same query again later could succeed.
    pub fn retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExpansionError {
    #[error("Credenciales del catálogo no configuradas")]
    MissingCredentials,

    #[error("El catálogo rechazó las credenciales: {0}")]
    Unauthorized(String),

    #[error("Límite de peticiones del catálogo, reintenta en {}s", .retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    #[error("Enlace de catálogo no soportado: {0}")]
    UnsupportedLink(String),

    #[error("Error consultando el catálogo: {0}")]
    Request(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    #[error("No hay conexión de voz para este servidor")]
    NotConnected,

    #[error("No hay ningún track cargado")]
    Idle,

    #[error("No se pudo iniciar la reproducción: {0}")]
    Start(String),

    #[error("Error controlando la reproducción: {0}")]
    Control(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum VoiceError {
    #[error("No pude unirme al canal de voz: {0}")]
    Join(String),

    #[error("No pude salir del canal de voz: {0}")]
    Leave(String),
}

/// Outcome of a rejected command, as reported back to the requester.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlayerError {
    #[error("¡Necesitas estar en un canal de voz!")]
    NotInVoice,

    #[error("{0}")]
    Voice(#[from] VoiceError),

    #[error("No hay nada reproduciéndose")]
    NothingPlaying,

    #[error("No hay nada en pausa")]
    NothingPaused,

    #[error("No estoy en un canal de voz")]
    NotConnected,

    #[error("{0}")]
    Resolution(#[from] ResolutionError),

    #[error("{0}")]
    Expansion(#[from] ExpansionError),

    #[error("No se encontró ningún track reproducible ({failed} fallaron)")]
    NothingResolved { failed: usize },

    #[error("{0}")]
    Transport(#[from] TransportError),

    #[error("El reproductor de este servidor se está cerrando, inténtalo de nuevo")]
    Unavailable,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_resolution_errors_are_retryable() {
        let timeout = ResolutionError::Timeout {
            query: "a".into(),
            after: Duration::from_secs(60),
        };
        let failed = ResolutionError::Failed {
            query: "a".into(),
            reason: "exit 1".into(),
        };
        let private = ResolutionError::Unavailable {
            query: "a".into(),
            reason: Restriction::Private,
        };

        assert!(timeout.retryable());
        assert!(failed.retryable());
        assert!(!private.retryable());
        assert!(!ResolutionError::NotFound("a".into()).retryable());
    }

    #[test]
    fn player_error_shows_wrapped_reason() {
        let err = PlayerError::from(ResolutionError::NotFound("lofi".into()));
        assert_eq!(err.to_string(), "No se encontraron resultados para `lofi`");
    }
}
