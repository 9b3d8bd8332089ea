use thiserror::Error;

use crate::audio::queue::LoopMode;

/// Comandos de texto reconocidos por el bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Play(String),
    Skip,
    Pause,
    Resume,
    Stop,
    Leave,
    Queue,
    NowPlaying,
    /// `None` rota al siguiente modo.
    Loop(Option<LoopMode>),
    Clear,
    /// `None` muestra el volumen actual.
    Volume(Option<u8>),
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UsageError {
    #[error("Uso: `{0}play <canción|url>`")]
    MissingQuery(String),

    #[error("{0}. Usa `off`, `track` o `queue`")]
    LoopMode(String),

    #[error("El volumen debe ser un número entre 0 y 100 (recibido `{0}`)")]
    Volume(String),
}

/// Parses a chat message into a command.
///
/// Returns `None` for messages without the prefix and for unknown command
/// names, so other bots sharing the prefix are left alone.
pub fn parse(prefix: &str, content: &str) -> Option<Result<Command, UsageError>> {
    let body = content.trim_start().strip_prefix(prefix)?;
    let mut parts = body.trim_start().splitn(2, char::is_whitespace);
    let name = parts.next()?.to_lowercase();
    let args = parts.next().map(str::trim).unwrap_or("");

    let command = match name.as_str() {
        "play" | "p" => {
            if args.is_empty() {
                return Some(Err(UsageError::MissingQuery(prefix.to_string())));
            }
            Command::Play(args.to_string())
        }
        "skip" | "s" => Command::Skip,
        "pause" => Command::Pause,
        "resume" | "r" => Command::Resume,
        "stop" => Command::Stop,
        "leave" | "dc" | "disconnect" => Command::Leave,
        "queue" | "q" => Command::Queue,
        "nowplaying" | "np" | "current" => Command::NowPlaying,
        "loop" | "l" => {
            if args.is_empty() {
                Command::Loop(None)
            } else {
                match args.parse::<LoopMode>() {
                    Ok(mode) => Command::Loop(Some(mode)),
                    Err(e) => return Some(Err(UsageError::LoopMode(e))),
                }
            }
        }
        "clear" | "clearqueue" => Command::Clear,
        "volume" | "vol" => {
            if args.is_empty() {
                Command::Volume(None)
            } else {
                // Más de 100 se acepta y se recorta después
                match args.trim_end_matches('%').parse::<u16>() {
                    Ok(value) => Command::Volume(Some(value.min(100) as u8)),
                    Err(_) => return Some(Err(UsageError::Volume(args.to_string()))),
                }
            }
        }
        "help" | "h" | "commands" => Command::Help,
        _ => return None,
    };

    Some(Ok(command))
}
