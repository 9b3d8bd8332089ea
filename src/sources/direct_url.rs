use serenity::model::id::UserId;
use url::Url;

use crate::audio::queue::Track;

const AUDIO_EXTENSIONS: [&str; 7] = [".mp3", ".wav", ".ogg", ".flac", ".m4a", ".opus", ".aac"];

/// Track para un enlace directo a un archivo de audio, sin pasar por yt-dlp.
///
/// Devuelve `None` si la consulta no es una URL http(s) cuyo path termina en
/// una extensión de audio conocida.
pub fn track_for(query: &str, requested_by: UserId) -> Option<Track> {
    let url = Url::parse(query).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }

    let path = url.path().to_lowercase();
    if !AUDIO_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
        return None;
    }

    let title = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            urlencoding::decode(segment)
                .map(|decoded| decoded.into_owned())
                .unwrap_or_else(|_| segment.to_string())
        })
        .unwrap_or_else(|| query.to_string());

    Some(Track::new(title, query, requested_by).with_stream_url(query))
}
