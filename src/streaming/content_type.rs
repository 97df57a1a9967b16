//! Content types for streamed formats.

/// Client id players created by the Sonos integration carry.
pub const SONOS_CLIENT_ID: &str = "sonos";

/// Determine content type from a container format / file suffix.
pub fn content_type(format: &str) -> &'static str {
    match format.to_lowercase().as_str() {
        "mp3" => "audio/mpeg",
        "ogg" | "oga" | "opus" => "audio/ogg",
        "aac" | "m4a" | "m4b" => "audio/mp4",
        "flac" => "audio/flac",
        "wav" => "audio/x-wav",
        "wma" => "audio/x-ms-wma",
        "ape" => "audio/x-monkeys-audio",
        "aif" | "aiff" => "audio/aiff",
        "flv" => "video/x-flv",
        "avi" => "video/avi",
        "mpg" | "mpeg" => "video/mpeg",
        "mp4" => "video/mp4",
        "m4v" => "video/x-m4v",
        "mkv" => "video/x-matroska",
        "mov" => "video/quicktime",
        "wmv" => "video/x-ms-wmv",
        "webm" => "video/webm",
        "ts" | "m2ts" => "video/MP2T",
        "m3u8" => "application/vnd.apple.mpegurl",
        _ => "application/octet-stream",
    }
}

/// Content type for Sonos players, which reject a few of the standard ones.
pub fn sonos_content_type(format: &str) -> &'static str {
    match format.to_lowercase().as_str() {
        "flac" => "audio/flac",
        "m4a" | "aac" => "audio/aac",
        "wav" => "audio/wav",
        other => content_type(other),
    }
}

/// Whether a request comes from a Sonos device.
pub fn is_sonos(client_id: Option<&str>, user_agent: Option<&str>) -> bool {
    client_id.is_some_and(|id| id.eq_ignore_ascii_case(SONOS_CLIENT_ID))
        || user_agent.is_some_and(|ua| ua.to_ascii_lowercase().contains("sonos"))
}
