use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use streamforged_common::User;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub streaming: StreamingConfig,

    #[serde(default)]
    pub hls: HlsConfig,

    #[serde(default)]
    pub signing: SigningConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub transcoding: TranscodingConfig,

    #[serde(default)]
    pub library: LibraryConfig,

    #[serde(default)]
    pub users: Vec<User>,

    #[serde(default)]
    pub players: Vec<PlayerConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Externally reachable base URL, advertised as `icy-url` and used as
    /// the prefix of playlist URLs. Empty means relative URLs.
    #[serde(default)]
    pub public_url: Option<String>,

    /// Station name sent as `icy-name`.
    #[serde(default = "default_server_name")]
    pub name: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    4040
}
fn default_server_name() -> String {
    "streamforged".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: None,
            name: default_server_name(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamingConfig {
    /// Bytes moved per copy-loop iteration.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Chunks between two liveness checks in the copy loop.
    #[serde(default = "default_liveness_check_interval")]
    pub liveness_check_interval: u64,

    /// How long a stopped queue stream waits before sending filler bytes.
    #[serde(default = "default_idle_filler_delay_ms")]
    pub idle_filler_delay_ms: u64,

    /// Size of one idle filler write.
    #[serde(default = "default_idle_filler_size")]
    pub idle_filler_size: usize,

    /// Streams allowed to run at once; further requests get 503.
    #[serde(default = "default_max_concurrent_streams")]
    pub max_concurrent_streams: usize,

    /// Total download bandwidth shared by all streams, 0 for unlimited.
    #[serde(default)]
    pub download_limit_kbps: u32,

    #[serde(default = "default_status_sample_interval_ms")]
    pub status_sample_interval_ms: u64,

    /// Samples kept per transfer for rate computation.
    #[serde(default = "default_status_history_length")]
    pub status_history_length: usize,

    /// User that anonymous players are attributed to.
    #[serde(default = "default_user")]
    pub default_user: String,
}

fn default_chunk_size() -> usize {
    8192
}
fn default_liveness_check_interval() -> u64 {
    16
}
fn default_idle_filler_delay_ms() -> u64 {
    2000
}
fn default_idle_filler_size() -> usize {
    2048
}
fn default_max_concurrent_streams() -> usize {
    32
}
fn default_status_sample_interval_ms() -> u64 {
    5000
}
fn default_status_history_length() -> usize {
    200
}
fn default_user() -> String {
    "guest".to_string()
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            liveness_check_interval: default_liveness_check_interval(),
            idle_filler_delay_ms: default_idle_filler_delay_ms(),
            idle_filler_size: default_idle_filler_size(),
            max_concurrent_streams: default_max_concurrent_streams(),
            download_limit_kbps: 0,
            status_sample_interval_ms: default_status_sample_interval_ms(),
            status_history_length: default_status_history_length(),
            default_user: default_user(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HlsConfig {
    #[serde(default = "default_segment_duration")]
    pub segment_duration_secs: u32,

    /// Lifetime of signed playlist URLs.
    #[serde(default = "default_url_expiry")]
    pub url_expiry_secs: u64,
}

fn default_segment_duration() -> u32 {
    10
}
fn default_url_expiry() -> u64 {
    86_400
}

impl Default for HlsConfig {
    fn default() -> Self {
        Self {
            segment_duration_secs: default_segment_duration(),
            url_expiry_secs: default_url_expiry(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SigningConfig {
    /// Shared secret for signing `/ext` URLs (generate with
    /// `streamforged generate-secret`). Without it a random secret is used
    /// for the lifetime of the process.
    #[serde(default)]
    pub secret: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TranscodingConfig {
    /// Kill a transcoder that produces no output for this long, 0 to disable.
    #[serde(default = "default_stall_timeout")]
    pub stall_timeout_secs: u64,

    /// Used to cap the bitrate of audio no rule applies to.
    #[serde(default = "default_downsample_command")]
    pub downsample_command: String,

    /// Used for HLS segments.
    #[serde(default = "default_hls_command")]
    pub hls_command: String,

    /// Used for progressive video.
    #[serde(default = "default_video_command")]
    pub video_command: String,

    #[serde(default = "default_rules")]
    pub rules: Vec<TranscodingRule>,
}

/// Maps source formats onto a target format through one or two commands.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TranscodingRule {
    pub name: String,

    pub source_formats: Vec<String>,

    pub target_format: String,

    /// One or two command templates, piped in order.
    pub steps: Vec<String>,
}

fn default_stall_timeout() -> u64 {
    60
}
fn default_downsample_command() -> String {
    "ffmpeg -i %s -map 0:0 -b:a %bk -v 0 -f mp3 -".to_string()
}
fn default_hls_command() -> String {
    "ffmpeg -ss %o -t %d -i %s -async 1 -b:v %bk -s %wx%h -ar 44100 -ac 2 -v 0 -f mpegts \
     -c:v libx264 -preset superfast -c:a libmp3lame -threads 0 -"
        .to_string()
}
fn default_video_command() -> String {
    "ffmpeg -ss %o -i %s -async 1 -b:v %bk -s %wx%h -ar 44100 -ac 2 -v 0 -f flv \
     -c:v libx264 -preset superfast -threads 0 -"
        .to_string()
}
fn default_rules() -> Vec<TranscodingRule> {
    vec![
        TranscodingRule {
            name: "audio > mp3".to_string(),
            source_formats: ["aac", "aif", "aiff", "ape", "flac", "m4a", "oga", "ogg", "opus", "wav", "wma"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            target_format: "mp3".to_string(),
            steps: vec!["ffmpeg -i %s -map 0:0 -b:a %bk -v 0 -f mp3 -".to_string()],
        },
        TranscodingRule {
            name: "video > flv".to_string(),
            source_formats: ["avi", "m4v", "mkv", "mov", "mp4", "mpeg", "mpg", "webm", "wmv"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            target_format: "flv".to_string(),
            steps: vec![default_video_command()],
        },
    ]
}

impl Default for TranscodingConfig {
    fn default() -> Self {
        Self {
            stall_timeout_secs: default_stall_timeout(),
            downsample_command: default_downsample_command(),
            hls_command: default_hls_command(),
            video_command: default_video_command(),
            rules: default_rules(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LibraryConfig {
    /// JSON catalog of media files and playlists loaded at startup.
    #[serde(default)]
    pub catalog: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlayerConfig {
    pub id: String,

    #[serde(default = "default_user")]
    pub username: String,

    #[serde(default)]
    pub client_id: Option<String>,

    /// Bitrate cap of the player's transcode scheme, 0 for unlimited.
    #[serde(default)]
    pub max_bit_rate: u32,
}
