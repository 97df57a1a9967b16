//! Choosing how a file is transcoded for a request.
//!
//! The rule table itself is configuration. This module turns a file, the
//! requesting player and the request's caps into [`TranscodingParameters`]:
//! which commands to pipe through, the output format, whether the output
//! length is predictable and whether byte ranges make sense on it.

use std::path::PathBuf;
use std::time::Duration;

use streamforged_av::{
    resolve_program, CommandTemplate, StageCommand, TranscodeChain, TranscodeVars,
};
use streamforged_common::{MediaFile, Player, Result, User, VideoTranscodingSettings};

use crate::config::{ToolsConfig, TranscodingConfig, TranscodingRule};

/// Bitrate used for audio transcodes when nothing caps it.
pub const DEFAULT_AUDIO_BIT_RATE: u32 = 128;

/// Bitrate used for video transcodes when nothing caps it.
pub const DEFAULT_VIDEO_BIT_RATE: u32 = 2000;

/// What the client asked for.
#[derive(Debug, Clone, Default)]
pub struct TranscodeRequest {
    /// `maxBitRate` in kbps, `None` or 0 for no cap.
    pub max_bit_rate: Option<u32>,
    /// Preferred target format; `raw` disables transcoding.
    pub format: Option<String>,
    pub video: Option<VideoTranscodingSettings>,
}

/// Resolved plan for one file.
#[derive(Debug, Clone)]
pub struct TranscodingParameters {
    pub target_format: String,
    /// Bitrate substituted for `%b`, `None` when streaming raw.
    pub bit_rate: Option<u32>,
    /// Output size in bytes when predictable.
    pub expected_length: Option<u64>,
    /// Whether byte-range requests can be honored on the output.
    pub range_allowed: bool,
    /// Zero steps means the file's own bytes are streamed.
    pub steps: Vec<CommandTemplate>,
    pub video: Option<VideoTranscodingSettings>,
}

impl TranscodingParameters {
    /// Stream the file untouched.
    pub fn raw(file: &MediaFile) -> Self {
        Self {
            target_format: file.format.clone(),
            bit_rate: None,
            expected_length: Some(file.size),
            range_allowed: true,
            steps: Vec::new(),
            video: None,
        }
    }

    pub fn is_transcoding(&self) -> bool {
        !self.steps.is_empty()
    }

    /// Expand the steps for `file` into runnable commands.
    pub fn stage_commands(
        &self,
        file: &MediaFile,
        program_overrides: &[(String, PathBuf)],
    ) -> Result<Vec<StageCommand>> {
        let vars = TranscodeVars {
            source: file.path.clone(),
            bit_rate: self.bit_rate.unwrap_or(DEFAULT_AUDIO_BIT_RATE),
            title: file.display_title(),
            album: file.album.clone().unwrap_or_default(),
            artist: file.artist.clone().unwrap_or_default(),
            time_offset: self.video.map_or(0, |v| v.time_offset),
            duration: self.video.and_then(|v| v.duration),
            width: self.video.map(|v| v.width),
            height: self.video.map(|v| v.height),
            format: self.target_format.clone(),
        };

        self.steps
            .iter()
            .map(|template| {
                let argv = template.render(&vars);
                let Some((program, args)) = argv.split_first() else {
                    return Err(streamforged_common::Error::validation(format!(
                        "empty transcoding step for {}",
                        file.id
                    )));
                };
                let program = resolve_program(program, program_overrides)?;
                Ok(StageCommand::new(program).args(args.iter().cloned()))
            })
            .collect()
    }

    /// Spawn the chain for `file`. Must not be called for raw parameters.
    pub fn spawn(
        &self,
        file: &MediaFile,
        program_overrides: &[(String, PathBuf)],
        stall_timeout: Option<Duration>,
    ) -> Result<TranscodeChain> {
        let commands = self.stage_commands(file, program_overrides)?;
        tracing::debug!(
            file = %file.id,
            format = %self.target_format,
            bit_rate = ?self.bit_rate,
            stages = commands.len(),
            "Starting transcoder"
        );
        Ok(TranscodeChain::spawn(commands, stall_timeout)?)
    }
}

/// Resolves transcoding parameters for a request.
pub trait TranscodingResolver: Send + Sync {
    fn resolve(
        &self,
        file: &MediaFile,
        player: &Player,
        user: &User,
        request: &TranscodeRequest,
    ) -> TranscodingParameters;
}

/// Resolver driven by the `[transcoding]` configuration.
#[derive(Debug, Clone)]
pub struct RuleTranscodingResolver {
    rules: Vec<TranscodingRule>,
    downsample: CommandTemplate,
    hls: CommandTemplate,
    video: CommandTemplate,
}

impl RuleTranscodingResolver {
    pub fn new(config: &TranscodingConfig) -> Self {
        Self {
            rules: config.rules.clone(),
            downsample: CommandTemplate::new(&config.downsample_command),
            hls: CommandTemplate::new(&config.hls_command),
            video: CommandTemplate::new(&config.video_command),
        }
    }

    fn find_rule(&self, file: &MediaFile, format: Option<&str>) -> Option<&TranscodingRule> {
        let source = file.format.to_ascii_lowercase();
        self.rules.iter().find(|rule| {
            rule.source_formats
                .iter()
                .any(|f| f.eq_ignore_ascii_case(&source))
                && format.map_or(true, |f| rule.target_format.eq_ignore_ascii_case(f))
                && !rule.target_format.eq_ignore_ascii_case(&source)
        })
    }
}

/// Lowest non-zero cap, `None` when nothing caps the bitrate.
pub fn effective_cap(caps: &[Option<u32>]) -> Option<u32> {
    caps.iter().flatten().copied().filter(|c| *c > 0).min()
}

/// Length of `duration` seconds at `kbps`.
fn predicted_length(duration: Option<u32>, kbps: u32) -> Option<u64> {
    duration.map(|d| u64::from(d) * u64::from(kbps) * 1000 / 8)
}

impl TranscodingResolver for RuleTranscodingResolver {
    fn resolve(
        &self,
        file: &MediaFile,
        player: &Player,
        user: &User,
        request: &TranscodeRequest,
    ) -> TranscodingParameters {
        let cap = effective_cap(&[
            request.max_bit_rate,
            Some(user.max_bit_rate),
            Some(player.max_bit_rate),
        ]);
        let format = request
            .format
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty());

        if format.is_some_and(|f| f.eq_ignore_ascii_case("raw")) {
            return TranscodingParameters::raw(file);
        }

        if let Some(video) = request.video.filter(|v| v.hls) {
            return TranscodingParameters {
                target_format: "ts".to_string(),
                bit_rate: Some(cap.unwrap_or(DEFAULT_VIDEO_BIT_RATE)),
                expected_length: None,
                range_allowed: false,
                steps: vec![self.hls.clone()],
                video: Some(video),
            };
        }

        if file.is_video() {
            if let Some(rule) = self.find_rule(file, format) {
                return TranscodingParameters {
                    target_format: rule.target_format.clone(),
                    bit_rate: Some(cap.unwrap_or(DEFAULT_VIDEO_BIT_RATE)),
                    expected_length: None,
                    range_allowed: false,
                    steps: rule.steps.iter().map(CommandTemplate::new).collect(),
                    video: request.video,
                };
            }
            if format.is_some_and(|f| !f.eq_ignore_ascii_case(&file.format)) {
                return TranscodingParameters {
                    target_format: "flv".to_string(),
                    bit_rate: Some(cap.unwrap_or(DEFAULT_VIDEO_BIT_RATE)),
                    expected_length: None,
                    range_allowed: false,
                    steps: vec![self.video.clone()],
                    video: request.video,
                };
            }
            return TranscodingParameters::raw(file);
        }

        if let Some(rule) = self.find_rule(file, format) {
            let bit_rate = cap.unwrap_or(DEFAULT_AUDIO_BIT_RATE);
            let steps: Vec<CommandTemplate> = rule.steps.iter().map(CommandTemplate::new).collect();
            let expected_length = predicted_length(file.duration_secs, bit_rate);
            let range_allowed = expected_length.is_some()
                && steps.last().is_some_and(|s| s.references_bit_rate());
            return TranscodingParameters {
                target_format: rule.target_format.clone(),
                bit_rate: Some(bit_rate),
                expected_length,
                range_allowed,
                steps,
                video: None,
            };
        }

        let over_cap = matches!((cap, file.bit_rate), (Some(c), Some(b)) if b > c);
        let mp3_ok = format.map_or(true, |f| f.eq_ignore_ascii_case("mp3"));
        if over_cap && mp3_ok && file.format.eq_ignore_ascii_case("mp3") {
            let bit_rate = cap.unwrap_or(DEFAULT_AUDIO_BIT_RATE);
            let expected_length = predicted_length(file.duration_secs, bit_rate);
            return TranscodingParameters {
                target_format: "mp3".to_string(),
                bit_rate: Some(bit_rate),
                expected_length,
                range_allowed: expected_length.is_some() && self.downsample.references_bit_rate(),
                steps: vec![self.downsample.clone()],
                video: None,
            };
        }

        TranscodingParameters::raw(file)
    }
}

/// Program overrides from `[tools]`.
pub fn program_overrides(tools: &ToolsConfig) -> Vec<(String, PathBuf)> {
    tools
        .ffmpeg_path
        .iter()
        .map(|p| ("ffmpeg".to_string(), p.clone()))
        .collect()
}
