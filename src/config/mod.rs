//! Layered transcoder configuration
//!
//! Precedence, lowest first: built-in defaults, configuration file
//! (`.toml`, `.yaml`/`.yml`), `TRANSCODER_*` environment variables,
//! command-line flags. Validation runs once after all layers are merged.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::model::{ColorParameters, DtsSource, DurationSource, PassthroughPolicy};
use crate::domain::rules::ProfileResolver;
use crate::error::{TranscodeError, TranscodeResult};
use crate::utils::logging::LoggingConfig;


/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "TRANSCODER_";

/// Complete configuration for one transcode run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TranscodeConfig {
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
    /// Output container format; guessed from the output extension when absent
    pub format: Option<String>,
    /// Route decoded frames through a filter graph before encoding
    pub use_filter_graph: bool,
    pub video: VideoConfig,
    pub audio: AudioConfig,
    pub filter: FilterConfig,
    /// Handling of subtitle, data and attachment streams
    pub passthrough: PassthroughPolicy,
    /// Codec thread count, 0 = number of CPUs
    pub threads: usize,
    pub timestamps: TimestampConfig,
    pub logging: LoggingConfig,
}

/// Video encoder settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VideoConfig {
    /// Encoder name or codec identifier
    pub codec: String,
    /// Defaults to "high" for H.264 encoders
    pub profile: Option<String>,
    /// Level as "4.1" or "41"; defaults to 4.1 for H.264 encoders
    pub level: Option<String>,
    pub bit_rate: Option<usize>,
    pub color: ColorParameters,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            codec: "h264".to_string(),
            profile: None,
            level: None,
            bit_rate: None,
            color: ColorParameters::default(),
        }
    }
}

/// Audio encoder settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AudioConfig {
    pub codec: String,
    pub profile: Option<String>,
    pub bit_rate: Option<usize>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            codec: "aac".to_string(),
            profile: None,
            bit_rate: None,
        }
    }
}

/// Filter graph descriptions per media type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FilterConfig {
    pub video: String,
    pub audio: String,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            video: "null".to_string(),
            audio: "anull".to_string(),
        }
    }
}

/// Timestamp handling knobs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimestampConfig {
    pub packet_dts_source: DtsSource,
    pub packet_duration_source: DurationSource,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            input: None,
            output: None,
            format: None,
            use_filter_graph: false,
            video: VideoConfig::default(),
            audio: AudioConfig::default(),
            filter: FilterConfig::default(),
            passthrough: PassthroughPolicy::default(),
            threads: 0,
            timestamps: TimestampConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl TranscodeConfig {
    /// Defaults overlaid with an optional configuration file
    pub fn load(path: Option<&Path>) -> TranscodeResult<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Parse a configuration file, picking the format from its extension
    pub fn from_file(path: &Path) -> TranscodeResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| TranscodeError::ConfigParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        let parse_error = |message: String| TranscodeError::ConfigParse {
            path: path.to_path_buf(),
            message,
        };

        let config = match extension.as_deref() {
            Some("yaml") | Some("yml") => {
                serde_yaml::from_str(&content).map_err(|e| parse_error(e.to_string()))?
            }
            Some("toml") | None => toml::from_str(&content).map_err(|e| parse_error(e.to_string()))?,
            Some(other) => {
                return Err(parse_error(format!(
                    "unsupported configuration format '.{}', expected .toml, .yaml or .yml",
                    other
                )))
            }
        };

        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Apply `TRANSCODER_*` variables from the process environment
    pub fn apply_env(&mut self) -> TranscodeResult<()> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Apply environment overrides using the given lookup
    pub fn apply_env_with<F>(&mut self, lookup: F) -> TranscodeResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));
        let mut overrides = 0;

        if let Some(v) = get("INPUT") {
            self.input = Some(PathBuf::from(v));
            overrides += 1;
        }
        if let Some(v) = get("OUTPUT") {
            self.output = Some(PathBuf::from(v));
            overrides += 1;
        }
        if let Some(v) = get("FORMAT") {
            self.format = Some(v);
            overrides += 1;
        }
        if let Some(v) = get("USE_FILTER_GRAPH") {
            self.use_filter_graph = parse_env("USE_FILTER_GRAPH", &v, parse_bool)?;
            overrides += 1;
        }
        if let Some(v) = get("VIDEO_CODEC") {
            self.video.codec = v;
            overrides += 1;
        }
        if let Some(v) = get("VIDEO_PROFILE") {
            self.video.profile = Some(v);
            overrides += 1;
        }
        if let Some(v) = get("VIDEO_LEVEL") {
            self.video.level = Some(v);
            overrides += 1;
        }
        if let Some(v) = get("VIDEO_BIT_RATE") {
            self.video.bit_rate = Some(parse_env("VIDEO_BIT_RATE", &v, |s| {
                s.parse::<usize>().map_err(|e| e.to_string())
            })?);
            overrides += 1;
        }
        if let Some(v) = get("AUDIO_CODEC") {
            self.audio.codec = v;
            overrides += 1;
        }
        if let Some(v) = get("AUDIO_BIT_RATE") {
            self.audio.bit_rate = Some(parse_env("AUDIO_BIT_RATE", &v, |s| {
                s.parse::<usize>().map_err(|e| e.to_string())
            })?);
            overrides += 1;
        }
        if let Some(v) = get("VIDEO_FILTER") {
            self.filter.video = v;
            overrides += 1;
        }
        if let Some(v) = get("AUDIO_FILTER") {
            self.filter.audio = v;
            overrides += 1;
        }
        if let Some(v) = get("PASSTHROUGH") {
            self.passthrough = parse_env("PASSTHROUGH", &v, |s| s.parse())?;
            overrides += 1;
        }
        if let Some(v) = get("THREADS") {
            self.threads = parse_env("THREADS", &v, |s| {
                s.parse::<usize>().map_err(|e| e.to_string())
            })?;
            overrides += 1;
        }
        if let Some(v) = get("PACKET_DTS_SOURCE") {
            self.timestamps.packet_dts_source = parse_env("PACKET_DTS_SOURCE", &v, |s| s.parse())?;
            overrides += 1;
        }
        if let Some(v) = get("PACKET_DURATION_SOURCE") {
            self.timestamps.packet_duration_source =
                parse_env("PACKET_DURATION_SOURCE", &v, |s| s.parse())?;
            overrides += 1;
        }
        if let Some(v) = get("LOG_LEVEL") {
            self.logging.level = parse_env("LOG_LEVEL", &v, |s| s.parse())?;
            overrides += 1;
        }
        if let Some(v) = get("LOG_FORMAT") {
            self.logging.format = parse_env("LOG_FORMAT", &v, |s| s.parse())?;
            overrides += 1;
        }

        if overrides > 0 {
            debug!("Applied {} environment variable overrides", overrides);
        }
        Ok(())
    }

    /// Check the merged configuration for a run
    pub fn validate(&self) -> TranscodeResult<()> {
        let input = self.input.as_ref().ok_or_else(|| TranscodeError::Configuration {
            message: "no input file given".to_string(),
        })?;
        let output = self.output.as_ref().ok_or_else(|| TranscodeError::Configuration {
            message: "no output file given".to_string(),
        })?;
        if input == output {
            return Err(TranscodeError::Configuration {
                message: "input and output must be different files".to_string(),
            });
        }
        if self.video.codec.trim().is_empty() || self.audio.codec.trim().is_empty() {
            return Err(TranscodeError::Configuration {
                message: "encoder names must not be empty".to_string(),
            });
        }
        if let Some(format) = &self.format {
            if format.trim().is_empty() {
                return Err(TranscodeError::Configuration {
                    message: "output format must not be empty".to_string(),
                });
            }
        }
        self.video_profile()?;
        self.video_level()?;
        self.audio_profile()?;
        Ok(())
    }

    /// Resolved video profile identifier
    pub fn video_profile(&self) -> TranscodeResult<Option<i32>> {
        let (default_profile, _) = ProfileResolver::default_profile_level(&self.video.codec);
        let profile = self.video.profile.as_deref().or(default_profile);
        resolve_profile(&self.video.codec, profile)
    }

    /// Resolved audio profile identifier
    pub fn audio_profile(&self) -> TranscodeResult<Option<i32>> {
        resolve_profile(&self.audio.codec, self.audio.profile.as_deref())
    }

    /// Resolved video level identifier
    pub fn video_level(&self) -> TranscodeResult<Option<i32>> {
        let (_, default_level) = ProfileResolver::default_profile_level(&self.video.codec);
        match self.video.level.as_deref().or(default_level) {
            None => Ok(None),
            Some(level) => ProfileResolver::level(level)
                .map(Some)
                .ok_or_else(|| TranscodeError::Configuration {
                    message: format!("invalid video level '{}'", level),
                }),
        }
    }

    /// Thread count handed to codecs
    pub fn effective_threads(&self) -> usize {
        if self.threads == 0 {
            num_cpus::get()
        } else {
            self.threads
        }
    }
}

/// Profile names are only checked for codecs with a known profile table;
/// for any other codec a non-numeric name is ignored.
fn resolve_profile(codec: &str, profile: Option<&str>) -> TranscodeResult<Option<i32>> {
    let Some(name) = profile else {
        return Ok(None);
    };
    match ProfileResolver::profile(codec, name) {
        Some(id) => Ok(Some(id)),
        None if !ProfileResolver::has_profile_table(codec) => {
            warn!("Ignoring profile '{}' for codec '{}'", name, codec);
            Ok(None)
        }
        None => Err(TranscodeError::Configuration {
            message: format!("unknown profile '{}' for codec '{}'", name, codec),
        }),
    }
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(format!("invalid boolean '{}'", other)),
    }
}

fn parse_env<T, F>(name: &str, value: &str, parse: F) -> TranscodeResult<T>
where
    F: Fn(&str) -> Result<T, String>,
{
    parse(value).map_err(|message| TranscodeError::Configuration {
        message: format!("{}{}: {}", ENV_PREFIX, name, message),
    })
}
