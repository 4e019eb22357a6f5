//! Command-line argument definitions

use std::path::PathBuf;

use clap::Args;
use clap_num::number_range;

use crate::config::TranscodeConfig;
use crate::domain::model::{DtsSource, DurationSource, PassthroughPolicy};

fn thread_count(s: &str) -> Result<usize, String> {
    number_range(s, 0, 256)
}

/// Arguments for the run command
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Input media file
    pub input: PathBuf,

    /// Output media file
    pub output: PathBuf,

    /// Output container format (default: guessed from the output extension)
    #[arg(short, long)]
    pub format: Option<String>,

    /// Route decoded frames through a filter graph before encoding
    #[arg(long)]
    pub filter: bool,

    /// Video filter graph description (implies --filter)
    #[arg(long)]
    pub video_filter: Option<String>,

    /// Audio filter graph description (implies --filter)
    #[arg(long)]
    pub audio_filter: Option<String>,

    /// Video encoder name or codec identifier
    #[arg(long)]
    pub video_codec: Option<String>,

    /// Video profile (e.g. high, main, baseline)
    #[arg(long)]
    pub video_profile: Option<String>,

    /// Video level (e.g. 4.1)
    #[arg(long)]
    pub video_level: Option<String>,

    /// Video bit rate in bits per second
    #[arg(long)]
    pub video_bitrate: Option<usize>,

    /// Audio encoder name or codec identifier
    #[arg(long)]
    pub audio_codec: Option<String>,

    /// Audio bit rate in bits per second
    #[arg(long)]
    pub audio_bitrate: Option<usize>,

    /// Subtitle, data and attachment streams: copy or drop
    #[arg(long)]
    pub passthrough: Option<PassthroughPolicy>,

    /// Time base packet dts is rescaled from: frame or encoder
    #[arg(long)]
    pub dts_source: Option<DtsSource>,

    /// How missing packet durations are derived: time_base or frame_interval
    #[arg(long)]
    pub duration_source: Option<DurationSource>,

    /// Codec threads (0 = number of CPUs)
    #[arg(long, value_parser = thread_count)]
    pub threads: Option<usize>,

    /// Print the run report as JSON on stdout
    #[arg(long)]
    pub json: bool,
}

impl RunArgs {
    /// Overlay the flags that were given onto `config`
    pub fn apply(&self, config: &mut TranscodeConfig) {
        config.input = Some(self.input.clone());
        config.output = Some(self.output.clone());
        if let Some(format) = &self.format {
            config.format = Some(format.clone());
        }
        if self.filter || self.video_filter.is_some() || self.audio_filter.is_some() {
            config.use_filter_graph = true;
        }
        if let Some(filter) = &self.video_filter {
            config.filter.video = filter.clone();
        }
        if let Some(filter) = &self.audio_filter {
            config.filter.audio = filter.clone();
        }
        if let Some(codec) = &self.video_codec {
            config.video.codec = codec.clone();
        }
        if let Some(profile) = &self.video_profile {
            config.video.profile = Some(profile.clone());
        }
        if let Some(level) = &self.video_level {
            config.video.level = Some(level.clone());
        }
        if let Some(bit_rate) = self.video_bitrate {
            config.video.bit_rate = Some(bit_rate);
        }
        if let Some(codec) = &self.audio_codec {
            config.audio.codec = codec.clone();
        }
        if let Some(bit_rate) = self.audio_bitrate {
            config.audio.bit_rate = Some(bit_rate);
        }
        if let Some(policy) = self.passthrough {
            config.passthrough = policy;
        }
        if let Some(source) = self.dts_source {
            config.timestamps.packet_dts_source = source;
        }
        if let Some(source) = self.duration_source {
            config.timestamps.packet_duration_source = source;
        }
        if let Some(threads) = self.threads {
            config.threads = threads;
        }
    }
}

/// Arguments for the inspect command
#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Input media file
    pub input: PathBuf,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}
