// Domain rules - Stream classification, format negotiation and timestamp policies

use serde::Serialize;

use crate::domain::model::*;

/// How the pipeline treats one input stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamRole {
    /// Decode, optionally filter, re-encode
    Transcode,
    /// Copy packets into the output without decoding
    Passthrough,
    /// Leave out of the output entirely
    Drop,
}

/// Business rules for deciding what happens to each input stream
pub struct StreamClassifier;

impl StreamClassifier {
    /// Decide the role of a stream from its media kind and the pass-through policy
    pub fn role(kind: MediaKind, policy: PassthroughPolicy) -> StreamRole {
        match kind {
            MediaKind::Video | MediaKind::Audio => StreamRole::Transcode,
            MediaKind::Subtitle | MediaKind::Data | MediaKind::Attachment => match policy {
                PassthroughPolicy::Copy => StreamRole::Passthrough,
                PassthroughPolicy::Drop => StreamRole::Drop,
            },
            MediaKind::Unknown => StreamRole::Drop,
        }
    }
}

/// Encoder input format negotiation
pub struct FormatSelector;

impl FormatSelector {
    /// Keep the decoder's format when the encoder accepts it, otherwise take
    /// the encoder's first supported format. An empty list means unrestricted.
    pub fn pick(preferred: &str, supported: &[String]) -> String {
        if supported.is_empty() || supported.iter().any(|f| f == preferred) {
            return preferred.to_string();
        }
        supported[0].clone()
    }

    /// Derive the encoder input format from what the decoder produces
    pub fn target_format(decoded: &StreamFormat, encoder: &CodecInfo) -> StreamFormat {
        match decoded {
            StreamFormat::Video(v) => StreamFormat::Video(VideoFormat {
                pixel_format: Self::pick(&v.pixel_format, &encoder.pixel_formats),
                ..v.clone()
            }),
            StreamFormat::Audio(a) => StreamFormat::Audio(AudioFormat {
                sample_format: Self::pick(&a.sample_format, &encoder.sample_formats),
                ..a.clone()
            }),
        }
    }

    /// Whether frames in `from` must be converted before an encoder expecting `to` accepts them
    pub fn needs_conversion(from: &StreamFormat, to: &StreamFormat) -> bool {
        match (from, to) {
            (StreamFormat::Video(a), StreamFormat::Video(b)) => {
                a.pixel_format != b.pixel_format || a.width != b.width || a.height != b.height
            }
            (StreamFormat::Audio(a), StreamFormat::Audio(b)) => {
                a.sample_format != b.sample_format
                    || a.sample_rate != b.sample_rate
                    || a.channels != b.channels
            }
            _ => true,
        }
    }
}

/// Timestamp rules shared by the encoder stage and the output setup
pub struct TimestampRules;

impl TimestampRules {
    /// Encoder time base: one tick per frame for video, one tick per sample for audio.
    /// Falls back to the input stream time base when the format carries no usable rate.
    pub fn encoder_time_base(format: &StreamFormat, stream_time_base: Timebase) -> Timebase {
        match format {
            StreamFormat::Video(v) => match v.frame_rate {
                Some(rate) if rate.is_valid() => rate.invert(),
                _ => stream_time_base,
            },
            StreamFormat::Audio(a) if a.sample_rate > 0 => Rational::raw(1, a.sample_rate as i32),
            StreamFormat::Audio(_) => stream_time_base,
        }
    }

    /// Packet duration, in encoder ticks, used when the encoder leaves it unset.
    ///
    /// `TimeBase` takes the reciprocal of the encoder time base (`den / num`).
    /// `FrameInterval` converts one frame interval into encoder ticks; streams
    /// without a frame rate (audio) use the frame's own sample count.
    pub fn fallback_duration(
        source: DurationSource,
        encoder_time_base: Timebase,
        frame_rate: Option<Rational>,
        frame_samples: Option<i64>,
    ) -> i64 {
        match source {
            DurationSource::TimeBase if encoder_time_base.is_valid() => {
                i64::from(encoder_time_base.den / encoder_time_base.num).max(1)
            }
            DurationSource::TimeBase => 1,
            DurationSource::FrameInterval => {
                if let Some(rate) = frame_rate.filter(|r| r.is_valid()) {
                    return rescale(1, rate.invert(), encoder_time_base).max(1);
                }
                frame_samples.filter(|n| *n > 0).unwrap_or(1)
            }
        }
    }
}

/// Maps human-readable codec profile and level names to codec identifiers
pub struct ProfileResolver;

impl ProfileResolver {
    /// Resolve a profile name for the given encoder. Numeric values pass through.
    pub fn profile(codec: &str, name: &str) -> Option<i32> {
        if let Ok(id) = name.trim().parse::<i32>() {
            return Some(id);
        }
        let name = name.trim().to_ascii_lowercase().replace('-', "_");
        let family = Self::codec_family(codec);
        match (family, name.as_str()) {
            ("h264", "baseline") => Some(66),
            ("h264", "constrained_baseline") => Some(66 | (1 << 9)),
            ("h264", "main") => Some(77),
            ("h264", "extended") => Some(88),
            ("h264", "high") => Some(100),
            ("h264", "high10") => Some(110),
            ("h264", "high422") => Some(122),
            ("h264", "high444") => Some(244),
            ("hevc", "main") => Some(1),
            ("hevc", "main10") => Some(2),
            ("hevc", "mainstillpicture") | ("hevc", "main_still_picture") => Some(3),
            ("hevc", "rext") => Some(4),
            ("aac", "lc") | ("aac", "aac_low") => Some(1),
            ("aac", "he") | ("aac", "he_aac") => Some(4),
            ("aac", "hev2") | ("aac", "he_aacv2") => Some(28),
            _ => None,
        }
    }

    /// Parse a level given either as "4.1" or as the raw id "41"
    pub fn level(value: &str) -> Option<i32> {
        let value = value.trim();
        if let Some((major, minor)) = value.split_once('.') {
            let major: i32 = major.parse().ok()?;
            let minor: i32 = minor.parse().ok()?;
            if !(0..10).contains(&minor) {
                return None;
            }
            return Some(major * 10 + minor);
        }
        value.parse().ok().filter(|l: &i32| *l >= 0)
    }

    /// Profile and level used when none is configured: High@4.1 for H.264 encoders
    pub fn default_profile_level(codec: &str) -> (Option<&'static str>, Option<&'static str>) {
        match Self::codec_family(codec) {
            "h264" => (Some("high"), Some("4.1")),
            _ => (None, None),
        }
    }

    /// Whether profile names are known for this codec
    pub fn has_profile_table(codec: &str) -> bool {
        Self::codec_family(codec) != "other"
    }

    fn codec_family(codec: &str) -> &'static str {
        match codec {
            "h264" | "libx264" | "libx264rgb" | "h264_nvenc" | "h264_qsv" | "h264_vaapi"
            | "h264_videotoolbox" => "h264",
            "hevc" | "libx265" | "hevc_nvenc" | "hevc_qsv" | "hevc_vaapi"
            | "hevc_videotoolbox" => "hevc",
            "aac" | "libfdk_aac" => "aac",
            _ => "other",
        }
    }
}

/// Filter graph description rules
pub struct FilterRules;

impl FilterRules {
    /// Identity graph for a media kind
    pub fn passthrough_description(kind: MediaKind) -> &'static str {
        match kind {
            MediaKind::Audio => "anull",
            _ => "null",
        }
    }

    /// Append a format constraint so the graph output matches what the encoder expects
    pub fn constrained_description(description: &str, target: &StreamFormat) -> String {
        let description = description.trim();
        let base = if description.is_empty() {
            Self::passthrough_description(target.kind())
        } else {
            description
        };
        match target {
            StreamFormat::Video(v) => format!("{},format=pix_fmts={}", base, v.pixel_format),
            StreamFormat::Audio(a) => format!(
                "{},aformat=sample_fmts={}:sample_rates={}:channel_layouts={}",
                base, a.sample_format, a.sample_rate, a.channel_layout
            ),
        }
    }
}
