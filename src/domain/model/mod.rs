// Domain models - Core types and data structures

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{TranscodeError, TranscodeResult};


/// Rational number used for time bases, frame rates and aspect ratios
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

/// A time base is the unit of a timestamp, expressed as a rational number of seconds
pub type Timebase = Rational;

impl Rational {
    /// Create a new rational, rejecting a zero denominator
    pub fn new(num: i32, den: i32) -> TranscodeResult<Self> {
        if den == 0 {
            return Err(TranscodeError::Configuration {
                message: format!("rational {}/{} has a zero denominator", num, den),
            });
        }
        Ok(Self { num, den })
    }

    /// Create a rational without validation
    pub const fn raw(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// A usable time base has a positive numerator and denominator
    pub fn is_valid(&self) -> bool {
        self.num > 0 && self.den > 0
    }

    /// Swap numerator and denominator (e.g. frame rate -> frame duration)
    pub fn invert(&self) -> Self {
        Self {
            num: self.den,
            den: self.num,
        }
    }

    /// Convert to floating point
    pub fn as_f64(&self) -> f64 {
        if self.den == 0 {
            return 0.0;
        }
        self.num as f64 / self.den as f64
    }

    /// Convert a timestamp in this time base to seconds
    pub fn ts_to_seconds(&self, ts: i64) -> f64 {
        ts as f64 * self.as_f64()
    }

    /// Microsecond time base used by container-level durations
    pub const fn av_time_base() -> Self {
        Self { num: 1, den: 1_000_000 }
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Rescale `value` from the `src` time base to the `dst` time base.
///
/// Computes `value * src / dst` in 128-bit arithmetic and rounds to the
/// nearest integer, halfway cases away from zero. A degenerate time base
/// leaves the value untouched.
pub fn rescale(value: i64, src: Timebase, dst: Timebase) -> i64 {
    if src == dst {
        return value;
    }
    let mut num = value as i128 * src.num as i128 * dst.den as i128;
    let mut den = src.den as i128 * dst.num as i128;
    if den == 0 {
        return value;
    }
    if den < 0 {
        num = -num;
        den = -den;
    }
    let half = den / 2;
    let quotient = if num >= 0 {
        (num + half) / den
    } else {
        -((-num + half) / den)
    };
    quotient.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

/// Rescale an optional timestamp; absent timestamps stay absent
pub fn rescale_opt(value: Option<i64>, src: Timebase, dst: Timebase) -> Option<i64> {
    value.map(|v| rescale(v, src, dst))
}

/// Media type of an elementary stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
    Subtitle,
    Data,
    Attachment,
    Unknown,
}

impl MediaKind {
    /// Audio and video streams are decoded and re-encoded
    pub fn is_transcodable(&self) -> bool {
        matches!(self, MediaKind::Video | MediaKind::Audio)
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
            MediaKind::Subtitle => "subtitle",
            MediaKind::Data => "data",
            MediaKind::Attachment => "attachment",
            MediaKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Description of one input elementary stream as exposed by the container reader
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamDescriptor {
    /// Container stream index, the addressing scheme used throughout
    pub index: usize,
    pub kind: MediaKind,
    /// Codec identifier name (e.g. "h264", "aac")
    pub codec: String,
    pub time_base: Timebase,
    /// Guessed frame rate for video streams
    pub frame_rate: Option<Rational>,
    /// Number of codec-level side data entries attached to the stream
    pub side_data_count: usize,
    /// Stream-level metadata tags (language, title, handler name, ...)
    pub metadata: Vec<(String, String)>,
}

/// Negotiated raw video format
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoFormat {
    pub width: u32,
    pub height: u32,
    pub pixel_format: String,
    pub sample_aspect_ratio: Rational,
    pub frame_rate: Option<Rational>,
}

/// Negotiated raw audio format
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub channel_layout: String,
    pub sample_format: String,
}

/// Raw frame format produced by a decoder or filter graph and consumed by an encoder
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StreamFormat {
    Video(VideoFormat),
    Audio(AudioFormat),
}

impl StreamFormat {
    /// Media kind of this format
    pub fn kind(&self) -> MediaKind {
        match self {
            StreamFormat::Video(_) => MediaKind::Video,
            StreamFormat::Audio(_) => MediaKind::Audio,
        }
    }
}

/// Codec capability as resolved by the codec provider
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CodecInfo {
    pub name: String,
    pub long_name: String,
    pub kind: MediaKind,
    /// Supported pixel formats for video encoders (empty when unrestricted)
    pub pixel_formats: Vec<String>,
    /// Supported sample formats for audio encoders (empty when unrestricted)
    pub sample_formats: Vec<String>,
}

/// Color range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorRange {
    Unspecified,
    /// Limited (16-235)
    Tv,
    /// Full (0-255)
    Pc,
}

/// Color primaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorPrimaries {
    Unspecified,
    Bt709,
    Bt470bg,
    Smpte170m,
    Bt2020,
}

/// Transfer characteristics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferCharacteristic {
    Unspecified,
    Bt709,
    Smpte170m,
    Bt2020_10,
    Smpte2084,
    AribStdB67,
}

/// Matrix coefficients (YUV color space)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorSpace {
    Unspecified,
    Bt709,
    Bt470bg,
    Smpte170m,
    Bt2020Ncl,
}

/// Color signalling written into the encoded video stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorParameters {
    pub range: ColorRange,
    pub primaries: ColorPrimaries,
    pub transfer: TransferCharacteristic,
    pub space: ColorSpace,
}

impl Default for ColorParameters {
    fn default() -> Self {
        Self {
            range: ColorRange::Tv,
            primaries: ColorPrimaries::Bt709,
            transfer: TransferCharacteristic::Bt709,
            space: ColorSpace::Bt709,
        }
    }
}

/// Which time base the packet decoding timestamp is rescaled from after encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DtsSource {
    /// Rescale dts from the time base carried by the fed frame
    #[default]
    Frame,
    /// Leave dts in the encoder time base
    Encoder,
}

/// How a packet duration the encoder left unset is derived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DurationSource {
    /// Reciprocal of the encoder time base, `den / num`
    #[default]
    TimeBase,
    /// One frame interval for video, the frame's sample count for audio
    FrameInterval,
}

/// What to do with streams that are not audio or video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PassthroughPolicy {
    /// Copy codec parameters verbatim and remux packets
    #[default]
    Copy,
    /// Leave the stream out of the output
    Drop,
}

impl FromStr for DtsSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "frame" => Ok(DtsSource::Frame),
            "encoder" => Ok(DtsSource::Encoder),
            other => Err(format!("unknown dts source '{}', expected frame or encoder", other)),
        }
    }
}

impl FromStr for DurationSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "time_base" | "timebase" => Ok(DurationSource::TimeBase),
            "frame_interval" | "frame" => Ok(DurationSource::FrameInterval),
            other => Err(format!(
                "unknown duration source '{}', expected time_base or frame_interval",
                other
            )),
        }
    }
}

impl FromStr for PassthroughPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "copy" => Ok(PassthroughPolicy::Copy),
            "drop" => Ok(PassthroughPolicy::Drop),
            other => Err(format!("unknown passthrough policy '{}', expected copy or drop", other)),
        }
    }
}

/// Fully resolved encoder configuration for one output stream
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderSettings {
    /// Input stream this encoder serves
    pub stream_index: usize,
    pub codec: CodecInfo,
    pub format: StreamFormat,
    pub time_base: Timebase,
    pub profile: Option<i32>,
    pub level: Option<i32>,
    /// Color signalling, video only
    pub color: Option<ColorParameters>,
    pub bit_rate: Option<usize>,
    /// Codec thread count, 0 lets the codec decide
    pub threads: usize,
}

/// Request to build a filter graph for one transcoded stream
#[derive(Debug, Clone, PartialEq)]
pub struct GraphRequest {
    pub stream_index: usize,
    /// User graph description, e.g. "scale=1280:-2" or "null"
    pub description: String,
    /// Format of frames entering the graph
    pub input: StreamFormat,
    pub input_time_base: Timebase,
    /// Format the graph output is constrained to
    pub output: StreamFormat,
}
