//! Conversions between libav values and domain types

use std::ffi::{CStr, CString};
use std::os::raw::c_char;

use ffmpeg_next::ffi;
use ffmpeg_next::format::{Pixel, Sample};
use ffmpeg_next::media;
use ffmpeg_next::Codec;

use crate::domain::model::*;

pub fn to_rational(value: ffmpeg_next::Rational) -> Rational {
    Rational::raw(value.numerator(), value.denominator())
}

pub fn from_rational(value: Rational) -> ffmpeg_next::Rational {
    ffmpeg_next::Rational::new(value.num, value.den)
}

pub fn from_av_rational(value: ffi::AVRational) -> Rational {
    Rational::raw(value.num, value.den)
}

pub fn to_av_rational(value: Rational) -> ffi::AVRational {
    ffi::AVRational {
        num: value.num,
        den: value.den,
    }
}

pub fn media_kind(medium: media::Type) -> MediaKind {
    match medium {
        media::Type::Video => MediaKind::Video,
        media::Type::Audio => MediaKind::Audio,
        media::Type::Subtitle => MediaKind::Subtitle,
        media::Type::Data => MediaKind::Data,
        media::Type::Attachment => MediaKind::Attachment,
        _ => MediaKind::Unknown,
    }
}

pub fn pixel_name(format: Pixel) -> String {
    let ptr = unsafe { ffi::av_get_pix_fmt_name(format.into()) };
    c_string(ptr).unwrap_or_else(|| "none".to_string())
}

pub fn pixel_from_name(name: &str) -> Option<Pixel> {
    let name = CString::new(name).ok()?;
    let format = unsafe { ffi::av_get_pix_fmt(name.as_ptr()) };
    match format {
        ffi::AVPixelFormat::AV_PIX_FMT_NONE => None,
        format => Some(Pixel::from(format)),
    }
}

/// Pixel format from a raw value such as `av_buffersink_get_format` returns
pub fn pixel_from_raw(value: i32) -> Pixel {
    if !(0..ffi::AVPixelFormat::AV_PIX_FMT_NB as i32).contains(&value) {
        return Pixel::None;
    }
    // SAFETY: the enum is contiguous from 0 up to AV_PIX_FMT_NB
    Pixel::from(unsafe { std::mem::transmute::<i32, ffi::AVPixelFormat>(value) })
}

pub fn sample_name(format: Sample) -> String {
    let ptr = unsafe { ffi::av_get_sample_fmt_name(format.into()) };
    c_string(ptr).unwrap_or_else(|| "none".to_string())
}

pub fn sample_from_name(name: &str) -> Option<Sample> {
    let name = CString::new(name).ok()?;
    let format = unsafe { ffi::av_get_sample_fmt(name.as_ptr()) };
    match format {
        ffi::AVSampleFormat::AV_SAMPLE_FMT_NONE => None,
        format => Some(Sample::from(format)),
    }
}

/// Sample format from a raw value, `Sample::None` when out of range
pub fn sample_from_raw(value: i32) -> Sample {
    if !(0..ffi::AVSampleFormat::AV_SAMPLE_FMT_NB as i32).contains(&value) {
        return Sample::None;
    }
    // SAFETY: the enum is contiguous from 0 up to AV_SAMPLE_FMT_NB
    Sample::from(unsafe { std::mem::transmute::<i32, ffi::AVSampleFormat>(value) })
}

/// Human readable channel layout, e.g. "stereo" or "5.1(side)"
pub fn describe_layout(layout: &ffi::AVChannelLayout) -> String {
    let mut buf = [0 as c_char; 128];
    let written = unsafe { ffi::av_channel_layout_describe(layout, buf.as_mut_ptr(), buf.len()) };
    if written < 0 {
        return format!("{}c", layout.nb_channels);
    }
    c_string(buf.as_ptr()).unwrap_or_else(|| format!("{}c", layout.nb_channels))
}

/// Fill `layout` from a description, falling back to the default layout for
/// the channel count when the description is not understood
pub fn fill_layout(layout: &mut ffi::AVChannelLayout, description: &str, channels: u16) {
    unsafe {
        ffi::av_channel_layout_uninit(layout);
        let parsed = CString::new(description)
            .map(|d| ffi::av_channel_layout_from_string(layout, d.as_ptr()))
            .unwrap_or(-1);
        if parsed < 0 || layout.nb_channels != i32::from(channels) {
            ffi::av_channel_layout_uninit(layout);
            ffi::av_channel_layout_default(layout, i32::from(channels));
        }
    }
}

pub fn codec_info(codec: &Codec) -> CodecInfo {
    let pixel_formats = codec
        .video()
        .ok()
        .and_then(|video| video.formats())
        .map(|formats| formats.map(pixel_name).collect())
        .unwrap_or_default();
    let sample_formats = codec
        .audio()
        .ok()
        .and_then(|audio| audio.formats())
        .map(|formats| formats.map(sample_name).collect())
        .unwrap_or_default();

    CodecInfo {
        name: codec.name().to_string(),
        long_name: codec.description().to_string(),
        kind: media_kind(codec.medium()),
        pixel_formats,
        sample_formats,
    }
}

/// Codec id from a codec identifier name such as "h264" or "mp3"
pub fn codec_id(name: &str) -> Option<ffmpeg_next::codec::Id> {
    let name = CString::new(name).ok()?;
    let descriptor = unsafe { ffi::avcodec_descriptor_get_by_name(name.as_ptr()) };
    if descriptor.is_null() {
        return None;
    }
    Some(unsafe { (*descriptor).id }.into())
}

pub fn color_range(value: ColorRange) -> ffi::AVColorRange {
    match value {
        ColorRange::Unspecified => ffi::AVColorRange::AVCOL_RANGE_UNSPECIFIED,
        ColorRange::Tv => ffi::AVColorRange::AVCOL_RANGE_MPEG,
        ColorRange::Pc => ffi::AVColorRange::AVCOL_RANGE_JPEG,
    }
}

pub fn color_primaries(value: ColorPrimaries) -> ffi::AVColorPrimaries {
    match value {
        ColorPrimaries::Unspecified => ffi::AVColorPrimaries::AVCOL_PRI_UNSPECIFIED,
        ColorPrimaries::Bt709 => ffi::AVColorPrimaries::AVCOL_PRI_BT709,
        ColorPrimaries::Bt470bg => ffi::AVColorPrimaries::AVCOL_PRI_BT470BG,
        ColorPrimaries::Smpte170m => ffi::AVColorPrimaries::AVCOL_PRI_SMPTE170M,
        ColorPrimaries::Bt2020 => ffi::AVColorPrimaries::AVCOL_PRI_BT2020,
    }
}

pub fn color_transfer(value: TransferCharacteristic) -> ffi::AVColorTransferCharacteristic {
    use ffi::AVColorTransferCharacteristic as Trc;
    match value {
        TransferCharacteristic::Unspecified => Trc::AVCOL_TRC_UNSPECIFIED,
        TransferCharacteristic::Bt709 => Trc::AVCOL_TRC_BT709,
        TransferCharacteristic::Smpte170m => Trc::AVCOL_TRC_SMPTE170M,
        TransferCharacteristic::Bt2020_10 => Trc::AVCOL_TRC_BT2020_10,
        TransferCharacteristic::Smpte2084 => Trc::AVCOL_TRC_SMPTE2084,
        TransferCharacteristic::AribStdB67 => Trc::AVCOL_TRC_ARIB_STD_B67,
    }
}

pub fn color_space(value: ColorSpace) -> ffi::AVColorSpace {
    match value {
        ColorSpace::Unspecified => ffi::AVColorSpace::AVCOL_SPC_UNSPECIFIED,
        ColorSpace::Bt709 => ffi::AVColorSpace::AVCOL_SPC_BT709,
        ColorSpace::Bt470bg => ffi::AVColorSpace::AVCOL_SPC_BT470BG,
        ColorSpace::Smpte170m => ffi::AVColorSpace::AVCOL_SPC_SMPTE170M,
        ColorSpace::Bt2020Ncl => ffi::AVColorSpace::AVCOL_SPC_BT2020_NCL,
    }
}

/// Metadata entries as a libav dictionary
pub fn dictionary(entries: &[(String, String)]) -> ffmpeg_next::Dictionary<'static> {
    let mut dict = ffmpeg_next::Dictionary::new();
    for (key, value) in entries {
        dict.set(key, value);
    }
    dict
}

fn c_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
}
