//! Muxer side: output container, encoder streams and pass-through streams

use std::path::{Path, PathBuf};

use ffmpeg_next::{codec, encoder, ffi, format, Codec};
use tracing::{debug, warn};

use super::codec::LibavEncoder;
use super::convert;
use super::input::{LibavPacket, LibavReader};
use crate::domain::model::*;
use crate::error::{TranscodeError, TranscodeResult};
use crate::ports::{ContainerWriter, Encoder};

/// Output container. Dropping it closes the file.
pub struct LibavWriter {
    path: PathBuf,
    pub(crate) context: format::context::Output,
}

impl LibavWriter {
    pub fn create(path: &Path, format_name: Option<&str>) -> TranscodeResult<Self> {
        let context = match format_name {
            Some(name) => format::output_as(&path, name),
            None => format::output(&path),
        }
        .map_err(|e| TranscodeError::OutputOpenFailure {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        debug!("Output format: {}", context.format().name());
        Ok(Self {
            path: path.to_path_buf(),
            context,
        })
    }

    fn needs_global_header(&self) -> bool {
        self.context.format().flags().contains(format::Flags::GLOBAL_HEADER)
    }

    /// Open an encoder for `settings` and add an output stream carrying its parameters
    pub fn add_encoder_stream(
        &mut self,
        stream: &StreamDescriptor,
        settings: &EncoderSettings,
    ) -> TranscodeResult<(LibavEncoder, usize)> {
        let open_error = |message: String| TranscodeError::EncoderOpenFailure {
            stream_index: stream.index,
            message,
        };
        let codec = find_codec(&settings.codec.name).ok_or_else(|| TranscodeError::EncoderNotFound {
            codec: settings.codec.name.clone(),
        })?;
        let global_header = self.needs_global_header();

        let encoder = match &settings.format {
            StreamFormat::Video(format) => {
                let mut video = codec::Context::new_with_codec(codec)
                    .encoder()
                    .video()
                    .map_err(|e| open_error(e.to_string()))?;
                let pixel = convert::pixel_from_name(&format.pixel_format)
                    .ok_or_else(|| open_error(format!("unknown pixel format '{}'", format.pixel_format)))?;
                video.set_width(format.width);
                video.set_height(format.height);
                video.set_format(pixel);
                video.set_aspect_ratio(convert::from_rational(format.sample_aspect_ratio));
                video.set_time_base(convert::from_rational(settings.time_base));
                video.set_frame_rate(format.frame_rate.map(convert::from_rational));
                if let Some(bit_rate) = settings.bit_rate {
                    video.set_bit_rate(bit_rate);
                }
                unsafe {
                    let ctx = video.as_mut_ptr();
                    apply_common(ctx, settings, global_header);
                    if let Some(color) = settings.color {
                        (*ctx).color_range = convert::color_range(color.range);
                        (*ctx).color_primaries = convert::color_primaries(color.primaries);
                        (*ctx).color_trc = convert::color_transfer(color.transfer);
                        (*ctx).colorspace = convert::color_space(color.space);
                    }
                }
                LibavEncoder::Video(video.open_as(codec).map_err(|e| open_error(e.to_string()))?)
            }
            StreamFormat::Audio(format) => {
                let mut audio = codec::Context::new_with_codec(codec)
                    .encoder()
                    .audio()
                    .map_err(|e| open_error(e.to_string()))?;
                let sample = convert::sample_from_name(&format.sample_format)
                    .ok_or_else(|| open_error(format!("unknown sample format '{}'", format.sample_format)))?;
                audio.set_rate(format.sample_rate as i32);
                audio.set_format(sample);
                audio.set_time_base(convert::from_rational(settings.time_base));
                if let Some(bit_rate) = settings.bit_rate {
                    audio.set_bit_rate(bit_rate);
                }
                unsafe {
                    let ctx = audio.as_mut_ptr();
                    convert::fill_layout(&mut (*ctx).ch_layout, &format.channel_layout, format.channels);
                    apply_common(ctx, settings, global_header);
                }
                LibavEncoder::Audio(audio.open_as(codec).map_err(|e| open_error(e.to_string()))?)
            }
        };

        let mut out_stream = self
            .context
            .add_stream(codec)
            .map_err(|e| TranscodeError::AllocationFailure {
                what: format!("output stream for input stream #{} ({})", stream.index, e),
            })?;
        match &encoder {
            LibavEncoder::Video(e) => out_stream.set_parameters(e),
            LibavEncoder::Audio(e) => out_stream.set_parameters(e),
        }
        out_stream.set_time_base(convert::from_rational(encoder.time_base()));
        out_stream.set_metadata(convert::dictionary(&stream.metadata));
        Ok((encoder, out_stream.index()))
    }

    /// Add an output stream whose codec parameters are copied from `stream`
    pub fn add_copy_stream(&mut self, reader: &LibavReader, stream: &StreamDescriptor) -> TranscodeResult<usize> {
        let input = reader
            .context
            .stream(stream.index)
            .ok_or_else(|| TranscodeError::AllocationFailure {
                what: format!("input stream #{}", stream.index),
            })?;
        let mut out_stream = self
            .context
            .add_stream(encoder::find(codec::Id::None))
            .map_err(|e| TranscodeError::AllocationFailure {
                what: format!("output stream for input stream #{} ({})", stream.index, e),
            })?;
        out_stream.set_parameters(input.parameters());
        // Let the muxer pick a tag valid for its own container
        unsafe {
            (*out_stream.parameters().as_mut_ptr()).codec_tag = 0;
        }
        out_stream.set_time_base(input.time_base());
        out_stream.set_metadata(input.metadata().to_owned());
        Ok(out_stream.index())
    }

    /// Append the input stream's codec-level side data entries that the
    /// output stream does not carry yet
    pub fn copy_side_data(&mut self, reader: &LibavReader, input_index: usize, output_index: usize) -> TranscodeResult<()> {
        let copy_error = |message: &str| TranscodeError::SideDataCopyFailure {
            stream_index: output_index,
            message: message.to_string(),
        };
        let input = reader
            .context
            .stream(input_index)
            .ok_or_else(|| copy_error("input stream not found"))?;
        let output = self
            .context
            .stream_mut(output_index)
            .ok_or_else(|| copy_error("output stream not found"))?;

        unsafe {
            let src = input.parameters().as_ptr();
            let dst = output.parameters().as_mut_ptr();
            for i in 0..(*src).nb_coded_side_data.max(0) as usize {
                let entry = (*src).coded_side_data.add(i);
                let present =
                    ffi::av_packet_side_data_get((*dst).coded_side_data, (*dst).nb_coded_side_data, (*entry).type_);
                if !present.is_null() {
                    continue;
                }
                let copy = ffi::av_packet_side_data_new(
                    &mut (*dst).coded_side_data,
                    &mut (*dst).nb_coded_side_data,
                    (*entry).type_,
                    (*entry).size,
                    0,
                );
                if copy.is_null() {
                    return Err(copy_error("out of memory"));
                }
                std::ptr::copy_nonoverlapping((*entry).data as *const u8, (*copy).data, (*entry).size);
            }
        }
        Ok(())
    }
}

/// Threads, profile, level and the global header flag
unsafe fn apply_common(ctx: *mut ffi::AVCodecContext, settings: &EncoderSettings, global_header: bool) {
    (*ctx).thread_count = settings.threads as i32;
    if let Some(profile) = settings.profile {
        (*ctx).profile = profile;
    }
    if let Some(level) = settings.level {
        (*ctx).level = level;
    }
    if global_header {
        (*ctx).flags |= ffi::AV_CODEC_FLAG_GLOBAL_HEADER as i32;
    }
}

/// Resolve an encoder by name, falling back to the default encoder of a
/// codec identifier (so "h264" finds libx264 when that is what is built in)
pub fn find_codec(name: &str) -> Option<Codec> {
    encoder::find_by_name(name).or_else(|| {
        let id = convert::codec_id(name)?;
        let codec = encoder::find(id);
        if let Some(codec) = &codec {
            debug!("Encoder '{}' resolved to '{}'", name, codec.name());
        }
        codec
    })
}

impl ContainerWriter for LibavWriter {
    type Packet = LibavPacket;

    fn set_metadata(&mut self, entries: &[(String, String)]) {
        self.context.set_metadata(convert::dictionary(entries));
    }

    fn write_header(&mut self) -> TranscodeResult<()> {
        self.context
            .write_header()
            .map_err(|e| TranscodeError::HeaderWriteFailure { message: e.to_string() })
    }

    fn stream_time_base(&self, output_index: usize) -> Timebase {
        match self.context.stream(output_index) {
            Some(stream) => convert::to_rational(stream.time_base()),
            None => {
                warn!("Output stream #{} does not exist", output_index);
                Rational::raw(0, 1)
            }
        }
    }

    fn write_packet(&mut self, packet: LibavPacket) -> TranscodeResult<()> {
        let stream_index = packet.0.stream();
        packet
            .0
            .write_interleaved(&mut self.context)
            .map_err(|e| TranscodeError::MuxWriteFailure {
                stream_index,
                message: e.to_string(),
            })
    }

    fn write_trailer(&mut self) -> TranscodeResult<()> {
        self.context
            .write_trailer()
            .map_err(|e| TranscodeError::TrailerWriteFailure { message: e.to_string() })
    }
}

impl Drop for LibavWriter {
    fn drop(&mut self) {
        debug!("Closing output {}", self.path.display());
    }
}
