//! Decoders, encoders and raw frames over libavcodec

use ffmpeg_next::util::error::EAGAIN;
use ffmpeg_next::{codec, decoder, encoder, frame, picture, Error};

use super::convert;
use super::input::LibavPacket;
use crate::domain::model::*;
use crate::ports::{CodecError, CodecResult, Decoder, Encoder, Feed, MediaFrame, Receive};

/// Raw picture or audio samples
pub enum FrameData {
    Video(frame::Video),
    Audio(frame::Audio),
}

/// Decoded frame plus the time base its pts is expressed in
pub struct LibavFrame {
    pub(crate) data: FrameData,
    time_base: Timebase,
}

impl LibavFrame {
    pub fn video(frame: frame::Video, time_base: Timebase) -> Self {
        Self {
            data: FrameData::Video(frame),
            time_base,
        }
    }

    pub fn audio(frame: frame::Audio, time_base: Timebase) -> Self {
        Self {
            data: FrameData::Audio(frame),
            time_base,
        }
    }

    pub(crate) fn raw(&self) -> &frame::Frame {
        match &self.data {
            FrameData::Video(f) => f,
            FrameData::Audio(f) => f,
        }
    }

    fn raw_mut(&mut self) -> &mut frame::Frame {
        match &mut self.data {
            FrameData::Video(f) => f,
            FrameData::Audio(f) => f,
        }
    }
}

impl MediaFrame for LibavFrame {
    fn pts(&self) -> Option<i64> {
        self.raw().pts()
    }

    fn set_pts(&mut self, pts: Option<i64>) {
        self.raw_mut().set_pts(pts);
    }

    fn time_base(&self) -> Timebase {
        self.time_base
    }

    fn set_time_base(&mut self, time_base: Timebase) {
        self.time_base = time_base;
    }

    fn samples(&self) -> Option<i64> {
        match &self.data {
            FrameData::Video(_) => None,
            FrameData::Audio(f) => Some(f.samples() as i64),
        }
    }
}

fn codec_error(e: Error) -> CodecError {
    CodecError::new(e.to_string())
}

/// Map a send status: EAGAIN asks the caller to drain first
fn feed_status(result: Result<(), Error>) -> CodecResult<Feed> {
    match result {
        Ok(()) => Ok(Feed::Accepted),
        Err(Error::Other { errno }) if errno == EAGAIN => Ok(Feed::WouldBlock),
        Err(e) => Err(codec_error(e)),
    }
}

/// Map a receive status into ready, need-more-input or drained
fn receive_status<T>(result: Result<(), Error>, value: impl FnOnce() -> T) -> CodecResult<Receive<T>> {
    match result {
        Ok(()) => Ok(Receive::Ready(value())),
        Err(Error::Other { errno }) if errno == EAGAIN => Ok(Receive::NeedMoreInput),
        Err(Error::Eof) => Ok(Receive::EndOfStream),
        Err(e) => Err(codec_error(e)),
    }
}

/// Opened decoder for one input stream
pub enum LibavDecoder {
    Video {
        decoder: decoder::Video,
        time_base: Timebase,
    },
    Audio {
        decoder: decoder::Audio,
        time_base: Timebase,
    },
}

impl Decoder for LibavDecoder {
    type Packet = LibavPacket;
    type Frame = LibavFrame;

    fn send_packet(&mut self, packet: &LibavPacket) -> CodecResult<Feed> {
        match self {
            LibavDecoder::Video { decoder, .. } => feed_status(decoder.send_packet(&packet.0)),
            LibavDecoder::Audio { decoder, .. } => feed_status(decoder.send_packet(&packet.0)),
        }
    }

    fn send_eof(&mut self) -> CodecResult<()> {
        match self {
            LibavDecoder::Video { decoder, .. } => decoder.send_eof(),
            LibavDecoder::Audio { decoder, .. } => decoder.send_eof(),
        }
        .map_err(codec_error)
    }

    fn receive_frame(&mut self) -> CodecResult<Receive<LibavFrame>> {
        match self {
            LibavDecoder::Video { decoder, time_base } => {
                let mut frame = frame::Video::empty();
                let status = decoder.receive_frame(&mut frame);
                receive_status(status, || {
                    // Let the encoder pick picture types
                    frame.set_kind(picture::Type::None);
                    if frame.pts().is_none() {
                        let best_effort = frame.timestamp();
                        frame.set_pts(best_effort);
                    }
                    LibavFrame::video(frame, *time_base)
                })
            }
            LibavDecoder::Audio { decoder, time_base } => {
                let mut frame = frame::Audio::empty();
                let status = decoder.receive_frame(&mut frame);
                receive_status(status, || {
                    if frame.pts().is_none() {
                        let best_effort = frame.timestamp();
                        frame.set_pts(best_effort);
                    }
                    LibavFrame::audio(frame, *time_base)
                })
            }
        }
    }

    fn output_format(&self) -> StreamFormat {
        match self {
            LibavDecoder::Video { decoder, .. } => {
                let frame_rate = unsafe { convert::from_av_rational((*decoder.as_ptr()).framerate) };
                StreamFormat::Video(VideoFormat {
                    width: decoder.width(),
                    height: decoder.height(),
                    pixel_format: convert::pixel_name(decoder.format()),
                    sample_aspect_ratio: convert::to_rational(decoder.aspect_ratio()),
                    frame_rate: frame_rate.is_valid().then_some(frame_rate),
                })
            }
            LibavDecoder::Audio { decoder, .. } => {
                let layout = unsafe { &(*decoder.as_ptr()).ch_layout };
                StreamFormat::Audio(AudioFormat {
                    sample_rate: decoder.rate(),
                    channels: layout.nb_channels.max(0) as u16,
                    channel_layout: convert::describe_layout(layout),
                    sample_format: convert::sample_name(decoder.format()),
                })
            }
        }
    }
}

/// Opened encoder for one output stream
pub enum LibavEncoder {
    Video(encoder::Video),
    Audio(encoder::Audio),
}

impl LibavEncoder {
    fn context(&self) -> &codec::Context {
        match self {
            LibavEncoder::Video(e) => e,
            LibavEncoder::Audio(e) => e,
        }
    }
}

impl Encoder for LibavEncoder {
    type Packet = LibavPacket;
    type Frame = LibavFrame;

    fn send_frame(&mut self, frame: Option<&LibavFrame>) -> CodecResult<Feed> {
        let result = match (self, frame) {
            (LibavEncoder::Video(encoder), Some(frame)) => encoder.send_frame(frame.raw()),
            (LibavEncoder::Audio(encoder), Some(frame)) => encoder.send_frame(frame.raw()),
            (LibavEncoder::Video(encoder), None) => encoder.send_eof(),
            (LibavEncoder::Audio(encoder), None) => encoder.send_eof(),
        };
        feed_status(result)
    }

    fn receive_packet(&mut self) -> CodecResult<Receive<LibavPacket>> {
        let mut packet = LibavPacket::empty();
        let status = match self {
            LibavEncoder::Video(encoder) => encoder.receive_packet(&mut packet.0),
            LibavEncoder::Audio(encoder) => encoder.receive_packet(&mut packet.0),
        };
        receive_status(status, || packet)
    }

    fn time_base(&self) -> Timebase {
        unsafe { convert::from_av_rational((*self.context().as_ptr()).time_base) }
    }

    fn frame_size(&self) -> Option<u32> {
        match self {
            LibavEncoder::Video(_) => None,
            LibavEncoder::Audio(encoder) => {
                let variable = encoder
                    .codec()
                    .is_some_and(|c| c.capabilities().contains(codec::capabilities::Capabilities::VARIABLE_FRAME_SIZE));
                let size = encoder.frame_size();
                (!variable && size > 0).then_some(size)
            }
        }
    }
}
