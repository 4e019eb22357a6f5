//! Demuxer side: input container and compressed packets

use std::path::{Path, PathBuf};

use ffmpeg_next::util::error::EAGAIN;
use ffmpeg_next::{ffi, format, Packet};
use tracing::{debug, trace};

use super::convert;
use crate::domain::model::*;
use crate::error::{TranscodeError, TranscodeResult};
use crate::ports::{ContainerReader, MediaPacket};

/// Compressed packet shared by the demuxer, codecs and muxer
pub struct LibavPacket(pub(crate) Packet);

impl LibavPacket {
    pub fn empty() -> Self {
        Self(Packet::empty())
    }
}

impl MediaPacket for LibavPacket {
    fn stream_index(&self) -> usize {
        self.0.stream()
    }

    fn set_stream_index(&mut self, index: usize) {
        self.0.set_stream(index);
    }

    fn pts(&self) -> Option<i64> {
        self.0.pts()
    }

    fn set_pts(&mut self, pts: Option<i64>) {
        self.0.set_pts(pts);
    }

    fn dts(&self) -> Option<i64> {
        self.0.dts()
    }

    fn set_dts(&mut self, dts: Option<i64>) {
        self.0.set_dts(dts);
    }

    fn duration(&self) -> i64 {
        self.0.duration()
    }

    fn set_duration(&mut self, duration: i64) {
        self.0.set_duration(duration);
    }

    fn rescale_ts(&mut self, src: Timebase, dst: Timebase) {
        self.0.rescale_ts(convert::from_rational(src), convert::from_rational(dst));
    }
}

/// Opened input container
pub struct LibavReader {
    path: PathBuf,
    pub(crate) context: format::context::Input,
}

impl LibavReader {
    pub fn open(path: &Path) -> TranscodeResult<Self> {
        let context = format::input(&path).map_err(|e| TranscodeError::InputOpenFailure {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            context,
        })
    }

    fn guess_frame_rate(&self, stream: &format::stream::Stream) -> Option<Rational> {
        let rate = unsafe {
            ffi::av_guess_frame_rate(
                self.context.as_ptr() as *mut ffi::AVFormatContext,
                stream.as_ptr() as *mut ffi::AVStream,
                std::ptr::null_mut(),
            )
        };
        let rate = convert::from_av_rational(rate);
        rate.is_valid().then_some(rate)
    }

    fn describe(&self, stream: &format::stream::Stream) -> StreamDescriptor {
        let parameters = stream.parameters();
        let kind = convert::media_kind(parameters.medium());
        let side_data_count = unsafe {
            let codecpar = stream.parameters().as_ptr();
            (*codecpar).nb_coded_side_data.max(0) as usize
        };

        StreamDescriptor {
            index: stream.index(),
            kind,
            codec: parameters.id().name().to_string(),
            time_base: convert::to_rational(stream.time_base()),
            frame_rate: match kind {
                MediaKind::Video => self.guess_frame_rate(stream),
                _ => None,
            },
            side_data_count,
            metadata: stream
                .metadata()
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

impl ContainerReader for LibavReader {
    type Packet = LibavPacket;

    fn format_name(&self) -> String {
        self.context.format().name().to_string()
    }

    fn duration(&self) -> Option<f64> {
        let duration = self.context.duration();
        (duration > 0).then(|| Rational::av_time_base().ts_to_seconds(duration))
    }

    fn streams(&self) -> Vec<StreamDescriptor> {
        self.context.streams().map(|s| self.describe(&s)).collect()
    }

    fn metadata(&self) -> Vec<(String, String)> {
        self.context
            .metadata()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn read_packet(&mut self) -> TranscodeResult<Option<LibavPacket>> {
        loop {
            let mut packet = Packet::empty();
            match packet.read(&mut self.context) {
                Ok(()) => {
                    trace!(stream = packet.stream(), pts = ?packet.pts(), "Read packet");
                    return Ok(Some(LibavPacket(packet)));
                }
                Err(ffmpeg_next::Error::Eof) => return Ok(None),
                Err(ffmpeg_next::Error::Other { errno }) if errno == EAGAIN => continue,
                Err(e) => {
                    return Err(TranscodeError::ReadFailure {
                        message: e.to_string(),
                    })
                }
            }
        }
    }
}

impl Drop for LibavReader {
    fn drop(&mut self) {
        debug!("Closing input {}", self.path.display());
    }
}
