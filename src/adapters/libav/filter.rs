//! Filter graph with one buffer source and one buffer sink

use ffmpeg_next::util::error::EAGAIN;
use ffmpeg_next::{ffi, filter, frame, Error};
use tracing::debug;

use super::codec::LibavFrame;
use super::convert;
use crate::domain::model::*;
use crate::error::{TranscodeError, TranscodeResult};
use crate::ports::{CodecError, CodecResult, FilterGraph, Receive};

const SOURCE: &str = "in";
const SINK: &str = "out";

pub struct LibavGraph {
    graph: filter::Graph,
    /// Sink context, owned by `graph`
    sink: *const ffi::AVFilterContext,
    kind: MediaKind,
}

impl LibavGraph {
    /// Parse `request.description` between a buffer source configured for the
    /// decoded format and a buffer sink
    pub fn build(request: &GraphRequest) -> TranscodeResult<Self> {
        let graph_error = |e: Error| TranscodeError::FilterGraphError {
            stream_index: request.stream_index,
            message: e.to_string(),
        };
        let missing = |name: &str| TranscodeError::FilterGraphError {
            stream_index: request.stream_index,
            message: format!("filter '{}' is not available", name),
        };

        let (source_name, sink_name, args) = match &request.input {
            StreamFormat::Video(v) => ("buffer", "buffersink", video_source_args(v, request.input_time_base)),
            StreamFormat::Audio(a) => ("abuffer", "abuffersink", audio_source_args(a, request.input_time_base)),
        };
        let source = filter::find(source_name).ok_or_else(|| missing(source_name))?;
        let sink = filter::find(sink_name).ok_or_else(|| missing(sink_name))?;

        let mut graph = filter::Graph::new();
        debug!(stream = request.stream_index, "Filter source args: {}", args);
        graph.add(&source, SOURCE, &args).map_err(graph_error)?;
        graph.add(&sink, SINK, "").map_err(graph_error)?;
        graph
            .output(SOURCE, 0)
            .and_then(|parser| parser.input(SINK, 0))
            .and_then(|parser| parser.parse(&request.description))
            .map_err(graph_error)?;
        graph.validate().map_err(graph_error)?;
        let sink = graph
            .get(SINK)
            .map(|sink| unsafe { sink.as_ptr() })
            .ok_or_else(|| missing(SINK))?;

        Ok(Self {
            graph,
            sink,
            kind: request.input.kind(),
        })
    }
}

fn video_source_args(format: &VideoFormat, time_base: Timebase) -> String {
    let aspect = if format.sample_aspect_ratio.is_valid() {
        format.sample_aspect_ratio
    } else {
        Rational::raw(1, 1)
    };
    let mut args = format!(
        "video_size={}x{}:pix_fmt={}:time_base={}:pixel_aspect={}",
        format.width, format.height, format.pixel_format, time_base, aspect
    );
    if let Some(rate) = format.frame_rate.filter(|r| r.is_valid()) {
        args.push_str(&format!(":frame_rate={}", rate));
    }
    args
}

fn audio_source_args(format: &AudioFormat, time_base: Timebase) -> String {
    format!(
        "time_base={}:sample_rate={}:sample_fmt={}:channel_layout={}",
        time_base, format.sample_rate, format.sample_format, format.channel_layout
    )
}

impl FilterGraph for LibavGraph {
    type Frame = LibavFrame;

    fn push(&mut self, frame: Option<&LibavFrame>) -> CodecResult<()> {
        let mut source = self
            .graph
            .get(SOURCE)
            .ok_or_else(|| CodecError::new("filter graph has no source"))?;
        let mut source = source.source();
        match frame {
            Some(frame) => source.add(frame.raw()),
            None => source.flush(),
        }
        .map_err(|e| CodecError::new(e.to_string()))
    }

    fn pull(&mut self) -> CodecResult<Receive<LibavFrame>> {
        let time_base = self.output_time_base();
        let mut sink = self
            .graph
            .get(SINK)
            .ok_or_else(|| CodecError::new("filter graph has no sink"))?;
        let mut sink = sink.sink();

        let (status, frame) = match self.kind {
            MediaKind::Video => {
                let mut filtered = frame::Video::empty();
                let status = sink.frame(&mut filtered);
                filtered.set_kind(ffmpeg_next::picture::Type::None);
                (status, LibavFrame::video(filtered, time_base))
            }
            _ => {
                let mut filtered = frame::Audio::empty();
                let status = sink.frame(&mut filtered);
                (status, LibavFrame::audio(filtered, time_base))
            }
        };
        match status {
            Ok(()) => Ok(Receive::Ready(frame)),
            Err(Error::Other { errno }) if errno == EAGAIN => Ok(Receive::NeedMoreInput),
            Err(Error::Eof) => Ok(Receive::EndOfStream),
            Err(e) => Err(CodecError::new(e.to_string())),
        }
    }

    fn output_time_base(&self) -> Timebase {
        convert::from_av_rational(unsafe { ffi::av_buffersink_get_time_base(self.sink) })
    }

    fn output_format(&self) -> StreamFormat {
        let sink = self.sink;
        unsafe {
            match self.kind {
                MediaKind::Video => {
                    let pixel = convert::pixel_from_raw(ffi::av_buffersink_get_format(sink));
                    let rate = convert::from_av_rational(ffi::av_buffersink_get_frame_rate(sink));
                    StreamFormat::Video(VideoFormat {
                        width: ffi::av_buffersink_get_w(sink).max(0) as u32,
                        height: ffi::av_buffersink_get_h(sink).max(0) as u32,
                        pixel_format: convert::pixel_name(pixel),
                        sample_aspect_ratio: convert::from_av_rational(ffi::av_buffersink_get_sample_aspect_ratio(
                            sink,
                        )),
                        frame_rate: rate.is_valid().then_some(rate),
                    })
                }
                _ => {
                    let sample = convert::sample_from_raw(ffi::av_buffersink_get_format(sink));
                    let mut layout: ffi::AVChannelLayout = std::mem::zeroed();
                    ffi::av_buffersink_get_ch_layout(sink, &mut layout);
                    let channel_layout = convert::describe_layout(&layout);
                    let channels = layout.nb_channels.max(0) as u16;
                    ffi::av_channel_layout_uninit(&mut layout);
                    StreamFormat::Audio(AudioFormat {
                        sample_rate: ffi::av_buffersink_get_sample_rate(sink).max(0) as u32,
                        channels,
                        channel_layout,
                        sample_format: convert::sample_name(sample),
                    })
                }
            }
        }
    }

    fn set_frame_size(&mut self, samples: u32) {
        if let Some(mut sink) = self.graph.get(SINK) {
            sink.sink().set_frame_size(samples);
        }
    }
}
