//! Scripted in-memory media backend for engine tests
//!
//! Every resource the engine acquires is recorded in a shared ledger together
//! with its release, so tests can check what was opened, what was written and
//! in which order everything was torn down.

#![allow(dead_code)]

use std::cell::{Ref, RefCell};
use std::collections::{HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tempfile::TempDir;

use transcoder_cli::config::TranscodeConfig;
use transcoder_cli::domain::model::*;
use transcoder_cli::error::{TranscodeError, TranscodeResult};
use transcoder_cli::ports::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Input,
    Output,
    Decoder(usize),
    Graph(usize),
    Encoder(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Alloc(Resource),
    Free(Resource),
}

/// A packet as the muxer received it
#[derive(Debug, Clone, PartialEq)]
pub struct Written {
    pub output_index: usize,
    pub pts: Option<i64>,
    pub dts: Option<i64>,
    pub duration: i64,
}

#[derive(Debug, Default)]
pub struct Ledger {
    pub events: Vec<Event>,
    pub headers_written: usize,
    pub trailers_written: usize,
    pub write_attempts: usize,
    pub written: Vec<Written>,
    pub output_streams: usize,
    pub output_metadata: Vec<(String, String)>,
    pub encoder_settings: Vec<EncoderSettings>,
    pub graph_requests: Vec<GraphRequest>,
    pub frame_sizes: Vec<(usize, u32)>,
    pub side_data_copies: Vec<(usize, usize)>,
}

impl Ledger {
    pub fn allocated(&self, resource: Resource) -> bool {
        self.events.contains(&Event::Alloc(resource))
    }

    pub fn written_to(&self, output_index: usize) -> Vec<&Written> {
        self.written.iter().filter(|w| w.output_index == output_index).collect()
    }
}

/// One scripted input stream
#[derive(Debug, Clone)]
pub struct FakeStream {
    pub kind: MediaKind,
    pub codec: String,
    pub time_base: Rational,
    pub frame_rate: Option<Rational>,
    pub packets: usize,
    /// Packet spacing in stream ticks
    pub packet_duration: i64,
}

impl FakeStream {
    /// 25 fps H.264 in a 90 kHz time base
    pub fn video(packets: usize) -> Self {
        Self {
            kind: MediaKind::Video,
            codec: "h264".to_string(),
            time_base: Rational::raw(1, 90000),
            frame_rate: Some(Rational::raw(25, 1)),
            packets,
            packet_duration: 3600,
        }
    }

    /// 48 kHz AAC, 1024 samples per packet
    pub fn audio(packets: usize) -> Self {
        Self {
            kind: MediaKind::Audio,
            codec: "aac".to_string(),
            time_base: Rational::raw(1, 48000),
            frame_rate: None,
            packets,
            packet_duration: 1024,
        }
    }

    pub fn subtitle(packets: usize) -> Self {
        Self {
            kind: MediaKind::Subtitle,
            codec: "mov_text".to_string(),
            time_base: Rational::raw(1, 1000),
            frame_rate: None,
            packets,
            packet_duration: 40,
        }
    }

    pub fn unknown(packets: usize) -> Self {
        Self {
            kind: MediaKind::Unknown,
            codec: "none".to_string(),
            time_base: Rational::raw(1, 1000),
            frame_rate: None,
            packets,
            packet_duration: 40,
        }
    }
}

/// Setup or finalization step that should fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    OpenInput,
    OpenDecoder(usize),
    CreateOutput,
    BuildGraph(usize),
    OpenEncoder(usize),
    SideData(usize),
    Passthrough(usize),
    WriteHeader,
    WriteTrailer,
}

/// Behavior of the fake backend. Packet and frame numbers are per stream,
/// packets counted from 0, encoder frames from 1.
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub streams: Vec<FakeStream>,
    pub fail_at: Option<FailAt>,
    pub missing_decoders: Vec<String>,
    pub missing_encoders: Vec<String>,
    /// (stream, packet) the decoder refuses
    pub corrupt_packets: Vec<(usize, usize)>,
    /// (stream, packet) the decoder defers once
    pub would_block_packets: Vec<(usize, usize)>,
    /// (stream, packet) after which the decoder fails for good
    pub fatal_decode_after: Option<(usize, usize)>,
    pub decoder_delay: usize,
    pub encoder_delay: usize,
    /// Every n-th frame pushed into a filter graph is refused
    pub filter_reject_every: Option<usize>,
    /// Video size at the filter graph sink
    pub graph_scale: Option<(u32, u32)>,
    /// (stream, frame) the encoder refuses
    pub encoder_reject_frames: Vec<(usize, usize)>,
    /// Streams whose encoder fails when flushed
    pub encoder_flush_error: Vec<usize>,
    /// (stream, frame) whose packet dts steps back behind the previous one
    pub encoder_dts_rewind: Vec<(usize, usize)>,
    /// Number of packets read before the input fails
    pub read_error_after: Option<usize>,
    /// Write attempts, counted from 1, the muxer refuses
    pub mux_fail_attempts: Vec<usize>,
    /// Time base the muxer forces on every stream when writing the header
    pub muxer_time_base: Option<Rational>,
}

impl Script {
    pub fn with_streams(streams: Vec<FakeStream>) -> Self {
        Self {
            streams,
            ..Default::default()
        }
    }

    /// 100 video packets and 50 audio packets
    pub fn video_and_audio() -> Self {
        Self::with_streams(vec![FakeStream::video(100), FakeStream::audio(50)])
    }
}

#[derive(Debug, Clone)]
pub struct FakePacket {
    pub stream: usize,
    pub seq: usize,
    pub pts: Option<i64>,
    pub dts: Option<i64>,
    pub duration: i64,
}

impl MediaPacket for FakePacket {
    fn stream_index(&self) -> usize {
        self.stream
    }

    fn set_stream_index(&mut self, index: usize) {
        self.stream = index;
    }

    fn pts(&self) -> Option<i64> {
        self.pts
    }

    fn set_pts(&mut self, pts: Option<i64>) {
        self.pts = pts;
    }

    fn dts(&self) -> Option<i64> {
        self.dts
    }

    fn set_dts(&mut self, dts: Option<i64>) {
        self.dts = dts;
    }

    fn duration(&self) -> i64 {
        self.duration
    }

    fn set_duration(&mut self, duration: i64) {
        self.duration = duration;
    }
}

#[derive(Debug, Clone)]
pub struct FakeFrame {
    pub pts: Option<i64>,
    pub time_base: Rational,
    pub samples: Option<i64>,
}

impl MediaFrame for FakeFrame {
    fn pts(&self) -> Option<i64> {
        self.pts
    }

    fn set_pts(&mut self, pts: Option<i64>) {
        self.pts = pts;
    }

    fn time_base(&self) -> Timebase {
        self.time_base
    }

    fn set_time_base(&mut self, time_base: Timebase) {
        self.time_base = time_base;
    }

    fn samples(&self) -> Option<i64> {
        self.samples
    }
}

fn release(ledger: &Rc<RefCell<Ledger>>, resource: Resource) {
    ledger.borrow_mut().events.push(Event::Free(resource));
}

pub struct FakeReader {
    ledger: Rc<RefCell<Ledger>>,
    script: Rc<Script>,
    queue: VecDeque<FakePacket>,
    reads: usize,
}

impl Drop for FakeReader {
    fn drop(&mut self) {
        release(&self.ledger, Resource::Input);
    }
}

impl ContainerReader for FakeReader {
    type Packet = FakePacket;

    fn format_name(&self) -> String {
        "fake".to_string()
    }

    fn duration(&self) -> Option<f64> {
        Some(4.0)
    }

    fn streams(&self) -> Vec<StreamDescriptor> {
        self.script
            .streams
            .iter()
            .enumerate()
            .map(|(index, s)| StreamDescriptor {
                index,
                kind: s.kind,
                codec: s.codec.clone(),
                time_base: s.time_base,
                frame_rate: s.frame_rate,
                side_data_count: usize::from(s.kind == MediaKind::Video),
                metadata: vec![("language".to_string(), "eng".to_string())],
            })
            .collect()
    }

    fn metadata(&self) -> Vec<(String, String)> {
        vec![("title".to_string(), "scripted input".to_string())]
    }

    fn read_packet(&mut self) -> TranscodeResult<Option<FakePacket>> {
        if self.script.read_error_after == Some(self.reads) {
            return Err(TranscodeError::ReadFailure {
                message: "Input/output error".to_string(),
            });
        }
        let packet = self.queue.pop_front();
        if packet.is_some() {
            self.reads += 1;
        }
        Ok(packet)
    }
}

pub struct FakeWriter {
    ledger: Rc<RefCell<Ledger>>,
    script: Rc<Script>,
    streams: Vec<Rational>,
    last_dts: Vec<Option<i64>>,
    header: bool,
}

impl Drop for FakeWriter {
    fn drop(&mut self) {
        release(&self.ledger, Resource::Output);
    }
}

impl FakeWriter {
    fn add_stream(&mut self, time_base: Rational) -> usize {
        self.streams.push(time_base);
        self.last_dts.push(None);
        self.ledger.borrow_mut().output_streams = self.streams.len();
        self.streams.len() - 1
    }
}

impl ContainerWriter for FakeWriter {
    type Packet = FakePacket;

    fn set_metadata(&mut self, entries: &[(String, String)]) {
        self.ledger.borrow_mut().output_metadata = entries.to_vec();
    }

    fn write_header(&mut self) -> TranscodeResult<()> {
        if self.script.fail_at == Some(FailAt::WriteHeader) {
            return Err(TranscodeError::HeaderWriteFailure {
                message: "Invalid argument".to_string(),
            });
        }
        if let Some(time_base) = self.script.muxer_time_base {
            for stream in self.streams.iter_mut() {
                *stream = time_base;
            }
        }
        self.header = true;
        self.ledger.borrow_mut().headers_written += 1;
        Ok(())
    }

    fn stream_time_base(&self, output_index: usize) -> Timebase {
        self.streams
            .get(output_index)
            .copied()
            .unwrap_or(Rational::raw(0, 1))
    }

    fn write_packet(&mut self, packet: FakePacket) -> TranscodeResult<()> {
        let mut ledger = self.ledger.borrow_mut();
        ledger.write_attempts += 1;
        if !self.header || self.script.mux_fail_attempts.contains(&ledger.write_attempts) {
            return Err(TranscodeError::MuxWriteFailure {
                stream_index: packet.stream,
                message: "Invalid data found when processing input".to_string(),
            });
        }
        // Interleaving muxers refuse a dts behind the last one on the same stream
        if let (Some(dts), Some(Some(last))) = (packet.dts, self.last_dts.get(packet.stream)) {
            if dts < *last {
                return Err(TranscodeError::MuxWriteFailure {
                    stream_index: packet.stream,
                    message: format!("non monotonically increasing dts: {} >= {}", last, dts),
                });
            }
        }
        if let Some(slot) = self.last_dts.get_mut(packet.stream) {
            if packet.dts.is_some() {
                *slot = packet.dts;
            }
        }
        ledger.written.push(Written {
            output_index: packet.stream,
            pts: packet.pts,
            dts: packet.dts,
            duration: packet.duration,
        });
        Ok(())
    }

    fn write_trailer(&mut self) -> TranscodeResult<()> {
        if self.script.fail_at == Some(FailAt::WriteTrailer) {
            return Err(TranscodeError::TrailerWriteFailure {
                message: "No space left on device".to_string(),
            });
        }
        self.ledger.borrow_mut().trailers_written += 1;
        Ok(())
    }
}

pub struct FakeDecoder {
    index: usize,
    ledger: Rc<RefCell<Ledger>>,
    script: Rc<Script>,
    format: StreamFormat,
    time_base: Rational,
    samples: Option<i64>,
    queue: VecDeque<FakeFrame>,
    deferred: HashSet<usize>,
    eof: bool,
    broken: bool,
}

impl Drop for FakeDecoder {
    fn drop(&mut self) {
        release(&self.ledger, Resource::Decoder(self.index));
    }
}

impl Decoder for FakeDecoder {
    type Packet = FakePacket;
    type Frame = FakeFrame;

    fn send_packet(&mut self, packet: &FakePacket) -> CodecResult<Feed> {
        let key = (self.index, packet.seq);
        if self.eof {
            return Err(CodecError::new("End of file"));
        }
        if self.script.corrupt_packets.contains(&key) {
            return Err(CodecError::new("Invalid data found when processing input"));
        }
        if self.script.would_block_packets.contains(&key) && self.deferred.insert(packet.seq) {
            return Ok(Feed::WouldBlock);
        }
        self.queue.push_back(FakeFrame {
            pts: packet.pts,
            time_base: self.time_base,
            samples: self.samples,
        });
        if self.script.fatal_decode_after == Some(key) {
            self.broken = true;
        }
        Ok(Feed::Accepted)
    }

    fn send_eof(&mut self) -> CodecResult<()> {
        self.eof = true;
        Ok(())
    }

    fn receive_frame(&mut self) -> CodecResult<Receive<FakeFrame>> {
        if self.broken {
            return Err(CodecError::new("Generic error in an external library"));
        }
        if self.queue.len() > self.script.decoder_delay || (self.eof && !self.queue.is_empty()) {
            return Ok(self.queue.pop_front().map_or(Receive::EndOfStream, Receive::Ready));
        }
        if self.eof {
            Ok(Receive::EndOfStream)
        } else {
            Ok(Receive::NeedMoreInput)
        }
    }

    fn output_format(&self) -> StreamFormat {
        self.format.clone()
    }
}

pub struct FakeGraph {
    index: usize,
    ledger: Rc<RefCell<Ledger>>,
    script: Rc<Script>,
    output: StreamFormat,
    time_base: Rational,
    queue: VecDeque<FakeFrame>,
    pushed: usize,
    eof: bool,
}

impl Drop for FakeGraph {
    fn drop(&mut self) {
        release(&self.ledger, Resource::Graph(self.index));
    }
}

impl FilterGraph for FakeGraph {
    type Frame = FakeFrame;

    fn push(&mut self, frame: Option<&FakeFrame>) -> CodecResult<()> {
        let Some(frame) = frame else {
            self.eof = true;
            return Ok(());
        };
        self.pushed += 1;
        if let Some(every) = self.script.filter_reject_every {
            if self.pushed % every == 0 {
                return Err(CodecError::new("Invalid argument"));
            }
        }
        self.queue.push_back(frame.clone());
        Ok(())
    }

    fn pull(&mut self) -> CodecResult<Receive<FakeFrame>> {
        match self.queue.pop_front() {
            Some(frame) => Ok(Receive::Ready(frame)),
            None if self.eof => Ok(Receive::EndOfStream),
            None => Ok(Receive::NeedMoreInput),
        }
    }

    fn output_time_base(&self) -> Timebase {
        self.time_base
    }

    fn output_format(&self) -> StreamFormat {
        self.output.clone()
    }

    fn set_frame_size(&mut self, samples: u32) {
        self.ledger.borrow_mut().frame_sizes.push((self.index, samples));
    }
}

pub struct FakeEncoder {
    index: usize,
    ledger: Rc<RefCell<Ledger>>,
    script: Rc<Script>,
    time_base: Rational,
    kind: MediaKind,
    queue: VecDeque<FakePacket>,
    frames: usize,
    flushing: bool,
}

impl Drop for FakeEncoder {
    fn drop(&mut self) {
        release(&self.ledger, Resource::Encoder(self.index));
    }
}

impl Encoder for FakeEncoder {
    type Packet = FakePacket;
    type Frame = FakeFrame;

    fn send_frame(&mut self, frame: Option<&FakeFrame>) -> CodecResult<Feed> {
        let Some(frame) = frame else {
            if self.script.encoder_flush_error.contains(&self.index) {
                return Err(CodecError::new("Generic error in an external library"));
            }
            self.flushing = true;
            return Ok(Feed::Accepted);
        };
        if self.flushing {
            return Err(CodecError::new("End of file"));
        }
        self.frames += 1;
        if self.script.encoder_reject_frames.contains(&(self.index, self.frames)) {
            return Err(CodecError::new("Invalid argument"));
        }
        let rewind = self.script.encoder_dts_rewind.contains(&(self.index, self.frames));
        self.queue.push_back(FakePacket {
            stream: 0,
            seq: self.frames,
            pts: frame.pts,
            dts: frame.pts.map(|pts| if rewind { pts - 2 } else { pts }),
            duration: 0,
        });
        Ok(Feed::Accepted)
    }

    fn receive_packet(&mut self) -> CodecResult<Receive<FakePacket>> {
        if self.queue.len() > self.script.encoder_delay || (self.flushing && !self.queue.is_empty()) {
            return Ok(self.queue.pop_front().map_or(Receive::EndOfStream, Receive::Ready));
        }
        if self.flushing {
            Ok(Receive::EndOfStream)
        } else {
            Ok(Receive::NeedMoreInput)
        }
    }

    fn time_base(&self) -> Timebase {
        self.time_base
    }

    fn frame_size(&self) -> Option<u32> {
        match self.kind {
            MediaKind::Audio => Some(1024),
            _ => None,
        }
    }
}

pub struct FakeBackend {
    pub script: Rc<Script>,
    pub ledger: Rc<RefCell<Ledger>>,
}

impl FakeBackend {
    pub fn new(script: Script) -> Self {
        Self {
            script: Rc::new(script),
            ledger: Rc::new(RefCell::new(Ledger::default())),
        }
    }

    /// Shared handle that outlives the transcoder
    pub fn ledger_handle(&self) -> Rc<RefCell<Ledger>> {
        Rc::clone(&self.ledger)
    }

    pub fn ledger(&self) -> Ref<'_, Ledger> {
        self.ledger.borrow()
    }

    fn fails(&self, at: FailAt) -> bool {
        self.script.fail_at == Some(at)
    }

    fn acquire(&self, resource: Resource) {
        self.ledger.borrow_mut().events.push(Event::Alloc(resource));
    }

    fn decoded_format(stream: &StreamDescriptor) -> StreamFormat {
        match stream.kind {
            MediaKind::Video => StreamFormat::Video(VideoFormat {
                width: 320,
                height: 240,
                pixel_format: "yuv420p".to_string(),
                sample_aspect_ratio: Rational::raw(1, 1),
                frame_rate: stream.frame_rate,
            }),
            _ => StreamFormat::Audio(AudioFormat {
                sample_rate: 48000,
                channels: 2,
                channel_layout: "stereo".to_string(),
                sample_format: "fltp".to_string(),
            }),
        }
    }
}

impl MediaBackend for FakeBackend {
    type Packet = FakePacket;
    type Frame = FakeFrame;
    type Reader = FakeReader;
    type Writer = FakeWriter;
    type Decoder = FakeDecoder;
    type Encoder = FakeEncoder;
    type Graph = FakeGraph;

    fn open_input(&self, path: &Path) -> TranscodeResult<FakeReader> {
        if self.fails(FailAt::OpenInput) {
            return Err(TranscodeError::InputOpenFailure {
                path: path.to_path_buf(),
                message: "Invalid data found when processing input".to_string(),
            });
        }
        self.acquire(Resource::Input);

        let longest = self.script.streams.iter().map(|s| s.packets).max().unwrap_or(0);
        let mut queue = VecDeque::new();
        for seq in 0..longest {
            for (stream, s) in self.script.streams.iter().enumerate() {
                if seq < s.packets {
                    let pts = seq as i64 * s.packet_duration;
                    queue.push_back(FakePacket {
                        stream,
                        seq,
                        pts: Some(pts),
                        dts: Some(pts),
                        duration: s.packet_duration,
                    });
                }
            }
        }

        Ok(FakeReader {
            ledger: self.ledger_handle(),
            script: Rc::clone(&self.script),
            queue,
            reads: 0,
        })
    }

    fn find_decoder(&self, stream: &StreamDescriptor) -> Option<CodecInfo> {
        if self.script.missing_decoders.contains(&stream.codec) {
            return None;
        }
        Some(CodecInfo {
            name: stream.codec.clone(),
            long_name: format!("{} decoder", stream.codec),
            kind: stream.kind,
            pixel_formats: Vec::new(),
            sample_formats: Vec::new(),
        })
    }

    fn open_decoder(
        &self,
        _reader: &FakeReader,
        stream: &StreamDescriptor,
        _codec: &CodecInfo,
        _threads: usize,
    ) -> TranscodeResult<FakeDecoder> {
        if self.fails(FailAt::OpenDecoder(stream.index)) {
            return Err(TranscodeError::DecoderOpenFailure {
                stream_index: stream.index,
                message: "Invalid argument".to_string(),
            });
        }
        self.acquire(Resource::Decoder(stream.index));
        let packet_duration = self.script.streams[stream.index].packet_duration;
        Ok(FakeDecoder {
            index: stream.index,
            ledger: self.ledger_handle(),
            script: Rc::clone(&self.script),
            format: Self::decoded_format(stream),
            time_base: stream.time_base,
            samples: (stream.kind == MediaKind::Audio).then_some(packet_duration),
            queue: VecDeque::new(),
            deferred: HashSet::new(),
            eof: false,
            broken: false,
        })
    }

    fn create_output(&self, path: &Path, _format: Option<&str>) -> TranscodeResult<FakeWriter> {
        if self.fails(FailAt::CreateOutput) {
            return Err(TranscodeError::OutputOpenFailure {
                path: path.to_path_buf(),
                message: "Permission denied".to_string(),
            });
        }
        fs::write(path, b"")?;
        self.acquire(Resource::Output);
        Ok(FakeWriter {
            ledger: self.ledger_handle(),
            script: Rc::clone(&self.script),
            streams: Vec::new(),
            last_dts: Vec::new(),
            header: false,
        })
    }

    fn find_encoder(&self, name: &str) -> Option<CodecInfo> {
        if self.script.missing_encoders.iter().any(|n| n == name) {
            return None;
        }
        let audio = ["aac", "opus", "mp3", "flac"].iter().any(|a| name.contains(a));
        Some(CodecInfo {
            name: name.to_string(),
            long_name: format!("{} encoder", name),
            kind: if audio { MediaKind::Audio } else { MediaKind::Video },
            pixel_formats: vec!["yuv420p".to_string()],
            sample_formats: vec!["fltp".to_string()],
        })
    }

    fn open_encoder(
        &self,
        writer: &mut FakeWriter,
        stream: &StreamDescriptor,
        settings: &EncoderSettings,
    ) -> TranscodeResult<(FakeEncoder, usize)> {
        if self.fails(FailAt::OpenEncoder(stream.index)) {
            return Err(TranscodeError::EncoderOpenFailure {
                stream_index: stream.index,
                message: "Invalid argument".to_string(),
            });
        }
        self.ledger.borrow_mut().encoder_settings.push(settings.clone());
        self.acquire(Resource::Encoder(stream.index));
        let encoder = FakeEncoder {
            index: stream.index,
            ledger: self.ledger_handle(),
            script: Rc::clone(&self.script),
            time_base: settings.time_base,
            kind: stream.kind,
            queue: VecDeque::new(),
            frames: 0,
            flushing: false,
        };
        let output_index = writer.add_stream(settings.time_base);
        Ok((encoder, output_index))
    }

    fn add_passthrough_stream(
        &self,
        writer: &mut FakeWriter,
        _reader: &FakeReader,
        stream: &StreamDescriptor,
    ) -> TranscodeResult<usize> {
        if self.fails(FailAt::Passthrough(stream.index)) {
            return Err(TranscodeError::AllocationFailure {
                what: format!("output stream for input stream #{}", stream.index),
            });
        }
        Ok(writer.add_stream(stream.time_base))
    }

    fn copy_side_data(
        &self,
        _writer: &mut FakeWriter,
        _reader: &FakeReader,
        input_index: usize,
        output_index: usize,
    ) -> TranscodeResult<()> {
        if self.fails(FailAt::SideData(input_index)) {
            return Err(TranscodeError::SideDataCopyFailure {
                stream_index: output_index,
                message: "Cannot allocate memory".to_string(),
            });
        }
        self.ledger.borrow_mut().side_data_copies.push((input_index, output_index));
        Ok(())
    }

    fn build_graph(&self, request: &GraphRequest) -> TranscodeResult<FakeGraph> {
        if self.fails(FailAt::BuildGraph(request.stream_index)) {
            return Err(TranscodeError::FilterGraphError {
                stream_index: request.stream_index,
                message: "No such filter".to_string(),
            });
        }
        self.ledger.borrow_mut().graph_requests.push(request.clone());
        self.acquire(Resource::Graph(request.stream_index));

        let output = match &request.output {
            StreamFormat::Video(v) => {
                let (width, height) = self.script.graph_scale.unwrap_or((v.width, v.height));
                // Sinks rarely know the frame rate
                StreamFormat::Video(VideoFormat {
                    width,
                    height,
                    frame_rate: None,
                    ..v.clone()
                })
            }
            audio => audio.clone(),
        };
        Ok(FakeGraph {
            index: request.stream_index,
            ledger: self.ledger_handle(),
            script: Rc::clone(&self.script),
            output,
            time_base: request.input_time_base,
            queue: VecDeque::new(),
            pushed: 0,
            eof: false,
        })
    }
}

/// Temporary directory with an input file that exists on disk
pub struct Fixture {
    pub dir: TempDir,
    pub input: PathBuf,
    pub output: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let input = dir.path().join("input.mkv");
        fs::write(&input, b"scripted").expect("write input");
        let output = dir.path().join("output.mp4");
        Self { dir, input, output }
    }

    pub fn config(&self) -> TranscodeConfig {
        let mut config = TranscodeConfig::default();
        config.input = Some(self.input.clone());
        config.output = Some(self.output.clone());
        config.threads = 1;
        config
    }
}

/// Every acquired resource is released exactly once: per stream the
/// encoder before the filter before the decoder, all of them before the
/// output container, and the output before the input.
pub fn assert_released_in_order(ledger: &Ledger) {
    let position = |event: Event| ledger.events.iter().position(|e| *e == event);

    for event in &ledger.events {
        if let Event::Alloc(resource) = event {
            let frees = ledger
                .events
                .iter()
                .filter(|e| **e == Event::Free(*resource))
                .count();
            assert_eq!(frees, 1, "{:?} released {} times", resource, frees);
        }
    }

    let input = position(Event::Free(Resource::Input));
    let output = position(Event::Free(Resource::Output));
    if let (Some(output), Some(input)) = (output, input) {
        assert!(output < input, "output released after input: {:?}", ledger.events);
    }

    for (at, event) in ledger.events.iter().enumerate() {
        if let Event::Free(Resource::Decoder(_) | Resource::Graph(_) | Resource::Encoder(_)) = event {
            if let Some(output) = output {
                assert!(at < output, "{:?} released after the output", event);
            }
            if let Some(input) = input {
                assert!(at < input, "{:?} released after the input", event);
            }
        }
    }

    let streams = ledger
        .events
        .iter()
        .filter_map(|e| match e {
            Event::Alloc(Resource::Decoder(i)) => Some(*i + 1),
            _ => None,
        })
        .max()
        .unwrap_or(0);
    for stream in 0..streams {
        let encoder = position(Event::Free(Resource::Encoder(stream)));
        let graph = position(Event::Free(Resource::Graph(stream)));
        let decoder = position(Event::Free(Resource::Decoder(stream)));
        if let (Some(e), Some(g)) = (encoder, graph) {
            assert!(e < g, "stream #{} filter released before its encoder", stream);
        }
        if let (Some(g), Some(d)) = (graph, decoder) {
            assert!(g < d, "stream #{} decoder released before its filter", stream);
        }
        if let (Some(e), Some(d)) = (encoder, decoder) {
            assert!(e < d, "stream #{} decoder released before its encoder", stream);
        }
    }
}
