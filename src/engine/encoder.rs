//! Encoder stage: per-stream frame to packet state machine with timestamp reconciliation

use tracing::{debug, warn};

use crate::domain::model::{rescale, DtsSource, DurationSource, Rational, Timebase};
use crate::domain::rules::TimestampRules;
use crate::error::{TranscodeError, TranscodeResult};
use crate::ports::{Encoder, Feed, MediaFrame, MediaPacket, Receive};

/// Encoding stage for one output stream.
///
/// Timestamps cross two boundaries: a frame's pts is rescaled from the
/// frame's time base into the encoder time base before submission, and
/// every emitted packet is rescaled from the encoder time base into the
/// output stream time base before muxing.
pub struct EncoderStage<E: Encoder> {
    stream_index: usize,
    output_index: usize,
    encoder: E,
    output_time_base: Timebase,
    dts_source: DtsSource,
    duration_source: DurationSource,
    frame_rate: Option<Rational>,
    /// Frame waiting to be resubmitted after the encoder asked to be drained
    pending: Option<E::Frame>,
    /// Time base of the frame fed in the current call, `None` while flushing
    fed_time_base: Option<Timebase>,
    fed_samples: Option<i64>,
    flushed: bool,
    warned_dts_base: bool,
    frames_encoded: u64,
    packets_encoded: u64,
    frames_dropped: u64,
}

impl<E: Encoder> EncoderStage<E> {
    pub fn new(
        stream_index: usize,
        output_index: usize,
        encoder: E,
        frame_rate: Option<Rational>,
        dts_source: DtsSource,
        duration_source: DurationSource,
    ) -> Self {
        let output_time_base = encoder.time_base();
        Self {
            stream_index,
            output_index,
            encoder,
            output_time_base,
            dts_source,
            duration_source,
            frame_rate,
            pending: None,
            fed_time_base: None,
            fed_samples: None,
            flushed: false,
            warned_dts_base: false,
            frames_encoded: 0,
            packets_encoded: 0,
            frames_dropped: 0,
        }
    }

    pub fn output_index(&self) -> usize {
        self.output_index
    }

    pub fn encoder(&self) -> &E {
        &self.encoder
    }

    pub fn time_base(&self) -> Timebase {
        self.encoder.time_base()
    }

    /// Output stream time base, which the muxer may only settle while writing the header
    pub fn set_output_time_base(&mut self, time_base: Timebase) {
        self.output_time_base = time_base;
    }

    pub fn frames_encoded(&self) -> u64 {
        self.frames_encoded
    }

    pub fn packets_encoded(&self) -> u64 {
        self.packets_encoded
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped
    }

    pub fn is_flushed(&self) -> bool {
        self.flushed
    }

    /// Submit a frame, or `None` to flush, and return the packets it releases.
    ///
    /// A frame the encoder refuses is counted as dropped and reported as an
    /// `EncodeError`; the stage stays usable.
    pub fn feed(&mut self, frame: Option<E::Frame>) -> TranscodeResult<EncodedPackets<'_, E>> {
        let Some(mut frame) = frame else {
            return self.begin_flush();
        };
        if self.flushed {
            self.frames_dropped += 1;
            return Err(self.error("frame submitted after flush"));
        }

        let encoder_tb = self.encoder.time_base();
        let frame_tb = frame.time_base();
        if let Some(pts) = frame.pts() {
            frame.set_pts(Some(rescale(pts, frame_tb, encoder_tb)));
        }
        if !self.warned_dts_base && self.dts_source == DtsSource::Frame && frame_tb != encoder_tb {
            self.warned_dts_base = true;
            warn!(
                stream = self.stream_index,
                "Packet dts is rescaled from the frame time base {} into the encoder time base {}",
                frame_tb,
                encoder_tb
            );
        }
        self.fed_time_base = Some(frame_tb);
        self.fed_samples = frame.samples();

        match self.encoder.send_frame(Some(&frame)) {
            Ok(Feed::Accepted) => self.frames_encoded += 1,
            Ok(Feed::WouldBlock) => self.pending = Some(frame),
            Err(e) => {
                self.frames_dropped += 1;
                return Err(self.error(&e.to_string()));
            }
        }
        Ok(EncodedPackets {
            stage: self,
            finished: false,
        })
    }

    fn begin_flush(&mut self) -> TranscodeResult<EncodedPackets<'_, E>> {
        // Drained packets keep the last frame's sample count as their duration estimate
        self.fed_time_base = None;
        if self.flushed {
            return Ok(EncodedPackets {
                stage: self,
                finished: true,
            });
        }
        debug!(stream = self.stream_index, "Flushing encoder");
        self.flushed = true;
        self.pending = None;
        self.encoder
            .send_frame(None)
            .map_err(|e| self.error(&e.to_string()))?;
        Ok(EncodedPackets {
            stage: self,
            finished: false,
        })
    }

    /// Retry a frame the encoder deferred. Returns false when it still refuses it.
    fn resubmit_pending(&mut self) -> TranscodeResult<bool> {
        let Some(frame) = self.pending.take() else {
            return Ok(false);
        };
        match self.encoder.send_frame(Some(&frame)) {
            Ok(Feed::Accepted) => {
                self.frames_encoded += 1;
                Ok(true)
            }
            Ok(Feed::WouldBlock) => {
                self.frames_dropped += 1;
                Err(self.error("encoder refused frame after draining"))
            }
            Err(e) => {
                self.frames_dropped += 1;
                Err(self.error(&e.to_string()))
            }
        }
    }

    /// Reconcile one encoder packet for the muxer, in order: tag with the
    /// output stream, rescale dts from the fed frame's time base, derive a
    /// missing duration, rescale into the output stream time base.
    fn finish_packet(&mut self, packet: &mut E::Packet) {
        let encoder_tb = self.encoder.time_base();

        packet.set_stream_index(self.output_index);

        if let (Some(frame_tb), Some(dts), DtsSource::Frame) =
            (self.fed_time_base, packet.dts(), self.dts_source)
        {
            packet.set_dts(Some(rescale(dts, frame_tb, encoder_tb)));
        }

        if packet.duration() <= 0 {
            packet.set_duration(TimestampRules::fallback_duration(
                self.duration_source,
                encoder_tb,
                self.frame_rate,
                self.fed_samples,
            ));
        }

        packet.rescale_ts(encoder_tb, self.output_time_base);
        self.packets_encoded += 1;
    }

    fn error(&self, message: &str) -> TranscodeError {
        TranscodeError::EncodeError {
            stream_index: self.stream_index,
            message: message.to_string(),
        }
    }
}

/// Lazy sequence of muxer-ready packets, ended by `NeedMoreInput` or
/// `EndOfStream`. An encoder failure yields one `EncodeError` and ends it.
pub struct EncodedPackets<'a, E: Encoder> {
    stage: &'a mut EncoderStage<E>,
    finished: bool,
}

impl<'a, E: Encoder> Iterator for EncodedPackets<'a, E> {
    type Item = TranscodeResult<E::Packet>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.finished {
                return None;
            }
            let stage = &mut *self.stage;
            match stage.encoder.receive_packet() {
                Ok(Receive::Ready(mut packet)) => {
                    stage.finish_packet(&mut packet);
                    return Some(Ok(packet));
                }
                Ok(Receive::NeedMoreInput) => match stage.resubmit_pending() {
                    Ok(true) => continue,
                    Ok(false) => {
                        self.finished = true;
                        return None;
                    }
                    Err(e) => {
                        self.finished = true;
                        return Some(Err(e));
                    }
                },
                Ok(Receive::EndOfStream) => {
                    self.finished = true;
                    return None;
                }
                Err(e) => {
                    self.finished = true;
                    stage.pending = None;
                    return Some(Err(stage.error(&e.to_string())));
                }
            }
        }
    }
}
