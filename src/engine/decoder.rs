//! Decoder stage: per-stream packet to frame state machine

use tracing::{debug, warn};

use crate::error::{TranscodeError, TranscodeResult};
use crate::ports::{Decoder, Feed, Receive};

/// Decoder lifecycle. `Idle -> Feeding -> Draining -> Idle` for each packet,
/// `Flushing -> Drained` once at end of input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecoderState {
    Idle,
    Feeding,
    Draining,
    Flushing,
    Drained,
}

/// Result of offering one packet to the decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketOutcome {
    Accepted,
    /// Frames must be drained before the packet can be resubmitted
    WouldBlock,
    /// The decoder refused the packet; it is skipped
    Rejected,
}

/// Decoding stage for one input stream
pub struct DecoderStage<D: Decoder> {
    stream_index: usize,
    decoder: D,
    state: DecoderState,
    frames_decoded: u64,
    packets_rejected: u64,
}

impl<D: Decoder> DecoderStage<D> {
    pub fn new(stream_index: usize, decoder: D) -> Self {
        Self {
            stream_index,
            decoder,
            state: DecoderState::Idle,
            frames_decoded: 0,
            packets_rejected: 0,
        }
    }

    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    pub fn packets_rejected(&self) -> u64 {
        self.packets_rejected
    }

    /// The underlying decoder
    pub fn decoder(&self) -> &D {
        &self.decoder
    }

    /// Submit one packet. A packet the decoder rejects is logged and skipped;
    /// only feeding after the flush sentinel is an error.
    pub fn feed(&mut self, packet: &D::Packet) -> TranscodeResult<PacketOutcome> {
        if matches!(self.state, DecoderState::Flushing | DecoderState::Drained) {
            return Err(TranscodeError::DecodeError {
                stream_index: self.stream_index,
                message: "packet submitted after end of stream".to_string(),
            });
        }

        self.state = DecoderState::Feeding;
        match self.decoder.send_packet(packet) {
            Ok(Feed::Accepted) => Ok(PacketOutcome::Accepted),
            Ok(Feed::WouldBlock) => Ok(PacketOutcome::WouldBlock),
            Err(e) => {
                self.packets_rejected += 1;
                self.state = DecoderState::Idle;
                warn!(
                    stream = self.stream_index,
                    "Decoding failed, skipping packet: {}", e
                );
                Ok(PacketOutcome::Rejected)
            }
        }
    }

    /// Frames ready after the last submitted packet
    pub fn drain(&mut self) -> DecodedFrames<'_, D> {
        if self.state != DecoderState::Flushing && self.state != DecoderState::Drained {
            self.state = DecoderState::Draining;
        }
        DecodedFrames {
            stage: self,
            finished: false,
        }
    }

    /// Send the end-of-input sentinel and drain every buffered frame
    pub fn flush(&mut self) -> TranscodeResult<DecodedFrames<'_, D>> {
        if self.state == DecoderState::Drained {
            return Ok(DecodedFrames {
                stage: self,
                finished: true,
            });
        }
        if self.state != DecoderState::Flushing {
            debug!(stream = self.stream_index, "Flushing decoder");
            self.decoder
                .send_eof()
                .map_err(|e| TranscodeError::DecodeError {
                    stream_index: self.stream_index,
                    message: e.to_string(),
                })?;
            self.state = DecoderState::Flushing;
        }
        Ok(DecodedFrames {
            stage: self,
            finished: false,
        })
    }
}

/// Lazy sequence of decoded frames, ended by `NeedMoreInput` or `EndOfStream`.
/// Any other decoder status yields one `DecodeError` and ends the sequence.
pub struct DecodedFrames<'a, D: Decoder> {
    stage: &'a mut DecoderStage<D>,
    finished: bool,
}

impl<'a, D: Decoder> Iterator for DecodedFrames<'a, D> {
    type Item = TranscodeResult<D::Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let stage = &mut *self.stage;
        match stage.decoder.receive_frame() {
            Ok(Receive::Ready(frame)) => {
                stage.frames_decoded += 1;
                Some(Ok(frame))
            }
            Ok(Receive::NeedMoreInput) => {
                self.finished = true;
                if stage.state == DecoderState::Draining {
                    stage.state = DecoderState::Idle;
                }
                None
            }
            Ok(Receive::EndOfStream) => {
                self.finished = true;
                stage.state = DecoderState::Drained;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(TranscodeError::DecodeError {
                    stream_index: stage.stream_index,
                    message: e.to_string(),
                }))
            }
        }
    }
}
