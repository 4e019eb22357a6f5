//! Pipeline driver: read, decode, filter, encode and mux until the input
//! is exhausted, then flush every stage and finalize the output

use tracing::{debug, error, trace, warn};

use crate::domain::model::Timebase;
use crate::domain::rules::StreamRole;
use crate::engine::decoder::PacketOutcome;
use crate::engine::encoder::EncoderStage;
use crate::engine::filter::FilterStage;
use crate::engine::session::{StreamContext, TranscodeSession};
use crate::error::{TranscodeError, TranscodeResult};
use crate::ports::{ContainerReader, ContainerWriter, MediaBackend, MediaFrame, MediaPacket};

/// What the driver observed besides the per-stream counters
#[derive(Debug, Clone, Default)]
pub struct PipelineSummary {
    /// Read failure that ended the input early, if any
    pub read_error: Option<String>,
}

/// Drive a session whose input and output are open and whose header is written.
///
/// Returns an error only for fatal conditions; the trailer is then not written.
pub fn run<B: MediaBackend>(session: &mut TranscodeSession<B>) -> TranscodeResult<PipelineSummary> {
    if !session.header_written {
        return Err(TranscodeError::Configuration {
            message: "pipeline started before the output header was written".to_string(),
        });
    }

    let TranscodeSession {
        streams,
        output,
        input,
        ..
    } = &mut *session;
    let (Some(writer), Some(reader)) = (output.as_mut(), input.as_mut()) else {
        return Err(TranscodeError::Configuration {
            message: "pipeline started without open containers".to_string(),
        });
    };

    let mut summary = PipelineSummary::default();
    loop {
        let packet = match reader.read_packet() {
            Ok(Some(packet)) => packet,
            Ok(None) => break,
            Err(e) => {
                error!("{}, treating as end of input", e);
                summary.read_error = Some(e.to_string());
                break;
            }
        };

        let index = packet.stream_index();
        let Some(context) = streams.get_mut(index) else {
            debug!("Packet for unknown stream #{} ignored", index);
            continue;
        };
        context.packets_read += 1;
        trace!("Demuxer gave packet of stream_index {}", index);

        match context.role {
            StreamRole::Transcode => transcode_packet(context, writer, packet)?,
            StreamRole::Passthrough => remux_packet(context, writer, packet),
            StreamRole::Drop => {}
        }
    }

    debug!("End of input, flushing streams");
    for context in streams.iter_mut().filter(|c| c.role == StreamRole::Transcode) {
        if let Err(e) = flush_stream(context, writer) {
            if e.is_fatal() {
                return Err(e);
            }
            warn!("Flushing stream #{} aborted: {}", context.index(), e);
        }
    }

    writer.write_trailer()?;
    session.trailer_written = true;
    Ok(summary)
}

/// Packet sink that counts successes and failures instead of failing the run
struct Muxer<'a, W: ContainerWriter> {
    writer: &'a mut W,
    packets_written: &'a mut u64,
    mux_failures: &'a mut u64,
}

impl<'a, W: ContainerWriter> Muxer<'a, W> {
    fn write(&mut self, packet: W::Packet) {
        match self.writer.write_packet(packet) {
            Ok(()) => *self.packets_written += 1,
            Err(e) => {
                error!("{}", e);
                *self.mux_failures += 1;
            }
        }
    }
}

fn remux_packet<B: MediaBackend>(context: &mut StreamContext<B>, writer: &mut B::Writer, mut packet: B::Packet) {
    let Some(output_index) = context.output_index else {
        return;
    };
    let output_time_base = writer.stream_time_base(output_index);
    packet.set_stream_index(output_index);
    packet.rescale_ts(context.descriptor.time_base, output_time_base);

    Muxer {
        writer,
        packets_written: &mut context.packets_written,
        mux_failures: &mut context.mux_failures,
    }
    .write(packet);
}

fn transcode_packet<B: MediaBackend>(
    context: &mut StreamContext<B>,
    writer: &mut B::Writer,
    packet: B::Packet,
) -> TranscodeResult<()> {
    let StreamContext {
        descriptor,
        decoder,
        filter,
        encoder,
        packets_written,
        mux_failures,
        ..
    } = context;
    let (Some(decoder), Some(filter), Some(encoder)) = (decoder.as_mut(), filter.as_mut(), encoder.as_mut()) else {
        return Ok(());
    };
    let time_base = descriptor.time_base;
    let mut muxer = Muxer {
        writer,
        packets_written,
        mux_failures,
    };

    match decoder.feed(&packet)? {
        PacketOutcome::Accepted => {}
        PacketOutcome::Rejected => return Ok(()),
        PacketOutcome::WouldBlock => {
            forward_frames::<B, _>(decoder.drain(), time_base, filter, encoder, &mut muxer)?;
            match decoder.feed(&packet)? {
                PacketOutcome::Accepted => {}
                PacketOutcome::Rejected => return Ok(()),
                PacketOutcome::WouldBlock => {
                    warn!(
                        stream = descriptor.index,
                        "Decoder still full after draining, skipping packet"
                    );
                    return Ok(());
                }
            }
        }
    }
    drop(packet);

    forward_frames::<B, _>(decoder.drain(), time_base, filter, encoder, &mut muxer)
}

/// Push decoded frames through the filter and encoder. Decode errors are
/// returned; encode errors drop the frame.
fn forward_frames<B, I>(
    frames: I,
    time_base: Timebase,
    filter: &mut FilterStage<B::Graph>,
    encoder: &mut EncoderStage<B::Encoder>,
    muxer: &mut Muxer<'_, B::Writer>,
) -> TranscodeResult<()>
where
    B: MediaBackend,
    I: Iterator<Item = TranscodeResult<B::Frame>>,
{
    for frame in frames {
        let mut frame = frame?;
        frame.set_time_base(time_base);
        for filtered in filter.apply(frame) {
            if let Err(e) = encode_frame::<B>(encoder, Some(filtered), muxer) {
                warn!("{}, frame dropped", e);
            }
        }
    }
    Ok(())
}

fn encode_frame<B: MediaBackend>(
    encoder: &mut EncoderStage<B::Encoder>,
    frame: Option<B::Frame>,
    muxer: &mut Muxer<'_, B::Writer>,
) -> TranscodeResult<()> {
    trace!("Encoding frame");
    for packet in encoder.feed(frame)? {
        muxer.write(packet?);
    }
    Ok(())
}

/// Flush one transcoded stream: decoder through filter and encoder, then
/// the filter through the encoder, then the encoder itself. Encode errors
/// end this stream's flush only.
fn flush_stream<B: MediaBackend>(context: &mut StreamContext<B>, writer: &mut B::Writer) -> TranscodeResult<()> {
    let StreamContext {
        descriptor,
        decoder,
        filter,
        encoder,
        packets_written,
        mux_failures,
        ..
    } = context;
    let (Some(decoder), Some(filter), Some(encoder)) = (decoder.as_mut(), filter.as_mut(), encoder.as_mut()) else {
        return Ok(());
    };
    let mut muxer = Muxer {
        writer,
        packets_written,
        mux_failures,
    };

    for frame in decoder.flush()? {
        let mut frame = frame?;
        frame.set_time_base(descriptor.time_base);
        for filtered in filter.apply(frame) {
            encode_frame::<B>(encoder, Some(filtered), &mut muxer)?;
        }
    }

    for filtered in filter.flush() {
        encode_frame::<B>(encoder, Some(filtered), &mut muxer)?;
    }

    encode_frame::<B>(encoder, None, &mut muxer)?;
    debug!(stream = descriptor.index, "Stream flushed");
    Ok(())
}
