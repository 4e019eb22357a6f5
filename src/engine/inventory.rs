//! Stream inventory: opening the input and output containers and
//! building one decoder/filter/encoder chain per transcodable stream

use std::path::Path;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::TranscodeConfig;
use crate::domain::model::*;
use crate::domain::rules::{FilterRules, FormatSelector, StreamClassifier, StreamRole, TimestampRules};
use crate::engine::decoder::DecoderStage;
use crate::engine::encoder::EncoderStage;
use crate::engine::filter::FilterStage;
use crate::engine::session::{StreamContext, TranscodeSession};
use crate::error::{TranscodeError, TranscodeResult};
use crate::ports::{ContainerReader, ContainerWriter, Decoder, Encoder, FilterGraph, MediaBackend};

/// One row of the input inventory
#[derive(Debug, Clone, Serialize)]
pub struct InventoryEntry {
    #[serde(flatten)]
    pub stream: StreamDescriptor,
    pub role: StreamRole,
    /// Resolved decoder name for transcodable streams
    pub decoder: Option<String>,
}

/// Description of an input container without any output side effects
#[derive(Debug, Clone, Serialize)]
pub struct InputInventory {
    pub path: String,
    pub format: String,
    pub duration: Option<f64>,
    pub metadata: Vec<(String, String)>,
    pub streams: Vec<InventoryEntry>,
}

/// Open the input and classify its streams without opening any codec
pub fn inspect_input<B: MediaBackend>(
    backend: &B,
    path: &Path,
    config: &TranscodeConfig,
) -> TranscodeResult<InputInventory> {
    ensure_input_exists(path)?;
    let reader = backend.open_input(path)?;

    let streams = reader
        .streams()
        .into_iter()
        .map(|stream| {
            let role = StreamClassifier::role(stream.kind, config.passthrough);
            let decoder = match role {
                StreamRole::Transcode => backend.find_decoder(&stream).map(|c| c.name),
                _ => None,
            };
            InventoryEntry {
                stream,
                role,
                decoder,
            }
        })
        .collect();

    Ok(InputInventory {
        path: path.display().to_string(),
        format: reader.format_name(),
        duration: reader.duration(),
        metadata: reader.metadata(),
        streams,
    })
}

/// Open the input container and one decoder per audio/video stream.
///
/// Fails with `DecoderNotFound` before anything on the output side exists.
/// No packets are consumed.
pub fn open_input<B: MediaBackend>(
    backend: &B,
    path: &Path,
    config: &TranscodeConfig,
) -> TranscodeResult<TranscodeSession<B>> {
    ensure_input_exists(path)?;
    let reader = backend.open_input(path)?;
    let descriptors = reader.streams();
    info!(
        "Opened input {} ({}, {} streams)",
        path.display(),
        reader.format_name(),
        descriptors.len()
    );

    // Owned by the session from here on, so an early return releases it
    let mut session = TranscodeSession::new(reader);
    let threads = config.effective_threads();

    for descriptor in descriptors {
        let role = StreamClassifier::role(descriptor.kind, config.passthrough);
        if descriptor.kind == MediaKind::Unknown {
            warn!("Elementary stream #{} is of unknown type, dropping it", descriptor.index);
        }

        let mut context = StreamContext::new(descriptor, role);
        if role == StreamRole::Transcode {
            let descriptor = &context.descriptor;
            let codec = backend
                .find_decoder(descriptor)
                .ok_or_else(|| TranscodeError::DecoderNotFound {
                    stream_index: descriptor.index,
                    codec: descriptor.codec.clone(),
                })?;
            let reader = session.input.as_ref().ok_or_else(|| TranscodeError::AllocationFailure {
                what: "input container".to_string(),
            })?;
            let decoder = backend.open_decoder(reader, descriptor, &codec, threads)?;
            debug!(
                "Stream #{}: {} decoder '{}' opened",
                descriptor.index, descriptor.kind, codec.name
            );
            context.decoder = Some(DecoderStage::new(descriptor.index, decoder));
        }
        session.streams.push(context);
    }

    Ok(session)
}

/// Create the output container, open encoders (and filter graphs when
/// enabled), map pass-through streams, copy metadata and write the header.
pub fn open_output<B: MediaBackend>(
    backend: &B,
    session: &mut TranscodeSession<B>,
    path: &Path,
    config: &TranscodeConfig,
) -> TranscodeResult<()> {
    if session.streams.iter().all(|s| s.role == StreamRole::Drop) {
        return Err(TranscodeError::Configuration {
            message: "input has no stream that can be written to the output".to_string(),
        });
    }

    // Resolve both encoders before touching the filesystem
    let video_encoder = resolve_encoder(backend, session, MediaKind::Video, &config.video.codec)?;
    let audio_encoder = resolve_encoder(backend, session, MediaKind::Audio, &config.audio.codec)?;

    let writer = backend.create_output(path, config.format.as_deref())?;
    session.output = Some(writer);

    let TranscodeSession {
        streams,
        output,
        input,
        ..
    } = &mut *session;
    let (Some(writer), Some(reader)) = (output.as_mut(), input.as_ref()) else {
        return Err(TranscodeError::AllocationFailure {
            what: "container handles".to_string(),
        });
    };

    for context in streams.iter_mut() {
        match context.role {
            StreamRole::Transcode => {
                let codec = match context.descriptor.kind {
                    MediaKind::Video => video_encoder.as_ref(),
                    _ => audio_encoder.as_ref(),
                }
                .ok_or_else(|| TranscodeError::EncoderNotFound {
                    codec: context.descriptor.codec.clone(),
                })?;
                open_stream_encoder(backend, writer, reader, context, codec, config)?;
            }
            StreamRole::Passthrough => {
                let output_index = backend.add_passthrough_stream(writer, reader, &context.descriptor)?;
                debug!(
                    "Stream #{}: {} remuxed to output stream #{}",
                    context.index(),
                    context.descriptor.kind,
                    output_index
                );
                context.output_index = Some(output_index);
            }
            StreamRole::Drop => {
                debug!("Stream #{}: {} not written", context.index(), context.descriptor.kind);
            }
        }
    }

    writer.set_metadata(&reader.metadata());
    writer.write_header()?;
    adopt_output_time_bases(streams, writer);
    session.header_written = true;
    info!("Output {} header written", path.display());
    Ok(())
}

/// The muxer may adjust stream time bases while writing the header
fn adopt_output_time_bases<B: MediaBackend>(streams: &mut [StreamContext<B>], writer: &B::Writer) {
    for context in streams.iter_mut() {
        if let (Some(encoder), Some(output_index)) = (context.encoder.as_mut(), context.output_index) {
            encoder.set_output_time_base(writer.stream_time_base(output_index));
        }
    }
}

fn resolve_encoder<B: MediaBackend>(
    backend: &B,
    session: &TranscodeSession<B>,
    kind: MediaKind,
    name: &str,
) -> TranscodeResult<Option<CodecInfo>> {
    let needed = session
        .streams
        .iter()
        .any(|s| s.role == StreamRole::Transcode && s.descriptor.kind == kind);
    if !needed {
        return Ok(None);
    }
    backend
        .find_encoder(name)
        .map(Some)
        .ok_or_else(|| TranscodeError::EncoderNotFound {
            codec: name.to_string(),
        })
}

fn open_stream_encoder<B: MediaBackend>(
    backend: &B,
    writer: &mut B::Writer,
    reader: &B::Reader,
    context: &mut StreamContext<B>,
    codec: &CodecInfo,
    config: &TranscodeConfig,
) -> TranscodeResult<()> {
    let index = context.index();
    let decoder = context
        .decoder
        .as_ref()
        .ok_or_else(|| TranscodeError::DecoderNotFound {
            stream_index: index,
            codec: context.descriptor.codec.clone(),
        })?;
    let decoded = decoder.decoder().output_format();
    let mut target = FormatSelector::target_format(&decoded, codec);

    let mut filter = FilterStage::identity(index);
    if config.use_filter_graph {
        let description = match context.descriptor.kind {
            MediaKind::Video => &config.filter.video,
            _ => &config.filter.audio,
        };
        let request = GraphRequest {
            stream_index: index,
            description: FilterRules::constrained_description(description, &target),
            input: decoded.clone(),
            input_time_base: context.descriptor.time_base,
            output: target.clone(),
        };
        debug!("Stream #{}: filter graph '{}'", index, request.description);
        let graph = backend.build_graph(&request)?;
        target = graph_output_format(graph.output_format(), &decoded);
        filter = FilterStage::with_graph(index, graph);
    } else if FormatSelector::needs_conversion(&decoded, &target) {
        warn!(
            "Stream #{}: encoder '{}' does not accept the decoded format, enable the filter graph to convert it",
            index, codec.name
        );
    }

    let time_base = TimestampRules::encoder_time_base(&target, context.descriptor.time_base);
    let frame_rate = match &target {
        StreamFormat::Video(v) => v.frame_rate,
        StreamFormat::Audio(_) => None,
    };
    let settings = EncoderSettings {
        stream_index: index,
        codec: codec.clone(),
        format: target,
        time_base,
        profile: match context.descriptor.kind {
            MediaKind::Video => config.video_profile()?,
            _ => config.audio_profile()?,
        },
        level: match context.descriptor.kind {
            MediaKind::Video => config.video_level()?,
            _ => None,
        },
        color: match context.descriptor.kind {
            MediaKind::Video => Some(config.video.color),
            _ => None,
        },
        bit_rate: match context.descriptor.kind {
            MediaKind::Video => config.video.bit_rate,
            _ => config.audio.bit_rate,
        },
        threads: config.effective_threads(),
    };

    let (encoder, output_index) = backend.open_encoder(writer, &context.descriptor, &settings)?;
    backend.copy_side_data(writer, reader, index, output_index)?;

    if let Some(frame_size) = encoder.frame_size().filter(|n| *n > 0) {
        filter.set_frame_size(frame_size);
    }

    info!(
        "Stream #{}: {} {} -> {} (time base {}) on output stream #{}",
        index,
        context.descriptor.kind,
        context.descriptor.codec,
        codec.name,
        encoder.time_base(),
        output_index
    );

    context.encoder = Some(EncoderStage::new(
        index,
        output_index,
        encoder,
        frame_rate,
        config.timestamps.packet_dts_source,
        config.timestamps.packet_duration_source,
    ));
    context.filter = Some(filter);
    context.output_index = Some(output_index);
    Ok(())
}

/// Sinks do not always know the frame rate; keep the decoder's
fn graph_output_format(sink: StreamFormat, decoded: &StreamFormat) -> StreamFormat {
    match (sink, decoded) {
        (StreamFormat::Video(mut v), StreamFormat::Video(d)) => {
            if !v.frame_rate.is_some_and(|r| r.is_valid()) {
                v.frame_rate = d.frame_rate;
            }
            StreamFormat::Video(v)
        }
        (sink, _) => sink,
    }
}

fn ensure_input_exists(path: &Path) -> TranscodeResult<()> {
    if !path.exists() {
        return Err(TranscodeError::InputNotFound {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}
