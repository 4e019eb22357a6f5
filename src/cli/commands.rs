//! Command implementations

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::adapters::LibavBackend;
use crate::cli::args::{InspectArgs, RunArgs};
use crate::cli::Cli;
use crate::config::TranscodeConfig;
use crate::engine::{InputInventory, TranscodeReport, Transcoder};

/// Merge defaults, the configuration file, the environment and the global flags
pub fn load_config(cli: &Cli) -> Result<TranscodeConfig> {
    let mut config = TranscodeConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    config
        .apply_env()
        .context("Invalid TRANSCODER_* environment variable")?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }
    Ok(config)
}

/// Execute the run command
pub fn run(args: RunArgs, mut config: TranscodeConfig) -> Result<TranscodeReport> {
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    let backend = LibavBackend::new()?;
    let transcoder = Transcoder::new(backend, config);
    let report = transcoder.run().context("Transcoding failed")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if !report.succeeded() {
        anyhow::bail!(
            "{} packets could not be written to {}",
            report.mux_failures(),
            report.output.display()
        );
    }
    if let Some(read_error) = &report.read_error {
        warn!("Input ended early: {}", read_error);
    }
    Ok(report)
}

/// Execute the inspect command
pub fn inspect(args: InspectArgs, mut config: TranscodeConfig) -> Result<InputInventory> {
    config.input = Some(args.input.clone());

    let backend = LibavBackend::new()?;
    let transcoder = Transcoder::new(backend, config);
    let inventory = transcoder
        .inspect()
        .with_context(|| format!("Failed to inspect {}", args.input.display()))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&inventory)?);
    } else {
        print_inventory(&inventory);
    }
    Ok(inventory)
}

fn print_report(report: &TranscodeReport) {
    println!("Input:   {}", report.input.display());
    println!("Output:  {}", report.output.display());
    println!("Elapsed: {} ms", report.elapsed_ms);
    for stream in &report.streams {
        let target = stream
            .output_index
            .map(|i| format!("-> #{}", i))
            .unwrap_or_else(|| "dropped".to_string());
        println!(
            "  #{} {} ({}) {:?} {}: {} packets read, {} frames decoded, {} packets written",
            stream.index,
            stream.kind,
            stream.codec,
            stream.role,
            target,
            stream.packets_read,
            stream.frames_decoded,
            stream.packets_written
        );
        if stream.packets_rejected > 0 || stream.frames_filter_dropped > 0 || stream.frames_encode_dropped > 0 {
            println!(
                "     {} packets rejected, {} frames dropped by the filter, {} by the encoder",
                stream.packets_rejected, stream.frames_filter_dropped, stream.frames_encode_dropped
            );
        }
    }
    info!("{} packets written", report.packets_written());
}

fn print_inventory(inventory: &InputInventory) {
    println!("File:     {}", inventory.path);
    println!("Format:   {}", inventory.format);
    if let Some(duration) = inventory.duration {
        println!("Duration: {:.3}s", duration);
    }
    for (key, value) in &inventory.metadata {
        println!("  {}: {}", key, value);
    }
    for entry in &inventory.streams {
        let stream = &entry.stream;
        println!(
            "Stream #{}: {} {} time base {} -> {:?}{}",
            stream.index,
            stream.kind,
            stream.codec,
            stream.time_base,
            entry.role,
            entry
                .decoder
                .as_ref()
                .map(|d| format!(" (decoder {})", d))
                .unwrap_or_default()
        );
        if let Some(rate) = stream.frame_rate {
            println!("    frame rate {}", rate);
        }
        if stream.side_data_count > 0 {
            println!("    {} side data entries", stream.side_data_count);
        }
    }
}
