//! CLI module for the transcoder
//!
//! This module handles command-line argument parsing and command execution.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::utils::logging::{LogFormat, LogLevel};

pub mod args;
pub mod commands;

/// Single-pass media transcoder
///
/// Decodes every audio and video stream of the input, optionally routes the
/// frames through a filter graph, re-encodes them and remuxes everything
/// into the output container.
#[derive(Parser, Debug)]
#[command(name = "transcoder")]
#[command(about = "Transcode audio and video streams into a new container")]
#[command(version)]
#[command(long_about = None)]
pub struct Cli {
    /// Configuration file (.toml, .yaml or .yml)
    #[arg(short, long, env = "TRANSCODER_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    pub log_level: Option<LogLevel>,

    /// Logging format (pretty, compact, json)
    #[arg(long, global = true)]
    pub log_format: Option<LogFormat>,

    /// The command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Transcode an input file into an output file
    Run(args::RunArgs),
    /// List the streams of an input file and how they would be handled
    Inspect(args::InspectArgs),
}
