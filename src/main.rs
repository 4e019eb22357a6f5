//! Transcoder CLI
//!
//! A single-pass media transcoder: demux, decode, optionally filter,
//! re-encode and remux with FFmpeg.
//!
//! # Usage
//!
//! ```bash
//! transcoder run input.mov output.mp4
//! transcoder run input.mkv output.mp4 --filter --video-filter "scale=1280:-2"
//! transcoder inspect input.mov --json
//! ```

use anyhow::Result;
use clap::Parser;
use tracing::info;

use transcoder_cli::cli::{commands, Cli, Commands};
use transcoder_cli::utils::logging::LoggingSystem;

/// Main entry point for the transcoder CLI
fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = commands::load_config(&cli)?;

    let logging = LoggingSystem::new(config.logging.clone());
    logging
        .initialize()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;
    logging.log_system_info();

    match cli.command {
        Commands::Run(args) => {
            info!("Executing run command");
            commands::run(args, config)?;
        }
        Commands::Inspect(args) => {
            info!("Executing inspect command");
            commands::inspect(args, config)?;
        }
    }
    Ok(())
}
