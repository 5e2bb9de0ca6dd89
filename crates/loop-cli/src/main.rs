//! Loop CLI: decode a short audio file into memory and loop it (or play it once) on a
//! CPAL output device, driven by console commands.
//!
//! ## Threads
//! - **Control** (this thread): decodes files, validates and queues transport intents,
//!   prints events and the position label.
//! - **Audio** (CPAL callback): owns the transport engine and renders blocks without
//!   locks or allocation.
//! - **Stdin reader**: forwards console lines to the control loop.

use anyhow::Result;
use clap::Parser;
use loop_cli::{cli, config::LoopCliConfig, runtime};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,loop_player=info,loop_cli=info")
        }))
        .with_writer(std::io::stderr)
        .init();

    if args.list_devices {
        return runtime::list_devices();
    }

    let config = LoopCliConfig::from_args(&args)?;
    runtime::run(config)
}
