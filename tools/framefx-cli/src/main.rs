//! framefx CLI: inspect instruction tracks and render single frames.
//!
//! Usage:
//!   framefx validate <TRACK>      Validate an instruction track file
//!   framefx filters               List the filter catalog
//!   framefx render <TRACK> ...    Render one frame through the engine
//!   framefx check                 Show which rendering backend is used

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "framefx",
    about = "Time-ranged filter composition for video frames",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate an instruction track file
    Validate {
        /// Path to the track JSON
        path: PathBuf,
    },

    /// List filter catalog entries and their defaults
    Filters {
        /// Catalog JSON to use instead of the configured one
        #[arg(long)]
        catalog: Option<PathBuf>,
    },

    /// Render a single frame of an image through a track
    Render {
        /// Path to the track JSON
        track: PathBuf,

        /// Source frame image
        #[arg(short, long)]
        input: PathBuf,

        /// Timestamp in seconds
        #[arg(long, default_value = "0.0")]
        at: f64,

        /// Output image path
        #[arg(short, long)]
        output: PathBuf,

        /// Source track id the input frame belongs to
        #[arg(long, default_value = "1")]
        track_id: u32,

        /// Catalog JSON to use instead of the configured one
        #[arg(long)]
        catalog: Option<PathBuf>,
    },

    /// Check which rendering backend would be chosen
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = framefx_common::config::AppConfig::load();

    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    framefx_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Validate { path } => commands::validate::run(path),
        Commands::Filters { catalog } => commands::filters::run(&config, catalog),
        Commands::Render {
            track,
            input,
            at,
            output,
            track_id,
            catalog,
        } => commands::render::run(&config, track, input, at, output, track_id, catalog).await,
        Commands::Check => commands::check::run(&config),
    }
}
