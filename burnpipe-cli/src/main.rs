//! burnpipe CLI - command-line front end for the burnpipe engine.
//!
//! ```text
//! burnpipe [--config FILE] [--log-level LEVEL] <COMMAND>
//!
//!   fetch <SRC> <DEST>            copy a file or tree onto local storage
//!   image <FILES>... -o <DIR>     build one image from the files, in order
//!   config [show|path|init]       inspect or write the configuration
//! ```

mod commands;
mod error;
mod stages;

use std::path::PathBuf;

use burnpipe::config::{config_file_path, EngineConfig};
use burnpipe::logging;
use clap::{Parser, Subcommand};
use tracing::debug;

use commands::config::ConfigCommands;
use commands::fetch::FetchArgs;
use commands::image::ImageArgs;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "burnpipe", version, about = "Disc-burning job pipelines from the command line")]
struct Cli {
    /// Configuration file (defaults to the per-user config.ini)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level or filter directive, overrides the configuration file
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Copy a file or directory tree onto local storage
    Fetch(FetchArgs),

    /// Concatenate files into an image through a source/sink pipeline
    Image(ImageArgs),

    /// Show or write the configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let path = cli.config.unwrap_or_else(config_file_path);
    let mut config = EngineConfig::load_from(&path)?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }

    // Keep the guard alive so buffered file logs are flushed on exit.
    let _guard = logging::init(&config.logging)?;
    debug!(config = %path.display(), "configuration loaded");

    match cli.command {
        Commands::Fetch(args) => commands::fetch::run(args, &config),
        Commands::Image(args) => commands::image::run(args, &config),
        Commands::Config { command } => commands::config::run(command, &config, &path),
    }
}
