//! Configuration CLI commands.

use std::path::Path;

use burnpipe::config::EngineConfig;
use clap::Subcommand;

use super::common::display_path;
use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration as INI (default)
    Show,

    /// Show the configuration file path
    Path,

    /// Write the effective configuration to the configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Run a config subcommand against the file at `path`.
pub fn run(
    command: Option<ConfigCommands>,
    config: &EngineConfig,
    path: &Path,
) -> Result<(), CliError> {
    match command.unwrap_or(ConfigCommands::Show) {
        ConfigCommands::Show => {
            println!("# {}", display_path(path));
            print!("{}", config.to_ini());
            Ok(())
        }
        ConfigCommands::Path => {
            println!("{}", path.display());
            Ok(())
        }
        ConfigCommands::Init { force } => run_init(config, path, force),
    }
}

fn run_init(config: &EngineConfig, path: &Path, force: bool) -> Result<(), CliError> {
    if path.exists() && !force {
        return Err(CliError::Config(format!(
            "{} already exists. Use --force to overwrite it.",
            display_path(path)
        )));
    }
    config.save_to(path)?;
    println!("Wrote {}", display_path(path));
    Ok(())
}
