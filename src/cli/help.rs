//! CLI command-name contract for logging.

use crate::cli::parse::Commands;

/// Command name string used in log records (e.g. "serve", "generate").
pub fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Serve { .. } => "serve",
        Commands::Generate { .. } => "generate",
    }
}
