//! CLI domain: parse, route, help, output, and presentation only.
//! Domain work is delegated to the server and the orchestrator.

mod help;
mod output;
mod parse;
mod presentation;
mod route;

pub use help::command_name;
pub use output::map_error;
pub use parse::{Cli, Commands};
pub use presentation::{format_generation_json, format_generation_text, GenerationSummary};
pub use route::RunContext;
