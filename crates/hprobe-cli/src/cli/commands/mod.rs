//! CLI command handlers. Each command is in its own file.

mod config;
mod probe;

pub use config::run_config;
pub use probe::run_probe;

#[cfg(test)]
pub(crate) use probe::{build_options, format_line, parse_target_lines};
