//! CLI for the hprobe HTTP prober.

mod commands;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use hprobe_core::config::{self, HprobeConfig};
use hprobe_core::logging::{self, Verbosity};
use std::path::{Path, PathBuf};

use commands::{run_config, run_probe};

/// Top-level CLI for hprobe.
#[derive(Debug, Parser)]
#[command(name = "hprobe")]
#[command(about = "hprobe: concurrent HTTP prober", long_about = None)]
pub struct Cli {
    /// Only print results; log errors only.
    #[arg(long, global = true, conflicts_with_all = ["verbose", "debug"])]
    pub silent: bool,

    /// Also report failed targets on stderr and log per-target outcomes.
    #[arg(short, long, global = true, conflicts_with = "debug")]
    pub verbose: bool,

    /// Log everything, including transport attempts.
    #[arg(long, global = true)]
    pub debug: bool,

    /// Read configuration from PATH instead of the XDG config file.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Probe hosts or URLs and print one line per responding target.
    Probe(ProbeArgs),

    /// Show the config file path and its effective contents.
    Config,
}

#[derive(Debug, Clone, Default, Args)]
pub struct ProbeArgs {
    /// Hosts or URLs to probe. Read from --list or stdin when empty.
    pub targets: Vec<String>,

    /// File with one target per line.
    #[arg(short = 'l', long = "list", value_name = "FILE")]
    pub list: Option<PathBuf>,

    /// Concurrent probes (defaults to `threads` from the config file).
    #[arg(short = 't', long, value_name = "N", allow_negative_numbers = true)]
    pub threads: Option<i64>,

    /// HTTP method (defaults to `method` from the config file).
    #[arg(short = 'X', long, value_name = "METHOD")]
    pub method: Option<String>,

    /// Send a random browser user agent with each request.
    #[arg(long)]
    pub random_agent: bool,

    /// Show the CDN name for CDN-fronted hosts.
    #[arg(long = "cdn")]
    pub output_cdn: bool,

    /// Report CDN-fronted hosts as failures instead of results.
    #[arg(long)]
    pub exclude_cdn: bool,

    /// Run with one worker when --threads is below 1 instead of failing.
    #[arg(long)]
    pub coerce_threads: bool,

    /// Print results as JSON lines.
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    pub fn verbosity(&self) -> Verbosity {
        if self.debug {
            Verbosity::Debug
        } else if self.verbose {
            Verbosity::Verbose
        } else if self.silent {
            Verbosity::Silent
        } else {
            Verbosity::Normal
        }
    }
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let verbosity = cli.verbosity();
        if let Err(e) = logging::init_logging(verbosity) {
            logging::init_logging_stderr(verbosity);
            tracing::warn!("file logging unavailable, using stderr: {:#}", e);
        }

        let (cfg, cfg_path) = load_config(cli.config.as_deref())?;
        tracing::debug!("loaded config from {}: {:?}", cfg_path.display(), cfg);

        match cli.command {
            CliCommand::Probe(args) => {
                run_probe(args, &cfg, verbosity).await?;
            }
            CliCommand::Config => run_config(&cfg, &cfg_path)?,
        }

        Ok(())
    }
}

/// Explicit `--config` file, or the XDG config (created on first use).
fn load_config(explicit: Option<&Path>) -> Result<(HprobeConfig, PathBuf)> {
    match explicit {
        Some(path) => Ok((config::load_from_path(path)?, path.to_path_buf())),
        None => Ok((config::load_or_init()?, config::config_path()?)),
    }
}

#[cfg(test)]
mod tests;
