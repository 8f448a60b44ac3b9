//! CLI tests: argument parsing, option building and output formatting.

use super::{Cli, CliCommand, ProbeArgs};
use clap::Parser;

pub(super) fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(args).unwrap()
}

pub(super) fn parse_probe(args: &[&str]) -> ProbeArgs {
    match parse(args).command {
        CliCommand::Probe(p) => p,
        other => panic!("expected Probe, got {other:?}"),
    }
}
