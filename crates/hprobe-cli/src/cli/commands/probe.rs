//! `hprobe probe` – probe targets and stream results to stdout.

use anyhow::{Context, Result};
use hprobe_core::config::HprobeConfig;
use hprobe_core::logging::Verbosity;
use hprobe_core::sink;
use hprobe_core::{ConcurrencyPolicy, CurlProber, ProbeFlags, ProbeOptions, ProbeOutcome, ProbeResult, Runner};
use std::fs;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::Path;

use crate::cli::ProbeArgs;

/// Results buffered between the workers and the printer.
const RESULT_BUFFER: usize = 64;

pub async fn run_probe(args: ProbeArgs, cfg: &HprobeConfig, verbosity: Verbosity) -> Result<()> {
    let targets = collect_targets(&args)?;
    let options = build_options(&args, cfg, targets);
    let json = args.json;
    let report_failures = matches!(verbosity, Verbosity::Verbose | Verbosity::Debug);

    let prober = CurlProber::new(cfg.curl_settings());
    let mut runner = Runner::new(options, prober).with_user_agents(cfg.user_agent_pool());
    let (sink, mut rx) = sink::channel(RESULT_BUFFER);
    let run = tokio::spawn(async move { runner.run(sink).await });

    while let Some(result) = rx.recv().await {
        if let Err(e) = emit(&result, json, report_failures) {
            // Usually a closed pipe: stop reading, the runner cancels the rest.
            tracing::debug!("stdout closed: {}", e);
            break;
        }
    }
    drop(rx);

    let summary = run.await.context("probe task failed")??;
    tracing::info!(
        total = summary.total,
        succeeded = summary.succeeded,
        failed = summary.failed,
        "probe finished"
    );
    if report_failures {
        eprintln!(
            "probed {} target(s): {} responded, {} failed",
            summary.total, summary.succeeded, summary.failed
        );
    }
    Ok(())
}

fn emit(result: &ProbeResult, json: bool, report_failures: bool) -> io::Result<()> {
    if let ProbeOutcome::Failure(f) = &result.outcome {
        tracing::warn!(host = %result.target, kind = ?f.kind, "[Err] {}", f.error);
        if report_failures {
            eprintln!("[Err] {}: {}", result.target, f.error);
        }
    }

    let mut out = io::stdout().lock();
    if json {
        serde_json::to_writer(&mut out, result)?;
        writeln!(out)?;
    } else if let Some(line) = format_line(result) {
        writeln!(out, "{}", line)?;
    }
    out.flush()
}

/// Text form of a successful result:
/// `url [status] [length] [title] [tech,...] [sha256] [words] [lines]`, then
/// `[cdn]` when a CDN was reported. `None` for failures.
pub(crate) fn format_line(result: &ProbeResult) -> Option<String> {
    let r = result.record()?;
    let mut line = format!(
        "{} [{}] [{}] [{}] [{}] [{}] [{}] [{}]",
        r.url,
        r.status_code,
        r.content_length,
        r.title.as_deref().unwrap_or(""),
        r.technologies.join(","),
        r.hashes.get("sha256").map(String::as_str).unwrap_or(""),
        r.words,
        r.lines,
    );
    if let Some(cdn) = &r.cdn {
        line.push_str(&format!(" [{}]", cdn));
    }
    Some(line)
}

/// Command-line flags over config-file defaults.
pub(crate) fn build_options(args: &ProbeArgs, cfg: &HprobeConfig, targets: Vec<String>) -> ProbeOptions {
    let policy = if args.coerce_threads {
        ConcurrencyPolicy::Coerce
    } else {
        cfg.concurrency_policy
    };
    ProbeOptions::new(targets)
        .with_concurrency(args.threads.unwrap_or(cfg.threads))
        .with_concurrency_policy(policy)
        .with_method(args.method.clone().unwrap_or_else(|| cfg.method.clone()))
        .with_flags(ProbeFlags {
            random_agent: args.random_agent,
            output_cdn: args.output_cdn,
            exclude_cdn: args.exclude_cdn,
        })
}

/// Targets from arguments, then the list file; stdin only when both are empty
/// and stdin is not a terminal.
fn collect_targets(args: &ProbeArgs) -> Result<Vec<String>> {
    let mut targets = args.targets.clone();
    if let Some(path) = &args.list {
        targets.extend(read_target_file(path)?);
    }
    if targets.is_empty() && args.list.is_none() && !io::stdin().is_terminal() {
        let stdin = io::stdin();
        let lines = stdin
            .lock()
            .lines()
            .collect::<io::Result<Vec<_>>>()
            .context("read targets from stdin")?;
        targets = parse_target_lines(lines.iter().map(String::as_str));
    }
    Ok(targets)
}

fn read_target_file(path: &Path) -> Result<Vec<String>> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("read target list {}", path.display()))?;
    Ok(parse_target_lines(data.lines()))
}

/// One target per line; blank lines and `#` comments are skipped.
pub(crate) fn parse_target_lines<'a>(lines: impl Iterator<Item = &'a str>) -> Vec<String> {
    lines
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect()
}
