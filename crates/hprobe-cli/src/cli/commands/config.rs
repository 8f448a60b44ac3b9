//! `hprobe config` – show where the config lives and what it says.

use anyhow::Result;
use hprobe_core::config::HprobeConfig;
use std::path::Path;

pub fn run_config(cfg: &HprobeConfig, path: &Path) -> Result<()> {
    println!("# {}", path.display());
    print!("{}", cfg.to_toml_string()?);
    Ok(())
}
