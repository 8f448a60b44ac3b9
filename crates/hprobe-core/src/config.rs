use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::agent::UserAgentPool;
use crate::options::{ConcurrencyPolicy, DEFAULT_METHOD};
use crate::prober::CurlSettings;
use crate::retry::RetryPolicy;

/// Retry policy parameters (optional section in config.toml).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts per candidate URL (including the first).
    pub max_attempts: u32,
    /// Base delay in seconds for exponential backoff (e.g. 0.25 = 250ms).
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            base_delay_secs: 0.25,
            max_delay_secs: 5,
        }
    }
}

impl RetryConfig {
    pub fn to_policy(&self) -> RetryPolicy {
        let base = if self.base_delay_secs.is_finite() && self.base_delay_secs > 0.0 {
            Duration::from_secs_f64(self.base_delay_secs)
        } else {
            Duration::ZERO
        };
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: base,
            max_delay: Duration::from_secs(self.max_delay_secs),
        }
    }
}

/// Global configuration loaded from `~/.config/hprobe/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HprobeConfig {
    /// Default number of concurrent workers.
    pub threads: i64,
    /// Default HTTP method.
    pub method: String,
    /// "reject" (default) or "coerce": what to do with threads below 1.
    #[serde(default)]
    pub concurrency_policy: ConcurrencyPolicy,
    pub connect_timeout_secs: u64,
    /// Whole-request timeout.
    pub timeout_secs: u64,
    pub follow_redirects: bool,
    pub max_redirects: u32,
    /// Response bodies are read up to this many bytes.
    pub max_body_bytes: usize,
    /// Optional retry policy; if missing, built-in defaults are used.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    /// Optional user agents for `--random-agent`; replaces the built-in list.
    #[serde(default)]
    pub user_agents: Option<Vec<String>>,
}

impl Default for HprobeConfig {
    fn default() -> Self {
        Self {
            threads: 1,
            method: DEFAULT_METHOD.to_string(),
            concurrency_policy: ConcurrencyPolicy::Reject,
            connect_timeout_secs: 10,
            timeout_secs: 30,
            follow_redirects: true,
            max_redirects: 10,
            max_body_bytes: 1024 * 1024,
            retry: None,
            user_agents: None,
        }
    }
}

impl HprobeConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
            .as_ref()
            .map(RetryConfig::to_policy)
            .unwrap_or_default()
    }

    /// Transport settings for the default prober.
    pub fn curl_settings(&self) -> CurlSettings {
        CurlSettings {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            timeout: Duration::from_secs(self.timeout_secs),
            follow_redirects: self.follow_redirects,
            max_redirects: self.max_redirects,
            max_body_bytes: self.max_body_bytes,
            retry: self.retry_policy(),
            ..CurlSettings::default()
        }
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn user_agent_pool(&self) -> UserAgentPool {
        match &self.user_agents {
            Some(agents) => UserAgentPool::new(agents.clone()),
            None => UserAgentPool::builtin(),
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("hprobe")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<HprobeConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = HprobeConfig::default();
        write_config(&path, &default_cfg)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }
    load_from_path(&path)
}

/// Load configuration from an explicit file. The file must exist.
pub fn load_from_path(path: &Path) -> Result<HprobeConfig> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("read config {}", path.display()))?;
    let cfg: HprobeConfig =
        toml::from_str(&data).with_context(|| format!("parse config {}", path.display()))?;
    Ok(cfg)
}

fn write_config(path: &Path, cfg: &HprobeConfig) -> Result<()> {
    let toml = cfg.to_toml_string()?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, toml).with_context(|| format!("write config {}", path.display()))?;
    Ok(())
}
