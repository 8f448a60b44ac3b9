//! Probe run options and their validation.
//!
//! `ProbeOptions` is what a caller fills in; `ProbeOptions::validate` checks it
//! for internal consistency and yields an immutable `ValidatedOptions`. The
//! check is pure: validating the same options twice gives the same outcome.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::ConfigError;
use crate::target::Target;

/// HTTP methods a run may use.
pub const SUPPORTED_METHODS: &[&str] = &[
    "GET", "HEAD", "POST", "PUT", "DELETE", "PATCH", "OPTIONS", "TRACE", "CONNECT",
];

/// Method used when none is given.
pub const DEFAULT_METHOD: &str = "GET";

/// What to do with a concurrency below 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConcurrencyPolicy {
    /// Reject the options with `ConfigError::InvalidConcurrency`.
    #[default]
    Reject,
    /// Run with a single worker instead.
    Coerce,
}

/// Independent behaviour toggles for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProbeFlags {
    /// Send a randomly picked browser user agent with each probe.
    pub random_agent: bool,
    /// Annotate results served through a CDN with the CDN name.
    pub output_cdn: bool,
    /// Report CDN-fronted hosts as excluded failures instead of results.
    pub exclude_cdn: bool,
}

/// Caller-supplied run configuration, not yet validated.
#[derive(Debug, Clone, Default)]
pub struct ProbeOptions {
    pub targets: Vec<String>,
    /// Number of concurrent workers; `None` means 1.
    pub concurrency: Option<i64>,
    pub concurrency_policy: ConcurrencyPolicy,
    /// HTTP method; empty means GET.
    pub method: String,
    pub flags: ProbeFlags,
}

impl ProbeOptions {
    pub fn new<I, S>(targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            targets: targets.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_concurrency(mut self, concurrency: i64) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    pub fn with_concurrency_policy(mut self, policy: ConcurrencyPolicy) -> Self {
        self.concurrency_policy = policy;
        self
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn with_flags(mut self, flags: ProbeFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Check the options and produce the immutable form a run uses.
    pub fn validate(&self) -> Result<ValidatedOptions, ConfigError> {
        if self.targets.is_empty() {
            return Err(ConfigError::EmptyTargets);
        }
        let targets = normalize_targets(&self.targets)?;

        if self.flags.output_cdn && self.flags.exclude_cdn {
            return Err(ConfigError::ConflictingFlags {
                first: "output-cdn",
                second: "exclude-cdn",
            });
        }

        let (concurrency, coerced_from) = match self.concurrency {
            None => (1, None),
            Some(n) if n >= 1 => (usize::try_from(n).unwrap_or(usize::MAX), None),
            Some(n) => match self.concurrency_policy {
                ConcurrencyPolicy::Reject => return Err(ConfigError::InvalidConcurrency(n)),
                ConcurrencyPolicy::Coerce => (1, Some(n)),
            },
        };

        let method = normalize_method(&self.method)?;

        Ok(ValidatedOptions {
            targets,
            concurrency,
            coerced_from,
            method,
            flags: self.flags,
        })
    }
}

/// Trim, reject blanks, and drop duplicates keeping first occurrence.
fn normalize_targets(raw: &[String]) -> Result<Vec<Target>, ConfigError> {
    let mut seen = HashSet::with_capacity(raw.len());
    let mut targets = Vec::with_capacity(raw.len());
    for (index, t) in raw.iter().enumerate() {
        let t = t.trim();
        if t.is_empty() {
            return Err(ConfigError::BlankTarget { index });
        }
        if seen.insert(t) {
            targets.push(Target::new(t));
        }
    }
    Ok(targets)
}

fn normalize_method(raw: &str) -> Result<String, ConfigError> {
    let method = raw.trim();
    if method.is_empty() {
        return Ok(DEFAULT_METHOD.to_string());
    }
    let upper = method.to_ascii_uppercase();
    if SUPPORTED_METHODS.contains(&upper.as_str()) {
        Ok(upper)
    } else {
        Err(ConfigError::UnsupportedMethod(method.to_string()))
    }
}

/// Options that passed validation. Immutable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedOptions {
    targets: Vec<Target>,
    concurrency: usize,
    coerced_from: Option<i64>,
    method: String,
    flags: ProbeFlags,
}

impl ValidatedOptions {
    /// Deduplicated targets in input order.
    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// The rejected value, if concurrency was coerced to 1.
    pub fn coerced_from(&self) -> Option<i64> {
        self.coerced_from
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn flags(&self) -> ProbeFlags {
        self.flags
    }
}
