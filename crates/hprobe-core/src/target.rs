//! Probe targets and the URLs tried for each of them.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ProbeError;

/// A host or URL scheduled for one probe. Immutable once enqueued.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Target(String);

impl Target {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if the target names its own scheme (e.g. `http://host`).
    pub fn has_scheme(&self) -> bool {
        self.0.contains("://")
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Target {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Target {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// URLs to try for a target, in order.
///
/// A target with an explicit scheme is used as is (http/https only). A bare
/// host, optionally with port and path, is tried over https first, then http.
pub fn candidate_urls(target: &Target) -> Result<Vec<String>, ProbeError> {
    if target.has_scheme() {
        let url = parse_http_url(target, target.as_str())?;
        return Ok(vec![url]);
    }
    ["https", "http"]
        .iter()
        .map(|scheme| parse_http_url(target, &format!("{scheme}://{}", target.as_str())))
        .collect()
}

fn parse_http_url(target: &Target, raw: &str) -> Result<String, ProbeError> {
    let parsed = url::Url::parse(raw)
        .map_err(|e| ProbeError::invalid_target(target.as_str(), e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ProbeError::invalid_target(
            target.as_str(),
            format!("unsupported scheme {:?}", parsed.scheme()),
        ));
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(ProbeError::invalid_target(target.as_str(), "missing host"));
    }
    Ok(parsed.to_string())
}
