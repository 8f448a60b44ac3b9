//! Per-target probe outcomes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::ProbeError;
use crate::retry::ErrorKind;
use crate::target::Target;

/// Response metadata collected by a successful probe.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProbeRecord {
    /// URL that answered.
    pub url: String,
    /// Final URL after redirects, when different from `url`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_url: Option<String>,
    pub method: String,
    pub status_code: u32,
    pub content_length: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub technologies: Vec<String>,
    /// Algorithm name -> lowercase hex digest of the body.
    #[serde(default)]
    pub hashes: BTreeMap<String, String>,
    pub words: usize,
    pub lines: usize,
    /// CDN serving the response, if detected and requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cdn: Option<String>,
}

/// Coarse category of a failed probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    Connection,
    Tls,
    InvalidTarget,
    ExcludedCdn,
    Panicked,
    Other,
}

/// A failed probe: what went wrong, as text plus a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeFailure {
    pub kind: FailureKind,
    pub error: String,
}

impl From<&ProbeError> for ProbeFailure {
    fn from(e: &ProbeError) -> Self {
        let kind = match e {
            ProbeError::Transport { kind, .. } => match kind {
                ErrorKind::Timeout => FailureKind::Timeout,
                ErrorKind::Connection => FailureKind::Connection,
                ErrorKind::Tls => FailureKind::Tls,
                ErrorKind::Other => FailureKind::Other,
            },
            ProbeError::InvalidTarget { .. } => FailureKind::InvalidTarget,
            ProbeError::ExcludedCdn { .. } => FailureKind::ExcludedCdn,
            ProbeError::Panicked(_) => FailureKind::Panicked,
        };
        Self {
            kind,
            error: e.to_string(),
        }
    }
}

/// Success or failure for one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum ProbeOutcome {
    Success(ProbeRecord),
    Failure(ProbeFailure),
}

/// Exactly one of these is produced for every target of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    /// Position of the target in the validated target list.
    pub index: usize,
    pub target: Target,
    #[serde(flatten)]
    pub outcome: ProbeOutcome,
}

impl ProbeResult {
    pub fn success(index: usize, target: Target, record: ProbeRecord) -> Self {
        Self {
            index,
            target,
            outcome: ProbeOutcome::Success(record),
        }
    }

    pub fn failure(index: usize, target: Target, error: &ProbeError) -> Self {
        Self {
            index,
            target,
            outcome: ProbeOutcome::Failure(ProbeFailure::from(error)),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ProbeOutcome::Success(_))
    }

    pub fn record(&self) -> Option<&ProbeRecord> {
        match &self.outcome {
            ProbeOutcome::Success(r) => Some(r),
            ProbeOutcome::Failure(_) => None,
        }
    }

    pub fn failure_info(&self) -> Option<&ProbeFailure> {
        match &self.outcome {
            ProbeOutcome::Failure(f) => Some(f),
            ProbeOutcome::Success(_) => None,
        }
    }
}
