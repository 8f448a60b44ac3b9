//! The prober seam: one HTTP probe for one target.
//!
//! The pool only knows the `Prober` trait. `CurlProber` is the default
//! implementation; tests and embedders can pass any closure with the right
//! signature instead.

mod client;
mod extract;
mod parse;

pub use client::{CurlProber, CurlSettings};
pub use extract::{count_lines, count_words, detect_cdn, detect_technologies, extract_title, sha256_hex};
pub use parse::ResponseHeaders;

use crate::error::ProbeError;
use crate::result::ProbeRecord;
use crate::target::Target;

/// Everything a prober needs to know about one probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeRequest {
    pub target: Target,
    pub method: String,
    /// Agent to send; `None` means the prober's default.
    pub user_agent: Option<String>,
    /// Whether CDN detection is wanted for this run.
    pub detect_cdn: bool,
}

/// Performs one probe. Called concurrently from several worker threads with
/// distinct targets, so implementations must be thread-safe. Blocking I/O is
/// expected; the pool runs probes on the blocking thread pool.
///
/// Retries, if any, are the prober's business.
pub trait Prober: Send + Sync + 'static {
    fn probe(&self, request: &ProbeRequest) -> Result<ProbeRecord, ProbeError>;
}

impl<F> Prober for F
where
    F: Fn(&ProbeRequest) -> Result<ProbeRecord, ProbeError> + Send + Sync + 'static,
{
    fn probe(&self, request: &ProbeRequest) -> Result<ProbeRecord, ProbeError> {
        self(request)
    }
}
