//! Retry and backoff policy for the default prober.
//!
//! The worker pool never retries; a prober that wants retries classifies its
//! transport errors here and asks the policy whether to try again.

mod classify;
mod policy;
mod run;

pub use classify::classify_curl_error;
pub use policy::{ErrorKind, RetryDecision, RetryPolicy};
pub use run::run_with_retry;
