//! Concurrent HTTP probing engine.
//!
//! Validate a [`ProbeOptions`], hand it to a [`Runner`] with a [`Prober`],
//! and receive one [`ProbeResult`] per target through a [`ResultSink`] as
//! probes complete. At most `concurrency` probes are in flight at any time.

pub mod config;
pub mod logging;

pub mod agent;
pub mod control;
pub mod error;
pub mod options;
mod pool;
pub mod prober;
pub mod result;
pub mod retry;
pub mod runner;
pub mod sink;
pub mod target;

pub use control::RunControl;
pub use error::{ConfigError, LifecycleError, ProbeError, RunnerError, SinkClosed};
pub use options::{ConcurrencyPolicy, ProbeFlags, ProbeOptions, ValidatedOptions};
pub use prober::{CurlProber, CurlSettings, ProbeRequest, Prober};
pub use result::{FailureKind, ProbeFailure, ProbeOutcome, ProbeRecord, ProbeResult};
pub use runner::{probe_all, RunSummary, Runner, RunnerState};
pub use sink::{Aggregator, CallbackSink, ChannelSink, ResultSink};
pub use target::Target;
