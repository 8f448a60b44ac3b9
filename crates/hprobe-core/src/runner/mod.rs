//! Runner lifecycle: validate options, drive the worker pool to completion,
//! and release the sink on every exit path.

mod state;

pub use state::RunnerState;

use serde::Serialize;
use std::sync::Arc;

use crate::agent::UserAgentPool;
use crate::control::RunControl;
use crate::error::{ConfigError, LifecycleError, RunnerError};
use crate::options::{ProbeOptions, ValidatedOptions};
use crate::pool::{self, CloseGuard, PoolSettings};
use crate::prober::Prober;
use crate::result::ProbeResult;
use crate::sink::{Aggregator, ResultSink};

/// Totals for a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Targets after validation (trimmed, deduplicated).
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Probed, but the sink had closed before the result could be delivered.
    pub undelivered: usize,
    /// Never dispatched because the run was cancelled.
    pub undispatched: usize,
    pub cancelled: bool,
}

impl RunSummary {
    /// True when every target produced a delivered result.
    pub fn is_complete(&self) -> bool {
        self.succeeded + self.failed == self.total
    }
}

/// Drives one probing run over a set of targets.
pub struct Runner<P> {
    options: ProbeOptions,
    validated: Option<ValidatedOptions>,
    state: RunnerState,
    prober: Arc<P>,
    agents: Arc<UserAgentPool>,
    control: RunControl,
}

impl<P> std::fmt::Debug for Runner<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("state", &self.state)
            .field("targets", &self.options.targets.len())
            .field("cancelled", &self.control.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl<P: Prober> Runner<P> {
    pub fn new(options: ProbeOptions, prober: P) -> Self {
        Self {
            options,
            validated: None,
            state: RunnerState::Created,
            prober: Arc::new(prober),
            agents: Arc::new(UserAgentPool::builtin()),
            control: RunControl::new(),
        }
    }

    /// Agents to pick from when `random_agent` is set.
    pub fn with_user_agents(mut self, agents: UserAgentPool) -> Self {
        self.agents = Arc::new(agents);
        self
    }

    pub fn state(&self) -> RunnerState {
        self.state
    }

    /// Handle for caller-triggered early termination.
    pub fn control(&self) -> RunControl {
        self.control.clone()
    }

    pub fn validated_options(&self) -> Option<&ValidatedOptions> {
        self.validated.as_ref()
    }

    /// Created → Validated, or → Failed with the reason. Once validated the
    /// outcome is cached; calling again is a no-op.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        if self.validated.is_some() {
            return Ok(());
        }
        match self.options.validate() {
            Ok(v) => {
                self.validated = Some(v);
                self.state = RunnerState::Validated;
                Ok(())
            }
            Err(e) => {
                tracing::debug!("option validation failed: {}", e);
                self.state = RunnerState::Failed;
                Err(e)
            }
        }
    }

    /// Probe every target, delivering each result to `sink` as it completes.
    ///
    /// Validates first if needed. Returns once every dispatched target has
    /// produced its result; the sink is closed before this returns, whatever
    /// the outcome. A runner runs at most once.
    ///
    /// Stop a run early with [`Runner::control`]: cancelling lets in-flight
    /// probes finish and still returns a summary. Dropping the returned future
    /// instead abandons the run: no further targets are dispatched, probes
    /// already running finish in the background and are still delivered, and
    /// the sink is closed once the last of them is done. The runner is left
    /// in `Running` and cannot be run again.
    pub async fn run<S>(&mut self, sink: S) -> Result<RunSummary, RunnerError>
    where
        S: ResultSink + 'static,
    {
        let close = CloseGuard::new(Arc::new(sink));

        match self.state {
            RunnerState::Created => self.validate()?,
            RunnerState::Validated => {}
            other => return Err(LifecycleError::NotRunnable(other).into()),
        }
        let validated = match &self.validated {
            Some(v) => v.clone(),
            None => return Err(LifecycleError::NotRunnable(self.state).into()),
        };
        if let Some(n) = validated.coerced_from() {
            tracing::warn!("concurrency {} is below 1, running with a single worker", n);
        }

        self.state = RunnerState::Running;
        let total = validated.targets().len();
        tracing::info!(
            targets = total,
            concurrency = validated.concurrency(),
            method = validated.method(),
            "probe run started"
        );

        let settings = PoolSettings {
            concurrency: validated.concurrency(),
            method: validated.method().to_string(),
            flags: validated.flags(),
            agents: Arc::clone(&self.agents),
        };
        let outcome = pool::run_pool(
            validated.targets().to_vec(),
            settings,
            Arc::clone(&self.prober),
            close,
            self.control.clone(),
        )
        .await;

        match outcome {
            Ok(report) => {
                self.state = RunnerState::Completed;
                let summary = RunSummary {
                    total,
                    succeeded: report.succeeded,
                    failed: report.failed,
                    undelivered: report.undelivered,
                    undispatched: total.saturating_sub(report.claimed),
                    cancelled: self.control.is_cancelled(),
                };
                tracing::info!(
                    succeeded = summary.succeeded,
                    failed = summary.failed,
                    undispatched = summary.undispatched,
                    "probe run completed"
                );
                Ok(summary)
            }
            Err(e) => {
                self.state = RunnerState::Failed;
                Err(e.into())
            }
        }
    }
}

/// Run `options` against `prober` and collect every result in arrival order.
pub async fn probe_all<P: Prober>(
    options: ProbeOptions,
    prober: P,
) -> Result<Vec<ProbeResult>, RunnerError> {
    let aggregator = Arc::new(Aggregator::with_capacity(options.targets.len()));
    Runner::new(options, prober)
        .run(Arc::clone(&aggregator))
        .await?;
    // The runner dropped its handle; clone out only if someone else still holds one.
    Ok(match Arc::try_unwrap(aggregator) {
        Ok(agg) => agg.into_results(),
        Err(arc) => arc.snapshot(),
    })
}

#[cfg(test)]
mod tests;
