use serde::Serialize;

/// Lifecycle of a `Runner`.
///
/// Created → Validated → Running → Completed, or Created → Failed when the
/// options are rejected. Individual probe errors never move a runner to Failed;
/// only validation and lifecycle errors do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunnerState {
    Created,
    Validated,
    Running,
    Completed,
    Failed,
}

impl RunnerState {
    /// True once the runner can do no further work.
    pub fn is_terminal(self) -> bool {
        matches!(self, RunnerState::Completed | RunnerState::Failed)
    }
}
