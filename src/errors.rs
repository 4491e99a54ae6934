//! Error taxonomy for the evaluation pipeline.
//!
//! Retriability is a property of the error, not of the call site: the
//! coordinator's transition function asks `is_retriable()` and applies the
//! step's retry policy, so stages never embed their own retry loops.

use crate::types::{AppId, RunId, StepName};
use thiserror::Error;

pub type EvaluatorResult<T> = Result<T, EvaluatorError>;

#[derive(Debug, Error)]
pub enum EvaluatorError {
    /// Network/timeout-class failure inside a stage collaborator. Retried
    /// with bounded exponential backoff up to the step's ceiling.
    #[error("transient failure in {step}: {message}")]
    TransientStage { step: StepName, message: String },

    /// Malformed input to a stage. Never retried; fails the run.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Scoring cannot proceed: a category has zero usable metrics.
    #[error("insufficient evidence: {0}")]
    InsufficientEvidence(String),

    /// A non-terminal run already exists for the application.
    #[error("an active run already exists for application {0}")]
    DuplicateRun(AppId),

    /// A conditional run-state write lost the race. The coordinator
    /// re-reads and replays the transition; never a silent overwrite.
    #[error("conditional write lost the race for run {0}")]
    PersistenceConflict(RunId),

    /// The memo renderer returned incomplete content.
    #[error("memo rendering incomplete: {0}")]
    MemoRender(String),

    #[error("run not found: {0}")]
    RunNotFound(RunId),

    #[error("application not found: {0}")]
    ApplicationNotFound(AppId),

    #[error("run {0} was cancelled")]
    Cancelled(RunId),

    /// Operation is not valid in the run's current state (e.g. resuming a
    /// Failed run without clearing its failed-step state).
    #[error("invalid run state: {0}")]
    InvalidState(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EvaluatorError {
    /// Whether the coordinator may retry the failed call under the step's
    /// retry policy. Validation and evidence errors are terminal by design.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            EvaluatorError::TransientStage { .. } | EvaluatorError::MemoRender(_)
        )
    }

    /// Short reason code recorded in RunState and the audit trail.
    pub fn reason_code(&self) -> &'static str {
        match self {
            EvaluatorError::TransientStage { .. } => "transient_stage_error",
            EvaluatorError::Validation(_) => "validation_error",
            EvaluatorError::InsufficientEvidence(_) => "insufficient_evidence",
            EvaluatorError::DuplicateRun(_) => "duplicate_run",
            EvaluatorError::PersistenceConflict(_) => "persistence_conflict",
            EvaluatorError::MemoRender(_) => "memo_render_error",
            EvaluatorError::RunNotFound(_) => "run_not_found",
            EvaluatorError::ApplicationNotFound(_) => "application_not_found",
            EvaluatorError::Cancelled(_) => "cancelled",
            EvaluatorError::InvalidState(_) => "invalid_state",
            EvaluatorError::Storage(_) => "storage_error",
            EvaluatorError::Config(_) => "config_error",
            EvaluatorError::Serialization(_) => "serialization_error",
        }
    }
}

impl From<rusqlite::Error> for EvaluatorError {
    fn from(e: rusqlite::Error) -> Self {
        EvaluatorError::Storage(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retriability_classification() {
        let transient = EvaluatorError::TransientStage {
            step: StepName::Extraction,
            message: "connection reset".into(),
        };
        assert!(transient.is_retriable());
        assert!(EvaluatorError::MemoRender("empty section".into()).is_retriable());
        assert!(!EvaluatorError::Validation("bad deck".into()).is_retriable());
        assert!(!EvaluatorError::InsufficientEvidence("no metrics".into()).is_retriable());
        assert!(!EvaluatorError::PersistenceConflict("run-1".into()).is_retriable());
    }
}
