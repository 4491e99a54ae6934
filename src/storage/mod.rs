//! Storage-agnostic persistence API for evaluation runs.
//!
//! Responsibilities:
//! - Define the record-level contract the coordinator persists through:
//!   applications, workflow states, stage outputs, score runs, memos,
//!   interviews, and the audit log.
//! - Guarantee conditional run-state writes: `update_run` compares the
//!   caller's version token against the stored one and rejects stale
//!   writes with `PersistenceConflict` so a crash-and-resume never loses
//!   or re-executes a completed step.
//!
//! Backends must be Send + Sync so they can sit behind an Arc shared by
//! concurrent runs.

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

use crate::audit::AuditEvent;
use crate::errors::EvaluatorResult;
use crate::types::{
    EnrichmentRecord, ExtractionResult, MappingResult, Memo, RunState, ScoreRun, Submission,
    VoiceInterview,
};
use async_trait::async_trait;

#[async_trait]
pub trait EvaluationStore: Send + Sync {
    async fn insert_application(&self, submission: &Submission) -> EvaluatorResult<()>;
    async fn get_application(&self, app_id: &str) -> EvaluatorResult<Option<Submission>>;

    /// Insert a fresh run. Fails with `DuplicateRun` when a non-terminal
    /// run already exists for the same application.
    async fn create_run(&self, run: &RunState) -> EvaluatorResult<()>;
    async fn get_run(&self, run_id: &str) -> EvaluatorResult<Option<RunState>>;
    async fn active_run_for(&self, app_id: &str) -> EvaluatorResult<Option<RunState>>;
    /// Conditional write: succeeds only when `run.version` matches the
    /// stored version, then bumps it. Returns the stored state.
    async fn update_run(&self, run: &RunState) -> EvaluatorResult<RunState>;

    async fn put_extraction(&self, result: &ExtractionResult) -> EvaluatorResult<()>;
    async fn get_extraction(&self, run_id: &str) -> EvaluatorResult<Option<ExtractionResult>>;

    async fn put_mapping(&self, result: &MappingResult) -> EvaluatorResult<()>;
    async fn get_mapping(&self, run_id: &str) -> EvaluatorResult<Option<MappingResult>>;

    /// Append-only; records from concurrent lookups may arrive in batches.
    async fn append_enrichment(&self, records: &[EnrichmentRecord]) -> EvaluatorResult<()>;
    async fn enrichment_for_run(&self, run_id: &str) -> EvaluatorResult<Vec<EnrichmentRecord>>;

    /// Score runs accumulate: an explicit rescore appends a new record.
    async fn put_score_run(&self, score: &ScoreRun) -> EvaluatorResult<()>;
    async fn latest_score_run(&self, run_id: &str) -> EvaluatorResult<Option<ScoreRun>>;

    async fn put_memo(&self, memo: &Memo) -> EvaluatorResult<()>;
    async fn get_memo(&self, run_id: &str) -> EvaluatorResult<Option<Memo>>;

    async fn put_voice_interview(&self, interview: &VoiceInterview) -> EvaluatorResult<()>;
    async fn get_voice_interview(&self, run_id: &str) -> EvaluatorResult<Option<VoiceInterview>>;

    async fn append_audit(&self, event: &AuditEvent) -> EvaluatorResult<()>;
    async fn audit_for_app(&self, app_id: &str) -> EvaluatorResult<Vec<AuditEvent>>;
}
