//! In-memory store for tests and ephemeral runs.

use crate::audit::AuditEvent;
use crate::errors::{EvaluatorError, EvaluatorResult};
use crate::storage::EvaluationStore;
use crate::types::{
    EnrichmentRecord, ExtractionResult, MappingResult, Memo, RunState, ScoreRun, Submission,
    VoiceInterview,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Default)]
struct Tables {
    applications: HashMap<String, Submission>,
    runs: HashMap<String, RunState>,
    extractions: HashMap<String, ExtractionResult>,
    mappings: HashMap<String, MappingResult>,
    enrichment: Vec<EnrichmentRecord>,
    score_runs: Vec<ScoreRun>,
    memos: HashMap<String, Memo>,
    interviews: HashMap<String, VoiceInterview>,
    audit: Vec<AuditEvent>,
}

/// All tables behind one lock so the conditional run-state write is atomic
/// with respect to concurrent resume attempts.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EvaluationStore for InMemoryStore {
    async fn insert_application(&self, submission: &Submission) -> EvaluatorResult<()> {
        let mut tables = self.tables.write().unwrap();
        tables
            .applications
            .insert(submission.app_id.clone(), submission.clone());
        Ok(())
    }

    async fn get_application(&self, app_id: &str) -> EvaluatorResult<Option<Submission>> {
        let tables = self.tables.read().unwrap();
        Ok(tables.applications.get(app_id).cloned())
    }

    async fn create_run(&self, run: &RunState) -> EvaluatorResult<()> {
        let mut tables = self.tables.write().unwrap();
        let duplicate = tables
            .runs
            .values()
            .any(|r| r.app_id == run.app_id && !r.status.is_terminal());
        if duplicate {
            return Err(EvaluatorError::DuplicateRun(run.app_id.clone()));
        }
        tables.runs.insert(run.run_id.clone(), run.clone());
        Ok(())
    }

    async fn get_run(&self, run_id: &str) -> EvaluatorResult<Option<RunState>> {
        let tables = self.tables.read().unwrap();
        Ok(tables.runs.get(run_id).cloned())
    }

    async fn active_run_for(&self, app_id: &str) -> EvaluatorResult<Option<RunState>> {
        let tables = self.tables.read().unwrap();
        Ok(tables
            .runs
            .values()
            .find(|r| r.app_id == app_id && !r.status.is_terminal())
            .cloned())
    }

    async fn update_run(&self, run: &RunState) -> EvaluatorResult<RunState> {
        let mut tables = self.tables.write().unwrap();
        let stored = tables
            .runs
            .get_mut(&run.run_id)
            .ok_or_else(|| EvaluatorError::RunNotFound(run.run_id.clone()))?;
        if stored.version != run.version {
            return Err(EvaluatorError::PersistenceConflict(run.run_id.clone()));
        }
        let mut next = run.clone();
        next.version = stored.version + 1;
        next.updated_at = Utc::now();
        *stored = next.clone();
        Ok(next)
    }

    async fn put_extraction(&self, result: &ExtractionResult) -> EvaluatorResult<()> {
        let mut tables = self.tables.write().unwrap();
        tables
            .extractions
            .insert(result.run_id.clone(), result.clone());
        Ok(())
    }

    async fn get_extraction(&self, run_id: &str) -> EvaluatorResult<Option<ExtractionResult>> {
        let tables = self.tables.read().unwrap();
        Ok(tables.extractions.get(run_id).cloned())
    }

    async fn put_mapping(&self, result: &MappingResult) -> EvaluatorResult<()> {
        let mut tables = self.tables.write().unwrap();
        tables.mappings.insert(result.run_id.clone(), result.clone());
        Ok(())
    }

    async fn get_mapping(&self, run_id: &str) -> EvaluatorResult<Option<MappingResult>> {
        let tables = self.tables.read().unwrap();
        Ok(tables.mappings.get(run_id).cloned())
    }

    async fn append_enrichment(&self, records: &[EnrichmentRecord]) -> EvaluatorResult<()> {
        let mut tables = self.tables.write().unwrap();
        tables.enrichment.extend(records.iter().cloned());
        Ok(())
    }

    async fn enrichment_for_run(&self, run_id: &str) -> EvaluatorResult<Vec<EnrichmentRecord>> {
        let tables = self.tables.read().unwrap();
        Ok(tables
            .enrichment
            .iter()
            .filter(|r| r.run_id == run_id)
            .cloned()
            .collect())
    }

    async fn put_score_run(&self, score: &ScoreRun) -> EvaluatorResult<()> {
        let mut tables = self.tables.write().unwrap();
        tables.score_runs.push(score.clone());
        Ok(())
    }

    async fn latest_score_run(&self, run_id: &str) -> EvaluatorResult<Option<ScoreRun>> {
        let tables = self.tables.read().unwrap();
        Ok(tables
            .score_runs
            .iter()
            .rev()
            .find(|s| s.run_id == run_id)
            .cloned())
    }

    async fn put_memo(&self, memo: &Memo) -> EvaluatorResult<()> {
        let mut tables = self.tables.write().unwrap();
        tables.memos.insert(memo.run_id.clone(), memo.clone());
        Ok(())
    }

    async fn get_memo(&self, run_id: &str) -> EvaluatorResult<Option<Memo>> {
        let tables = self.tables.read().unwrap();
        Ok(tables.memos.get(run_id).cloned())
    }

    async fn put_voice_interview(&self, interview: &VoiceInterview) -> EvaluatorResult<()> {
        let mut tables = self.tables.write().unwrap();
        tables
            .interviews
            .insert(interview.run_id.clone(), interview.clone());
        Ok(())
    }

    async fn get_voice_interview(&self, run_id: &str) -> EvaluatorResult<Option<VoiceInterview>> {
        let tables = self.tables.read().unwrap();
        Ok(tables.interviews.get(run_id).cloned())
    }

    async fn append_audit(&self, event: &AuditEvent) -> EvaluatorResult<()> {
        let mut tables = self.tables.write().unwrap();
        tables.audit.push(event.clone());
        Ok(())
    }

    async fn audit_for_app(&self, app_id: &str) -> EvaluatorResult<Vec<AuditEvent>> {
        let tables = self.tables.read().unwrap();
        Ok(tables
            .audit
            .iter()
            .filter(|e| e.app_id == app_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RunStatus;

    #[tokio::test]
    async fn duplicate_active_run_is_rejected() {
        let store = InMemoryStore::new();
        let run = RunState::new("app-1".to_string());
        store.create_run(&run).await.unwrap();

        let second = RunState::new("app-1".to_string());
        let err = store.create_run(&second).await.unwrap_err();
        assert!(matches!(err, EvaluatorError::DuplicateRun(_)));

        // completing the first clears the way for a fresh run
        let mut finished = store.get_run(&run.run_id).await.unwrap().unwrap();
        finished.status = RunStatus::Completed;
        store.update_run(&finished).await.unwrap();
        store.create_run(&second).await.unwrap();
    }

    #[tokio::test]
    async fn stale_version_write_conflicts() {
        let store = InMemoryStore::new();
        let run = RunState::new("app-1".to_string());
        store.create_run(&run).await.unwrap();

        let fresh = store.update_run(&run).await.unwrap();
        assert_eq!(fresh.version, run.version + 1);

        // writing with the stale token must not overwrite
        let err = store.update_run(&run).await.unwrap_err();
        assert!(matches!(err, EvaluatorError::PersistenceConflict(_)));
    }

    #[tokio::test]
    async fn latest_score_run_wins() {
        let store = InMemoryStore::new();
        let mut first = sample_score("run-1", 5.0);
        first.score_id = "score-a".into();
        let mut second = sample_score("run-1", 7.0);
        second.score_id = "score-b".into();
        store.put_score_run(&first).await.unwrap();
        store.put_score_run(&second).await.unwrap();
        let latest = store.latest_score_run("run-1").await.unwrap().unwrap();
        assert_eq!(latest.score_id, "score-b");
    }

    fn sample_score(run_id: &str, overall: f64) -> ScoreRun {
        ScoreRun {
            score_id: String::new(),
            run_id: run_id.to_string(),
            app_id: "app-1".to_string(),
            category_scores: vec![],
            overall_score: overall,
            decision: crate::types::Decision::Hold,
            investor_weights: Default::default(),
            confidence: 0.5,
            reduced_confidence: false,
            risk_flags: vec![],
            requires_voice_interview: false,
            warnings: vec![],
            catalog_version: "test".to_string(),
        }
    }
}
