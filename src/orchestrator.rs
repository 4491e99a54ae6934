//! Workflow coordinator.
//!
//! This module implements the coordinator, the component responsible for
//! driving an evaluation run through its stages: extraction, mapping, the
//! parallel enrichment fan-out, scoring, memo generation, and the optional
//! voice interview. It owns the run's persisted state machine, applies each
//! step's retry policy, enforces the enrichment fan-in barrier ahead of
//! scoring, and records every state change in the audit trail.
//!
//! Stage collaborators never mutate run state: the coordinator invokes them
//! with immutable inputs, persists their outputs, and advances the state
//! machine through conditional writes. A write that loses a race against a
//! concurrent resume is re-read and replayed, never overwritten, so a
//! crash-and-resume cannot re-execute a completed step or lose its result.
//!
//! Cancellation is cooperative: flags are observed between steps and
//! between enrichment dispatches, never mid-call.

use crate::audit::{AuditEvent, AuditEventType, AuditTrail};
use crate::catalog::MetricCatalog;
use crate::config::EvaluatorConfig;
use crate::errors::{EvaluatorError, EvaluatorResult};
use crate::evidence::EvidenceStore;
use crate::memo::MemoAssembler;
use crate::scoring::ScoringEngine;
use crate::stages::{EnrichmentSource, Extractor, Mapper, MemoRenderer, VoiceInterviewer};
use crate::storage::EvaluationStore;
use crate::types::{
    Memo, RunId, RunState, RunStatus, ScoreRun, StepName, Submission,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// The collaborator set a coordinator drives. Swap implementations freely;
/// the contracts are the only coupling.
pub struct StageSet {
    pub extractor: Arc<dyn Extractor>,
    pub mapper: Arc<dyn Mapper>,
    pub enrichment_sources: Vec<Arc<dyn EnrichmentSource>>,
    pub renderer: Arc<dyn MemoRenderer>,
    pub interviewer: Option<Arc<dyn VoiceInterviewer>>,
}

/// What a successful step execution settled to.
enum StepOutcome {
    Completed,
    EnrichmentSettled { partial: bool },
}

/// Agenda used when the pipeline schedules a founder interview.
const INTERVIEW_AGENDA: [&str; 5] = [
    "Discuss market opportunity and competitive landscape",
    "Review founder background and team dynamics",
    "Explore go-to-market strategy and customer acquisition",
    "Assess technical differentiation and IP strategy",
    "Understand funding needs and use of capital",
];

pub struct WorkflowCoordinator {
    store: Arc<dyn EvaluationStore>,
    stages: StageSet,
    config: EvaluatorConfig,
    catalog: Arc<MetricCatalog>,
    assembler: MemoAssembler,
    audit: Mutex<AuditTrail>,
    cancel_flags: Mutex<HashMap<RunId, Arc<AtomicBool>>>,
}

impl WorkflowCoordinator {
    pub fn new(
        store: Arc<dyn EvaluationStore>,
        stages: StageSet,
        config: EvaluatorConfig,
        catalog: Arc<MetricCatalog>,
    ) -> Self {
        let assembler = MemoAssembler::new(stages.renderer.clone());
        Self {
            store,
            stages,
            config,
            catalog,
            assembler,
            audit: Mutex::new(AuditTrail::new()),
            cancel_flags: Mutex::new(HashMap::new()),
        }
    }

    /// Accept a submission and create its run in Pending. Fails with
    /// `DuplicateRun` when a non-terminal run already exists for the
    /// application.
    pub async fn start(&self, submission: Submission) -> EvaluatorResult<RunState> {
        if self
            .store
            .active_run_for(&submission.app_id)
            .await?
            .is_some()
        {
            return Err(EvaluatorError::DuplicateRun(submission.app_id.clone()));
        }
        self.store.insert_application(&submission).await?;
        let run = RunState::new(submission.app_id.clone());
        self.store.create_run(&run).await?;
        self.cancel_flag(&run.run_id);
        self.audit_event(
            &run.app_id,
            &run.run_id,
            AuditEventType::RunCreated,
            json!({
                "company_name": submission.company_name,
                "source": submission.source,
            }),
        )
        .await?;
        info!(run_id = %run.run_id, app_id = %run.app_id, "run created");
        Ok(run)
    }

    /// Drive the run until it settles into a terminal state.
    pub async fn run_to_completion(&self, run_id: &str) -> EvaluatorResult<RunState> {
        loop {
            let run = self.advance(run_id).await?;
            if run.status.is_terminal() {
                return Ok(run);
            }
        }
    }

    /// Execute the run's current step once (including its internal retry
    /// budget) and move the state machine. Stage failures settle the run
    /// into Failed and return the terminal state; `Err` is reserved for
    /// infrastructure faults.
    pub async fn advance(&self, run_id: &str) -> EvaluatorResult<RunState> {
        let mut run = self.load_run(run_id).await?;
        if run.status.is_terminal() {
            return Ok(run);
        }
        if run.cancel_requested || self.cancel_flag(run_id).load(Ordering::SeqCst) {
            return self.settle_cancelled(run).await;
        }
        let Some(step) = run.current_step else {
            return self.complete_run(run).await;
        };

        if run.status != RunStatus::for_step(step) {
            run.status = RunStatus::for_step(step);
            run = self.commit(run).await?;
        }
        self.audit_event(
            &run.app_id,
            &run.run_id,
            AuditEventType::StepStarted,
            json!({ "step": step.as_str(), "attempt": run.retry_count + 1 }),
        )
        .await?;
        info!(run_id = %run.run_id, step = %step, "step started");

        let policy = self.config.policy_for(step);
        let outcome = loop {
            match self.execute_step(&run, step).await {
                Ok(outcome) => break outcome,
                Err(err) if err.is_retriable() && run.retry_count < policy.max_retries => {
                    run.retry_count += 1;
                    run.last_error = Some(err.to_string());
                    run = self.commit(run).await?;
                    self.audit_event(
                        &run.app_id,
                        &run.run_id,
                        AuditEventType::StepRetrying,
                        json!({
                            "step": step.as_str(),
                            "attempt": run.retry_count,
                            "error": err.to_string(),
                        }),
                    )
                    .await?;
                    warn!(
                        run_id = %run.run_id,
                        step = %step,
                        attempt = run.retry_count,
                        error = %err,
                        "step failed, retrying"
                    );
                    tokio::time::sleep(policy.backoff_delay(run.retry_count)).await;
                    if run.cancel_requested || self.cancel_flag(run_id).load(Ordering::SeqCst) {
                        return self.settle_cancelled(run).await;
                    }
                }
                Err(err) => return self.fail_run(run, step, err).await,
            }
        };

        if let StepOutcome::EnrichmentSettled { partial } = outcome {
            run.enrichment_partial = partial;
            if partial {
                self.audit_event(
                    &run.app_id,
                    &run.run_id,
                    AuditEventType::EnrichmentDegraded,
                    json!({ "step": step.as_str() }),
                )
                .await?;
            }
        }

        run.record_step_completed(step);
        run.last_error = None;
        run.current_step = self.next_step(&run).await?;
        if run.current_step.is_none() {
            run.status = RunStatus::Completed;
        }
        run = self.commit(run).await?;
        self.audit_event(
            &run.app_id,
            &run.run_id,
            AuditEventType::StepCompleted,
            json!({ "step": step.as_str() }),
        )
        .await?;
        info!(run_id = %run.run_id, step = %step, "step completed");
        if run.status == RunStatus::Completed {
            self.audit_event(
                &run.app_id,
                &run.run_id,
                AuditEventType::RunCompleted,
                json!({ "steps": run.steps_completed }),
            )
            .await?;
            info!(run_id = %run.run_id, "run completed");
        }
        Ok(run)
    }

    /// Request cooperative cancellation. The in-flight external call is
    /// never interrupted; the run settles into Cancelled at the next
    /// between-step check.
    pub async fn cancel(&self, run_id: &str) -> EvaluatorResult<RunState> {
        let mut run = self.load_run(run_id).await?;
        if run.status.is_terminal() {
            return Ok(run);
        }
        self.cancel_flag(run_id).store(true, Ordering::SeqCst);
        loop {
            run.cancel_requested = true;
            match self.store.update_run(&run).await {
                Ok(stored) => {
                    run = stored;
                    break;
                }
                Err(EvaluatorError::PersistenceConflict(_)) => {
                    run = self.load_run(run_id).await?;
                    if run.status.is_terminal() {
                        return Ok(run);
                    }
                }
                Err(e) => return Err(e),
            }
        }
        self.audit_event(
            &run.app_id,
            &run.run_id,
            AuditEventType::CancelRequested,
            json!({}),
        )
        .await?;
        info!(run_id = %run.run_id, "cancellation requested");
        Ok(run)
    }

    /// Re-derive the current step from the completed set and continue.
    /// Steps already completed are never re-executed. Refuses Failed runs;
    /// use `resume_with_reset` to clear failed-step state first.
    pub async fn resume(&self, run_id: &str) -> EvaluatorResult<RunState> {
        let run = self.load_run(run_id).await?;
        match run.status {
            RunStatus::Completed | RunStatus::Cancelled => return Ok(run),
            RunStatus::Failed => {
                return Err(EvaluatorError::InvalidState(format!(
                    "run {run_id} is failed; resume_with_reset clears failed-step state"
                )))
            }
            _ => {}
        }
        self.rederive_and_continue(run, false).await
    }

    /// Resume a Failed run after clearing its failed-step state (retry
    /// counter and error fields). The failing step executes again from a
    /// clean slate; completed steps stay completed.
    pub async fn resume_with_reset(&self, run_id: &str) -> EvaluatorResult<RunState> {
        let mut run = self.load_run(run_id).await?;
        if matches!(run.status, RunStatus::Completed | RunStatus::Cancelled) {
            return Ok(run);
        }
        run.retry_count = 0;
        run.last_error = None;
        run.failure_step = None;
        self.rederive_and_continue(run, true).await
    }

    async fn rederive_and_continue(
        &self,
        mut run: RunState,
        reset: bool,
    ) -> EvaluatorResult<RunState> {
        run.current_step = self.next_step(&run).await?;
        run.status = match run.current_step {
            Some(step) => RunStatus::for_step(step),
            None => run.status,
        };
        let run = self.commit(run).await?;
        self.audit_event(
            &run.app_id,
            &run.run_id,
            AuditEventType::RunResumed,
            json!({
                "current_step": run.current_step.map(|s| s.as_str()),
                "reset": reset,
            }),
        )
        .await?;
        info!(run_id = %run.run_id, step = ?run.current_step, "run resumed");
        self.run_to_completion(&run.run_id).await
    }

    /// Explicit re-trigger: fold the interview's clarified fields into the
    /// metric inputs, score again, and rebuild the memo. Appends a fresh
    /// ScoreRun; the original stays untouched for audit.
    pub async fn rescore_with_interview(&self, run_id: &str) -> EvaluatorResult<ScoreRun> {
        let run = self.load_run(run_id).await?;
        let interview = self
            .store
            .get_voice_interview(run_id)
            .await?
            .ok_or_else(|| {
                EvaluatorError::InvalidState(format!("run {run_id} has no voice interview"))
            })?;
        let mut evidence = self.evidence_for(&run).await?;
        for (field, value) in &interview.extracted_fields {
            evidence.override_from_interview(field.clone(), *value);
        }
        let score = ScoringEngine::score(&evidence, &self.catalog, &self.config.preferences)?;
        self.store.put_score_run(&score).await?;
        self.audit_event(
            &run.app_id,
            &run.run_id,
            AuditEventType::ScoreComputed,
            json!({
                "overall_score": score.overall_score,
                "decision": score.decision,
                "rescore": true,
            }),
        )
        .await?;

        let mut memo = self.assembler.assemble(&score, &evidence).await?;
        self.assembler.merge_interview(&mut memo, &interview);
        self.store.put_memo(&memo).await?;
        Ok(score)
    }

    // -- queries ------------------------------------------------------------

    pub async fn run_state(&self, run_id: &str) -> EvaluatorResult<RunState> {
        self.load_run(run_id).await
    }

    pub async fn score_for(&self, run_id: &str) -> EvaluatorResult<Option<ScoreRun>> {
        self.store.latest_score_run(run_id).await
    }

    /// Failed runs expose no memo, only the failing step and reason.
    pub async fn memo_for(&self, run_id: &str) -> EvaluatorResult<Option<Memo>> {
        let run = self.load_run(run_id).await?;
        if run.status == RunStatus::Failed {
            return Ok(None);
        }
        self.store.get_memo(run_id).await
    }

    /// The in-memory audit trail; also persisted event-by-event to the
    /// store's audit_logs table.
    pub fn audit_trail(&self) -> EvaluatorResult<Vec<AuditEvent>> {
        let trail = self
            .audit
            .lock()
            .map_err(|_| EvaluatorError::Storage("audit trail lock poisoned".to_string()))?;
        Ok(trail.events().to_vec())
    }

    pub fn verify_audit_integrity(&self) -> EvaluatorResult<bool> {
        let trail = self
            .audit
            .lock()
            .map_err(|_| EvaluatorError::Storage("audit trail lock poisoned".to_string()))?;
        Ok(trail.verify_integrity())
    }

    // -- step execution -----------------------------------------------------

    async fn execute_step(&self, run: &RunState, step: StepName) -> EvaluatorResult<StepOutcome> {
        match step {
            StepName::Extraction => {
                let submission = self.load_application(&run.app_id).await?;
                let mut result = self.stages.extractor.extract(&submission).await?;
                result.run_id = run.run_id.clone();
                result.app_id = run.app_id.clone();
                self.store.put_extraction(&result).await?;
                Ok(StepOutcome::Completed)
            }
            StepName::Mapping => {
                let extraction =
                    self.store.get_extraction(&run.run_id).await?.ok_or_else(|| {
                        EvaluatorError::InvalidState(format!(
                            "run {} has no extraction result",
                            run.run_id
                        ))
                    })?;
                let mapping = self.stages.mapper.map(&extraction).await?;
                self.store.put_mapping(&mapping).await?;
                Ok(StepOutcome::Completed)
            }
            StepName::Enrichment => self.execute_enrichment(run).await,
            StepName::Scoring => self.execute_scoring(run).await,
            StepName::MemoGeneration => self.execute_memo(run).await,
            StepName::VoiceInterview => self.execute_voice(run).await,
        }
    }

    /// Fan out one task per registered source, each under its own timeout,
    /// and block at the barrier until every dispatched lookup returned or
    /// the phase deadline passed. Lookup failures are not fatal: whatever
    /// arrived proceeds to scoring with the partial marker set.
    async fn execute_enrichment(&self, run: &RunState) -> EvaluatorResult<StepOutcome> {
        let mapping = self.store.get_mapping(&run.run_id).await?.ok_or_else(|| {
            EvaluatorError::InvalidState(format!("run {} has no mapping result", run.run_id))
        })?;
        if self.stages.enrichment_sources.is_empty() {
            return Ok(StepOutcome::EnrichmentSettled { partial: false });
        }

        let per_lookup = Duration::from_millis(self.config.enrichment.per_lookup_timeout_ms);
        let deadline = tokio::time::Instant::now()
            + Duration::from_millis(self.config.enrichment.phase_deadline_ms);
        let mapping = Arc::new(mapping);
        let flag = self.cancel_flag(&run.run_id);

        let mut set = JoinSet::new();
        let mut dispatched = 0usize;
        for source in &self.stages.enrichment_sources {
            // cooperative check between individual lookups
            if flag.load(Ordering::SeqCst) {
                break;
            }
            let source = Arc::clone(source);
            let mapping = Arc::clone(&mapping);
            dispatched += 1;
            set.spawn(async move {
                let name = source.name().to_string();
                match tokio::time::timeout(per_lookup, source.lookup(&mapping)).await {
                    Ok(Ok(records)) => (name, Ok(records)),
                    Ok(Err(e)) => (name, Err(e.to_string())),
                    Err(_) => (name, Err("lookup timed out".to_string())),
                }
            });
        }

        let mut collected = Vec::new();
        let mut settled = 0usize;
        let mut failures = 0usize;
        loop {
            match tokio::time::timeout_at(deadline, set.join_next()).await {
                Ok(Some(Ok((name, Ok(records))))) => {
                    settled += 1;
                    debug!(
                        run_id = %run.run_id,
                        source = %name,
                        records = records.len(),
                        "enrichment lookup returned"
                    );
                    collected.extend(records);
                }
                Ok(Some(Ok((name, Err(message))))) => {
                    settled += 1;
                    failures += 1;
                    warn!(run_id = %run.run_id, source = %name, error = %message, "enrichment lookup failed");
                }
                Ok(Some(Err(join_err))) => {
                    settled += 1;
                    failures += 1;
                    warn!(run_id = %run.run_id, error = %join_err, "enrichment task panicked");
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(run_id = %run.run_id, "enrichment phase deadline reached");
                    set.abort_all();
                    failures += dispatched - settled;
                    break;
                }
            }
        }

        if !collected.is_empty() {
            self.store.append_enrichment(&collected).await?;
        }
        Ok(StepOutcome::EnrichmentSettled {
            partial: failures > 0,
        })
    }

    async fn execute_scoring(&self, run: &RunState) -> EvaluatorResult<StepOutcome> {
        let evidence = self.evidence_for(run).await?;
        let score = ScoringEngine::score(&evidence, &self.catalog, &self.config.preferences)?;
        self.store.put_score_run(&score).await?;
        self.audit_event(
            &run.app_id,
            &run.run_id,
            AuditEventType::ScoreComputed,
            json!({
                "overall_score": score.overall_score,
                "decision": score.decision,
                "reduced_confidence": score.reduced_confidence,
            }),
        )
        .await?;
        if score.warnings.iter().any(|w| w.contains("renormalized")) {
            self.audit_event(
                &run.app_id,
                &run.run_id,
                AuditEventType::WeightsRenormalized,
                json!({ "weights": score.investor_weights }),
            )
            .await?;
        }
        Ok(StepOutcome::Completed)
    }

    async fn execute_memo(&self, run: &RunState) -> EvaluatorResult<StepOutcome> {
        let score = self.store.latest_score_run(&run.run_id).await?.ok_or_else(|| {
            EvaluatorError::InvalidState(format!("run {} has no score run", run.run_id))
        })?;
        let evidence = self.evidence_for(run).await?;
        let memo = self.assembler.assemble(&score, &evidence).await?;
        self.store.put_memo(&memo).await?;
        self.audit_event(
            &run.app_id,
            &run.run_id,
            AuditEventType::MemoAssembled,
            json!({ "sections": memo.sections.len() }),
        )
        .await?;
        Ok(StepOutcome::Completed)
    }

    async fn execute_voice(&self, run: &RunState) -> EvaluatorResult<StepOutcome> {
        let interviewer = self.stages.interviewer.as_ref().ok_or_else(|| {
            EvaluatorError::InvalidState(
                "voice interview step scheduled without an interviewer".to_string(),
            )
        })?;
        let submission = self.load_application(&run.app_id).await?;
        let questions: Vec<String> = INTERVIEW_AGENDA.iter().map(|q| q.to_string()).collect();
        let mut interview = interviewer.conduct(&submission, &questions).await?;
        interview.run_id = run.run_id.clone();
        interview.app_id = run.app_id.clone();
        self.store.put_voice_interview(&interview).await?;

        // merge post hoc; scoring is not re-run unless explicitly triggered
        if let Some(mut memo) = self.store.get_memo(&run.run_id).await? {
            self.assembler.merge_interview(&mut memo, &interview);
            self.store.put_memo(&memo).await?;
        }
        self.audit_event(
            &run.app_id,
            &run.run_id,
            AuditEventType::VoiceInterviewMerged,
            json!({ "duration_secs": interview.call_duration_secs }),
        )
        .await?;
        Ok(StepOutcome::Completed)
    }

    // -- state machine plumbing ---------------------------------------------

    /// Next step per the dependency graph: the linear chain, then the
    /// conditional interview step.
    async fn next_step(&self, run: &RunState) -> EvaluatorResult<Option<StepName>> {
        for step in [
            StepName::Extraction,
            StepName::Mapping,
            StepName::Enrichment,
            StepName::Scoring,
            StepName::MemoGeneration,
        ] {
            if !run.step_completed(step) {
                return Ok(Some(step));
            }
        }
        if !run.step_completed(StepName::VoiceInterview) && self.voice_step_due(run).await? {
            return Ok(Some(StepName::VoiceInterview));
        }
        Ok(None)
    }

    async fn voice_step_due(&self, run: &RunState) -> EvaluatorResult<bool> {
        if self.stages.interviewer.is_none() {
            return Ok(false);
        }
        let submission = self.load_application(&run.app_id).await?;
        if submission.voice_interview_requested {
            return Ok(true);
        }
        if !self.config.enable_voice_interview {
            return Ok(false);
        }
        Ok(self
            .store
            .latest_score_run(&run.run_id)
            .await?
            .map(|s| s.requires_voice_interview)
            .unwrap_or(false))
    }

    /// Conditional write with conflict replay. Losing the race means some
    /// other writer (a concurrent resume or cancel) advanced the run; we
    /// re-read, keep whichever progress is further, and merge the sticky
    /// cancellation flag.
    async fn commit(&self, run: RunState) -> EvaluatorResult<RunState> {
        match self.store.update_run(&run).await {
            Ok(stored) => Ok(stored),
            Err(EvaluatorError::PersistenceConflict(_)) => {
                let stored = self.load_run(&run.run_id).await?;
                warn!(run_id = %run.run_id, "run-state write lost the race, replaying transition");
                if stored.steps_completed.len() > run.steps_completed.len()
                    || stored.status.is_terminal()
                {
                    // the other writer is further along; never regress
                    return Ok(stored);
                }
                let mut merged = run;
                merged.version = stored.version;
                merged.cancel_requested = merged.cancel_requested || stored.cancel_requested;
                self.store.update_run(&merged).await
            }
            Err(e) => Err(e),
        }
    }

    async fn fail_run(
        &self,
        mut run: RunState,
        step: StepName,
        err: EvaluatorError,
    ) -> EvaluatorResult<RunState> {
        warn!(run_id = %run.run_id, step = %step, error = %err, "run failed");
        run.status = RunStatus::Failed;
        run.failure_step = Some(step);
        run.last_error = Some(err.to_string());
        let run = self.commit(run).await?;
        self.audit_event(
            &run.app_id,
            &run.run_id,
            AuditEventType::StepFailed,
            json!({
                "step": step.as_str(),
                "reason": err.reason_code(),
                "error": err.to_string(),
            }),
        )
        .await?;
        self.audit_event(
            &run.app_id,
            &run.run_id,
            AuditEventType::RunFailed,
            json!({ "step": step.as_str(), "reason": err.reason_code() }),
        )
        .await?;
        Ok(run)
    }

    async fn settle_cancelled(&self, mut run: RunState) -> EvaluatorResult<RunState> {
        run.status = RunStatus::Cancelled;
        run.cancel_requested = true;
        let run = self.commit(run).await?;
        self.audit_event(
            &run.app_id,
            &run.run_id,
            AuditEventType::RunCancelled,
            json!({ "at_step": run.current_step.map(|s| s.as_str()) }),
        )
        .await?;
        info!(run_id = %run.run_id, "run cancelled");
        Ok(run)
    }

    async fn complete_run(&self, mut run: RunState) -> EvaluatorResult<RunState> {
        run.status = RunStatus::Completed;
        let run = self.commit(run).await?;
        self.audit_event(
            &run.app_id,
            &run.run_id,
            AuditEventType::RunCompleted,
            json!({ "steps": run.steps_completed }),
        )
        .await?;
        Ok(run)
    }

    async fn evidence_for(&self, run: &RunState) -> EvaluatorResult<EvidenceStore> {
        let mapping = self.store.get_mapping(&run.run_id).await?.ok_or_else(|| {
            EvaluatorError::InvalidState(format!("run {} has no mapping result", run.run_id))
        })?;
        let mut evidence = EvidenceStore::new(mapping, self.catalog.min_signal_confidence);
        evidence.extend(self.store.enrichment_for_run(&run.run_id).await?);
        if run.enrichment_partial {
            evidence.mark_partial();
        }
        Ok(evidence)
    }

    async fn load_run(&self, run_id: &str) -> EvaluatorResult<RunState> {
        self.store
            .get_run(run_id)
            .await?
            .ok_or_else(|| EvaluatorError::RunNotFound(run_id.to_string()))
    }

    async fn load_application(&self, app_id: &str) -> EvaluatorResult<Submission> {
        self.store
            .get_application(app_id)
            .await?
            .ok_or_else(|| EvaluatorError::ApplicationNotFound(app_id.to_string()))
    }

    fn cancel_flag(&self, run_id: &str) -> Arc<AtomicBool> {
        let mut flags = match self.cancel_flags.lock() {
            Ok(flags) => flags,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(
            flags
                .entry(run_id.to_string())
                .or_insert_with(|| Arc::new(AtomicBool::new(false))),
        )
    }

    async fn audit_event(
        &self,
        app_id: &str,
        run_id: &str,
        event_type: AuditEventType,
        details: serde_json::Value,
    ) -> EvaluatorResult<()> {
        let event = {
            let mut trail = self
                .audit
                .lock()
                .map_err(|_| EvaluatorError::Storage("audit trail lock poisoned".to_string()))?;
            trail.append(AuditEvent::new(
                app_id,
                run_id,
                event_type,
                self.config.actor.clone(),
                details,
            ))
        };
        self.store.append_audit(&event).await
    }
}
