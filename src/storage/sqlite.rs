//! SQLite-backed store.
//!
//! Table layout follows the evaluation schema: `applications`,
//! `workflow_states`, `extraction_results`, `enrichment_results`,
//! `mapping_results`, `score_runs`, `investment_memos`, `voice_interviews`,
//! `audit_logs`. Structured fields persist as serde JSON payload columns
//! and are validated on read at this boundary; a row that no longer
//! deserializes surfaces as a storage error instead of silently passing a
//! loose blob upstream.
//!
//! `rusqlite::Connection` is `Send` but not `Sync`; wrapping it in a
//! `Mutex` makes the store shareable behind an `Arc`.

use crate::audit::{AuditEvent, AuditEventType};
use crate::errors::{EvaluatorError, EvaluatorResult};
use crate::storage::EvaluationStore;
use crate::types::{
    now_secs, EnrichmentRecord, ExtractionResult, MappingResult, Memo, RunState, ScoreRun,
    StepName, Submission, VoiceInterview,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::PathBuf;
use std::sync::Mutex;

pub struct SqliteStore {
    conn: Mutex<Connection>,
    #[allow(dead_code)]
    db_path: Option<PathBuf>,
}

const SCHEMA: &str = "BEGIN;
CREATE TABLE IF NOT EXISTS applications(
    id TEXT PRIMARY KEY,
    company_name TEXT NOT NULL,
    submission_time TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'accepted',
    raw_asset_uri TEXT NOT NULL,
    applicant_id TEXT NOT NULL,
    founders TEXT NOT NULL,
    assets TEXT NOT NULL,
    source TEXT NOT NULL,
    voice_interview_requested INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS workflow_states(
    run_id TEXT PRIMARY KEY,
    app_id TEXT NOT NULL,
    status TEXT NOT NULL,
    current_step TEXT,
    steps_completed TEXT NOT NULL,
    retry_count INTEGER NOT NULL,
    last_error TEXT,
    failure_step TEXT,
    cancel_requested INTEGER NOT NULL,
    enrichment_partial INTEGER NOT NULL,
    version INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_workflow_states_app ON workflow_states(app_id);
CREATE TABLE IF NOT EXISTS extraction_results(
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id TEXT NOT NULL UNIQUE,
    app_id TEXT NOT NULL,
    extractor_version TEXT NOT NULL,
    extracted_json TEXT NOT NULL,
    text_snippets TEXT NOT NULL,
    extracted_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS enrichment_results(
    id TEXT PRIMARY KEY,
    run_id TEXT NOT NULL,
    app_id TEXT NOT NULL,
    source TEXT NOT NULL,
    url TEXT NOT NULL,
    snippet TEXT NOT NULL,
    confidence REAL NOT NULL,
    signals TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_enrichment_run ON enrichment_results(run_id);
CREATE TABLE IF NOT EXISTS mapping_results(
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id TEXT NOT NULL UNIQUE,
    app_id TEXT NOT NULL,
    canonical_json TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS score_runs(
    id TEXT PRIMARY KEY,
    run_id TEXT NOT NULL,
    app_id TEXT NOT NULL,
    scores_json TEXT NOT NULL,
    overall_score REAL NOT NULL,
    investor_weights_json TEXT NOT NULL,
    decision TEXT NOT NULL,
    evidence_refs TEXT NOT NULL,
    stored_at INTEGER NOT NULL,
    seq INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_score_runs_run ON score_runs(run_id);
CREATE TABLE IF NOT EXISTS investment_memos(
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id TEXT NOT NULL UNIQUE,
    app_id TEXT NOT NULL,
    executive_summary TEXT NOT NULL,
    sections TEXT NOT NULL,
    final_recommendation TEXT NOT NULL,
    memo_text TEXT,
    memo_pdf_uri TEXT
);
CREATE TABLE IF NOT EXISTS voice_interviews(
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id TEXT NOT NULL UNIQUE,
    app_id TEXT NOT NULL,
    transcript TEXT NOT NULL,
    extracted_fields TEXT NOT NULL,
    call_duration INTEGER NOT NULL,
    conducted_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS audit_logs(
    id TEXT PRIMARY KEY,
    app_id TEXT NOT NULL,
    run_id TEXT NOT NULL,
    event_type TEXT NOT NULL,
    actor TEXT NOT NULL,
    details TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    chain_hash TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_audit_logs_app ON audit_logs(app_id);
COMMIT;";

impl SqliteStore {
    pub fn open<P: Into<PathBuf>>(path: P) -> EvaluatorResult<Self> {
        let db_path = path.into();
        let conn = Connection::open(&db_path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: Some(db_path),
        })
    }

    pub fn in_memory() -> EvaluatorResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: None,
        })
    }

    fn lock(&self) -> EvaluatorResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| EvaluatorError::Storage("connection lock poisoned".to_string()))
    }
}

fn parse_timestamp(raw: &str) -> EvaluatorResult<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>()
        .map_err(|e| EvaluatorError::Storage(format!("bad timestamp {raw}: {e}")))
}

/// Raw `workflow_states` row; hydrated into a RunState where the crate
/// error type is available.
struct RawRun {
    run_id: String,
    app_id: String,
    status: String,
    current_step: Option<String>,
    steps_completed: String,
    retry_count: u32,
    last_error: Option<String>,
    failure_step: Option<String>,
    cancel_requested: i64,
    enrichment_partial: i64,
    version: i64,
    created_at: String,
    updated_at: String,
}

fn run_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRun> {
    Ok(RawRun {
        run_id: row.get("run_id")?,
        app_id: row.get("app_id")?,
        status: row.get("status")?,
        current_step: row.get("current_step")?,
        steps_completed: row.get("steps_completed")?,
        retry_count: row.get("retry_count")?,
        last_error: row.get("last_error")?,
        failure_step: row.get("failure_step")?,
        cancel_requested: row.get("cancel_requested")?,
        enrichment_partial: row.get("enrichment_partial")?,
        version: row.get("version")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn finish_run(raw: RawRun) -> EvaluatorResult<RunState> {
    Ok(RunState {
        run_id: raw.run_id,
        app_id: raw.app_id,
        status: serde_json::from_value(serde_json::Value::String(raw.status))?,
        current_step: raw.current_step.as_deref().and_then(StepName::from_str_name),
        steps_completed: serde_json::from_str(&raw.steps_completed)?,
        retry_count: raw.retry_count,
        last_error: raw.last_error,
        failure_step: raw.failure_step.as_deref().and_then(StepName::from_str_name),
        cancel_requested: raw.cancel_requested != 0,
        enrichment_partial: raw.enrichment_partial != 0,
        version: raw.version as u64,
        created_at: parse_timestamp(&raw.created_at)?,
        updated_at: parse_timestamp(&raw.updated_at)?,
    })
}

#[async_trait]
impl EvaluationStore for SqliteStore {
    async fn insert_application(&self, submission: &Submission) -> EvaluatorResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO applications(
                id, company_name, submission_time, status, raw_asset_uri,
                applicant_id, founders, assets, source, voice_interview_requested)
             VALUES (?1, ?2, ?3, 'accepted', ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                submission.app_id,
                submission.company_name,
                submission.submitted_at.to_rfc3339(),
                submission.raw_asset_uri,
                submission.applicant_id,
                serde_json::to_string(&submission.founders)?,
                serde_json::to_string(&submission.assets)?,
                serde_json::to_string(&submission.source)?,
                submission.voice_interview_requested as i64,
            ],
        )?;
        Ok(())
    }

    async fn get_application(&self, app_id: &str) -> EvaluatorResult<Option<Submission>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT id, company_name, submission_time, raw_asset_uri, applicant_id,
                        founders, assets, source, voice_interview_requested
                 FROM applications WHERE id = ?1",
                params![app_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, String>(7)?,
                        row.get::<_, i64>(8)?,
                    ))
                },
            )
            .optional()?;
        let Some((app_id, company_name, submitted, uri, applicant, founders, assets, source, voice)) =
            row
        else {
            return Ok(None);
        };
        Ok(Some(Submission {
            app_id,
            company_name,
            submitted_at: parse_timestamp(&submitted)?,
            raw_asset_uri: uri,
            applicant_id: applicant,
            founders: serde_json::from_str(&founders)?,
            assets: serde_json::from_str(&assets)?,
            source: serde_json::from_str(&source)?,
            voice_interview_requested: voice != 0,
        }))
    }

    async fn create_run(&self, run: &RunState) -> EvaluatorResult<()> {
        let conn = self.lock()?;
        let active: Option<String> = conn
            .query_row(
                "SELECT run_id FROM workflow_states
                 WHERE app_id = ?1 AND status NOT IN ('completed', 'failed', 'cancelled')
                 LIMIT 1",
                params![run.app_id],
                |row| row.get(0),
            )
            .optional()?;
        if active.is_some() {
            return Err(EvaluatorError::DuplicateRun(run.app_id.clone()));
        }
        conn.execute(
            "INSERT INTO workflow_states(
                run_id, app_id, status, current_step, steps_completed, retry_count,
                last_error, failure_step, cancel_requested, enrichment_partial,
                version, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                run.run_id,
                run.app_id,
                run.status.to_string(),
                run.current_step.map(|s| s.as_str()),
                serde_json::to_string(&run.steps_completed)?,
                run.retry_count,
                run.last_error,
                run.failure_step.map(|s| s.as_str()),
                run.cancel_requested as i64,
                run.enrichment_partial as i64,
                run.version as i64,
                run.created_at.to_rfc3339(),
                run.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    async fn get_run(&self, run_id: &str) -> EvaluatorResult<Option<RunState>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT * FROM workflow_states WHERE run_id = ?1",
                params![run_id],
                run_from_row,
            )
            .optional()?;
        row.map(finish_run).transpose()
    }

    async fn active_run_for(&self, app_id: &str) -> EvaluatorResult<Option<RunState>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT * FROM workflow_states
                 WHERE app_id = ?1 AND status NOT IN ('completed', 'failed', 'cancelled')
                 LIMIT 1",
                params![app_id],
                run_from_row,
            )
            .optional()?;
        row.map(finish_run).transpose()
    }

    async fn update_run(&self, run: &RunState) -> EvaluatorResult<RunState> {
        let mut next = run.clone();
        next.version = run.version + 1;
        next.updated_at = Utc::now();
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE workflow_states SET
                status = ?1, current_step = ?2, steps_completed = ?3, retry_count = ?4,
                last_error = ?5, failure_step = ?6, cancel_requested = ?7,
                enrichment_partial = ?8, version = ?9, updated_at = ?10
             WHERE run_id = ?11 AND version = ?12",
            params![
                next.status.to_string(),
                next.current_step.map(|s| s.as_str()),
                serde_json::to_string(&next.steps_completed)?,
                next.retry_count,
                next.last_error,
                next.failure_step.map(|s| s.as_str()),
                next.cancel_requested as i64,
                next.enrichment_partial as i64,
                next.version as i64,
                next.updated_at.to_rfc3339(),
                next.run_id,
                run.version as i64,
            ],
        )?;
        if changed == 1 {
            return Ok(next);
        }
        let exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM workflow_states WHERE run_id = ?1",
                params![run.run_id],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_some() {
            Err(EvaluatorError::PersistenceConflict(run.run_id.clone()))
        } else {
            Err(EvaluatorError::RunNotFound(run.run_id.clone()))
        }
    }

    async fn put_extraction(&self, result: &ExtractionResult) -> EvaluatorResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO extraction_results(
                run_id, app_id, extractor_version, extracted_json, text_snippets, extracted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                result.run_id,
                result.app_id,
                result.extractor_version,
                serde_json::to_string(&result.fields)?,
                serde_json::to_string(&result.text_snippets)?,
                result.extracted_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    async fn get_extraction(&self, run_id: &str) -> EvaluatorResult<Option<ExtractionResult>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT run_id, app_id, extractor_version, extracted_json, text_snippets,
                        extracted_at
                 FROM extraction_results WHERE run_id = ?1",
                params![run_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()?;
        let Some((run_id, app_id, version, fields, snippets, at)) = row else {
            return Ok(None);
        };
        Ok(Some(ExtractionResult {
            run_id,
            app_id,
            extractor_version: version,
            fields: serde_json::from_str(&fields)?,
            text_snippets: serde_json::from_str(&snippets)?,
            extracted_at: parse_timestamp(&at)?,
        }))
    }

    async fn put_mapping(&self, result: &MappingResult) -> EvaluatorResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO mapping_results(run_id, app_id, canonical_json)
             VALUES (?1, ?2, ?3)",
            params![
                result.run_id,
                result.app_id,
                serde_json::to_string(result)?
            ],
        )?;
        Ok(())
    }

    async fn get_mapping(&self, run_id: &str) -> EvaluatorResult<Option<MappingResult>> {
        let conn = self.lock()?;
        let payload: Option<String> = conn
            .query_row(
                "SELECT canonical_json FROM mapping_results WHERE run_id = ?1",
                params![run_id],
                |row| row.get(0),
            )
            .optional()?;
        payload
            .map(|p| serde_json::from_str(&p).map_err(EvaluatorError::from))
            .transpose()
    }

    async fn append_enrichment(&self, records: &[EnrichmentRecord]) -> EvaluatorResult<()> {
        let conn = self.lock()?;
        for record in records {
            conn.execute(
                "INSERT OR IGNORE INTO enrichment_results(
                    id, run_id, app_id, source, url, snippet, confidence, signals)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    record.record_id,
                    record.run_id,
                    record.app_id,
                    record.source,
                    record.url,
                    record.snippet,
                    record.confidence,
                    serde_json::to_string(&record.signals)?,
                ],
            )?;
        }
        Ok(())
    }

    async fn enrichment_for_run(&self, run_id: &str) -> EvaluatorResult<Vec<EnrichmentRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, run_id, app_id, source, url, snippet, confidence, signals
             FROM enrichment_results WHERE run_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![run_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, f64>(6)?,
                row.get::<_, String>(7)?,
            ))
        })?;
        let mut records = Vec::new();
        for row in rows {
            let (record_id, run_id, app_id, source, url, snippet, confidence, signals) = row?;
            records.push(EnrichmentRecord {
                record_id,
                run_id,
                app_id,
                source,
                url,
                snippet,
                confidence,
                signals: serde_json::from_str(&signals)?,
            });
        }
        Ok(records)
    }

    async fn put_score_run(&self, score: &ScoreRun) -> EvaluatorResult<()> {
        let conn = self.lock()?;
        let seq: i64 = conn.query_row(
            "SELECT COALESCE(MAX(seq), 0) + 1 FROM score_runs WHERE run_id = ?1",
            params![score.run_id],
            |row| row.get(0),
        )?;
        let evidence_refs: Vec<_> = score
            .category_scores
            .iter()
            .flat_map(|cs| cs.evidence.iter())
            .collect();
        conn.execute(
            "INSERT OR REPLACE INTO score_runs(
                id, run_id, app_id, scores_json, overall_score,
                investor_weights_json, decision, evidence_refs, stored_at, seq)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                score.score_id,
                score.run_id,
                score.app_id,
                serde_json::to_string(score)?,
                score.overall_score,
                serde_json::to_string(&score.investor_weights)?,
                score.decision.to_string(),
                serde_json::to_string(&evidence_refs)?,
                now_secs() as i64,
                seq,
            ],
        )?;
        Ok(())
    }

    async fn latest_score_run(&self, run_id: &str) -> EvaluatorResult<Option<ScoreRun>> {
        let conn = self.lock()?;
        let payload: Option<String> = conn
            .query_row(
                "SELECT scores_json FROM score_runs WHERE run_id = ?1
                 ORDER BY seq DESC LIMIT 1",
                params![run_id],
                |row| row.get(0),
            )
            .optional()?;
        payload
            .map(|p| serde_json::from_str(&p).map_err(EvaluatorError::from))
            .transpose()
    }

    async fn put_memo(&self, memo: &Memo) -> EvaluatorResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO investment_memos(
                run_id, app_id, executive_summary, sections, final_recommendation,
                memo_text, memo_pdf_uri)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL)",
            params![
                memo.run_id,
                memo.app_id,
                memo.executive_summary,
                serde_json::to_string(memo)?,
                memo.final_recommendation,
                memo.rendered_artifact,
            ],
        )?;
        Ok(())
    }

    async fn get_memo(&self, run_id: &str) -> EvaluatorResult<Option<Memo>> {
        let conn = self.lock()?;
        let payload: Option<String> = conn
            .query_row(
                "SELECT sections FROM investment_memos WHERE run_id = ?1",
                params![run_id],
                |row| row.get(0),
            )
            .optional()?;
        payload
            .map(|p| serde_json::from_str(&p).map_err(EvaluatorError::from))
            .transpose()
    }

    async fn put_voice_interview(&self, interview: &VoiceInterview) -> EvaluatorResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO voice_interviews(
                run_id, app_id, transcript, extracted_fields, call_duration, conducted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                interview.run_id,
                interview.app_id,
                interview.transcript,
                serde_json::to_string(&interview.extracted_fields)?,
                interview.call_duration_secs as i64,
                interview.conducted_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    async fn get_voice_interview(&self, run_id: &str) -> EvaluatorResult<Option<VoiceInterview>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT run_id, app_id, transcript, extracted_fields, call_duration, conducted_at
                 FROM voice_interviews WHERE run_id = ?1",
                params![run_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()?;
        let Some((run_id, app_id, transcript, fields, duration, at)) = row else {
            return Ok(None);
        };
        Ok(Some(VoiceInterview {
            run_id,
            app_id,
            transcript,
            extracted_fields: serde_json::from_str(&fields)?,
            call_duration_secs: duration as u64,
            conducted_at: parse_timestamp(&at)?,
        }))
    }

    async fn append_audit(&self, event: &AuditEvent) -> EvaluatorResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR IGNORE INTO audit_logs(
                id, app_id, run_id, event_type, actor, details, timestamp, chain_hash)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                event.event_id,
                event.app_id,
                event.run_id,
                event.event_type.as_str(),
                event.actor,
                event.details.to_string(),
                event.timestamp as i64,
                event.chain_hash,
            ],
        )?;
        Ok(())
    }

    async fn audit_for_app(&self, app_id: &str) -> EvaluatorResult<Vec<AuditEvent>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, app_id, run_id, event_type, actor, details, timestamp, chain_hash
             FROM audit_logs WHERE app_id = ?1 ORDER BY rowid",
        )?;
        let rows = stmt.query_map(params![app_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, i64>(6)?,
                row.get::<_, String>(7)?,
            ))
        })?;
        let mut events = Vec::new();
        for row in rows {
            let (event_id, app_id, run_id, event_type, actor, details, timestamp, chain_hash) =
                row?;
            let event_type: AuditEventType =
                serde_json::from_value(serde_json::Value::String(event_type))?;
            events.push(AuditEvent {
                event_id,
                app_id,
                run_id,
                event_type,
                actor,
                details: serde_json::from_str(&details)?,
                timestamp: timestamp as u64,
                chain_hash,
            });
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RunStatus;

    #[tokio::test]
    async fn round_trips_application_and_run() {
        let store = SqliteStore::in_memory().unwrap();
        let submission = Submission::new("Acme", "user-1").with_asset("deck", "gs://deck.pdf");
        store.insert_application(&submission).await.unwrap();
        let loaded = store
            .get_application(&submission.app_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.company_name, "Acme");
        assert_eq!(loaded.raw_asset_uri, "gs://deck.pdf");

        let mut run = RunState::new(submission.app_id.clone());
        store.create_run(&run).await.unwrap();
        run.record_step_completed(StepName::Extraction);
        run.status = RunStatus::Mapping;
        run.current_step = Some(StepName::Mapping);
        let stored = store.update_run(&run).await.unwrap();
        assert_eq!(stored.version, 1);

        let loaded = store.get_run(&run.run_id).await.unwrap().unwrap();
        assert_eq!(loaded.steps_completed, vec![StepName::Extraction]);
        assert_eq!(loaded.status, RunStatus::Mapping);
    }

    #[tokio::test]
    async fn conditional_write_rejects_stale_version() {
        let store = SqliteStore::in_memory().unwrap();
        let run = RunState::new("app-1".to_string());
        store.create_run(&run).await.unwrap();
        store.update_run(&run).await.unwrap();
        let err = store.update_run(&run).await.unwrap_err();
        assert!(matches!(err, EvaluatorError::PersistenceConflict(_)));
    }

    #[tokio::test]
    async fn duplicate_active_run_rejected_until_terminal() {
        let store = SqliteStore::in_memory().unwrap();
        let run = RunState::new("app-1".to_string());
        store.create_run(&run).await.unwrap();
        let err = store
            .create_run(&RunState::new("app-1".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, EvaluatorError::DuplicateRun(_)));

        let mut finished = store.get_run(&run.run_id).await.unwrap().unwrap();
        finished.status = RunStatus::Cancelled;
        store.update_run(&finished).await.unwrap();
        store
            .create_run(&RunState::new("app-1".to_string()))
            .await
            .unwrap();
    }
}
