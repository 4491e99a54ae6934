//! Core domain types for the evaluation pipeline.
//!
//! These are the decoupled records that flow between the coordinator, the
//! scoring engine, and the persistence layer: Submission, RunState,
//! ExtractionResult, EnrichmentRecord, MappingResult, ScoreRun, Memo.
//! Everything here is serde-serializable; the persistence boundary stores
//! these records as versioned JSON payloads rather than loose blobs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Unique identifier for an accepted application (one per submission).
pub type AppId = String;

/// Unique identifier for a single evaluation attempt.
pub type RunId = String;

/// Unique identifier for an enrichment record.
pub type RecordId = String;

/// Current epoch seconds. Used by the audit ledger; domain records carry
/// `DateTime<Utc>` instead.
pub fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Channel through which a submission arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionSource {
    Form,
    PitchDeck,
    VideoUrl,
    Referral,
}

/// A founder as declared in the submission, before any verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FounderInfo {
    pub name: String,
    pub background: String,
    #[serde(default)]
    pub experience_years: Option<u32>,
    #[serde(default)]
    pub previous_exits: Option<u32>,
    #[serde(default)]
    pub domain_expertise: Option<String>,
    #[serde(default)]
    pub linkedin_url: Option<String>,
}

/// Reference to a raw submitted asset (deck, recording, form payload).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRef {
    pub kind: String,
    pub uri: String,
}

/// An accepted startup submission. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub app_id: AppId,
    pub company_name: String,
    pub submitted_at: DateTime<Utc>,
    pub raw_asset_uri: String,
    pub applicant_id: String,
    pub founders: Vec<FounderInfo>,
    #[serde(default)]
    pub assets: Vec<AssetRef>,
    pub source: SubmissionSource,
    /// Explicit request for a founder interview as part of this evaluation.
    #[serde(default)]
    pub voice_interview_requested: bool,
}

impl Submission {
    pub fn new(company_name: impl Into<String>, applicant_id: impl Into<String>) -> Self {
        Self {
            app_id: format!("app-{}", Uuid::new_v4()),
            company_name: company_name.into(),
            submitted_at: Utc::now(),
            raw_asset_uri: String::new(),
            applicant_id: applicant_id.into(),
            founders: Vec::new(),
            assets: Vec::new(),
            source: SubmissionSource::Form,
            voice_interview_requested: false,
        }
    }

    pub fn with_source(mut self, source: SubmissionSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_asset(mut self, kind: impl Into<String>, uri: impl Into<String>) -> Self {
        let uri = uri.into();
        if self.raw_asset_uri.is_empty() {
            self.raw_asset_uri = uri.clone();
        }
        self.assets.push(AssetRef {
            kind: kind.into(),
            uri,
        });
        self
    }

    pub fn with_founder(mut self, founder: FounderInfo) -> Self {
        self.founders.push(founder);
        self
    }

    pub fn with_interview_requested(mut self) -> Self {
        self.voice_interview_requested = true;
        self
    }
}

/// One named phase of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepName {
    Extraction,
    Mapping,
    Enrichment,
    Scoring,
    MemoGeneration,
    VoiceInterview,
}

impl StepName {
    /// Pipeline order. VoiceInterview is conditional and always last.
    pub const SEQUENCE: [StepName; 6] = [
        StepName::Extraction,
        StepName::Mapping,
        StepName::Enrichment,
        StepName::Scoring,
        StepName::MemoGeneration,
        StepName::VoiceInterview,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepName::Extraction => "extraction",
            StepName::Mapping => "mapping",
            StepName::Enrichment => "enrichment",
            StepName::Scoring => "scoring",
            StepName::MemoGeneration => "memo_generation",
            StepName::VoiceInterview => "voice_interview",
        }
    }

    pub fn from_str_name(s: &str) -> Option<StepName> {
        StepName::SEQUENCE.iter().copied().find(|n| n.as_str() == s)
    }
}

impl std::fmt::Display for StepName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a run. Terminal states are Completed, Failed, Cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Extracting,
    Mapping,
    Enriching,
    Scoring,
    GeneratingMemo,
    Interviewing,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled
        )
    }

    /// The status a run carries while the given step executes.
    pub fn for_step(step: StepName) -> RunStatus {
        match step {
            StepName::Extraction => RunStatus::Extracting,
            StepName::Mapping => RunStatus::Mapping,
            StepName::Enrichment => RunStatus::Enriching,
            StepName::Scoring => RunStatus::Scoring,
            StepName::MemoGeneration => RunStatus::GeneratingMemo,
            StepName::VoiceInterview => RunStatus::Interviewing,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::Pending => "pending",
            RunStatus::Extracting => "extracting",
            RunStatus::Mapping => "mapping",
            RunStatus::Enriching => "enriching",
            RunStatus::Scoring => "scoring",
            RunStatus::GeneratingMemo => "generating_memo",
            RunStatus::Interviewing => "interviewing",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// The persisted record of a single evaluation's progress.
///
/// Owned exclusively by the coordinator; stage collaborators never touch it.
/// `version` is the optimistic-concurrency token: every accepted store write
/// increments it, and a write against a stale version is rejected with
/// `PersistenceConflict` rather than silently overwriting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: RunId,
    pub app_id: AppId,
    pub status: RunStatus,
    pub current_step: Option<StepName>,
    /// Ordered set of finished steps. Grows monotonically, never shrinks.
    pub steps_completed: Vec<StepName>,
    /// Retry counter for the step currently executing; reset on success.
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub failure_step: Option<StepName>,
    /// Cooperative cancellation flag, observed between steps.
    pub cancel_requested: bool,
    /// Set when the enrichment fan-in closed with one or more lookups
    /// failed or timed out; propagates to ScoreRun.reduced_confidence.
    pub enrichment_partial: bool,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RunState {
    pub fn new(app_id: AppId) -> Self {
        let now = Utc::now();
        Self {
            run_id: format!("run-{}", Uuid::new_v4()),
            app_id,
            status: RunStatus::Pending,
            current_step: Some(StepName::Extraction),
            steps_completed: Vec::new(),
            retry_count: 0,
            last_error: None,
            failure_step: None,
            cancel_requested: false,
            enrichment_partial: false,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn step_completed(&self, step: StepName) -> bool {
        self.steps_completed.contains(&step)
    }

    /// Append a finished step. Idempotent: a step already recorded is kept
    /// in its original position so the ordered set never regresses.
    pub fn record_step_completed(&mut self, step: StepName) {
        if !self.steps_completed.contains(&step) {
            self.steps_completed.push(step);
        }
        self.retry_count = 0;
    }
}

/// Structured fields the extraction collaborator pulled out of raw assets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedFields {
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub problem_statement: Option<String>,
    #[serde(default)]
    pub solution: Option<String>,
    #[serde(default)]
    pub differentiator: Option<String>,
    #[serde(default)]
    pub funding_stage: Option<String>,
    #[serde(default)]
    pub funding_amount: Option<f64>,
    #[serde(default)]
    pub founders: Vec<FounderInfo>,
    /// Raw numeric facts keyed by metric input name (market_size, revenue,
    /// experience scores, ...). The mapper normalizes these into the
    /// canonical metric input space.
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
}

/// Output of the extraction step. Produced once per run, immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub run_id: RunId,
    pub app_id: AppId,
    pub extractor_version: String,
    pub fields: ExtractedFields,
    #[serde(default)]
    pub text_snippets: Vec<String>,
    pub extracted_at: DateTime<Utc>,
}

/// A founder in the canonical profile, with the computed fit score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FounderProfile {
    pub name: String,
    pub background: String,
    pub experience_years: u32,
    pub previous_exits: u32,
    pub domain_expertise: String,
    pub founder_market_fit_score: f64,
}

/// Market summary inside the canonical profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSummary {
    pub market_size: f64,
    pub growth_rate: f64,
    pub competition_level: String,
}

/// Canonical startup profile derived from extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartupProfile {
    pub company_name: String,
    pub founders: Vec<FounderProfile>,
    pub problem_statement: String,
    pub solution: String,
    pub unique_differentiator: String,
    pub market: MarketSummary,
    pub funding_stage: String,
    #[serde(default)]
    pub funding_amount: Option<f64>,
}

/// Output of the mapping step: the canonical profile plus the flat metric
/// input space consumed by scoring. One per run, immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingResult {
    pub run_id: RunId,
    pub app_id: AppId,
    pub profile: StartupProfile,
    /// Metric inputs keyed by input name. BTreeMap keeps iteration
    /// deterministic so identical inputs re-score identically.
    pub metrics: BTreeMap<String, f64>,
    pub mapped_at: DateTime<Utc>,
}

/// One fact from an external lookup. Append-only, 0..N per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentRecord {
    pub record_id: RecordId,
    pub run_id: RunId,
    pub app_id: AppId,
    /// Source identifier: "news", "founder_profiles", "market_data",
    /// "competitors", ...
    pub source: String,
    pub url: String,
    pub snippet: String,
    /// Confidence in [0,1]; gates whether `signals` feed the metric space.
    pub confidence: f64,
    /// Numeric facts this lookup extracted, keyed by metric input name.
    #[serde(default)]
    pub signals: BTreeMap<String, f64>,
}

impl EnrichmentRecord {
    pub fn new(
        run_id: impl Into<RunId>,
        app_id: impl Into<AppId>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            record_id: format!("enr-{}", Uuid::new_v4()),
            run_id: run_id.into(),
            app_id: app_id.into(),
            source: source.into(),
            url: String::new(),
            snippet: String::new(),
            confidence: 0.5,
            signals: BTreeMap::new(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = snippet.into();
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_signal(mut self, key: impl Into<String>, value: f64) -> Self {
        self.signals.insert(key.into(), value);
        self
    }
}

/// Where a scored value came from, for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EvidenceSource {
    Mapping { input: String },
    Enrichment { record_id: RecordId, url: String },
    Interview { field: String },
}

/// A single piece of evidence cited by a score or memo fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRef {
    pub metric_id: String,
    pub value: f64,
    pub source: EvidenceSource,
}

/// Investment decision derived from the overall score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Buy,
    Hold,
    Pass,
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Decision::Buy => "BUY",
            Decision::Hold => "HOLD",
            Decision::Pass => "PASS",
        };
        f.write_str(s)
    }
}

/// Score for one category, with the weight actually used after any
/// renormalization and the evidence that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryScore {
    pub category: crate::catalog::Category,
    pub score: f64,
    pub weight: f64,
    pub evidence: Vec<EvidenceRef>,
}

/// The result of one scoring pass. Immutable; re-scoring appends a new one.
///
/// A ScoreRun is a pure value: no clock, no randomness. `score_id` is a
/// content hash, so scoring identical inputs against the same catalog
/// reproduces an identical record. The store stamps write time separately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRun {
    pub score_id: String,
    pub run_id: RunId,
    pub app_id: AppId,
    pub category_scores: Vec<CategoryScore>,
    pub overall_score: f64,
    pub decision: Decision,
    /// Category weights actually applied (post-renormalization).
    pub investor_weights: BTreeMap<String, f64>,
    pub confidence: f64,
    /// Set when scoring proceeded on a partial enrichment fan-in.
    pub reduced_confidence: bool,
    pub risk_flags: Vec<String>,
    pub requires_voice_interview: bool,
    pub warnings: Vec<String>,
    pub catalog_version: String,
}

/// Fixed memo section kinds, in rendering order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoSectionKind {
    ExecutiveSummary,
    Team,
    Market,
    Differentiation,
    Traction,
    Risks,
    Recommendation,
    InterviewFindings,
}

impl MemoSectionKind {
    pub fn title(&self) -> &'static str {
        match self {
            MemoSectionKind::ExecutiveSummary => "Executive Summary",
            MemoSectionKind::Team => "Team",
            MemoSectionKind::Market => "Market",
            MemoSectionKind::Differentiation => "Differentiation",
            MemoSectionKind::Traction => "Traction",
            MemoSectionKind::Risks => "Risks",
            MemoSectionKind::Recommendation => "Recommendation",
            MemoSectionKind::InterviewFindings => "Interview Findings",
        }
    }
}

/// One memo section: structured facts plus collaborator-rendered prose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoSection {
    pub kind: MemoSectionKind,
    pub title: String,
    pub facts: Vec<String>,
    pub citations: Vec<EvidenceRef>,
    pub prose: String,
}

/// The structured investment memo. Produced once per completed
/// MemoGeneration step; voice findings merge in post hoc.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memo {
    pub run_id: RunId,
    pub app_id: AppId,
    pub executive_summary: String,
    pub sections: Vec<MemoSection>,
    pub final_recommendation: String,
    #[serde(default)]
    pub rendered_artifact: Option<String>,
    pub assembled_at: DateTime<Utc>,
}

/// Transcript and structured findings from a founder interview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceInterview {
    pub run_id: RunId,
    pub app_id: AppId,
    pub transcript: String,
    /// Clarified numeric facts keyed by metric input name, merged into the
    /// metric space only on an explicit rescore.
    pub extracted_fields: BTreeMap<String, f64>,
    pub call_duration_secs: u64,
    pub conducted_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_name_round_trips_through_str() {
        for step in StepName::SEQUENCE {
            assert_eq!(StepName::from_str_name(step.as_str()), Some(step));
        }
        assert_eq!(StepName::from_str_name("nope"), None);
    }

    #[test]
    fn record_step_completed_is_idempotent_and_ordered() {
        let mut run = RunState::new("app-1".to_string());
        run.record_step_completed(StepName::Extraction);
        run.retry_count = 2;
        run.record_step_completed(StepName::Mapping);
        run.record_step_completed(StepName::Extraction);
        assert_eq!(
            run.steps_completed,
            vec![StepName::Extraction, StepName::Mapping]
        );
        assert_eq!(run.retry_count, 0);
    }

    #[test]
    fn terminal_statuses() {
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::Cancelled.is_terminal());
        assert!(!RunStatus::Scoring.is_terminal());
    }
}
