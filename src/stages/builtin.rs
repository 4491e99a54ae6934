//! In-process collaborator implementations.
//!
//! `CanonicalMapper` and `TemplateRenderer` are real defaults: the mapper
//! carries the full normalization rules and the renderer produces
//! deterministic prose without an external model. The fixture types exist
//! for tests that need scripted stage behavior (transient failures, slow
//! lookups, canned extractions).

use crate::errors::{EvaluatorError, EvaluatorResult};
use crate::stages::{
    EnrichmentSource, Extractor, Mapper, MemoRenderer, SectionRenderRequest, VoiceInterviewer,
};
use crate::types::{
    EnrichmentRecord, ExtractedFields, ExtractionResult, FounderProfile, MappingResult,
    MarketSummary, Memo, StartupProfile, StepName, Submission, VoiceInterview,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Default mapping collaborator: extraction fields in, canonical profile
/// and metric input space out.
///
/// Defaulting rules: a missing founder list yields one placeholder founder;
/// an absent differentiator is synthesized from the solution text; the
/// founder fit fallback is `5.0 + 0.3*experience_years (+2.0 domain match)`
/// capped at 10. A missing company name is a validation failure, not a
/// default: a submission we cannot even name is not scoreable.
pub struct CanonicalMapper;

#[async_trait]
impl Mapper for CanonicalMapper {
    async fn map(&self, extraction: &ExtractionResult) -> EvaluatorResult<MappingResult> {
        let fields = &extraction.fields;
        let company_name = fields
            .company_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                EvaluatorError::Validation("extraction produced no company name".to_string())
            })?
            .to_string();

        let problem_statement = fields
            .problem_statement
            .clone()
            .unwrap_or_else(|| "Problem not identified".to_string());
        let solution = fields
            .solution
            .clone()
            .unwrap_or_else(|| "Solution not identified".to_string());

        let founders = map_founders(fields, &problem_statement);
        let differentiator = fields
            .differentiator
            .clone()
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| {
                if fields.solution.is_some() {
                    let prefix: String = solution.chars().take(100).collect();
                    format!("Innovative approach: {prefix}")
                } else {
                    "Unique market positioning".to_string()
                }
            });

        let mut metrics = fields.metrics.clone();
        let mean_fit = founders
            .iter()
            .map(|f| f.founder_market_fit_score)
            .sum::<f64>()
            / founders.len() as f64;
        metrics
            .entry("founder_market_fit_score".to_string())
            .or_insert(mean_fit);
        if let Some(max_years) = founders.iter().map(|f| f.experience_years).max() {
            metrics
                .entry("founder_experience_years".to_string())
                .or_insert(max_years as f64);
        }

        let market = MarketSummary {
            market_size: metrics
                .get("total_addressable_market")
                .copied()
                .unwrap_or(0.0),
            growth_rate: metrics.get("market_growth_rate").copied().unwrap_or(0.15),
            competition_level: competition_level(metrics.get("competitive_intensity").copied()),
        };

        Ok(MappingResult {
            run_id: extraction.run_id.clone(),
            app_id: extraction.app_id.clone(),
            profile: StartupProfile {
                company_name,
                founders,
                problem_statement,
                solution,
                unique_differentiator: differentiator,
                market,
                funding_stage: fields
                    .funding_stage
                    .clone()
                    .unwrap_or_else(|| "Seed".to_string()),
                funding_amount: fields.funding_amount,
            },
            metrics,
            mapped_at: Utc::now(),
        })
    }
}

fn map_founders(fields: &ExtractedFields, problem: &str) -> Vec<FounderProfile> {
    if fields.founders.is_empty() {
        return vec![FounderProfile {
            name: "Founder".to_string(),
            background: "Industry expert".to_string(),
            experience_years: 5,
            previous_exits: 0,
            domain_expertise: "Business".to_string(),
            founder_market_fit_score: 6.0,
        }];
    }
    fields
        .founders
        .iter()
        .map(|info| {
            let experience_years = info.experience_years.unwrap_or(5);
            let domain = info
                .domain_expertise
                .clone()
                .unwrap_or_else(|| "Business".to_string());
            let domain_match = problem.to_lowercase().contains(&domain.to_lowercase());
            let fit = (5.0
                + 0.3 * experience_years as f64
                + if domain_match { 2.0 } else { 0.0 })
            .min(10.0);
            FounderProfile {
                name: info.name.clone(),
                background: info.background.clone(),
                experience_years,
                previous_exits: info.previous_exits.unwrap_or(0),
                domain_expertise: domain,
                founder_market_fit_score: fit,
            }
        })
        .collect()
}

fn competition_level(intensity: Option<f64>) -> String {
    match intensity {
        Some(v) if v >= 7.0 => "high".to_string(),
        Some(v) if v < 4.0 => "low".to_string(),
        _ => "medium".to_string(),
    }
}

/// Deterministic prose renderer. Stitches the structured facts into plain
/// sentences and the full memo into a markdown artifact; useful as the
/// no-model default and as the reference for what "complete content" means.
pub struct TemplateRenderer;

#[async_trait]
impl MemoRenderer for TemplateRenderer {
    async fn render_section(&self, request: SectionRenderRequest<'_>) -> EvaluatorResult<String> {
        if request.facts.is_empty() {
            return Err(EvaluatorError::MemoRender(format!(
                "no facts available for section {}",
                request.kind.title()
            )));
        }
        Ok(format!(
            "{}: {}.",
            request.company_name,
            request.facts.join(". ")
        ))
    }

    async fn render_artifact(&self, memo: &Memo) -> EvaluatorResult<String> {
        let mut out = String::new();
        out.push_str(&format!("# Investment Memo\n\n{}\n", memo.executive_summary));
        for section in &memo.sections {
            out.push_str(&format!("\n## {}\n\n{}\n", section.title, section.prose));
            for citation in &section.citations {
                out.push_str(&format!(
                    "- {} = {:.2}\n",
                    citation.metric_id, citation.value
                ));
            }
        }
        out.push_str(&format!("\n---\n{}\n", memo.final_recommendation));
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Test fixtures
// ---------------------------------------------------------------------------

/// Extractor returning canned fields, optionally failing transiently the
/// first `fail_times` calls.
pub struct FixtureExtractor {
    fields: ExtractedFields,
    text_snippets: Vec<String>,
    fail_times: AtomicU32,
    calls: AtomicU32,
}

impl FixtureExtractor {
    pub fn returning(fields: ExtractedFields) -> Self {
        Self {
            fields,
            text_snippets: Vec::new(),
            fail_times: AtomicU32::new(0),
            calls: AtomicU32::new(0),
        }
    }

    /// Total extract() invocations, successful or not.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn with_snippets(mut self, snippets: Vec<String>) -> Self {
        self.text_snippets = snippets;
        self
    }

    /// Fail the first `n` calls with a transient error, then succeed.
    pub fn with_transient_failures(self, n: u32) -> Self {
        self.fail_times.store(n, Ordering::SeqCst);
        self
    }
}

#[async_trait]
impl Extractor for FixtureExtractor {
    async fn extract(&self, submission: &Submission) -> EvaluatorResult<ExtractionResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.fail_times.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_times.store(remaining - 1, Ordering::SeqCst);
            return Err(EvaluatorError::TransientStage {
                step: StepName::Extraction,
                message: "upstream extraction service unavailable".to_string(),
            });
        }
        Ok(ExtractionResult {
            run_id: String::new(), // filled in by the coordinator
            app_id: submission.app_id.clone(),
            extractor_version: "fixture-1".to_string(),
            fields: self.fields.clone(),
            text_snippets: self.text_snippets.clone(),
            extracted_at: Utc::now(),
        })
    }
}

/// How a fixture enrichment source behaves when called.
pub enum FixtureLookup {
    /// Return these (confidence, signals, snippet) facts.
    Records(Vec<FixtureRecord>),
    /// Fail with a transient error.
    Fail,
    /// Sleep for the duration, then return nothing; drives timeout tests.
    Hang(Duration),
}

pub struct FixtureRecord {
    pub url: String,
    pub snippet: String,
    pub confidence: f64,
    pub signals: BTreeMap<String, f64>,
}

/// Enrichment source with scripted behavior.
pub struct FixtureEnrichment {
    name: String,
    behavior: FixtureLookup,
}

impl FixtureEnrichment {
    pub fn new(name: impl Into<String>, behavior: FixtureLookup) -> Self {
        Self {
            name: name.into(),
            behavior,
        }
    }
}

#[async_trait]
impl EnrichmentSource for FixtureEnrichment {
    fn name(&self) -> &str {
        &self.name
    }

    async fn lookup(&self, mapping: &MappingResult) -> EvaluatorResult<Vec<EnrichmentRecord>> {
        match &self.behavior {
            FixtureLookup::Records(records) => Ok(records
                .iter()
                .map(|r| {
                    let mut record = EnrichmentRecord::new(
                        mapping.run_id.clone(),
                        mapping.app_id.clone(),
                        self.name.clone(),
                    )
                    .with_url(r.url.clone())
                    .with_snippet(r.snippet.clone())
                    .with_confidence(r.confidence);
                    for (k, v) in &r.signals {
                        record = record.with_signal(k.clone(), *v);
                    }
                    record
                })
                .collect()),
            FixtureLookup::Fail => Err(EvaluatorError::TransientStage {
                step: StepName::Enrichment,
                message: format!("lookup source {} unreachable", self.name),
            }),
            FixtureLookup::Hang(duration) => {
                tokio::time::sleep(*duration).await;
                Ok(Vec::new())
            }
        }
    }
}

/// Interviewer returning a canned transcript and fields.
pub struct ScriptedInterviewer {
    pub transcript: String,
    pub extracted_fields: BTreeMap<String, f64>,
}

#[async_trait]
impl VoiceInterviewer for ScriptedInterviewer {
    async fn conduct(
        &self,
        submission: &Submission,
        _questions: &[String],
    ) -> EvaluatorResult<VoiceInterview> {
        Ok(VoiceInterview {
            run_id: String::new(), // filled in by the coordinator
            app_id: submission.app_id.clone(),
            transcript: self.transcript.clone(),
            extracted_fields: self.extracted_fields.clone(),
            call_duration_secs: 2_700,
            conducted_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FounderInfo;

    fn extraction(fields: ExtractedFields) -> ExtractionResult {
        ExtractionResult {
            run_id: "run-1".into(),
            app_id: "app-1".into(),
            extractor_version: "t".into(),
            fields,
            text_snippets: vec![],
            extracted_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn mapper_requires_company_name() {
        let err = CanonicalMapper
            .map(&extraction(ExtractedFields::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, EvaluatorError::Validation(_)));
    }

    #[tokio::test]
    async fn mapper_defaults_missing_founders() {
        let fields = ExtractedFields {
            company_name: Some("Acme".into()),
            ..Default::default()
        };
        let result = CanonicalMapper.map(&extraction(fields)).await.unwrap();
        assert_eq!(result.profile.founders.len(), 1);
        assert_eq!(result.profile.founders[0].founder_market_fit_score, 6.0);
        assert_eq!(result.metrics["founder_market_fit_score"], 6.0);
    }

    #[tokio::test]
    async fn mapper_scores_domain_matched_founder() {
        let fields = ExtractedFields {
            company_name: Some("Acme".into()),
            problem_statement: Some("Logistics waste in cold-chain shipping".into()),
            founders: vec![FounderInfo {
                name: "Dana".into(),
                background: "10y ops".into(),
                experience_years: Some(10),
                previous_exits: Some(1),
                domain_expertise: Some("logistics".into()),
                linkedin_url: None,
            }],
            ..Default::default()
        };
        let result = CanonicalMapper.map(&extraction(fields)).await.unwrap();
        // 5.0 + 0.3*10 + 2.0 = 10.0 capped
        assert_eq!(result.profile.founders[0].founder_market_fit_score, 10.0);
        assert_eq!(result.metrics["founder_experience_years"], 10.0);
    }

    #[tokio::test]
    async fn fixture_extractor_fails_then_recovers() {
        let extractor = FixtureExtractor::returning(ExtractedFields::default())
            .with_transient_failures(2);
        let submission = Submission::new("Acme", "user-1");
        assert!(extractor.extract(&submission).await.is_err());
        assert!(extractor.extract(&submission).await.is_err());
        assert!(extractor.extract(&submission).await.is_ok());
    }

    #[tokio::test]
    async fn template_renderer_rejects_empty_facts() {
        let request = SectionRenderRequest {
            company_name: "Acme",
            kind: crate::types::MemoSectionKind::Team,
            facts: &[],
            citations: &[],
        };
        let err = TemplateRenderer.render_section(request).await.unwrap_err();
        assert!(matches!(err, EvaluatorError::MemoRender(_)));
    }
}
