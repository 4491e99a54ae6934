//! Memo assembly.
//!
//! The assembler owns the structural contract of the investment memo: which
//! sections exist, in what order, which facts each must carry, and which
//! evidence citations back them. Prose is delegated to the `MemoRenderer`
//! collaborator; a renderer returning empty content for any required
//! section is a `MemoRenderError`, retried by the coordinator under the
//! MemoGeneration step policy.

use crate::catalog::Category;
use crate::errors::{EvaluatorError, EvaluatorResult};
use crate::evidence::EvidenceStore;
use crate::stages::{MemoRenderer, SectionRenderRequest};
use crate::types::{
    EvidenceRef, EvidenceSource, Memo, MemoSection, MemoSectionKind, ScoreRun, VoiceInterview,
};
use chrono::Utc;
use std::sync::Arc;

/// Required sections, in rendering order.
const SECTION_ORDER: [MemoSectionKind; 7] = [
    MemoSectionKind::ExecutiveSummary,
    MemoSectionKind::Team,
    MemoSectionKind::Market,
    MemoSectionKind::Differentiation,
    MemoSectionKind::Traction,
    MemoSectionKind::Risks,
    MemoSectionKind::Recommendation,
];

pub struct MemoAssembler {
    renderer: Arc<dyn MemoRenderer>,
}

impl MemoAssembler {
    pub fn new(renderer: Arc<dyn MemoRenderer>) -> Self {
        Self { renderer }
    }

    pub async fn assemble(
        &self,
        score: &ScoreRun,
        evidence: &EvidenceStore,
    ) -> EvaluatorResult<Memo> {
        let company = evidence.mapping().profile.company_name.clone();
        let mut sections = Vec::with_capacity(SECTION_ORDER.len());

        for kind in SECTION_ORDER {
            let (facts, citations) = section_content(kind, score, evidence);
            let prose = self
                .renderer
                .render_section(SectionRenderRequest {
                    company_name: &company,
                    kind,
                    facts: &facts,
                    citations: &citations,
                })
                .await?;
            if prose.trim().is_empty() {
                return Err(EvaluatorError::MemoRender(format!(
                    "renderer returned empty prose for section {}",
                    kind.title()
                )));
            }
            sections.push(MemoSection {
                kind,
                title: kind.title().to_string(),
                facts,
                citations,
                prose,
            });
        }

        let executive_summary = sections[0].prose.clone();
        let final_recommendation = format!(
            "{} - overall score {:.2}/10 (confidence {:.2})",
            score.decision, score.overall_score, score.confidence
        );

        let mut memo = Memo {
            run_id: score.run_id.clone(),
            app_id: score.app_id.clone(),
            executive_summary,
            sections,
            final_recommendation,
            rendered_artifact: None,
            assembled_at: Utc::now(),
        };
        let artifact = self.renderer.render_artifact(&memo).await?;
        if artifact.trim().is_empty() {
            return Err(EvaluatorError::MemoRender(
                "renderer returned an empty artifact".to_string(),
            ));
        }
        memo.rendered_artifact = Some(artifact);
        Ok(memo)
    }

    /// Append interview findings post hoc. Pure merge: scoring is not
    /// re-run, and an existing findings section is replaced rather than
    /// duplicated.
    pub fn merge_interview(&self, memo: &mut Memo, interview: &VoiceInterview) {
        memo.sections
            .retain(|s| s.kind != MemoSectionKind::InterviewFindings);

        let mut facts = vec![format!(
            "Founder interview conducted ({} min)",
            interview.call_duration_secs / 60
        )];
        for (field, value) in &interview.extracted_fields {
            facts.push(format!("Interview clarified {field} = {value:.1}"));
        }

        let prose = facts.join(". ");
        memo.sections.push(MemoSection {
            kind: MemoSectionKind::InterviewFindings,
            title: MemoSectionKind::InterviewFindings.title().to_string(),
            facts,
            citations: Vec::new(),
            prose,
        });
    }
}

fn category_for_section(kind: MemoSectionKind) -> Option<Category> {
    match kind {
        MemoSectionKind::Team => Some(Category::FounderProfile),
        MemoSectionKind::Market => Some(Category::ProblemMarket),
        MemoSectionKind::Differentiation => Some(Category::Differentiator),
        MemoSectionKind::Traction => Some(Category::TeamTraction),
        _ => None,
    }
}

/// Structured facts and citations for one section. Deterministic: facts
/// derive from the score and profile, citations from the category's scored
/// evidence plus the top-confidence enrichment records for that category.
fn section_content(
    kind: MemoSectionKind,
    score: &ScoreRun,
    evidence: &EvidenceStore,
) -> (Vec<String>, Vec<EvidenceRef>) {
    let profile = &evidence.mapping().profile;

    if let Some(category) = category_for_section(kind) {
        let category_score = score
            .category_scores
            .iter()
            .find(|cs| cs.category == category);
        let mut facts = Vec::new();
        let mut citations = Vec::new();
        if let Some(cs) = category_score {
            facts.push(format!(
                "{} scored {:.2}/10 at weight {:.2}",
                category, cs.score, cs.weight
            ));
            citations.extend(cs.evidence.iter().cloned());
        }
        match kind {
            MemoSectionKind::Team => {
                for founder in &profile.founders {
                    facts.push(format!(
                        "{} ({}, {}y experience, fit {:.1}/10)",
                        founder.name,
                        founder.domain_expertise,
                        founder.experience_years,
                        founder.founder_market_fit_score
                    ));
                }
            }
            MemoSectionKind::Market => {
                facts.push(format!("Problem: {}", profile.problem_statement));
                if profile.market.market_size > 0.0 {
                    facts.push(format!(
                        "Addressable market ${:.1}B growing {:.0}% annually",
                        profile.market.market_size / 1e9,
                        profile.market.growth_rate * 100.0
                    ));
                }
                facts.push(format!(
                    "Competition level: {}",
                    profile.market.competition_level
                ));
            }
            MemoSectionKind::Differentiation => {
                facts.push(profile.unique_differentiator.clone());
            }
            MemoSectionKind::Traction => {
                facts.push(format!("Funding stage: {}", profile.funding_stage));
            }
            _ => {}
        }
        // Highest-confidence external evidence for the category, capped so
        // sections stay reviewable.
        for record in evidence.records_for(category).into_iter().take(3) {
            citations.push(EvidenceRef {
                metric_id: format!("{}:{}", record.source, record.record_id),
                value: record.confidence,
                source: EvidenceSource::Enrichment {
                    record_id: record.record_id.clone(),
                    url: record.url.clone(),
                },
            });
        }
        return (facts, citations);
    }

    match kind {
        MemoSectionKind::ExecutiveSummary => {
            let facts = vec![
                format!("{} evaluated end-to-end", profile.company_name),
                format!("Overall score {:.2}/10", score.overall_score),
                format!("Decision: {}", score.decision),
                format!("Scoring confidence {:.2}", score.confidence),
            ];
            (facts, Vec::new())
        }
        MemoSectionKind::Risks => {
            let mut facts: Vec<String> = score
                .risk_flags
                .iter()
                .map(|flag| format!("Risk flag: {flag}"))
                .collect();
            if score.reduced_confidence {
                facts.push(
                    "Enrichment coverage was partial; scores carry reduced confidence".to_string(),
                );
            }
            if facts.is_empty() {
                facts.push("No material risk flags identified".to_string());
            }
            (facts, Vec::new())
        }
        MemoSectionKind::Recommendation => {
            let mut facts = vec![format!(
                "{} at overall score {:.2}/10",
                score.decision, score.overall_score
            )];
            for (category, weight) in &score.investor_weights {
                facts.push(format!("{category} weighted {weight:.2}"));
            }
            if score.requires_voice_interview {
                facts.push("Founder interview recommended before committing".to_string());
            }
            (facts, Vec::new())
        }
        // Handled by the category arm or merge_interview.
        _ => (Vec::new(), Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InvestorPreferences;
    use crate::scoring::ScoringEngine;
    use crate::stages::builtin::TemplateRenderer;
    use crate::types::{MappingResult, MarketSummary, StartupProfile};
    use crate::MetricCatalog;
    use chrono::Utc;

    fn evidence() -> EvidenceStore {
        let metrics: Vec<(&str, f64)> = vec![
            ("founder_market_fit_score", 8.0),
            ("founder_experience_years", 9.0),
            ("total_addressable_market", 5e9),
            ("market_growth_rate", 0.15),
            ("technology_novelty_score", 7.0),
            ("annual_recurring_revenue", 1.5e6),
            ("team_size", 22.0),
        ];
        EvidenceStore::new(
            MappingResult {
                run_id: "run-1".into(),
                app_id: "app-1".into(),
                profile: StartupProfile {
                    company_name: "CloudTech AI".into(),
                    founders: vec![],
                    problem_statement: "Cloud cost waste".into(),
                    solution: "Optimization platform".into(),
                    unique_differentiator: "AI-driven rightsizing".into(),
                    market: MarketSummary {
                        market_size: 8e9,
                        growth_rate: 0.15,
                        competition_level: "medium".into(),
                    },
                    funding_stage: "Series A".into(),
                    funding_amount: Some(5e6),
                },
                metrics: metrics.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
                mapped_at: Utc::now(),
            },
            0.6,
        )
    }

    #[tokio::test]
    async fn assembles_sections_in_fixed_order() {
        let evidence = evidence();
        let score = ScoringEngine::score(
            &evidence,
            &MetricCatalog::default(),
            &InvestorPreferences::default(),
        )
        .unwrap();
        let assembler = MemoAssembler::new(Arc::new(TemplateRenderer));
        let memo = assembler.assemble(&score, &evidence).await.unwrap();

        let kinds: Vec<MemoSectionKind> = memo.sections.iter().map(|s| s.kind).collect();
        assert_eq!(kinds, SECTION_ORDER.to_vec());
        assert!(!memo.executive_summary.is_empty());
        assert!(memo.rendered_artifact.is_some());
        assert!(memo
            .final_recommendation
            .contains(&format!("{}", score.decision)));
    }

    #[tokio::test]
    async fn merge_interview_appends_once() {
        let evidence = evidence();
        let score = ScoringEngine::score(
            &evidence,
            &MetricCatalog::default(),
            &InvestorPreferences::default(),
        )
        .unwrap();
        let assembler = MemoAssembler::new(Arc::new(TemplateRenderer));
        let mut memo = assembler.assemble(&score, &evidence).await.unwrap();

        let interview = VoiceInterview {
            run_id: "run-1".into(),
            app_id: "app-1".into(),
            transcript: "Q/A".into(),
            extracted_fields: [("market_validation".to_string(), 8.0)].into(),
            call_duration_secs: 2700,
            conducted_at: Utc::now(),
        };
        assembler.merge_interview(&mut memo, &interview);
        assembler.merge_interview(&mut memo, &interview);

        let findings: Vec<&MemoSection> = memo
            .sections
            .iter()
            .filter(|s| s.kind == MemoSectionKind::InterviewFindings)
            .collect();
        assert_eq!(findings.len(), 1);
        assert!(findings[0].prose.contains("market_validation"));
    }
}
