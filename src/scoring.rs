//! The weighted scoring engine.
//!
//! `score` is a deterministic pure function of the evidence store, the
//! catalog snapshot, and the investor preferences. No clock, no ambient
//! configuration, no randomness: re-running on identical inputs reproduces
//! an identical ScoreRun, including its content-hash id.
//!
//! Per category, each metric's input is normalized to [0,10] by its rule;
//! metrics whose input is absent are excluded and the remaining weights
//! renormalize to sum to 1 (never silently treated as zero). A category
//! with zero usable metrics is an `InsufficientEvidenceError`, surfaced to
//! the coordinator as a non-retriable Scoring failure.

use crate::catalog::{Category, MetricCatalog};
use crate::config::InvestorPreferences;
use crate::errors::{EvaluatorError, EvaluatorResult};
use crate::evidence::{EvidenceStore, ProvenancedInput};
use crate::types::{CategoryScore, EvidenceRef, ScoreRun};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

const WEIGHT_EPSILON: f64 = 1e-9;

pub struct ScoringEngine;

impl ScoringEngine {
    pub fn score(
        evidence: &EvidenceStore,
        catalog: &MetricCatalog,
        preferences: &InvestorPreferences,
    ) -> EvaluatorResult<ScoreRun> {
        let inputs = evidence.metric_inputs();
        let mapping = evidence.mapping();
        let mut warnings = Vec::new();

        let mut category_scores = Vec::with_capacity(Category::ALL.len());
        for category in Category::ALL {
            let (score, refs) = score_category(catalog, category, &inputs)?;
            category_scores.push(CategoryScore {
                category,
                score,
                weight: 0.0, // filled in below once weights are normalized
                evidence: refs,
            });
        }

        let (weights, renormalized_from) = normalize_investor_weights(preferences)?;
        if let Some(original_sum) = renormalized_from {
            warnings.push(format!(
                "investor weights renormalized from sum {original_sum:.4}"
            ));
        }

        let mut overall = 0.0;
        for cs in &mut category_scores {
            let weight = weights[&cs.category];
            cs.weight = weight;
            overall += cs.score * weight;
        }
        let overall = (overall * 100.0).round() / 100.0;
        let overall = overall.clamp(0.0, 10.0);

        let reduced_confidence = evidence.is_partial();
        if reduced_confidence {
            warnings.push("scoring proceeded on a partial enrichment fan-in".to_string());
        }

        let confidence = confidence_estimate(evidence, catalog, &inputs);
        let risk_flags = collect_risk_flags(&inputs);
        let requires_voice_interview =
            needs_interview(catalog, overall, &category_scores, confidence);

        let investor_weights: BTreeMap<String, f64> = weights
            .iter()
            .map(|(category, w)| (category.as_str().to_string(), *w))
            .collect();

        let decision = catalog.decide(overall);
        let score_id = content_hash_id(
            &mapping.run_id,
            &catalog.version,
            &category_scores,
            overall,
            &investor_weights,
        )?;

        Ok(ScoreRun {
            score_id,
            run_id: mapping.run_id.clone(),
            app_id: mapping.app_id.clone(),
            category_scores,
            overall_score: overall,
            decision,
            investor_weights,
            confidence,
            reduced_confidence,
            risk_flags,
            requires_voice_interview,
            warnings,
            catalog_version: catalog.version.clone(),
        })
    }
}

/// Weighted average of a category's usable metrics. Dividing by the sum of
/// present weights is exactly the renormalization the contract requires:
/// with weights .6/.4 and the .4 metric missing, the survivor carries 1.0.
fn score_category(
    catalog: &MetricCatalog,
    category: Category,
    inputs: &BTreeMap<String, ProvenancedInput>,
) -> EvaluatorResult<(f64, Vec<EvidenceRef>)> {
    let mut weighted_sum = 0.0;
    let mut weight_sum = 0.0;
    let mut refs = Vec::new();

    for metric in catalog.metrics_for(category) {
        let Some(input) = inputs.get(&metric.input) else {
            continue;
        };
        let normalized = metric.rule.normalize(input.value);
        weighted_sum += normalized * metric.weight;
        weight_sum += metric.weight;
        refs.push(EvidenceRef {
            metric_id: metric.id.clone(),
            value: normalized,
            source: input.source.clone(),
        });
    }

    if weight_sum < WEIGHT_EPSILON {
        return Err(EvaluatorError::InsufficientEvidence(format!(
            "category {category} has zero usable metrics"
        )));
    }

    let score = (weighted_sum / weight_sum).clamp(0.0, 10.0);
    Ok((score, refs))
}

/// Category weights from the preferences, renormalized to sum to 1. Returns
/// the original sum when renormalization was needed so the caller can record
/// the warning.
fn normalize_investor_weights(
    preferences: &InvestorPreferences,
) -> EvaluatorResult<(BTreeMap<Category, f64>, Option<f64>)> {
    let raw: BTreeMap<Category, f64> = Category::ALL
        .iter()
        .map(|c| (*c, preferences.category_weight(*c)))
        .collect();
    let sum: f64 = raw.values().sum();
    if sum < WEIGHT_EPSILON {
        return Err(EvaluatorError::Validation(
            "investor category weights sum to zero".to_string(),
        ));
    }
    if (sum - 1.0).abs() < WEIGHT_EPSILON {
        return Ok((raw, None));
    }
    let normalized = raw.into_iter().map(|(c, w)| (c, w / sum)).collect();
    Ok((normalized, Some(sum)))
}

/// Confidence in the scoring itself: 0.6 weight on the mean confidence of
/// the enrichment records, 0.4 on metric-input completeness against the
/// catalog.
fn confidence_estimate(
    evidence: &EvidenceStore,
    catalog: &MetricCatalog,
    inputs: &BTreeMap<String, ProvenancedInput>,
) -> f64 {
    let completeness = if catalog.len() == 0 {
        0.0
    } else {
        let usable = Category::ALL
            .iter()
            .flat_map(|c| catalog.metrics_for(*c))
            .filter(|m| inputs.contains_key(&m.input))
            .count();
        usable as f64 / catalog.len() as f64
    };
    (evidence.verification_confidence() * 0.6 + completeness * 0.4).clamp(0.0, 1.0)
}

fn collect_risk_flags(inputs: &BTreeMap<String, ProvenancedInput>) -> Vec<String> {
    let value = |key: &str| inputs.get(key).map(|p| p.value);
    let mut flags = Vec::new();

    if value("reputation_risk_score").is_some_and(|v| v > 6.0) {
        flags.push("reputation_concerns".to_string());
    }
    if value("financial_risk_score").is_some_and(|v| v > 7.0) {
        flags.push("financial_instability".to_string());
    }
    if value("market_risk_score").is_some_and(|v| v > 7.0) {
        flags.push("market_uncertainty".to_string());
    }
    if value("execution_risk_score").is_some_and(|v| v > 7.0) {
        flags.push("execution_challenges".to_string());
    }
    if value("market_size_verified").is_some_and(|v| v < 0.5) {
        flags.push("inflated_market_claims".to_string());
    }
    if value("revenue_verified").is_some_and(|v| v < 0.5) {
        flags.push("unverified_revenue".to_string());
    }

    flags
}

/// An interview is worth scheduling when the overall score sits in the hold
/// band, the category scores disagree sharply, or verification is weak.
fn needs_interview(
    catalog: &MetricCatalog,
    overall: f64,
    category_scores: &[CategoryScore],
    confidence: f64,
) -> bool {
    if overall >= catalog.thresholds.hold && overall < catalog.thresholds.buy {
        return true;
    }
    let mut min = f64::MAX;
    let mut max = f64::MIN;
    for cs in category_scores {
        min = min.min(cs.score);
        max = max.max(cs.score);
    }
    if max - min > 4.0 {
        return true;
    }
    confidence < 0.6
}

fn content_hash_id(
    run_id: &str,
    catalog_version: &str,
    category_scores: &[CategoryScore],
    overall: f64,
    weights: &BTreeMap<String, f64>,
) -> EvaluatorResult<String> {
    let mut hasher = Sha256::new();
    hasher.update(run_id.as_bytes());
    hasher.update(catalog_version.as_bytes());
    hasher.update(serde_json::to_vec(category_scores)?);
    hasher.update(overall.to_bits().to_be_bytes());
    hasher.update(serde_json::to_vec(weights)?);
    let digest = hasher.finalize();
    Ok(format!("score-{:x}", digest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{MetricDefinition, MetricRule};
    use crate::types::{Decision, MappingResult, MarketSummary, StartupProfile};
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn mapping(metrics: &[(&str, f64)]) -> MappingResult {
        MappingResult {
            run_id: "run-1".into(),
            app_id: "app-1".into(),
            profile: StartupProfile {
                company_name: "Acme".into(),
                founders: vec![],
                problem_statement: "p".into(),
                solution: "s".into(),
                unique_differentiator: "d".into(),
                market: MarketSummary {
                    market_size: 1e9,
                    growth_rate: 0.1,
                    competition_level: "medium".into(),
                },
                funding_stage: "Seed".into(),
                funding_amount: None,
            },
            metrics: metrics.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            mapped_at: Utc::now(),
        }
    }

    /// One Scale10 metric per category so category scores equal the inputs.
    fn flat_catalog() -> MetricCatalog {
        let mut catalog = MetricCatalog::empty("test-v1");
        for (id, category) in [
            ("founder", Category::FounderProfile),
            ("market", Category::ProblemMarket),
            ("diff", Category::Differentiator),
            ("traction", Category::TeamTraction),
        ] {
            catalog = catalog.with_metric(MetricDefinition {
                id: id.to_string(),
                category,
                input: format!("{id}_input"),
                rule: MetricRule::Scale10,
                weight: 1.0,
            });
        }
        catalog
    }

    fn scenario_a_evidence() -> EvidenceStore {
        EvidenceStore::new(
            mapping(&[
                ("founder_input", 8.2),
                ("market_input", 7.0),
                ("diff_input", 6.0),
                ("traction_input", 9.0),
            ]),
            0.6,
        )
    }

    fn scenario_a_prefs() -> InvestorPreferences {
        InvestorPreferences {
            founder_weight: 0.3,
            market_weight: 0.25,
            differentiation_weight: 0.2,
            traction_weight: 0.25,
            ..InvestorPreferences::default()
        }
    }

    #[test]
    fn scenario_a_weighted_sum_and_decision() {
        let score = ScoringEngine::score(
            &scenario_a_evidence(),
            &flat_catalog(),
            &scenario_a_prefs(),
        )
        .unwrap();
        // 8.2*.3 + 7.0*.25 + 6.0*.2 + 9.0*.25 = 7.66
        assert_eq!(score.overall_score, 7.66);
        assert_eq!(score.decision, Decision::Buy);
        assert!(score.warnings.is_empty());
    }

    #[test]
    fn scoring_is_idempotent() {
        let evidence = scenario_a_evidence();
        let catalog = flat_catalog();
        let prefs = scenario_a_prefs();
        let first = ScoringEngine::score(&evidence, &catalog, &prefs).unwrap();
        let second = ScoringEngine::score(&evidence, &catalog, &prefs).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn missing_metric_renormalizes_remaining_weights() {
        let catalog = MetricCatalog::empty("test-v1")
            .with_metric(MetricDefinition {
                id: "present".into(),
                category: Category::FounderProfile,
                input: "present_input".into(),
                rule: MetricRule::Scale10,
                weight: 0.6,
            })
            .with_metric(MetricDefinition {
                id: "absent".into(),
                category: Category::FounderProfile,
                input: "absent_input".into(),
                rule: MetricRule::Scale10,
                weight: 0.4,
            });
        let inputs = EvidenceStore::new(mapping(&[("present_input", 8.0)]), 0.6).metric_inputs();
        let (score, refs) = score_category(&catalog, Category::FounderProfile, &inputs).unwrap();
        // the surviving metric carries full weight 1.0, so the category
        // score equals its normalized value, not 0.6 * 8.0
        assert_eq!(score, 8.0);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].metric_id, "present");
    }

    #[test]
    fn empty_category_is_insufficient_evidence() {
        let err = ScoringEngine::score(
            &EvidenceStore::new(mapping(&[("founder_input", 8.0)]), 0.6),
            &flat_catalog(),
            &InvestorPreferences::default(),
        )
        .unwrap_err();
        assert!(matches!(err, EvaluatorError::InsufficientEvidence(_)));
        assert!(!err.is_retriable());
    }

    #[test]
    fn unbalanced_investor_weights_renormalize_with_warning() {
        let prefs = InvestorPreferences {
            founder_weight: 0.5,
            market_weight: 0.5,
            differentiation_weight: 0.5,
            traction_weight: 0.5,
            ..InvestorPreferences::default()
        };
        let score =
            ScoringEngine::score(&scenario_a_evidence(), &flat_catalog(), &prefs).unwrap();
        let weight_sum: f64 = score.investor_weights.values().sum();
        assert!((weight_sum - 1.0).abs() < 1e-9);
        assert!(score
            .warnings
            .iter()
            .any(|w| w.contains("renormalized")));
        // equal weights after renormalization: plain average of the inputs
        assert_eq!(score.overall_score, 7.55);
    }

    #[test]
    fn partial_enrichment_sets_reduced_confidence() {
        let mut evidence = scenario_a_evidence();
        evidence.mark_partial();
        let score =
            ScoringEngine::score(&evidence, &flat_catalog(), &scenario_a_prefs()).unwrap();
        assert!(score.reduced_confidence);
    }

    #[test]
    fn risk_flags_from_inputs() {
        let mut metrics = vec![
            ("founder_input", 8.0),
            ("market_input", 8.0),
            ("diff_input", 8.0),
            ("traction_input", 8.0),
        ];
        metrics.push(("reputation_risk_score", 7.5));
        metrics.push(("market_size_verified", 0.0));
        let evidence = EvidenceStore::new(mapping(&metrics), 0.6);
        let score =
            ScoringEngine::score(&evidence, &flat_catalog(), &InvestorPreferences::default())
                .unwrap();
        assert_eq!(
            score.risk_flags,
            vec!["reputation_concerns", "inflated_market_claims"]
        );
    }

    #[test]
    fn hold_band_requests_interview() {
        let evidence = EvidenceStore::new(
            mapping(&[
                ("founder_input", 6.0),
                ("market_input", 6.0),
                ("diff_input", 6.0),
                ("traction_input", 6.0),
            ]),
            0.6,
        );
        let score =
            ScoringEngine::score(&evidence, &flat_catalog(), &InvestorPreferences::default())
                .unwrap();
        assert_eq!(score.decision, Decision::Hold);
        assert!(score.requires_voice_interview);
    }
}
