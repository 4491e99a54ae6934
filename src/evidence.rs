//! Run-scoped evidence aggregation feeding the scoring engine.
//!
//! Responsibilities:
//! - Hold the mapping result and every enrichment record that arrived
//!   before the fan-in barrier closed.
//! - Merge qualifying enrichment signals into the metric input space with
//!   deterministic conflict resolution.
//! - Track provenance so every scored value can cite its source.

use crate::catalog::Category;
use crate::types::{EnrichmentRecord, EvidenceSource, MappingResult};
use std::collections::BTreeMap;

/// A metric input value together with where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ProvenancedInput {
    pub value: f64,
    pub source: EvidenceSource,
}

/// Aggregated evidence for one run.
#[derive(Debug, Clone)]
pub struct EvidenceStore {
    mapping: MappingResult,
    records: Vec<EnrichmentRecord>,
    /// Clarified fields from a founder interview. Highest priority: they
    /// answer exactly the questions the other evidence left open.
    interview_overrides: BTreeMap<String, f64>,
    /// Set when the enrichment barrier closed with lookups missing.
    partial: bool,
    /// Confidence floor below which a record's signals are ignored.
    min_signal_confidence: f64,
}

impl EvidenceStore {
    pub fn new(mapping: MappingResult, min_signal_confidence: f64) -> Self {
        Self {
            mapping,
            records: Vec::new(),
            interview_overrides: BTreeMap::new(),
            partial: false,
            min_signal_confidence,
        }
    }

    pub fn append(&mut self, record: EnrichmentRecord) {
        self.records.push(record);
    }

    pub fn extend(&mut self, records: impl IntoIterator<Item = EnrichmentRecord>) {
        self.records.extend(records);
    }

    /// Apply an interview clarification on top of all other evidence.
    pub fn override_from_interview(&mut self, field: impl Into<String>, value: f64) {
        self.interview_overrides.insert(field.into(), value);
    }

    pub fn mark_partial(&mut self) {
        self.partial = true;
    }

    pub fn is_partial(&self) -> bool {
        self.partial
    }

    pub fn mapping(&self) -> &MappingResult {
        &self.mapping
    }

    pub fn records(&self) -> &[EnrichmentRecord] {
        &self.records
    }

    /// Enrichment records sorted by confidence descending, record id
    /// ascending. The stable order makes memo citations reproducible.
    pub fn records_by_confidence(&self) -> Vec<&EnrichmentRecord> {
        let mut sorted: Vec<&EnrichmentRecord> = self.records.iter().collect();
        sorted.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| a.record_id.cmp(&b.record_id))
        });
        sorted
    }

    /// Records relevant to a category, by source affinity.
    pub fn records_for(&self, category: Category) -> Vec<&EnrichmentRecord> {
        self.records_by_confidence()
            .into_iter()
            .filter(|r| source_matches_category(&r.source, category))
            .collect()
    }

    /// The metric input space: mapping-derived inputs overlaid with
    /// enrichment signals whose confidence clears the floor. External
    /// verification beats self-reported data, so a qualifying signal
    /// overrides the mapped value for the same key. Between records,
    /// highest confidence wins; ties break on record id.
    pub fn metric_inputs(&self) -> BTreeMap<String, ProvenancedInput> {
        let mut inputs: BTreeMap<String, ProvenancedInput> = self
            .mapping
            .metrics
            .iter()
            .map(|(key, value)| {
                (
                    key.clone(),
                    ProvenancedInput {
                        value: *value,
                        source: EvidenceSource::Mapping { input: key.clone() },
                    },
                )
            })
            .collect();

        for record in self.records_by_confidence() {
            if record.confidence < self.min_signal_confidence {
                continue;
            }
            for (key, value) in &record.signals {
                // records_by_confidence order means the first writer for a
                // key is the most confident one
                let taken = matches!(
                    inputs.get(key),
                    Some(ProvenancedInput {
                        source: EvidenceSource::Enrichment { .. },
                        ..
                    })
                );
                if !taken {
                    inputs.insert(
                        key.clone(),
                        ProvenancedInput {
                            value: *value,
                            source: EvidenceSource::Enrichment {
                                record_id: record.record_id.clone(),
                                url: record.url.clone(),
                            },
                        },
                    );
                }
            }
        }

        for (field, value) in &self.interview_overrides {
            inputs.insert(
                field.clone(),
                ProvenancedInput {
                    value: *value,
                    source: EvidenceSource::Interview {
                        field: field.clone(),
                    },
                },
            );
        }

        inputs
    }

    /// Mean confidence of the enrichment records, 0.5 when none arrived.
    /// Feeds the scoring confidence estimate.
    pub fn verification_confidence(&self) -> f64 {
        if self.records.is_empty() {
            return 0.5;
        }
        let sum: f64 = self.records.iter().map(|r| r.confidence).sum();
        sum / self.records.len() as f64
    }
}

fn source_matches_category(source: &str, category: Category) -> bool {
    match category {
        Category::FounderProfile => source == "founder_profiles",
        Category::ProblemMarket => source == "market_data" || source == "news",
        Category::Differentiator => source == "competitors",
        Category::TeamTraction => source == "news" || source == "founder_profiles",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StartupProfile;
    use chrono::Utc;

    fn mapping_with(metrics: &[(&str, f64)]) -> MappingResult {
        MappingResult {
            run_id: "run-1".into(),
            app_id: "app-1".into(),
            profile: StartupProfile {
                company_name: "Acme".into(),
                founders: vec![],
                problem_statement: "p".into(),
                solution: "s".into(),
                unique_differentiator: "d".into(),
                market: crate::types::MarketSummary {
                    market_size: 1e9,
                    growth_rate: 0.1,
                    competition_level: "medium".into(),
                },
                funding_stage: "Seed".into(),
                funding_amount: None,
            },
            metrics: metrics
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
            mapped_at: Utc::now(),
        }
    }

    fn record(id: &str, confidence: f64, signals: &[(&str, f64)]) -> EnrichmentRecord {
        let mut r = EnrichmentRecord::new("run-1", "app-1", "market_data")
            .with_confidence(confidence)
            .with_url("https://example.com");
        r.record_id = id.to_string();
        for (k, v) in signals {
            r = r.with_signal(*k, *v);
        }
        r
    }

    #[test]
    fn qualifying_signal_overrides_mapping_value() {
        let mut store = EvidenceStore::new(mapping_with(&[("market_growth_rate", 0.10)]), 0.6);
        store.append(record("enr-a", 0.9, &[("market_growth_rate", 0.15)]));
        let inputs = store.metric_inputs();
        assert_eq!(inputs["market_growth_rate"].value, 0.15);
        assert!(matches!(
            inputs["market_growth_rate"].source,
            EvidenceSource::Enrichment { .. }
        ));
    }

    #[test]
    fn sub_floor_signal_is_ignored() {
        let mut store = EvidenceStore::new(mapping_with(&[("market_growth_rate", 0.10)]), 0.6);
        store.append(record("enr-a", 0.4, &[("market_growth_rate", 0.9)]));
        let inputs = store.metric_inputs();
        assert_eq!(inputs["market_growth_rate"].value, 0.10);
        assert!(matches!(
            inputs["market_growth_rate"].source,
            EvidenceSource::Mapping { .. }
        ));
    }

    #[test]
    fn conflicting_signals_resolve_by_confidence_then_id() {
        let mut store = EvidenceStore::new(mapping_with(&[]), 0.6);
        store.append(record("enr-b", 0.8, &[("total_addressable_market", 2e9)]));
        store.append(record("enr-a", 0.9, &[("total_addressable_market", 5e9)]));
        assert_eq!(
            store.metric_inputs()["total_addressable_market"].value,
            5e9
        );

        let mut tied = EvidenceStore::new(mapping_with(&[]), 0.6);
        tied.append(record("enr-b", 0.8, &[("team_size", 20.0)]));
        tied.append(record("enr-a", 0.8, &[("team_size", 30.0)]));
        // same confidence: lower record id wins
        assert_eq!(tied.metric_inputs()["team_size"].value, 30.0);
    }

    #[test]
    fn verification_confidence_defaults_without_records() {
        let store = EvidenceStore::new(mapping_with(&[]), 0.6);
        assert_eq!(store.verification_confidence(), 0.5);
    }

    #[test]
    fn interview_override_beats_enrichment_and_mapping() {
        let mut store = EvidenceStore::new(mapping_with(&[("problem_market_validation", 5.0)]), 0.6);
        store.append(record("enr-a", 0.9, &[("problem_market_validation", 7.0)]));
        store.override_from_interview("problem_market_validation", 9.0);
        let inputs = store.metric_inputs();
        assert_eq!(inputs["problem_market_validation"].value, 9.0);
        assert!(matches!(
            inputs["problem_market_validation"].source,
            EvidenceSource::Interview { .. }
        ));
    }
}
