//! Metric catalog: the read-only registry of scoring metrics.
//!
//! A catalog is shared across runs and snapshotted at the start of each
//! Scoring step; weight updates only affect runs started afterwards. The
//! registry is insertion-ordered so evidence listings come out in a stable,
//! reviewable order.

use crate::types::Decision;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// The four scoring buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    FounderProfile,
    ProblemMarket,
    Differentiator,
    TeamTraction,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::FounderProfile,
        Category::ProblemMarket,
        Category::Differentiator,
        Category::TeamTraction,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::FounderProfile => "founder_profile",
            Category::ProblemMarket => "problem_market",
            Category::Differentiator => "differentiator",
            Category::TeamTraction => "team_traction",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a raw metric input is normalized into [0,10].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MetricRule {
    /// Input is already on a 0..10 scale; clamp only.
    Scale10,
    /// `value * per_unit`, capped at 10. Covers linear conversions such as
    /// TAM per $1B, ARR per $1M, growth-rate percentage points.
    PerUnit { per_unit: f64 },
    /// `10 - value * factor`, clamped. Higher raw value scores lower
    /// (competitive intensity).
    Inverted { factor: f64 },
    /// Truthy input (>= 0.5) scores `if_true`, otherwise `if_false`.
    Boolean { if_true: f64, if_false: f64 },
    /// Step function at `cutoff`.
    Threshold { cutoff: f64, above: f64, below: f64 },
}

impl MetricRule {
    /// Normalize a raw input into [0,10]. Deterministic and total.
    pub fn normalize(&self, value: f64) -> f64 {
        let scored = match self {
            MetricRule::Scale10 => value,
            MetricRule::PerUnit { per_unit } => value * per_unit,
            MetricRule::Inverted { factor } => 10.0 - value * factor,
            MetricRule::Boolean { if_true, if_false } => {
                if value >= 0.5 {
                    *if_true
                } else {
                    *if_false
                }
            }
            MetricRule::Threshold {
                cutoff,
                above,
                below,
            } => {
                if value >= *cutoff {
                    *above
                } else {
                    *below
                }
            }
        };
        scored.clamp(0.0, 10.0)
    }
}

/// One scoring metric: which input it reads, how it normalizes, and its
/// default weight within its category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDefinition {
    pub id: String,
    pub category: Category,
    /// Key into the metric input space produced by mapping + enrichment.
    pub input: String,
    pub rule: MetricRule,
    pub weight: f64,
}

/// Overall-score bands for the decision mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionThresholds {
    pub buy: f64,
    pub hold: f64,
}

impl Default for DecisionThresholds {
    fn default() -> Self {
        Self {
            buy: 7.0,
            hold: 4.0,
        }
    }
}

/// The active metric registry plus decision configuration.
#[derive(Debug, Clone)]
pub struct MetricCatalog {
    pub version: String,
    metrics: IndexMap<String, MetricDefinition>,
    pub thresholds: DecisionThresholds,
    /// Enrichment signals below this confidence contribute citations but
    /// never feed the metric input space.
    pub min_signal_confidence: f64,
}

impl MetricCatalog {
    pub fn empty(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            metrics: IndexMap::new(),
            thresholds: DecisionThresholds::default(),
            min_signal_confidence: 0.6,
        }
    }

    pub fn with_metric(mut self, metric: MetricDefinition) -> Self {
        self.metrics.insert(metric.id.clone(), metric);
        self
    }

    pub fn with_thresholds(mut self, thresholds: DecisionThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn metric(&self, id: &str) -> Option<&MetricDefinition> {
        self.metrics.get(id)
    }

    /// Metrics for a category in registry order.
    pub fn metrics_for(&self, category: Category) -> impl Iterator<Item = &MetricDefinition> {
        self.metrics.values().filter(move |m| m.category == category)
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    pub fn decide(&self, overall_score: f64) -> Decision {
        if overall_score >= self.thresholds.buy {
            Decision::Buy
        } else if overall_score >= self.thresholds.hold {
            Decision::Hold
        } else {
            Decision::Pass
        }
    }
}

impl Default for MetricCatalog {
    /// The stock catalog. Intra-category weights follow the production
    /// curation rules: founder fit .3 / experience .2 / domain .2 /
    /// leadership .15 / commitment .1 / verification .05, and the matching
    /// tables for market, differentiator, and traction.
    fn default() -> Self {
        let mut catalog = Self::empty("curation-rules-v1");

        let founder: [(&str, &str, MetricRule, f64); 6] = [
            (
                "founder_market_fit",
                "founder_market_fit_score",
                MetricRule::Scale10,
                0.30,
            ),
            (
                "founder_experience",
                "founder_experience_years",
                MetricRule::PerUnit { per_unit: 1.0 },
                0.20,
            ),
            (
                "founder_domain_expertise",
                "founder_domain_expertise",
                MetricRule::Scale10,
                0.20,
            ),
            (
                "founder_leadership",
                "leadership_experience",
                MetricRule::Scale10,
                0.15,
            ),
            (
                "founder_commitment",
                "full_time_commitment",
                MetricRule::Boolean {
                    if_true: 10.0,
                    if_false: 5.0,
                },
                0.10,
            ),
            (
                "founder_verification",
                "founder_verification_score",
                MetricRule::Scale10,
                0.05,
            ),
        ];
        let market: [(&str, &str, MetricRule, f64); 6] = [
            (
                "market_size",
                "total_addressable_market",
                MetricRule::PerUnit { per_unit: 1e-9 },
                0.25,
            ),
            (
                "market_growth",
                "market_growth_rate",
                MetricRule::PerUnit { per_unit: 50.0 },
                0.20,
            ),
            (
                "problem_urgency",
                "problem_urgency_score",
                MetricRule::Scale10,
                0.15,
            ),
            (
                "market_validation",
                "problem_market_validation",
                MetricRule::Scale10,
                0.15,
            ),
            (
                "competitive_pressure",
                "competitive_intensity",
                MetricRule::Inverted { factor: 0.5 },
                0.15,
            ),
            (
                "market_timing",
                "market_timing_score",
                MetricRule::Scale10,
                0.10,
            ),
        ];
        let differentiator: [(&str, &str, MetricRule, f64); 8] = [
            (
                "tech_novelty",
                "technology_novelty_score",
                MetricRule::Scale10,
                0.20,
            ),
            (
                "ip_strength",
                "ip_portfolio_strength",
                MetricRule::Scale10,
                0.15,
            ),
            (
                "business_model_novelty",
                "business_model_novelty",
                MetricRule::Scale10,
                0.15,
            ),
            (
                "scalability",
                "scalability_potential",
                MetricRule::Scale10,
                0.15,
            ),
            (
                "value_proposition",
                "value_proposition_clarity",
                MetricRule::Scale10,
                0.10,
            ),
            (
                "first_mover",
                "first_mover_advantage",
                MetricRule::Scale10,
                0.10,
            ),
            (
                "network_effects",
                "network_effects_potential",
                MetricRule::Scale10,
                0.10,
            ),
            (
                "switching_costs",
                "switching_costs",
                MetricRule::Scale10,
                0.05,
            ),
        ];
        let traction: [(&str, &str, MetricRule, f64); 7] = [
            (
                "revenue",
                "annual_recurring_revenue",
                MetricRule::PerUnit { per_unit: 1e-6 },
                0.25,
            ),
            (
                "revenue_growth",
                "revenue_growth_rate",
                MetricRule::PerUnit { per_unit: 10.0 },
                0.20,
            ),
            (
                "unit_economics",
                "ltv_cac_ratio",
                MetricRule::PerUnit {
                    per_unit: 1.0 / 3.0,
                },
                0.15,
            ),
            (
                "retention",
                "customer_retention_rate",
                MetricRule::PerUnit { per_unit: 10.0 },
                0.15,
            ),
            (
                "customer_base",
                "total_customers",
                MetricRule::PerUnit { per_unit: 0.001 },
                0.10,
            ),
            ("team_size", "team_size", MetricRule::PerUnit { per_unit: 0.1 }, 0.10),
            (
                "funding_efficiency",
                "funding_efficiency",
                MetricRule::PerUnit { per_unit: 10.0 },
                0.05,
            ),
        ];

        for (category, table) in [
            (Category::FounderProfile, &founder[..]),
            (Category::ProblemMarket, &market[..]),
            (Category::Differentiator, &differentiator[..]),
            (Category::TeamTraction, &traction[..]),
        ] {
            for (id, input, rule, weight) in table.iter().cloned() {
                catalog = catalog.with_metric(MetricDefinition {
                    id: id.to_string(),
                    category,
                    input: input.to_string(),
                    rule,
                    weight,
                });
            }
        }

        catalog
    }
}
