//! Runtime configuration for the evaluation pipeline.
//!
//! A config is an explicit, immutable snapshot handed to the coordinator at
//! construction; nothing here is read from ambient globals mid-run. Weight
//! updates take effect only for runs started after the update.

use crate::catalog::Category;
use crate::errors::{EvaluatorError, EvaluatorResult};
use crate::types::StepName;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Retry policy for one pipeline step: bounded exponential backoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt; a step may run max_retries + 1 times.
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff_ms: 100,
            max_backoff_ms: 5_000,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry `attempt` (1-based): initial * 2^(attempt-1),
    /// capped at max_backoff_ms.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        let ms = self
            .initial_backoff_ms
            .saturating_mul(1u64 << shift)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

/// Timeouts for the enrichment fan-out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentSettings {
    /// Per-lookup timeout; a lookup past this is dropped, not fatal.
    pub per_lookup_timeout_ms: u64,
    /// Overall deadline for the whole fan-in barrier.
    pub phase_deadline_ms: u64,
}

impl Default for EnrichmentSettings {
    fn default() -> Self {
        Self {
            per_lookup_timeout_ms: 10_000,
            phase_deadline_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTolerance {
    Low,
    Medium,
    High,
}

impl Default for RiskTolerance {
    fn default() -> Self {
        RiskTolerance::Medium
    }
}

/// Investor preference weights applied to category scores. The engine
/// renormalizes at scoring time if they do not sum to 1 and records a
/// warning on the ScoreRun.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestorPreferences {
    pub founder_weight: f64,
    pub market_weight: f64,
    pub differentiation_weight: f64,
    pub traction_weight: f64,
    #[serde(default)]
    pub risk_tolerance: RiskTolerance,
}

impl Default for InvestorPreferences {
    fn default() -> Self {
        Self {
            founder_weight: 0.25,
            market_weight: 0.25,
            differentiation_weight: 0.25,
            traction_weight: 0.25,
            risk_tolerance: RiskTolerance::Medium,
        }
    }
}

impl InvestorPreferences {
    pub fn category_weight(&self, category: Category) -> f64 {
        match category {
            Category::FounderProfile => self.founder_weight,
            Category::ProblemMarket => self.market_weight,
            Category::Differentiator => self.differentiation_weight,
            Category::TeamTraction => self.traction_weight,
        }
    }
}

/// Top-level configuration snapshot for a coordinator instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluatorConfig {
    /// Actor recorded on audit events appended by the coordinator.
    #[serde(default = "default_actor")]
    pub actor: String,
    /// Allow scoring to schedule a voice interview step when it flags one.
    #[serde(default)]
    pub enable_voice_interview: bool,
    #[serde(default)]
    pub default_retry: RetryPolicy,
    /// Per-step overrides, keyed by step name ("extraction", "scoring", ...).
    #[serde(default)]
    pub step_retries: BTreeMap<String, RetryPolicy>,
    #[serde(default)]
    pub enrichment: EnrichmentSettings,
    #[serde(default)]
    pub preferences: InvestorPreferences,
}

fn default_actor() -> String {
    "system".to_string()
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            actor: default_actor(),
            enable_voice_interview: false,
            default_retry: RetryPolicy::default(),
            step_retries: BTreeMap::new(),
            enrichment: EnrichmentSettings::default(),
            preferences: InvestorPreferences::default(),
        }
    }
}

impl EvaluatorConfig {
    pub fn policy_for(&self, step: StepName) -> RetryPolicy {
        self.step_retries
            .get(step.as_str())
            .cloned()
            .unwrap_or_else(|| self.default_retry.clone())
    }

    pub fn with_step_policy(mut self, step: StepName, policy: RetryPolicy) -> Self {
        self.step_retries.insert(step.as_str().to_string(), policy);
        self
    }

    pub fn from_toml_str(raw: &str) -> EvaluatorResult<Self> {
        let config: EvaluatorConfig =
            toml::from_str(raw).map_err(|e| EvaluatorError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> EvaluatorResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| EvaluatorError::Config(e.to_string()))?;
        Self::from_toml_str(&raw)
    }

    fn validate(&self) -> EvaluatorResult<()> {
        for key in self.step_retries.keys() {
            if StepName::from_str_name(key).is_none() {
                return Err(EvaluatorError::Config(format!(
                    "unknown step name in step_retries: {key}"
                )));
            }
        }
        let p = &self.preferences;
        for (name, w) in [
            ("founder_weight", p.founder_weight),
            ("market_weight", p.market_weight),
            ("differentiation_weight", p.differentiation_weight),
            ("traction_weight", p.traction_weight),
        ] {
            if !(0.0..=1.0).contains(&w) {
                return Err(EvaluatorError::Config(format!(
                    "{name} must be within [0,1], got {w}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_retries: 5,
            initial_backoff_ms: 100,
            max_backoff_ms: 400,
        };
        assert_eq!(policy.backoff_delay(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_delay(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_delay(3), Duration::from_millis(400));
        assert_eq!(policy.backoff_delay(4), Duration::from_millis(400));
    }

    #[test]
    fn per_step_policy_falls_back_to_default() {
        let config = EvaluatorConfig::default().with_step_policy(
            StepName::Scoring,
            RetryPolicy {
                max_retries: 0,
                initial_backoff_ms: 1,
                max_backoff_ms: 1,
            },
        );
        assert_eq!(config.policy_for(StepName::Scoring).max_retries, 0);
        assert_eq!(
            config.policy_for(StepName::Extraction).max_retries,
            RetryPolicy::default().max_retries
        );
    }

    #[test]
    fn parses_partial_toml_with_defaults() {
        let raw = r#"
            enable_voice_interview = true

            [preferences]
            founder_weight = 0.3
            market_weight = 0.25
            differentiation_weight = 0.2
            traction_weight = 0.25

            [step_retries.enrichment]
            max_retries = 1
            initial_backoff_ms = 50
            max_backoff_ms = 500
        "#;
        let config = EvaluatorConfig::from_toml_str(raw).unwrap();
        assert!(config.enable_voice_interview);
        assert_eq!(config.preferences.founder_weight, 0.3);
        assert_eq!(config.policy_for(StepName::Enrichment).max_retries, 1);
        assert_eq!(config.actor, "system");
    }

    #[test]
    fn rejects_unknown_step_key() {
        let raw = r#"
            [step_retries.shipping]
            max_retries = 1
            initial_backoff_ms = 50
            max_backoff_ms = 500
        "#;
        assert!(EvaluatorConfig::from_toml_str(raw).is_err());
    }
}
