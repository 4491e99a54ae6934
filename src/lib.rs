//! dealflow: startup-submission evaluation pipeline.
//!
//! The crate is built around two engines:
//!
//! - the [`orchestrator::WorkflowCoordinator`], a persisted state machine
//!   that drives a run through extraction, mapping, a parallel enrichment
//!   fan-out, scoring, memo generation, and an optional founder interview,
//!   with bounded retries, cooperative cancellation, idempotent resume, and
//!   a hash-chained audit trail;
//! - the [`scoring::ScoringEngine`], a deterministic pure function turning
//!   aggregated evidence and a metric catalog into category scores, an
//!   overall score, and an investment decision.
//!
//! External capabilities (extraction, enrichment lookups, prose rendering,
//! voice interviews) plug in through the async traits in [`stages`];
//! persistence goes through [`storage::EvaluationStore`], with in-memory
//! and SQLite backends provided.

pub mod audit;
pub mod catalog;
pub mod config;
pub mod errors;
pub mod evidence;
pub mod memo;
pub mod orchestrator;
pub mod scoring;
pub mod stages;
pub mod storage;
pub mod types;

pub use catalog::MetricCatalog;
pub use config::EvaluatorConfig;
pub use errors::{EvaluatorError, EvaluatorResult};
pub use orchestrator::{StageSet, WorkflowCoordinator};
pub use scoring::ScoringEngine;
pub use storage::{EvaluationStore, InMemoryStore, SqliteStore};

use once_cell::sync::OnceCell;

static TRACING_INIT: OnceCell<()> = OnceCell::new();

/// Install the global tracing subscriber (env-filtered, defaulting to
/// `info`). Safe to call repeatedly; only the first call takes effect.
pub fn init_tracing() {
    TRACING_INIT.get_or_init(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init();
    });
}
