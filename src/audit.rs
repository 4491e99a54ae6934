//! Append-only audit trail for run activity.
//!
//! Every state-changing operation on a run appends exactly one event here,
//! including failure paths. Events are hash-chained: each entry's
//! `chain_hash` covers the previous entry's hash plus this entry's payload,
//! so `verify_integrity` can detect any rewrite of history. The trail is
//! the in-memory ledger; the coordinator also persists every event to the
//! store's `audit_logs` table.

use crate::types::{now_secs, AppId, RunId};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    RunCreated,
    StepStarted,
    StepCompleted,
    StepRetrying,
    StepFailed,
    RunCompleted,
    RunFailed,
    RunCancelled,
    CancelRequested,
    RunResumed,
    ScoreComputed,
    WeightsRenormalized,
    EnrichmentDegraded,
    MemoAssembled,
    VoiceInterviewMerged,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::RunCreated => "run_created",
            AuditEventType::StepStarted => "step_started",
            AuditEventType::StepCompleted => "step_completed",
            AuditEventType::StepRetrying => "step_retrying",
            AuditEventType::StepFailed => "step_failed",
            AuditEventType::RunCompleted => "run_completed",
            AuditEventType::RunFailed => "run_failed",
            AuditEventType::RunCancelled => "run_cancelled",
            AuditEventType::CancelRequested => "cancel_requested",
            AuditEventType::RunResumed => "run_resumed",
            AuditEventType::ScoreComputed => "score_computed",
            AuditEventType::WeightsRenormalized => "weights_renormalized",
            AuditEventType::EnrichmentDegraded => "enrichment_degraded",
            AuditEventType::MemoAssembled => "memo_assembled",
            AuditEventType::VoiceInterviewMerged => "voice_interview_merged",
        }
    }
}

impl std::fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable entry in the activity trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: String,
    pub app_id: AppId,
    pub run_id: RunId,
    pub event_type: AuditEventType,
    pub actor: String,
    pub details: serde_json::Value,
    pub timestamp: u64,
    /// Hash over the previous entry's chain hash and this entry's payload.
    pub chain_hash: String,
}

impl AuditEvent {
    pub fn new(
        app_id: impl Into<AppId>,
        run_id: impl Into<RunId>,
        event_type: AuditEventType,
        actor: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            event_id: format!("evt-{}", Uuid::new_v4()),
            app_id: app_id.into(),
            run_id: run_id.into(),
            event_type,
            actor: actor.into(),
            details,
            timestamp: now_secs(),
            chain_hash: String::new(),
        }
    }

    fn payload_hash(&self, previous: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(previous.as_bytes());
        hasher.update(self.event_id.as_bytes());
        hasher.update(self.app_id.as_bytes());
        hasher.update(self.run_id.as_bytes());
        hasher.update(self.event_type.as_str().as_bytes());
        hasher.update(self.actor.as_bytes());
        hasher.update(self.details.to_string().as_bytes());
        hasher.update(self.timestamp.to_be_bytes());
        format!("{:x}", hasher.finalize())
    }
}

const GENESIS_HASH: &str = "genesis";

/// In-memory append-only ledger of audit events.
#[derive(Debug, Default)]
pub struct AuditTrail {
    events: Vec<AuditEvent>,
}

impl AuditTrail {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Chain and append an event, returning the sealed entry.
    pub fn append(&mut self, mut event: AuditEvent) -> AuditEvent {
        let previous = self
            .events
            .last()
            .map(|e| e.chain_hash.as_str())
            .unwrap_or(GENESIS_HASH);
        event.chain_hash = event.payload_hash(previous);
        self.events.push(event.clone());
        event
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[AuditEvent] {
        &self.events
    }

    pub fn events_for_run(&self, run_id: &str) -> Vec<&AuditEvent> {
        self.events.iter().filter(|e| e.run_id == run_id).collect()
    }

    pub fn events_of_type(&self, event_type: AuditEventType) -> Vec<&AuditEvent> {
        self.events
            .iter()
            .filter(|e| e.event_type == event_type)
            .collect()
    }

    /// Re-walk the chain and confirm every stored hash still matches its
    /// payload and predecessor.
    pub fn verify_integrity(&self) -> bool {
        let mut previous = GENESIS_HASH.to_string();
        for event in &self.events {
            if event.payload_hash(&previous) != event.chain_hash {
                return false;
            }
            previous = event.chain_hash.clone();
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample(event_type: AuditEventType) -> AuditEvent {
        AuditEvent::new(
            "app-1",
            "run-1",
            event_type,
            "system",
            json!({ "step": "extraction" }),
        )
    }

    #[test]
    fn chain_links_and_verifies() {
        let mut trail = AuditTrail::new();
        trail.append(sample(AuditEventType::RunCreated));
        trail.append(sample(AuditEventType::StepStarted));
        trail.append(sample(AuditEventType::StepCompleted));
        assert_eq!(trail.len(), 3);
        assert!(trail.verify_integrity());
    }

    #[test]
    fn tampering_breaks_verification() {
        let mut trail = AuditTrail::new();
        trail.append(sample(AuditEventType::RunCreated));
        trail.append(sample(AuditEventType::StepStarted));
        trail.events[0].details = json!({ "step": "rewritten" });
        assert!(!trail.verify_integrity());
    }

    #[test]
    fn filters_by_run_and_type() {
        let mut trail = AuditTrail::new();
        trail.append(sample(AuditEventType::RunCreated));
        let mut other = sample(AuditEventType::RunCreated);
        other.run_id = "run-2".to_string();
        trail.append(other);
        assert_eq!(trail.events_for_run("run-1").len(), 1);
        assert_eq!(trail.events_of_type(AuditEventType::RunCreated).len(), 2);
    }
}
