//! Stage collaborator contracts.
//!
//! Each pipeline stage that reaches outside the orchestrator (extraction,
//! mapping, enrichment lookups, memo prose rendering, voice interviews) is
//! a polymorphic capability behind a fixed async contract. Variants are
//! swappable implementations, not subclasses sharing mutable state; the
//! coordinator owns all run state and collaborators only transform inputs
//! to outputs. Any call may fail transiently; collaborators classify their
//! own failures through the `EvaluatorError` taxonomy and the coordinator
//! applies the retry policy.

pub mod builtin;

use crate::errors::EvaluatorResult;
use crate::types::{
    EnrichmentRecord, EvidenceRef, ExtractionResult, MappingResult, Memo, MemoSectionKind,
    Submission, VoiceInterview,
};
use async_trait::async_trait;

/// Turns raw submitted assets into structured fields and text snippets.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, submission: &Submission) -> EvaluatorResult<ExtractionResult>;
}

/// Normalizes an extraction into the canonical startup profile and the
/// metric input space.
#[async_trait]
pub trait Mapper: Send + Sync {
    async fn map(&self, extraction: &ExtractionResult) -> EvaluatorResult<MappingResult>;
}

/// One external lookup source. The coordinator fans out over every
/// registered source concurrently; partial results are acceptable.
#[async_trait]
pub trait EnrichmentSource: Send + Sync {
    /// Stable source identifier ("news", "founder_profiles", ...).
    fn name(&self) -> &str;

    async fn lookup(&self, mapping: &MappingResult) -> EvaluatorResult<Vec<EnrichmentRecord>>;
}

/// Everything a renderer needs to write one section's prose.
#[derive(Debug, Clone)]
pub struct SectionRenderRequest<'a> {
    pub company_name: &'a str,
    pub kind: MemoSectionKind,
    pub facts: &'a [String],
    pub citations: &'a [EvidenceRef],
}

/// Renders natural-language prose for the memo. The assembler owns the
/// structural contract (which facts, in what order, with which citations);
/// the renderer only writes the words.
#[async_trait]
pub trait MemoRenderer: Send + Sync {
    async fn render_section(&self, request: SectionRenderRequest<'_>) -> EvaluatorResult<String>;

    /// Render the full memo into a distributable artifact, returning its
    /// reference (inline text or a storage URI).
    async fn render_artifact(&self, memo: &Memo) -> EvaluatorResult<String>;
}

/// Conducts a founder interview and returns the transcript plus clarified
/// numeric fields.
#[async_trait]
pub trait VoiceInterviewer: Send + Sync {
    async fn conduct(
        &self,
        submission: &Submission,
        questions: &[String],
    ) -> EvaluatorResult<VoiceInterview>;
}
