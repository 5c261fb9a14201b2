//! Per-document driver tying chunking, extraction, resolution, aggregation and submission together.

use serde::Serialize;
use thiserror::Error;
use tracing::{error, info};

use crate::aggregator::{aggregate, fetch_existing};
use crate::chunker::{build_chunks, ChunkError};
use crate::clients::{EntityAnalyzer, EntityCatalog, PageTextSource, StableIdLookup, TextError};
use crate::config::PipelineConfig;
use crate::extraction::extract_entities;
use crate::model::DocumentRef;
use crate::resolver::EntityResolver;
use crate::submitter::submit_records;

/// Remote services a pipeline run depends on.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    /// Page text loader.
    pub text: &'a dyn PageTextSource,
    /// Entity recognition service.
    pub analyzer: &'a dyn EntityAnalyzer,
    /// Encyclopedia URL to stable id lookup.
    pub lookup: &'a dyn StableIdLookup,
    /// Entity catalog.
    pub catalog: &'a dyn EntityCatalog,
}

/// Counters gathered while processing one document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DocumentSummary {
    /// Pages loaded.
    pub pages: usize,
    /// Chunks sent for analysis.
    pub chunks: usize,
    /// Linked entities returned across all chunks.
    pub entities: usize,
    /// Entities without a catalog id after resolution.
    pub unresolved: usize,
    /// Catalog lookup or create batches that failed.
    pub catalog_batches_failed: usize,
    /// Entities skipped because the document already lists them.
    pub duplicates: usize,
    /// Occurrence records built.
    pub records: usize,
    /// Records accepted by the catalog.
    pub records_submitted: usize,
    /// Submission groups accepted.
    pub batches_submitted: usize,
    /// Submission groups that failed without stopping the document.
    pub batches_failed: usize,
}

/// Why processing stopped early for a document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TerminalReason {
    /// The document has no extracted text yet.
    #[error("document text is not available")]
    TextUnavailable,
    /// Loading the text failed for another reason.
    #[error("failed to load document text: {0}")]
    TextLoadFailed(String),
    /// A page cannot fit in a single analysis call.
    #[error(transparent)]
    PageTooLarge(#[from] ChunkError),
    /// The analysis service failed on a chunk.
    #[error("entity analysis failed: {0}")]
    ExtractionFailed(String),
    /// The catalog rejected submitted occurrences as invalid.
    #[error("catalog rejected occurrences: {0}")]
    Rejected(String),
}

impl TerminalReason {
    /// Message meant for the person who requested the run.
    pub fn user_message(&self, document: &DocumentRef) -> String {
        match self {
            Self::TextUnavailable => format!(
                "Document {document} has no extracted text yet. Wait for processing to finish and retry."
            ),
            Self::TextLoadFailed(_) => {
                format!("Could not load the text of document {document}. Please retry later.")
            }
            Self::PageTooLarge(ChunkError::PageTooLarge { page, bytes, limit }) => format!(
                "Page {page} of document {document} holds {bytes} bytes of text, more than the {limit} bytes entity extraction accepts."
            ),
            Self::ExtractionFailed(_) => {
                format!("Entity extraction failed for document {document}. Please retry later.")
            }
            Self::Rejected(_) => format!(
                "Document {document} could not be annotated because its text is malformed or unindexed. Apply OCR and retry."
            ),
        }
    }
}

/// Result of processing one document.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentOutcome {
    /// Every submission group was accepted.
    Submitted {
        /// Processed document.
        document: DocumentRef,
        /// Counters for the document.
        summary: DocumentSummary,
    },
    /// Processing finished but some batches failed.
    SubmittedWithErrors {
        /// Processed document.
        document: DocumentRef,
        /// Counters for the document.
        summary: DocumentSummary,
    },
    /// Processing stopped early.
    Terminal {
        /// Processed document.
        document: DocumentRef,
        /// Why processing stopped.
        reason: TerminalReason,
        /// Counters gathered before stopping.
        summary: DocumentSummary,
    },
}

impl DocumentOutcome {
    /// Document this outcome belongs to.
    pub fn document(&self) -> DocumentRef {
        match self {
            Self::Submitted { document, .. }
            | Self::SubmittedWithErrors { document, .. }
            | Self::Terminal { document, .. } => *document,
        }
    }

    /// Counters gathered for the document.
    pub fn summary(&self) -> &DocumentSummary {
        match self {
            Self::Submitted { summary, .. }
            | Self::SubmittedWithErrors { summary, .. }
            | Self::Terminal { summary, .. } => summary,
        }
    }

    /// User-facing message for terminal outcomes.
    pub fn user_message(&self) -> Option<String> {
        match self {
            Self::Terminal {
                document, reason, ..
            } => Some(reason.user_message(document)),
            _ => None,
        }
    }
}

/// Totals across every document in a run, accumulated by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Documents processed.
    pub documents: usize,
    /// Documents whose batches all succeeded.
    pub completed: usize,
    /// Documents that finished with failed batches.
    pub completed_with_errors: usize,
    /// Documents that stopped early.
    pub terminal: usize,
    /// Submission groups accepted.
    pub successes: usize,
    /// Submission and catalog groups that failed.
    pub errors: usize,
    /// Occurrence records accepted.
    pub records_submitted: usize,
}

impl RunSummary {
    /// Folds one document outcome into the totals.
    pub fn record(&mut self, outcome: &DocumentOutcome) {
        self.documents += 1;
        match outcome {
            DocumentOutcome::Submitted { .. } => self.completed += 1,
            DocumentOutcome::SubmittedWithErrors { .. } => self.completed_with_errors += 1,
            DocumentOutcome::Terminal { .. } => self.terminal += 1,
        }
        let summary = outcome.summary();
        self.successes += summary.batches_submitted;
        self.errors += summary.batches_failed + summary.catalog_batches_failed;
        self.records_submitted += summary.records_submitted;
    }
}

/// Sequential entity pipeline over a fixed set of collaborators.
pub struct EntityPipeline<'a> {
    collaborators: Collaborators<'a>,
    config: PipelineConfig,
}

impl<'a> EntityPipeline<'a> {
    /// Builds a pipeline.
    pub fn new(collaborators: Collaborators<'a>, config: PipelineConfig) -> Self {
        Self {
            collaborators,
            config,
        }
    }

    /// Returns the pipeline limits.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Processes one document end to end.
    pub fn process_document(&self, document: &DocumentRef) -> DocumentOutcome {
        let mut summary = DocumentSummary::default();
        let outcome = match self.run_stages(document, &mut summary) {
            Ok(with_errors) if with_errors => DocumentOutcome::SubmittedWithErrors {
                document: *document,
                summary,
            },
            Ok(_) => DocumentOutcome::Submitted {
                document: *document,
                summary,
            },
            Err(reason) => {
                error!(document = document.id, reason = %reason, "document processing stopped");
                DocumentOutcome::Terminal {
                    document: *document,
                    reason,
                    summary,
                }
            }
        };
        info!(
            document = document.id,
            records = summary.records,
            submitted = summary.records_submitted,
            failed_batches = summary.batches_failed,
            "document finished"
        );
        outcome
    }

    /// Processes documents one after another.
    pub fn run(&self, documents: &[DocumentRef]) -> (Vec<DocumentOutcome>, RunSummary) {
        let mut totals = RunSummary::default();
        let outcomes = documents
            .iter()
            .map(|document| {
                let outcome = self.process_document(document);
                totals.record(&outcome);
                outcome
            })
            .collect();
        (outcomes, totals)
    }

    fn run_stages(
        &self,
        document: &DocumentRef,
        summary: &mut DocumentSummary,
    ) -> Result<bool, TerminalReason> {
        let Collaborators {
            text,
            analyzer,
            lookup,
            catalog,
        } = self.collaborators;

        info!(document = document.id, "processing document");
        let pages = text.page_texts(document).map_err(|err| match err {
            TextError::Missing { .. } => TerminalReason::TextUnavailable,
            TextError::Other(err) => TerminalReason::TextLoadFailed(format!("{err:#}")),
        })?;
        summary.pages = pages.len();

        let plan = build_chunks(&pages, self.config.byte_limit())?;
        summary.chunks = plan.chunks.len();
        if plan.chunks.is_empty() {
            return Ok(false);
        }

        let entities = extract_entities(analyzer, &plan)
            .map_err(|err| TerminalReason::ExtractionFailed(format!("{err:#}")))?;
        summary.entities = entities.len();

        let resolver = EntityResolver::new(lookup, catalog, self.config.bulk_limit());
        let (resolved, stats) = resolver.resolve(entities);
        summary.unresolved = resolved.iter().filter(|e| e.catalog_id.is_none()).count();
        summary.catalog_batches_failed = stats.failed_batches;

        let existing = fetch_existing(catalog, document);
        let aggregation = aggregate(&resolved, &existing, &plan.offsets);
        summary.duplicates = aggregation.duplicates;
        summary.records = aggregation.records.len();

        let report = submit_records(
            catalog,
            document,
            &aggregation.records,
            self.config.bulk_limit(),
        );
        summary.batches_submitted = report.succeeded;
        summary.batches_failed = report.failed;
        summary.records_submitted = report.records_submitted;
        if let Some(body) = report.rejected {
            return Err(TerminalReason::Rejected(body));
        }
        Ok(report.failed > 0 || stats.failed_batches > 0)
    }
}
