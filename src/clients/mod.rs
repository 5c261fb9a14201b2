//! Remote collaborators used by the pipeline, plus their HTTP implementations.

use anyhow::Result;
use reqwest::StatusCode;
use thiserror::Error;

use crate::model::{CatalogEntry, CatalogId, DocumentRef, OccurrenceRecord, Page};

pub mod documentcloud;
pub mod google;
mod http;
pub mod wikidata;

pub use documentcloud::DocumentCloudClient;
pub use google::GoogleEntityAnalyzer;
pub use wikidata::WikidataLookup;

/// Supplies ordered page texts for a document.
pub trait PageTextSource {
    /// Loads every page of `document`.
    fn page_texts(&self, document: &DocumentRef) -> Result<Vec<Page>, TextError>;
}

/// Entity recognition over a block of text.
pub trait EntityAnalyzer {
    /// Returns entities whose mention offsets are relative to `text`.
    fn analyze(&self, text: &str) -> Result<Vec<AnalyzedEntity>>;
}

/// Maps encyclopedia URLs to stable knowledge-base identifiers.
pub trait StableIdLookup {
    /// Returns `None` when the reference does not correspond to a known item.
    fn resolve(&self, external_ref: &str) -> Result<Option<String>>;
}

/// Remote catalog of entities and per-document occurrences.
pub trait EntityCatalog {
    /// Existing catalog entries for any of `stable_ids`.
    fn find_entities(&self, stable_ids: &[&str]) -> Result<Vec<CatalogEntry>>;

    /// Creates entries for `stable_ids` and returns the assigned ids.
    fn create_entities(&self, stable_ids: &[&str]) -> Result<Vec<CatalogEntry>>;

    /// Catalog ids already recorded against `document`.
    fn document_entities(&self, document: &DocumentRef) -> Result<Vec<CatalogId>>;

    /// Records one batch of occurrence records for `document`.
    fn submit_occurrences(
        &self,
        document: &DocumentRef,
        records: &[OccurrenceRecord],
    ) -> Result<(), SubmitError>;
}

/// Entity as reported by the analysis service.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzedEntity {
    /// Display name.
    pub name: String,
    /// Encyclopedia URL, when the service linked the entity.
    pub external_ref: Option<String>,
    /// Importance of the entity in the analyzed text.
    pub salience: f64,
    /// Mentions relative to the analyzed text.
    pub mentions: Vec<AnalyzedMention>,
}

/// One mention span relative to the analyzed text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzedMention {
    /// Mention text.
    pub content: String,
    /// Character offset from the start of the analyzed text.
    pub begin_offset: usize,
}

/// Failures while loading document text.
#[derive(Debug, Error)]
pub enum TextError {
    /// The document has no extracted text yet.
    #[error("text for document {document} is not available")]
    Missing {
        /// Document whose text is missing.
        document: DocumentRef,
    },
    /// Any other transport or decoding failure.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Failures while submitting occurrence records.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// The catalog rejected the payload as invalid.
    #[error("catalog rejected occurrences ({status}): {body}")]
    Validation {
        /// HTTP status returned.
        status: StatusCode,
        /// Response body, for diagnostics.
        body: String,
    },
    /// The caller may not write to this document.
    #[error("not permitted to record occurrences ({status}): {body}")]
    Permission {
        /// HTTP status returned.
        status: StatusCode,
        /// Response body, for diagnostics.
        body: String,
    },
    /// Any other transport or server failure.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
