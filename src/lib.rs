#![warn(missing_docs)]
//! Entity extraction for paginated documents.
//!
//! Page text is split into byte-bounded chunks, analyzed for linked entities,
//! resolved against a remote catalog and written back as per-page occurrence
//! records in bounded batches.

pub mod aggregator;
pub mod chunker;
pub mod clients;
pub mod config;
pub mod extraction;
pub mod model;
pub mod offsets;
pub mod pipeline;
pub mod resolver;
pub mod submitter;

pub use aggregator::{aggregate, fetch_existing, Aggregation, ExistingEntitySet};
pub use chunker::{build_chunks, Chunk, ChunkError, ChunkPlan};
pub use clients::{
    AnalyzedEntity, AnalyzedMention, EntityAnalyzer, EntityCatalog, PageTextSource,
    StableIdLookup, SubmitError, TextError,
};
pub use config::{Cli, PipelineConfig, BULK_LIMIT, BYTE_LIMIT};
pub use extraction::extract_entities;
pub use model::{
    CatalogEntry, CatalogId, DocumentRef, Mention, Occurrence, OccurrenceRecord, Page, RawEntity,
    ResolvedEntity,
};
pub use offsets::{OffsetMap, PagePosition, PAGE_SEPARATOR};
pub use pipeline::{
    Collaborators, DocumentOutcome, DocumentSummary, EntityPipeline, RunSummary, TerminalReason,
};
pub use resolver::{EntityResolver, ResolutionStats};
pub use submitter::{submit_records, SubmissionReport};
