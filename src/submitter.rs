//! Submits occurrence records to the catalog in bounded groups.

use tracing::{error, info, warn};

use crate::clients::{EntityCatalog, SubmitError};
use crate::model::{DocumentRef, OccurrenceRecord};

/// Outcome of submitting every group for one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmissionReport {
    /// Groups accepted by the catalog.
    pub succeeded: usize,
    /// Groups that failed without stopping the document.
    pub failed: usize,
    /// Records contained in accepted groups.
    pub records_submitted: usize,
    /// Set when the catalog rejected a group as invalid; later groups were skipped.
    pub rejected: Option<String>,
}

/// Submits `records` in groups of at most `bulk_limit`.
///
/// A validation rejection stops the document; permission and transport
/// failures are counted and the remaining groups are still attempted.
pub fn submit_records(
    catalog: &dyn EntityCatalog,
    document: &DocumentRef,
    records: &[OccurrenceRecord],
    bulk_limit: usize,
) -> SubmissionReport {
    let mut report = SubmissionReport::default();
    for (batch, group) in records.chunks(bulk_limit.max(1)).enumerate() {
        match catalog.submit_occurrences(document, group) {
            Ok(()) => {
                report.succeeded += 1;
                report.records_submitted += group.len();
                info!(document = document.id, batch, records = group.len(), "submitted occurrences");
            }
            Err(SubmitError::Validation { status, body }) => {
                error!(document = document.id, batch, %status, body = %body, "catalog rejected occurrences");
                report.rejected = Some(body);
                break;
            }
            Err(SubmitError::Permission { status, body }) => {
                warn!(document = document.id, batch, %status, body = %body, "permission denied");
                report.failed += 1;
            }
            Err(SubmitError::Other(err)) => {
                warn!(document = document.id, batch, error = %err, "occurrence batch failed");
                report.failed += 1;
            }
        }
    }
    report
}
