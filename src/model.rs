//! Typed records passed between pipeline stages.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one document in the remote catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentRef {
    /// Catalog document id.
    pub id: u64,
}

impl DocumentRef {
    /// Creates a reference to the given document id.
    pub fn new(id: u64) -> Self {
        Self { id }
    }
}

impl fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// One physical page of document text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// Zero-based position of the page in the document.
    pub index: usize,
    /// Page text as produced by the text loader.
    pub text: String,
}

impl Page {
    /// Builds a page from its index and text.
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
        }
    }
}

/// A single mention of an entity, positioned in document-global characters.
#[derive(Debug, Clone, PartialEq)]
pub struct Mention {
    /// Text of the mention as it appears in the document.
    pub content: String,
    /// Character offset from the start of the joined document text.
    pub global_offset: usize,
}

/// Entity reported by the analysis service for one chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEntity {
    /// Display name assigned by the analysis service.
    pub name: String,
    /// Encyclopedia URL that identifies the entity.
    pub external_ref: String,
    /// Importance of the entity within the analyzed text (0.0-1.0).
    pub salience: f64,
    /// Mentions with global offsets.
    pub mentions: Vec<Mention>,
}

/// Identifier assigned by the remote catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CatalogId(pub u64);

impl fmt::Display for CatalogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Catalog row pairing a stable knowledge-base id with its catalog id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Knowledge-base identifier (e.g. a Wikidata `Q` id).
    #[serde(rename = "wikidata_id")]
    pub stable_id: String,
    /// Catalog-assigned identifier.
    #[serde(rename = "id")]
    pub catalog_id: CatalogId,
}

/// Raw entity after identifier resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedEntity {
    /// Entity as returned by the analysis service.
    pub raw: RawEntity,
    /// Knowledge-base identifier, if the external reference could be mapped.
    pub stable_id: Option<String>,
    /// Catalog identifier, if one was found or created.
    pub catalog_id: Option<CatalogId>,
}

/// Mention translated to page coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrence {
    /// Mention text.
    pub content: String,
    /// Document-global character offset.
    pub offset: usize,
    /// Zero-based page number.
    pub page: usize,
    /// Character offset within the page.
    pub page_offset: usize,
}

/// All occurrences of one catalog entity within one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OccurrenceRecord {
    /// Catalog entity the occurrences belong to.
    #[serde(rename = "entity")]
    pub catalog_id: CatalogId,
    /// Salience of the first entity seen for this catalog id.
    pub relevance: f64,
    /// Occurrences in encounter order.
    pub occurrences: Vec<Occurrence>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn record_serializes_with_catalog_field_names() {
        let record = OccurrenceRecord {
            catalog_id: CatalogId(42),
            relevance: 0.5,
            occurrences: vec![Occurrence {
                content: "Paris".into(),
                offset: 14,
                page: 1,
                page_offset: 2,
            }],
        };
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({
                "entity": 42,
                "relevance": 0.5,
                "occurrences": [
                    {"content": "Paris", "offset": 14, "page": 1, "page_offset": 2}
                ]
            })
        );
    }

    #[test]
    fn catalog_entry_reads_service_names() {
        let entry: CatalogEntry =
            serde_json::from_value(json!({"id": 9, "wikidata_id": "Q90", "name": "Paris"}))
                .unwrap();
        assert_eq!(entry.stable_id, "Q90");
        assert_eq!(entry.catalog_id, CatalogId(9));
    }
}
