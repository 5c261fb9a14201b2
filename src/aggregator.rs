//! Collapses resolved entities into one occurrence record per catalog id.

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::clients::EntityCatalog;
use crate::model::{CatalogId, DocumentRef, Mention, Occurrence, OccurrenceRecord, ResolvedEntity};
use crate::offsets::OffsetMap;

/// Catalog ids already recorded for a document.
pub type ExistingEntitySet = HashSet<CatalogId>;

/// Records ready for submission plus bookkeeping from the collapse.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregation {
    /// One record per catalog id, in first-seen order.
    pub records: Vec<OccurrenceRecord>,
    /// Entities skipped because the document already lists their catalog id.
    pub duplicates: usize,
    /// Entities dropped for lacking a catalog id.
    pub unmapped: usize,
    /// Mentions dropped because their offset fell outside every page.
    pub stray_mentions: usize,
}

/// Fetches the catalog ids already attached to `document`.
///
/// A failed fetch is logged and treated as "nothing recorded yet".
pub fn fetch_existing(catalog: &dyn EntityCatalog, document: &DocumentRef) -> ExistingEntitySet {
    match catalog.document_entities(document) {
        Ok(ids) => ids.into_iter().collect(),
        Err(err) => {
            warn!(document = document.id, error = %err, "could not fetch existing entities");
            ExistingEntitySet::new()
        }
    }
}

/// Builds occurrence records from resolved entities.
pub fn aggregate(
    entities: &[ResolvedEntity],
    existing: &ExistingEntitySet,
    offsets: &OffsetMap,
) -> Aggregation {
    let mut open = OpenRecords::default();
    let mut duplicates = 0usize;
    let mut unmapped = 0usize;

    for entity in entities {
        let Some(catalog_id) = entity.catalog_id else {
            unmapped += 1;
            continue;
        };
        if existing.contains(&catalog_id) {
            debug!(entity = %catalog_id, name = %entity.raw.name, "skipping duplicate entity");
            duplicates += 1;
            continue;
        }
        open.collapse(catalog_id, entity.raw.salience, &entity.raw.mentions);
    }

    let mut stray_mentions = 0usize;
    let records = open
        .into_ordered()
        .map(|(catalog_id, relevance, mentions)| {
            let occurrences = mentions
                .into_iter()
                .filter_map(|mention| {
                    let occurrence = to_occurrence(mention, offsets);
                    if occurrence.is_none() {
                        stray_mentions += 1;
                    }
                    occurrence
                })
                .collect();
            OccurrenceRecord {
                catalog_id,
                relevance,
                occurrences,
            }
        })
        .collect();

    if stray_mentions > 0 {
        warn!(stray_mentions, "dropped mentions outside the page map");
    }
    Aggregation {
        records,
        duplicates,
        unmapped,
        stray_mentions,
    }
}

fn to_occurrence(mention: &Mention, offsets: &OffsetMap) -> Option<Occurrence> {
    let position = offsets.reconcile(mention.global_offset)?;
    Some(Occurrence {
        content: mention.content.clone(),
        offset: mention.global_offset,
        page: position.page,
        page_offset: position.page_offset,
    })
}

/// Insertion-ordered map from catalog id to its pending record.
#[derive(Default)]
struct OpenRecords<'e> {
    order: Vec<(CatalogId, f64, Vec<&'e Mention>)>,
    index: HashMap<CatalogId, usize>,
}

impl<'e> OpenRecords<'e> {
    fn collapse(&mut self, catalog_id: CatalogId, salience: f64, mentions: &'e [Mention]) {
        match self.index.get(&catalog_id) {
            Some(&slot) => self.order[slot].2.extend(mentions.iter()),
            None => {
                self.index.insert(catalog_id, self.order.len());
                self.order
                    .push((catalog_id, salience, mentions.iter().collect()));
            }
        }
    }

    fn into_ordered(self) -> impl Iterator<Item = (CatalogId, f64, Vec<&'e Mention>)> {
        self.order.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RawEntity;
    use pretty_assertions::assert_eq;

    fn offsets(lengths: &[usize]) -> OffsetMap {
        let mut map = OffsetMap::new();
        for &len in lengths {
            map.push_page(len);
        }
        map
    }

    fn entity(catalog_id: Option<u64>, salience: f64, mentions: &[(&str, usize)]) -> ResolvedEntity {
        ResolvedEntity {
            raw: RawEntity {
                name: "e".into(),
                external_ref: "https://en.wikipedia.org/wiki/E".into(),
                salience,
                mentions: mentions
                    .iter()
                    .map(|(content, offset)| Mention {
                        content: content.to_string(),
                        global_offset: *offset,
                    })
                    .collect(),
            },
            stable_id: catalog_id.map(|id| format!("Q{id}")),
            catalog_id: catalog_id.map(CatalogId),
        }
    }

    #[test]
    fn collapses_mentions_per_catalog_id() {
        let entities = vec![
            entity(Some(1), 0.7, &[("Paris", 3)]),
            entity(Some(2), 0.2, &[("Rome", 8)]),
            entity(Some(1), 0.1, &[("the capital", 14)]),
        ];
        let result = aggregate(&entities, &ExistingEntitySet::new(), &offsets(&[10, 10]));

        assert_eq!(result.records.len(), 2);
        let first = &result.records[0];
        assert_eq!(first.catalog_id, CatalogId(1));
        assert_eq!(first.relevance, 0.7);
        assert_eq!(
            first.occurrences,
            vec![
                Occurrence {
                    content: "Paris".into(),
                    offset: 3,
                    page: 0,
                    page_offset: 3
                },
                Occurrence {
                    content: "the capital".into(),
                    offset: 14,
                    page: 1,
                    page_offset: 2
                },
            ]
        );
        assert_eq!(result.records[1].catalog_id, CatalogId(2));
    }

    #[test]
    fn skips_existing_and_unmapped() {
        let entities = vec![
            entity(Some(1), 0.7, &[("Paris", 3)]),
            entity(None, 0.5, &[("Nowhere", 4)]),
            entity(Some(2), 0.2, &[("Rome", 8)]),
        ];
        let existing: ExistingEntitySet = [CatalogId(1)].into_iter().collect();
        let result = aggregate(&entities, &existing, &offsets(&[20]));

        assert_eq!(result.duplicates, 1);
        assert_eq!(result.unmapped, 1);
        let ids: Vec<CatalogId> = result.records.iter().map(|r| r.catalog_id).collect();
        assert_eq!(ids, vec![CatalogId(2)]);
    }

    #[test]
    fn drops_mentions_outside_the_map() {
        let entities = vec![entity(Some(1), 0.7, &[("in", 1), ("out", 500)])];
        let result = aggregate(&entities, &ExistingEntitySet::new(), &offsets(&[10]));

        assert_eq!(result.stray_mentions, 1);
        assert_eq!(result.records[0].occurrences.len(), 1);
    }
}
