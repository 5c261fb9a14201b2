//! Maps raw entities to stable knowledge-base ids and catalog ids.

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::clients::{EntityCatalog, StableIdLookup};
use crate::model::{CatalogId, RawEntity, ResolvedEntity};

/// Counters describing one resolution pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolutionStats {
    /// Distinct external references looked up.
    pub references: usize,
    /// References that did not map to a stable id.
    pub unresolved_references: usize,
    /// Stable ids already present in the catalog.
    pub existing: usize,
    /// Stable ids newly created in the catalog.
    pub created: usize,
    /// Catalog read or create batches that failed.
    pub failed_batches: usize,
}

/// Resolver bound to its two collaborators.
pub struct EntityResolver<'a> {
    lookup: &'a dyn StableIdLookup,
    catalog: &'a dyn EntityCatalog,
    bulk_limit: usize,
}

impl<'a> EntityResolver<'a> {
    /// Builds a resolver issuing catalog requests of at most `bulk_limit` ids.
    pub fn new(
        lookup: &'a dyn StableIdLookup,
        catalog: &'a dyn EntityCatalog,
        bulk_limit: usize,
    ) -> Self {
        Self {
            lookup,
            catalog,
            bulk_limit: bulk_limit.max(1),
        }
    }

    /// Resolves every entity, creating catalog entries for unseen stable ids.
    ///
    /// Failures never abort the pass; affected entities come back with a
    /// `None` id and are dropped downstream.
    pub fn resolve(&self, entities: Vec<RawEntity>) -> (Vec<ResolvedEntity>, ResolutionStats) {
        let mut stats = ResolutionStats::default();

        let stable_ids = self.lookup_references(&entities, &mut stats);
        let ordered = distinct_in_order(entities.iter().filter_map(|entity| {
            stable_ids
                .get(&entity.external_ref)
                .and_then(|id| id.as_deref())
        }));

        let (mut catalog_ids, unknown) = self.find_existing(&ordered, &mut stats);
        // Ids from a failed lookup batch stay unmapped, never created.
        let missing: Vec<&str> = ordered
            .iter()
            .copied()
            .filter(|id| !catalog_ids.contains_key(*id) && !unknown.contains(id))
            .collect();
        self.create_missing(&missing, &mut catalog_ids, &mut stats);

        let resolved = entities
            .into_iter()
            .map(|raw| {
                let stable_id = stable_ids.get(&raw.external_ref).cloned().flatten();
                let catalog_id = stable_id
                    .as_deref()
                    .and_then(|id| catalog_ids.get(id).copied());
                ResolvedEntity {
                    raw,
                    stable_id,
                    catalog_id,
                }
            })
            .collect();
        (resolved, stats)
    }

    fn lookup_references(
        &self,
        entities: &[RawEntity],
        stats: &mut ResolutionStats,
    ) -> HashMap<String, Option<String>> {
        let mut cache: HashMap<String, Option<String>> = HashMap::new();
        for entity in entities {
            if cache.contains_key(&entity.external_ref) {
                continue;
            }
            let stable_id = match self.lookup.resolve(&entity.external_ref) {
                Ok(id) => id,
                Err(err) => {
                    warn!(reference = %entity.external_ref, error = %err, "stable id lookup failed");
                    None
                }
            };
            if stable_id.is_none() {
                debug!(reference = %entity.external_ref, "dropping unresolved reference");
                stats.unresolved_references += 1;
            }
            cache.insert(entity.external_ref.clone(), stable_id);
        }
        stats.references = cache.len();
        cache
    }

    /// Returns the ids found plus the ids whose lookup batch failed.
    fn find_existing<'s>(
        &self,
        stable_ids: &[&'s str],
        stats: &mut ResolutionStats,
    ) -> (HashMap<String, CatalogId>, HashSet<&'s str>) {
        let mut mapping = HashMap::new();
        let mut unknown = HashSet::new();
        for (batch, group) in stable_ids.chunks(self.bulk_limit).enumerate() {
            match self.catalog.find_entities(group) {
                Ok(entries) => {
                    for entry in entries {
                        mapping.insert(entry.stable_id, entry.catalog_id);
                    }
                }
                Err(err) => {
                    warn!(batch, ids = group.len(), error = %err, "catalog lookup batch failed");
                    stats.failed_batches += 1;
                    unknown.extend(group.iter().copied());
                }
            }
        }
        stats.existing = mapping.len();
        (mapping, unknown)
    }

    fn create_missing(
        &self,
        missing: &[&str],
        mapping: &mut HashMap<String, CatalogId>,
        stats: &mut ResolutionStats,
    ) {
        for (batch, group) in missing.chunks(self.bulk_limit).enumerate() {
            match self.catalog.create_entities(group) {
                Ok(entries) => {
                    for entry in entries {
                        mapping.insert(entry.stable_id, entry.catalog_id);
                        stats.created += 1;
                    }
                }
                Err(err) => {
                    warn!(batch, ids = group.len(), error = %err, "catalog create batch failed");
                    stats.failed_batches += 1;
                }
            }
        }
    }
}

fn distinct_in_order<'s>(ids: impl Iterator<Item = &'s str>) -> Vec<&'s str> {
    let mut seen = HashSet::new();
    ids.filter(|id| seen.insert(*id)).collect()
}
