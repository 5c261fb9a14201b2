//! Runs entity analysis over every chunk of a document.

use anyhow::{Context, Result};
use tracing::debug;

use crate::chunker::ChunkPlan;
use crate::clients::EntityAnalyzer;
use crate::model::{Mention, RawEntity};

/// Analyzes each chunk in order and returns linked entities with global offsets.
///
/// Entities without an encyclopedia reference are discarded here.
pub fn extract_entities(analyzer: &dyn EntityAnalyzer, plan: &ChunkPlan) -> Result<Vec<RawEntity>> {
    let mut entities = Vec::new();
    for chunk in &plan.chunks {
        let analyzed = analyzer.analyze(&chunk.text).with_context(|| {
            format!(
                "entity analysis failed for chunk {} (pages {}-{})",
                chunk.chunk_id, chunk.first_page, chunk.last_page
            )
        })?;
        let total = analyzed.len();
        let before = entities.len();
        for entity in analyzed {
            let Some(external_ref) = entity.external_ref else {
                continue;
            };
            let mentions = entity
                .mentions
                .into_iter()
                .map(|mention| Mention {
                    content: mention.content,
                    global_offset: chunk.char_offset + mention.begin_offset,
                })
                .collect();
            entities.push(RawEntity {
                name: entity.name,
                external_ref,
                salience: entity.salience,
                mentions,
            });
        }
        debug!(
            chunk = chunk.chunk_id,
            analyzed = total,
            linked = entities.len() - before,
            "chunk analyzed"
        );
    }
    Ok(entities)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::build_chunks;
    use crate::clients::{AnalyzedEntity, AnalyzedMention};
    use crate::model::Page;
    use std::cell::RefCell;

    struct EchoAnalyzer {
        calls: RefCell<Vec<String>>,
    }

    impl EntityAnalyzer for EchoAnalyzer {
        fn analyze(&self, text: &str) -> Result<Vec<AnalyzedEntity>> {
            self.calls.borrow_mut().push(text.to_string());
            Ok(vec![
                AnalyzedEntity {
                    name: "linked".into(),
                    external_ref: Some("https://en.wikipedia.org/wiki/Linked".into()),
                    salience: 0.5,
                    mentions: vec![AnalyzedMention {
                        content: "x".into(),
                        begin_offset: 1,
                    }],
                },
                AnalyzedEntity {
                    name: "plain".into(),
                    external_ref: None,
                    salience: 0.9,
                    mentions: Vec::new(),
                },
            ])
        }
    }

    #[test]
    fn shifts_offsets_by_chunk_start() {
        let pages = vec![Page::new(0, "aaaa"), Page::new(1, "bbbb")];
        let plan = build_chunks(&pages, 4).expect("chunk");
        let analyzer = EchoAnalyzer {
            calls: RefCell::new(Vec::new()),
        };
        let entities = extract_entities(&analyzer, &plan).expect("extract");

        assert_eq!(*analyzer.calls.borrow(), vec!["aaaa", "bbbb"]);
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].mentions[0].global_offset, 1);
        assert_eq!(entities[1].mentions[0].global_offset, 7);
        assert!(entities.iter().all(|e| e.name == "linked"));
    }
}
