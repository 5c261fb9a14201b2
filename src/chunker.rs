//! Splits page text into byte-bounded chunks for entity analysis.

use thiserror::Error;

use crate::model::Page;
use crate::offsets::{OffsetMap, PAGE_SEPARATOR};

/// Contiguous run of pages submitted as one analysis call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Monotonic chunk identifier within the document.
    pub chunk_id: usize,
    /// Pages joined with the page separator.
    pub text: String,
    /// Global character offset of the first character of `text`.
    pub char_offset: usize,
    /// Position of the first page in this chunk, the same numbering `OffsetMap::reconcile` returns.
    pub first_page: usize,
    /// Position of the last page in this chunk.
    pub last_page: usize,
}

/// Chunks for one document plus the offset table describing its pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPlan {
    /// Chunks in page order.
    pub chunks: Vec<Chunk>,
    /// Page boundaries in global characters.
    pub offsets: OffsetMap,
}

/// Errors surfaced while chunking a document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChunkError {
    /// A single page does not fit in one analysis call.
    #[error("page {page} is {bytes} bytes, above the {limit} byte analysis limit")]
    PageTooLarge {
        /// Position of the offending page.
        page: usize,
        /// Encoded size of that page.
        bytes: usize,
        /// Configured byte limit.
        limit: usize,
    },
}

/// Partitions ordered pages into chunks of at most `byte_limit` UTF-8 bytes.
///
/// Pages are numbered by their position in `pages`; `Page::index` is ignored.
///
/// Separator bytes count toward the limit, so every chunk's `text.len()` stays
/// within it. A chunk may land exactly on the limit.
pub fn build_chunks(pages: &[Page], byte_limit: usize) -> Result<ChunkPlan, ChunkError> {
    let mut offsets = OffsetMap::new();
    let mut chunks = Vec::new();
    let mut pending = Pending::default();

    for (idx, page) in pages.iter().enumerate() {
        let page_start = offsets.end();
        offsets.push_page(page.text.chars().count());

        let bytes = page.text.len();
        if bytes > byte_limit {
            return Err(ChunkError::PageTooLarge {
                page: idx,
                bytes,
                limit: byte_limit,
            });
        }

        if pending.bytes_with(bytes) > byte_limit {
            flush_chunk(&mut chunks, &mut pending, pages);
            pending.char_offset = page_start;
        }
        pending.push(idx, bytes);
    }

    flush_chunk(&mut chunks, &mut pending, pages);
    Ok(ChunkPlan { chunks, offsets })
}

#[derive(Default)]
struct Pending {
    pages: Vec<usize>,
    bytes: usize,
    char_offset: usize,
}

impl Pending {
    fn bytes_with(&self, page_bytes: usize) -> usize {
        if self.pages.is_empty() {
            page_bytes
        } else {
            self.bytes + PAGE_SEPARATOR.len() + page_bytes
        }
    }

    fn push(&mut self, idx: usize, page_bytes: usize) {
        self.bytes = self.bytes_with(page_bytes);
        self.pages.push(idx);
    }
}

fn flush_chunk(chunks: &mut Vec<Chunk>, pending: &mut Pending, pages: &[Page]) {
    let (Some(&first), Some(&last)) = (pending.pages.first(), pending.pages.last()) else {
        return;
    };

    let mut text = String::with_capacity(pending.bytes);
    for (i, &page_idx) in pending.pages.iter().enumerate() {
        if i > 0 {
            text.push_str(PAGE_SEPARATOR);
        }
        text.push_str(&pages[page_idx].text);
    }

    chunks.push(Chunk {
        chunk_id: chunks.len(),
        text,
        char_offset: pending.char_offset,
        first_page: first,
        last_page: last,
    });
    pending.pages.clear();
    pending.bytes = 0;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pages(texts: &[&str]) -> Vec<Page> {
        texts
            .iter()
            .enumerate()
            .map(|(idx, text)| Page::new(idx, *text))
            .collect()
    }

    #[test]
    fn small_document_is_one_chunk() {
        let text = "a".repeat(500);
        let plan = build_chunks(&pages(&[&text]), 1_000_000).expect("chunk");
        assert_eq!(plan.chunks.len(), 1);
        assert_eq!(plan.chunks[0].char_offset, 0);
        assert_eq!(plan.offsets.boundaries(), &[0, 502]);
    }

    #[test]
    fn flushes_when_next_page_overflows() {
        let plan = build_chunks(&pages(&["aaaa", "bbbb", "cccc"]), 10).expect("chunk");
        let texts: Vec<&str> = plan.chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["aaaa\n\nbbbb", "cccc"]);
        assert_eq!(plan.chunks[1].char_offset, 12);
        assert_eq!(plan.chunks[1].first_page, 2);
        assert_eq!(plan.offsets.boundaries(), &[0, 6, 12, 18]);
    }

    #[test]
    fn chunk_may_sit_exactly_on_limit() {
        let plan = build_chunks(&pages(&["aaaa", "bbbb"]), 10).expect("chunk");
        assert_eq!(plan.chunks.len(), 1);
        assert_eq!(plan.chunks[0].text.len(), 10);
    }

    #[test]
    fn limit_counts_bytes_not_chars() {
        // Each "é" is two bytes.
        let plan = build_chunks(&pages(&["éé", "éé"]), 9).expect("chunk");
        assert_eq!(plan.chunks.len(), 2);
        assert_eq!(plan.chunks[1].char_offset, 4);
    }

    #[test]
    fn oversized_page_is_rejected() {
        let err = build_chunks(&pages(&["ok", "toolong"]), 5).unwrap_err();
        assert_eq!(
            err,
            ChunkError::PageTooLarge {
                page: 1,
                bytes: 7,
                limit: 5
            }
        );
    }

    #[test]
    fn no_pages_means_no_chunks() {
        let plan = build_chunks(&[], 10).expect("chunk");
        assert!(plan.chunks.is_empty());
        assert_eq!(plan.offsets.page_count(), 0);
    }

    #[test]
    fn pages_are_numbered_by_position() {
        let pages = vec![Page::new(3, "aaaa"), Page::new(7, "bbbb"), Page::new(9, "toolong")];
        let err = build_chunks(&pages, 6).unwrap_err();
        assert_eq!(
            err,
            ChunkError::PageTooLarge {
                page: 2,
                bytes: 7,
                limit: 6
            }
        );

        let plan = build_chunks(&pages[..2], 6).expect("chunk");
        let spans: Vec<(usize, usize)> = plan
            .chunks
            .iter()
            .map(|c| (c.first_page, c.last_page))
            .collect();
        assert_eq!(spans, vec![(0, 0), (1, 1)]);
        let start = plan.offsets.page_start(1).expect("page 1");
        assert_eq!(plan.offsets.reconcile(start).map(|p| p.page), Some(1));
    }
}
