//! Global-to-page offset translation.

/// Characters inserted between consecutive pages when they are joined.
pub const PAGE_SEPARATOR: &str = "\n\n";
/// Length of [`PAGE_SEPARATOR`] in characters.
pub const PAGE_SEPARATOR_CHARS: usize = 2;

/// Position of a global offset inside a single page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagePosition {
    /// Zero-based page number.
    pub page: usize,
    /// Character offset from the first character of that page.
    pub page_offset: usize,
}

/// Cumulative character boundaries, one per page plus a leading zero.
///
/// `boundaries[i]` is the global character offset where page `i` starts when
/// all pages are joined with [`PAGE_SEPARATOR`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetMap {
    boundaries: Vec<usize>,
}

impl OffsetMap {
    /// An empty map describing a document with no pages.
    pub fn new() -> Self {
        Self {
            boundaries: vec![0],
        }
    }

    /// Records the next page, given its length in characters.
    pub fn push_page(&mut self, page_chars: usize) {
        let start = self.end();
        self.boundaries.push(start + page_chars + PAGE_SEPARATOR_CHARS);
    }

    /// Global offset just past the last recorded page and its separator.
    pub fn end(&self) -> usize {
        self.boundaries.last().copied().unwrap_or(0)
    }

    /// Number of pages recorded.
    pub fn page_count(&self) -> usize {
        self.boundaries.len() - 1
    }

    /// Raw boundary table.
    pub fn boundaries(&self) -> &[usize] {
        &self.boundaries
    }

    /// Global offset at which `page` begins.
    pub fn page_start(&self, page: usize) -> Option<usize> {
        (page < self.page_count()).then(|| self.boundaries[page])
    }

    /// Maps a global character offset to its page and in-page offset.
    ///
    /// Returns `None` when the offset lies past the last page.
    pub fn reconcile(&self, offset: usize) -> Option<PagePosition> {
        if offset >= self.end() {
            return None;
        }
        // Boundaries are strictly increasing and start at 0, so the insertion
        // point is at least 1 here.
        let page = self.boundaries.partition_point(|&start| start <= offset) - 1;
        Some(PagePosition {
            page,
            page_offset: offset - self.boundaries[page],
        })
    }
}

impl Default for OffsetMap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map_for(lengths: &[usize]) -> OffsetMap {
        let mut map = OffsetMap::new();
        for &len in lengths {
            map.push_page(len);
        }
        map
    }

    #[test]
    fn boundaries_include_separator() {
        let map = map_for(&[500, 10, 0]);
        assert_eq!(map.boundaries(), &[0, 502, 514, 516]);
        assert_eq!(map.page_count(), 3);
        assert_eq!(map.page_start(1), Some(502));
        assert_eq!(map.page_start(3), None);
    }

    #[test]
    fn reconciles_into_owning_page() {
        let map = map_for(&[500, 10]);
        assert_eq!(
            map.reconcile(10),
            Some(PagePosition {
                page: 0,
                page_offset: 10
            })
        );
        assert_eq!(
            map.reconcile(502),
            Some(PagePosition {
                page: 1,
                page_offset: 0
            })
        );
        assert_eq!(
            map.reconcile(511),
            Some(PagePosition {
                page: 1,
                page_offset: 9
            })
        );
    }

    #[test]
    fn separator_offsets_belong_to_preceding_page() {
        let map = map_for(&[4, 4]);
        assert_eq!(map.reconcile(5).map(|pos| pos.page), Some(0));
        assert_eq!(map.reconcile(5).map(|pos| pos.page_offset), Some(5));
    }

    #[test]
    fn rejects_offsets_past_the_end() {
        let map = map_for(&[4]);
        assert_eq!(map.reconcile(6), None);
        assert_eq!(OffsetMap::new().reconcile(0), None);
    }
}
