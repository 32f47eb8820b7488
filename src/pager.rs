use serde::Serialize;

/// A bounded window over an ordered collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pager {
    pub page: u64,
    pub page_size: u64,
    pub total: u64,
    pub offset: u64,
    /// False when the requested page lies outside the collection or the
    /// inputs are zero. `offset` must not be used in that case.
    pub is_valid: bool,
}

impl Pager {
    pub fn new(page: u64, page_size: u64, total: u64) -> Self {
        let offset = page.saturating_sub(1).saturating_mul(page_size);
        let is_valid = page >= 1
            && page_size >= 1
            && if total == 0 { page == 1 } else { offset < total };

        Pager {
            page,
            page_size,
            total,
            offset,
            is_valid,
        }
    }

    /// Number of pages, never less than one.
    pub fn total_pages(&self) -> u64 {
        if self.page_size == 0 || self.total == 0 {
            return 1;
        }
        self.total.div_ceil(self.page_size)
    }

    /// Exclusive end of the window, clamped to the collection size.
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.page_size).min(self.total)
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages()
    }

    pub fn prev_page(&self) -> Option<u64> {
        self.has_prev().then(|| self.page - 1)
    }

    pub fn next_page(&self) -> Option<u64> {
        self.has_next().then(|| self.page + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_collection_is_valid_on_first_page() {
        let pager = Pager::new(1, 10, 0);
        assert!(pager.is_valid);
        assert_eq!(pager.offset, 0);
        assert_eq!(pager.total_pages(), 1);
        assert!(!pager.has_next());
    }

    #[test]
    fn empty_collection_is_invalid_past_first_page() {
        assert!(!Pager::new(2, 10, 0).is_valid);
    }

    #[test]
    fn last_partial_page_is_valid() {
        let pager = Pager::new(3, 10, 25);
        assert!(pager.is_valid);
        assert_eq!(pager.offset, 20);
        assert_eq!(pager.end(), 25);
        assert_eq!(pager.prev_page(), Some(2));
        assert_eq!(pager.next_page(), None);
    }

    #[test]
    fn page_past_the_end_is_invalid() {
        assert!(!Pager::new(4, 10, 25).is_valid);
        assert!(!Pager::new(2, 10, 10).is_valid);
    }

    #[test]
    fn zero_inputs_are_invalid() {
        assert!(!Pager::new(0, 10, 25).is_valid);
        assert!(!Pager::new(1, 0, 25).is_valid);
    }

    #[test]
    fn middle_page_navigation() {
        let pager = Pager::new(2, 10, 25);
        assert_eq!(pager.total_pages(), 3);
        assert_eq!(pager.prev_page(), Some(1));
        assert_eq!(pager.next_page(), Some(3));
        assert_eq!(pager.end(), 20);
    }
}
