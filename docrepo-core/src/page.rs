//! Pagination and result types for managing query results.
//!
//! This module provides the [`PageRequest`] describing which window of a sorted result
//! set to read, and the [`Page`] struct carrying one window plus navigation metadata.

use serde::{Deserialize, Serialize};

use crate::query::Sort;

/// Default number of documents per page.
pub const DEFAULT_PAGE_SIZE: u64 = 50;

/// A single page of paginated results.
///
/// This struct represents a subset of results from a larger dataset,
/// along with metadata for navigating through the pages.
///
/// # Type Parameters
///
/// * `T` - The type of items contained in this page
///
/// # Example
///
/// ```ignore
/// use docrepo::page::Page;
///
/// let page: Page<String> = Page::builder(vec!["item1".to_string()])
///     .with_count(100)
///     .with_next_page(Some(2))
///     .build();
///
/// assert_eq!(page.items.len(), 1);
/// assert_eq!(page.count, 100);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// The items contained in this page.
    pub items: Vec<T>,
    /// Total count of matching items across all pages.
    pub count: u64,
    /// The next page number (if more pages exist).
    pub next_page: Option<u64>,
    /// The previous page number (if this is not the first page).
    pub previous_page: Option<u64>,
}

impl<T> Page<T> {
    /// Creates a new builder for constructing a page with custom settings.
    pub fn builder(items: Vec<T>) -> PageBuilder<T> {
        PageBuilder::new(items)
    }
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            count: 0,
            next_page: None,
            previous_page: None,
        }
    }
}

/// Builder for constructing [`Page`] instances with fluent API.
pub struct PageBuilder<T> {
    items: Vec<T>,
    count: u64,
    next_page: Option<u64>,
    previous_page: Option<u64>,
}

impl<T> PageBuilder<T> {
    /// Creates a new builder with the given items.
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            count: 0,
            next_page: None,
            previous_page: None,
        }
    }

    /// Sets the total count of items across all pages.
    pub fn with_count(mut self, count: u64) -> Self {
        self.count = count;
        self
    }

    /// Sets the next page number (or `None` if this is the last page).
    pub fn with_next_page(mut self, next_page: Option<u64>) -> Self {
        self.next_page = next_page;
        self
    }

    /// Sets the previous page number (or `None` if this is the first page).
    pub fn with_previous_page(mut self, previous_page: Option<u64>) -> Self {
        self.previous_page = previous_page;
        self
    }

    /// Builds and returns the final [`Page`] instance.
    pub fn build(self) -> Page<T> {
        Page {
            items: self.items,
            count: self.count,
            next_page: self.next_page,
            previous_page: self.previous_page,
        }
    }
}

/// A window over a sorted result set.
///
/// Defaults to the first [`DEFAULT_PAGE_SIZE`] documents in ascending `_id` order.
///
/// ```ignore
/// use docrepo::{page::PageRequest, query::Sort};
///
/// let request = PageRequest::new().sorted_by(Sort::asc("Nested.SomeValue")).take(2);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest {
    /// Sort applied before skipping; `None` sorts by `_id` ascending.
    pub sort: Option<Sort>,
    /// Number of documents to skip.
    pub skip: u64,
    /// Maximum number of documents to return.
    pub take: u64,
}

impl PageRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// The 1-indexed page `number` of `size` documents.
    pub fn page(number: u64, size: u64) -> Self {
        Self {
            sort: None,
            skip: number.saturating_sub(1).saturating_mul(size),
            take: size,
        }
    }

    pub fn sorted_by(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    pub fn take(mut self, take: u64) -> Self {
        self.take = take;
        self
    }

    /// The 1-indexed page number this request starts on.
    pub fn page_number(&self) -> u64 {
        match self.take {
            0 => 1,
            take => self.skip / take + 1,
        }
    }

    /// Wraps the items read for this request into a [`Page`] with navigation metadata.
    pub fn paginate<T>(&self, items: Vec<T>, count: u64) -> Page<T> {
        let number = self.page_number();
        let end = self.skip.saturating_add(items.len() as u64);

        Page::builder(items)
            .with_count(count)
            .with_next_page((end < count).then_some(number + 1))
            .with_previous_page((number > 1).then(|| number - 1))
            .build()
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            sort: None,
            skip: 0,
            take: DEFAULT_PAGE_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_first_page_of_fifty() {
        let request = PageRequest::default();

        assert_eq!(request.skip, 0);
        assert_eq!(request.take, 50);
        assert_eq!(request.page_number(), 1);
    }

    #[test]
    fn page_number_maps_to_skip() {
        assert_eq!(PageRequest::page(3, 20).skip, 40);
        assert_eq!(PageRequest::page(0, 20).skip, 0);
    }

    #[test]
    fn huge_page_numbers_saturate() {
        let request = PageRequest::page(u64::MAX, u64::MAX);

        assert_eq!(request.skip, u64::MAX);
        assert_eq!(request.page_number(), 2);
    }

    #[test]
    fn paginate_sets_navigation() {
        let page = PageRequest::page(2, 10).paginate((11..=20).collect::<Vec<_>>(), 35);

        assert_eq!(page.count, 35);
        assert_eq!(page.next_page, Some(3));
        assert_eq!(page.previous_page, Some(1));
    }

    #[test]
    fn last_page_has_no_next() {
        let page = PageRequest::page(4, 10).paginate(vec![1, 2, 3, 4, 5], 35);

        assert_eq!(page.next_page, None);
        assert_eq!(page.previous_page, Some(3));
    }
}
