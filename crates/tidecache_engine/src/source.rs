//! Source capability: the authoritative remote view of a collection.

use crate::error::{SourceError, SourceResult};
use async_trait::async_trait;
use std::marker::PhantomData;
use tidecache_storage::Identifiable;
use tracing::{debug, warn};

/// A remote data source.
///
/// This trait abstracts the network layer. The engine never looks inside a
/// fetch: URL templating, HTTP and payload decoding all belong to the
/// implementor.
///
/// Every call returns the full authoritative collection; the engine makes
/// no stale-cache assumptions when asking for it.
#[async_trait]
pub trait DataSource<M: Identifiable>: Send + Sync {
    /// Fetches the full collection.
    async fn fetch(&self) -> SourceResult<Vec<M>>;
}

/// A remote source that serves its collection one page at a time.
#[async_trait]
pub trait PageSource<M: Identifiable>: Send + Sync {
    /// Fetches at most `limit` models starting at `offset`.
    async fn fetch_page(&self, offset: usize, limit: usize) -> SourceResult<Vec<M>>;
}

/// Default page size for [`PaginatedSource`].
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Default upper bound on pages requested by one [`PaginatedSource`] fetch.
pub const DEFAULT_MAX_PAGES: usize = 10_000;

/// Adapts a [`PageSource`] into a [`DataSource`].
///
/// Pages are requested in order until a page shorter than the page size
/// comes back; the concatenation is the authoritative collection. A failure
/// on any page fails the whole fetch, and so does a collection that is still
/// returning full pages after `max_pages` requests.
pub struct PaginatedSource<M, P> {
    pages: P,
    page_size: usize,
    max_pages: usize,
    _model: PhantomData<fn() -> M>,
}

impl<M, P> PaginatedSource<M, P> {
    /// Wraps `pages`, requesting `page_size` models at a time.
    pub fn new(pages: P, page_size: usize) -> Self {
        Self {
            pages,
            page_size: page_size.max(1),
            max_pages: DEFAULT_MAX_PAGES,
            _model: PhantomData,
        }
    }

    /// Sets the maximum number of pages one fetch may request.
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    /// Wraps `pages` with [`DEFAULT_PAGE_SIZE`].
    pub fn with_default_page_size(pages: P) -> Self {
        Self::new(pages, DEFAULT_PAGE_SIZE)
    }

    /// Returns the page size.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Returns the page limit.
    pub fn max_pages(&self) -> usize {
        self.max_pages
    }
}

#[async_trait]
impl<M, P> DataSource<M> for PaginatedSource<M, P>
where
    M: Identifiable,
    P: PageSource<M>,
{
    async fn fetch(&self) -> SourceResult<Vec<M>> {
        let mut models = Vec::new();

        for _ in 0..self.max_pages {
            let page = self.pages.fetch_page(models.len(), self.page_size).await?;
            let has_more = page.len() >= self.page_size;
            models.extend(page);

            if !has_more {
                debug!(models = models.len(), page_size = self.page_size, "paginated fetch complete");
                return Ok(models);
            }
        }

        warn!(
            models = models.len(),
            max_pages = self.max_pages,
            "paginated source never returned a short page"
        );
        Err(SourceError::Decoding(format!(
            "pagination did not end within {} pages",
            self.max_pages
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    struct Row(String);

    impl Identifiable for Row {
        fn identifier(&self) -> &str {
            &self.0
        }
    }

    struct Pages {
        rows: Vec<Row>,
        requests: Mutex<Vec<(usize, usize)>>,
        fail_at: Option<usize>,
    }

    impl Pages {
        fn new(count: usize) -> Self {
            Self {
                rows: (0..count).map(|i| Row(format!("r{i}"))).collect(),
                requests: Mutex::new(Vec::new()),
                fail_at: None,
            }
        }
    }

    #[async_trait]
    impl PageSource<Row> for Pages {
        async fn fetch_page(&self, offset: usize, limit: usize) -> SourceResult<Vec<Row>> {
            self.requests.lock().push((offset, limit));
            if self.fail_at == Some(offset) {
                return Err(SourceError::transport_retryable("connection reset"));
            }
            Ok(self.rows.iter().skip(offset).take(limit).cloned().collect())
        }
    }

    #[tokio::test]
    async fn walks_pages_until_short_page() {
        let source = PaginatedSource::new(Pages::new(25), 10);
        let rows = source.fetch().await.unwrap();

        assert_eq!(rows.len(), 25);
        assert_eq!(rows[24], Row("r24".into()));
        assert_eq!(
            *source.pages.requests.lock(),
            vec![(0, 10), (10, 10), (20, 10)]
        );
    }

    #[tokio::test]
    async fn exact_multiple_needs_trailing_empty_page() {
        let source = PaginatedSource::new(Pages::new(20), 10);
        let rows = source.fetch().await.unwrap();

        assert_eq!(rows.len(), 20);
        assert_eq!(source.pages.requests.lock().len(), 3);
    }

    #[tokio::test]
    async fn failure_on_any_page_fails_fetch() {
        let mut pages = Pages::new(25);
        pages.fail_at = Some(10);
        let source = PaginatedSource::new(pages, 10);

        let result = source.fetch().await;
        assert!(matches!(result, Err(SourceError::Transport { .. })));
    }

    struct Endless;

    #[async_trait]
    impl PageSource<Row> for Endless {
        async fn fetch_page(&self, _offset: usize, limit: usize) -> SourceResult<Vec<Row>> {
            Ok((0..limit).map(|i| Row(format!("r{i}"))).collect())
        }
    }

    #[tokio::test]
    async fn source_ignoring_offset_hits_page_limit() {
        let source = PaginatedSource::new(Endless, 10).with_max_pages(4);
        let result = source.fetch().await;
        assert!(matches!(result, Err(SourceError::Decoding(_))));
    }

    #[tokio::test]
    async fn last_allowed_page_may_be_short() {
        let source = PaginatedSource::new(Pages::new(25), 10).with_max_pages(3);
        assert_eq!(source.fetch().await.unwrap().len(), 25);
        assert_eq!(source.max_pages(), 3);
    }

    #[test]
    fn zero_page_size_is_clamped() {
        let source: PaginatedSource<Row, _> = PaginatedSource::new(Pages::new(0), 0);
        assert_eq!(source.page_size(), 1);
    }
}
