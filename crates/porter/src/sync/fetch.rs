//! Lazy, page-at-a-time enumeration of source records.

use async_trait::async_trait;

use super::progress::{EventCallback, MigrationEvent, emit};
use crate::error::FetchError;
use crate::platform::{RemoteError, SourceApi, SourceIssue, SourceQueue, SourceUser};

/// Default number of records requested per page.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// One page-addressed source listing.
#[async_trait]
pub trait PageSource: Send + Sync {
    type Item: Send;

    /// Name of the listing, used in events and fetch errors.
    fn scope(&self) -> String;

    /// Fetch page `page` (1-indexed) of at most `per_page` records.
    async fn fetch_page(&self, page: u32, per_page: u32) -> Result<Vec<Self::Item>, RemoteError>;
}

/// Walks a [`PageSource`] from page 1 until it runs dry.
///
/// The sequence ends after an empty page, after a short page (fewer records
/// than requested), or right after the first failed page. Each page is
/// requested only when the caller asks for it.
pub struct Paginator<P> {
    source: P,
    page_size: u32,
    next_page: u32,
    total: usize,
    finished: bool,
}

impl<P: PageSource> Paginator<P> {
    pub fn new(source: P, page_size: u32) -> Self {
        Self {
            source,
            page_size: page_size.max(1),
            next_page: 1,
            total: 0,
            finished: false,
        }
    }

    /// Records yielded so far.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Fetch the next non-empty page, or `None` once the listing is exhausted.
    pub async fn next_page(
        &mut self,
        on_event: Option<&EventCallback>,
    ) -> Option<Result<Vec<P::Item>, FetchError>> {
        if self.finished {
            return None;
        }

        let page = self.next_page;
        match self.source.fetch_page(page, self.page_size).await {
            Ok(items) if items.is_empty() => {
                self.finished = true;
                None
            }
            Ok(items) => {
                if items.len() < self.page_size as usize {
                    self.finished = true;
                } else {
                    self.next_page += 1;
                }
                self.total += items.len();
                emit(
                    on_event,
                    MigrationEvent::FetchedPage {
                        scope: self.source.scope(),
                        page,
                        count: items.len(),
                        total_so_far: self.total,
                    },
                );
                Some(Ok(items))
            }
            Err(source) => {
                self.finished = true;
                let scope = self.source.scope();
                tracing::warn!("Fetching page {} of {} failed: {}", page, scope, source);
                emit(
                    on_event,
                    MigrationEvent::FetchFailed {
                        scope: scope.clone(),
                        page,
                        error: source.to_string(),
                    },
                );
                Some(Err(FetchError {
                    scope,
                    page,
                    source,
                }))
            }
        }
    }

    /// Drain the listing into memory.
    ///
    /// Returns whatever was fetched before a failure together with the failure.
    pub async fn collect_all(
        mut self,
        on_event: Option<&EventCallback>,
    ) -> (Vec<P::Item>, Option<FetchError>) {
        let mut items = Vec::new();
        while let Some(page) = self.next_page(on_event).await {
            match page {
                Ok(batch) => items.extend(batch),
                Err(e) => return (items, Some(e)),
            }
        }
        (items, None)
    }
}

/// Source accounts.
pub struct UserPages<'a, S: ?Sized> {
    source: &'a S,
}

impl<'a, S: ?Sized> UserPages<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self { source }
    }
}

#[async_trait]
impl<S: SourceApi + ?Sized> PageSource for UserPages<'_, S> {
    type Item = SourceUser;

    fn scope(&self) -> String {
        "users".to_string()
    }

    async fn fetch_page(&self, page: u32, per_page: u32) -> Result<Vec<SourceUser>, RemoteError> {
        self.source.list_users(page, per_page).await
    }
}

/// Source projects.
pub struct QueuePages<'a, S: ?Sized> {
    source: &'a S,
}

impl<'a, S: ?Sized> QueuePages<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self { source }
    }
}

#[async_trait]
impl<S: SourceApi + ?Sized> PageSource for QueuePages<'_, S> {
    type Item = SourceQueue;

    fn scope(&self) -> String {
        "queues".to_string()
    }

    async fn fetch_page(&self, page: u32, per_page: u32) -> Result<Vec<SourceQueue>, RemoteError> {
        self.source.list_queues(page, per_page).await
    }
}

/// Work items of one source project.
pub struct IssuePages<'a, S: ?Sized> {
    source: &'a S,
    queue: String,
}

impl<'a, S: ?Sized> IssuePages<'a, S> {
    pub fn new(source: &'a S, queue: impl Into<String>) -> Self {
        Self {
            source,
            queue: queue.into(),
        }
    }
}

#[async_trait]
impl<S: SourceApi + ?Sized> PageSource for IssuePages<'_, S> {
    type Item = SourceIssue;

    fn scope(&self) -> String {
        format!("issues:{}", self.queue)
    }

    async fn fetch_page(&self, page: u32, per_page: u32) -> Result<Vec<SourceIssue>, RemoteError> {
        self.source.list_issues(&self.queue, page, per_page).await
    }
}
