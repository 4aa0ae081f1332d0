use std::sync::Arc;

use parking_lot::Mutex;

use crate::{
    api::CitiesApi,
    cancel::{self, CancelHandle},
    error::ApiError,
    model::{CitiesPage, CityInfo, Links},
    query::{CityParams, DEFAULT_PAGE_SIZE, parse_link},
    retry::{RetryPolicy, retry_with},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ListPhase {
    #[default]
    Idle,
    Fetching,
    /// A superseded request is being cancelled.
    Cancelled,
}

/// The paginated city list as seen by readers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CityListState {
    pub items: Vec<CityInfo>,
    /// `None` until the server has reported a count.
    pub total: Option<u64>,
    pub links: Links,
    pub filter: String,
    pub phase: ListPhase,
}

impl CityListState {
    fn append(&mut self, page: &CitiesPage, params: &CityParams) {
        self.items.extend(page.data.iter().cloned());
        self.total = Some(page.total);
        self.links = page.links.clone();
        self.filter = page
            .filter
            .clone()
            .or_else(|| params.filter.clone())
            .unwrap_or_default();
    }

    fn reset(&mut self) {
        self.items.clear();
        self.total = None;
        self.links = Links::default();
        self.filter.clear();
    }
}

/// Result of a list fetch that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The page was appended to the list.
    Committed(CitiesPage),
    /// A newer fetch was issued while this one was in flight; the page was
    /// not applied.
    Discarded(CitiesPage),
    /// The fetch was cancelled in favour of a newer one.
    Canceled,
}

impl FetchOutcome {
    pub fn is_canceled(&self) -> bool {
        matches!(self, FetchOutcome::Canceled)
    }

    pub fn page(&self) -> Option<&CitiesPage> {
        match self {
            FetchOutcome::Committed(page) | FetchOutcome::Discarded(page) => Some(page),
            FetchOutcome::Canceled => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Cursor {
    /// Follow `next`, else re-read `last` when going back, else first page.
    Auto,
    Next,
    Previous,
    /// Drop the current session and load the first page.
    Restart,
}

#[derive(Debug)]
struct PendingFetch {
    request: u64,
    handle: CancelHandle,
}

#[derive(Debug, Default)]
struct Inner {
    list: CityListState,
    pending: Option<PendingFetch>,
    last_request: u64,
}

impl Inner {
    fn params_for(&self, cursor: Cursor, page_size: u32) -> CityParams {
        let links = &self.list.links;
        let first_page = || CityParams::first_page(page_size);

        match cursor {
            Cursor::Auto => match (&links.next, &links.prev) {
                (Some(next), _) => parse_link(next),
                (None, Some(_)) => parse_link(&links.last),
                (None, None) => first_page(),
            },
            Cursor::Restart => first_page(),
            Cursor::Next => links.next.as_deref().map(parse_link).unwrap_or_else(|| {
                first_page().with_filter(Some(self.list.filter.as_str()))
            }),
            Cursor::Previous => links.prev.as_deref().map(parse_link).unwrap_or_else(|| {
                first_page().with_filter(Some(self.list.filter.as_str()))
            }),
        }
    }

    /// Install a new request, or hand back the one that has to be cancelled
    /// first. A restart clears the list under the same lock as the install.
    fn begin(
        &mut self,
        cursor: Cursor,
        filter: Option<&str>,
        page_size: u32,
    ) -> Result<(u64, CityParams, cancel::CancelSignal), PendingFetch> {
        if let Some(previous) = self.pending.take() {
            self.list.phase = ListPhase::Cancelled;
            return Err(previous);
        }

        if let Cursor::Restart = cursor {
            self.list.reset();
        }
        let params = self.params_for(cursor, page_size).with_filter(filter);
        let (request, signal) = self.install();
        Ok((request, params, signal))
    }

    fn install(&mut self) -> (u64, cancel::CancelSignal) {
        let (handle, signal) = cancel::pair();
        self.last_request += 1;
        let request = self.last_request;
        self.pending = Some(PendingFetch { request, handle });
        self.list.phase = ListPhase::Fetching;
        (request, signal)
    }

    fn is_current(&self, request: u64) -> bool {
        self.pending.as_ref().is_some_and(|p| p.request == request)
    }
}

/// Paginated, filterable city list with at most one list request in flight.
#[derive(Debug, Clone)]
pub struct CityListStore {
    api: Arc<dyn CitiesApi>,
    page_size: u32,
    inner: Arc<Mutex<Inner>>,
}

impl CityListStore {
    pub fn new(api: Arc<dyn CitiesApi>) -> Self {
        Self::with_page_size(api, DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(api: Arc<dyn CitiesApi>, page_size: u32) -> Self {
        Self {
            api,
            page_size: page_size.max(1),
            inner: Arc::default(),
        }
    }

    /// Drop all loaded cities, links and the filter.
    ///
    /// An in-flight request is left alone; the next fetch cancels it.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.list.reset();
        if inner.pending.is_none() {
            inner.list.phase = ListPhase::Idle;
        }
    }

    /// Start a new filter session: clear the list and load its first page.
    pub async fn search(&self, filter: &str) -> Result<FetchOutcome, ApiError> {
        self.fetch(Cursor::Restart, Some(filter)).await
    }

    /// Like [`search`](Self::search), retrying failed page loads with `policy`.
    ///
    /// A cancelled search is not a failure and is not retried.
    pub async fn search_with_retry(
        &self,
        filter: &str,
        policy: RetryPolicy,
    ) -> Result<FetchOutcome, ApiError> {
        retry_with(policy, || self.fetch(Cursor::Restart, Some(filter))).await
    }

    pub async fn fetch_page(&self, filter: Option<&str>) -> Result<FetchOutcome, ApiError> {
        self.fetch(Cursor::Auto, filter).await
    }

    /// Load the page after the last one, or the first page when there is no
    /// `next` link yet.
    pub async fn fetch_next(&self) -> Result<FetchOutcome, ApiError> {
        self.fetch(Cursor::Next, None).await
    }

    /// Load the page before the first one, or the first page when there is
    /// no `prev` link.
    pub async fn fetch_previous(&self) -> Result<FetchOutcome, ApiError> {
        self.fetch(Cursor::Previous, None).await
    }

    async fn fetch(&self, cursor: Cursor, filter: Option<&str>) -> Result<FetchOutcome, ApiError> {
        let (request, params, signal) = loop {
            let begun = self.inner.lock().begin(cursor, filter, self.page_size);
            let previous = match begun {
                Ok(installed) => break installed,
                Err(previous) => previous,
            };

            tracing::debug!(request = previous.request, "canceling superseded cities request");
            previous.handle.cancel().await;
        };

        tracing::debug!(request, ?params, "fetching cities");
        let result = self.api.get_cities(&params, Some(signal)).await;

        let mut inner = self.inner.lock();
        if !inner.is_current(request) {
            tracing::debug!(request, "dropping superseded cities response");
            return Ok(match result {
                Ok(page) => FetchOutcome::Discarded(page),
                Err(_) => FetchOutcome::Canceled,
            });
        }

        inner.pending = None;
        inner.list.phase = ListPhase::Idle;
        match result {
            Ok(page) => {
                inner.list.append(&page, &params);
                tracing::debug!(
                    request,
                    received = page.data.len(),
                    loaded = inner.list.items.len(),
                    "cities page committed"
                );
                Ok(FetchOutcome::Committed(page))
            }
            Err(ApiError::Canceled) => Ok(FetchOutcome::Canceled),
            Err(err) => Err(err),
        }
    }

    pub fn cities(&self) -> Vec<CityInfo> {
        self.inner.lock().list.items.clone()
    }

    pub fn total(&self) -> Option<u64> {
        self.inner.lock().list.total
    }

    pub fn next_link(&self) -> Option<String> {
        self.inner.lock().list.links.next.clone()
    }

    pub fn prev_link(&self) -> Option<String> {
        self.inner.lock().list.links.prev.clone()
    }

    pub fn last_link(&self) -> String {
        self.inner.lock().list.links.last.clone()
    }

    pub fn filter(&self) -> String {
        self.inner.lock().list.filter.clone()
    }

    pub fn phase(&self) -> ListPhase {
        self.inner.lock().list.phase
    }

    pub fn is_fetching(&self) -> bool {
        self.inner.lock().pending.is_some()
    }

    pub fn snapshot(&self) -> CityListState {
        self.inner.lock().list.clone()
    }
}
