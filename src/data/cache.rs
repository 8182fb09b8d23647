//! Query cache
//!
//! Client-side cache of remote reads, keyed by structural `QueryKey`s.
//!
//! # Entry lifecycle
//!
//! ```text
//!   idle ──query──▶ loading ──ok──▶ success ──invalidate──▶ success (stale)
//!                      │                                        │
//!                      └──err──▶ error ◀────────────query───────┘
//! ```
//!
//! - At most one fetch per key is in flight; concurrent callers attach to it.
//! - Fetches run on spawned tasks, so a caller that stops waiting never
//!   cancels the fetch; the result still lands in the cache.
//! - Entry state is published on a `watch` channel per key. Holding a
//!   `QuerySubscription` counts as subscribing; dropping it detaches.
//! - The entry map sits behind an async mutex that is never held while a
//!   fetch runs.

use std::any::Any;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::{Mutex, watch};

use super::keys::QueryKey;
use super::pagination::{Identified, Pages};
use crate::error::AppError;
use crate::metrics::{
    CACHE_DEDUPLICATED_TOTAL, CACHE_ENTRIES, CACHE_HITS_TOTAL, CACHE_INVALIDATIONS_TOTAL,
    CACHE_MISSES_TOTAL,
};

type CachedValue = Arc<dyn Any + Send + Sync>;
type Settled = Result<CachedValue, AppError>;
type Fetcher = Arc<dyn Fn() -> BoxFuture<'static, Settled> + Send + Sync>;

// =============================================================================
// Public state types
// =============================================================================

/// Fetch status of a cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    Idle,
    Loading,
    Success,
    Error,
}

/// Snapshot of an entry, published to subscribers on every transition
#[derive(Debug, Clone)]
pub struct QueryState {
    pub status: QueryStatus,
    /// When data was last installed
    pub updated_at: Option<DateTime<Utc>>,
    /// Cause of the last failed fetch
    pub error: Option<AppError>,
    /// Invalidated since the data was fetched
    pub is_stale: bool,
    pub is_fetching: bool,
    pub has_data: bool,
}

impl QueryState {
    fn idle() -> Self {
        Self {
            status: QueryStatus::Idle,
            updated_at: None,
            error: None,
            is_stale: false,
            is_fetching: false,
            has_data: false,
        }
    }

    /// Settled and not waiting for a refetch
    pub fn is_settled(&self) -> bool {
        !self.is_fetching && matches!(self.status, QueryStatus::Success | QueryStatus::Error)
    }
}

/// Per-call query options
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Age after which cached data is refetched (overrides the cache default)
    pub stale_time: Option<Duration>,
    /// Ignore cached data; an in-flight fetch is still shared
    pub refetch: bool,
}

impl QueryOptions {
    pub fn refetch() -> Self {
        Self {
            refetch: true,
            ..Self::default()
        }
    }
}

// =============================================================================
// Entries
// =============================================================================

struct InFlight {
    id: u64,
    result: watch::Receiver<Option<Settled>>,
}

struct CacheEntry {
    data: Option<CachedValue>,
    error: Option<AppError>,
    status: QueryStatus,
    updated_at: Option<DateTime<Utc>>,
    stale: bool,
    /// Bumped on every invalidation; a fetch compares it on settle
    invalidations: u64,
    in_flight: Option<InFlight>,
    /// Latest fetcher registered by `query`, reused for refetches
    fetcher: Option<Fetcher>,
    state: watch::Sender<QueryState>,
}

impl CacheEntry {
    fn new() -> Self {
        let (state, _) = watch::channel(QueryState::idle());
        Self {
            data: None,
            error: None,
            status: QueryStatus::Idle,
            updated_at: None,
            stale: false,
            invalidations: 0,
            in_flight: None,
            fetcher: None,
            state,
        }
    }

    fn snapshot(&self) -> QueryState {
        QueryState {
            status: self.status,
            updated_at: self.updated_at,
            error: self.error.clone(),
            is_stale: self.stale,
            is_fetching: self.in_flight.is_some(),
            has_data: self.data.is_some(),
        }
    }

    fn publish(&self) {
        self.state.send_replace(self.snapshot());
    }

    fn subscriber_count(&self) -> usize {
        self.state.receiver_count()
    }

    fn is_fresh(&self, stale_time: Option<Duration>) -> bool {
        if self.status != QueryStatus::Success || self.stale {
            return false;
        }
        match (stale_time, self.updated_at) {
            (Some(stale_time), Some(updated_at)) => chrono::Duration::from_std(stale_time)
                .map(|stale_time| Utc::now() - updated_at < stale_time)
                .unwrap_or(true),
            _ => true,
        }
    }

    fn reset(&mut self) {
        self.data = None;
        self.error = None;
        self.status = QueryStatus::Idle;
        self.updated_at = None;
        self.stale = false;
        self.in_flight = None;
        self.publish();
    }
}

fn entry_for<'a>(entries: &'a mut HashMap<QueryKey, CacheEntry>, key: &QueryKey) -> &'a mut CacheEntry {
    let len = entries.len();
    match entries.entry(key.clone()) {
        Entry::Occupied(entry) => entry.into_mut(),
        Entry::Vacant(entry) => {
            CACHE_ENTRIES.set(len as i64 + 1);
            entry.insert(CacheEntry::new())
        }
    }
}

// =============================================================================
// Query Cache
// =============================================================================

struct CacheInner {
    entries: Mutex<HashMap<QueryKey, CacheEntry>>,
    next_fetch_id: AtomicU64,
    default_stale_time: Option<Duration>,
}

/// Query cache shared by every service
///
/// Cloning is cheap; clones share the same entries.
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<CacheInner>,
}

impl QueryCache {
    /// Create new query cache
    ///
    /// # Arguments
    /// * `default_stale_time` - Age after which successful entries are
    ///   refetched; `None` keeps them fresh until invalidated
    pub fn new(default_stale_time: Option<Duration>) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                entries: Mutex::new(HashMap::new()),
                next_fetch_id: AtomicU64::new(1),
                default_stale_time,
            }),
        }
    }

    /// Read through the cache
    ///
    /// Returns fresh cached data without calling `fetcher`. If a fetch for
    /// `key` is in flight, waits for it instead of starting another.
    /// Otherwise runs `fetcher` and installs its result.
    pub async fn query<T, F, Fut>(
        &self,
        key: QueryKey,
        fetcher: F,
        options: QueryOptions,
    ) -> Result<Arc<T>, AppError>
    where
        T: Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, AppError>> + Send + 'static,
    {
        let value = self
            .inner
            .query_erased(&key, erase(fetcher), options)
            .await?;
        downcast(&key, value)
    }

    /// Read the first page of a paginated query through the cache
    ///
    /// `fetch_page` receives the cursor (`None` for the first page).
    /// Refetches after invalidation restart from the first page.
    pub async fn paginated_query<T, F, Fut>(
        &self,
        key: QueryKey,
        fetch_page: F,
        options: QueryOptions,
    ) -> Result<Arc<Pages<T>>, AppError>
    where
        T: Identified + Clone + Send + Sync + 'static,
        F: Fn(Option<String>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<T>, AppError>> + Send + 'static,
    {
        self.query(
            key,
            move || {
                let first = fetch_page(None);
                async move { first.await.map(Pages::first) }
            },
            options,
        )
        .await
    }

    /// Append the next page to a paginated query
    ///
    /// The cursor is the last item ID of the latest page. Returns the
    /// current pages unchanged once a page came back empty. Stale pages are
    /// not extended: the query restarts from its first page instead.
    ///
    /// # Errors
    /// `AppError::State` if the first page has not been loaded.
    pub async fn fetch_next_page<T, F, Fut>(
        &self,
        key: &QueryKey,
        fetch_page: F,
    ) -> Result<Arc<Pages<T>>, AppError>
    where
        T: Identified + Clone + Send + Sync + 'static,
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<Vec<T>, AppError>> + Send + 'static,
    {
        let mut pending = {
            let mut entries = self.inner.entries.lock().await;
            let Some(entry) = entries.get_mut(key) else {
                return Err(AppError::State(format!("{key} has no pages loaded")));
            };

            let attached = entry.in_flight.as_ref().map(|f| f.result.clone());
            match attached {
                Some(pending) => {
                    CACHE_DEDUPLICATED_TOTAL
                        .with_label_values(&[key.kind().as_str()])
                        .inc();
                    pending
                }
                None if entry.data.is_some() && self.outdated(entry) => {
                    let Some(fetcher) = entry.fetcher.clone() else {
                        return Err(AppError::State(format!("{key} has no first-page fetcher")));
                    };
                    CACHE_MISSES_TOTAL
                        .with_label_values(&[key.kind().as_str()])
                        .inc();
                    tracing::debug!(%key, "Pages are stale, restarting from the first page");
                    self.inner.start_fetch(key, entry, fetcher())
                }
                None => {
                    let current: Arc<Pages<T>> = match &entry.data {
                        Some(data) => downcast(key, Arc::clone(data))?,
                        None => {
                            return Err(AppError::State(format!("{key} has no pages loaded")));
                        }
                    };
                    let Some(cursor) = current.next_cursor().map(str::to_string) else {
                        return Ok(current);
                    };

                    tracing::debug!(%key, %cursor, "Fetching next page");
                    let next = fetch_page(cursor);
                    let fetch = async move {
                        let page = next.await?;
                        Ok::<CachedValue, AppError>(Arc::new(current.with_page(page)))
                    }
                    .boxed();
                    self.inner.start_fetch(key, entry, fetch)
                }
            }
        };

        let value = wait_settled(&mut pending).await?;
        downcast(key, value)
    }

    /// Loaded data that must not be extended, either invalidated or past
    /// the default stale time
    fn outdated(&self, entry: &CacheEntry) -> bool {
        entry.stale
            || (entry.status == QueryStatus::Success
                && !entry.is_fresh(self.inner.default_stale_time))
    }

    /// Run a mutation and invalidate `invalidates` if it succeeds
    ///
    /// A failed mutation invalidates nothing.
    pub async fn mutate<T, Fut>(&self, mutation: Fut, invalidates: &[QueryKey]) -> Result<T, AppError>
    where
        Fut: Future<Output = Result<T, AppError>>,
    {
        let keys = invalidates.to_vec();
        self.mutate_with(mutation, move |_| keys).await
    }

    /// Like [`mutate`](Self::mutate), with the invalidation set derived
    /// from the mutation's result
    pub async fn mutate_with<T, Fut, K>(&self, mutation: Fut, invalidates: K) -> Result<T, AppError>
    where
        Fut: Future<Output = Result<T, AppError>>,
        K: FnOnce(&T) -> Vec<QueryKey>,
    {
        let value = match mutation.await {
            Ok(value) => value,
            Err(error) => {
                tracing::debug!(error = %error, "Mutation failed; cache left untouched");
                return Err(error);
            }
        };

        let keys = invalidates(&value);
        let invalidated = self.invalidate_all(&keys).await;
        tracing::debug!(
            requested = keys.len(),
            invalidated,
            "Mutation invalidated queries"
        );
        Ok(value)
    }

    /// Mark `key` stale; subscribed queries refetch immediately
    ///
    /// Returns false if the key has no entry.
    pub async fn invalidate(&self, key: &QueryKey) -> bool {
        self.invalidate_all(std::slice::from_ref(key)).await > 0
    }

    /// Mark every key stale under one lock acquisition
    ///
    /// Returns the number of existing entries invalidated.
    pub async fn invalidate_all(&self, keys: &[QueryKey]) -> usize {
        let mut entries = self.inner.entries.lock().await;
        let mut invalidated = 0;

        for key in keys {
            let Some(entry) = entries.get_mut(key) else {
                continue;
            };

            entry.stale = true;
            entry.invalidations += 1;
            invalidated += 1;
            CACHE_INVALIDATIONS_TOTAL
                .with_label_values(&[key.kind().as_str()])
                .inc();
            entry.publish();

            if entry.in_flight.is_none() && entry.subscriber_count() > 0 {
                if let Some(fetcher) = entry.fetcher.clone() {
                    tracing::debug!(%key, "Refetching invalidated query for subscribers");
                    self.inner.start_fetch(key, entry, fetcher());
                }
            }
        }

        invalidated
    }

    /// Subscribe to state changes of `key`
    ///
    /// Creates an idle entry if none exists.
    pub async fn subscribe(&self, key: &QueryKey) -> QuerySubscription {
        let mut entries = self.inner.entries.lock().await;
        let entry = entry_for(&mut entries, key);
        QuerySubscription {
            key: key.clone(),
            state: entry.state.subscribe(),
        }
    }

    /// Cached data for `key`, fresh or stale
    pub async fn get_data<T: Send + Sync + 'static>(&self, key: &QueryKey) -> Option<Arc<T>> {
        let entries = self.inner.entries.lock().await;
        let data = entries.get(key)?.data.clone()?;
        downcast(key, data).ok()
    }

    /// Current state of `key`
    pub async fn state(&self, key: &QueryKey) -> Option<QueryState> {
        let entries = self.inner.entries.lock().await;
        entries.get(key).map(CacheEntry::snapshot)
    }

    /// Forget the data of `key`; an in-flight result is discarded
    ///
    /// The next query of `key` fetches from scratch (from the first page
    /// for paginated queries).
    pub async fn reset(&self, key: &QueryKey) {
        let mut entries = self.inner.entries.lock().await;
        if let Some(entry) = entries.get_mut(key) {
            entry.reset();
            tracing::debug!(%key, "Query reset");
        }
    }

    /// Reset every entry; subscriptions stay attached
    pub async fn clear(&self) {
        let mut entries = self.inner.entries.lock().await;
        for entry in entries.values_mut() {
            entry.reset();
        }
        tracing::debug!(entries = entries.len(), "Query cache cleared");
    }

    /// Number of entries
    pub async fn len(&self) -> usize {
        self.inner.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl CacheInner {
    async fn query_erased(
        self: &Arc<Self>,
        key: &QueryKey,
        fetcher: Fetcher,
        options: QueryOptions,
    ) -> Settled {
        let stale_time = options.stale_time.or(self.default_stale_time);
        let label = key.kind().as_str();

        let mut pending = {
            let mut entries = self.entries.lock().await;
            let entry = entry_for(&mut entries, key);
            entry.fetcher = Some(Arc::clone(&fetcher));

            if !options.refetch && entry.is_fresh(stale_time) {
                if let Some(data) = &entry.data {
                    CACHE_HITS_TOTAL.with_label_values(&[label]).inc();
                    tracing::trace!(%key, "Query cache hit");
                    return Ok(Arc::clone(data));
                }
            }

            let attached = entry.in_flight.as_ref().map(|f| f.result.clone());
            match attached {
                Some(pending) => {
                    CACHE_DEDUPLICATED_TOTAL.with_label_values(&[label]).inc();
                    tracing::trace!(%key, "Attached to in-flight fetch");
                    pending
                }
                None => {
                    CACHE_MISSES_TOTAL.with_label_values(&[label]).inc();
                    tracing::debug!(%key, "Query cache miss, fetching");
                    self.start_fetch(key, entry, fetcher())
                }
            }
        };

        wait_settled(&mut pending).await
    }

    /// Mark `entry` loading and run `fetch` on its own task
    fn start_fetch(
        self: &Arc<Self>,
        key: &QueryKey,
        entry: &mut CacheEntry,
        fetch: BoxFuture<'static, Settled>,
    ) -> watch::Receiver<Option<Settled>> {
        let fetch_id = self.next_fetch_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = watch::channel(None);

        entry.in_flight = Some(InFlight {
            id: fetch_id,
            result: rx.clone(),
        });
        entry.status = QueryStatus::Loading;
        entry.publish();

        let invalidations = entry.invalidations;
        let inner = Arc::clone(self);
        let key = key.clone();
        tokio::spawn(async move {
            let settled = match AssertUnwindSafe(fetch).catch_unwind().await {
                Ok(settled) => settled,
                Err(_) => Err(AppError::internal(format!("fetch for {key} panicked"))),
            };
            inner.settle(&key, fetch_id, invalidations, &settled).await;
            tx.send_replace(Some(settled));
        });

        rx
    }

    /// Install a finished fetch and notify subscribers
    async fn settle(
        self: &Arc<Self>,
        key: &QueryKey,
        fetch_id: u64,
        invalidations: u64,
        settled: &Settled,
    ) {
        let mut entries = self.entries.lock().await;
        let Some(entry) = entries.get_mut(key) else {
            return;
        };
        if entry.in_flight.as_ref().map(|f| f.id) != Some(fetch_id) {
            tracing::debug!(%key, "Discarding result of a reset query");
            return;
        }

        entry.in_flight = None;
        match settled {
            Ok(value) => {
                entry.data = Some(Arc::clone(value));
                entry.error = None;
                entry.status = QueryStatus::Success;
                entry.updated_at = Some(Utc::now());
            }
            Err(error) => {
                tracing::warn!(%key, error = %error, "Query fetch failed");
                entry.error = Some(error.clone());
                entry.status = QueryStatus::Error;
            }
        }
        entry.stale = entry.invalidations != invalidations;
        entry.publish();

        if entry.stale && entry.subscriber_count() > 0 {
            if let Some(fetcher) = entry.fetcher.clone() {
                tracing::debug!(%key, "Refetching query invalidated while in flight");
                self.start_fetch(key, entry, fetcher());
            }
        }
    }
}

/// Wait for a fetch to settle
async fn wait_settled(pending: &mut watch::Receiver<Option<Settled>>) -> Settled {
    let settled = pending
        .wait_for(Option::is_some)
        .await
        .map_err(|_| AppError::internal("query fetch ended without a result"))?;
    match &*settled {
        Some(result) => result.clone(),
        None => Err(AppError::internal("query fetch ended without a result")),
    }
}

fn erase<T, F, Fut>(fetcher: F) -> Fetcher
where
    T: Send + Sync + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, AppError>> + Send + 'static,
{
    Arc::new(move || {
        let fetch = fetcher();
        async move { fetch.await.map(|value| Arc::new(value) as CachedValue) }.boxed()
    })
}

fn downcast<T: Send + Sync + 'static>(key: &QueryKey, value: CachedValue) -> Result<Arc<T>, AppError> {
    value
        .downcast::<T>()
        .map_err(|_| AppError::internal(format!("cached value for {key} has an unexpected type")))
}

// =============================================================================
// Subscriptions
// =============================================================================

/// Handle receiving state snapshots of one query
///
/// Dropping the handle detaches it. Detaching never cancels a fetch.
pub struct QuerySubscription {
    key: QueryKey,
    state: watch::Receiver<QueryState>,
}

impl QuerySubscription {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    /// Latest published state
    pub fn current(&self) -> QueryState {
        self.state.borrow().clone()
    }

    /// Wait for the next published state
    pub async fn changed(&mut self) -> Result<QueryState, AppError> {
        self.state
            .changed()
            .await
            .map_err(|_| AppError::State(format!("{} is no longer cached", self.key)))?;
        Ok(self.state.borrow_and_update().clone())
    }

    /// Wait until the query is settled and not stale
    pub async fn settled(&mut self) -> Result<QueryState, AppError> {
        let state = self
            .state
            .wait_for(|state| state.is_settled() && !state.is_stale)
            .await
            .map_err(|_| AppError::State(format!("{} is no longer cached", self.key)))?;
        Ok(state.clone())
    }
}
