// Paged fetch engine — composition root wiring cursor, cache, search and coordinator.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::cache::ResponseCache;
use super::coordinator::{FetchTicket, RequestCoordinator};
use super::cursor::{LoadState, PaginationCursor};
use super::key::{ParamValue, QueryKey, RequestKeyBuilder};
use super::page::{Page, ResponseShape};
use super::results::AccumulatingResultSet;
use super::search::DebouncedSearchChannel;
use super::stats::{FetchStats, FetchStatsSnapshot};
use super::strategy::{FetchStrategy, LazyLoadEvent};
use crate::config::EngineConfig;
use crate::error::FetchError;
use crate::transport::traits::{HttpMethod, Transport};

pub type ErrorCallback = Arc<dyn Fn(&FetchError) + Send + Sync>;

/// What the UI binding reads back after every transition.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineView<T> {
    /// Shared with the engine; cloning a view does not copy the rows.
    pub data: Arc<Vec<T>>,
    pub is_loading: bool,
    /// Latest server total, or -1 while unknown.
    pub total_records: i64,
    pub all_loaded: bool,
}

impl<T> Default for EngineView<T> {
    fn default() -> Self {
        Self {
            data: Arc::new(Vec::new()),
            is_loading: false,
            total_records: crate::config::UNKNOWN_TOTAL,
            all_loaded: false,
        }
    }
}

/// Why a trigger did not result in a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    AlreadyLoading,
    AllLoaded,
    /// The select panel is closed and the trigger was not a refresh.
    SurfaceInactive,
    /// Search-only mode with an empty term.
    SearchRequired,
    /// The current page is already merged.
    UpToDate,
    /// The trigger does not apply to this strategy.
    Unsupported,
    TornDown,
}

/// Result of one public trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// A network response was merged.
    Merged { items: usize },
    /// A cached page was merged without touching the network.
    CacheHit { items: usize },
    /// The response belonged to a superseded generation and was dropped.
    Discarded,
    /// The fetch failed and was reported through the error callback.
    Failed,
    Skipped(SkipReason),
}

impl FetchOutcome {
    pub fn merged(&self) -> bool {
        matches!(self, FetchOutcome::Merged { .. } | FetchOutcome::CacheHit { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Open,
    ScrollToEnd,
    Search,
    Reconfigure,
    Refresh,
    LazyLoad,
}

struct Session<T> {
    cursor: PaginationCursor,
    results: AccumulatingResultSet<T>,
    search: Option<String>,
    params: BTreeMap<String, ParamValue>,
    table_params: BTreeMap<String, ParamValue>,
    body: Option<Value>,
    surface_open: bool,
    fetched_once: bool,
    torn_down: bool,
}

impl<T: Clone> Session<T> {
    fn view(&self) -> EngineView<T> {
        let state = self.cursor.state();
        EngineView {
            data: self.results.shared_items(),
            is_loading: state.loading,
            total_records: state.total_count,
            all_loaded: state.all_loaded,
        }
    }

    fn merge(&mut self, page: Page<T>) -> usize {
        let items = page.items.len();
        self.cursor.finish_fetch(true);
        self.results.append(page);
        self.cursor
            .recompute_all_loaded(self.results.len(), self.results.total_count());
        items
    }
}

struct PendingFetch {
    key: QueryKey,
    ticket: FetchTicket,
}

struct EngineInner<T> {
    config: EngineConfig,
    strategy: FetchStrategy,
    keys: RequestKeyBuilder,
    coordinator: RequestCoordinator<T>,
    owns_cache: bool,
    session: Mutex<Session<T>>,
    view_tx: watch::Sender<EngineView<T>>,
    stats: Arc<FetchStats>,
    on_error: Option<ErrorCallback>,
    search_input: Mutex<Option<DebouncedSearchChannel>>,
    shutdown: CancellationToken,
}

/// Incremental, cached, cancellable paginated fetching for one UI surface.
///
/// Every public trigger is safe to call while another is awaiting the
/// network. Triggers that reset (search, parameter changes, refresh, lazy
/// load) supersede the in-flight fetch; the superseded response is never
/// merged. Scroll and open triggers no-op while a fetch is loading.
///
/// Construct inside a Tokio runtime: the engine spawns its debounce and
/// cache sweep tasks, and `build` fails without one. Dropping the engine
/// tears it down.
pub struct PagedFetchEngine<T> {
    inner: Arc<EngineInner<T>>,
}

pub struct PagedFetchEngineBuilder<T> {
    config: EngineConfig,
    transport: Arc<dyn Transport>,
    strategy: FetchStrategy,
    on_error: Option<ErrorCallback>,
    shared_cache: Option<ResponseCache<T>>,
}

impl<T> PagedFetchEngineBuilder<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn strategy(mut self, strategy: FetchStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn on_error(mut self, callback: impl Fn(&FetchError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(callback));
        self
    }

    /// Use a cache owned elsewhere. Its sweep and lifetime stay with the
    /// owner; teardown of this engine does not clear it.
    pub fn shared_cache(mut self, cache: ResponseCache<T>) -> Self {
        self.shared_cache = Some(cache);
        self
    }

    /// Fails outside a Tokio runtime, since the engine spawns its debounce
    /// and sweep tasks.
    pub fn build(self) -> Result<PagedFetchEngine<T>> {
        let config = self.config;
        config.validate()?;
        Handle::try_current()
            .map_err(|e| anyhow!("paged fetch engine needs a tokio runtime: {}", e))?;

        let owns_cache = config.cache_enabled && self.shared_cache.is_none();
        let cache = if !config.cache_enabled {
            None
        } else if let Some(shared) = self.shared_cache {
            Some(shared)
        } else {
            let ttl = (!config.disable_ttl_sweep).then(|| config.cache_ttl());
            let cache = ResponseCache::new(ttl);
            cache.start_sweeper()?;
            Some(cache)
        };

        let stats = Arc::new(FetchStats::new());
        let coordinator = RequestCoordinator::new(
            self.transport,
            cache,
            ResponseShape::new(config.data_key.clone(), config.count_key.clone()),
            stats.clone(),
        );
        let keys = RequestKeyBuilder::new(
            config.method,
            config.resource_locator.clone(),
            config.search_key.clone(),
        );
        let session = Session {
            cursor: PaginationCursor::new(config.limit),
            results: AccumulatingResultSet::new(),
            search: None,
            params: config.params.clone(),
            table_params: BTreeMap::new(),
            body: config.body.clone(),
            surface_open: false,
            fetched_once: false,
            torn_down: false,
        };
        let (view_tx, _) = watch::channel(EngineView::default());
        let (search_input, settled_rx) = DebouncedSearchChannel::spawn(config.debounce());

        let inner = Arc::new(EngineInner {
            config,
            strategy: self.strategy,
            keys,
            coordinator,
            owns_cache,
            session: Mutex::new(session),
            view_tx,
            stats,
            on_error: self.on_error,
            search_input: Mutex::new(Some(search_input)),
            shutdown: CancellationToken::new(),
        });

        spawn_settled_search_consumer(&inner, settled_rx);

        debug!(
            "paged fetch engine created resource={} method={} limit={} strategy={:?}",
            inner.config.resource_locator, inner.config.method, inner.config.limit, inner.strategy
        );

        Ok(PagedFetchEngine { inner })
    }
}

/// Forward settled search terms into the engine. Each settle resets
/// synchronously, in arrival order; only the network part is spawned so a
/// later settle can supersede an earlier one still in flight.
fn spawn_settled_search_consumer<T>(
    inner: &Arc<EngineInner<T>>,
    mut settled_rx: mpsc::UnboundedReceiver<String>,
) where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    let weak = Arc::downgrade(inner);
    let shutdown = inner.shutdown.clone();

    tokio::spawn(async move {
        loop {
            let term = tokio::select! {
                _ = shutdown.cancelled() => break,
                term = settled_rx.recv() => match term {
                    Some(term) => term,
                    None => break,
                },
            };
            let Some(inner) = weak.upgrade() else {
                break;
            };
            match inner.begin_search(term) {
                Ok(pending) => {
                    tokio::spawn(async move {
                        inner.complete(pending).await;
                    });
                }
                Err(outcome) => debug!("settled search did not fetch: {:?}", outcome),
            }
        }
        debug!("settled search consumer exited");
    });
}

impl<T> EngineInner<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    fn publish(&self, session: &Session<T>) {
        self.view_tx.send_replace(session.view());
    }

    fn build_key(&self, session: &Session<T>) -> QueryKey {
        let params = session.params.iter().chain(session.table_params.iter());
        self.keys.build(
            session.cursor.page(),
            session.cursor.limit(),
            session.search.as_deref(),
            params,
            session.body.as_ref(),
        )
    }

    /// Supersede in-flight work and clear the session. Caller holds the lock.
    fn reset_locked(&self, session: &mut Session<T>) {
        self.coordinator.supersede();
        session.cursor.reset();
        session.results.clear();
        session.fetched_once = false;
        self.stats.record_reset();
    }

    fn guard(&self, session: &Session<T>, trigger: Trigger) -> Option<SkipReason> {
        if session.torn_down {
            return Some(SkipReason::TornDown);
        }
        if session.cursor.is_loading() {
            return Some(SkipReason::AlreadyLoading);
        }
        if session.fetched_once && session.cursor.all_loaded() {
            return Some(SkipReason::AllLoaded);
        }
        if self.strategy.requires_open_surface()
            && !session.surface_open
            && trigger != Trigger::Refresh
        {
            return Some(SkipReason::SurfaceInactive);
        }
        if self.config.search_only && session.search.as_deref().unwrap_or("").is_empty() {
            return Some(SkipReason::SearchRequired);
        }
        if trigger == Trigger::Open
            && session.results.pages_merged() > 0
            && session.cursor.last_call_succeeded()
        {
            return Some(SkipReason::UpToDate);
        }
        None
    }

    /// Synchronous half of a fetch: guard, move the cursor, serve from the
    /// cache or mark the session loading.
    fn begin(&self, trigger: Trigger) -> Result<PendingFetch, FetchOutcome> {
        let mut session = self.session.lock();
        self.begin_locked(&mut session, trigger)
    }

    fn begin_locked(
        &self,
        session: &mut Session<T>,
        trigger: Trigger,
    ) -> Result<PendingFetch, FetchOutcome> {
        if let Some(reason) = self.guard(session, trigger) {
            debug!("{:?} skipped: {:?}", trigger, reason);
            return Err(FetchOutcome::Skipped(reason));
        }

        if trigger == Trigger::ScrollToEnd && session.results.pages_merged() > 0 {
            // A failed page stays put and is fetched again.
            session.cursor.advance_to_next_page();
        }

        session.fetched_once = true;
        let key = self.build_key(session);

        if let Some(page) = self.coordinator.cached(&key) {
            let items = session.merge(page);
            self.stats.record_merged(items);
            self.publish(session);
            return Err(FetchOutcome::CacheHit { items });
        }

        session.cursor.begin_fetch();
        self.publish(session);
        Ok(PendingFetch {
            key,
            ticket: self.coordinator.ticket(),
        })
    }

    /// Asynchronous half: run the transport call and merge if still current.
    async fn complete(&self, pending: PendingFetch) -> FetchOutcome {
        let result = self.coordinator.execute(&pending.key, &pending.ticket).await;

        let mut session = self.session.lock();
        if !self.coordinator.is_current(pending.ticket.generation) || session.torn_down {
            // The reset that superseded this fetch already cleared `loading`.
            self.stats.record_discarded();
            debug!(
                "discarded response {} generation={}",
                pending.key, pending.ticket.generation
            );
            return FetchOutcome::Discarded;
        }

        match result {
            Ok(page) => {
                let items = session.merge(page);
                self.stats.record_merged(items);
                self.publish(&session);
                debug!(
                    "merged {} items from {} total={}",
                    items,
                    pending.key,
                    session.results.total_count()
                );
                FetchOutcome::Merged { items }
            }
            Err(FetchError::Aborted) => {
                let succeeded = session.cursor.last_call_succeeded();
                session.cursor.finish_fetch(succeeded);
                self.stats.record_discarded();
                self.publish(&session);
                FetchOutcome::Discarded
            }
            Err(err) => {
                session.cursor.finish_fetch(false);
                self.stats.record_failure();
                self.publish(&session);
                drop(session);
                warn!("fetch failed {}: {}", pending.key, err);
                self.report_error(&err);
                FetchOutcome::Failed
            }
        }
    }

    async fn run(&self, trigger: Trigger) -> FetchOutcome {
        match self.begin(trigger) {
            Ok(pending) => self.complete(pending).await,
            Err(outcome) => outcome,
        }
    }

    fn report_error(&self, err: &FetchError) {
        let Some(callback) = &self.on_error else {
            return;
        };
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| callback.as_ref()(err))) {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!("error callback panicked: {}", message);
        }
    }

    fn begin_search(&self, term: String) -> Result<PendingFetch, FetchOutcome> {
        let mut session = self.session.lock();
        if session.torn_down {
            return Err(FetchOutcome::Skipped(SkipReason::TornDown));
        }
        debug!("search settled term={:?}", term);
        self.reset_locked(&mut session);
        session.search = Some(term).filter(|t| !t.is_empty());
        self.publish(&session);
        self.begin_locked(&mut session, Trigger::Search)
    }

    fn begin_reconfigure(
        &self,
        apply: impl FnOnce(&mut Session<T>, &RequestKeyBuilder),
    ) -> Result<PendingFetch, FetchOutcome> {
        let mut session = self.session.lock();
        if session.torn_down {
            return Err(FetchOutcome::Skipped(SkipReason::TornDown));
        }
        self.reset_locked(&mut session);
        apply(&mut session, &self.keys);
        self.publish(&session);
        self.begin_locked(&mut session, Trigger::Reconfigure)
    }

    fn reset(&self) {
        let mut session = self.session.lock();
        if session.torn_down {
            return;
        }
        self.reset_locked(&mut session);
        self.publish(&session);
    }

    fn teardown(&self) {
        if self.shut_down() {
            let session = self.session.lock();
            self.publish(&session);
        }
    }
}

impl<T> EngineInner<T> {
    /// Stop everything this engine owns. Returns `false` if already done.
    fn shut_down(&self) -> bool {
        {
            let mut session = self.session.lock();
            if session.torn_down {
                return false;
            }
            session.torn_down = true;
            session.surface_open = false;
            self.coordinator.shutdown();
            session.cursor.reset();
            session.results.clear();
        }

        if let Some(channel) = self.search_input.lock().take() {
            channel.close();
        }
        self.shutdown.cancel();

        if self.owns_cache {
            if let Some(cache) = self.coordinator.cache() {
                cache.stop_sweeper();
                cache.clear();
            }
        }

        info!(
            "paged fetch engine torn down resource={}",
            self.config.resource_locator
        );
        true
    }
}

impl<T> PagedFetchEngine<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    pub fn builder(transport: Arc<dyn Transport>) -> PagedFetchEngineBuilder<T> {
        PagedFetchEngineBuilder {
            config: EngineConfig::default(),
            transport,
            strategy: FetchStrategy::default(),
            on_error: None,
            shared_cache: None,
        }
    }

    /// Engine with default strategy and no error callback.
    pub fn new(config: EngineConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        Self::builder(transport).config(config).build()
    }

    /// The surface became visible. Fetches the current page unless it is
    /// already loaded, or search-only mode is waiting for a term.
    pub async fn on_open(&self) -> FetchOutcome {
        self.inner.session.lock().surface_open = true;
        self.inner.run(Trigger::Open).await
    }

    /// The select panel closed. In-flight work is left to finish.
    pub fn on_close(&self) {
        self.inner.session.lock().surface_open = false;
    }

    /// The user scrolled to the end of the list: fetch the next page.
    pub async fn on_scroll_to_end(&self) -> FetchOutcome {
        if !self.inner.strategy.supports_scroll() {
            return FetchOutcome::Skipped(SkipReason::Unsupported);
        }
        self.inner.session.lock().surface_open = true;
        self.inner.run(Trigger::ScrollToEnd).await
    }

    /// Apply a settled search term: reset, then fetch page 1 for it.
    pub async fn on_search(&self, term: impl Into<String>) -> FetchOutcome {
        match self.inner.begin_search(term.into()) {
            Ok(pending) => self.inner.complete(pending).await,
            Err(outcome) => outcome,
        }
    }

    /// Feed one raw search keystroke into the debounce channel. The settled
    /// term is applied as if passed to [`on_search`](Self::on_search).
    pub fn push_search_input(&self, raw: impl Into<String>) -> bool {
        match self.inner.search_input.lock().as_ref() {
            Some(channel) => channel.push(raw),
            None => false,
        }
    }

    /// Merge `patch` into the extra parameters (`Null` removes a key), reset,
    /// and fetch page 1 if the surface is active. Reserved keys are ignored.
    pub async fn patch_params<I, K, V>(&self, patch: I) -> FetchOutcome
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<ParamValue>,
    {
        let patch: Vec<(String, ParamValue)> = patch
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let begun = self.inner.begin_reconfigure(|session, keys| {
            for (key, value) in patch {
                if keys.is_reserved(&key) {
                    warn!("ignoring reserved parameter {:?}", key);
                    continue;
                }
                if value.is_null() {
                    session.params.remove(&key);
                } else {
                    session.params.insert(key, value);
                }
            }
        });
        match begun {
            Ok(pending) => self.inner.complete(pending).await,
            Err(outcome) => outcome,
        }
    }

    /// Replace the request body used by POST fetches, reset, and refetch.
    pub async fn set_body(&self, body: Option<Value>) -> FetchOutcome {
        if body.is_some() && self.inner.keys.method() != HttpMethod::Post {
            debug!("request body set on a GET engine; it will not be sent");
        }
        match self.inner.begin_reconfigure(|session, _| session.body = body) {
            Ok(pending) => self.inner.complete(pending).await,
            Err(outcome) => outcome,
        }
    }

    /// Table page request: jump to the requested page, replace the rows,
    /// and fold sort and filter state into the parameters.
    pub async fn on_lazy_load(&self, event: LazyLoadEvent) -> FetchOutcome {
        if !self.inner.strategy.supports_lazy_load() {
            return FetchOutcome::Skipped(SkipReason::Unsupported);
        }
        let begun = {
            let mut session = self.inner.session.lock();
            if session.torn_down {
                return FetchOutcome::Skipped(SkipReason::TornDown);
            }
            self.inner.reset_locked(&mut session);
            let rows = if event.rows == 0 {
                self.inner.config.limit
            } else {
                event.rows
            };
            session.cursor.jump_to(event.page(), rows);
            session.table_params = event.to_params();
            self.inner.begin_locked(&mut session, Trigger::LazyLoad)
        };
        match begun {
            Ok(pending) => self.inner.complete(pending).await,
            Err(outcome) => outcome,
        }
    }

    /// Reset and fetch page 1 even if the surface is inactive.
    pub async fn refresh(&self) -> FetchOutcome {
        let begun = {
            let mut session = self.inner.session.lock();
            if session.torn_down {
                return FetchOutcome::Skipped(SkipReason::TornDown);
            }
            self.inner.reset_locked(&mut session);
            self.inner.begin_locked(&mut session, Trigger::Refresh)
        };
        match begun {
            Ok(pending) => self.inner.complete(pending).await,
            Err(outcome) => outcome,
        }
    }

    /// Abort in-flight work and clear accumulated rows without fetching.
    pub fn reset(&self) {
        self.inner.reset();
    }

    pub fn clear_cache(&self) {
        self.inner.coordinator.clear_cache();
    }

    /// Abort in-flight work, clear an owned cache, and stop background tasks.
    /// Idempotent.
    pub fn teardown(&self) {
        self.inner.teardown();
    }

    pub fn is_torn_down(&self) -> bool {
        self.inner.session.lock().torn_down
    }

    pub fn snapshot(&self) -> EngineView<T> {
        self.inner.session.lock().view()
    }

    /// Receive a fresh [`EngineView`] after every state transition.
    pub fn subscribe(&self) -> watch::Receiver<EngineView<T>> {
        self.inner.view_tx.subscribe()
    }

    pub fn load_state(&self) -> LoadState {
        self.inner.session.lock().cursor.state()
    }

    pub fn search_term(&self) -> Option<String> {
        self.inner.session.lock().search.clone()
    }

    pub fn params(&self) -> BTreeMap<String, ParamValue> {
        self.inner.session.lock().params.clone()
    }

    /// Current request generation; advances on every reset.
    pub fn generation(&self) -> u64 {
        self.inner.coordinator.generation()
    }

    pub fn stats(&self) -> FetchStatsSnapshot {
        self.inner.stats.snapshot()
    }

    pub fn strategy(&self) -> FetchStrategy {
        self.inner.strategy
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }
}

impl<T> Drop for PagedFetchEngine<T> {
    fn drop(&mut self) {
        if self.inner.shut_down() {
            debug!("PagedFetchEngine dropped without teardown");
        }
    }
}
