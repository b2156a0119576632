//! The fetch-or-serve orchestrator.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tracing::{debug, info, warn};

use super::CacheError;
use super::container::{ContentCacheContainer, featured_first};
use super::lock::{mutex_lock, rw_read, rw_write};
use super::transform::{SharedTransform, Transform, TransformError, TransformRegistry};
use crate::api::{BrowseParams, ContentApi, GhostContentApi};
use crate::content::{ContentItem, ContentKind};

/// Cache key used when a fetch carries no filter.
pub const WILDCARD_TAG: &str = "*";

/// Filter prefix understood by [`FetchOptions::cache_tag`].
const TAG_FILTER_PREFIX: &str = "tags:";

/// Number of items requested from the remote API per fetch.
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Tuning knobs for [`ContentCacheService`].
///
/// The defaults reproduce plain fetch-on-miss behavior: no timeout, and
/// concurrent misses for the same tag each go to the remote API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceOptions {
    /// Page size sent with every remote fetch.
    pub page_size: usize,
    /// Upper bound on a single remote fetch. `None` waits indefinitely.
    pub fetch_timeout: Option<Duration>,
    /// Share one remote fetch between concurrent misses on the same tag.
    pub dedupe_in_flight: bool,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            fetch_timeout: None,
            dedupe_in_flight: false,
        }
    }
}

/// Per-call options for [`ContentCacheService::fetch`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Remote filter expression, normally `tags:<tag>`.
    pub filter: Option<String>,
    /// Maximum number of items returned to the caller. The cache always
    /// stores the full fetched page.
    pub limit: Option<usize>,
}

impl FetchOptions {
    /// Options filtering on a single tag.
    pub fn tag(tag: &str) -> Self {
        Self {
            filter: Some(format!("{TAG_FILTER_PREFIX}{tag}")),
            limit: None,
        }
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// The cache partition key for these options.
    ///
    /// `tags:news` caches under `news`; no filter (or an empty one) caches
    /// under [`WILDCARD_TAG`]. Any other filter is used verbatim as the key.
    pub fn cache_tag(&self) -> &str {
        match self.filter.as_deref() {
            None | Some("") => WILDCARD_TAG,
            Some(filter) => filter.strip_prefix(TAG_FILTER_PREFIX).unwrap_or(filter),
        }
    }
}

type FetchResult = Result<Vec<ContentItem>, CacheError>;
type InFlight = Shared<BoxFuture<'static, FetchResult>>;

/// Everything a remote fetch needs, owned so the fetch can outlive the caller.
struct RemoteFetch {
    client: Arc<dyn ContentApi>,
    transforms: Arc<TransformRegistry>,
    kind: ContentKind,
    tag: String,
    filter: Option<String>,
    page_size: usize,
    timeout: Option<Duration>,
}

impl RemoteFetch {
    async fn run(self) -> FetchResult {
        let params = BrowseParams::new(self.page_size)
            .include("tags")
            .filter(self.filter.clone());

        let browse = self.client.browse(self.kind, &params);
        let result = match self.timeout {
            Some(after) => tokio::time::timeout(after, browse)
                .await
                .map_err(|_| CacheError::Timeout {
                    kind: self.kind,
                    tag: self.tag.clone(),
                    after,
                })?,
            None => browse.await,
        };

        let items = result.map_err(|source| CacheError::RemoteFetch {
            kind: self.kind,
            tag: self.tag.clone(),
            source: Arc::new(source),
        })?;

        debug!(kind = %self.kind, tag = %self.tag, count = items.len(), "fetched content from API");

        Ok(match self.transforms.resolve(self.kind, &self.tag) {
            Some(transform) => apply_transform(transform.as_ref(), self.kind, items),
            None => items,
        })
    }
}

/// Rewrites every item's body. An item the transform fails or panics on
/// keeps its body.
fn apply_transform(
    transform: &dyn Transform,
    kind: ContentKind,
    items: Vec<ContentItem>,
) -> Vec<ContentItem> {
    items
        .into_iter()
        .map(|item| {
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                transform.apply(&item.html, &item.slug, kind)
            }));
            match outcome.unwrap_or(Err(TransformError::Panicked)) {
                Ok(html) => item.with_html(html),
                Err(e) => {
                    warn!(%kind, slug = %item.slug, error = %e, "transform failed, keeping original body");
                    item
                }
            }
        })
        .collect()
}

/// Request-facing content cache for posts and pages.
///
/// Construct one per application, wrap it in an [`Arc`], and hand clones to
/// the [`ContentMiddleware`](crate::middleware::content::ContentMiddleware)
/// instances and any host code that registers transforms. Until
/// [`init`](Self::init) (or [`init_with_client`](Self::init_with_client)) is
/// called every fetch resolves to an empty list.
///
/// # Examples
///
/// ```no_run
/// use ghostcache::cache::{ContentCacheService, FetchOptions};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let service = ContentCacheService::new();
/// service.init("https://demo.ghost.io", "22444f78447824223cefc48062")?;
///
/// // First call goes to the API, the second is served from the cache.
/// let news = service.posts(&FetchOptions::tag("news").limit(5), false).await?;
/// let again = service.posts(&FetchOptions::tag("news").limit(5), false).await?;
/// assert_eq!(news, again);
/// # Ok(())
/// # }
/// ```
pub struct ContentCacheService {
    options: ServiceOptions,
    // Generation bumps on every init, so results from a replaced client are not stored.
    client: RwLock<Option<(u64, Arc<dyn ContentApi>)>>,
    posts: ContentCacheContainer,
    pages: ContentCacheContainer,
    transforms: Arc<TransformRegistry>,
    in_flight: Mutex<HashMap<(ContentKind, String), (u64, InFlight)>>,
    next_flight: AtomicU64,
}

impl Default for ContentCacheService {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentCacheService {
    /// Creates an uninitialized service with default options.
    pub fn new() -> Self {
        Self::with_options(ServiceOptions::default())
    }

    pub fn with_options(options: ServiceOptions) -> Self {
        Self {
            options,
            client: RwLock::new(None),
            posts: ContentCacheContainer::new(),
            pages: ContentCacheContainer::new(),
            transforms: Arc::new(TransformRegistry::new()),
            in_flight: Mutex::new(HashMap::new()),
            next_flight: AtomicU64::new(0),
        }
    }

    pub fn options(&self) -> &ServiceOptions {
        &self.options
    }

    /// Connects the service to the Ghost site at `url` using Content API `key`.
    ///
    /// Calling this on an initialized service reconfigures it: the client is
    /// replaced and both caches are purged, since their entries came from the
    /// previous backend. Registered transforms are kept.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Init`] if the client cannot be built (e.g. an
    /// unparsable URL). The service's previous state is left untouched.
    pub fn init(&self, url: &str, key: &str) -> Result<(), CacheError> {
        let client = GhostContentApi::new(url, key).map_err(|e| CacheError::Init(Arc::new(e)))?;
        info!(url, "content API configured");
        self.init_with_client(Arc::new(client));
        Ok(())
    }

    /// Initializes the service with an arbitrary [`ContentApi`] implementation.
    ///
    /// Same reconfiguration semantics as [`init`](Self::init).
    pub fn init_with_client(&self, client: Arc<dyn ContentApi>) {
        let previous = {
            let mut slot = rw_write(&self.client, "service.init");
            let generation = slot.as_ref().map_or(0, |(generation, _)| generation + 1);
            slot.replace((generation, client))
        };
        if previous.is_some() {
            warn!("content cache re-initialized; purging cached entries");
            mutex_lock(&self.in_flight, "service.init").clear();
            self.purge();
        }
    }

    /// Returns `true` once a client has been configured.
    pub fn is_initialized(&self) -> bool {
        rw_read(&self.client, "service.is_initialized").is_some()
    }

    fn client(&self) -> Option<(u64, Arc<dyn ContentApi>)> {
        rw_read(&self.client, "service.client").clone()
    }

    /// Binds a transform for `kind`, scoped to `tag` or to every tag when `None`.
    ///
    /// The transform is smoke-tested first; a failing one is logged and
    /// dropped, leaving earlier bindings in effect. Returns whether it was
    /// accepted.
    pub fn register_transform<T>(&self, kind: ContentKind, transform: T, tag: Option<&str>) -> bool
    where
        T: Transform + 'static,
    {
        let transform: SharedTransform = Arc::new(transform);
        match self.transforms.register(kind, transform, tag) {
            Ok(()) => {
                debug!(%kind, tag = ?tag, "transform registered");
                true
            }
            Err(e) => {
                warn!(%kind, tag = ?tag, error = %e, "transform rejected");
                false
            }
        }
    }

    pub fn transforms(&self) -> &TransformRegistry {
        &self.transforms
    }

    /// The container backing `kind`.
    pub fn container(&self, kind: ContentKind) -> &ContentCacheContainer {
        match kind {
            ContentKind::Posts => &self.posts,
            ContentKind::Pages => &self.pages,
        }
    }

    /// Returns `kind` items for `options`, from the cache when possible.
    ///
    /// A remote fetch happens when `force` is set or the tag has no entry.
    /// Fetched items run through the matching transform, are stored
    /// featured-first (replacing any previous entry), and a copy limited to
    /// `options.limit` is returned.
    ///
    /// # Errors
    ///
    /// Remote failures are returned as [`CacheError::RemoteFetch`] or
    /// [`CacheError::Timeout`], and leave the cache untouched. An uninitialized
    /// service never fails; it returns an empty list.
    pub async fn fetch(
        &self,
        kind: ContentKind,
        options: &FetchOptions,
        force: bool,
    ) -> Result<Vec<ContentItem>, CacheError> {
        let Some((generation, client)) = self.client() else {
            debug!(%kind, "content cache not initialized, returning empty list");
            return Ok(Vec::new());
        };

        let tag = options.cache_tag();
        let container = self.container(kind);
        debug!(%kind, tag, force, "content requested");

        if !force {
            if let Some(items) = container.get(tag, options.limit) {
                debug!(%kind, tag, count = items.len(), "serving content from cache");
                return Ok(items);
            }
        }

        let fetch = RemoteFetch {
            client,
            transforms: Arc::clone(&self.transforms),
            kind,
            tag: tag.to_owned(),
            filter: options.filter.clone(),
            page_size: self.options.page_size,
            timeout: self.options.fetch_timeout,
        };

        let items = if self.options.dedupe_in_flight {
            self.fetch_shared(fetch).await?
        } else {
            fetch.run().await?
        };

        // Held while storing so a concurrent init cannot slip in between.
        let current = rw_read(&self.client, "service.fetch");
        if current.as_ref().map(|(g, _)| *g) != Some(generation) {
            debug!(%kind, tag, "client replaced during fetch, result not cached");
            let mut items = featured_first(items);
            if let Some(limit) = options.limit {
                items.truncate(limit);
            }
            return Ok(items);
        }
        Ok(container.replace(tag, items, options.limit))
    }

    /// Shorthand for [`fetch`](Self::fetch) on posts.
    pub async fn posts(
        &self,
        options: &FetchOptions,
        force: bool,
    ) -> Result<Vec<ContentItem>, CacheError> {
        self.fetch(ContentKind::Posts, options, force).await
    }

    /// Shorthand for [`fetch`](Self::fetch) on pages.
    pub async fn pages(
        &self,
        options: &FetchOptions,
        force: bool,
    ) -> Result<Vec<ContentItem>, CacheError> {
        self.fetch(ContentKind::Pages, options, force).await
    }

    /// Clears both containers. Initialization and transforms are kept.
    pub fn purge(&self) {
        self.posts.clear();
        self.pages.clear();
        debug!("content caches purged");
    }

    // Joins the in-flight fetch for (kind, tag), or starts one other callers can join.
    async fn fetch_shared(&self, fetch: RemoteFetch) -> FetchResult {
        let key = (fetch.kind, fetch.tag.clone());

        let (id, flight) = {
            let mut in_flight = mutex_lock(&self.in_flight, "service.fetch_shared");
            match in_flight.get(&key) {
                Some((id, flight)) => {
                    debug!(kind = %key.0, tag = %key.1, "joining in-flight fetch");
                    (*id, flight.clone())
                }
                None => {
                    let id = self.next_flight.fetch_add(1, Ordering::Relaxed);
                    let flight = fetch.run().boxed().shared();
                    in_flight.insert(key.clone(), (id, flight.clone()));
                    (id, flight)
                }
            }
        };

        let _cleanup = FlightGuard {
            in_flight: &self.in_flight,
            key,
            id,
        };
        flight.await
    }
}

/// Removes its flight from the in-flight map when the waiter finishes,
/// unwinds, or is cancelled. A newer flight under the same key is left alone.
struct FlightGuard<'a> {
    in_flight: &'a Mutex<HashMap<(ContentKind, String), (u64, InFlight)>>,
    key: (ContentKind, String),
    id: u64,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        let mut in_flight = mutex_lock(self.in_flight, "service.flight_guard");
        if in_flight
            .get(&self.key)
            .is_some_and(|(current, _)| *current == self.id)
        {
            in_flight.remove(&self.key);
        }
    }
}

impl std::fmt::Debug for ContentCacheService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentCacheService")
            .field("options", &self.options)
            .field("initialized", &self.is_initialized())
            .field("posts", &self.posts)
            .field("pages", &self.pages)
            .field("transforms", &self.transforms)
            .finish_non_exhaustive()
    }
}
