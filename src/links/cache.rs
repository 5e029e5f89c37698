/// Shared link collection cache
///
/// Every view fetches the same `GET /urls` payload. The cache coalesces
/// concurrent fetches into one request, lets non-forced loads reuse a recent
/// result, and forgets everything when the last view lets go, after a delete,
/// and on any auth change.
use crate::{
    error::ClientResult,
    links::{LinkApi, LinkCollection},
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::debug;

const MAX_TOMBSTONES: usize = 256;

struct CacheEntry {
    links: Arc<LinkCollection>,
    /// When the request that produced this entry was sent
    started_at: Instant,
    fetched_at: Instant,
}

pub struct CollectionCache {
    api: LinkApi,
    ttl: Duration,
    entry: Mutex<Option<CacheEntry>>,
    /// Held across a fetch so concurrent callers wait for the leader
    fetch_gate: tokio::sync::Mutex<()>,
    /// Bumped on every invalidation; a fetch only stores if it is unchanged
    epoch: AtomicU64,
    tombstones: Mutex<Vec<(u64, String)>>,
    leases: AtomicUsize,
}

impl CollectionCache {
    pub fn new(api: LinkApi, ttl: Duration) -> Arc<Self> {
        Arc::new(Self {
            api,
            ttl,
            entry: Mutex::new(None),
            fetch_gate: tokio::sync::Mutex::new(()),
            epoch: AtomicU64::new(0),
            tombstones: Mutex::new(Vec::new()),
            leases: AtomicUsize::new(0),
        })
    }

    pub fn api(&self) -> &LinkApi {
        &self.api
    }

    /// Current invalidation epoch
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Full collection, fetched or reused
    ///
    /// A forced fetch only reuses an entry whose request was sent after the
    /// call was made; a request already on the wire may predate a mutation.
    pub async fn fetch(&self, force: bool) -> ClientResult<Arc<LinkCollection>> {
        let requested_at = Instant::now();

        let _gate = self.fetch_gate.lock().await;

        if let Some(links) = self.reusable(requested_at, force) {
            debug!("Link collection cache hit");
            return Ok(links);
        }

        debug!("Link collection cache miss, fetching");
        let epoch = self.epoch();
        let started_at = Instant::now();
        let links = Arc::new(self.api.fetch_links().await?);

        if self.epoch() == epoch {
            *self.entry.lock() = Some(CacheEntry {
                links: Arc::clone(&links),
                started_at,
                fetched_at: Instant::now(),
            });
        } else {
            debug!("Cache invalidated during fetch, result not stored");
        }

        Ok(links)
    }

    fn reusable(&self, requested_at: Instant, force: bool) -> Option<Arc<LinkCollection>> {
        let entry = self.entry.lock();
        let entry = entry.as_ref()?;
        let joined = entry.started_at >= requested_at;
        let fresh = !force && entry.fetched_at.elapsed() < self.ttl;
        (joined || fresh).then(|| Arc::clone(&entry.links))
    }

    /// Drop the cached entry
    pub fn invalidate(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        if self.entry.lock().take().is_some() {
            debug!("Link collection cache invalidated");
        }
    }

    /// Record a successful delete
    ///
    /// Loads issued before this call filter `id` out of whatever they fetched.
    pub fn record_deletion(&self, id: &str) {
        self.invalidate();
        let epoch = self.epoch();
        let mut tombstones = self.tombstones.lock();
        tombstones.push((epoch, id.to_string()));
        if tombstones.len() > MAX_TOMBSTONES {
            let excess = tombstones.len() - MAX_TOMBSTONES;
            tombstones.drain(..excess);
        }
    }

    /// Whether `id` was deleted after `epoch`
    pub fn deleted_since(&self, epoch: u64, id: &str) -> bool {
        self.tombstones
            .lock()
            .iter()
            .any(|(deleted_at, deleted)| *deleted_at > epoch && deleted == id)
    }

    /// Register a consuming view
    pub fn lease(self: &Arc<Self>) -> CacheLease {
        self.leases.fetch_add(1, Ordering::SeqCst);
        CacheLease {
            cache: Arc::downgrade(self),
        }
    }

    pub fn lease_count(&self) -> usize {
        self.leases.load(Ordering::SeqCst)
    }

    fn release(&self) {
        if self.leases.fetch_sub(1, Ordering::SeqCst) == 1 {
            debug!("Last view released the link cache");
            self.invalidate();
        }
    }
}

/// Keeps the cache entry alive; the last lease dropped clears it
pub struct CacheLease {
    cache: Weak<CollectionCache>,
}

impl Drop for CacheLease {
    fn drop(&mut self) {
        if let Some(cache) = self.cache.upgrade() {
            cache.release();
        }
    }
}
