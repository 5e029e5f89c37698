/// Link collection view-model
///
/// One instance backs one view (compact table or full history). Loads are
/// tagged with a generation id and only the latest one may apply its result;
/// a load issued before a successful delete never brings the deleted link
/// back.
use crate::{
    clipboard::Clipboard,
    dashboard::RefreshTrigger,
    error::{ClientError, ClientResult},
    links::{
        CacheLease, CollectionCache, LinkCollection, SecretKey, SortField, SortSpec, ViewKind,
    },
    notify::NotificationHub,
    session::{AuthEvent, SessionManager, Subscription},
    stats::AggregateStats,
};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const REMOVAL_BUFFER: usize = 32;

/// Lifecycle of a view
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", content = "message", rename_all = "lowercase")]
pub enum ViewPhase {
    Idle,
    Loading,
    Ready,
    /// Load failed; the collection is empty and a refresh may be retried
    Error(String),
    /// No usable token; the user has to log in
    Unauthenticated,
}

/// What observers of a view see
#[derive(Debug, Clone, PartialEq)]
pub struct LinkViewSnapshot {
    pub phase: ViewPhase,
    pub links: LinkCollection,
    pub sort: SortSpec,
    pub last_error: Option<String>,
    pub version: u64,
}

struct ViewState {
    phase: ViewPhase,
    links: LinkCollection,
    sort: SortSpec,
    last_error: Option<String>,
    latest_load: u64,
    /// Token the shown (or loading) collection belongs to
    token: Option<String>,
    mounted: bool,
    version: u64,
}

impl ViewState {
    fn snapshot(&self) -> LinkViewSnapshot {
        LinkViewSnapshot {
            phase: self.phase.clone(),
            links: self.links.clone(),
            sort: self.sort,
            last_error: self.last_error.clone(),
            version: self.version,
        }
    }
}

struct Inner {
    kind: ViewKind,
    cache: Arc<CollectionCache>,
    session: Arc<SessionManager>,
    notifier: NotificationHub,
    clipboard: Arc<dyn Clipboard>,
    state: Mutex<ViewState>,
    snapshots: watch::Sender<LinkViewSnapshot>,
    removals: broadcast::Sender<String>,
    lease: Mutex<Option<CacheLease>>,
    auth: Mutex<Option<Subscription>>,
    follower: Mutex<Option<JoinHandle<()>>>,
}

impl Inner {
    /// Apply a mutation and publish the resulting snapshot
    fn update<R>(&self, f: impl FnOnce(&mut ViewState) -> R) -> R {
        let mut state = self.state.lock();
        let result = f(&mut state);
        state.version += 1;
        self.snapshots.send_replace(state.snapshot());
        result
    }

    /// Apply a load result only if it is still the latest load
    fn apply_load(&self, load_id: u64, f: impl FnOnce(&mut ViewState)) -> bool {
        let mut state = self.state.lock();
        if !state.mounted || state.latest_load != load_id {
            return false;
        }
        f(&mut state);
        state.version += 1;
        self.snapshots.send_replace(state.snapshot());
        true
    }

    fn on_auth_change(&self, event: &AuthEvent) {
        let current = self.session.token();
        let state = self.state.lock();
        if !state.mounted {
            return;
        }
        if event.is_authenticated {
            let switched = state.token.is_some() && state.token != current;
            if state.phase == ViewPhase::Unauthenticated || switched {
                drop(state);
                debug!("Session changed, {:?} view back to idle", self.kind);
                self.update(|state| {
                    state.latest_load += 1;
                    state.phase = ViewPhase::Idle;
                    state.links = LinkCollection::default();
                    state.last_error = None;
                    state.token = None;
                });
            }
            return;
        }
        drop(state);

        debug!("Session ended, clearing {:?} view", self.kind);
        self.update(|state| {
            state.latest_load += 1;
            state.phase = ViewPhase::Unauthenticated;
            state.links = LinkCollection::default();
            state.last_error = None;
            state.token = None;
        });
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(task) = self.follower.get_mut().take() {
            task.abort();
        }
    }
}

/// Handle to a mounted view; clones share the same view
#[derive(Clone)]
pub struct LinkCollectionViewModel {
    inner: Arc<Inner>,
}

impl LinkCollectionViewModel {
    /// Mount a new view
    pub fn new(
        kind: ViewKind,
        cache: Arc<CollectionCache>,
        session: Arc<SessionManager>,
        notifier: NotificationHub,
        clipboard: Arc<dyn Clipboard>,
    ) -> Self {
        let state = ViewState {
            phase: ViewPhase::Idle,
            links: LinkCollection::default(),
            sort: SortSpec::default(),
            last_error: None,
            latest_load: 0,
            token: None,
            mounted: true,
            version: 0,
        };
        let (snapshots, _) = watch::channel(state.snapshot());
        let (removals, _) = broadcast::channel(REMOVAL_BUFFER);

        let inner = Arc::new(Inner {
            kind,
            lease: Mutex::new(Some(cache.lease())),
            cache,
            session: Arc::clone(&session),
            notifier,
            clipboard,
            state: Mutex::new(state),
            snapshots,
            removals,
            auth: Mutex::new(None),
            follower: Mutex::new(None),
        });

        let weak = Arc::downgrade(&inner);
        let subscription = session.subscribe(move |event| {
            if let Some(inner) = weak.upgrade() {
                inner.on_auth_change(event);
            }
        });
        *inner.auth.lock() = Some(subscription);

        Self { inner }
    }

    pub fn kind(&self) -> ViewKind {
        self.inner.kind
    }

    /// Load, reusing a recent shared fetch if there is one
    pub async fn load(&self) -> ClientResult<LinkCollection> {
        self.run_load(false).await
    }

    /// Manual refresh; always refetches
    pub async fn refresh(&self) -> ClientResult<LinkCollection> {
        self.run_load(true).await
    }

    /// A result superseded by a newer load is returned to its caller but
    /// never displayed.
    async fn run_load(&self, force: bool) -> ClientResult<LinkCollection> {
        let inner = &self.inner;
        if !inner.state.lock().mounted {
            return Err(ClientError::NotReady);
        }

        let Some(token) = inner.session.token() else {
            inner.update(|state| {
                state.latest_load += 1;
                state.phase = ViewPhase::Unauthenticated;
                state.links = LinkCollection::default();
                state.token = None;
            });
            return Err(ClientError::NotAuthenticated);
        };

        let load_id = inner.update(|state| {
            state.latest_load += 1;
            state.phase = ViewPhase::Loading;
            state.token = Some(token);
            state.latest_load
        });
        let epoch = inner.cache.epoch();

        let result = inner.cache.fetch(force).await;

        match result {
            Ok(full) => {
                let mut links = (*full).clone();
                links.retain(|record| !inner.cache.deleted_since(epoch, &record.id));
                links.sort_by(SortSpec::default());
                if let Some(cap) = inner.kind.cap() {
                    links.truncate(cap);
                }

                let applied = inner.apply_load(load_id, |state| {
                    links.sort_by(state.sort);
                    state.links = links.clone();
                    state.phase = ViewPhase::Ready;
                    state.last_error = None;
                });
                if !applied {
                    debug!("Discarding result of superseded load {}", load_id);
                }
                Ok(links)
            }
            Err(err) => {
                let message = err.to_string();
                let applied = inner.apply_load(load_id, |state| {
                    state.links = LinkCollection::default();
                    if err.requires_login() {
                        state.phase = ViewPhase::Unauthenticated;
                    } else {
                        state.phase = ViewPhase::Error(message.clone());
                        state.last_error = Some(message.clone());
                    }
                });
                if !applied {
                    debug!("Discarding failure of superseded load {}: {}", load_id, message);
                } else if !err.requires_login() {
                    inner.notifier.error(message);
                }
                Err(err)
            }
        }
    }

    /// Re-sort in place without refetching
    pub fn sort_by(&self, spec: SortSpec) {
        self.inner.update(|state| {
            state.sort = spec;
            state.links.sort_by(spec);
        });
    }

    /// Header click: same field flips, new field starts ascending
    pub fn toggle_sort(&self, field: SortField) -> SortSpec {
        let spec = self.inner.state.lock().sort.toggled(field);
        self.sort_by(spec);
        spec
    }

    /// Delete a link by id using its secret key
    ///
    /// On failure the collection is left as it was and the error is recorded
    /// in `last_error`; the view stays `Ready`.
    pub async fn delete(&self, id: &str, secret_key: Option<&SecretKey>) -> ClientResult<()> {
        let inner = &self.inner;
        {
            let state = inner.state.lock();
            if state.phase != ViewPhase::Ready {
                return Err(ClientError::NotReady);
            }
            if state.links.get(id).is_none() {
                return Err(ClientError::LinkNotFound(id.to_string()));
            }
        }

        let Some(secret_key) = secret_key else {
            self.record_failure(&ClientError::MissingSecret);
            return Err(ClientError::MissingSecret);
        };

        match inner.cache.api().delete_link(secret_key).await {
            Ok(()) => {
                inner.cache.record_deletion(id);
                inner.update(|state| {
                    state.links.remove(id);
                    state.last_error = None;
                });
                let _ = inner.removals.send(id.to_string());
                inner.notifier.success("Link deleted successfully!");
                Ok(())
            }
            Err(err) if err.requires_login() => Err(err),
            Err(err) => {
                self.record_failure(&err);
                Err(err)
            }
        }
    }

    fn record_failure(&self, err: &ClientError) {
        let message = err.to_string();
        warn!("Link operation failed: {}", message);
        self.inner.update(|state| state.last_error = Some(message.clone()));
        self.inner.notifier.error(message);
    }

    /// Copy a link's short URL to the clipboard
    pub fn copy_short_url(&self, id: &str) -> ClientResult<String> {
        let short_url = self
            .inner
            .state
            .lock()
            .links
            .get(id)
            .map(|record| record.short_url.clone())
            .ok_or_else(|| ClientError::LinkNotFound(id.to_string()))?;

        match self.inner.clipboard.set_text(&short_url) {
            Ok(()) => {
                self.inner.notifier.success("Link copied to clipboard!");
                Ok(short_url)
            }
            Err(err) => {
                warn!("Clipboard write failed: {}", err);
                self.inner.notifier.error("Failed to copy link");
                Err(err)
            }
        }
    }

    /// Reload whenever `trigger` fires
    pub fn follow(&self, trigger: &RefreshTrigger) {
        let mut fired = trigger.subscribe();
        let weak = Arc::downgrade(&self.inner);

        let task = tokio::spawn(async move {
            while fired.changed().await.is_ok() {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let view = LinkCollectionViewModel { inner };
                if let Err(e) = view.refresh().await {
                    debug!("Triggered refresh failed: {}", e);
                }
            }
        });

        if let Some(previous) = self.inner.follower.lock().replace(task) {
            previous.abort();
        }
    }

    /// Stop displaying results
    ///
    /// Loads still in flight finish but their results are ignored.
    pub fn unmount(&self) {
        {
            let mut state = self.inner.state.lock();
            state.mounted = false;
            state.latest_load += 1;
        }
        self.inner.lease.lock().take();
        self.inner.auth.lock().take();
        if let Some(task) = self.inner.follower.lock().take() {
            task.abort();
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.inner.state.lock().mounted
    }

    pub fn snapshot(&self) -> LinkViewSnapshot {
        self.inner.state.lock().snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<LinkViewSnapshot> {
        self.inner.snapshots.subscribe()
    }

    /// Ids removed by successful deletes, as they happen
    pub fn removals(&self) -> broadcast::Receiver<String> {
        self.inner.removals.subscribe()
    }

    pub fn phase(&self) -> ViewPhase {
        self.inner.state.lock().phase.clone()
    }

    pub fn links(&self) -> LinkCollection {
        self.inner.state.lock().links.clone()
    }

    /// Aggregates over what this view currently holds
    pub fn stats(&self) -> AggregateStats {
        AggregateStats::compute(&self.inner.state.lock().links)
    }
}
