/// Aggregate statistics over the link collection
use crate::{
    dashboard::RefreshTrigger,
    error::{ClientError, ClientResult},
    links::{CacheLease, CollectionCache, LinkCollection, LinkCollectionViewModel, ViewPhase},
    notify::NotificationHub,
    session::{AuthEvent, SessionManager, Subscription},
};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast::error::RecvError, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const LOAD_FAILED_MESSAGE: &str = "Failed to load statistics.";

/// Counts derived from a collection snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateStats {
    pub total_links: usize,
    pub total_clicks: u64,
    pub active_links: usize,
}

impl AggregateStats {
    pub fn compute(collection: &LinkCollection) -> Self {
        collection.iter().fold(Self::default(), |mut stats, link| {
            stats.total_links += 1;
            stats.total_clicks += link.clicks;
            if link.is_active() {
                stats.active_links += 1;
            }
            stats
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub phase: ViewPhase,
    pub stats: AggregateStats,
}

struct PanelState {
    phase: ViewPhase,
    links: LinkCollection,
    stats: AggregateStats,
    latest_load: u64,
    /// Token the shown (or loading) figures belong to
    token: Option<String>,
    mounted: bool,
}

struct PanelInner {
    cache: Arc<CollectionCache>,
    session: Arc<SessionManager>,
    notifier: NotificationHub,
    state: Mutex<PanelState>,
    snapshots: watch::Sender<StatsSnapshot>,
    lease: Mutex<Option<CacheLease>>,
    auth: Mutex<Option<Subscription>>,
    tracker: Mutex<Option<JoinHandle<()>>>,
    follower: Mutex<Option<JoinHandle<()>>>,
}

impl PanelInner {
    fn publish(&self, state: &PanelState) {
        self.snapshots.send_replace(StatsSnapshot {
            phase: state.phase.clone(),
            stats: state.stats,
        });
    }

    fn reset(&self, phase: ViewPhase) {
        let mut state = self.state.lock();
        state.latest_load += 1;
        state.phase = phase;
        state.links = LinkCollection::default();
        state.stats = AggregateStats::default();
        state.token = None;
        self.publish(&state);
    }

    fn on_auth_change(&self, event: &AuthEvent) {
        if !self.state.lock().mounted {
            return;
        }
        if !event.is_authenticated {
            self.reset(ViewPhase::Unauthenticated);
            return;
        }

        let current = self.session.token();
        let stale = {
            let state = self.state.lock();
            state.phase == ViewPhase::Unauthenticated
                || (state.token.is_some() && state.token != current)
        };
        if stale {
            debug!("Session changed, stats back to idle");
            self.reset(ViewPhase::Idle);
        }
    }

    fn remove(&self, id: &str) {
        let mut state = self.state.lock();
        if state.links.remove(id).is_some() {
            state.stats = AggregateStats::compute(&state.links);
            debug!("Recomputed stats after delete: {:?}", state.stats);
            self.publish(&state);
        }
    }
}

impl Drop for PanelInner {
    fn drop(&mut self) {
        for slot in [self.tracker.get_mut(), self.follower.get_mut()] {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }
    }
}

/// Statistics panel view-model
#[derive(Clone)]
pub struct StatsPanel {
    inner: Arc<PanelInner>,
}

impl StatsPanel {
    pub fn new(
        cache: Arc<CollectionCache>,
        session: Arc<SessionManager>,
        notifier: NotificationHub,
    ) -> Self {
        let (snapshots, _) = watch::channel(StatsSnapshot {
            phase: ViewPhase::Idle,
            stats: AggregateStats::default(),
        });

        let inner = Arc::new(PanelInner {
            lease: Mutex::new(Some(cache.lease())),
            cache,
            session: Arc::clone(&session),
            notifier,
            state: Mutex::new(PanelState {
                phase: ViewPhase::Idle,
                links: LinkCollection::default(),
                stats: AggregateStats::default(),
                latest_load: 0,
                token: None,
                mounted: true,
            }),
            snapshots,
            auth: Mutex::new(None),
            tracker: Mutex::new(None),
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

    /// Load the full collection and compute its aggregates
    pub async fn load(&self) -> ClientResult<AggregateStats> {
        self.run_load(false).await
    }

    /// Same as `load` but never reuses an earlier fetch
    pub async fn refresh(&self) -> ClientResult<AggregateStats> {
        self.run_load(true).await
    }

    async fn run_load(&self, force: bool) -> ClientResult<AggregateStats> {
        let inner = &self.inner;
        if !inner.state.lock().mounted {
            return Err(ClientError::NotReady);
        }
        let Some(token) = inner.session.token() else {
            inner.reset(ViewPhase::Unauthenticated);
            return Err(ClientError::NotAuthenticated);
        };

        let load_id = {
            let mut state = inner.state.lock();
            state.latest_load += 1;
            state.phase = ViewPhase::Loading;
            state.token = Some(token);
            inner.publish(&state);
            state.latest_load
        };
        let epoch = inner.cache.epoch();

        let result = inner.cache.fetch(force).await;

        let mut state = inner.state.lock();
        if !state.mounted || state.latest_load != load_id {
            debug!("Discarding superseded stats load {}", load_id);
            return result.map(|links| AggregateStats::compute(&links));
        }

        match result {
            Ok(full) => {
                let mut links = (*full).clone();
                links.retain(|record| !inner.cache.deleted_since(epoch, &record.id));
                state.stats = AggregateStats::compute(&links);
                state.links = links;
                state.phase = ViewPhase::Ready;
                inner.publish(&state);
                Ok(state.stats)
            }
            Err(err) => {
                state.links = LinkCollection::default();
                state.stats = AggregateStats::default();
                state.phase = if err.requires_login() {
                    ViewPhase::Unauthenticated
                } else {
                    ViewPhase::Error(LOAD_FAILED_MESSAGE.to_string())
                };
                inner.publish(&state);
                drop(state);

                if !err.requires_login() {
                    warn!("Stats load failed: {}", err);
                    inner.notifier.error(LOAD_FAILED_MESSAGE);
                }
                Err(err)
            }
        }
    }

    /// Final values, synchronously
    pub fn target(&self) -> AggregateStats {
        self.inner.state.lock().stats
    }

    pub fn phase(&self) -> ViewPhase {
        self.inner.state.lock().phase.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<StatsSnapshot> {
        self.inner.snapshots.subscribe()
    }

    /// Recompute after every delete made through `view`
    pub fn track(&self, view: &LinkCollectionViewModel) {
        let mut removals = view.removals();
        let weak = Arc::downgrade(&self.inner);

        let task = tokio::spawn(async move {
            loop {
                match removals.recv().await {
                    Ok(id) => match weak.upgrade() {
                        Some(inner) => inner.remove(&id),
                        None => break,
                    },
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Stats tracker missed {} deletes", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        if let Some(previous) = self.inner.tracker.lock().replace(task) {
            previous.abort();
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
                let panel = StatsPanel { inner };
                if let Err(e) = panel.refresh().await {
                    debug!("Triggered stats reload failed: {}", e);
                }
            }
        });

        if let Some(previous) = self.inner.follower.lock().replace(task) {
            previous.abort();
        }
    }

    /// Stop displaying results; loads in flight are ignored on arrival
    pub fn unmount(&self) {
        {
            let mut state = self.inner.state.lock();
            state.mounted = false;
            state.latest_load += 1;
        }
        self.inner.lease.lock().take();
        self.inner.auth.lock().take();
        for slot in [&self.inner.tracker, &self.inner.follower] {
            if let Some(task) = slot.lock().take() {
                task.abort();
            }
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.inner.state.lock().mounted
    }
}
