/// Dashboard composition
///
/// The dashboard mounts the full history view, the statistics panel and the
/// header (profile plus shorten form). Shortening fires the refresh trigger,
/// which both followers react to.
use crate::{
    account::AccountService,
    error::{ClientError, ClientResult},
    links::{CollectionCache, LinkCollectionViewModel, ShortenResult},
    notify::NotificationHub,
    session::{SessionManager, Subscription, UserProfile},
    stats::StatsPanel,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

/// Monotonic counter that followers reload on
#[derive(Clone)]
pub struct RefreshTrigger {
    sender: Arc<watch::Sender<u64>>,
}

impl RefreshTrigger {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(0);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Bump the counter; returns the new value
    pub fn fire(&self) -> u64 {
        self.sender.send_modify(|count| *count += 1);
        let count = *self.sender.borrow();
        debug!("Refresh trigger fired ({})", count);
        count
    }

    pub fn count(&self) -> u64 {
        *self.sender.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.sender.subscribe()
    }
}

impl Default for RefreshTrigger {
    fn default() -> Self {
        Self::new()
    }
}

/// Navigation bar login state
///
/// Kept current only through the session subscription.
pub struct AuthIndicator {
    flag: Arc<AtomicBool>,
    _subscription: Subscription,
}

impl AuthIndicator {
    pub fn new(session: &Arc<SessionManager>) -> Self {
        let flag = Arc::new(AtomicBool::new(session.is_authenticated()));
        let sink = Arc::clone(&flag);
        let subscription = session.subscribe(move |event| {
            sink.store(event.is_authenticated, Ordering::SeqCst);
        });

        Self {
            flag,
            _subscription: subscription,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

pub struct Dashboard {
    history: LinkCollectionViewModel,
    stats: StatsPanel,
    account: AccountService,
    cache: Arc<CollectionCache>,
    trigger: RefreshTrigger,
    notifier: NotificationHub,
}

impl Dashboard {
    pub fn new(
        history: LinkCollectionViewModel,
        stats: StatsPanel,
        account: AccountService,
        cache: Arc<CollectionCache>,
        notifier: NotificationHub,
    ) -> Self {
        let trigger = RefreshTrigger::new();
        history.follow(&trigger);
        stats.follow(&trigger);
        stats.track(&history);

        Self {
            history,
            stats,
            account,
            cache,
            trigger,
            notifier,
        }
    }

    /// Initial load of every panel
    ///
    /// Panels fail independently; the first error is returned after all of
    /// them settled.
    pub async fn mount(&self) -> ClientResult<Option<UserProfile>> {
        let (profile, links, stats) = tokio::join!(
            self.account.fetch_profile(),
            self.history.load(),
            self.stats.load()
        );

        links?;
        stats?;
        match profile {
            Ok(profile) => Ok(Some(profile)),
            Err(e) if e.requires_login() => Err(e),
            Err(_) => Ok(None),
        }
    }

    /// Shorten a URL and refresh the panels
    pub async fn shorten(&self, target_url: &str) -> ClientResult<ShortenResult> {
        match self.cache.api().shorten(target_url).await {
            Ok(result) => {
                info!("Created {}", result.short_url);
                // A fetch still in flight predates the new link
                self.cache.invalidate();
                self.notifier.success("URL shortened successfully!");
                self.trigger.fire();
                Ok(result)
            }
            Err(ClientError::NotAuthenticated) => {
                self.notifier.error("You must be logged in to shorten links.");
                Err(ClientError::NotAuthenticated)
            }
            Err(ClientError::Unauthorized) => Err(ClientError::Unauthorized),
            Err(e) => {
                self.notifier.error(e.to_string());
                Err(e)
            }
        }
    }

    pub fn history(&self) -> &LinkCollectionViewModel {
        &self.history
    }

    pub fn stats(&self) -> &StatsPanel {
        &self.stats
    }

    pub fn trigger(&self) -> &RefreshTrigger {
        &self.trigger
    }

    /// Unmount both panels; pending results are dropped
    pub fn unmount(&self) {
        self.history.unmount();
        self.stats.unmount();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{CredentialStore, MemoryBackend, StoreHandle};

    #[test]
    fn test_trigger_counts() {
        let trigger = RefreshTrigger::new();
        let rx = trigger.subscribe();
        assert_eq!(trigger.fire(), 1);
        assert_eq!(trigger.fire(), 2);
        assert_eq!(*rx.borrow(), 2);
    }

    #[test]
    fn test_auth_indicator_follows_session() {
        let session = SessionManager::new(CredentialStore::new(StoreHandle::new(Arc::new(
            MemoryBackend::new(),
        ))));
        let indicator = AuthIndicator::new(&session);
        assert!(!indicator.is_authenticated());

        session.set_session("tok", None).unwrap();
        assert!(indicator.is_authenticated());

        session.clear_session().unwrap();
        assert!(!indicator.is_authenticated());
    }
}
