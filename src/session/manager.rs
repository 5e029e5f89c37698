/// Session manager - token lifecycle and auth change fan-out
use crate::{
    error::ClientResult,
    session::{AuthEvent, Session, UserProfile},
    storage::{keys, Credential, CredentialStore, RemoteChange},
};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const AUTH_EVENT_BUFFER: usize = 32;

type Handler = Arc<dyn Fn(&AuthEvent) + Send + Sync>;

/// Owns the authentication state of one execution context
///
/// All token writes go through `set_session`, `clear_session` and
/// `expire_session`. Subscribers are called synchronously, in registration
/// order, outside of any internal lock.
pub struct SessionManager {
    credentials: CredentialStore,
    user: RwLock<Option<UserProfile>>,
    subscribers: Mutex<Vec<(u64, Handler)>>,
    next_subscriber: AtomicU64,
    /// Serializes token writes so compare-and-clear is atomic
    write_lock: Mutex<()>,
    events: broadcast::Sender<AuthEvent>,
    sync_task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    /// Create a session manager over a credential store
    pub fn new(credentials: CredentialStore) -> Arc<Self> {
        let (events, _) = broadcast::channel(AUTH_EVENT_BUFFER);
        Arc::new(Self {
            credentials,
            user: RwLock::new(None),
            subscribers: Mutex::new(Vec::new()),
            next_subscriber: AtomicU64::new(1),
            write_lock: Mutex::new(()),
            events,
            sync_task: Mutex::new(None),
        })
    }

    /// Start observing token writes made by other contexts
    ///
    /// Must be called from within a tokio runtime. Calling it twice is a no-op.
    pub fn start_sync(self: &Arc<Self>) {
        let mut task = self.sync_task.lock();
        if task.is_some() {
            return;
        }

        let weak: Weak<Self> = Arc::downgrade(self);
        let mut changes = self.credentials.handle().remote_changes();

        *task = Some(tokio::spawn(async move {
            while let Some(change) = changes.next().await {
                let Some(manager) = weak.upgrade() else {
                    break;
                };
                match change {
                    RemoteChange::Changed(event) if event.key == keys::ACCESS_TOKEN => {
                        manager.on_remote_change(event.new_value.is_some());
                    }
                    RemoteChange::Changed(_) => {}
                    RemoteChange::Resync => {
                        let is_authenticated = manager.is_authenticated();
                        manager.on_remote_change(is_authenticated);
                    }
                }
            }
            debug!("Session sync task finished");
        }));
    }

    /// Current access token; no side effects
    pub fn token(&self) -> Option<String> {
        match self.credentials.access_token() {
            Ok(token) => token,
            Err(e) => {
                warn!("Failed to read access token: {}", e);
                None
            }
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }

    /// Derived session snapshot
    pub fn session(&self) -> Session {
        let is_authenticated = self.is_authenticated();
        let user = if is_authenticated {
            self.user.read().clone()
        } else {
            None
        };
        Session {
            is_authenticated,
            user,
        }
    }

    pub fn credential(&self) -> ClientResult<Credential> {
        self.credentials.credential()
    }

    /// Store a fresh token pair and announce the login
    pub fn set_session(&self, access_token: &str, refresh_token: Option<&str>) -> ClientResult<()> {
        {
            let _guard = self.write_lock.lock();
            self.credentials.set(access_token, refresh_token)?;
            *self.user.write() = None;
        }

        info!("Session established");
        self.dispatch(AuthEvent::local(true));
        Ok(())
    }

    /// Remove both tokens and announce the logout
    ///
    /// Returns whether a session was present.
    pub fn clear_session(&self) -> ClientResult<bool> {
        let was_authenticated = {
            let _guard = self.write_lock.lock();
            let was_authenticated = self.credentials.access_token()?.is_some();
            self.credentials.clear()?;
            *self.user.write() = None;
            was_authenticated
        };

        info!("Session cleared");
        self.dispatch(AuthEvent::local(false));
        Ok(was_authenticated)
    }

    /// Clear the session only if it still holds `token_used`
    ///
    /// Returns `true` when this call cleared the session. Any number of
    /// concurrent callers holding the same rejected token see exactly one
    /// `true`, and a rejection of an old token never clears a newer login.
    pub fn expire_session(&self, token_used: &str) -> ClientResult<bool> {
        {
            let _guard = self.write_lock.lock();
            if self.credentials.access_token()?.as_deref() != Some(token_used) {
                return Ok(false);
            }
            self.credentials.clear()?;
            *self.user.write() = None;
        }

        info!("Session expired, tokens cleared");
        self.dispatch(AuthEvent::local(false));
        Ok(true)
    }

    /// Record the profile fetched for the current token
    pub fn set_user(&self, profile: UserProfile) {
        *self.user.write() = Some(profile);
    }

    /// Record `profile` only if the session still holds `token_used`
    ///
    /// Returns `false` when the token changed while the profile was in flight.
    pub fn set_user_for(&self, token_used: &str, profile: UserProfile) -> ClientResult<bool> {
        let _guard = self.write_lock.lock();
        if self.credentials.access_token()?.as_deref() != Some(token_used) {
            return Ok(false);
        }
        *self.user.write() = Some(profile);
        Ok(true)
    }

    /// Register a handler for local and remote auth changes
    ///
    /// The handler stays registered until the returned subscription is
    /// dropped or `unsubscribe` is called.
    #[must_use = "dropping the subscription unsubscribes the handler"]
    pub fn subscribe<F>(self: &Arc<Self>, handler: F) -> Subscription
    where
        F: Fn(&AuthEvent) + Send + Sync + 'static,
    {
        let id = self.next_subscriber.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().push((id, Arc::new(handler)));
        Subscription {
            id,
            manager: Arc::downgrade(self),
        }
    }

    /// Channel form of the auth change notifications
    pub fn auth_state_changes(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    /// Number of registered handlers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    fn on_remote_change(&self, is_authenticated: bool) {
        // Any remote token write may be a different account
        *self.user.write() = None;
        debug!("Observed remote auth change: authenticated={}", is_authenticated);
        self.dispatch(AuthEvent::remote(is_authenticated));
    }

    fn unsubscribe(&self, id: u64) {
        self.subscribers.lock().retain(|(existing, _)| *existing != id);
    }

    fn dispatch(&self, event: AuthEvent) {
        let handlers: Vec<Handler> = self
            .subscribers
            .lock()
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();

        for handler in handlers {
            handler(&event);
        }

        let _ = self.events.send(event);
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        if let Some(task) = self.sync_task.get_mut().take() {
            task.abort();
        }
    }
}

/// Handle returned by `SessionManager::subscribe`
pub struct Subscription {
    id: u64,
    manager: Weak<SessionManager>,
}

impl Subscription {
    /// Remove the handler now
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(manager) = self.manager.upgrade() {
            manager.unsubscribe(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::EventOrigin;
    use crate::storage::{MemoryBackend, StoreHandle};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn manager_on(handle: StoreHandle) -> Arc<SessionManager> {
        SessionManager::new(CredentialStore::new(handle))
    }

    fn new_manager() -> Arc<SessionManager> {
        manager_on(StoreHandle::new(Arc::new(MemoryBackend::new())))
    }

    #[test]
    fn test_set_and_clear_session() {
        let manager = new_manager();
        assert!(!manager.is_authenticated());

        manager.set_session("access-1", Some("refresh-1")).unwrap();
        assert_eq!(manager.token(), Some("access-1".to_string()));
        assert!(manager.session().is_authenticated);

        assert!(manager.clear_session().unwrap());
        assert_eq!(manager.token(), None);
        assert!(!manager.clear_session().unwrap());
    }

    #[test]
    fn test_set_user_for_ignores_replaced_token() {
        let manager = new_manager();
        let profile: UserProfile =
            serde_json::from_value(serde_json::json!({"username": "alice"})).unwrap();

        manager.set_session("alice-token", None).unwrap();
        assert!(manager.set_user_for("alice-token", profile.clone()).unwrap());
        assert_eq!(manager.session().user.as_ref(), Some(&profile));

        manager.set_session("bob-token", None).unwrap();
        assert!(!manager.set_user_for("alice-token", profile).unwrap());
        assert_eq!(manager.session().user, None);
    }

    #[test]
    fn test_subscribers_see_local_events() {
        let manager = new_manager();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        let _sub = manager.subscribe(move |event| sink.lock().push(*event));

        manager.set_session("access-1", None).unwrap();
        manager.clear_session().unwrap();

        let seen = seen.lock();
        assert_eq!(*seen, vec![AuthEvent::local(true), AuthEvent::local(false)]);
    }

    #[test]
    fn test_dropping_subscription_unsubscribes() {
        let manager = new_manager();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        let sub = manager.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(manager.subscriber_count(), 1);

        manager.set_session("a", None).unwrap();
        sub.unsubscribe();
        manager.clear_session().unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(manager.subscriber_count(), 0);
    }

    #[test]
    fn test_handler_may_reenter_manager() {
        let manager = new_manager();
        let inner = Arc::clone(&manager);
        let _sub = manager.subscribe(move |event| {
            // Reads the store while the dispatch is running
            assert_eq!(inner.is_authenticated(), event.is_authenticated);
        });

        manager.set_session("a", None).unwrap();
        manager.clear_session().unwrap();
    }

    #[test]
    fn test_expire_session_is_idempotent() {
        let manager = new_manager();
        let expirations = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&expirations);
        let _sub = manager.subscribe(move |event| {
            if !event.is_authenticated {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        manager.set_session("stale", None).unwrap();
        assert!(manager.expire_session("stale").unwrap());
        assert!(!manager.expire_session("stale").unwrap());
        assert!(!manager.expire_session("stale").unwrap());

        assert_eq!(expirations.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_expire_with_old_token_keeps_new_login() {
        let manager = new_manager();
        manager.set_session("old", None).unwrap();
        manager.set_session("new", None).unwrap();

        assert!(!manager.expire_session("old").unwrap());
        assert_eq!(manager.token(), Some("new".to_string()));
    }

    #[test]
    fn test_profile_is_dropped_with_session() {
        let manager = new_manager();
        manager.set_session("a", None).unwrap();
        manager.set_user(UserProfile {
            username: Some("ada".to_string()),
            email: None,
            extra: Default::default(),
        });
        assert!(manager.session().user.is_some());

        manager.clear_session().unwrap();
        assert_eq!(manager.session().user, None);
    }

    #[tokio::test]
    async fn test_remote_logout_reaches_other_context() {
        let tab_a = StoreHandle::new(Arc::new(MemoryBackend::new()));
        let tab_b = tab_a.fork();

        let manager_a = manager_on(tab_a);
        let manager_b = manager_on(tab_b);
        manager_b.start_sync();

        manager_a.set_session("shared", None).unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = manager_b.subscribe(move |event| {
            let _ = tx.send(*event);
        });

        // Drain the login that B observed remotely
        let login = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(login, AuthEvent::remote(true));

        manager_a.clear_session().unwrap();

        let logout = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(!logout.is_authenticated);
        assert_eq!(logout.origin, EventOrigin::Remote);
        assert!(!manager_b.is_authenticated());
    }

    #[tokio::test]
    async fn test_remote_account_switch_drops_user() {
        let tab_a = StoreHandle::new(Arc::new(MemoryBackend::new()));
        let tab_b = tab_a.fork();

        let manager_a = manager_on(tab_a);
        let manager_b = manager_on(tab_b);
        manager_b.start_sync();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = manager_b.subscribe(move |event| {
            let _ = tx.send(*event);
        });

        manager_a.set_session("alice-token", None).unwrap();
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();

        let alice: UserProfile =
            serde_json::from_value(serde_json::json!({"username": "alice"})).unwrap();
        assert!(manager_b.set_user_for("alice-token", alice).unwrap());

        manager_a.set_session("bob-token", None).unwrap();
        let switched = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(switched, AuthEvent::remote(true));
        assert_eq!(manager_b.token().as_deref(), Some("bob-token"));
        assert_eq!(manager_b.session().user, None);
    }
}
