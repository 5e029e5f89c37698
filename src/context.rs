/// Client context and dependency injection
use crate::{
    account::AccountService,
    clipboard::{Clipboard, SystemClipboard},
    config::{ClientConfig, StorageConfig},
    dashboard::{AuthIndicator, Dashboard},
    error::ClientResult,
    http::{HttpClient, ReqwestTransport, Transport},
    links::{CollectionCache, LinkApi, LinkCollectionViewModel, ViewKind},
    notify::NotificationHub,
    preferences::ThemePreference,
    qr::QrAssetLoader,
    session::{SessionManager, Subscription},
    stats::StatsPanel,
    storage::{CredentialStore, DiskBackend, MemoryBackend, StorageBackend, StoreHandle},
};
use std::sync::Arc;
use tracing::info;

/// One execution context's services
///
/// Contexts created with `new_tab` share the persistent backend (and so the
/// credentials) but have their own session manager, cache and views.
#[derive(Clone)]
pub struct ClientContext {
    pub config: Arc<ClientConfig>,
    pub store: StoreHandle,
    pub session: Arc<SessionManager>,
    pub notifier: NotificationHub,
    pub http: HttpClient,
    pub links: LinkApi,
    pub cache: Arc<CollectionCache>,
    pub account: AccountService,
    pub qr: QrAssetLoader,
    pub theme: ThemePreference,
    pub clipboard: Arc<dyn Clipboard>,
    transport: Arc<dyn Transport>,
    disk: Option<Arc<DiskBackend>>,
    _cache_invalidation: Arc<Subscription>,
}

impl ClientContext {
    /// Create a context from configuration
    pub async fn new(config: ClientConfig) -> ClientResult<Self> {
        // Validate configuration
        config.validate()?;

        // Open the persistent store
        let (backend, disk): (Arc<dyn StorageBackend>, Option<Arc<DiskBackend>>) =
            match &config.storage {
                StorageConfig::Disk { path } => {
                    let disk = Arc::new(DiskBackend::open(path)?);
                    info!("Using state file {}", disk.path().display());
                    let backend: Arc<dyn StorageBackend> = disk.clone();
                    (backend, Some(disk))
                }
                StorageConfig::Memory => {
                    info!("Using in-memory state");
                    let backend: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
                    (backend, None)
                }
            };

        // Initialize the network transport
        let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new(&config.api.user_agent)?);

        Self::assemble(
            Arc::new(config),
            StoreHandle::new(backend),
            disk,
            transport,
            Arc::new(SystemClipboard),
        )
    }

    /// Create a context over explicit parts
    ///
    /// Must be called within a tokio runtime.
    pub fn with_parts(
        config: ClientConfig,
        backend: Arc<dyn StorageBackend>,
        transport: Arc<dyn Transport>,
        clipboard: Arc<dyn Clipboard>,
    ) -> ClientResult<Self> {
        config.validate()?;
        Self::assemble(
            Arc::new(config),
            StoreHandle::new(backend),
            None,
            transport,
            clipboard,
        )
    }

    /// A second context on the same backend, as another tab would be
    pub fn new_tab(&self) -> ClientResult<Self> {
        Self::assemble(
            Arc::clone(&self.config),
            self.store.fork(),
            self.disk.clone(),
            Arc::clone(&self.transport),
            Arc::clone(&self.clipboard),
        )
    }

    fn assemble(
        config: Arc<ClientConfig>,
        store: StoreHandle,
        disk: Option<Arc<DiskBackend>>,
        transport: Arc<dyn Transport>,
        clipboard: Arc<dyn Clipboard>,
    ) -> ClientResult<Self> {
        let notifier = NotificationHub::new();

        // Initialize session manager and start listening to other contexts
        let session = SessionManager::new(CredentialStore::new(store.clone()));
        session.start_sync();

        // Initialize HTTP client and link endpoints
        let http = HttpClient::new(
            &config.api.base_url,
            transport.clone(),
            Arc::clone(&session),
            notifier.clone(),
        );
        let links = LinkApi::new(http.clone(), &config.api.short_link_base);

        // Shared collection cache, dropped on every auth change
        let cache = CollectionCache::new(links.clone(), config.cache_ttl());
        let weak_cache = Arc::downgrade(&cache);
        let cache_invalidation = session.subscribe(move |_| {
            if let Some(cache) = weak_cache.upgrade() {
                cache.invalidate();
            }
        });

        let account = AccountService::new(
            http.clone(),
            Arc::clone(&session),
            store.clone(),
            notifier.clone(),
        );
        let qr = QrAssetLoader::new(http.clone(), notifier.clone());
        let theme = ThemePreference::new(store.clone());

        Ok(Self {
            config,
            store,
            session,
            notifier,
            http,
            links,
            cache,
            account,
            qr,
            theme,
            clipboard,
            transport,
            disk,
            _cache_invalidation: Arc::new(cache_invalidation),
        })
    }

    /// Dashboard table of the newest links
    pub fn compact_view(&self) -> LinkCollectionViewModel {
        self.view(ViewKind::Compact(self.config.views.compact_limit))
    }

    /// Full link history
    pub fn history_view(&self) -> LinkCollectionViewModel {
        self.view(ViewKind::History)
    }

    fn view(&self, kind: ViewKind) -> LinkCollectionViewModel {
        LinkCollectionViewModel::new(
            kind,
            Arc::clone(&self.cache),
            Arc::clone(&self.session),
            self.notifier.clone(),
            Arc::clone(&self.clipboard),
        )
    }

    pub fn stats_panel(&self) -> StatsPanel {
        StatsPanel::new(
            Arc::clone(&self.cache),
            Arc::clone(&self.session),
            self.notifier.clone(),
        )
    }

    /// Mount the dashboard (history, stats, header)
    pub fn dashboard(&self) -> Dashboard {
        Dashboard::new(
            self.history_view(),
            self.stats_panel(),
            self.account.clone(),
            Arc::clone(&self.cache),
            self.notifier.clone(),
        )
    }

    pub fn auth_indicator(&self) -> AuthIndicator {
        AuthIndicator::new(&self.session)
    }

    /// Pick up writes made to the state file by other processes
    ///
    /// Returns the number of keys that changed. In-memory stores have nothing
    /// to reload.
    pub fn reload_store(&self) -> ClientResult<usize> {
        match &self.disk {
            Some(disk) => disk.reload(),
            None => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard::MemoryClipboard;
    use crate::http::ScriptedTransport;

    fn context() -> ClientContext {
        ClientContext::with_parts(
            ClientConfig::for_tests("http://api.test"),
            Arc::new(MemoryBackend::new()),
            Arc::new(ScriptedTransport::new()),
            Arc::new(MemoryClipboard::new()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_tabs_share_credentials() {
        let tab_a = context();
        let tab_b = tab_a.new_tab().unwrap();

        tab_a.session.set_session("tok", None).unwrap();
        assert_eq!(tab_b.session.token().as_deref(), Some("tok"));
        assert_ne!(tab_a.store.context(), tab_b.store.context());
    }

    #[tokio::test]
    async fn test_views_lease_the_cache() {
        let ctx = context();
        let compact = ctx.compact_view();
        let history = ctx.history_view();
        assert_eq!(compact.kind(), ViewKind::Compact(5));
        assert_eq!(ctx.cache.lease_count(), 2);

        drop(compact);
        history.unmount();
        assert_eq!(ctx.cache.lease_count(), 0);
    }

    #[tokio::test]
    async fn test_memory_store_reload_is_noop() {
        assert_eq!(context().reload_store().unwrap(), 0);
    }
}
