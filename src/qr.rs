/// QR code asset loading
///
/// Each request for a QR view creates a fresh asset; nothing is cached.
use crate::{
    error::{ClientError, ClientResult},
    http::{HttpClient, Method},
    notify::NotificationHub,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

const FAILED_STATE_MESSAGE: &str = "Failed to load QR code. Please try again.";
const DEFAULT_CONTENT_TYPE: &str = "image/png";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QrState {
    Loading,
    Ready,
    Failed(String),
}

/// A fetched (or failed) QR image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrAsset {
    pub key: String,
    pub image_data: Option<Vec<u8>>,
    pub content_type: Option<String>,
    pub state: QrState,
}

impl QrAsset {
    fn loading(key: &str) -> Self {
        Self {
            key: key.to_string(),
            image_data: None,
            content_type: None,
            state: QrState::Loading,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state == QrState::Ready && self.image_data.is_some()
    }

    /// `data:<content-type>;base64,...`
    pub fn data_url(&self) -> Option<String> {
        let data = self.image_data.as_ref()?;
        let content_type = self.content_type.as_deref().unwrap_or(DEFAULT_CONTENT_TYPE);
        Some(format!("data:{};base64,{}", content_type, STANDARD.encode(data)))
    }

    /// File name used for downloads
    pub fn file_name(&self) -> String {
        format!("linkly-qr-{}.png", self.key)
    }
}

/// Fetches QR images with the public (unauthenticated) endpoint
#[derive(Clone)]
pub struct QrAssetLoader {
    http: HttpClient,
    notifier: NotificationHub,
}

impl QrAssetLoader {
    pub fn new(http: HttpClient, notifier: NotificationHub) -> Self {
        Self { http, notifier }
    }

    /// Fetch the image for `key`; always ends `Ready` or `Failed`
    pub async fn load_qr(&self, key: &str) -> QrAsset {
        let mut asset = QrAsset::loading(key);

        match self.fetch(key).await {
            Ok((data, content_type)) => {
                asset.image_data = Some(data);
                asset.content_type = content_type;
                asset.state = QrState::Ready;
            }
            Err(e) => {
                warn!("QR code for {} failed to load: {}", key, e);
                asset.state = QrState::Failed(FAILED_STATE_MESSAGE.to_string());
                self.notifier.error("Failed to load QR code.");
            }
        }

        asset
    }

    async fn fetch(&self, key: &str) -> ClientResult<(Vec<u8>, Option<String>)> {
        let path = format!("/qr/{}", urlencoding::encode(key));
        let response = self
            .http
            .request_public(Method::GET, &path, None)
            .await
            .map_err(|e| ClientError::AssetLoad(e.to_string()))?;

        if response.body.is_empty() {
            return Err(ClientError::AssetLoad("empty image body".to_string()));
        }

        let content_type = response
            .content_type
            .filter(|value| value.starts_with("image/"));
        Ok((response.body, content_type))
    }

    /// Open a QR view; the load runs in the background
    pub fn open(&self, key: &str) -> QrView {
        let (sender, receiver) = watch::channel(QrAsset::loading(key));
        let loader = self.clone();
        let key = key.to_string();

        let task = tokio::spawn(async move {
            let asset = loader.load_qr(&key).await;
            let _ = sender.send(asset);
        });

        QrView { receiver, task }
    }

    /// Save a ready asset into `dir`
    ///
    /// When the asset is not ready an error toast is shown and `None` is
    /// returned without touching the filesystem.
    pub async fn download(&self, asset: &QrAsset, dir: &Path) -> ClientResult<Option<PathBuf>> {
        let Some(data) = asset.image_data.as_ref().filter(|_| asset.is_ready()) else {
            self.notifier.error("QR code not available for download.");
            return Ok(None);
        };

        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(asset.file_name());
        tokio::fs::write(&path, data).await?;

        info!("QR code saved to {}", path.display());
        self.notifier.success("QR code downloaded!");
        Ok(Some(path))
    }
}

/// A dismissible QR view
///
/// Dropping the view (or calling `close`) discards a result that has not
/// arrived yet.
pub struct QrView {
    receiver: watch::Receiver<QrAsset>,
    task: JoinHandle<()>,
}

impl QrView {
    pub fn current(&self) -> QrAsset {
        self.receiver.borrow().clone()
    }

    /// Wait until the asset leaves `Loading`
    pub async fn settled(&mut self) -> QrAsset {
        let settled = self
            .receiver
            .wait_for(|asset| asset.state != QrState::Loading)
            .await
            .map(|asset| asset.clone());
        settled.unwrap_or_else(|_| self.current())
    }

    pub fn close(self) {}
}

impl Drop for QrView {
    fn drop(&mut self) {
        self.task.abort();
    }
}
