//! Shared fixtures for the integration suites
#![allow(dead_code)]

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use umber_client::{
    clipboard::MemoryClipboard,
    http::ScriptedTransport,
    storage::MemoryBackend,
    ClientConfig, ClientContext,
};

pub const API: &str = "http://api.test";

pub struct Harness {
    pub ctx: ClientContext,
    pub transport: Arc<ScriptedTransport>,
    pub clipboard: Arc<MemoryClipboard>,
}

impl Harness {
    pub fn new() -> Self {
        let transport = Arc::new(ScriptedTransport::new());
        let clipboard = Arc::new(MemoryClipboard::new());
        let ctx = ClientContext::with_parts(
            ClientConfig::for_tests(API),
            Arc::new(MemoryBackend::new()),
            transport.clone(),
            clipboard.clone(),
        )
        .expect("context");

        Self {
            ctx,
            transport,
            clipboard,
        }
    }

    /// Harness with a stored token
    pub fn logged_in() -> Self {
        let harness = Self::new();
        harness.ctx.session.set_session("tok", None).expect("login");
        harness
    }

    /// Yield until the transport has seen `count` requests
    pub async fn wait_for_requests(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.transport.request_count() < count {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("requests never arrived");
    }
}

/// `GET /urls` payload with the given ids, newest last
pub fn links(ids: &[&str]) -> serde_json::Value {
    json!(ids
        .iter()
        .enumerate()
        .map(|(day, id)| json!({
            "id": id,
            "key": format!("k{}", id),
            "original_url": format!("https://example.com/{}", id),
            "clicks": day + 1,
            "date_created": format!("2024-01-{:02}T00:00:00Z", day + 1),
            "secret_key": format!("s{}", id),
        }))
        .collect::<Vec<_>>())
}

pub fn ids(links: &umber_client::links::LinkCollection) -> Vec<String> {
    links.iter().map(|record| record.id.clone()).collect()
}
