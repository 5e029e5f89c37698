/// Link views, shared cache and QR assets through a full client context
mod common;

use common::{ids, links, Harness};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio_test::assert_ok;
use umber_client::{
    http::{Method, Reply},
    links::{SortDirection, SortField, SortSpec, ViewPhase},
    qr::QrState,
    ClientError,
};

#[tokio::test]
async fn test_views_share_one_fetch() {
    let harness = Harness::logged_in();
    harness
        .transport
        .push(Method::GET, "/urls", Reply::json(200, links(&["a", "b", "c", "d", "e", "f"])));

    let compact = harness.ctx.compact_view();
    let history = harness.ctx.history_view();
    let (compact_links, history_links) = tokio::join!(compact.load(), history.load());

    assert_eq!(ids(&compact_links.unwrap()), vec!["f", "e", "d", "c", "b"]);
    assert_eq!(history_links.unwrap().len(), 6);
    assert_eq!(harness.transport.request_count(), 1);
}

#[tokio::test]
async fn test_refresh_always_refetches() {
    let harness = Harness::logged_in();
    harness
        .transport
        .push(Method::GET, "/urls", Reply::json(200, links(&["a"])))
        .push(Method::GET, "/urls", Reply::json(200, links(&["a", "b"])));

    let history = harness.ctx.history_view();
    assert_ok!(history.load().await);
    let refreshed = assert_ok!(history.refresh().await);

    assert_eq!(ids(&refreshed), vec!["b", "a"]);
    assert_eq!(harness.transport.request_count(), 2);
}

#[tokio::test]
async fn test_load_overtaken_by_logout_is_discarded() {
    let harness = Harness::logged_in();
    let gate = Arc::new(Notify::new());
    harness
        .transport
        .push(Method::GET, "/urls", Reply::json(200, links(&["a"])).gated(gate.clone()));

    let history = harness.ctx.history_view();
    let version_before = history.snapshot().version;
    let pending = {
        let history = history.clone();
        tokio::spawn(async move { history.load().await })
    };
    harness.wait_for_requests(1).await;

    harness.ctx.session.clear_session().unwrap();
    let version_after_logout = history.snapshot().version;
    assert!(version_after_logout > version_before);
    gate.notify_one();

    let returned = pending.await.unwrap().unwrap();
    assert_eq!(returned.len(), 1);

    let snapshot = history.snapshot();
    assert_eq!(snapshot.phase, ViewPhase::Unauthenticated);
    assert!(snapshot.links.is_empty());
    assert_eq!(snapshot.version, version_after_logout);
}

#[tokio::test]
async fn test_unmounted_view_ignores_inflight_load() {
    let harness = Harness::logged_in();
    let gate = Arc::new(Notify::new());
    harness
        .transport
        .push(Method::GET, "/urls", Reply::json(200, links(&["a"])).gated(gate.clone()));

    let history = harness.ctx.history_view();
    let pending = {
        let history = history.clone();
        tokio::spawn(async move { history.load().await })
    };
    harness.wait_for_requests(1).await;

    history.unmount();
    gate.notify_one();
    assert_ok!(pending.await.unwrap());

    assert!(!history.is_mounted());
    assert!(history.links().is_empty());
    assert_eq!(harness.ctx.session.subscriber_count(), 1);
}

#[tokio::test]
async fn test_load_issued_before_delete_does_not_resurrect() {
    let harness = Harness::logged_in();
    let gate = Arc::new(Notify::new());
    harness
        .transport
        .push(Method::GET, "/urls", Reply::json(200, links(&["a", "b", "c"])))
        .push(
            Method::GET,
            "/urls",
            Reply::json(200, links(&["a", "b", "c"])).gated(gate.clone()),
        )
        .push(Method::DELETE, "/delete/sa", Reply::status(204));

    let history = harness.ctx.history_view();
    let compact = harness.ctx.compact_view();
    assert_ok!(history.load().await);

    let pending = {
        let compact = compact.clone();
        tokio::spawn(async move { compact.refresh().await })
    };
    harness.wait_for_requests(2).await;

    let secret = history.links().get("a").and_then(|record| record.secret_key.clone());
    assert_ok!(history.delete("a", secret.as_ref()).await);
    gate.notify_one();

    let reloaded = pending.await.unwrap().unwrap();
    assert_eq!(ids(&reloaded), vec!["c", "b"]);
    assert_eq!(ids(&compact.links()), vec!["c", "b"]);
    assert_eq!(ids(&history.links()), vec!["c", "b"]);
}

#[tokio::test]
async fn test_delete_failure_reports_and_keeps_links() {
    let harness = Harness::logged_in();
    harness
        .transport
        .push(Method::GET, "/urls", Reply::json(200, links(&["a", "b"])))
        .push(
            Method::DELETE,
            "/delete/sb",
            Reply::json(404, serde_json::json!({"detail": "URL not found"})),
        );
    let mut toasts = harness.ctx.notifier.subscribe();

    let history = harness.ctx.history_view();
    assert_ok!(history.load().await);
    let secret = history.links().get("b").and_then(|record| record.secret_key.clone());

    let err = history.delete("b", secret.as_ref()).await.unwrap_err();

    assert_eq!(err.to_string(), "URL not found");
    assert_eq!(history.phase(), ViewPhase::Ready);
    assert_eq!(history.links().len(), 2);
    assert_eq!(history.snapshot().last_error.as_deref(), Some("URL not found"));
    assert_eq!(toasts.try_recv().unwrap().message, "URL not found");
}

#[tokio::test]
async fn test_sort_and_copy() {
    let harness = Harness::logged_in();
    harness
        .transport
        .push(Method::GET, "/urls", Reply::json(200, links(&["a", "b", "c"])));

    let history = harness.ctx.history_view();
    assert_ok!(history.load().await);

    history.sort_by(SortSpec::new(SortField::Clicks, SortDirection::Ascending));
    assert_eq!(ids(&history.links()), vec!["a", "b", "c"]);
    let spec = history.toggle_sort(SortField::Clicks);
    assert_eq!(spec.direction, SortDirection::Descending);
    assert_eq!(ids(&history.links()), vec!["c", "b", "a"]);

    let copied = assert_ok!(history.copy_short_url("b"));
    assert_eq!(copied, "http://api.test/s/kb");
    assert_eq!(harness.clipboard.contents().as_deref(), Some("http://api.test/s/kb"));
}

#[tokio::test]
async fn test_server_error_moves_view_to_error() {
    let harness = Harness::logged_in();
    harness.transport.push(
        Method::GET,
        "/urls",
        Reply::json(500, serde_json::json!({"detail": "Database unavailable"})),
    );

    let history = harness.ctx.history_view();
    let err = history.load().await.unwrap_err();

    assert!(matches!(err, ClientError::Api { status: 500, .. }));
    assert_eq!(
        history.phase(),
        ViewPhase::Error("Database unavailable".to_string())
    );
    assert!(harness.ctx.session.is_authenticated());
}

#[tokio::test]
async fn test_missing_qr_fails_with_message() {
    let harness = Harness::new();
    let mut toasts = harness.ctx.notifier.subscribe();

    let mut view = harness.ctx.qr.open("nope");
    let asset = view.settled().await;

    assert_eq!(
        asset.state,
        QrState::Failed("Failed to load QR code. Please try again.".to_string())
    );
    assert!(asset.data_url().is_none());
    assert_eq!(toasts.try_recv().unwrap().message, "Failed to load QR code.");
}

#[tokio::test]
async fn test_qr_download() {
    let harness = Harness::new();
    harness.transport.push(
        Method::GET,
        "/qr/kx",
        Reply::bytes(200, "image/png", vec![0x89, b'P', b'N', b'G']),
    );
    let dir = tempfile::tempdir().unwrap();

    let asset = harness.ctx.qr.load_qr("kx").await;
    assert!(asset.is_ready());
    assert!(asset
        .data_url()
        .unwrap()
        .starts_with("data:image/png;base64,"));

    let path = assert_ok!(harness.ctx.qr.download(&asset, dir.path()).await).unwrap();
    assert_eq!(path.file_name().unwrap(), "linkly-qr-kx.png");
    assert_eq!(std::fs::read(path).unwrap(), vec![0x89, b'P', b'N', b'G']);
}
