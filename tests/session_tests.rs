/// Session behaviour across contexts and under concurrent rejection
mod common;

use common::{links, Harness};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_test::{assert_err, assert_ok};
use umber_client::{
    http::{Method, Reply},
    links::ViewPhase,
    notify::NotificationLevel,
    session::EventOrigin,
    ClientError,
};

#[tokio::test]
async fn test_login_in_one_tab_reaches_the_other() {
    let harness = Harness::new();
    harness.transport.push(
        Method::POST,
        "/token",
        Reply::json(200, json!({"access_token": "t1", "token_type": "bearer"})),
    );

    let tab_b = assert_ok!(harness.ctx.new_tab());
    let indicator = tab_b.auth_indicator();
    let mut events = tab_b.session.auth_state_changes();
    assert!(!indicator.is_authenticated());

    let target = assert_ok!(harness.ctx.account.login("ada", "hunter22").await);
    assert_eq!(target, "/");

    let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("no auth event")
        .unwrap();
    assert!(event.is_authenticated);
    assert_eq!(event.origin, EventOrigin::Remote);
    assert!(indicator.is_authenticated());
    assert_eq!(tab_b.session.token().as_deref(), Some("t1"));
}

#[tokio::test]
async fn test_logout_in_one_tab_clears_views_in_the_other() {
    let harness = Harness::logged_in();
    harness
        .transport
        .push(Method::GET, "/urls", Reply::json(200, links(&["a", "b"])));

    let tab_b = harness.ctx.new_tab().unwrap();
    let history = tab_b.history_view();
    let mut snapshots = history.subscribe();
    assert_ok!(history.load().await);
    assert_eq!(history.links().len(), 2);

    assert_ok!(harness.ctx.account.logout());

    let cleared = tokio::time::timeout(
        Duration::from_secs(5),
        snapshots.wait_for(|snapshot| snapshot.phase == ViewPhase::Unauthenticated),
    )
    .await
    .expect("view never cleared")
    .unwrap()
    .clone();
    assert!(cleared.links.is_empty());
    assert!(!tab_b.session.is_authenticated());
}

#[tokio::test]
async fn test_concurrent_rejections_clear_once() {
    let harness = Harness::logged_in();
    let gate = Arc::new(Notify::new());
    harness
        .transport
        .push(Method::GET, "/urls", Reply::status(401).gated(gate.clone()))
        .push(Method::GET, "/users/me", Reply::status(401).gated(gate.clone()));

    let mut toasts = harness.ctx.notifier.subscribe();
    let mut events = harness.ctx.session.auth_state_changes();

    let history = harness.ctx.history_view();
    let account = harness.ctx.account.clone();
    let load = tokio::spawn(async move { history.load().await });
    let profile = tokio::spawn(async move { account.fetch_profile().await });

    harness.wait_for_requests(2).await;
    gate.notify_waiters();

    assert!(matches!(load.await.unwrap(), Err(ClientError::Unauthorized)));
    assert!(matches!(profile.await.unwrap(), Err(ClientError::Unauthorized)));
    assert!(!harness.ctx.session.is_authenticated());

    let event = events.try_recv().unwrap();
    assert!(!event.is_authenticated);
    assert_err!(events.try_recv());

    let mut expired = Vec::new();
    while let Ok(toast) = toasts.try_recv() {
        expired.push(toast);
    }
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].level, NotificationLevel::Error);
    assert_eq!(expired[0].message, ClientError::Unauthorized.to_string());
}

#[tokio::test]
async fn test_rejected_old_token_keeps_new_login() {
    let harness = Harness::logged_in();
    let gate = Arc::new(Notify::new());
    harness
        .transport
        .push(Method::GET, "/users/me", Reply::status(401).gated(gate.clone()));

    let account = harness.ctx.account.clone();
    let profile = tokio::spawn(async move { account.fetch_profile().await });
    harness.wait_for_requests(1).await;

    harness.ctx.session.set_session("fresh", None).unwrap();
    gate.notify_waiters();

    assert!(matches!(profile.await.unwrap(), Err(ClientError::Unauthorized)));
    assert_eq!(harness.ctx.session.token().as_deref(), Some("fresh"));
}

#[tokio::test]
async fn test_auth_change_drops_cached_collection() {
    let harness = Harness::logged_in();
    harness
        .transport
        .push(Method::GET, "/urls", Reply::json(200, links(&["a"])));

    let history = harness.ctx.history_view();
    assert_ok!(history.load().await);
    assert_ok!(history.load().await);
    assert_eq!(harness.transport.request_count(), 1);

    harness.ctx.session.set_session("other", None).unwrap();
    assert_ok!(history.load().await);
    assert_eq!(harness.transport.request_count(), 2);
}

#[tokio::test]
async fn test_account_switch_in_one_tab_resets_the_other() {
    let harness = Harness::logged_in();
    harness
        .transport
        .push(Method::GET, "/urls", Reply::json(200, links(&["a", "b"])))
        .push(
            Method::GET,
            "/users/me",
            Reply::json(200, json!({"username": "alice", "email": "alice@example.com"})),
        );

    let tab_b = harness.ctx.new_tab().unwrap();
    let history = tab_b.history_view();
    let mut snapshots = history.subscribe();
    assert_ok!(history.load().await);
    let profile = assert_ok!(tab_b.account.fetch_profile().await);
    assert_eq!(profile.display_name(), "alice");

    assert_ok!(harness.ctx.session.set_session("bob-token", None));

    let reset = tokio::time::timeout(
        Duration::from_secs(5),
        snapshots.wait_for(|snapshot| snapshot.phase == ViewPhase::Idle),
    )
    .await
    .expect("view never reset")
    .unwrap()
    .clone();
    assert!(reset.links.is_empty());
    assert_eq!(tab_b.session.token().as_deref(), Some("bob-token"));
    assert!(tab_b.session.session().user.is_none());
    assert!(tab_b.session.is_authenticated());
}
