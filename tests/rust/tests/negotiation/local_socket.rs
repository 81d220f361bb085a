//! Negotiation over real Unix sockets

use std::sync::Arc;
use std::time::Duration;

use atlascode_auth::{IpcResponder, LocalSocketTransport, ProcessCoordinator};
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;
use tests::async_helpers::{with_timeout, DEFAULT_TIMEOUT};
use tests::cluster::{fast_config, Cluster, Process};
use tests::fixtures::{jira_site, jwt_with_iat, oauth_info, HOUR_MS, MINUTE_MS};
use tests::providers::settings_at;
use tokio::sync::mpsc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn socket_process(cluster: &Cluster, dir: &TempDir, pid: u32) -> Process {
    cluster.process(pid, Arc::new(LocalSocketTransport::new(dir.path())))
}

#[tokio::test]
async fn test_reachable_ruler_receives_refresh_request() {
    let dir = tempfile::tempdir().unwrap();
    let cluster = Cluster::new(settings_at("http://127.0.0.1:9"));
    let ruler = socket_process(&cluster, &dir, 100);
    let other = socket_process(&cluster, &dir, 101);
    let site = jira_site();

    assert!(ruler.negotiator.this_is_the_responsible_process(&site).await);
    let (tx, mut requests) = mpsc::unbounded_channel();
    let _responder = IpcResponder::bind(dir.path(), 100, tx).await.unwrap();

    assert!(!other.negotiator.this_is_the_responsible_process(&site).await);
    let requested = with_timeout(DEFAULT_TIMEOUT, requests.recv()).await.unwrap();
    assert_eq!(requested, site);
    assert_eq!(cluster.state.ruling_pid().await, Some(100));
}

#[tokio::test]
async fn test_role_moves_when_ruler_exits() {
    let dir = tempfile::tempdir().unwrap();
    let cluster = Cluster::new(settings_at("http://127.0.0.1:9"));
    let ruler = socket_process(&cluster, &dir, 200);
    let other = socket_process(&cluster, &dir, 201);
    let site = jira_site();

    assert!(ruler.negotiator.this_is_the_responsible_process(&site).await);
    let (tx, _requests) = mpsc::unbounded_channel();
    let responder = IpcResponder::bind(dir.path(), 200, tx).await.unwrap();
    assert!(!other.negotiator.this_is_the_responsible_process(&site).await);

    drop(responder);
    assert!(other.negotiator.this_is_the_responsible_process(&site).await);
    assert_eq!(cluster.state.ruling_pid().await, Some(201));

    // The former ruler now defers to the new one once it serves its endpoint
    let (tx, mut requests) = mpsc::unbounded_channel();
    let _responder = IpcResponder::bind(dir.path(), 201, tx).await.unwrap();
    assert!(!ruler.negotiator.this_is_the_responsible_process(&site).await);
    assert_eq!(with_timeout(DEFAULT_TIMEOUT, requests.recv()).await, Some(site));
}

#[tokio::test]
async fn test_ruler_refreshes_on_behalf_of_other_process() {
    let provider = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": jwt_with_iat(2000),
            "refresh_token": "refresh-2",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&provider)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let cluster = Cluster::new(settings_at(&provider.uri()))
        .with_config(fast_config().with_refresh_wait(Duration::from_millis(750)));
    let ruler = socket_process(&cluster, &dir, 300);
    let other = socket_process(&cluster, &dir, 301);
    let site = jira_site();

    // Expires inside the grace period but is not expired yet
    ruler
        .credentials
        .save_auth_info(&site, &oauth_info("stale", 1000, 1, 5 * MINUTE_MS))
        .await
        .unwrap();
    assert!(ruler.negotiator.this_is_the_responsible_process(&site).await);

    let (tx, requests) = mpsc::unbounded_channel();
    let _responder = IpcResponder::bind(dir.path(), 300, tx).await.unwrap();
    let listener = ruler.clients.spawn_refresh_listener(requests);

    let client = other.clients.jira_client(&site).await.unwrap();
    assert_eq!(
        client.authorization().header_value(),
        format!("Bearer {}", jwt_with_iat(2000))
    );

    let stored = other.credentials.get_auth_info(&site, false).await.unwrap().unwrap();
    let secret = stored.oauth_secret().unwrap();
    assert_eq!(secret.iat, Some(2000));
    assert_eq!(secret.refresh, "refresh-2");
    assert!(secret.expiration_date.unwrap() > tests::fixtures::now_millis() + HOUR_MS - MINUTE_MS);

    listener.abort();
}
