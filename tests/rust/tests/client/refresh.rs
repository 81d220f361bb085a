//! Grace-period refresh across processes

use std::time::Duration;

use atlascode_auth::Authorization;
use atlascode_core::AuthError;
use pretty_assertions::assert_eq;
use serde_json::json;
use tests::async_helpers::{eventually, with_timeout, DEFAULT_TIMEOUT};
use tests::cluster::Cluster;
use tests::fixtures::{jira_site, jwt_info, jwt_with_iat, oauth_info, HOUR_MS, MINUTE_MS};
use tests::providers::settings_at;
use tests::{MockPeerTransport, PeerReply};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn token_body(iat: i64) -> serde_json::Value {
    json!({
        "access_token": jwt_with_iat(iat),
        "refresh_token": format!("refresh-{}", iat),
        "expires_in": 3600
    })
}

fn bearer(iat: i64) -> Authorization {
    Authorization::Bearer(jwt_with_iat(iat))
}

#[tokio::test]
async fn test_concurrent_requests_refresh_once() {
    let provider = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("refresh_token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(token_body(2000))
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&provider)
        .await;

    let cluster = Cluster::new(settings_at(&provider.uri()));
    let process = cluster.process(1, MockPeerTransport::new(PeerReply::Refused));
    let site = jira_site();
    process
        .credentials
        .save_auth_info(&site, &oauth_info("stale", 1000, 1, 5 * MINUTE_MS))
        .await
        .unwrap();

    let requests = (0..5).map(|_| process.clients.jira_client(&site));
    let clients = with_timeout(DEFAULT_TIMEOUT, futures::future::join_all(requests)).await;
    for client in clients {
        assert_eq!(*client.unwrap().authorization(), bearer(2000));
    }
    assert_eq!(process.clients.cached_clients(), 1);
    assert_eq!(cluster.state.ruling_pid().await, Some(1));
}

#[tokio::test]
async fn test_delayed_refresh_loses_to_newer_token() {
    let provider = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(token_body(999))
                .set_delay(Duration::from_millis(400)),
        )
        .expect(1)
        .mount(&provider)
        .await;

    let cluster = Cluster::new(settings_at(&provider.uri()));
    let refreshing = cluster.process(1, MockPeerTransport::new(PeerReply::Refused));
    let other = cluster.process(2, MockPeerTransport::new(PeerReply::Refused));
    let site = jira_site();
    refreshing
        .credentials
        .save_auth_info(&site, &oauth_info("stale", 900, 1, 5 * MINUTE_MS))
        .await
        .unwrap();

    // Another process stores iat 1000 while the refresh is in flight
    let newer = {
        let credentials = other.credentials.clone();
        let site = site.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            credentials
                .save_auth_info(&site, &jwt_info(1000, HOUR_MS))
                .await
        })
    };

    let client = with_timeout(DEFAULT_TIMEOUT, refreshing.clients.jira_client(&site))
        .await
        .unwrap();
    newer.await.unwrap().unwrap();

    assert_eq!(*client.authorization(), bearer(1000));
    let stored = other.credentials.get_auth_info(&site, false).await.unwrap().unwrap();
    assert_eq!(stored.oauth_secret().unwrap().iat, Some(1000));
}

#[tokio::test]
async fn test_non_responsible_process_rereads_store() {
    let provider = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body(5000)))
        .expect(0)
        .mount(&provider)
        .await;

    let cluster = Cluster::new(settings_at(&provider.uri()));
    cluster.state.set_ruling_pid(1).await.unwrap();
    let ruler = cluster.process(1, MockPeerTransport::new(PeerReply::Refused));
    let transport = MockPeerTransport::new(PeerReply::Ack);
    let waiting = cluster.process(2, transport.clone());
    let site = jira_site();
    waiting
        .credentials
        .save_auth_info(&site, &oauth_info("stale", 1000, 1, 5 * MINUTE_MS))
        .await
        .unwrap();

    // The ruler's refresh lands while the waiting process sleeps
    let refreshed = {
        let credentials = ruler.credentials.clone();
        let site = site.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            credentials
                .save_auth_info(&site, &jwt_info(1001, HOUR_MS))
                .await
        })
    };

    let client = with_timeout(DEFAULT_TIMEOUT, waiting.clients.jira_client(&site))
        .await
        .unwrap();
    refreshed.await.unwrap().unwrap();
    assert_eq!(*client.authorization(), bearer(1001));
    assert_eq!(transport.pinged(), vec![(1, site.host.clone())]);
    assert_eq!(cluster.state.ruling_pid().await, Some(1));
}

#[tokio::test]
async fn test_failed_refresh_of_expired_token_is_error() {
    let provider = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&provider)
        .await;

    let cluster = Cluster::new(settings_at(&provider.uri()));
    let process = cluster.process(1, MockPeerTransport::new(PeerReply::Refused));
    let site = jira_site();
    process
        .credentials
        .save_auth_info(&site, &oauth_info("expired", 1000, 1, -MINUTE_MS))
        .await
        .unwrap();

    match process.clients.jira_client(&site).await {
        Err(AuthError::Http { status, .. }) => assert_eq!(status, 503),
        other => panic!("expected http error, got {:?}", other),
    }
    assert_eq!(process.clients.cached_clients(), 0);

    // A transient failure leaves the credential valid
    let stored = process.credentials.get_auth_info(&site, false).await.unwrap().unwrap();
    assert!(stored.is_valid());
}

#[tokio::test]
async fn test_credential_update_evicts_cached_client() {
    let cluster = Cluster::new(settings_at("http://127.0.0.1:9"));
    let process = cluster.process(1, MockPeerTransport::new(PeerReply::Refused));
    let site = jira_site();

    process
        .credentials
        .save_auth_info(&site, &oauth_info("first", 1000, 1, HOUR_MS))
        .await
        .unwrap();
    let client = process.clients.jira_client(&site).await.unwrap();
    assert_eq!(*client.authorization(), Authorization::Bearer("first".to_string()));
    assert_eq!(process.clients.cached_clients(), 1);

    let listener = process.clients.spawn_event_listener(process.bus.subscribe());
    process
        .credentials
        .save_auth_info(&site, &oauth_info("second", 1001, 2, HOUR_MS))
        .await
        .unwrap();
    let clients = process.clients.clone();
    assert!(eventually(DEFAULT_TIMEOUT, || clients.cached_clients() == 0).await);

    let client = process.clients.jira_client(&site).await.unwrap();
    assert_eq!(*client.authorization(), Authorization::Bearer("second".to_string()));
    listener.abort();
}
