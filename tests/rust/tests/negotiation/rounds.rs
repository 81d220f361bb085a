//! Negotiation rounds with scripted peers

use std::time::Duration;

use atlascode_auth::{OAuthSettings, ProcessCoordinator};
use pretty_assertions::assert_eq;
use tests::cluster::{fast_config, Cluster};
use tests::fixtures::jira_site;
use tests::{MockPeerTransport, PeerReply};

#[tokio::test]
async fn test_first_process_claims_without_ping() {
    let cluster = Cluster::new(OAuthSettings::new());
    let transport = MockPeerTransport::new(PeerReply::Ack);
    let process = cluster.process(10, transport.clone());

    assert!(process.negotiator.this_is_the_responsible_process(&jira_site()).await);
    assert_eq!(cluster.state.ruling_pid().await, Some(10));
    assert_eq!(transport.ping_count(), 0);

    // Repeated questions are answered from the claim
    assert!(process.negotiator.this_is_the_responsible_process(&jira_site()).await);
    assert_eq!(transport.ping_count(), 0);
}

#[tokio::test]
async fn test_live_ruler_keeps_role() {
    let cluster = Cluster::new(OAuthSettings::new());
    cluster.state.set_ruling_pid(10).await.unwrap();
    let transport = MockPeerTransport::new(PeerReply::Ack);
    let process = cluster.process(11, transport.clone());

    assert!(!process.negotiator.this_is_the_responsible_process(&jira_site()).await);
    assert_eq!(cluster.state.ruling_pid().await, Some(10));
    assert_eq!(transport.pinged(), vec![(10, "acme.atlassian.net".to_string())]);
}

#[tokio::test]
async fn test_silent_ruler_is_replaced_after_ping_timeout() {
    let cluster = Cluster::new(OAuthSettings::new());
    cluster.state.set_ruling_pid(10).await.unwrap();
    let transport = MockPeerTransport::new(PeerReply::Silent);
    let process = cluster.process(11, transport.clone());

    let started = tokio::time::Instant::now();
    assert!(process.negotiator.this_is_the_responsible_process(&jira_site()).await);
    assert!(started.elapsed() >= cluster.config.ping_timeout);
    assert_eq!(cluster.state.ruling_pid().await, Some(11));
    assert_eq!(transport.ping_count(), 1);
}

#[tokio::test]
async fn test_overwritten_claim_defers_to_new_ruler() {
    let cluster = Cluster::new(OAuthSettings::new());
    let first_transport = MockPeerTransport::new(PeerReply::Ack);
    let second_transport = MockPeerTransport::new(PeerReply::Refused);
    let first = cluster.process(20, first_transport.clone());
    let second = cluster.process(21, second_transport.clone());
    let site = jira_site();

    // 20 claims first; 21 finds 20 unreachable and overwrites the claim
    // while 20 waits to re-read it.
    let (first_result, second_result) = tokio::join!(
        first.negotiator.this_is_the_responsible_process(&site),
        second.negotiator.this_is_the_responsible_process(&site),
    );

    assert!(!first_result);
    assert!(second_result);
    assert_eq!(cluster.state.ruling_pid().await, Some(21));
    assert_eq!(second_transport.pinged()[0].0, 20);
    assert_eq!(first_transport.pinged()[0].0, 21);
}

#[tokio::test]
async fn test_startup_grace_delays_negotiation() {
    let grace = Duration::from_millis(300);
    let cluster = Cluster::new(OAuthSettings::new()).with_config(
        fast_config().with_negotiation_timing(
            Duration::from_millis(100),
            Duration::from_millis(10),
            grace,
        ),
    );
    let process = cluster.process(30, MockPeerTransport::new(PeerReply::Refused));

    let started = tokio::time::Instant::now();
    assert!(process.negotiator.this_is_the_responsible_process(&jira_site()).await);
    assert!(started.elapsed() >= grace - Duration::from_millis(50));
}
