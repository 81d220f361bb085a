//! Write ordering across processes sharing one secret file

use std::sync::Arc;

use atlascode_auth::{CredentialManager, SiteRegistry};
use atlascode_core::{AuthEvent, EventBus, GlobalState};
use atlascode_storage::{
    generate_master_key, EncryptedFileSecretStorage, JsonGlobalStateStore, MemoryKeyProvider,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use tests::fixtures::{jira_site, oauth_info, HOUR_MS};

pub(crate) struct Installation {
    pub dir: TempDir,
    pub keys: MemoryKeyProvider,
}

pub(crate) struct ProcessHandle {
    pub bus: EventBus,
    pub sites: SiteRegistry,
    pub credentials: Arc<CredentialManager>,
}

impl Installation {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            keys: MemoryKeyProvider::with_key(generate_master_key().unwrap()),
        }
    }

    /// A process with its own handles on the installation's files.
    pub fn process(&self) -> ProcessHandle {
        let bus = EventBus::new();
        let state = GlobalState::new(Arc::new(JsonGlobalStateStore::in_dir(self.dir.path())));
        let sites = SiteRegistry::new(state, bus.sender());
        let secrets =
            Arc::new(EncryptedFileSecretStorage::open(self.dir.path(), &self.keys).unwrap());
        let credentials = Arc::new(CredentialManager::new(secrets, sites.clone(), bus.sender()));
        ProcessHandle {
            bus,
            sites,
            credentials,
        }
    }
}

#[tokio::test]
async fn test_older_token_from_other_process_is_dropped() {
    let installation = Installation::new();
    let a = installation.process();
    let b = installation.process();
    let site = jira_site();

    a.credentials
        .save_auth_info(&site, &oauth_info("access-1000", 1000, 5, HOUR_MS))
        .await
        .unwrap();

    let mut events = b.bus.subscribe();
    b.credentials
        .save_auth_info(&site, &oauth_info("access-999", 999, 10, HOUR_MS))
        .await
        .unwrap();
    assert!(events.try_recv().is_none());

    for handle in [&a, &b] {
        let stored = handle
            .credentials
            .get_auth_info(&site, false)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.oauth_secret().unwrap().access, "access-1000");
    }
    // B's memory holds the winner, not its own dropped write
    let cached = b.credentials.get_auth_info(&site, true).await.unwrap().unwrap();
    assert_eq!(cached.oauth_secret().unwrap().iat, Some(1000));
}

#[tokio::test]
async fn test_equal_iat_later_receipt_wins() {
    let installation = Installation::new();
    let a = installation.process();
    let b = installation.process();
    let site = jira_site();

    a.credentials
        .save_auth_info(&site, &oauth_info("first", 1000, 100, HOUR_MS))
        .await
        .unwrap();
    b.credentials
        .save_auth_info(&site, &oauth_info("second", 1000, 200, HOUR_MS))
        .await
        .unwrap();
    a.credentials
        .save_auth_info(&site, &oauth_info("late-first", 1000, 150, HOUR_MS))
        .await
        .unwrap();

    let stored = a.credentials.get_auth_info(&site, false).await.unwrap().unwrap();
    assert_eq!(stored.oauth_secret().unwrap().access, "second");
}

#[tokio::test]
async fn test_cached_read_lags_until_uncached_read() {
    let installation = Installation::new();
    let a = installation.process();
    let b = installation.process();
    let site = jira_site();

    a.credentials
        .save_auth_info(&site, &oauth_info("old", 1000, 1, HOUR_MS))
        .await
        .unwrap();
    b.credentials
        .save_auth_info(&site, &oauth_info("new", 1001, 2, HOUR_MS))
        .await
        .unwrap();

    let cached = a.credentials.get_auth_info(&site, true).await.unwrap().unwrap();
    assert_eq!(cached.oauth_secret().unwrap().access, "old");

    let fresh = a.credentials.get_auth_info(&site, false).await.unwrap().unwrap();
    assert_eq!(fresh.oauth_secret().unwrap().access, "new");

    // The uncached read refreshed the in-memory copy
    let cached = a.credentials.get_auth_info(&site, true).await.unwrap().unwrap();
    assert_eq!(cached.oauth_secret().unwrap().access, "new");
}

#[tokio::test]
async fn test_interleaved_writers_keep_newest() {
    let installation = Installation::new();
    let processes: Vec<_> = (0..3).map(|_| installation.process()).collect();
    let site = jira_site();

    for (i, iat) in [1003, 1001, 1004, 1000, 1002].into_iter().enumerate() {
        processes[i % processes.len()]
            .credentials
            .save_auth_info(&site, &oauth_info(&format!("access-{}", iat), iat, 1, HOUR_MS))
            .await
            .unwrap();
    }

    for handle in &processes {
        let stored = handle
            .credentials
            .get_auth_info(&site, false)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.oauth_secret().unwrap().access, "access-1004");
    }
}

#[tokio::test]
async fn test_update_event_carries_site() {
    let installation = Installation::new();
    let a = installation.process();
    let site = jira_site();
    let mut events = a.bus.subscribe();

    let info = oauth_info("access", 1000, 1, HOUR_MS);
    a.credentials.save_auth_info(&site, &info).await.unwrap();
    match events.try_recv() {
        Some(AuthEvent::CredentialsUpdated {
            site: updated,
            credential_id,
        }) => {
            assert_eq!(updated, site);
            assert_eq!(credential_id, "de8bd5facc62e129f46dfb76eec9041f");
        }
        other => panic!("expected credentials update, got {:?}", other),
    }

    // Same material again: nothing to announce
    a.credentials.save_auth_info(&site, &info).await.unwrap();
    assert!(events.try_recv().is_none());
}
