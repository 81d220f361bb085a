//! Mock collaborators for testing
//!
//! Recording fakes for notifications, browser launches and peer IPC.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use atlascode_auth::{BrowserLauncher, PeerTransport};
use atlascode_core::{DetailedSiteInfo, Notifier};
use parking_lot::Mutex;
use tokio::sync::mpsc;

// ============================================================================
// MockNotifier
// ============================================================================

#[derive(Default)]
pub struct MockNotifier {
    warnings: Mutex<Vec<String>>,
    errors: Mutex<Vec<String>>,
}

impl MockNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn warnings(&self) -> Vec<String> {
        self.warnings.lock().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().clone()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn show_warning(&self, message: &str, _actions: &[&str]) -> Option<String> {
        self.warnings.lock().push(message.to_string());
        None
    }

    async fn show_error(&self, message: &str, _actions: &[&str]) -> Option<String> {
        self.errors.lock().push(message.to_string());
        None
    }
}

// ============================================================================
// MockPeerTransport
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerReply {
    /// The ruling process answers
    Ack,
    /// Nobody listens on the endpoint
    Refused,
    /// The peer accepts but never answers
    Silent,
}

pub struct MockPeerTransport {
    reply: Mutex<PeerReply>,
    pinged: Mutex<Vec<(u32, String)>>,
    pings: AtomicUsize,
}

impl MockPeerTransport {
    pub fn new(reply: PeerReply) -> Arc<Self> {
        Arc::new(Self {
            reply: Mutex::new(reply),
            pinged: Mutex::new(Vec::new()),
            pings: AtomicUsize::new(0),
        })
    }

    pub fn set_reply(&self, reply: PeerReply) {
        *self.reply.lock() = reply;
    }

    pub fn ping_count(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    /// `(pid, host)` of every ping sent.
    pub fn pinged(&self) -> Vec<(u32, String)> {
        self.pinged.lock().clone()
    }
}

#[async_trait]
impl PeerTransport for MockPeerTransport {
    async fn ping(&self, pid: u32, site: &DetailedSiteInfo) -> anyhow::Result<bool> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        self.pinged.lock().push((pid, site.host.clone()));
        let reply = *self.reply.lock();
        match reply {
            PeerReply::Ack => Ok(true),
            PeerReply::Refused => anyhow::bail!("connection refused"),
            PeerReply::Silent => std::future::pending().await,
        }
    }
}

// ============================================================================
// CapturingBrowser
// ============================================================================

/// Browser that hands every opened URL to the test.
pub struct CapturingBrowser {
    tx: mpsc::UnboundedSender<String>,
}

impl CapturingBrowser {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

impl BrowserLauncher for CapturingBrowser {
    fn open(&self, url: &str) -> anyhow::Result<()> {
        self.tx
            .send(url.to_string())
            .map_err(|_| anyhow::anyhow!("test dropped the browser receiver"))
    }
}
