//! Auth configuration
//!
//! All timings of the OAuth dance, the refresh path and the responsible-process
//! negotiation live here so tests can shrink them and the host can override
//! them from the environment.

use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::branding;

/// Timing and location settings for the auth core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Loopback port of the OAuth callback listener (0 = ephemeral)
    pub callback_port: u16,
    /// How long a browser authorization may stay open
    pub browser_timeout: Duration,
    /// Interval of the idle-listener check
    pub idle_check_interval: Duration,
    /// Lead time before token expiry at which a refresh is triggered
    pub grace_period: Duration,
    /// How long to wait for an IPC ack from the responsible process
    pub ping_timeout: Duration,
    /// Delay between claiming responsibility and re-reading the claim
    pub read_delay: Duration,
    /// Maximum election rounds per negotiation
    pub negotiation_rounds: u32,
    /// Minimum process uptime before taking part in a negotiation
    pub startup_grace: Duration,
    /// Wait after deferring a refresh to the responsible process
    pub refresh_wait: Duration,
    /// Insiders build (selects the legacy keychain service)
    pub insiders: bool,
    /// Directory for secret and global state files
    pub data_dir: PathBuf,
}

static PROCESS_START: OnceLock<Instant> = OnceLock::new();

/// Start of this process, fixed by the first call. Hosts call it first thing in `main`.
pub fn process_started_at() -> Instant {
    *PROCESS_START.get_or_init(Instant::now)
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            callback_port: branding::DEFAULT_OAUTH_CALLBACK_PORT,
            browser_timeout: Duration::from_secs(5 * 60),
            idle_check_interval: Duration::from_secs(5 * 60),
            grace_period: Duration::from_secs(10 * 60),
            ping_timeout: Duration::from_secs(5),
            read_delay: Duration::from_secs(5),
            negotiation_rounds: 3,
            startup_grace: Duration::from_secs(20),
            refresh_wait: Duration::from_secs(5),
            insiders: false,
            data_dir: default_data_dir(),
        }
    }
}

impl AuthConfig {
    /// Build a config from `ATLASCODE_*` environment variables on top of the defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(port) = env_parse::<u16>("ATLASCODE_CALLBACK_PORT") {
            config.callback_port = port;
        }
        if let Some(secs) = env_parse::<u64>("ATLASCODE_BROWSER_TIMEOUT_SECS") {
            config.browser_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("ATLASCODE_GRACE_PERIOD_SECS") {
            config.grace_period = Duration::from_secs(secs);
        }
        if let Some(rounds) = env_parse::<u32>("ATLASCODE_NEGOTIATION_ROUNDS") {
            config.negotiation_rounds = rounds.max(1);
        }
        if let Some(insiders) = env_parse::<bool>("ATLASCODE_INSIDERS") {
            config.insiders = insiders;
        }
        if let Ok(dir) = std::env::var("ATLASCODE_DATA_DIR") {
            if !dir.is_empty() {
                config.data_dir = PathBuf::from(dir);
            }
        }

        config
    }

    pub fn with_callback_port(mut self, port: u16) -> Self {
        self.callback_port = port;
        self
    }

    pub fn with_browser_timeout(mut self, timeout: Duration) -> Self {
        self.browser_timeout = timeout;
        self
    }

    pub fn with_idle_check_interval(mut self, interval: Duration) -> Self {
        self.idle_check_interval = interval;
        self
    }

    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    /// Set all negotiation delays at once (ping timeout, read delay, startup grace).
    pub fn with_negotiation_timing(
        mut self,
        ping_timeout: Duration,
        read_delay: Duration,
        startup_grace: Duration,
    ) -> Self {
        self.ping_timeout = ping_timeout;
        self.read_delay = read_delay;
        self.startup_grace = startup_grace;
        self
    }

    pub fn with_refresh_wait(mut self, wait: Duration) -> Self {
        self.refresh_wait = wait;
        self
    }

    pub fn with_insiders(mut self, insiders: bool) -> Self {
        self.insiders = insiders;
        self
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// Legacy keychain service for this build flavour.
    pub fn keychain_service(&self) -> &'static str {
        branding::keychain_service(self.insiders)
    }
}

/// Platform data directory, e.g. `~/.local/share/atlascode` on Linux.
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(branding::DATA_DIR_NAME)
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("[Config] Ignoring unparseable {}={}", key, raw);
            None
        }
    }
}
