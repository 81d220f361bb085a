//! Centralized naming constants
//!
//! Every externally visible name (keychain services, IPC endpoints, global
//! state keys, callback port) is defined here so the other crates never
//! spell them out.

/// Display name used in notifications and browser pages.
pub const DISPLAY_NAME: &str = "Atlassian for VS Code";

/// Prefix of log files written by the host.
pub const LOG_PREFIX: &str = "atlascode-auth";

/// Directory name under the platform data dir.
pub const DATA_DIR_NAME: &str = "atlascode";

/// Legacy keychain service holding pre-secret-storage credentials.
pub const KEYCHAIN_SERVICE_V3: &str = "atlascode-authinfoV3";

/// Legacy keychain service used by insiders builds.
pub const KEYCHAIN_SERVICE_V3_INSIDERS: &str = "atlascode-insiders-authinfoV3";

/// Keychain service holding the secret-file master key.
pub const SECRETS_KEYCHAIN_SERVICE: &str = "atlascode-secrets";

/// Fixed loopback port of the OAuth callback listener.
pub const DEFAULT_OAUTH_CALLBACK_PORT: u16 = 31415;

/// Path of the watchdog endpoint on the callback listener.
pub const OAUTH_TIMEOUT_PATH: &str = "/timeout";

/// Prefix of per-process IPC endpoint names.
pub const IPC_ENDPOINT_PREFIX: &str = "atlascode";

/// IPC message sent to the responsible process.
pub const IPC_PING: &str = "atlascode-ping";

/// IPC reply from the responsible process.
pub const IPC_ACK: &str = "atlascode-ack";

/// Global state key of the responsible process id.
pub const RULING_PID_KEY: &str = "rulingPid";

/// Return URI opened after a successful login.
pub const DEFAULT_LOGIN_CALLBACK: &str = "vscode://atlassian.atlascode/openSettings";

/// Legacy keychain service name for the current build flavour.
pub fn keychain_service(insiders: bool) -> &'static str {
    if insiders {
        KEYCHAIN_SERVICE_V3_INSIDERS
    } else {
        KEYCHAIN_SERVICE_V3
    }
}

/// IPC endpoint name of a process, e.g. `atlascode-4242`.
pub fn ipc_endpoint_name(pid: u32) -> String {
    format!("{}-{}", IPC_ENDPOINT_PREFIX, pid)
}

/// Callback path of a provider, e.g. `/jiracloud`.
pub fn oauth_callback_path(provider: &str) -> String {
    format!("/{}", provider)
}

/// Loopback redirect URI for a provider on the given port.
pub fn oauth_redirect_uri(port: u16, provider: &str) -> String {
    format!("http://127.0.0.1:{}/{}", port, provider)
}
