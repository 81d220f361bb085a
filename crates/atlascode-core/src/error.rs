//! Error taxonomy
//!
//! Callers branch on the variant instead of matching message strings:
//! transport problems are retryable, revocation is permanent, and
//! `UnknownProvider` is a programming error.

use thiserror::Error;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Network-level failure talking to a provider.
    #[error("{action} failed: {message}")]
    Transport { action: String, message: String },

    /// Non-success HTTP status from a provider.
    #[error("{action} failed: HTTP {status} - {body}")]
    Http {
        action: String,
        status: u16,
        body: String,
    },

    /// Provider payload could not be decoded.
    #[error("could not decode {what}: {message}")]
    Decode { what: String, message: String },

    /// Refresh token rejected with 401/403; the user must log in again.
    #[error("credentials for {site} were revoked")]
    Revoked { site: String },

    /// Credential is marked invalid; no refresh is attempted.
    #[error("credentials for {site} are invalid, please re-authenticate")]
    InvalidCredentials { site: String },

    /// Access token expired and no fresher token could be obtained.
    #[error("access token for {site} expired and could not be refreshed")]
    TokenExpired { site: String },

    /// No credential exists for the site.
    #[error("no credentials found for {site}")]
    MissingCredentials { site: String },

    /// Authorization was replaced by a newer one or the dancer was disposed.
    #[error("authorization for {provider} was cancelled")]
    Cancelled { provider: String },

    /// Browser authorization was not completed in time.
    #[error("authorization for {provider} timed out")]
    Timeout { provider: String },

    /// Provider returned no accessible resources.
    #[error("no accessible resources found for {provider}")]
    NoAccessibleResources { provider: String },

    /// Provider redirected back with an OAuth error.
    #[error("{provider} authorization error: {message}")]
    ProviderError { provider: String, message: String },

    /// Secret storage, keychain or global state failure.
    #[error("storage error during {action}: {message}")]
    Storage { action: String, message: String },

    /// No election result after all rounds.
    #[error("responsible process negotiation exhausted after {rounds} rounds")]
    NegotiationExhausted { rounds: u32 },

    /// Unknown provider name; indicates a configuration or programming bug.
    #[error("unknown OAuth provider: {0}")]
    UnknownProvider(String),

    /// Local listener could not be started.
    #[error("callback listener error: {0}")]
    Listener(String),
}

impl AuthError {
    pub fn transport(action: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Transport {
            action: action.into(),
            message: err.to_string(),
        }
    }

    pub fn storage(action: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Storage {
            action: action.into(),
            message: err.to_string(),
        }
    }

    pub fn decode(what: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Decode {
            what: what.into(),
            message: err.to_string(),
        }
    }

    /// Whether a later attempt may succeed without user action.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. }
            | Self::Storage { .. }
            | Self::NegotiationExhausted { .. }
            | Self::TokenExpired { .. } => true,
            Self::Http { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Whether the credential must be treated as revoked.
    pub fn is_revocation(&self) -> bool {
        matches!(self, Self::Revoked { .. } | Self::InvalidCredentials { .. })
    }
}
