//! Token refresher
//!
//! Exchanges a refresh token for new tokens. A 401/403 from the token
//! endpoint is a revocation and is reported as `should_invalidate` instead
//! of an error; everything else propagates and leaves the credential alone.

use atlascode_core::{AuthError, AuthResult, OAuthProvider};
use reqwest::StatusCode;
use tracing::{debug, info, warn};

use super::strategy::{strategy_for, OAuthSettings};
use super::token::{decode_token_response, now_millis, Tokens};

/// Result of a refresh attempt that reached the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRefreshOutcome {
    pub tokens: Option<Tokens>,
    /// The refresh token was rejected; the credential must be marked invalid.
    pub should_invalidate: bool,
}

impl TokenRefreshOutcome {
    fn refreshed(tokens: Tokens) -> Self {
        Self {
            tokens: Some(tokens),
            should_invalidate: false,
        }
    }

    fn revoked() -> Self {
        Self {
            tokens: None,
            should_invalidate: true,
        }
    }
}

pub struct TokenRefresher {
    http: reqwest::Client,
    settings: OAuthSettings,
}

impl TokenRefresher {
    pub fn new(settings: OAuthSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            settings,
        }
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// POST a refresh grant to `provider`'s token endpoint.
    pub async fn get_new_tokens(
        &self,
        provider: OAuthProvider,
        refresh_token: &str,
    ) -> AuthResult<TokenRefreshOutcome> {
        let strategy = strategy_for(provider, &self.settings, "");
        debug!("[TokenRefresher] Refreshing {} tokens", provider);

        let request = self
            .http
            .post(strategy.token_url())
            .headers(strategy.refresh_headers());
        let response = strategy
            .token_refresh_data(refresh_token)
            .apply(request)
            .send()
            .await
            .map_err(|e| AuthError::transport("token refresh", e))?;

        let received_at = now_millis();
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::transport("token refresh", e))?;

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            warn!(
                provider = %provider,
                status = status.as_u16(),
                "[TokenRefresher] Refresh token rejected, credential must be invalidated"
            );
            return Ok(TokenRefreshOutcome::revoked());
        }
        if !status.is_success() {
            return Err(AuthError::Http {
                action: "token refresh".to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let tokens = decode_token_response(provider, &body, received_at)?;
        info!(
            provider = %provider,
            iat = ?tokens.iat,
            "[TokenRefresher] Received new tokens"
        );
        Ok(TokenRefreshOutcome::refreshed(tokens))
    }
}
