//! Token codec
//!
//! Normalises provider token payloads into [`Tokens`]. Jira access tokens
//! are JWTs whose `iat` claim orders concurrent writes; Bitbucket payloads
//! are flat and carry no issue time.

use atlascode_core::{AuthError, AuthResult, OAuthProvider, OAuthSecret, ProductKey};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::Deserialize;
use tracing::warn;

/// Raw token endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime in seconds
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Normalised token record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Epoch milliseconds
    pub expiration: Option<i64>,
    /// JWT issued-at, epoch seconds
    pub iat: Option<i64>,
    /// Epoch milliseconds at which the response was received
    pub received_at: i64,
}

impl Tokens {
    pub fn from_response(provider: OAuthProvider, response: TokenResponse, received_at: i64) -> Self {
        let iat = match provider.product() {
            ProductKey::Jira => decode_jwt_iat(&response.access_token),
            ProductKey::Bitbucket => None,
        };
        Self {
            expiration: response
                .expires_in
                .map(|secs| received_at.saturating_add(secs.saturating_mul(1000))),
            access_token: response.access_token,
            refresh_token: response.refresh_token.filter(|t| !t.is_empty()),
            iat,
            received_at,
        }
    }

    /// Convert into stored secret material.
    ///
    /// Providers that do not rotate refresh tokens omit them from refresh
    /// responses; the previous one is kept in that case.
    pub fn into_oauth_secret(self, previous_refresh: &str) -> OAuthSecret {
        OAuthSecret {
            access: self.access_token,
            refresh: self
                .refresh_token
                .unwrap_or_else(|| previous_refresh.to_string()),
            expiration_date: self.expiration,
            iat: self.iat,
            received_at: self.received_at,
        }
    }
}

/// Decode a token endpoint body for `provider`.
pub fn decode_token_response(
    provider: OAuthProvider,
    body: &str,
    received_at: i64,
) -> AuthResult<Tokens> {
    let response: TokenResponse = serde_json::from_str(body)
        .map_err(|e| AuthError::decode(format!("{} token response", provider), e))?;
    Ok(Tokens::from_response(provider, response, received_at))
}

#[derive(Deserialize)]
struct JwtClaims {
    #[serde(default)]
    iat: Option<i64>,
}

/// Extract the `iat` claim of a JWT without verifying its signature.
pub fn decode_jwt_iat(token: &str) -> Option<i64> {
    let payload = token.split('.').nth(1)?;
    let bytes = match URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("[TokenCodec] Access token payload is not base64url: {}", e);
            return None;
        }
    };
    match serde_json::from_slice::<JwtClaims>(&bytes) {
        Ok(claims) => claims.iat,
        Err(e) => {
            warn!("[TokenCodec] Access token payload is not JSON: {}", e);
            None
        }
    }
}

/// Current time in epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
