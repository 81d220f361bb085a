//! OAuth dancer
//!
//! Drives browser-based authorization code flows through a loopback
//! listener on `127.0.0.1:{callback_port}`. At most one authorization is in
//! flight per provider; starting another cancels the previous one.
//!
//! ```text
//!   Idle ──do_dance──▶ Listening(n in flight) ──idle check, n == 0──▶ Idle
//! ```
//!
//! Callbacks are routed by provider path and must carry the `state` nonce of
//! the current in-flight authorization; anything else is ignored and the
//! authorization stays pending. A watchdog rejects abandoned authorizations
//! through the listener's own `/timeout` endpoint.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use atlascode_core::branding::{self, DISPLAY_NAME, OAUTH_TIMEOUT_PATH};
use atlascode_core::{AuthConfig, AuthError, AuthResult, OAuthProvider, OAuthSecret, UserInfo};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Html,
    routing::get,
    Router,
};
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::resources::{fetch_accessible_resources, fetch_user, AccessibleResource};
use super::strategy::{strategy_for, OAuthSettings, OAuthStrategy};
use super::token::{decode_token_response, now_millis};

/// Opens authorization URLs for the user.
pub trait BrowserLauncher: Send + Sync {
    fn open(&self, url: &str) -> anyhow::Result<()>;
}

/// Launches the system default browser.
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &str) -> anyhow::Result<()> {
        open::that(url).map_err(|e| anyhow::anyhow!("Failed to open URL: {}", e))
    }
}

/// Outcome of a completed authorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthResponse {
    pub access: String,
    pub refresh: String,
    /// Epoch milliseconds
    pub expiration_date: Option<i64>,
    /// JWT issued-at, epoch seconds
    pub iat: Option<i64>,
    /// Epoch milliseconds
    pub received_at: i64,
    pub user: UserInfo,
    pub accessible_resources: Vec<AccessibleResource>,
    /// REST API base the tokens are valid for
    pub api_url: String,
}

impl OAuthResponse {
    pub fn secret(&self) -> OAuthSecret {
        OAuthSecret {
            access: self.access.clone(),
            refresh: self.refresh.clone(),
            expiration_date: self.expiration_date,
            iat: self.iat,
            received_at: self.received_at,
        }
    }
}

struct InFlight {
    state: String,
    strategy: Arc<dyn OAuthStrategy>,
    callback: String,
    tx: oneshot::Sender<AuthResult<OAuthResponse>>,
}

struct ListenerHandle {
    port: u16,
    shutdown: CancellationToken,
}

struct DancerInner {
    config: AuthConfig,
    settings: OAuthSettings,
    http: reqwest::Client,
    browser: Arc<dyn BrowserLauncher>,
    in_flight: Mutex<HashMap<OAuthProvider, InFlight>>,
    listener: tokio::sync::Mutex<Option<ListenerHandle>>,
}

impl DancerInner {
    /// Remove the in-flight authorization of `provider` if its nonce matches.
    fn take_matching(&self, provider: OAuthProvider, state: &str) -> Option<InFlight> {
        let mut in_flight = self.in_flight.lock();
        match in_flight.get(&provider) {
            Some(flow) if flow.state == state => in_flight.remove(&provider),
            _ => None,
        }
    }

    fn is_current(&self, provider: OAuthProvider, state: &str) -> bool {
        self.in_flight
            .lock()
            .get(&provider)
            .is_some_and(|flow| flow.state == state)
    }

    /// Reject the in-flight authorization of `provider` with a timeout.
    ///
    /// Without a state the current authorization is rejected regardless of
    /// its nonce.
    fn reject_timed_out(&self, provider: OAuthProvider, state: Option<&str>) -> bool {
        let flow = {
            let mut in_flight = self.in_flight.lock();
            match in_flight.get(&provider) {
                Some(flow) if state.map_or(true, |s| s == flow.state) => in_flight.remove(&provider),
                _ => None,
            }
        };
        match flow {
            Some(flow) => {
                warn!("[OAuth] Authorization for {} timed out", provider);
                let _ = flow.tx.send(Err(AuthError::Timeout {
                    provider: provider.to_string(),
                }));
                true
            }
            None => false,
        }
    }

    /// Close the listener when nothing is in flight. Returns whether it closed.
    async fn shutdown_if_idle(&self) -> bool {
        let mut listener = self.listener.lock().await;
        let pending = self.in_flight.lock().len();
        if pending > 0 {
            debug!("[OAuth] Idle check: {} authorization(s) in flight", pending);
            return false;
        }
        if let Some(handle) = listener.take() {
            info!(
                "[OAuth] No authorizations in flight, closing callback listener on port {}",
                handle.port
            );
            handle.shutdown.cancel();
        }
        true
    }
}

/// Loopback OAuth flow driver; one per process.
pub struct OAuthDancer {
    inner: Arc<DancerInner>,
}

impl OAuthDancer {
    pub fn new(config: AuthConfig, settings: OAuthSettings, browser: Arc<dyn BrowserLauncher>) -> Self {
        Self {
            inner: Arc::new(DancerInner {
                config,
                settings,
                http: reqwest::Client::new(),
                browser,
                in_flight: Mutex::new(HashMap::new()),
                listener: tokio::sync::Mutex::new(None),
            }),
        }
    }

    /// Run an authorization for `provider`.
    ///
    /// `site` is the host the user asked to log into (informational),
    /// `callback` the URI the success page links back to. Resolves when the
    /// browser redirects back, or rejects on provider error, timeout, or
    /// cancellation by a newer authorization.
    pub async fn do_dance(
        &self,
        provider: OAuthProvider,
        site: &str,
        callback: &str,
    ) -> AuthResult<OAuthResponse> {
        let (state, rx, port, authorize_url) = {
            let mut listener = self.inner.listener.lock().await;
            let port = match listener.as_ref() {
                Some(handle) => handle.port,
                None => {
                    let handle = start_listener(&self.inner).await?;
                    let port = handle.port;
                    *listener = Some(handle);
                    port
                }
            };

            let redirect_uri = branding::oauth_redirect_uri(port, provider.as_str());
            let strategy = strategy_for(provider, &self.inner.settings, &redirect_uri);
            let state = Uuid::new_v4().to_string();
            let authorize_url = strategy.authorize_url(&state);
            let (tx, rx) = oneshot::channel();

            let previous = self.inner.in_flight.lock().insert(
                provider,
                InFlight {
                    state: state.clone(),
                    strategy,
                    callback: callback.to_string(),
                    tx,
                },
            );
            if let Some(previous) = previous {
                info!("[OAuth] Cancelling previous {} authorization", provider);
                let _ = previous.tx.send(Err(AuthError::Cancelled {
                    provider: provider.to_string(),
                }));
            }
            (state, rx, port, authorize_url)
        };

        info!("[OAuth] Starting {} authorization for {}", provider, site);
        if let Err(e) = self.inner.browser.open(&authorize_url) {
            self.inner.take_matching(provider, &state);
            return Err(AuthError::ProviderError {
                provider: provider.to_string(),
                message: format!("could not open browser: {}", e),
            });
        }

        self.arm_watchdog(provider, state, port);

        match rx.await {
            Ok(result) => result,
            Err(_) => Err(AuthError::Cancelled {
                provider: provider.to_string(),
            }),
        }
    }

    fn arm_watchdog(&self, provider: OAuthProvider, state: String, port: u16) {
        let inner = Arc::downgrade(&self.inner);
        let timeout = self.inner.config.browser_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let Some(inner) = inner.upgrade() else {
                return;
            };
            if !inner.is_current(provider, &state) {
                return;
            }

            let url = format!(
                "http://127.0.0.1:{}{}?provider={}&state={}",
                port,
                OAUTH_TIMEOUT_PATH,
                provider,
                urlencoding::encode(&state)
            );
            let delivered = inner
                .http
                .get(&url)
                .timeout(Duration::from_secs(5))
                .send()
                .await
                .map(|r| r.status().is_success())
                .unwrap_or(false);
            if !delivered {
                debug!("[OAuth] Timeout endpoint unreachable, rejecting directly");
                inner.reject_timed_out(provider, Some(&state));
            }
        });
    }

    /// Cancel the in-flight authorization of `provider`.
    pub fn cancel(&self, provider: OAuthProvider) -> bool {
        let flow = self.inner.in_flight.lock().remove(&provider);
        match flow {
            Some(flow) => {
                let _ = flow.tx.send(Err(AuthError::Cancelled {
                    provider: provider.to_string(),
                }));
                true
            }
            None => false,
        }
    }

    pub fn in_flight_count(&self) -> usize {
        self.inner.in_flight.lock().len()
    }

    pub async fn is_listening(&self) -> bool {
        self.inner.listener.lock().await.is_some()
    }

    pub async fn listening_port(&self) -> Option<u16> {
        self.inner.listener.lock().await.as_ref().map(|h| h.port)
    }

    /// Cancel every in-flight authorization and close the listener.
    pub async fn dispose(&self) {
        let flows: Vec<(OAuthProvider, InFlight)> = self.inner.in_flight.lock().drain().collect();
        for (provider, flow) in flows {
            let _ = flow.tx.send(Err(AuthError::Cancelled {
                provider: provider.to_string(),
            }));
        }
        if let Some(handle) = self.inner.listener.lock().await.take() {
            info!("[OAuth] Disposing callback listener on port {}", handle.port);
            handle.shutdown.cancel();
        }
    }
}

async fn start_listener(inner: &Arc<DancerInner>) -> AuthResult<ListenerHandle> {
    let addr = format!("127.0.0.1:{}", inner.config.callback_port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| AuthError::Listener(format!("failed to bind {}: {}", addr, e)))?;
    let port = listener
        .local_addr()
        .map_err(|e| AuthError::Listener(e.to_string()))?
        .port();
    info!("[OAuth] Callback listener on 127.0.0.1:{}", port);

    let shutdown = CancellationToken::new();
    let app = Router::new()
        .route(OAUTH_TIMEOUT_PATH, get(handle_timeout))
        .route("/{provider}", get(handle_callback))
        .with_state(inner.clone());

    let server_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            server_shutdown.cancelled().await;
            info!("[OAuth] Callback listener shutting down");
        });
        if let Err(e) = server.await {
            error!("[OAuth] Callback listener error: {}", e);
        }
    });

    tokio::spawn(run_idle_check(
        Arc::downgrade(inner),
        shutdown.clone(),
        inner.config.idle_check_interval,
    ));

    Ok(ListenerHandle { port, shutdown })
}

async fn run_idle_check(inner: Weak<DancerInner>, shutdown: CancellationToken, every: Duration) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let Some(inner) = inner.upgrade() else {
                    shutdown.cancel();
                    break;
                };
                if inner.shutdown_if_idle().await {
                    break;
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TimeoutParams {
    provider: String,
    #[serde(default)]
    state: Option<String>,
}

async fn handle_callback(
    State(inner): State<Arc<DancerInner>>,
    Path(provider): Path<String>,
    Query(params): Query<CallbackParams>,
) -> (StatusCode, Html<String>) {
    let Ok(provider) = provider.parse::<OAuthProvider>() else {
        warn!("[OAuth] Callback for unknown provider {}", provider);
        return (
            StatusCode::NOT_FOUND,
            Html(render_page(false, "Unknown authorization provider.", None)),
        );
    };

    let state = params.state.unwrap_or_default();
    let Some(flow) = inner.take_matching(provider, &state) else {
        warn!("[OAuth] Ignoring {} callback with stale or unknown state", provider);
        return (
            StatusCode::BAD_REQUEST,
            Html(render_page(
                false,
                "This authorization request is no longer active.",
                None,
            )),
        );
    };

    if let Some(error) = params.error {
        let message = params.error_description.unwrap_or(error);
        warn!("[OAuth] {} authorization denied: {}", provider, message);
        let page = render_page(false, &message, None);
        let _ = flow.tx.send(Err(AuthError::ProviderError {
            provider: provider.to_string(),
            message,
        }));
        return (StatusCode::OK, Html(page));
    }

    let Some(code) = params.code else {
        let _ = flow.tx.send(Err(AuthError::ProviderError {
            provider: provider.to_string(),
            message: "callback carried no authorization code".to_string(),
        }));
        return (
            StatusCode::BAD_REQUEST,
            Html(render_page(false, "No authorization code received.", None)),
        );
    };

    let result = complete_authorization(&inner, flow.strategy.as_ref(), &code).await;
    let page = match &result {
        Ok(response) => {
            info!(
                "[OAuth] {} authorization complete for {} ({} resource(s))",
                provider,
                response.user.display_name,
                response.accessible_resources.len()
            );
            render_page(
                true,
                &format!("You can close this window and return to {}.", DISPLAY_NAME),
                Some(&flow.callback),
            )
        }
        Err(e) => {
            warn!("[OAuth] {} authorization failed: {}", provider, e);
            render_page(false, &e.to_string(), None)
        }
    };
    if flow.tx.send(result).is_err() {
        warn!("[OAuth] Waiting task for {} already gone", provider);
    }
    (StatusCode::OK, Html(page))
}

async fn handle_timeout(
    State(inner): State<Arc<DancerInner>>,
    Query(params): Query<TimeoutParams>,
) -> (StatusCode, Html<String>) {
    let Ok(provider) = params.provider.parse::<OAuthProvider>() else {
        return (
            StatusCode::NOT_FOUND,
            Html(render_page(false, "Unknown authorization provider.", None)),
        );
    };
    if inner.reject_timed_out(provider, params.state.as_deref()) {
        (
            StatusCode::OK,
            Html(render_page(false, "Authorization timed out.", None)),
        )
    } else {
        (
            StatusCode::NOT_FOUND,
            Html(render_page(false, "No matching authorization.", None)),
        )
    }
}

async fn complete_authorization(
    inner: &DancerInner,
    strategy: &dyn OAuthStrategy,
    code: &str,
) -> AuthResult<OAuthResponse> {
    let provider = strategy.provider();
    let request = inner
        .http
        .post(strategy.token_url())
        .headers(strategy.refresh_headers());
    let response = strategy
        .token_authorization_data(code)
        .apply(request)
        .send()
        .await
        .map_err(|e| AuthError::transport("code exchange", e))?;

    let received_at = now_millis();
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| AuthError::transport("code exchange", e))?;
    if !status.is_success() {
        return Err(AuthError::Http {
            action: "code exchange".to_string(),
            status: status.as_u16(),
            body,
        });
    }

    let tokens = decode_token_response(provider, &body, received_at)?;
    let resources = fetch_accessible_resources(&inner.http, strategy, &tokens.access_token).await?;
    let Some(first) = resources.first() else {
        return Err(AuthError::NoAccessibleResources {
            provider: provider.to_string(),
        });
    };
    let user = fetch_user(&inner.http, strategy, &tokens.access_token, first).await?;

    Ok(OAuthResponse {
        access: tokens.access_token,
        refresh: tokens.refresh_token.unwrap_or_default(),
        expiration_date: tokens.expiration,
        iat: tokens.iat,
        received_at: tokens.received_at,
        user,
        accessible_resources: resources,
        api_url: strategy.api_url().to_string(),
    })
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn render_page(success: bool, message: &str, callback: Option<&str>) -> String {
    let title = if success {
        "Authorization Complete"
    } else {
        "Authorization Failed"
    };
    let accent = if success { "#4ade80" } else { "#f87171" };
    let link = callback
        .filter(|c| !c.is_empty())
        .map(|c| {
            format!(
                r#"<p class="note"><a href="{}">Return to {}</a></p>"#,
                escape_html(c),
                DISPLAY_NAME
            )
        })
        .unwrap_or_default();
    format!(
        r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <title>{app} - {title}</title>
    <style>
        body {{
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            min-height: 100vh;
            display: flex;
            align-items: center;
            justify-content: center;
            background: #172b4d;
            color: #e6e6e6;
        }}
        .container {{ text-align: center; max-width: 420px; }}
        h1 {{ color: {accent}; font-size: 1.5rem; }}
        .note {{ font-size: 0.875rem; }}
        a {{ color: #4c9aff; }}
    </style>
</head>
<body>
    <div class="container">
        <h1>{title}</h1>
        <p>{message}</p>
        {link}
    </div>
</body>
</html>"##,
        app = DISPLAY_NAME,
        title = title,
        accent = accent,
        message = escape_html(message),
        link = link,
    )
}
