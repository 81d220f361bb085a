//! Atlascode auth host

use std::path::Path;

use anyhow::Context;
use atlascode_core::{branding, AuthConfig, AuthSecret, DetailedSiteInfo, OAuthProvider};
use clap::{Parser, Subcommand};
use tracing::{error, info};

mod notifier;
mod services;

use services::AuthServices;

/// Jira and Bitbucket sign-in shared by every Atlascode process.
#[derive(Debug, Parser)]
#[command(name = "atlascode-authd", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

impl Cli {
    /// `status` when no subcommand is given.
    fn command(self) -> Command {
        self.command.unwrap_or(Command::Status)
    }
}

#[derive(Debug, PartialEq, Subcommand)]
enum Command {
    /// Log in through the browser
    Login {
        /// jiracloud, jiracloudstaging, bbcloud or bbcloudstaging
        provider: OAuthProvider,
        /// Site to prefer when several are accessible
        #[arg(default_value = "")]
        site: String,
    },
    /// Forget a site and its credential
    Logout { host: String },
    /// Registered sites and credential state
    Status,
    /// Build an authenticated client, refreshing if needed
    Client { host: String },
    /// Answer refresh requests of other processes
    Serve,
}

/// Initialize tracing with console and daily-rotated file logging.
fn init_tracing(data_dir: &Path) -> anyhow::Result<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_appender::rolling::{RollingFileAppender, Rotation};
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let logs_dir = data_dir.join("logs");
    if let Err(e) = std::fs::create_dir_all(&logs_dir) {
        eprintln!("Warning: Failed to create logs directory: {}", e);
    }

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(branding::LOG_PREFIX)
        .filename_suffix("log")
        .build(&logs_dir)
        .context("Failed to create log file appender")?;
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

    // RUST_LOG takes precedence
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,atlascode_auth=debug,atlascode_storage=debug"));

    let console_layer = fmt::layer()
        .with_ansi(true)
        .compact()
        .with_line_number(false)
        .with_file(false)
        .with_target(true);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_file(true)
        .with_target(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    atlascode_core::process_started_at();
    // Load .env file if present (for development)
    dotenvy::dotenv().ok();

    let command = Cli::parse().command();
    let config = AuthConfig::from_env();
    let _guard = init_tracing(&config.data_dir)?;
    info!(
        "[Host] {} auth host v{} ({:?})",
        branding::DISPLAY_NAME,
        env!("CARGO_PKG_VERSION"),
        command
    );

    let services = AuthServices::build(config)?;
    let result = run(&services, command).await;
    services.dancer.dispose().await;
    if let Err(e) = &result {
        error!("[Host] {:#}", e);
    }
    result
}

async fn run(services: &AuthServices, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Login { provider, site } => {
            let sites = services
                .login
                .user_initiated_oauth_login(provider, &site, branding::DEFAULT_LOGIN_CALLBACK)
                .await?;
            for site in sites {
                println!("logged in: {} ({})", site.host, site.product.display_name());
            }
        }
        Command::Logout { host } => {
            let site = find_site(services, &host).await?;
            services.login.logout(&site).await?;
            println!("logged out: {}", site.host);
        }
        Command::Status => status(services).await,
        Command::Client { host } => {
            let site = find_site(services, &host).await?;
            let client = services.clients.client_for_site(&site).await?;
            println!(
                "{}: {} authorization against {}",
                site.host,
                client.authorization().scheme(),
                site.base_api_url
            );
        }
        Command::Serve => {
            let responder = services.start_coordination().await?;
            println!("serving {} (ctrl-c to stop)", responder.endpoint());
            tokio::signal::ctrl_c().await?;
            info!("[Host] Shutting down");
        }
    }
    Ok(())
}

async fn find_site(services: &AuthServices, host: &str) -> anyhow::Result<DetailedSiteInfo> {
    services
        .sites
        .all_sites()
        .await
        .into_iter()
        .find(|s| s.host.eq_ignore_ascii_case(host))
        .with_context(|| format!("no site registered for {}", host))
}

async fn status(services: &AuthServices) {
    let sites = services.sites.all_sites().await;
    if sites.is_empty() {
        println!("no sites registered (data dir {})", services.config.data_dir.display());
        return;
    }

    let lookups = sites
        .iter()
        .map(|site| services.credentials.get_auth_info(site, false));
    let infos = futures::future::join_all(lookups).await;

    for (site, info) in sites.iter().zip(infos) {
        let detail = match info {
            Ok(Some(info)) => {
                let kind = match &info.secret {
                    AuthSecret::OAuth(secret) => match secret.expiration_date {
                        Some(ms) => format!(
                            "oauth, expires {}",
                            chrono::DateTime::from_timestamp_millis(ms)
                                .map(|t| t.to_rfc3339())
                                .unwrap_or_else(|| ms.to_string())
                        ),
                        None => "oauth".to_string(),
                    },
                    AuthSecret::Basic { username, .. } => format!("basic ({})", username),
                    AuthSecret::PersonalAccessToken { .. } => "personal access token".to_string(),
                };
                format!("{:?}, {}, user {}", info.state, kind, info.user.display_name)
            }
            Ok(None) => "no credentials".to_string(),
            Err(e) => format!("error: {}", e),
        };
        println!("{} [{}]: {}", site.host, site.product.display_name(), detail);
    }
}
