//! Local IPC between the processes of one installation
//!
//! Every process serves an endpoint named `atlascode-{pid}`: a Unix domain
//! socket under the runtime directory, or a named pipe on Windows. Messages
//! are newline-delimited JSON. A ping carries the site that needs a refresh;
//! the serving process answers with an ack and queues the refresh.

use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use atlascode_core::{branding, DetailedSiteInfo};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Wire message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IpcMessage {
    #[serde(rename = "atlascode-ping")]
    Ping { site: DetailedSiteInfo },
    #[serde(rename = "atlascode-ack")]
    Ack,
}

/// Reaches the IPC endpoint of another process.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Send a ping for `site` to process `pid`.
    ///
    /// `Ok(true)` when the peer acknowledged. Connection failures are errors;
    /// the caller bounds the wait.
    async fn ping(&self, pid: u32, site: &DetailedSiteInfo) -> anyhow::Result<bool>;
}

/// Default directory for socket endpoints.
pub fn default_ipc_dir() -> PathBuf {
    dirs::runtime_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(branding::DATA_DIR_NAME)
}

/// Unix socket path of `pid` under `dir`.
pub fn socket_path(dir: &Path, pid: u32) -> PathBuf {
    dir.join(format!("{}.sock", branding::ipc_endpoint_name(pid)))
}

/// Named pipe of `pid`.
pub fn pipe_name(pid: u32) -> String {
    format!(r"\\.\pipe\{}", branding::ipc_endpoint_name(pid))
}

/// Transport over Unix domain sockets / Windows named pipes.
#[derive(Debug, Clone)]
pub struct LocalSocketTransport {
    dir: PathBuf,
}

impl LocalSocketTransport {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[cfg(unix)]
    async fn send(&self, pid: u32, message: &IpcMessage) -> anyhow::Result<Option<IpcMessage>> {
        let path = socket_path(&self.dir, pid);
        let stream = tokio::net::UnixStream::connect(&path)
            .await
            .with_context(|| format!("connect {}", path.display()))?;
        exchange(stream, message).await
    }

    #[cfg(windows)]
    async fn send(&self, pid: u32, message: &IpcMessage) -> anyhow::Result<Option<IpcMessage>> {
        use tokio::net::windows::named_pipe::ClientOptions;

        let name = pipe_name(pid);
        let client = ClientOptions::new()
            .open(&name)
            .with_context(|| format!("open {}", name))?;
        exchange(client, message).await
    }
}

impl Default for LocalSocketTransport {
    fn default() -> Self {
        Self::new(default_ipc_dir())
    }
}

#[async_trait]
impl PeerTransport for LocalSocketTransport {
    async fn ping(&self, pid: u32, site: &DetailedSiteInfo) -> anyhow::Result<bool> {
        let reply = self
            .send(pid, &IpcMessage::Ping { site: site.clone() })
            .await?;
        Ok(matches!(reply, Some(IpcMessage::Ack)))
    }
}

/// Write one message and read one reply line.
async fn exchange<S>(stream: S, message: &IpcMessage) -> anyhow::Result<Option<IpcMessage>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;

    let mut lines = BufReader::new(reader).lines();
    match lines.next_line().await? {
        Some(reply) => Ok(Some(serde_json::from_str(&reply)?)),
        None => Ok(None),
    }
}

/// Ack every ping on `stream` and forward its site.
async fn serve_connection<S>(
    stream: S,
    refresh_tx: mpsc::UnboundedSender<DetailedSiteInfo>,
) -> anyhow::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        match serde_json::from_str::<IpcMessage>(&line) {
            Ok(IpcMessage::Ping { site }) => {
                debug!("[IPC] Ping for {}", site.host);
                let mut ack = serde_json::to_string(&IpcMessage::Ack)?;
                ack.push('\n');
                writer.write_all(ack.as_bytes()).await?;
                writer.flush().await?;
                if refresh_tx.send(site).is_err() {
                    debug!("[IPC] Refresh listener gone, dropping request");
                }
            }
            Ok(IpcMessage::Ack) => debug!("[IPC] Ignoring unsolicited ack"),
            Err(e) => warn!("[IPC] Malformed message: {}", e),
        }
    }
    Ok(())
}

/// Serves this process's IPC endpoint until dropped.
pub struct IpcResponder {
    endpoint: String,
    shutdown: CancellationToken,
    #[cfg(unix)]
    path: PathBuf,
}

impl IpcResponder {
    /// Bind the endpoint of `pid` and start accepting connections.
    #[cfg(unix)]
    pub async fn bind(
        dir: &Path,
        pid: u32,
        refresh_tx: mpsc::UnboundedSender<DetailedSiteInfo>,
    ) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("create {}", dir.display()))?;
        let path = socket_path(dir, pid);
        // Stale socket from a crashed process with a recycled pid
        let _ = std::fs::remove_file(&path);
        let listener = tokio::net::UnixListener::bind(&path)
            .with_context(|| format!("bind {}", path.display()))?;
        info!("[IPC] Listening on {}", path.display());

        let shutdown = CancellationToken::new();
        let sd = shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = sd.cancelled() => break,
                    accept = listener.accept() => match accept {
                        Ok((stream, _)) => {
                            let tx = refresh_tx.clone();
                            tokio::spawn(async move {
                                if let Err(e) = serve_connection(stream, tx).await {
                                    debug!("[IPC] Connection error: {}", e);
                                }
                            });
                        }
                        Err(e) => debug!("[IPC] Accept error: {}", e),
                    }
                }
            }
        });

        Ok(Self {
            endpoint: path.display().to_string(),
            shutdown,
            path,
        })
    }

    /// Create the named pipe of `pid` and start accepting connections.
    #[cfg(windows)]
    pub async fn bind(
        _dir: &Path,
        pid: u32,
        refresh_tx: mpsc::UnboundedSender<DetailedSiteInfo>,
    ) -> anyhow::Result<Self> {
        use tokio::net::windows::named_pipe::ServerOptions;

        let name = pipe_name(pid);
        let mut server = ServerOptions::new()
            .first_pipe_instance(true)
            .create(&name)
            .with_context(|| format!("create {}", name))?;
        info!("[IPC] Listening on {}", name);

        let shutdown = CancellationToken::new();
        let sd = shutdown.clone();
        let pipe = name.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = sd.cancelled() => break,
                    connected = server.connect() => {
                        if let Err(e) = connected {
                            debug!("[IPC] Accept error: {}", e);
                            continue;
                        }
                        let next = match ServerOptions::new().create(&pipe) {
                            Ok(next) => next,
                            Err(e) => {
                                warn!("[IPC] Failed to create pipe instance: {}", e);
                                break;
                            }
                        };
                        let stream = std::mem::replace(&mut server, next);
                        let tx = refresh_tx.clone();
                        tokio::spawn(async move {
                            if let Err(e) = serve_connection(stream, tx).await {
                                debug!("[IPC] Connection error: {}", e);
                            }
                        });
                    }
                }
            }
        });

        Ok(Self {
            endpoint: name,
            shutdown,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Drop for IpcResponder {
    fn drop(&mut self) {
        self.shutdown.cancel();
        #[cfg(unix)]
        let _ = std::fs::remove_file(&self.path);
    }
}
