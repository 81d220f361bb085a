//! Cross-process coordination of token refreshes.

mod ipc;
mod negotiator;

pub use ipc::{
    default_ipc_dir, pipe_name, socket_path, IpcMessage, IpcResponder, LocalSocketTransport,
    PeerTransport,
};
pub use negotiator::{Negotiator, ProcessCoordinator};
