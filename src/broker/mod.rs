//! Broker daemon — session management, turn storage, capture/paste.
//!
//! The broker is the central coordinator for clippy v0. It listens on
//! a Unix domain socket and manages session state, turn storage, and
//! capture/paste relay between PTY wrappers and hotkey clients.
//!
//! Architecture: channel-based actor. A single broker loop owns all
//! mutable state ([`state::BrokerState`]). Per-connection tasks
//! forward commands via mpsc channels. Inject commands for paste
//! are routed to wrapper connections via per-connection channels.

mod connection;
mod handler;
pub mod registry;
pub mod state;

use std::collections::HashMap;
use std::path::PathBuf;

use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;

use connection::{BrokerCommand, DisconnectNotice};
use handler::InjectAction;
use state::{BrokerState, ConnectionId};

use crate::ipc::protocol::Message;

/// Broker startup/runtime errors.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("$XDG_RUNTIME_DIR is not set")]
    NoRuntimeDir,
    #[error("broker already running at {0}")]
    AlreadyRunning(PathBuf),
    #[error("failed to create directory {path}: {source}")]
    MkdirFailed {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to bind socket {path}: {source}")]
    BindFailed {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Run the broker daemon until SIGTERM or SIGINT.
///
/// # Errors
///
/// Returns `BrokerError` if `$XDG_RUNTIME_DIR` is unset, socket bind
/// fails, or another broker is already running.
///
/// # Contract compliance
///
/// - Socket at `$XDG_RUNTIME_DIR/clippy/broker.sock` (mode 0700)
/// - Stale socket detection and cleanup
/// - SIGTERM/SIGINT → graceful shutdown, socket file removed
/// - All state in-memory only (lost on exit)
pub async fn run(config: state::RingConfig) -> Result<(), BrokerError> {
    let socket_path = resolve_socket_path()?;
    let listener = bind_socket(&socket_path).await?;

    tracing::info!(path = %socket_path.display(), "broker listening");

    // Channels for connection → broker communication.
    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<BrokerCommand>();
    let (disconnect_tx, mut disconnect_rx) = mpsc::unbounded_channel::<DisconnectNotice>();

    // Per-connection inject channels for paste → inject routing.
    let mut inject_senders: HashMap<ConnectionId, mpsc::UnboundedSender<Message>> = HashMap::new();

    let mut state = BrokerState::new(config);

    // Graceful shutdown on SIGTERM or SIGINT.
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())?;

    loop {
        tokio::select! {
            // -- New connection --
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        accept_connection(
                            stream,
                            &cmd_tx,
                            &disconnect_tx,
                            &mut inject_senders,
                        );
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                    }
                }
            }

            // -- Command from connection task --
            Some(cmd) = cmd_rx.recv() => {
                let (response, inject_action) = handler::handle_message(
                    &mut state,
                    cmd.request,
                    cmd.connection_id,
                );
                // Send response to requesting connection.
                let _ = cmd.response_tx.send(response);

                // Route inject to target wrapper if paste succeeded.
                if let Some(inject) = inject_action {
                    dispatch_inject(&inject_senders, inject);
                }
            }

            // -- Connection disconnected --
            Some(notice) = disconnect_rx.recv() => {
                let conn_id = notice.connection_id;
                inject_senders.remove(&conn_id);
                state.remove_connection(conn_id);
                tracing::debug!(?conn_id, "connection cleaned up");
            }

            // -- Shutdown signals --
            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM, shutting down");
                break;
            }
            _ = sigint.recv() => {
                tracing::info!("received SIGINT, shutting down");
                break;
            }
        }
    }

    // Cleanup: remove socket file.
    drop(listener);
    if let Err(e) = std::fs::remove_file(&socket_path) {
        tracing::warn!(error = %e, path = %socket_path.display(), "failed to remove socket");
    }

    tracing::info!("broker stopped");
    Ok(())
}

/// Accept a new connection — create channels and spawn handler task.
fn accept_connection(
    stream: UnixStream,
    cmd_tx: &mpsc::UnboundedSender<BrokerCommand>,
    disconnect_tx: &mpsc::UnboundedSender<DisconnectNotice>,
    inject_senders: &mut HashMap<ConnectionId, mpsc::UnboundedSender<Message>>,
) {
    let conn_id = ConnectionId::new();
    let (inject_tx, inject_rx) = mpsc::unbounded_channel();
    inject_senders.insert(conn_id, inject_tx);

    connection::spawn_connection(
        stream,
        conn_id,
        cmd_tx.clone(),
        inject_rx,
        disconnect_tx.clone(),
    );

    tracing::debug!(?conn_id, "accepted connection");
}

/// Route an inject command to the target wrapper's connection task.
fn dispatch_inject(
    inject_senders: &HashMap<ConnectionId, mpsc::UnboundedSender<Message>>,
    action: InjectAction,
) {
    if let Some(tx) = inject_senders.get(&action.target_connection) {
        if tx.send(action.message).is_err() {
            tracing::warn!(
                conn_id = ?action.target_connection,
                "inject send failed — wrapper disconnected"
            );
        }
    } else {
        tracing::warn!(
            conn_id = ?action.target_connection,
            "inject target not found"
        );
    }
}

// -- Socket setup --

/// Resolve the broker socket path from `$XDG_RUNTIME_DIR`.
fn resolve_socket_path() -> Result<PathBuf, BrokerError> {
    let runtime_dir = std::env::var("XDG_RUNTIME_DIR").map_err(|_| BrokerError::NoRuntimeDir)?;
    Ok(PathBuf::from(runtime_dir)
        .join("clippy")
        .join("broker.sock"))
}

/// Create the socket directory and bind the Unix listener.
///
/// Handles stale socket detection: if EADDRINUSE, attempts to connect
/// to the existing socket. If the connection succeeds, another broker
/// is running. If it fails, the socket is stale and is removed.
async fn bind_socket(path: &std::path::Path) -> Result<UnixListener, BrokerError> {
    // Ensure parent directory exists with mode 0700.
    let parent = path.parent().expect("socket path has parent");
    if !parent.exists() {
        std::fs::create_dir_all(parent).map_err(|e| BrokerError::MkdirFailed {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    // Always validate/set directory permissions to 0700, even if the
    // directory already existed.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(parent, std::fs::Permissions::from_mode(0o700)).map_err(|e| {
            BrokerError::MkdirFailed {
                path: parent.to_path_buf(),
                source: e,
            }
        })?;
    }

    match UnixListener::bind(path) {
        Ok(listener) => Ok(listener),
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
            // Check if the existing socket is live.
            match UnixStream::connect(path).await {
                Ok(_) => {
                    // Another broker is running.
                    Err(BrokerError::AlreadyRunning(path.to_path_buf()))
                }
                Err(_) => {
                    // Stale socket — remove and retry.
                    tracing::info!(
                        path = %path.display(),
                        "removing stale socket"
                    );
                    std::fs::remove_file(path).map_err(|e| BrokerError::BindFailed {
                        path: path.to_path_buf(),
                        source: e,
                    })?;
                    UnixListener::bind(path).map_err(|e| BrokerError::BindFailed {
                        path: path.to_path_buf(),
                        source: e,
                    })
                }
            }
        }
        Err(e) => Err(BrokerError::BindFailed {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}
