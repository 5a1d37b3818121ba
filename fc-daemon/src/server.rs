//! Control Channel Server
//!
//! Accepts one request per connection over a Unix socket or TCP:
//! 1. Read the request until the client shuts down its write side
//! 2. Tokenize and parse it with the remote parser
//! 3. Dispatch it against the shared state
//! 4. Write the rendered reply and shut down our write side
//!
//! # Limits
//! - **Connection limit**: at most `MAX_CONNECTIONS` clients at once
//! - **Message limit**: requests above `MAX_MESSAGE_SIZE` are refused
//! - **Timeouts**: reads and writes are bounded so a stuck client cannot
//!   hold a connection slot forever

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, UnixListener};
use tokio::time::timeout;
use tracing::{debug, error, info, trace, warn};

use fc_core::constants::timing;
use fc_error::{FanctlError, Result};
use fc_protocol::{
    CommandParser, OutputFormat, Reply, Response, TransportKind, MAX_MESSAGE_SIZE,
};

use crate::dispatcher::dispatch;
use crate::fan_control::FanControlState;

/// Maximum concurrent client connections
const MAX_CONNECTIONS: usize = 16;

/// Write timeout per reply
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Socket permissions (0666 = world read/write)
const SOCKET_MODE: u32 = 0o666;

/// A bound control channel
pub enum ControlListener {
    Unix { listener: UnixListener, path: PathBuf },
    Tcp(TcpListener),
}

impl ControlListener {
    /// Bind the control channel
    ///
    /// A stale Unix socket left by a previous run is replaced, unless the path
    /// is a symlink.
    pub async fn bind(transport: TransportKind, address: &str) -> Result<Self> {
        match transport {
            TransportKind::Unix => {
                let path = PathBuf::from(address);
                prepare_socket_path(&path)?;
                let listener = UnixListener::bind(&path)?;
                std::fs::set_permissions(&path, std::fs::Permissions::from_mode(SOCKET_MODE))?;
                info!("Listening on {} (mode {:o})", path.display(), SOCKET_MODE);
                Ok(ControlListener::Unix { listener, path })
            }
            TransportKind::Tcp => {
                let listener = TcpListener::bind(address).await?;
                info!(address = %listener.local_addr()?, "Listening on TCP");
                Ok(ControlListener::Tcp(listener))
            }
        }
    }

    /// Address clients should connect to
    pub fn local_address(&self) -> String {
        match self {
            ControlListener::Unix { path, .. } => path.display().to_string(),
            ControlListener::Tcp(listener) => listener
                .local_addr()
                .map(|addr| addr.to_string())
                .unwrap_or_default(),
        }
    }

    /// Path of the Unix socket, if any
    pub fn socket_path(&self) -> Option<&Path> {
        match self {
            ControlListener::Unix { path, .. } => Some(path),
            ControlListener::Tcp(_) => None,
        }
    }
}

fn prepare_socket_path(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| FanctlError::FileWrite {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
    }

    // symlink_metadata so a dangling symlink is still seen
    if let Ok(metadata) = path.symlink_metadata() {
        if metadata.file_type().is_symlink() {
            return Err(FanctlError::generic(format!(
                "Socket path {} is a symlink, refusing to replace it",
                path.display()
            )));
        }
        std::fs::remove_file(path)?;
        debug!(path = %path.display(), "Removed stale socket");
    }
    Ok(())
}

/// Remove the Unix socket file, if it is still ours
pub fn remove_socket(path: &Path) {
    match path.symlink_metadata() {
        Ok(metadata) if !metadata.file_type().is_symlink() => {
            if let Err(e) = std::fs::remove_file(path) {
                warn!(path = %path.display(), "Failed to remove socket: {}", e);
            }
        }
        _ => {}
    }
}

/// Accept connections until shutdown is requested
pub async fn run_server(listener: ControlListener, state: Arc<FanControlState>) -> Result<()> {
    let active = Arc::new(AtomicUsize::new(0));

    loop {
        let accepted = tokio::select! {
            result = accept(&listener) => result,
            _ = state.shutdown_requested() => {
                debug!("Server shutting down");
                break;
            }
        };

        let Some(stream) = accepted else {
            continue;
        };

        let current = active.load(Ordering::SeqCst);
        if current >= MAX_CONNECTIONS {
            warn!(connections = current, "Connection limit reached, rejecting new connection");
            continue;
        }

        active.fetch_add(1, Ordering::SeqCst);
        let active = active.clone();
        let state = state.clone();
        tokio::spawn(async move {
            match stream {
                Stream::Unix(stream) => handle_connection(stream, state).await,
                Stream::Tcp(stream) => handle_connection(stream, state).await,
            }
            active.fetch_sub(1, Ordering::SeqCst);
        });
    }

    if let Some(path) = listener.socket_path() {
        remove_socket(path);
    }
    info!("Server stopped");
    Ok(())
}

enum Stream {
    Unix(tokio::net::UnixStream),
    Tcp(tokio::net::TcpStream),
}

async fn accept(listener: &ControlListener) -> Option<Stream> {
    let result = match listener {
        ControlListener::Unix { listener, .. } => {
            listener.accept().await.map(|(stream, _)| Stream::Unix(stream))
        }
        ControlListener::Tcp(listener) => listener.accept().await.map(|(stream, peer)| {
            trace!(%peer, "TCP connection");
            Stream::Tcp(stream)
        }),
    };
    match result {
        Ok(stream) => Some(stream),
        Err(e) => {
            error!("Accept error: {}", e);
            None
        }
    }
}

/// Serve one request on one connection
async fn handle_connection<S>(mut stream: S, state: Arc<FanControlState>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let reply = match timeout(timing::REQUEST_READ_TIMEOUT, read_request(&mut stream)).await {
        Ok(Ok(request)) => process_request(&request, &state).await,
        Ok(Err(e)) => {
            debug!("Rejected request: {}", e);
            Reply::new(Response::error(e.to_string())).render(OutputFormat::Natural)
        }
        Err(_) => {
            debug!("Read timeout");
            Reply::new(Response::error("Read timeout")).render(OutputFormat::Natural)
        }
    };

    send_reply(&mut stream, &reply).await;
}

async fn read_request<S>(stream: &mut S) -> Result<String>
where
    S: AsyncRead + Unpin,
{
    let mut buffer = Vec::new();
    // one byte past the limit tells an oversized request from a full one
    (&mut *stream)
        .take(MAX_MESSAGE_SIZE as u64 + 1)
        .read_to_end(&mut buffer)
        .await?;

    if buffer.len() > MAX_MESSAGE_SIZE {
        return Err(FanctlError::MessageTooLarge {
            size: buffer.len(),
            max_size: MAX_MESSAGE_SIZE,
        });
    }
    String::from_utf8(buffer)
        .map_err(|_| FanctlError::IpcProtocol("Invalid request encoding".into()))
}

/// Parse, dispatch and render one request
///
/// A request that cannot be parsed is answered in the natural format, since
/// the requested output format is unknown at that point.
pub async fn process_request(request: &str, state: &Arc<FanControlState>) -> String {
    let invocation = match CommandParser::remote().parse_line(request) {
        Ok(invocation) => invocation,
        Err(e) => {
            debug!(request = %request.trim(), "Unparseable request");
            return Reply::new(Response::error(e.to_string())).render(OutputFormat::Natural);
        }
    };

    let format = invocation.output_format;
    let command = invocation.command;
    trace!(command = command.name(), "Dispatching");

    let dispatch_state = state.clone();
    let outcome = tokio::task::spawn_blocking(move || dispatch(&dispatch_state, &command)).await;

    let reply = match outcome {
        Ok(Ok(dispatched)) => Reply::new(Response::Success(dispatched.result))
            .with_diagnostics(invocation.diagnostics)
            .with_diagnostics(dispatched.diagnostics),
        Ok(Err(e)) => {
            debug!(kind = e.kind(), "Command failed: {}", e);
            Reply::new(Response::error(e.to_string())).with_diagnostics(invocation.diagnostics)
        }
        Err(e) => {
            error!("Dispatch task failed: {}", e);
            Reply::new(Response::error("Internal error"))
        }
    };
    reply.render(format)
}

async fn send_reply<S>(stream: &mut S, reply: &str)
where
    S: AsyncWrite + Unpin,
{
    let write_result = timeout(WRITE_TIMEOUT, async {
        stream.write_all(reply.as_bytes()).await?;
        stream.shutdown().await
    })
    .await;

    match write_result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Write error: {}", e),
        Err(_) => error!("Write timeout"),
    }
}
