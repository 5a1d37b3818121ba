//! Daemon Client
//!
//! Sends one request to a running fanctld and returns the rendered reply.
//! The exchange is one request per connection: the request is written, the
//! write side is shut down to mark its end, and the reply is read until the
//! daemon closes the connection.

use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::os::unix::net::UnixStream;
use std::time::Duration;

use tracing::debug;

use fc_error::{FanctlError, Result};
use fc_protocol::{TransportKind, MAX_MESSAGE_SIZE};

use crate::constants::timing;

/// Replies carry the whole configuration for `print all`, so they get more room
pub const MAX_REPLY_SIZE: usize = 8 * MAX_MESSAGE_SIZE;

enum Connection {
    Unix(UnixStream),
    Tcp(TcpStream),
}

impl Connection {
    fn open(transport: TransportKind, address: &str, timeout: Duration) -> Result<Self> {
        let connection = match transport {
            TransportKind::Unix => {
                let stream = UnixStream::connect(address).map_err(|e| {
                    FanctlError::DaemonConnection(format!("cannot connect to {}: {}", address, e))
                })?;
                stream.set_read_timeout(Some(timeout))?;
                stream.set_write_timeout(Some(timeout))?;
                Connection::Unix(stream)
            }
            TransportKind::Tcp => {
                let target = address
                    .to_socket_addrs()
                    .map_err(|e| FanctlError::DaemonConnection(format!("invalid address {}: {}", address, e)))?
                    .next()
                    .ok_or_else(|| FanctlError::DaemonConnection(format!("{} did not resolve", address)))?;
                let stream = TcpStream::connect_timeout(&target, timeout).map_err(|e| {
                    FanctlError::DaemonConnection(format!("cannot connect to {}: {}", address, e))
                })?;
                stream.set_read_timeout(Some(timeout))?;
                stream.set_write_timeout(Some(timeout))?;
                Connection::Tcp(stream)
            }
        };
        Ok(connection)
    }

    fn write_request(&mut self, request: &[u8]) -> std::io::Result<()> {
        match self {
            Connection::Unix(stream) => {
                stream.write_all(request)?;
                stream.shutdown(Shutdown::Write)
            }
            Connection::Tcp(stream) => {
                stream.write_all(request)?;
                stream.shutdown(Shutdown::Write)
            }
        }
    }

    fn read_reply(&mut self) -> std::io::Result<Vec<u8>> {
        let mut reply = Vec::new();
        // one byte past the limit tells an oversized reply from a full one
        let limit = MAX_REPLY_SIZE as u64 + 1;
        match self {
            Connection::Unix(stream) => stream.take(limit).read_to_end(&mut reply)?,
            Connection::Tcp(stream) => stream.take(limit).read_to_end(&mut reply)?,
        };
        Ok(reply)
    }
}

/// Client for the daemon's control channel
#[derive(Debug, Clone)]
pub struct DaemonClient {
    transport: TransportKind,
    address: String,
    timeout: Duration,
}

impl DaemonClient {
    pub fn new(transport: TransportKind, address: impl Into<String>) -> Self {
        Self {
            transport,
            address: address.into(),
            timeout: timing::CLIENT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Send one request line and return the daemon's reply
    pub fn send(&self, request: &str) -> Result<String> {
        if request.len() > MAX_MESSAGE_SIZE {
            return Err(FanctlError::MessageTooLarge {
                size: request.len(),
                max_size: MAX_MESSAGE_SIZE,
            });
        }

        let mut connection = Connection::open(self.transport, &self.address, self.timeout)?;
        connection
            .write_request(request.as_bytes())
            .map_err(|e| FanctlError::DaemonConnection(format!("failed to send request: {}", e)))?;

        let reply = connection
            .read_reply()
            .map_err(|e| FanctlError::DaemonConnection(format!("failed to read reply: {}", e)))?;

        if reply.is_empty() {
            return Err(FanctlError::DaemonConnection("daemon closed the connection".to_string()));
        }
        if reply.len() > MAX_REPLY_SIZE {
            return Err(FanctlError::MessageTooLarge {
                size: reply.len(),
                max_size: MAX_REPLY_SIZE,
            });
        }

        debug!(address = %self.address, bytes = reply.len(), "Reply received");
        String::from_utf8(reply)
            .map_err(|e| FanctlError::IpcProtocol(format!("reply is not valid UTF-8: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixListener;
    use std::thread;
    use tempfile::TempDir;

    #[test]
    fn test_round_trip_over_unix_socket() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fanctl.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = String::new();
            stream.read_to_string(&mut request).unwrap();
            stream.write_all(format!("echo: {}", request).as_bytes()).unwrap();
        });

        let client = DaemonClient::new(TransportKind::Unix, path.to_string_lossy());
        assert_eq!(client.send("print current").unwrap(), "echo: print current");
        server.join().unwrap();
    }

    #[test]
    fn test_oversized_request_is_rejected_locally() {
        let client = DaemonClient::new(TransportKind::Unix, "/nonexistent/fanctl.sock");
        let request = "x".repeat(MAX_MESSAGE_SIZE + 1);
        assert!(matches!(
            client.send(&request),
            Err(FanctlError::MessageTooLarge { .. })
        ));
    }

    #[test]
    fn test_missing_daemon_is_connection_error() {
        let dir = TempDir::new().unwrap();
        let client = DaemonClient::new(TransportKind::Unix, dir.path().join("absent.sock").to_string_lossy());
        assert!(matches!(
            client.send("pause"),
            Err(FanctlError::DaemonConnection(_))
        ));
    }
}
