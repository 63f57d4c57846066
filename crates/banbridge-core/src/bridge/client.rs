//! The request/reply exchange over the Unix socket.

use std::path::{Path, PathBuf};
use std::time::Duration;

use banbridge_config::BridgeConfig;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tracing::{debug, warn};

use super::{BridgeError, Command};
use crate::reply::RawReply;
use crate::wire;

/// Size of each read from the socket.
const CHUNK_SIZE: usize = 4096;

/// Client for the fail2ban control socket.
///
/// Holds no connection: each [`execute`](Self::execute) opens its own, so a
/// single client can be shared between concurrent requests.
#[derive(Debug, Clone)]
pub struct BridgeClient {
    socket_path: PathBuf,
    timeout: Option<Duration>,
}

impl BridgeClient {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            timeout: None,
        }
    }

    /// Bound every exchange by `timeout`. Without one, a call waits until the
    /// daemon sends the end marker or closes the connection.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            socket_path: PathBuf::from(&config.socket_path),
            timeout: config.timeout(),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Send one command and return the decoded reply.
    ///
    /// Only transport problems are errors. A reply that is not valid pickle
    /// comes back as [`RawReply::Text`].
    pub async fn execute(&self, command: &Command) -> Result<RawReply, BridgeError> {
        let buf = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.exchange(command))
                .await
                .map_err(|_| BridgeError::Timeout(limit))??,
            None => self.exchange(command).await?,
        };

        let payload = wire::strip_markers(&buf);
        match wire::decode(&payload) {
            Ok(reply) => Ok(reply),
            Err(e) => {
                warn!(command = %command, error = %e, "reply is not valid pickle, using text");
                Ok(RawReply::Text(
                    String::from_utf8_lossy(&payload).into_owned(),
                ))
            }
        }
    }

    /// Connect, write, and read until the end marker or EOF.
    async fn exchange(&self, command: &Command) -> Result<Vec<u8>, BridgeError> {
        let mut stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|e| BridgeError::Connect {
                path: self.socket_path.clone(),
                source: e,
            })?;

        let message = wire::frame(wire::encode_command(command));
        debug!(command = %command, bytes = message.len(), "sending command");
        stream
            .write_all(&message)
            .await
            .map_err(BridgeError::Write)?;

        let mut buf = Vec::new();
        let mut chunk = [0u8; CHUNK_SIZE];
        loop {
            let n = match stream.read(&mut chunk).await {
                Ok(n) => n,
                Err(e) if buf.is_empty() => return Err(BridgeError::Read(e)),
                Err(e) => {
                    warn!(error = %e, received = buf.len(), "read failed mid-reply, treating as end of stream");
                    break;
                }
            };
            if n == 0 {
                debug!(received = buf.len(), "daemon closed the connection");
                break;
            }
            let scanned = buf.len();
            buf.extend_from_slice(&chunk[..n]);
            if wire::has_marker(&buf, scanned) {
                break;
            }
        }

        debug!(command = %command, bytes = buf.len(), "reply received");
        Ok(buf)
    }
}
