//! A fake fail2ban daemon on a temporary Unix socket.
//!
//! [`FakeDaemon`] accepts connections, reads one framed request per
//! connection, records the decoded command, and answers as its handler says.
//! The socket lives in a temp directory removed when the daemon is dropped.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use banbridge_core::wire::{decode_command, encode_reply, frame, has_marker, strip_markers};
use banbridge_core::{BridgeClient, Command, RawReply};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::task::JoinHandle;
use tracing::debug;

/// How the fake daemon answers one request.
#[derive(Debug, Clone)]
pub enum Reply {
    /// The reply pickled (protocol 0) and framed with the end marker.
    Pickled(RawReply),
    /// These exact bytes, then close. Include the end marker or not.
    Raw(Vec<u8>),
    /// The received command, pickled back as a list of strings.
    Echo,
    /// `bytes[..at]`, a pause, then `bytes[at..]`, to force separate reads.
    Split { bytes: Vec<u8>, at: usize },
    /// Nothing at all; the connection stays open until the client leaves.
    Silent,
}

type Handler = dyn Fn(&Command) -> Reply + Send + Sync;

/// A test-scoped fake daemon.
pub struct FakeDaemon {
    socket_path: PathBuf,
    received: Arc<Mutex<Vec<Command>>>,
    task: JoinHandle<()>,
    _temp_dir: TempDir,
}

impl FakeDaemon {
    /// Start a daemon that answers every request with `handler(command)`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<F>(handler: F) -> Self
    where
        F: Fn(&Command) -> Reply + Send + Sync + 'static,
    {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let socket_path = temp_dir.path().join("fail2ban.sock");
        let listener = UnixListener::bind(&socket_path).expect("failed to bind fake daemon socket");

        let received = Arc::new(Mutex::new(Vec::new()));
        let handler: Arc<Handler> = Arc::new(handler);
        let task = tokio::spawn(accept_loop(listener, handler, Arc::clone(&received)));

        Self {
            socket_path,
            received,
            task,
            _temp_dir: temp_dir,
        }
    }

    /// A daemon that answers everything with the same pickled reply.
    pub fn replying(reply: RawReply) -> Self {
        Self::start(move |_| Reply::Pickled(reply.clone()))
    }

    /// A daemon that echoes every command back.
    pub fn echo() -> Self {
        Self::start(|_| Reply::Echo)
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// A bridge client pointed at this daemon.
    pub fn client(&self) -> BridgeClient {
        BridgeClient::new(&self.socket_path)
    }

    /// Commands received so far, in arrival order.
    pub fn received(&self) -> Vec<Command> {
        self.received.lock().expect("received list poisoned").clone()
    }
}

impl Drop for FakeDaemon {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn accept_loop(
    listener: UnixListener,
    handler: Arc<Handler>,
    received: Arc<Mutex<Vec<Command>>>,
) {
    while let Ok((stream, _)) = listener.accept().await {
        let handler = Arc::clone(&handler);
        let received = Arc::clone(&received);
        tokio::spawn(async move {
            if let Err(e) = serve_connection(stream, handler, received).await {
                debug!(error = %e, "fake daemon connection ended with error");
            }
        });
    }
}

async fn read_request(stream: &mut UnixStream) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        let scanned = buf.len();
        buf.extend_from_slice(&chunk[..n]);
        if has_marker(&buf, scanned) {
            break;
        }
    }
    Ok(strip_markers(&buf))
}

async fn serve_connection(
    mut stream: UnixStream,
    handler: Arc<Handler>,
    received: Arc<Mutex<Vec<Command>>>,
) -> std::io::Result<()> {
    let request = read_request(&mut stream).await?;
    let command = match decode_command(&request) {
        Ok(command) => command,
        Err(e) => {
            let reply = RawReply::seq([RawReply::int(1), RawReply::str(format!("bad request: {e}"))]);
            return stream.write_all(&frame(encode_reply(&reply))).await;
        }
    };
    debug!(command = %command, "fake daemon received command");
    received
        .lock()
        .expect("received list poisoned")
        .push(command.clone());

    match handler(&command) {
        Reply::Pickled(reply) => stream.write_all(&frame(encode_reply(&reply))).await?,
        Reply::Raw(bytes) => stream.write_all(&bytes).await?,
        Reply::Echo => {
            let tokens = command.tokens().iter().map(|t| RawReply::str(t.as_str()));
            let reply = RawReply::seq(tokens);
            stream.write_all(&frame(encode_reply(&reply))).await?;
        }
        Reply::Split { bytes, at } => {
            let at = at.min(bytes.len());
            stream.write_all(&bytes[..at]).await?;
            stream.flush().await?;
            tokio::time::sleep(Duration::from_millis(25)).await;
            stream.write_all(&bytes[at..]).await?;
        }
        Reply::Silent => {
            let mut sink = [0u8; 64];
            while stream.read(&mut sink).await? > 0 {}
        }
    }
    stream.shutdown().await
}
