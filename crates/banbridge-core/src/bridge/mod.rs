//! Transport client for the fail2ban control socket.
//!
//! One call, one connection: [`BridgeClient::execute`] connects, writes the
//! framed command, reads until the end marker or EOF, and decodes whatever
//! came back.

pub mod client;
pub mod command;

pub use client::BridgeClient;
pub use command::Command;

use std::path::PathBuf;
use std::time::Duration;

/// Errors from talking to the daemon.
///
/// Decode failures are deliberately absent: an undecodable reply is returned
/// as [`RawReply::Text`](crate::RawReply::Text) instead.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("command must contain at least one token")]
    EmptyCommand,

    #[error("failed to connect to fail2ban socket at {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to send command: {0}")]
    Write(#[source] std::io::Error),

    #[error("failed to read reply: {0}")]
    Read(#[source] std::io::Error),

    #[error("no reply from fail2ban within {0:?}")]
    Timeout(Duration),
}
