//! Command vectors sent to the daemon.

use std::fmt;

use serde::{Serialize, Serializer};

use super::BridgeError;

/// A non-empty, ordered list of command tokens, e.g. `["status", "sshd"]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    tokens: Vec<String>,
}

impl Command {
    /// Build a command from its tokens. Tokens are passed through verbatim.
    pub fn new<I, S>(tokens: I) -> Result<Self, BridgeError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tokens: Vec<String> = tokens.into_iter().map(Into::into).collect();
        if tokens.is_empty() {
            return Err(BridgeError::EmptyCommand);
        }
        Ok(Self { tokens })
    }

    /// Split a whitespace-separated command line into tokens.
    pub fn parse(line: &str) -> Result<Self, BridgeError> {
        Self::new(line.split_whitespace())
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn into_tokens(self) -> Vec<String> {
        self.tokens
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tokens.join(" "))
    }
}

impl Serialize for Command {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.tokens.serialize(serializer)
    }
}
