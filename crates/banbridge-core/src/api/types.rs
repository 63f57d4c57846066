//! Request and response bodies of the HTTP API.

use std::convert::Infallible;

use axum::body::Bytes;
use axum::extract::{FromRequest, Request};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::bridge::Command;

/// Error body: `{"error": "..."}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Bridge build information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub git_hash: String,
    pub build_profile: String,
    pub socket_path: String,
}

/// Flattened daemon reply to a control command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResponse {
    pub result: String,
    /// The command that was sent, echoed for routes that assemble flags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
}

impl CommandResponse {
    pub fn new(result: String) -> Self {
        Self {
            result,
            command: None,
        }
    }

    pub fn echo(result: String, command: &Command) -> Self {
        Self {
            result,
            command: Some(command.tokens().to_vec()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BannedResponse {
    pub ips: Vec<String>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileResponse {
    pub path: String,
    pub exists: bool,
    pub lines: Vec<String>,
}

/// Query string of `/api/file`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileQuery {
    #[serde(default)]
    pub path: String,
    /// Kept as text so an unparsable value means "all lines" instead of 400.
    #[serde(default)]
    pub lines: Option<String>,
}

impl FileQuery {
    /// Positive: first N lines. Negative: last N. Zero or unparsable: all.
    pub fn line_limit(&self) -> i64 {
        self.lines
            .as_deref()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0)
    }
}

/// A POST body read as a JSON object.
///
/// A missing, malformed or non-object body reads as `{}`, and JSON `null`
/// counts as absent.
#[derive(Debug, Clone, Default)]
pub struct JsonBody(Map<String, Value>);

impl JsonBody {
    pub fn parse(bytes: &[u8]) -> Self {
        match serde_json::from_slice(bytes) {
            Ok(Value::Object(map)) => Self(map),
            _ => Self::default(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| !v.is_null())
    }

    pub fn str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// A boolean option: `true`, non-zero numbers, and the strings
    /// `1`/`true`/`yes`/`on` (any case) are set. Everything else is unset.
    pub fn flag(&self, key: &str) -> bool {
        match self.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
            Some(Value::String(s)) => {
                matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
            }
            _ => false,
        }
    }

    /// An integer option, accepting integral numbers, truncated floats,
    /// booleans and integer strings.
    pub fn int(&self, key: &str) -> IntField {
        let Some(value) = self.get(key) else {
            return IntField::Missing;
        };
        let parsed = match value {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
            Value::Bool(b) => Some(i64::from(*b)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        parsed.map_or(IntField::Invalid, IntField::Value)
    }
}

/// Result of [`JsonBody::int`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntField {
    Missing,
    Invalid,
    Value(i64),
}

impl<S: Send + Sync> FromRequest<S> for JsonBody {
    type Rejection = Infallible;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state).await.unwrap_or_default();
        Ok(Self::parse(&bytes))
    }
}
