//! Decoded daemon replies.
//!
//! fail2ban answers with a pickled object graph whose shape depends on the
//! command: status codes wrapping lists of `(label, value)` tuples, bare
//! strings, dicts keyed by jail name. [`RawReply`] captures every shape the
//! decoder can produce as a closed sum type so the normalizer and parsers can
//! match on it exhaustively.

use std::collections::HashMap;
use std::fmt;

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

/// A leaf value in a decoded reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
}

/// A decoded reply, or the text fallback when decoding failed.
#[derive(Debug, Clone, PartialEq)]
pub enum RawReply {
    Scalar(Scalar),
    /// Lists, tuples, sets and frozensets.
    Sequence(Vec<RawReply>),
    Mapping(Mapping),
    /// The reply bytes as text, produced only when the payload could not be
    /// decoded.
    Text(String),
}

/// An insertion-ordered, string-keyed map.
///
/// Inserting a key that is already present replaces its value in place, so a
/// repeated key keeps its first position but carries the last value. Lookups
/// go through a key index, so building a mapping stays linear.
#[derive(Clone, Default)]
pub struct Mapping {
    entries: Vec<(String, RawReply)>,
    index: HashMap<String, usize>,
}

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, returning the one it replaced.
    pub fn insert(&mut self, key: impl Into<String>, value: RawReply) -> Option<RawReply> {
        let key = key.into();
        match self.index.get(&key) {
            Some(&pos) => Some(std::mem::replace(&mut self.entries[pos].1, value)),
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&RawReply> {
        self.index.get(key).map(|&pos| &self.entries[pos].1)
    }

    /// Look up the first of `keys` that is present.
    pub fn get_any<S: AsRef<str>>(&self, keys: &[S]) -> Option<&RawReply> {
        keys.iter().find_map(|key| self.get(key.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RawReply)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &RawReply> {
        self.entries.iter().map(|(_, v)| v)
    }
}

// The index is derived from `entries`, so only the entries take part.
impl PartialEq for Mapping {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl fmt::Debug for Mapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K: Into<String>> FromIterator<(K, RawReply)> for Mapping {
    fn from_iter<I: IntoIterator<Item = (K, RawReply)>>(iter: I) -> Self {
        let mut mapping = Mapping::new();
        for (key, value) in iter {
            mapping.insert(key, value);
        }
        mapping
    }
}

impl IntoIterator for Mapping {
    type Item = (String, RawReply);
    type IntoIter = std::vec::IntoIter<(String, RawReply)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

// ── Constructors ───────────────────────────────────────────────────────

impl RawReply {
    pub fn none() -> Self {
        RawReply::Scalar(Scalar::None)
    }

    pub fn str(s: impl Into<String>) -> Self {
        RawReply::Scalar(Scalar::Str(s.into()))
    }

    pub fn int(i: i64) -> Self {
        RawReply::Scalar(Scalar::Int(i))
    }

    pub fn seq(items: impl IntoIterator<Item = RawReply>) -> Self {
        RawReply::Sequence(items.into_iter().collect())
    }

    /// A two-element sequence, the shape fail2ban uses for `(label, value)`.
    pub fn pair(key: impl Into<String>, value: RawReply) -> Self {
        RawReply::Sequence(vec![RawReply::str(key), value])
    }

    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, RawReply)>) -> Self {
        RawReply::Mapping(entries.into_iter().collect())
    }

    pub fn as_sequence(&self) -> Option<&[RawReply]> {
        match self {
            RawReply::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            RawReply::Mapping(mapping) => Some(mapping),
            _ => None,
        }
    }
}

impl From<&str> for RawReply {
    fn from(s: &str) -> Self {
        RawReply::str(s)
    }
}

impl From<String> for RawReply {
    fn from(s: String) -> Self {
        RawReply::str(s)
    }
}

impl From<i64> for RawReply {
    fn from(i: i64) -> Self {
        RawReply::int(i)
    }
}

impl From<bool> for RawReply {
    fn from(b: bool) -> Self {
        RawReply::Scalar(Scalar::Bool(b))
    }
}

impl From<Vec<RawReply>> for RawReply {
    fn from(items: Vec<RawReply>) -> Self {
        RawReply::Sequence(items)
    }
}

impl From<Mapping> for RawReply {
    fn from(mapping: Mapping) -> Self {
        RawReply::Mapping(mapping)
    }
}

// ── Python-style string conversion ─────────────────────────────────────

/// Format a float the way Python's `repr` does for the common cases:
/// integral values keep a trailing `.0`.
fn format_float(f: f64) -> String {
    if f.is_nan() {
        "nan".to_string()
    } else if f.is_infinite() {
        (if f > 0.0 { "inf" } else { "-inf" }).to_string()
    } else if f.fract() == 0.0 && f.abs() < 1e16 {
        format!("{f:.1}")
    } else if f.abs() >= 1e16 {
        format!("{f:e}")
    } else {
        format!("{f}")
    }
}

fn write_quoted(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    f.write_str("'")?;
    for ch in s.chars() {
        match ch {
            '\\' => f.write_str("\\\\")?,
            '\'' => f.write_str("\\'")?,
            '\n' => f.write_str("\\n")?,
            '\r' => f.write_str("\\r")?,
            '\t' => f.write_str("\\t")?,
            c => write!(f, "{c}")?,
        }
    }
    f.write_str("'")
}

/// Python's bytes repr: `b'...'`, switching to double quotes when the
/// payload holds a single quote but no double quote.
fn write_bytes(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    let quote = if bytes.contains(&b'\'') && !bytes.contains(&b'"') {
        b'"'
    } else {
        b'\''
    };
    write!(f, "b{}", char::from(quote))?;
    for &byte in bytes {
        match byte {
            b'\\' => f.write_str("\\\\")?,
            b'\n' => f.write_str("\\n")?,
            b'\r' => f.write_str("\\r")?,
            b'\t' => f.write_str("\\t")?,
            b if b == quote => write!(f, "\\{}", char::from(b))?,
            0x20..=0x7e => write!(f, "{}", char::from(byte))?,
            _ => write!(f, "\\x{byte:02x}")?,
        }
    }
    write!(f, "{}", char::from(quote))
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::None => f.write_str("None"),
            Scalar::Bool(true) => f.write_str("True"),
            Scalar::Bool(false) => f.write_str("False"),
            Scalar::Int(i) => write!(f, "{i}"),
            Scalar::Float(x) => f.write_str(&format_float(*x)),
            Scalar::Str(s) => f.write_str(s),
            Scalar::Bytes(b) => write_bytes(f, b),
        }
    }
}

/// Writes a nested value the way it appears inside a Python container repr.
struct Repr<'a>(&'a RawReply);

impl fmt::Display for Repr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            RawReply::Scalar(Scalar::Str(s)) | RawReply::Text(s) => write_quoted(f, s),
            other => write!(f, "{other}"),
        }
    }
}

/// Python `str()` semantics: scalars print bare, containers print as their
/// repr. This is also the diagnostic form used for dict keys and for
/// reconstructed objects.
impl fmt::Display for RawReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawReply::Scalar(scalar) => write!(f, "{scalar}"),
            RawReply::Text(text) => f.write_str(text),
            RawReply::Sequence(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", Repr(item))?;
                }
                f.write_str("]")
            }
            RawReply::Mapping(mapping) => {
                f.write_str("{")?;
                for (i, (key, value)) in mapping.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write_quoted(f, key)?;
                    write!(f, ": {}", Repr(value))?;
                }
                f.write_str("}")
            }
        }
    }
}

// ── JSON ───────────────────────────────────────────────────────────────

impl Serialize for Scalar {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Scalar::None => serializer.serialize_none(),
            Scalar::Bool(b) => serializer.serialize_bool(*b),
            Scalar::Int(i) => serializer.serialize_i64(*i),
            Scalar::Float(x) => serializer.serialize_f64(*x),
            Scalar::Str(s) => serializer.serialize_str(s),
            Scalar::Bytes(b) => serializer.serialize_str(&String::from_utf8_lossy(b)),
        }
    }
}

impl Serialize for RawReply {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RawReply::Scalar(scalar) => scalar.serialize(serializer),
            RawReply::Text(text) => serializer.serialize_str(text),
            RawReply::Sequence(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            RawReply::Mapping(mapping) => mapping.serialize(serializer),
        }
    }
}

impl Serialize for Mapping {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (key, value) in self.iter() {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}
