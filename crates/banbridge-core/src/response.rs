//! Helpers that turn arbitrary replies into text or address lists.

use std::cmp::Ordering;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::reply::{RawReply, Scalar};

/// Strict dotted-quad IPv4: four decimal octets 0-255, up to three digits each.
static IPV4_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^((25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\.){3}(25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)$")
        .unwrap_or_else(|_| unreachable!())
});

/// Separators between address tokens in free text.
static TOKEN_SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\s,;]+").unwrap_or_else(|_| unreachable!()));

/// Render a reply as plain text.
///
/// Sequences are flattened recursively, one part per line, with empty parts
/// dropped. Mappings and scalars print as Python's `str()` would, so a
/// mapping comes out as its repr, e.g. `{'sshd': ['1.2.3.4']}`.
pub fn flatten(reply: &RawReply) -> String {
    match reply {
        RawReply::Scalar(scalar) => scalar.to_string(),
        RawReply::Text(text) => text.clone(),
        RawReply::Sequence(items) => join_nonempty(items.iter().map(flatten)),
        RawReply::Mapping(_) => reply.to_string(),
    }
}

fn join_nonempty(parts: impl Iterator<Item = String>) -> String {
    parts
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Whether `candidate` is a dotted-quad IPv4 address.
pub fn is_valid_ipv4(candidate: &str) -> bool {
    IPV4_REGEX.is_match(candidate)
}

/// Every distinct IPv4 address found anywhere in a reply, in numeric order.
///
/// Mapping keys are not searched, only values.
pub fn collect_addresses(reply: &RawReply) -> Vec<String> {
    let mut found = Vec::new();
    walk(reply, &mut found);
    found.sort_by(|a, b| compare_addresses(a, b));
    found.dedup();
    found
}

fn walk(reply: &RawReply, found: &mut Vec<String>) {
    match reply {
        RawReply::Sequence(items) => items.iter().for_each(|item| walk(item, found)),
        RawReply::Mapping(mapping) => mapping.values().for_each(|value| walk(value, found)),
        RawReply::Scalar(Scalar::Bytes(bytes)) => scan(&String::from_utf8_lossy(bytes), found),
        RawReply::Scalar(scalar) => scan(&scalar.to_string(), found),
        RawReply::Text(text) => scan(text, found),
    }
}

fn scan(text: &str, found: &mut Vec<String>) {
    found.extend(
        TOKEN_SEPARATOR
            .split(text.trim())
            .filter(|token| is_valid_ipv4(token))
            .map(str::to_string),
    );
}

/// Numeric octet order, then text order for spellings like `010.0.0.1`.
fn compare_addresses(a: &str, b: &str) -> Ordering {
    octets(a).cmp(&octets(b)).then_with(|| a.cmp(b))
}

fn octets(address: &str) -> [u16; 4] {
    let mut out = [0u16; 4];
    for (slot, part) in out.iter_mut().zip(address.split('.')) {
        *slot = part.parse().unwrap_or(0);
    }
    out
}
