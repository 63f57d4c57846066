//! Parsers for `status` and `status <jail>` replies.
//!
//! Both parsers try the structured route first: [`normalize`] the reply and
//! look fields up by label. When the reply has no usable structure (it came
//! back as text, or the mapping is empty) they scan its text line by line
//! instead. Labels come from [`KeyAliases`], for both routes.

mod global;
mod unit;

pub use global::GlobalStatus;
pub use unit::{ActionsStatus, FilterStatus, UnitStatus, WatchedFile};

use std::borrow::Cow;

use banbridge_config::KeyAliases;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::normalize::normalize;
use crate::reply::{Mapping, RawReply, Scalar};
use crate::response::flatten;

/// Separators inside jail and file lists.
static LIST_SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[,\s]+").unwrap_or_else(|_| unreachable!()));

static DEFAULT_PARSER: Lazy<StatusParser> = Lazy::new(|| {
    StatusParser::new(&KeyAliases::default()).unwrap_or_else(|_| unreachable!())
});

/// Status reply parser for one alias table.
///
/// Text patterns are compiled once, in [`StatusParser::new`].
#[derive(Debug, Clone)]
pub struct StatusParser {
    aliases: KeyAliases,
    text: TextPatterns,
}

/// `<label>:\s*<value>` patterns for the text route.
#[derive(Debug, Clone)]
struct TextPatterns {
    jail_count: Regex,
    jail_list: Regex,
    currently_failed: Regex,
    total_failed: Regex,
    file_list: Regex,
    currently_banned: Regex,
    total_banned: Regex,
    banned_list: Regex,
}

impl StatusParser {
    /// Build a parser for the given labels.
    ///
    /// Fails only if the derived patterns exceed the regex size limit.
    pub fn new(aliases: &KeyAliases) -> Result<Self, regex::Error> {
        let text = TextPatterns {
            jail_count: counter_pattern(&aliases.jail_count)?,
            jail_list: list_pattern(&aliases.jail_list)?,
            currently_failed: counter_pattern(&aliases.currently_failed)?,
            total_failed: counter_pattern(&aliases.total_failed)?,
            file_list: list_pattern(&aliases.file_list)?,
            currently_banned: counter_pattern(&aliases.currently_banned)?,
            total_banned: counter_pattern(&aliases.total_banned)?,
            banned_list: list_pattern(&aliases.banned_list)?,
        };
        Ok(Self {
            aliases: aliases.clone(),
            text,
        })
    }
}

impl Default for StatusParser {
    fn default() -> Self {
        DEFAULT_PARSER.clone()
    }
}

/// [`StatusParser::parse_global_status`] with the built-in labels.
pub fn parse_global_status(reply: &RawReply) -> GlobalStatus {
    DEFAULT_PARSER.parse_global_status(reply)
}

/// [`StatusParser::parse_unit_status`] with the built-in labels.
pub fn parse_unit_status(reply: &RawReply) -> UnitStatus {
    DEFAULT_PARSER.parse_unit_status(reply)
}

// ── Shared helpers ─────────────────────────────────────────────────────

/// Which route a reply takes through a parser.
enum Source<'a> {
    Fields(Mapping),
    Text(Cow<'a, str>),
}

impl<'a> Source<'a> {
    fn of(reply: &'a RawReply) -> Self {
        if let RawReply::Text(text) = reply {
            return Source::Text(Cow::Borrowed(text));
        }
        match normalize(reply) {
            Some(mapping) if !mapping.is_empty() => Source::Fields(mapping),
            _ => Source::Text(Cow::Owned(flatten(reply))),
        }
    }
}

fn alternation(labels: &[String]) -> String {
    labels
        .iter()
        .map(|label| regex::escape(label))
        .collect::<Vec<_>>()
        .join("|")
}

fn counter_pattern(labels: &[String]) -> Result<Regex, regex::Error> {
    Regex::new(&format!(r"(?:{}):\s*([0-9]+)", alternation(labels)))
}

fn list_pattern(labels: &[String]) -> Result<Regex, regex::Error> {
    Regex::new(&format!(r"(?:{}):\s*(.+)", alternation(labels)))
}

/// Capture group 1 of the first line `pattern` matches.
fn first_capture<'t>(pattern: &Regex, text: &'t str) -> Option<&'t str> {
    text.lines()
        .find_map(|line| pattern.captures(line))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Like [`first_capture`], but a later matching line overrides an earlier one.
fn last_capture<'t>(pattern: &Regex, text: &'t str) -> Option<&'t str> {
    text.lines()
        .filter_map(|line| pattern.captures(line))
        .last()
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

fn text_counter(pattern: &Regex, text: &str) -> i64 {
    parse_digits(first_capture(pattern, text))
}

fn parse_digits(digits: Option<&str>) -> i64 {
    digits.and_then(|d| d.parse().ok()).unwrap_or(0)
}

/// Read a counter leniently: integers, numeric strings, booleans and
/// truncated floats count; anything else is 0.
fn read_counter(value: Option<&RawReply>) -> i64 {
    match value {
        Some(RawReply::Scalar(scalar)) => match scalar {
            Scalar::Int(i) => *i,
            Scalar::Bool(b) => i64::from(*b),
            Scalar::Float(f) => *f as i64,
            Scalar::Str(s) => s.trim().parse().unwrap_or(0),
            Scalar::Bytes(b) => String::from_utf8_lossy(b).trim().parse().unwrap_or(0),
            Scalar::None => 0,
        },
        Some(RawReply::Text(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

/// Read a list field: a delimited string is split with `split`, a sequence
/// contributes each element's text. Blank entries are dropped.
fn read_list(value: Option<&RawReply>, split: fn(&str) -> Vec<String>) -> Vec<String> {
    match value {
        Some(RawReply::Scalar(Scalar::Str(s))) | Some(RawReply::Text(s)) => split(s),
        Some(RawReply::Scalar(Scalar::Bytes(b))) => split(&String::from_utf8_lossy(b)),
        Some(RawReply::Sequence(items)) => items
            .iter()
            .map(|item| item.to_string().trim().to_string())
            .filter(|item| !item.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

fn split_list(s: &str) -> Vec<String> {
    LIST_SEPARATOR
        .split(s.trim())
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

fn split_whitespace(s: &str) -> Vec<String> {
    s.split_whitespace().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_read_counter_is_lenient() {
        assert_eq!(read_counter(Some(&RawReply::int(4))), 4);
        assert_eq!(read_counter(Some(&RawReply::str(" 12 "))), 12);
        assert_eq!(read_counter(Some(&RawReply::from(true))), 1);
        assert_eq!(read_counter(Some(&RawReply::Scalar(Scalar::Float(2.9)))), 2);
        assert_eq!(read_counter(Some(&RawReply::str("many"))), 0);
        assert_eq!(read_counter(Some(&RawReply::none())), 0);
        assert_eq!(read_counter(Some(&RawReply::seq([RawReply::int(1)]))), 0);
        assert_eq!(read_counter(None), 0);
    }

    #[test]
    fn test_read_list_shapes() {
        let csv = RawReply::str("sshd, nginx,,  postfix");
        assert_eq!(read_list(Some(&csv), split_list), vec!["sshd", "nginx", "postfix"]);

        let seq = RawReply::seq([RawReply::str(" a "), RawReply::str(""), RawReply::int(3)]);
        assert_eq!(read_list(Some(&seq), split_list), vec!["a", "3"]);

        assert!(read_list(Some(&RawReply::int(1)), split_list).is_empty());
        assert!(read_list(None, split_whitespace).is_empty());
    }

    #[test]
    fn test_patterns_escape_labels() {
        let pattern = counter_pattern(&["a.b (x)".to_string()]).unwrap();
        assert_eq!(text_counter(&pattern, "a.b (x): 5"), 5);
        assert_eq!(text_counter(&pattern, "aXb (x): 5"), 0);
    }

    #[test]
    fn test_first_capture_takes_first_matching_line() {
        let pattern = counter_pattern(&["Total failed".to_string()]).unwrap();
        let text = "noise\nTotal failed: 7\nTotal failed: 9\n";
        assert_eq!(text_counter(&pattern, text), 7);
    }

    #[test]
    fn test_last_capture_takes_last_matching_line() {
        let pattern = counter_pattern(&["Total failed".to_string()]).unwrap();
        let text = "Total failed: 7
Total failed: 9
noise
";
        assert_eq!(last_capture(&pattern, text), Some("9"));
        assert_eq!(last_capture(&pattern, "noise"), None);
    }

    #[test]
    fn test_text_reply_takes_text_route() {
        let reply = RawReply::Text("Number of jail: 1".into());
        assert!(matches!(Source::of(&reply), Source::Text(Cow::Borrowed(_))));

        let empty = RawReply::Mapping(Mapping::new());
        assert!(matches!(Source::of(&empty), Source::Text(_)));
    }
}
