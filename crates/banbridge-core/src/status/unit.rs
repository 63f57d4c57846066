use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{
    first_capture, read_counter, read_list, split_list, split_whitespace, text_counter, Source,
    StatusParser,
};
use crate::reply::{Mapping, RawReply};

/// Parsed reply to `status <jail>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitStatus {
    pub filter: FilterStatus,
    pub actions: ActionsStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterStatus {
    pub currently_failed: i64,
    pub total_failed: i64,
    pub watched_files: Vec<WatchedFile>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionsStatus {
    pub currently_banned: i64,
    pub total_banned: i64,
    pub banned_addresses: Vec<String>,
}

/// A log file the jail's filter reads, and whether it exists right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchedFile {
    pub path: String,
    pub exists: bool,
}

impl WatchedFile {
    fn probe(path: String) -> Self {
        let exists = Path::new(&path).exists();
        Self { path, exists }
    }
}

impl StatusParser {
    /// Extract filter and action counters from a `status <jail>` reply.
    ///
    /// Watched files are checked against the local filesystem at parse time.
    /// Never fails: absent or malformed fields come back as 0 / empty.
    pub fn parse_unit_status(&self, reply: &RawReply) -> UnitStatus {
        match Source::of(reply) {
            Source::Fields(fields) => self.unit_from_fields(&fields),
            Source::Text(text) => self.unit_from_text(&text),
        }
    }

    fn unit_from_fields(&self, fields: &Mapping) -> UnitStatus {
        let empty = Mapping::new();
        let section = |labels: &[String]| {
            fields
                .get_any(labels)
                .and_then(RawReply::as_mapping)
                .unwrap_or(&empty)
        };
        let filter = section(&self.aliases.filter);
        let actions = section(&self.aliases.actions);
        let a = &self.aliases;

        UnitStatus {
            filter: FilterStatus {
                currently_failed: read_counter(filter.get_any(&a.currently_failed)),
                total_failed: read_counter(filter.get_any(&a.total_failed)),
                watched_files: read_list(filter.get_any(&a.file_list), split_list)
                    .into_iter()
                    .map(WatchedFile::probe)
                    .collect(),
            },
            actions: ActionsStatus {
                currently_banned: read_counter(actions.get_any(&a.currently_banned)),
                total_banned: read_counter(actions.get_any(&a.total_banned)),
                banned_addresses: read_list(actions.get_any(&a.banned_list), split_whitespace),
            },
        }
    }

    fn unit_from_text(&self, text: &str) -> UnitStatus {
        let t = &self.text;
        UnitStatus {
            filter: FilterStatus {
                currently_failed: text_counter(&t.currently_failed, text),
                total_failed: text_counter(&t.total_failed, text),
                watched_files: first_capture(&t.file_list, text)
                    .map(split_list)
                    .unwrap_or_default()
                    .into_iter()
                    .map(WatchedFile::probe)
                    .collect(),
            },
            actions: ActionsStatus {
                currently_banned: text_counter(&t.currently_banned, text),
                total_banned: text_counter(&t.total_banned, text),
                banned_addresses: first_capture(&t.banned_list, text)
                    .map(split_whitespace)
                    .unwrap_or_default(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::parse_unit_status;
    use banbridge_config::KeyAliases;
    use pretty_assertions::assert_eq;

    const MISSING_LOG: &str = "/nonexistent/banbridge/auth.log";

    #[test]
    fn test_partial_structured_reply() {
        let reply = RawReply::map([
            ("Filter", RawReply::map([("Currently failed", RawReply::str("3"))])),
            (
                "Actions",
                RawReply::map([(
                    "Banned IP list",
                    RawReply::seq([RawReply::str("1.2.3.4"), RawReply::str("5.6.7.8")]),
                )]),
            ),
        ]);
        let status = parse_unit_status(&reply);
        assert_eq!(
            status,
            UnitStatus {
                filter: FilterStatus {
                    currently_failed: 3,
                    ..Default::default()
                },
                actions: ActionsStatus {
                    banned_addresses: vec!["1.2.3.4".to_string(), "5.6.7.8".to_string()],
                    ..Default::default()
                },
            }
        );
    }

    #[test]
    fn test_daemon_shaped_reply() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("auth.log");
        std::fs::write(&log, "").unwrap();
        let log = log.to_string_lossy().into_owned();

        let reply = RawReply::seq([
            RawReply::int(0),
            RawReply::seq([
                RawReply::pair(
                    "Filter",
                    RawReply::seq([
                        RawReply::pair("Currently failed", RawReply::int(2)),
                        RawReply::pair("Total failed", RawReply::int(10)),
                        RawReply::pair(
                            "File list",
                            RawReply::seq([RawReply::str(log.as_str()), RawReply::str(MISSING_LOG)]),
                        ),
                    ]),
                ),
                RawReply::pair(
                    "Actions",
                    RawReply::seq([
                        RawReply::pair("Currently banned", RawReply::int(1)),
                        RawReply::pair("Total banned", RawReply::int(4)),
                        RawReply::pair("Banned IP list", RawReply::seq([RawReply::str("10.0.0.1")])),
                    ]),
                ),
            ]),
        ]);

        let status = parse_unit_status(&reply);
        assert_eq!(status.filter.currently_failed, 2);
        assert_eq!(status.filter.total_failed, 10);
        assert_eq!(
            status.filter.watched_files,
            vec![
                WatchedFile { path: log, exists: true },
                WatchedFile { path: MISSING_LOG.to_string(), exists: false },
            ]
        );
        assert_eq!(status.actions.currently_banned, 1);
        assert_eq!(status.actions.total_banned, 4);
        assert_eq!(status.actions.banned_addresses, vec!["10.0.0.1"]);
    }

    #[test]
    fn test_lowercase_labels_are_accepted() {
        let reply = RawReply::map([
            ("filter", RawReply::map([("total failed", RawReply::int(6))])),
            ("actions", RawReply::map([("banned IP list", RawReply::str("1.1.1.1  2.2.2.2"))])),
        ]);
        let status = parse_unit_status(&reply);
        assert_eq!(status.filter.total_failed, 6);
        assert_eq!(status.actions.banned_addresses, vec!["1.1.1.1", "2.2.2.2"]);
    }

    #[test]
    fn test_client_output_text() {
        let text = format!(
            "Status for the jail: sshd\n\
             |- Filter\n\
             |  |- Currently failed:\t2\n\
             |  |- Total failed:\t10\n\
             |  `- File list:\t{MISSING_LOG}, /also/missing.log\n\
             `- Actions\n   \
                |- Currently banned:\t2\n   \
                |- Total banned:\t3\n   \
                `- Banned IP list:\t1.2.3.4 5.6.7.8\n"
        );
        let status = parse_unit_status(&RawReply::Text(text));

        assert_eq!(status.filter.currently_failed, 2);
        assert_eq!(status.filter.total_failed, 10);
        let paths: Vec<_> = status.filter.watched_files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec![MISSING_LOG, "/also/missing.log"]);
        assert!(status.filter.watched_files.iter().all(|f| !f.exists));
        assert_eq!(status.actions.currently_banned, 2);
        assert_eq!(status.actions.total_banned, 3);
        assert_eq!(status.actions.banned_addresses, vec!["1.2.3.4", "5.6.7.8"]);
    }

    #[test]
    fn test_first_match_wins_in_text() {
        let text = "Currently failed: 1\nCurrently failed: 8\nBanned IP list: 9.9.9.9\nBanned IP list: 8.8.8.8\n";
        let status = parse_unit_status(&RawReply::Text(text.into()));
        assert_eq!(status.filter.currently_failed, 1);
        assert_eq!(status.actions.banned_addresses, vec!["9.9.9.9"]);
    }

    #[test]
    fn test_missing_sections_yield_defaults() {
        let reply = RawReply::map([("Filter", RawReply::str("not a section"))]);
        assert_eq!(parse_unit_status(&reply), UnitStatus::default());
        assert_eq!(parse_unit_status(&RawReply::none()), UnitStatus::default());
    }

    #[test]
    fn test_custom_aliases() {
        let aliases = KeyAliases {
            currently_failed: vec!["Failed now".to_string()],
            ..KeyAliases::default()
        };
        let parser = StatusParser::new(&aliases).unwrap();
        let reply = RawReply::map([("Filter", RawReply::map([("Failed now", RawReply::int(4))]))]);
        assert_eq!(parser.parse_unit_status(&reply).filter.currently_failed, 4);

        let text = RawReply::Text("Failed now: 5\nCurrently failed: 6\n".into());
        assert_eq!(parser.parse_unit_status(&text).filter.currently_failed, 5);
    }

    #[test]
    fn test_serializes_camel_case() {
        let status = UnitStatus {
            filter: FilterStatus {
                currently_failed: 1,
                total_failed: 2,
                watched_files: vec![WatchedFile { path: "/x".into(), exists: false }],
            },
            actions: ActionsStatus {
                currently_banned: 3,
                total_banned: 4,
                banned_addresses: vec!["1.2.3.4".into()],
            },
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "filter": {
                    "currentlyFailed": 1,
                    "totalFailed": 2,
                    "watchedFiles": [{"path": "/x", "exists": false}]
                },
                "actions": {
                    "currentlyBanned": 3,
                    "totalBanned": 4,
                    "bannedAddresses": ["1.2.3.4"]
                }
            })
        );
    }
}
