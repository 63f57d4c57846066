use serde::{Deserialize, Serialize};

use super::{last_capture, parse_digits, read_counter, read_list, split_list, Source, StatusParser};
use crate::reply::RawReply;

/// Parsed reply to a bare `status` command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalStatus {
    pub jail_count: i64,
    pub jail_names: Vec<String>,
}

impl StatusParser {
    /// Extract the jail count and jail names from a `status` reply.
    ///
    /// Never fails: absent or malformed fields come back as 0 / empty. In
    /// text, the last line carrying a label wins.
    pub fn parse_global_status(&self, reply: &RawReply) -> GlobalStatus {
        match Source::of(reply) {
            Source::Fields(fields) => GlobalStatus {
                jail_count: read_counter(fields.get_any(&self.aliases.jail_count)),
                jail_names: read_list(fields.get_any(&self.aliases.jail_list), split_list),
            },
            Source::Text(text) => GlobalStatus {
                jail_count: parse_digits(last_capture(&self.text.jail_count, &text)),
                jail_names: last_capture(&self.text.jail_list, &text)
                    .map(split_list)
                    .unwrap_or_default(),
            },
        }
    }
}
