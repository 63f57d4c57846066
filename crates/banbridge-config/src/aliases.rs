//! Reply key aliases.
//!
//! fail2ban has renamed and re-cased the labels in its status replies across
//! releases ("Currently failed" vs "currently failed"). Each logical field the
//! status parsers read has an ordered list of accepted labels; the first one
//! present in a reply wins. Keeping the table here lets a deployment follow a
//! daemon upgrade with a config change instead of a rebuild.

use serde::{Deserialize, Serialize};

/// Ordered label aliases for every field the status parsers extract.
///
/// ## TOML Example
///
/// ```toml
/// [aliases]
/// currently_failed = ["Currently failed", "currently failed", "Failed now"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyAliases {
    /// Number of configured jails (global status).
    #[serde(default = "default_jail_count")]
    pub jail_count: Vec<String>,

    /// Jail name list (global status).
    #[serde(default = "default_jail_list")]
    pub jail_list: Vec<String>,

    /// Filter section of a jail status.
    #[serde(default = "default_filter")]
    pub filter: Vec<String>,

    /// Actions section of a jail status.
    #[serde(default = "default_actions")]
    pub actions: Vec<String>,

    #[serde(default = "default_currently_failed")]
    pub currently_failed: Vec<String>,

    #[serde(default = "default_total_failed")]
    pub total_failed: Vec<String>,

    /// Monitored log files.
    #[serde(default = "default_file_list")]
    pub file_list: Vec<String>,

    #[serde(default = "default_currently_banned")]
    pub currently_banned: Vec<String>,

    #[serde(default = "default_total_banned")]
    pub total_banned: Vec<String>,

    /// Banned address list.
    #[serde(default = "default_banned_list")]
    pub banned_list: Vec<String>,
}

impl Default for KeyAliases {
    fn default() -> Self {
        Self {
            jail_count: default_jail_count(),
            jail_list: default_jail_list(),
            filter: default_filter(),
            actions: default_actions(),
            currently_failed: default_currently_failed(),
            total_failed: default_total_failed(),
            file_list: default_file_list(),
            currently_banned: default_currently_banned(),
            total_banned: default_total_banned(),
            banned_list: default_banned_list(),
        }
    }
}

impl KeyAliases {
    /// Every alias list paired with its TOML field name, in declaration order.
    pub fn fields(&self) -> [(&'static str, &[String]); 10] {
        [
            ("jail_count", self.jail_count.as_slice()),
            ("jail_list", self.jail_list.as_slice()),
            ("filter", self.filter.as_slice()),
            ("actions", self.actions.as_slice()),
            ("currently_failed", self.currently_failed.as_slice()),
            ("total_failed", self.total_failed.as_slice()),
            ("file_list", self.file_list.as_slice()),
            ("currently_banned", self.currently_banned.as_slice()),
            ("total_banned", self.total_banned.as_slice()),
            ("banned_list", self.banned_list.as_slice()),
        ]
    }
}

fn labels(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn default_jail_count() -> Vec<String> {
    labels(&["Number of jail"])
}

fn default_jail_list() -> Vec<String> {
    labels(&["Jail list"])
}

fn default_filter() -> Vec<String> {
    labels(&["Filter", "filter"])
}

fn default_actions() -> Vec<String> {
    labels(&["Actions", "actions"])
}

fn default_currently_failed() -> Vec<String> {
    labels(&["Currently failed", "currently failed"])
}

fn default_total_failed() -> Vec<String> {
    labels(&["Total failed", "total failed"])
}

fn default_file_list() -> Vec<String> {
    labels(&["File list", "file list"])
}

fn default_currently_banned() -> Vec<String> {
    labels(&["Currently banned", "currently banned"])
}

fn default_total_banned() -> Vec<String> {
    labels(&["Total banned", "total banned"])
}

fn default_banned_list() -> Vec<String> {
    labels(&["Banned IP list", "banned IP list"])
}
