#![deny(unsafe_code)]

//! banbridge core: a bridge to the fail2ban control socket.
//!
//! Sends command vectors to the daemon in its pickle framing, decodes the
//! replies into [`RawReply`] trees, and turns the common status replies into
//! typed results. The [`api`] module puts all of this behind an HTTP API.

/// HTTP API and static file server.
pub mod api;
/// Transport client and command type.
pub mod bridge;
/// Compile-time build metadata (version, git hash, profile).
pub mod build_info;
/// Pair-list to mapping normalization.
pub mod normalize;
/// Decoded reply tree.
pub mod reply;
/// Reply flattening and address extraction.
pub mod response;
/// Status reply parsers.
pub mod status;
/// Pickle codec and message framing.
pub mod wire;

pub use bridge::{BridgeClient, BridgeError, Command};
pub use normalize::normalize;
pub use reply::{Mapping, RawReply, Scalar};
pub use response::{collect_addresses, flatten, is_valid_ipv4};
pub use status::{
    parse_global_status, parse_unit_status, GlobalStatus, StatusParser, UnitStatus,
};
