//! Wire format of the fail2ban control socket.
//!
//! Requests are pickled with protocol 0 and replies with whatever protocol
//! the daemon's Python considers highest. Both are terminated by
//! [`END_MARKER`].

pub mod decode;
pub mod encode;
pub mod frame;
pub mod opcode;

pub use decode::{decode, decode_command, DecodeError};
pub use encode::{encode_command, encode_reply};
pub use frame::{frame, has_marker, strip_markers, END_MARKER};
