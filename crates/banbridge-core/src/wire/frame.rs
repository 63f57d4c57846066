//! End-of-message framing.
//!
//! Both directions of the control socket terminate a message with the same
//! marker. The daemon may also close the stream without sending it.

/// Marker fail2ban appends to every pickled message.
pub const END_MARKER: &[u8] = b"<F2B_END_COMMAND>";

/// Append the end marker to an encoded payload.
pub fn frame(mut payload: Vec<u8>) -> Vec<u8> {
    payload.extend_from_slice(END_MARKER);
    payload
}

/// Whether `buf` contains the end marker, looking only at the region that
/// could have changed since `scanned` bytes were last checked.
pub fn has_marker(buf: &[u8], scanned: usize) -> bool {
    let start = scanned.saturating_sub(END_MARKER.len() - 1);
    buf.get(start..)
        .is_some_and(|tail| find(tail, END_MARKER).is_some())
}

/// Remove every occurrence of the end marker.
pub fn strip_markers(buf: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(buf.len());
    let mut rest = buf;
    while let Some(at) = find(rest, END_MARKER) {
        out.extend_from_slice(&rest[..at]);
        rest = &rest[at + END_MARKER.len()..];
    }
    out.extend_from_slice(rest);
    out
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_appends_marker() {
        assert_eq!(frame(b"N.".to_vec()), b"N.<F2B_END_COMMAND>".to_vec());
    }

    #[test]
    fn test_strip_removes_every_occurrence() {
        let buf = b"<F2B_END_COMMAND>abc<F2B_END_COMMAND>def<F2B_END_COMMAND>";
        assert_eq!(strip_markers(buf), b"abcdef".to_vec());
    }

    #[test]
    fn test_strip_keeps_partial_marker() {
        let buf = b"abc<F2B_END";
        assert_eq!(strip_markers(buf), buf.to_vec());
    }

    #[test]
    fn test_has_marker_across_chunk_boundary() {
        let buf = b"payload<F2B_END_COMMAND>";
        // The previous read ended in the middle of the marker.
        assert!(has_marker(buf, 12));
        assert!(has_marker(buf, 0));
        assert!(!has_marker(b"payload<F2B_END", 7));
    }
}
