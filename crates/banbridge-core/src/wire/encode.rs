//! Protocol 0 pickle encoder.
//!
//! fail2ban's own client sends `pickle.dumps(list(args), protocol=0)`, and the
//! server side of older releases expects exactly that. The encoder reproduces
//! CPython's protocol 0 output byte for byte for lists of strings, and also
//! handles the other reply shapes so a test daemon can answer in kind.

use std::io::Write;

use crate::bridge::Command;
use crate::reply::{RawReply, Scalar};

use super::opcode::*;

/// Encode a command vector as CPython would for `pickle.dumps(list(args), 0)`.
pub fn encode_command(command: &Command) -> Vec<u8> {
    let tokens = command.tokens().iter().map(|t| RawReply::str(t.as_str()));
    encode_reply(&RawReply::seq(tokens))
}

/// Encode a reply tree with protocol 0 opcodes.
///
/// Sequences become lists and mappings become dicts. Byte strings are written
/// as text (lossy), since protocol 0 has no bytes opcode.
pub fn encode_reply(reply: &RawReply) -> Vec<u8> {
    let mut encoder = Encoder::default();
    encoder.value(reply);
    encoder.finish()
}

#[derive(Default)]
struct Encoder {
    out: Vec<u8>,
    next_memo: u32,
}

impl Encoder {
    fn finish(mut self) -> Vec<u8> {
        self.out.push(STOP);
        self.out
    }

    /// Every container and string is memoized, as CPython does.
    fn put(&mut self) {
        // Writing into a Vec cannot fail.
        let _ = writeln!(self.out, "{}{}", PUT as char, self.next_memo);
        self.next_memo += 1;
    }

    fn value(&mut self, reply: &RawReply) {
        match reply {
            RawReply::Scalar(scalar) => self.scalar(scalar),
            RawReply::Text(text) => self.string(text),
            RawReply::Sequence(items) => {
                self.out.extend_from_slice(&[MARK, LIST]);
                self.put();
                for item in items {
                    self.value(item);
                    self.out.push(APPEND);
                }
            }
            RawReply::Mapping(mapping) => {
                self.out.extend_from_slice(&[MARK, DICT]);
                self.put();
                for (key, value) in mapping.iter() {
                    self.string(key);
                    self.value(value);
                    self.out.push(SETITEM);
                }
            }
        }
    }

    fn scalar(&mut self, scalar: &Scalar) {
        let _ = match scalar {
            Scalar::None => {
                self.out.push(NONE);
                Ok(())
            }
            Scalar::Bool(b) => writeln!(self.out, "I0{}", u8::from(*b)),
            Scalar::Int(i) if i32::try_from(*i).is_ok() => writeln!(self.out, "I{i}"),
            Scalar::Int(i) => writeln!(self.out, "L{i}L"),
            Scalar::Float(x) => writeln!(self.out, "F{x:?}"),
            Scalar::Str(s) => {
                self.string(s);
                Ok(())
            }
            Scalar::Bytes(b) => {
                self.string(&String::from_utf8_lossy(b));
                Ok(())
            }
        };
    }

    fn string(&mut self, s: &str) {
        self.out.push(UNICODE);
        raw_unicode_escape(s, &mut self.out);
        self.out.push(b'\n');
        self.put();
    }
}

/// CPython's `raw-unicode-escape` codec, after the protocol 0 pre-escaping of
/// backslash, NUL, CR, LF and ^Z (which would break the line-based opcode).
fn raw_unicode_escape(s: &str, out: &mut Vec<u8>) {
    for ch in s.chars() {
        let code = u32::from(ch);
        let _ = match ch {
            '\\' | '\0' | '\n' | '\r' | '\x1a' => write!(out, "\\u{code:04x}"),
            _ if code < 0x100 => {
                // Latin-1 range is written as the raw byte.
                out.push(code as u8);
                Ok(())
            }
            _ if code <= 0xffff => write!(out, "\\u{code:04x}"),
            _ => write!(out, "\\U{code:08x}"),
        };
    }
}
