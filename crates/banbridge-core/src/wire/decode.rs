//! Pickle decoder for daemon replies.
//!
//! fail2ban answers with `pickle.dumps(reply, HIGHEST_PROTOCOL)`, so depending
//! on the Python running the daemon a reply can use anything from protocol 2
//! to protocol 5. The decoder is a small stack machine over the opcode
//! stream. It never executes anything: class references are kept as names,
//! and the few builtin constructors fail2ban replies contain (`set`,
//! `frozenset`, protocol 0 `bytes`) are rebuilt structurally. Any other
//! reconstructed object becomes its diagnostic text, e.g.
//! `UnknownJailException('nope')`.
//!
//! Containers live in an arena and the stack holds indices into it, so memo
//! references to a list that is filled in later see the final contents.

use std::cell::Cell;
use std::collections::HashMap;

use crate::bridge::Command;
use crate::reply::{Mapping, RawReply, Scalar};

use super::opcode::*;

/// Nesting depth beyond which a reply is rejected. Also bounds cycles built
/// through the memo.
const MAX_DEPTH: usize = 128;

/// Values built while turning the object graph into a tree. Memo references
/// let a short stream share one container many times over.
const MAX_VALUES: usize = 1 << 20;

/// Errors from decoding a pickle stream.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("pickle data was truncated")]
    Truncated,

    #[error("unknown opcode 0x{0:02x}")]
    UnknownOpcode(u8),

    #[error("unsupported opcode {0}")]
    Unsupported(&'static str),

    #[error("unsupported pickle protocol {0}")]
    Protocol(u8),

    #[error("stack underflow")]
    StackUnderflow,

    #[error("no mark on the stack")]
    MarkNotFound,

    #[error("invalid {0} literal")]
    InvalidLiteral(&'static str),

    #[error("memo key {0} not found")]
    MemoMissing(u64),

    #[error("{0} applied to the wrong kind of object")]
    WrongType(&'static str),

    #[error("reply nesting is too deep")]
    TooDeep,

    #[error("reply expands to too many values")]
    TooLarge,

    #[error("payload is not a list of strings")]
    NotACommand,
}

/// Decode one pickled value. Bytes after the STOP opcode are ignored, as
/// CPython's `pickle.loads` does.
pub fn decode(data: &[u8]) -> Result<RawReply, DecodeError> {
    Machine::new(data).run()
}

/// Decode a request payload back into the command vector it carries.
pub fn decode_command(data: &[u8]) -> Result<Command, DecodeError> {
    let RawReply::Sequence(items) = decode(data)? else {
        return Err(DecodeError::NotACommand);
    };
    let tokens = items
        .into_iter()
        .map(|item| match item {
            RawReply::Scalar(Scalar::Str(s)) => Ok(s),
            _ => Err(DecodeError::NotACommand),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Command::new(tokens).map_err(|_| DecodeError::NotACommand)
}

#[derive(Debug, Clone)]
enum Obj {
    Scalar(Scalar),
    /// Index into the container arena.
    Node(usize),
    /// A class or function reference from GLOBAL / STACK_GLOBAL.
    Global { module: String, name: String },
}

#[derive(Debug)]
enum Node {
    Seq(Vec<Obj>),
    Map(Vec<(Obj, Obj)>),
}

struct Machine<'a> {
    data: &'a [u8],
    pos: usize,
    stack: Vec<Obj>,
    /// Stacks saved by MARK, innermost last.
    marks: Vec<Vec<Obj>>,
    memo: HashMap<u64, Obj>,
    arena: Vec<Node>,
    built: Cell<usize>,
}

impl<'a> Machine<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            stack: Vec::new(),
            marks: Vec::new(),
            memo: HashMap::new(),
            arena: Vec::new(),
            built: Cell::new(0),
        }
    }

    fn run(mut self) -> Result<RawReply, DecodeError> {
        loop {
            let op = self.byte()?;
            match op {
                STOP => {
                    let top = self.pop()?;
                    return self.materialize(&top, 0);
                }

                // ── Framing ────────────────────────────────────────────
                PROTO => {
                    let version = self.byte()?;
                    if version > HIGHEST_PROTOCOL {
                        return Err(DecodeError::Protocol(version));
                    }
                }
                FRAME => {
                    self.take(8)?;
                }

                // ── Stack manipulation ─────────────────────────────────
                MARK => {
                    let saved = std::mem::take(&mut self.stack);
                    self.marks.push(saved);
                }
                POP => {
                    if self.stack.pop().is_none() {
                        self.pop_mark()?;
                    }
                }
                POP_MARK => {
                    self.pop_mark()?;
                }
                DUP => {
                    let top = self.stack.last().cloned().ok_or(DecodeError::StackUnderflow)?;
                    self.stack.push(top);
                }

                // ── Scalars ────────────────────────────────────────────
                NONE => self.push_scalar(Scalar::None),
                NEWTRUE => self.push_scalar(Scalar::Bool(true)),
                NEWFALSE => self.push_scalar(Scalar::Bool(false)),
                INT => {
                    let line = self.line_str("INT")?;
                    let scalar = match line.trim() {
                        "00" => Scalar::Bool(false),
                        "01" => Scalar::Bool(true),
                        digits => Scalar::Int(parse_int(digits, "INT")?),
                    };
                    self.push_scalar(scalar);
                }
                LONG => {
                    let line = self.line_str("LONG")?;
                    let digits = line.trim().trim_end_matches('L');
                    self.push_scalar(Scalar::Int(parse_int(digits, "LONG")?));
                }
                BININT => {
                    let b = self.array::<4>()?;
                    self.push_scalar(Scalar::Int(i64::from(i32::from_le_bytes(b))));
                }
                BININT1 => {
                    let b = self.byte()?;
                    self.push_scalar(Scalar::Int(i64::from(b)));
                }
                BININT2 => {
                    let b = self.array::<2>()?;
                    self.push_scalar(Scalar::Int(i64::from(u16::from_le_bytes(b))));
                }
                LONG1 => {
                    let n = usize::from(self.byte()?);
                    let bytes = self.take(n)?;
                    self.push_scalar(Scalar::Int(le_signed(bytes)?));
                }
                LONG4 => {
                    let n = self.len_i32()?;
                    let bytes = self.take(n)?;
                    self.push_scalar(Scalar::Int(le_signed(bytes)?));
                }
                FLOAT => {
                    let line = self.line_str("FLOAT")?;
                    let value = line
                        .trim()
                        .parse::<f64>()
                        .map_err(|_| DecodeError::InvalidLiteral("FLOAT"))?;
                    self.push_scalar(Scalar::Float(value));
                }
                BINFLOAT => {
                    let b = self.array::<8>()?;
                    self.push_scalar(Scalar::Float(f64::from_be_bytes(b)));
                }

                // ── Strings and bytes ──────────────────────────────────
                STRING => {
                    let line = self.line()?;
                    let bytes = unquote_string(line)?;
                    self.push_scalar(Scalar::Str(String::from_utf8_lossy(&bytes).into_owned()));
                }
                BINSTRING => {
                    let n = self.len_i32()?;
                    self.push_str(n)?;
                }
                SHORT_BINSTRING => {
                    let n = usize::from(self.byte()?);
                    self.push_str(n)?;
                }
                UNICODE => {
                    let line = self.line()?;
                    let s = raw_unicode_unescape(line)?;
                    self.push_scalar(Scalar::Str(s));
                }
                BINUNICODE => {
                    let n = self.len_u32()?;
                    self.push_str(n)?;
                }
                SHORT_BINUNICODE => {
                    let n = usize::from(self.byte()?);
                    self.push_str(n)?;
                }
                BINUNICODE8 => {
                    let n = self.len_u64()?;
                    self.push_str(n)?;
                }
                BINBYTES => {
                    let n = self.len_u32()?;
                    self.push_bytes(n)?;
                }
                SHORT_BINBYTES => {
                    let n = usize::from(self.byte()?);
                    self.push_bytes(n)?;
                }
                BINBYTES8 | BYTEARRAY8 => {
                    let n = self.len_u64()?;
                    self.push_bytes(n)?;
                }

                // ── Containers ─────────────────────────────────────────
                EMPTY_LIST | EMPTY_TUPLE | EMPTY_SET => {
                    let node = self.alloc(Node::Seq(Vec::new()));
                    self.stack.push(node);
                }
                EMPTY_DICT => {
                    let node = self.alloc(Node::Map(Vec::new()));
                    self.stack.push(node);
                }
                LIST | TUPLE | FROZENSET => {
                    let items = self.pop_mark()?;
                    let node = self.alloc(Node::Seq(items));
                    self.stack.push(node);
                }
                TUPLE1 | TUPLE2 | TUPLE3 => {
                    let n = usize::from(op - TUPLE1 + 1);
                    if self.stack.len() < n {
                        return Err(DecodeError::StackUnderflow);
                    }
                    let items = self.stack.split_off(self.stack.len() - n);
                    let node = self.alloc(Node::Seq(items));
                    self.stack.push(node);
                }
                DICT => {
                    let items = self.pop_mark()?;
                    let pairs = into_pairs(items, "DICT")?;
                    let node = self.alloc(Node::Map(pairs));
                    self.stack.push(node);
                }
                APPEND => {
                    let value = self.pop()?;
                    self.top_seq("APPEND")?.push(value);
                }
                APPENDS | ADDITEMS => {
                    let items = self.pop_mark()?;
                    self.top_seq("APPENDS")?.extend(items);
                }
                SETITEM => {
                    let value = self.pop()?;
                    let key = self.pop()?;
                    self.top_map("SETITEM")?.push((key, value));
                }
                SETITEMS => {
                    let items = self.pop_mark()?;
                    let pairs = into_pairs(items, "SETITEMS")?;
                    self.top_map("SETITEMS")?.extend(pairs);
                }

                // ── Memo ───────────────────────────────────────────────
                PUT => {
                    let key = self.line_index("PUT")?;
                    self.memo_put(key)?;
                }
                BINPUT => {
                    let key = u64::from(self.byte()?);
                    self.memo_put(key)?;
                }
                LONG_BINPUT => {
                    let key = u64::from(u32::from_le_bytes(self.array::<4>()?));
                    self.memo_put(key)?;
                }
                MEMOIZE => {
                    let key = self.memo.len() as u64;
                    self.memo_put(key)?;
                }
                GET => {
                    let key = self.line_index("GET")?;
                    self.memo_get(key)?;
                }
                BINGET => {
                    let key = u64::from(self.byte()?);
                    self.memo_get(key)?;
                }
                LONG_BINGET => {
                    let key = u64::from(u32::from_le_bytes(self.array::<4>()?));
                    self.memo_get(key)?;
                }

                // ── Object reconstruction ──────────────────────────────
                GLOBAL => {
                    let module = self.line_str("GLOBAL")?.to_string();
                    let name = self.line_str("GLOBAL")?.to_string();
                    self.stack.push(Obj::Global { module, name });
                }
                STACK_GLOBAL => {
                    let name = self.pop()?;
                    let module = self.pop()?;
                    match (module, name) {
                        (Obj::Scalar(Scalar::Str(module)), Obj::Scalar(Scalar::Str(name))) => {
                            self.stack.push(Obj::Global { module, name });
                        }
                        _ => return Err(DecodeError::WrongType("STACK_GLOBAL")),
                    }
                }
                REDUCE | NEWOBJ => {
                    let args = self.pop()?;
                    let callable = self.pop()?;
                    let obj = self.construct(callable, args)?;
                    self.stack.push(obj);
                }
                BUILD => {
                    // Instance state is not needed to describe the object.
                    self.pop()?;
                }

                PERSID | BINPERSID => return Err(DecodeError::Unsupported("PERSID")),
                INST | OBJ => return Err(DecodeError::Unsupported("INST")),
                NEWOBJ_EX => return Err(DecodeError::Unsupported("NEWOBJ_EX")),
                EXT1 | EXT2 | EXT4 => return Err(DecodeError::Unsupported("EXT")),
                NEXT_BUFFER | READONLY_BUFFER => {
                    return Err(DecodeError::Unsupported("out-of-band buffer"));
                }
                other => return Err(DecodeError::UnknownOpcode(other)),
            }
        }
    }

    // ── Input ──────────────────────────────────────────────────────────

    fn byte(&mut self) -> Result<u8, DecodeError> {
        let b = *self.data.get(self.pos).ok_or(DecodeError::Truncated)?;
        self.pos += 1;
        Ok(b)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let end = self.pos.checked_add(n).ok_or(DecodeError::Truncated)?;
        let slice = self.data.get(self.pos..end).ok_or(DecodeError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let slice = self.take(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    fn len_i32(&mut self) -> Result<usize, DecodeError> {
        let n = i32::from_le_bytes(self.array::<4>()?);
        usize::try_from(n).map_err(|_| DecodeError::InvalidLiteral("length"))
    }

    fn len_u32(&mut self) -> Result<usize, DecodeError> {
        let n = u32::from_le_bytes(self.array::<4>()?);
        usize::try_from(n).map_err(|_| DecodeError::Truncated)
    }

    fn len_u64(&mut self) -> Result<usize, DecodeError> {
        let n = u64::from_le_bytes(self.array::<8>()?);
        usize::try_from(n).map_err(|_| DecodeError::Truncated)
    }

    /// Bytes up to (not including) the next newline.
    fn line(&mut self) -> Result<&'a [u8], DecodeError> {
        let rest = self.data.get(self.pos..).ok_or(DecodeError::Truncated)?;
        let len = rest
            .iter()
            .position(|&b| b == b'\n')
            .ok_or(DecodeError::Truncated)?;
        self.pos += len + 1;
        Ok(&rest[..len])
    }

    fn line_str(&mut self, what: &'static str) -> Result<&'a str, DecodeError> {
        let line = self.line()?;
        std::str::from_utf8(line).map_err(|_| DecodeError::InvalidLiteral(what))
    }

    fn line_index(&mut self, what: &'static str) -> Result<u64, DecodeError> {
        self.line_str(what)?
            .trim()
            .parse()
            .map_err(|_| DecodeError::InvalidLiteral(what))
    }

    // ── Stack ──────────────────────────────────────────────────────────

    fn pop(&mut self) -> Result<Obj, DecodeError> {
        self.stack.pop().ok_or(DecodeError::StackUnderflow)
    }

    fn pop_mark(&mut self) -> Result<Vec<Obj>, DecodeError> {
        let saved = self.marks.pop().ok_or(DecodeError::MarkNotFound)?;
        Ok(std::mem::replace(&mut self.stack, saved))
    }

    fn push_scalar(&mut self, scalar: Scalar) {
        self.stack.push(Obj::Scalar(scalar));
    }

    fn push_str(&mut self, n: usize) -> Result<(), DecodeError> {
        let bytes = self.take(n)?;
        let s = String::from_utf8_lossy(bytes).into_owned();
        self.push_scalar(Scalar::Str(s));
        Ok(())
    }

    fn push_bytes(&mut self, n: usize) -> Result<(), DecodeError> {
        let bytes = self.take(n)?.to_vec();
        self.push_scalar(Scalar::Bytes(bytes));
        Ok(())
    }

    fn alloc(&mut self, node: Node) -> Obj {
        self.arena.push(node);
        Obj::Node(self.arena.len() - 1)
    }

    fn top_node(&mut self, what: &'static str) -> Result<&mut Node, DecodeError> {
        match self.stack.last() {
            Some(Obj::Node(idx)) => Ok(&mut self.arena[*idx]),
            Some(_) => Err(DecodeError::WrongType(what)),
            None => Err(DecodeError::StackUnderflow),
        }
    }

    fn top_seq(&mut self, what: &'static str) -> Result<&mut Vec<Obj>, DecodeError> {
        match self.top_node(what)? {
            Node::Seq(items) => Ok(items),
            Node::Map(_) => Err(DecodeError::WrongType(what)),
        }
    }

    fn top_map(&mut self, what: &'static str) -> Result<&mut Vec<(Obj, Obj)>, DecodeError> {
        match self.top_node(what)? {
            Node::Map(pairs) => Ok(pairs),
            Node::Seq(_) => Err(DecodeError::WrongType(what)),
        }
    }

    fn memo_put(&mut self, key: u64) -> Result<(), DecodeError> {
        let top = self.stack.last().cloned().ok_or(DecodeError::StackUnderflow)?;
        self.memo.insert(key, top);
        Ok(())
    }

    fn memo_get(&mut self, key: u64) -> Result<(), DecodeError> {
        let obj = self
            .memo
            .get(&key)
            .cloned()
            .ok_or(DecodeError::MemoMissing(key))?;
        self.stack.push(obj);
        Ok(())
    }

    // ── Reconstruction ─────────────────────────────────────────────────

    fn construct(&mut self, callable: Obj, args: Obj) -> Result<Obj, DecodeError> {
        let Obj::Global { module, name } = callable else {
            return Err(DecodeError::WrongType("REDUCE"));
        };
        let arg_items = match &args {
            Obj::Node(idx) => match &self.arena[*idx] {
                Node::Seq(items) => items.clone(),
                Node::Map(_) => return Err(DecodeError::WrongType("REDUCE")),
            },
            _ => return Err(DecodeError::WrongType("REDUCE")),
        };

        let builtin = matches!(module.as_str(), "builtins" | "__builtin__");
        match (builtin, name.as_str(), arg_items.as_slice()) {
            // Sets and frozensets below protocol 4: set([items]).
            (true, "set" | "frozenset" | "list" | "tuple", []) => {
                Ok(self.alloc(Node::Seq(Vec::new())))
            }
            (true, "set" | "frozenset" | "list" | "tuple", [Obj::Node(idx)]) => {
                let items = match &self.arena[*idx] {
                    Node::Seq(items) => items.clone(),
                    Node::Map(pairs) => pairs.iter().map(|(k, _)| k.clone()).collect(),
                };
                Ok(self.alloc(Node::Seq(items)))
            }
            (true, "bytes" | "bytearray", []) => Ok(Obj::Scalar(Scalar::Bytes(Vec::new()))),
            // Bytes below protocol 3: _codecs.encode(text, "latin1").
            (false, "encode", [Obj::Scalar(Scalar::Str(text)), Obj::Scalar(Scalar::Str(codec))])
                if module == "_codecs" && codec == "latin1" =>
            {
                let bytes = text.chars().map(|c| u32::from(c) as u8).collect();
                Ok(Obj::Scalar(Scalar::Bytes(bytes)))
            }
            _ => {
                let args = self.materialize(&args, 0)?;
                let rendered = args.to_string();
                let inner = rendered
                    .strip_prefix('[')
                    .and_then(|s| s.strip_suffix(']'))
                    .unwrap_or(&rendered);
                Ok(Obj::Scalar(Scalar::Str(format!("{name}({inner})"))))
            }
        }
    }

    fn materialize(&self, obj: &Obj, depth: usize) -> Result<RawReply, DecodeError> {
        if depth > MAX_DEPTH {
            return Err(DecodeError::TooDeep);
        }
        let built = self.built.get() + 1;
        if built > MAX_VALUES {
            return Err(DecodeError::TooLarge);
        }
        self.built.set(built);
        match obj {
            Obj::Scalar(scalar) => Ok(RawReply::Scalar(scalar.clone())),
            Obj::Global { module, name } => Ok(RawReply::str(format!("{module}.{name}"))),
            Obj::Node(idx) => match &self.arena[*idx] {
                Node::Seq(items) => items
                    .iter()
                    .map(|item| self.materialize(item, depth + 1))
                    .collect::<Result<Vec<_>, _>>()
                    .map(RawReply::Sequence),
                Node::Map(pairs) => {
                    let mut mapping = Mapping::new();
                    for (key, value) in pairs {
                        let key = self.materialize(key, depth + 1)?.to_string();
                        mapping.insert(key, self.materialize(value, depth + 1)?);
                    }
                    Ok(RawReply::Mapping(mapping))
                }
            },
        }
    }
}

fn into_pairs(items: Vec<Obj>, what: &'static str) -> Result<Vec<(Obj, Obj)>, DecodeError> {
    if items.len() % 2 != 0 {
        return Err(DecodeError::WrongType(what));
    }
    let mut pairs = Vec::with_capacity(items.len() / 2);
    let mut iter = items.into_iter();
    while let (Some(key), Some(value)) = (iter.next(), iter.next()) {
        pairs.push((key, value));
    }
    Ok(pairs)
}

fn parse_int(digits: &str, what: &'static str) -> Result<i64, DecodeError> {
    digits.parse().map_err(|_| DecodeError::InvalidLiteral(what))
}

/// Little-endian two's complement integer of up to eight bytes.
fn le_signed(bytes: &[u8]) -> Result<i64, DecodeError> {
    if bytes.is_empty() {
        return Ok(0);
    }
    if bytes.len() > 8 {
        return Err(DecodeError::Unsupported("integer wider than 64 bits"));
    }
    let negative = bytes[bytes.len() - 1] & 0x80 != 0;
    let mut buf = if negative { [0xff; 8] } else { [0; 8] };
    buf[..bytes.len()].copy_from_slice(bytes);
    Ok(i64::from_le_bytes(buf))
}

/// The quoted literal of a protocol 0 STRING opcode, with Python escapes.
fn unquote_string(line: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let quoted = match line {
        [b'\'', inner @ .., b'\''] | [b'"', inner @ .., b'"'] if line.len() >= 2 => inner,
        _ => return Err(DecodeError::InvalidLiteral("STRING")),
    };

    let mut out = Vec::with_capacity(quoted.len());
    let mut iter = quoted.iter().copied();
    while let Some(b) = iter.next() {
        if b != b'\\' {
            out.push(b);
            continue;
        }
        match iter.next() {
            Some(b'n') => out.push(b'\n'),
            Some(b'r') => out.push(b'\r'),
            Some(b't') => out.push(b'\t'),
            Some(b'0') => out.push(0),
            Some(b'x') => {
                let hi = iter.next().and_then(hex_value);
                let lo = iter.next().and_then(hex_value);
                match (hi, lo) {
                    (Some(hi), Some(lo)) => out.push(hi << 4 | lo),
                    _ => return Err(DecodeError::InvalidLiteral("STRING")),
                }
            }
            Some(other @ (b'\\' | b'\'' | b'"')) => out.push(other),
            Some(other) => {
                out.push(b'\\');
                out.push(other);
            }
            None => out.push(b'\\'),
        }
    }
    Ok(out)
}

fn hex_value(b: u8) -> Option<u8> {
    char::from(b).to_digit(16).and_then(|d| u8::try_from(d).ok())
}

/// CPython's `raw-unicode-escape` decoder: bytes are Latin-1 code points, and
/// `\uXXXX` / `\UXXXXXXXX` are escapes only after an odd run of backslashes.
fn raw_unicode_unescape(line: &[u8]) -> Result<String, DecodeError> {
    let mut out = String::with_capacity(line.len());
    let mut i = 0;
    while i < line.len() {
        let b = line[i];
        if b != b'\\' {
            out.push(char::from(b));
            i += 1;
            continue;
        }

        let run_start = i;
        while i < line.len() && line[i] == b'\\' {
            out.push('\\');
            i += 1;
        }
        let odd = (i - run_start) % 2 == 1;
        let width = match line.get(i) {
            Some(b'u') if odd => 4,
            Some(b'U') if odd => 8,
            _ => continue,
        };

        out.pop();
        let digits = line
            .get(i + 1..i + 1 + width)
            .ok_or(DecodeError::InvalidLiteral("UNICODE"))?;
        let code = std::str::from_utf8(digits)
            .ok()
            .and_then(|s| u32::from_str_radix(s, 16).ok())
            .and_then(char::from_u32)
            .ok_or(DecodeError::InvalidLiteral("UNICODE"))?;
        out.push(code);
        i += 1 + width;
    }
    Ok(out)
}
