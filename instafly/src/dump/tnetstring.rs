//! The tnetstring encoding used by mitmproxy flow files.
//!
//! Every value is `<length>:<payload><tag>` where the tag is one of
//!
//! | tag | value |
//! | --- | --- |
//! | `,` | bytes |
//! | `;` | utf-8 string |
//! | `#` | integer |
//! | `^` | float |
//! | `!` | `true` or `false` |
//! | `~` | null, with an empty payload |
//! | `}` | dict, alternating keys and values |
//! | `]` | list |
//!
//! A flow file is a plain concatenation of such values.

use std::collections::BTreeMap;

/// Longest length prefix accepted, in digits.
const MAX_LENGTH_DIGITS: usize = 12;

/// Deepest list/dict nesting accepted. Real flows nest a handful of levels.
pub const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Bytes(Vec<u8>),
    String(String),
    List(Vec<Value>),
    /// Keys are stored as text; byte keys are decoded lossily.
    Dict(BTreeMap<String, Value>),
}

impl Value {
    /// Looks up `key` if this is a dict.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Dict(d) => d.get(key),
            _ => None,
        }
    }

    /// The payload of a bytes or string value.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            Value::String(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    /// A bytes or string value as text, if it is valid utf-8.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            Value::Bytes(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// Why a dump could not be decoded. Offsets are in bytes from the start of the
/// input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DumpError {
    #[error("input ends inside a value starting at byte {0}")]
    Truncated(usize),

    #[error("invalid length prefix at byte {0}")]
    InvalidLength(usize),

    #[error("unknown type tag {tag:?} at byte {offset}")]
    UnknownTag { tag: char, offset: usize },

    #[error("invalid {kind} payload at byte {offset}")]
    InvalidPayload { kind: &'static str, offset: usize },

    #[error("value at byte {0} is nested more than {MAX_DEPTH} levels deep")]
    TooDeep(usize),
}

struct Parser<'a> {
    data: &'a [u8],
    pos: usize,
    /// Number of lists/dicts enclosing `data`.
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            depth: 0,
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Reads one frame and returns where it and its payload start, the payload
    /// and the tag.
    fn frame(&mut self) -> Result<(usize, usize, &'a [u8], u8), DumpError> {
        let start = self.pos;
        let rest = &self.data[start..];
        let colon = rest
            .iter()
            .take(MAX_LENGTH_DIGITS + 1)
            .position(|&b| b == b':')
            .ok_or(if rest.len() <= MAX_LENGTH_DIGITS {
                DumpError::Truncated(start)
            } else {
                DumpError::InvalidLength(start)
            })?;
        let digits = &rest[..colon];
        if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
            return Err(DumpError::InvalidLength(start));
        }
        let len: usize = std::str::from_utf8(digits)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(DumpError::InvalidLength(start))?;

        let payload_start = colon + 1;
        let tag_pos = payload_start
            .checked_add(len)
            .ok_or(DumpError::InvalidLength(start))?;
        if tag_pos >= rest.len() {
            return Err(DumpError::Truncated(start));
        }
        self.pos = start + tag_pos + 1;
        Ok((
            start,
            start + payload_start,
            &rest[payload_start..tag_pos],
            rest[tag_pos],
        ))
    }

    fn value(&mut self) -> Result<Value, DumpError> {
        let (offset, payload_offset, payload, tag) = self.frame()?;
        let invalid = |kind| DumpError::InvalidPayload { kind, offset };
        let text = || std::str::from_utf8(payload).map_err(|_| invalid("text"));
        Ok(match tag {
            b',' => Value::Bytes(payload.to_vec()),
            b';' => Value::String(text()?.to_string()),
            b'#' => Value::Int(text()?.parse().map_err(|_| invalid("integer"))?),
            b'^' => Value::Float(text()?.parse().map_err(|_| invalid("float"))?),
            b'!' => match payload {
                b"true" => Value::Bool(true),
                b"false" => Value::Bool(false),
                _ => return Err(invalid("boolean")),
            },
            b'~' if payload.is_empty() => Value::Null,
            b'~' => return Err(invalid("null")),
            b']' | b'}' if self.depth >= MAX_DEPTH => return Err(DumpError::TooDeep(offset)),
            b']' => Value::List(self.nested(payload, payload_offset, |p| p.value())?),
            b'}' => {
                let pairs = self.nested(payload, payload_offset, |p| {
                    let key = p.value()?;
                    if p.at_end() {
                        return Err(DumpError::InvalidPayload {
                            kind: "dict",
                            offset: p.pos,
                        });
                    }
                    Ok((key, p.value()?))
                })?;
                let mut dict = BTreeMap::new();
                for (k, v) in pairs {
                    let key = match k {
                        Value::String(s) => s,
                        Value::Bytes(b) => String::from_utf8_lossy(&b).into_owned(),
                        _ => return Err(invalid("dict key")),
                    };
                    dict.insert(key, v);
                }
                Value::Dict(dict)
            }
            other => {
                return Err(DumpError::UnknownTag {
                    tag: other as char,
                    offset,
                })
            }
        })
    }

    /// Parses `payload` as a sequence of items, shifting error offsets so that
    /// they point into the outer input.
    fn nested<T>(
        &self,
        payload: &[u8],
        base: usize,
        mut item: impl FnMut(&mut Parser<'_>) -> Result<T, DumpError>,
    ) -> Result<Vec<T>, DumpError> {
        let mut p = Parser {
            data: payload,
            pos: 0,
            depth: self.depth + 1,
        };
        let mut items = Vec::new();
        while !p.at_end() {
            items.push(item(&mut p).map_err(|e| shift(e, base))?);
        }
        Ok(items)
    }
}

fn shift(e: DumpError, by: usize) -> DumpError {
    match e {
        DumpError::Truncated(o) => DumpError::Truncated(o + by),
        DumpError::InvalidLength(o) => DumpError::InvalidLength(o + by),
        DumpError::UnknownTag { tag, offset } => DumpError::UnknownTag {
            tag,
            offset: offset + by,
        },
        DumpError::InvalidPayload { kind, offset } => DumpError::InvalidPayload {
            kind,
            offset: offset + by,
        },
        DumpError::TooDeep(o) => DumpError::TooDeep(o + by),
    }
}

/// Parses one value from the front of `data` and returns it with the
/// remaining input.
pub fn parse(data: &[u8]) -> Result<(Value, &[u8]), DumpError> {
    let mut p = Parser::new(data);
    let v = p.value()?;
    Ok((v, &data[p.pos..]))
}

/// Parses a concatenation of values. Whitespace between values (some writers
/// add a trailing newline) is skipped.
pub fn parse_all(data: &[u8]) -> Result<Vec<Value>, DumpError> {
    let mut p = Parser::new(data);
    let mut values = Vec::new();
    loop {
        while p.data.get(p.pos).is_some_and(u8::is_ascii_whitespace) {
            p.pos += 1;
        }
        if p.at_end() {
            return Ok(values);
        }
        values.push(p.value()?);
    }
}

/// Encodes `v`, appending to `out`.
pub fn encode_into(v: &Value, out: &mut Vec<u8>) {
    let mut frame = |payload: &[u8], tag: u8| {
        out.extend_from_slice(payload.len().to_string().as_bytes());
        out.push(b':');
        out.extend_from_slice(payload);
        out.push(tag);
    };
    match v {
        Value::Null => frame(b"", b'~'),
        Value::Bool(b) => frame(if *b { b"true" } else { b"false" }, b'!'),
        Value::Int(i) => frame(i.to_string().as_bytes(), b'#'),
        Value::Float(f) => frame(format!("{f:?}").as_bytes(), b'^'),
        Value::Bytes(b) => frame(b, b','),
        Value::String(s) => frame(s.as_bytes(), b';'),
        Value::List(items) => {
            let mut payload = Vec::new();
            for item in items {
                encode_into(item, &mut payload);
            }
            frame(&payload, b']');
        }
        Value::Dict(d) => {
            let mut payload = Vec::new();
            for (k, v) in d {
                encode_into(&Value::String(k.clone()), &mut payload);
                encode_into(v, &mut payload);
            }
            frame(&payload, b'}');
        }
    }
}

pub fn encode(v: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    encode_into(v, &mut out);
    out
}
