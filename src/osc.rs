//! OSC message codec
//!
//! Encodes and decodes the OSC 1.0 subset spoken by TotalMix FX:
//! a NUL-padded address, a `,`-prefixed type tag string, then the
//! arguments (`f` float32, `i` int32, `s` string), all big-endian and
//! aligned to 4 bytes.
//!
//! ```text
//!  "/1/mainDim"       ",f"            1.0
//!  2F 31 2F 6D ...    2C 66 00 00     3F 80 00 00
//!  └─ address ──────┘ └─ type tags ─┘ └─ argument ─┘
//! ```

pub mod bundle;

use bytes::BufMut;
use std::fmt;

use crate::error::CodecError;

pub use bundle::{OscBundle, OscPacket};

/// A single typed OSC argument
#[derive(Debug, Clone, PartialEq)]
pub enum OscArg {
    /// 32-bit IEEE-754 float (tag `f`)
    Float(f32),
    /// 32-bit two's complement integer (tag `i`)
    Int(i32),
    /// NUL-terminated string (tag `s`)
    Str(String),
}

impl OscArg {
    /// Type tag character for this argument
    pub fn tag(&self) -> char {
        match self {
            OscArg::Float(_) => 'f',
            OscArg::Int(_) => 'i',
            OscArg::Str(_) => 's',
        }
    }

    /// Numeric value of the argument, if it has one
    pub fn as_f32(&self) -> Option<f32> {
        match *self {
            OscArg::Float(v) => Some(v),
            OscArg::Int(v) => Some(v as f32),
            OscArg::Str(_) => None,
        }
    }
}

impl From<f32> for OscArg {
    fn from(v: f32) -> Self {
        OscArg::Float(v)
    }
}

impl From<i32> for OscArg {
    fn from(v: i32) -> Self {
        OscArg::Int(v)
    }
}

impl From<&str> for OscArg {
    fn from(v: &str) -> Self {
        OscArg::Str(v.to_string())
    }
}

impl fmt::Display for OscArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OscArg::Float(v) => write!(f, "f:{}", v),
            OscArg::Int(v) => write!(f, "i:{}", v),
            OscArg::Str(v) => write!(f, "s:{:?}", v),
        }
    }
}

/// One control message: an address plus its ordered arguments
#[derive(Debug, Clone, PartialEq)]
pub struct OscMessage {
    address: String,
    args: Vec<OscArg>,
}

impl OscMessage {
    pub fn new(address: impl Into<String>, args: Vec<OscArg>) -> Self {
        Self {
            address: address.into(),
            args,
        }
    }

    /// Message carrying a single float, the shape of every TotalMix command
    pub fn float(address: impl Into<String>, value: f32) -> Self {
        Self::new(address, vec![OscArg::Float(value)])
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn args(&self) -> &[OscArg] {
        &self.args
    }

    /// Serialize to wire bytes
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len_hint());
        put_padded_str(&mut buf, &self.address);

        let mut tags = String::with_capacity(self.args.len() + 1);
        tags.push(',');
        tags.extend(self.args.iter().map(OscArg::tag));
        put_padded_str(&mut buf, &tags);

        for arg in &self.args {
            match arg {
                OscArg::Float(v) => buf.put_f32(*v),
                OscArg::Int(v) => buf.put_i32(*v),
                OscArg::Str(s) => put_padded_str(&mut buf, s),
            }
        }
        buf
    }

    /// Parse a message from wire bytes
    ///
    /// The whole buffer must be consumed; nothing is returned on failure.
    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        let mut reader = Reader::new(data);
        let address = reader.read_str()?;

        if reader.is_empty() {
            return Err(CodecError::MissingTypeTags);
        }
        let tags = reader.read_str()?;
        let tag_chars = tags
            .strip_prefix(',')
            .ok_or_else(|| CodecError::BadTypeTags(tags.clone()))?;

        let mut args = Vec::with_capacity(tag_chars.len());
        for tag in tag_chars.chars() {
            let arg = match tag {
                'f' => OscArg::Float(f32::from_be_bytes(reader.read_word()?)),
                'i' => OscArg::Int(i32::from_be_bytes(reader.read_word()?)),
                's' => OscArg::Str(reader.read_str()?),
                other => return Err(CodecError::UnsupportedTag(other)),
            };
            args.push(arg);
        }

        if !reader.is_empty() {
            return Err(CodecError::TrailingBytes(reader.remaining()));
        }

        Ok(Self { address, args })
    }

    fn encoded_len_hint(&self) -> usize {
        padded_len(self.address.len()) + padded_len(self.args.len() + 1) + self.args.len() * 4
    }
}

impl fmt::Display for OscMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Length of a string plus its NUL terminator, rounded up to 4 bytes
fn padded_len(len: usize) -> usize {
    (len + 4) & !3
}

fn put_padded_str(buf: &mut Vec<u8>, s: &str) {
    buf.put_slice(s.as_bytes());
    let pad = padded_len(s.len()) - s.len();
    buf.put_bytes(0, pad);
}

/// Bounds-checked cursor over a datagram
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn read_word(&mut self) -> Result<[u8; 4], CodecError> {
        let end = self.pos + 4;
        let word = self
            .data
            .get(self.pos..end)
            .ok_or(CodecError::Truncated {
                offset: self.pos,
                needed: 4,
                available: self.remaining(),
            })?;
        let mut out = [0u8; 4];
        out.copy_from_slice(word);
        self.pos = end;
        Ok(out)
    }

    fn read_str(&mut self) -> Result<String, CodecError> {
        let start = self.pos;
        let rest = &self.data[start..];
        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(CodecError::Unterminated(start))?;

        let padded_end = start + padded_len(nul);
        let padding = self
            .data
            .get(start + nul..padded_end)
            .ok_or(CodecError::BadPadding(start))?;
        if padding.iter().any(|&b| b != 0) {
            return Err(CodecError::BadPadding(start));
        }

        let s = std::str::from_utf8(&rest[..nul])
            .map_err(|_| CodecError::InvalidUtf8)?
            .to_string();
        self.pos = padded_end;
        Ok(s)
    }
}

/// Format bytes as hex string for debugging
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
