//! NDN names: ordered sequences of typed, opaque components.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::tlv;

/// TLV-TYPE of a GenericNameComponent.
pub const TT_GENERIC: u32 = 8;

/// TLV-TYPE of a ByteOffsetNameComponent.
pub const TT_BYTE_OFFSET: u32 = 34;

const BYTE_OFFSET_URI_PREFIX: &str = "off=";

/// One name component: TLV-TYPE plus raw value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Component {
    pub typ: u32,
    pub value: Vec<u8>,
}

impl Component {
    pub fn generic(value: impl Into<Vec<u8>>) -> Self {
        Self {
            typ: TT_GENERIC,
            value: value.into(),
        }
    }

    /// Byte-offset component; the value is the shortest NNI encoding of `offset`.
    pub fn byte_offset(offset: u64) -> Self {
        Self {
            typ: TT_BYTE_OFFSET,
            value: tlv::encode_nni(offset),
        }
    }

    pub fn is_generic(&self) -> bool {
        self.typ == TT_GENERIC
    }

    /// Decoded offset if this is a well-formed byte-offset component.
    pub fn as_byte_offset(&self) -> Option<u64> {
        if self.typ != TT_BYTE_OFFSET {
            return None;
        }
        tlv::decode_nni(&self.value).ok()
    }

    fn parse(segment: &str) -> Self {
        if let Some(digits) = segment.strip_prefix(BYTE_OFFSET_URI_PREFIX) {
            if let Ok(off) = digits.parse::<u64>() {
                return Component::byte_offset(off);
            }
        }
        if let Some((typ, rest)) = segment.split_once('=') {
            if let Ok(typ) = typ.parse::<u32>() {
                return Component {
                    typ,
                    value: percent_decode(rest),
                };
            }
        }
        Component::generic(percent_decode(segment))
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(off) = self.as_byte_offset() {
            return write!(f, "{}{}", BYTE_OFFSET_URI_PREFIX, off);
        }
        if !self.is_generic() {
            write!(f, "{}=", self.typ)?;
        }
        for &b in &self.value {
            if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~') {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "%{:02X}", b)?;
            }
        }
        Ok(())
    }
}

fn percent_decode(s: &str) -> Vec<u8> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(v) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(v);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    out
}

/// Ordered sequence of components. Two names are equal iff every component is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Name(Vec<Component>);

impl Name {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Parse an NDN URI such as `/ndn/xrootd/read/store/f.root/off=6144`.
    /// Empty segments are skipped, so `//a/` and `/a` are the same name.
    pub fn parse(uri: &str) -> Self {
        Self(
            uri.split('/')
                .filter(|s| !s.is_empty())
                .map(Component::parse)
                .collect(),
        )
    }

    pub fn push(&mut self, component: Component) {
        self.0.push(component);
    }

    /// Append every non-empty segment of a `/`-separated path as a generic component.
    pub fn append_path(&mut self, path: &str) {
        for seg in path.split('/').filter(|s| !s.is_empty()) {
            self.0.push(Component::generic(seg.as_bytes()));
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<&Component> {
        self.0.get(i)
    }

    pub fn last(&self) -> Option<&Component> {
        self.0.last()
    }

    pub fn components(&self) -> &[Component] {
        &self.0
    }

    /// Suffix starting at component `from` (empty if out of range).
    pub fn slice(&self, from: usize) -> Name {
        Name(self.0.get(from..).map(<[_]>::to_vec).unwrap_or_default())
    }

    /// Name without its last component.
    pub fn parent(&self) -> Name {
        let end = self.0.len().saturating_sub(1);
        Name(self.0[..end].to_vec())
    }

    pub fn starts_with(&self, prefix: &Name) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "/");
        }
        for c in &self.0 {
            write!(f, "/{}", c)?;
        }
        Ok(())
    }
}

impl From<&str> for Name {
    fn from(uri: &str) -> Self {
        Name::parse(uri)
    }
}
