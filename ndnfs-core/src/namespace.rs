//! Naming scheme shared by consumer and responder.
//!
//! `<prefix>/fileinfo/<path>` addresses file metadata,
//! `<prefix>/read/<path>/<byte-offset>` addresses one segment of file content.

use std::time::Duration;

use crate::name::{Component, Name};

/// Name prefix for all packets.
pub const DEFAULT_PREFIX: &str = "/ndn/xrootd";

pub const VERB_FILEINFO: &str = "fileinfo";
pub const VERB_READ: &str = "read";

/// Maximum payload size inside Data packets; also the segment size.
pub const MAX_PAYLOAD_SIZE: u64 = 6144;

pub const DEFAULT_INTEREST_LIFETIME: Duration = Duration::from_secs(8);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    prefix: Name,
}

impl Namespace {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: Name::parse(prefix),
        }
    }

    pub fn prefix(&self) -> &Name {
        &self.prefix
    }

    pub fn fileinfo(&self, path: &str) -> Name {
        self.verb_name(VERB_FILEINFO, path)
    }

    /// Segment name for the segment starting at `byte_offset`.
    pub fn read(&self, path: &str, byte_offset: u64) -> Name {
        let mut name = self.verb_name(VERB_READ, path);
        name.push(Component::byte_offset(byte_offset));
        name
    }

    fn verb_name(&self, verb: &str, path: &str) -> Name {
        let mut name = self.prefix.clone();
        name.push(Component::generic(verb.as_bytes()));
        name.append_path(path);
        name
    }

    /// Trailing byte offset of a read name.
    pub fn byte_offset(&self, name: &Name) -> Option<u64> {
        name.last().and_then(Component::as_byte_offset)
    }

    /// Verb of a name under this prefix.
    pub fn verb<'a>(&self, name: &'a Name) -> Option<&'a [u8]> {
        if !name.starts_with(&self.prefix) {
            return None;
        }
        name.get(self.prefix.len()).map(|c| c.value.as_slice())
    }

    /// File path addressed by a fileinfo or read name, e.g. `/store/f.root`.
    /// `None` when the name is outside this namespace or a path component
    /// is not generic.
    pub fn file_path(&self, name: &Name) -> Option<String> {
        let verb = self.verb(name)?;
        let mut rest = name.slice(self.prefix.len() + 1);
        if verb == VERB_READ.as_bytes() && self.byte_offset(name).is_some() {
            rest = rest.parent();
        }
        if rest.is_empty() {
            return None;
        }
        let mut out = String::new();
        for c in rest.components() {
            if !c.is_generic() {
                return None;
            }
            out.push('/');
            out.push_str(&String::from_utf8_lossy(&c.value));
        }
        Some(out)
    }

    /// True iff both names are segments of the same logical read: same
    /// prefix, verb and path, differing only in the trailing byte offset.
    pub fn same_read(&self, a: &Name, b: &Name) -> bool {
        let is_read = |n: &Name| {
            self.verb(n) == Some(VERB_READ.as_bytes()) && self.byte_offset(n).is_some()
        };
        is_read(a) && is_read(b) && a.parent() == b.parent()
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}
