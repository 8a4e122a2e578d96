//! Composite storage identifiers
//!
//! Every stored value is addressed by a `(context, key)` pair plus an
//! installation-wide prefix. On the wire the three pieces collapse into
//! the single Redis key `{context:prefixkey}`: the braces make the whole
//! composite a hash tag, so the companion version key
//! `version.of:{context:prefixkey}` shares the tag and therefore the
//! slot and the owning node.

use std::fmt;

use crate::cluster::slot::{crc16_update, SLOT_COUNT};

/// Immutable composite identifier of one stored value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageId {
    context: String,
    key: String,
    prefix: String,
}

impl StorageId {
    /// `context` must be non-empty; `prefix` may be empty.
    pub fn new(context: &str, key: &str, prefix: &str) -> Self {
        debug_assert!(!context.is_empty(), "storage context must be non-empty");
        Self {
            context: context.to_string(),
            key: key.to_string(),
            prefix: prefix.to_string(),
        }
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The Redis key holding the value.
    pub fn data_key(&self) -> String {
        format!("{{{}:{}{}}}", self.context, self.prefix, self.key)
    }

    /// The companion Redis key holding the integer version.
    pub fn version_key(&self) -> String {
        format!("version.of:{}", self.data_key())
    }

    /// Version key for an already-rendered data key, as returned by a
    /// context scan.
    pub fn version_key_of(data_key: &str) -> String {
        format!("version.of:{}", data_key)
    }

    /// Hash slot of this identifier.
    ///
    /// The CRC runs over the four pieces `context`, `:`, `prefix`, `key`
    /// in sequence, which is exactly the hash-tag body of `data_key()`,
    /// so client-side routing agrees with the server's slot assignment.
    pub fn slot(&self) -> u16 {
        let mut crc = crc16_update(0, self.context.as_bytes());
        crc = crc16_update(crc, b":");
        crc = crc16_update(crc, self.prefix.as_bytes());
        crc = crc16_update(crc, self.key.as_bytes());
        crc % SLOT_COUNT
    }
}

impl fmt::Display for StorageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}:{}{}}}", self.context, self.prefix, self.key)
    }
}
