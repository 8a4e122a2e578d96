//! Versioned storage surface

pub mod facade;
pub mod storage_id;

pub use facade::{Capabilities, RedisStore};
pub use storage_id::StorageId;

use crate::client::KeyVisitor;
use crate::utils::Result;

/// Result of a read: the record version plus whichever outputs the
/// caller asked for. Version 0 means the record is absent (or, for the
/// versioned operations, that the optimistic retries were exhausted).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VersionedValue {
    pub version: i64,
    pub value: Option<String>,
    pub expiration: Option<i64>,
}

impl VersionedValue {
    pub fn version_only(version: i64) -> Self {
        Self {
            version,
            value: None,
            expiration: None,
        }
    }

    pub fn is_absent(&self) -> bool {
        self.version == 0
    }
}

/// The storage operations shared by the single-node connection and the
/// cluster router; the facade talks to either through this contract.
pub trait StorageBackend: Send + Sync {
    /// Create the record iff it does not exist; `false` when it does.
    fn set(&self, id: &StorageId, value: &str, expiration: i64) -> Result<bool>;

    /// Read, returning the payload only when the current version is at
    /// least `min_version`.
    fn get_versioned(
        &self,
        id: &StorageId,
        want_value: bool,
        want_expiration: bool,
        min_version: i64,
    ) -> Result<VersionedValue>;

    /// Unconditional read; version 0 when absent.
    fn force_get(
        &self,
        id: &StorageId,
        want_value: bool,
        want_expiration: bool,
    ) -> Result<VersionedValue>;

    /// Compare-and-set update: `-1` on mismatch, the new version on
    /// success, 0 when the optimistic retries are exhausted.
    fn update_versioned(
        &self,
        id: &StorageId,
        value: &str,
        expiration: i64,
        if_version: i64,
    ) -> Result<i64>;

    /// Unconditional update; returns the new version, 0 when absent.
    fn force_update(&self, id: &StorageId, value: &str, expiration: i64) -> Result<i64>;

    /// Delete the record; `true` iff something was deleted.
    fn remove(&self, id: &StorageId) -> Result<bool>;

    /// Visit every key of `context`. The count is only meaningful on a
    /// single node; the clustered implementation reports 0.
    fn scan_context(&self, context: &str, visitor: &mut dyn KeyVisitor) -> Result<u64>;
}
