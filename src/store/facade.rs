//! Storage facade
//!
//! Thin adapter between the host's `(context, key)` string interface
//! and the storage backend: composes `StorageId`s, picks the versioned
//! or forced operation variant from the caller's version argument, and
//! implements the whole-context sweeps on top of the scan primitive.

use tracing::debug;

use super::{StorageBackend, StorageId, VersionedValue};
use crate::client::{ConnectionFactory, NodeConnection, ScanSession};
use crate::cluster::ClusterRouter;
use crate::config::StoreConfig;
use crate::utils::Result;

// Redis documents both key and value maxima as 512 MB; the composite
// key layout `{context:prefixkey}` costs one colon and two braces.
const REDIS_MAX_KEY_SIZE: u64 = 512_000_000;
const MAX_CONTEXT_SIZE: u64 = REDIS_MAX_KEY_SIZE / 2 - 1;
const MAX_KEY_SIZE: u64 = REDIS_MAX_KEY_SIZE / 2 - 2;
const MAX_VALUE_SIZE: u64 = 512_000_000;

/// Size limits advertised to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub max_context_size: u64,
    pub max_key_size: u64,
    pub max_value_size: u64,
}

/// The storage engine as the host sees it.
pub struct RedisStore {
    backend: Box<dyn StorageBackend>,
    prefix: String,
    capabilities: Capabilities,
}

impl RedisStore {
    /// Connect according to `config`: the presence of cluster seeds
    /// selects the router, otherwise a single connection to the default
    /// endpoint is used.
    pub fn open(config: StoreConfig) -> Result<Self> {
        let backend: Box<dyn StorageBackend> = if config.clustered() {
            Box::new(ClusterRouter::new(&config)?)
        } else {
            let factory = ConnectionFactory::from_config(&config);
            Box::new(NodeConnection::connect(factory, &config.host, config.port)?)
        };

        let capabilities = Capabilities {
            max_context_size: MAX_CONTEXT_SIZE,
            max_key_size: MAX_KEY_SIZE - config.prefix.len() as u64,
            max_value_size: MAX_VALUE_SIZE,
        };

        Ok(Self {
            backend,
            prefix: config.prefix,
            capabilities,
        })
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn make_id(&self, context: &str, key: &str) -> StorageId {
        StorageId::new(context, key, &self.prefix)
    }

    /// Create a record; `false` when the key already exists.
    pub fn create(&self, context: &str, key: &str, value: &str, expiration: i64) -> Result<bool> {
        let id = self.make_id(context, key);
        self.backend.set(&id, value, expiration)
    }

    /// Read a record. `version > 0` requests the payload only when the
    /// stored version is at least that; `version == 0` reads
    /// unconditionally.
    pub fn read(
        &self,
        context: &str,
        key: &str,
        want_value: bool,
        want_expiration: bool,
        version: i64,
    ) -> Result<VersionedValue> {
        let id = self.make_id(context, key);
        if version > 0 {
            self.backend
                .get_versioned(&id, want_value, want_expiration, version)
        } else {
            self.backend.force_get(&id, want_value, want_expiration)
        }
    }

    /// Update a record. `version > 0` is a compare-and-set returning
    /// `-1` on mismatch; `version == 0` overwrites unconditionally.
    /// Expiration 0 leaves the TTL untouched.
    pub fn update(
        &self,
        context: &str,
        key: &str,
        value: &str,
        expiration: i64,
        version: i64,
    ) -> Result<i64> {
        let id = self.make_id(context, key);
        if version > 0 {
            self.backend
                .update_versioned(&id, value, expiration, version)
        } else {
            self.backend.force_update(&id, value, expiration)
        }
    }

    /// Delete a record; `true` iff it existed.
    pub fn delete(&self, context: &str, key: &str) -> Result<bool> {
        let id = self.make_id(context, key);
        self.backend.remove(&id)
    }

    /// Move the expiration of every record in `context`.
    pub fn update_context(&self, context: &str, expiration: i64) -> Result<()> {
        debug!("(update_context) rewriting expirations in context {} to {}", context, expiration);
        let mut visitor = |session: &mut ScanSession<'_>, full_key: &str| {
            session.expire_key_pair_at(full_key, expiration);
        };
        self.backend.scan_context(context, &mut visitor)?;
        Ok(())
    }

    /// Delete every record in `context`.
    pub fn delete_context(&self, context: &str) -> Result<()> {
        debug!("(delete_context) removing all keys in context {}", context);
        let mut visitor = |session: &mut ScanSession<'_>, full_key: &str| {
            session.unlink_key_pair(full_key);
        };
        self.backend.scan_context(context, &mut visitor)?;
        Ok(())
    }

    /// Expired records are collected by the server; nothing to do.
    pub fn reap(&self, _context: &str) {}
}
