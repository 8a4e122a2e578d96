//! redis-context-store
//!
//! A client-side storage engine mapping a versioned
//! `(context, key) -> (value, expiration)` interface onto Redis, with
//! transparent support for both single-instance and clustered
//! deployments.
//!
//! Each logical record is a pair of Redis keys: the hash-tagged data
//! key `{context:prefixkey}` and its companion
//! `version.of:{context:prefixkey}` holding an integer version. The
//! shared hash tag keeps both on the same cluster slot, so every
//! transaction touching the pair stays on one node. Writes run as
//! pipelined `MULTI`/`EXEC` transactions with `WATCH`-based optimistic
//! concurrency; in cluster mode a router follows `MOVED` redirections
//! and connection losses by rebuilding its slot map from `CLUSTER
//! SLOTS` with exponential backoff.
//!
//! [`RedisStore`] is the entry point; [`StoreConfig`] selects the
//! topology, authentication, TLS and retry behavior.

pub mod client;
pub mod cluster;
pub mod config;
pub mod store;
pub mod utils;

pub use config::{AuthConfig, ServerAddress, StoreConfig, TlsConfig};
pub use store::{Capabilities, RedisStore, StorageBackend, StorageId, VersionedValue};
pub use utils::{Result, StoreError};
