//! Cluster dispatch and reconfiguration
//!
//! The router owns the slot map and the per-node connection cache under
//! one read/write lock. Dispatch runs in read mode (held across the
//! server round-trip); recovery from redirections and lost connections
//! takes the write lock, rebuilds the slot map from whichever known
//! node answers `CLUSTER SLOTS`, and retries with exponential backoff.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{RwLock, RwLockWriteGuard};
use tracing::{debug, error};

use super::node::ClusterNode;
use super::slot_map::SlotMap;
use crate::client::{ConnectionFactory, KeyVisitor, NodeConnection};
use crate::config::StoreConfig;
use crate::store::StorageId;
use crate::utils::{Result, StoreError};

#[derive(Debug)]
struct RoutingTables {
    slots: SlotMap,
    connections: HashMap<ClusterNode, Arc<NodeConnection>>,
}

/// Client-side router over a Redis cluster.
#[derive(Debug)]
pub struct ClusterRouter {
    tables: RwLock<RoutingTables>,
    factory: ConnectionFactory,
    max_retries: u32,
    base_wait_ms: u64,
    max_wait_ms: u64,
}

impl ClusterRouter {
    /// Discover the topology from the configured seed nodes, in order.
    /// The first seed that answers `CLUSTER SLOTS` wins; if none does,
    /// the router cannot exist.
    pub fn new(config: &StoreConfig) -> Result<Self> {
        let factory = ConnectionFactory::from_config(config);

        let mut slots = SlotMap::new();
        for seed in &config.initial_nodes {
            match Self::fetch_slots(&factory, &seed.host, seed.port, &mut slots) {
                Ok(()) => break,
                Err(e) => {
                    error!(
                        "error occurred during initial cluster configuration from {} -- skipping node: {}",
                        seed, e
                    );
                }
            }
        }
        if slots.is_empty() {
            return Err(StoreError::Fatal(
                "cannot connect to any seed node of the Redis cluster".to_string(),
            ));
        }

        Ok(Self {
            tables: RwLock::new(RoutingTables {
                slots,
                connections: HashMap::new(),
            }),
            factory,
            max_retries: config.max_retries,
            base_wait_ms: config.base_wait_ms,
            max_wait_ms: config.max_wait_ms,
        })
    }

    /// Populate `map` from one node's view of the topology. The map is
    /// cleared first so a half-written view from a failed node never
    /// leaks into the result.
    fn fetch_slots(
        factory: &ConnectionFactory,
        host: &str,
        port: u16,
        map: &mut SlotMap,
    ) -> Result<()> {
        map.clear();
        // Throwaway connection: node objects from an old map may no
        // longer exist, and seeds are not part of the keyed cache.
        let conn = NodeConnection::connect(factory.clone(), host, port)?;
        conn.iterate_slots(|range, node| {
            debug!(
                "Redis cluster hash-range {}-{} to host {}",
                range.from(),
                range.to(),
                node
            );
            map.insert(range, node);
        })?;
        if map.is_empty() {
            return Err(StoreError::Protocol(
                "(fetch_slots) CLUSTER SLOTS returned no ranges".to_string(),
            ));
        }
        Ok(())
    }

    /// Run `op` against the node owning `id`'s slot, recovering from
    /// transient failures by backing off, rebuilding the slot map and
    /// retrying while attempts remain.
    pub fn wrapped_call<R>(
        &self,
        id: &StorageId,
        op: impl Fn(&NodeConnection) -> Result<R>,
    ) -> Result<R> {
        let mut attempt: u32 = 0;
        loop {
            match self.dispatch(id, &op) {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() => {
                    // Cluster state may lag behind a failover; give the
                    // masters a moment to agree before asking again.
                    if !self.wait_for_retry(attempt) {
                        match &e {
                            StoreError::Redirected { host, port } => error!(
                                "Redis cluster failure: redirected to `{}:{}' but could not settle on a reachable node",
                                host, port
                            ),
                            _ => error!(
                                "Redis cluster failure: cannot find applicable host to connect to"
                            ),
                        }
                        return Err(e);
                    }
                    self.rebuild_slot_map()?;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn dispatch<R>(
        &self,
        id: &StorageId,
        op: &impl Fn(&NodeConnection) -> Result<R>,
    ) -> Result<R> {
        {
            let tables = self.tables.read();
            match tables.slots.lookup(id) {
                Some(node) => {
                    if let Some(conn) = tables.connections.get(node) {
                        // Read mode is held for the whole round-trip so a
                        // concurrent rebuild waits for in-flight calls.
                        return op(conn);
                    }
                }
                None => return Err(Self::unrouted(id)),
            }
        }

        // Connection miss: create and cache it under the write lock,
        // then run the operation under the downgraded read guard.
        let mut tables = self.tables.write();
        let node = match tables.slots.lookup(id) {
            Some(node) => node.clone(),
            None => return Err(Self::unrouted(id)),
        };
        if !tables.connections.contains_key(&node) {
            let conn = Arc::new(NodeConnection::connect(
                self.factory.clone(),
                &node.host,
                node.port,
            )?);
            tables.connections.insert(node.clone(), conn);
        }
        let tables = RwLockWriteGuard::downgrade(tables);
        match tables.connections.get(&node) {
            Some(conn) => op(conn),
            None => Err(StoreError::ConnectionLost(format!(
                "connection to {} vanished during dispatch",
                node
            ))),
        }
    }

    /// A slot with no owner in the current map reads as a transient
    /// failure: the rebuild-and-retry path is the repair.
    fn unrouted(id: &StorageId) -> StoreError {
        StoreError::ConnectionLost(format!(
            "no known node serves slot {} of key {}",
            id.slot(),
            id
        ))
    }

    /// Rebuild the slot map from the first previously-known node that
    /// answers `CLUSTER SLOTS`.
    fn rebuild_slot_map(&self) -> Result<()> {
        let mut tables = self.tables.write();

        // Flush the connection cache before touching the slot map so a
        // concurrent lookup can never be handed a connection for a node
        // the new map no longer contains.
        tables.connections.clear();
        let previous = std::mem::take(&mut tables.slots);

        for (range, node) in previous.iter() {
            debug!(
                "trying reading configuration from node {} (currently known for range {}-{})",
                node,
                range.from(),
                range.to()
            );
            match Self::fetch_slots(&self.factory, &node.host, node.port, &mut tables.slots) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    error!(
                        "error occurred getting cluster configuration from {} -- skipping node: {}",
                        node, e
                    );
                }
            }
        }

        error!(
            "no known node in the Redis cluster responds correctly to `CLUSTER SLOTS': cannot explore cluster topology"
        );
        Err(StoreError::Fatal(
            "cannot connect to any node in the Redis cluster".to_string(),
        ))
    }

    /// Sleep out the backoff for 0-based `attempt`; false once attempts
    /// are exhausted. A zero cap means the doubling is unbounded.
    fn wait_for_retry(&self, attempt: u32) -> bool {
        if attempt > self.max_retries {
            return false;
        }
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let cap = if self.max_wait_ms == 0 {
            u64::MAX
        } else {
            self.max_wait_ms
        };
        let wait = self.base_wait_ms.saturating_mul(factor).min(cap);
        debug!(
            "waiting about {} milliseconds for try {}/{}",
            wait, attempt, self.max_retries
        );
        std::thread::sleep(Duration::from_millis(wait));
        true
    }

    /// Scan one context across every node in the map.
    ///
    /// Always reports 0: the aggregate count is not tracked in cluster
    /// mode, and the host's contract ignores it.
    pub fn scan_context(&self, context: &str, visitor: &mut dyn KeyVisitor) -> Result<u64> {
        let mut tables = self.tables.write();
        let nodes = tables.slots.distinct_nodes();
        for node in &nodes {
            if !tables.connections.contains_key(node) {
                let conn = Arc::new(NodeConnection::connect(
                    self.factory.clone(),
                    &node.host,
                    node.port,
                )?);
                tables.connections.insert(node.clone(), conn);
            }
        }

        let tables = RwLockWriteGuard::downgrade(tables);
        for node in &nodes {
            if let Some(conn) = tables.connections.get(node) {
                conn.scan_context(context, visitor)?;
            }
        }
        Ok(0)
    }

    /// Snapshot of the current slot map, for diagnostics.
    pub fn slot_map_snapshot(&self) -> SlotMap {
        self.tables.read().slots.clone()
    }
}

impl crate::store::StorageBackend for ClusterRouter {
    fn set(&self, id: &StorageId, value: &str, expiration: i64) -> Result<bool> {
        self.wrapped_call(id, |conn| conn.set(id, value, expiration))
    }

    fn get_versioned(
        &self,
        id: &StorageId,
        want_value: bool,
        want_expiration: bool,
        min_version: i64,
    ) -> Result<crate::store::VersionedValue> {
        self.wrapped_call(id, |conn| {
            conn.get_versioned(id, want_value, want_expiration, min_version)
        })
    }

    fn force_get(
        &self,
        id: &StorageId,
        want_value: bool,
        want_expiration: bool,
    ) -> Result<crate::store::VersionedValue> {
        self.wrapped_call(id, |conn| conn.force_get(id, want_value, want_expiration))
    }

    fn update_versioned(
        &self,
        id: &StorageId,
        value: &str,
        expiration: i64,
        if_version: i64,
    ) -> Result<i64> {
        self.wrapped_call(id, |conn| {
            conn.update_versioned(id, value, expiration, if_version)
        })
    }

    fn force_update(&self, id: &StorageId, value: &str, expiration: i64) -> Result<i64> {
        self.wrapped_call(id, |conn| conn.force_update(id, value, expiration))
    }

    fn remove(&self, id: &StorageId) -> Result<bool> {
        self.wrapped_call(id, |conn| conn.remove(id))
    }

    fn scan_context(&self, context: &str, visitor: &mut dyn KeyVisitor) -> Result<u64> {
        ClusterRouter::scan_context(self, context, visitor)
    }
}
