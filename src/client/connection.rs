//! Single-node command protocol
//!
//! [`NodeConnection`] owns one authenticated connection to one Redis
//! endpoint and implements the versioned storage algorithm on top of
//! it: pipelined `MULTI`/`EXEC` transactions over the data key and its
//! `version.of:` companion, optimistic concurrency via `WATCH`, and the
//! `SCAN`/`CLUSTER SLOTS` iteration used by context sweeps and topology
//! discovery.
//!
//! A single mutex serializes all traffic on the connection; every
//! public operation holds it for its whole duration, so a pipelined
//! transaction is atomic with respect to other callers.

use std::io;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::raw_connection::{ConnectionFactory, RawConnection};
use super::reply::Reply;
use crate::cluster::node::ClusterNode;
use crate::cluster::slot::SlotRange;
use crate::store::{StorageId, VersionedValue};
use crate::utils::{RespEncoder, RespValue, Result, StoreError};

const OPTIMISTIC_CONCURRENCY_RETRY_COUNT: usize = 3;
const CONNECTION_RETRY_COUNT: usize = 3;

/// Capability handed to context-scan visitors: lets the visitor run the
/// per-key maintenance commands on the connection that produced the key
/// without re-entering its mutex.
pub struct ScanSession<'a> {
    raw: &'a mut RawConnection,
}

impl ScanSession<'_> {
    /// Set the absolute expiration of a scanned key and its version
    /// companion. Failures are logged and swallowed; a context sweep
    /// keeps going past individual keys.
    pub fn expire_key_pair_at(&mut self, full_key: &str, expiration: i64) {
        let version_key = StorageId::version_key_of(full_key);
        let exp = expiration.to_string();
        let mut enc = RespEncoder::new();
        enc.push_command(&[b"EXPIREAT", full_key.as_bytes(), exp.as_bytes()]);
        enc.push_command(&[b"EXPIREAT", version_key.as_bytes(), exp.as_bytes()]);
        self.run_maintenance(&enc, "expire_key_pair_at", full_key);
    }

    /// Unlink a scanned key and its version companion.
    pub fn unlink_key_pair(&mut self, full_key: &str) {
        let version_key = StorageId::version_key_of(full_key);
        let mut enc = RespEncoder::new();
        enc.push_command(&[b"UNLINK", full_key.as_bytes(), version_key.as_bytes()]);
        self.run_maintenance(&enc, "unlink_key_pair", full_key);
    }

    fn run_maintenance(&mut self, enc: &RespEncoder, fn_name: &str, full_key: &str) {
        if let Err(e) = self.raw.send(enc) {
            warn!("({}) cannot reach server for key {}: {}", fn_name, full_key, e);
            return;
        }
        for _ in 0..enc.command_count() {
            match self.raw.read_reply() {
                Ok(RespValue::Error(message)) => {
                    warn!("({}) server rejected command for key {}: {}", fn_name, full_key, message);
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("({}) lost connection for key {}: {}", fn_name, full_key, e);
                    return;
                }
            }
        }
    }
}

/// Visitor over the keys of one storage context.
///
/// Implemented for any `FnMut(&mut ScanSession<'_>, &str)` closure; the
/// router asks the same value to process keys from several nodes.
pub trait KeyVisitor {
    fn process(&mut self, session: &mut ScanSession<'_>, full_key: &str);
}

impl<F> KeyVisitor for F
where
    F: FnMut(&mut ScanSession<'_>, &str),
{
    fn process(&mut self, session: &mut ScanSession<'_>, full_key: &str) {
        self(session, full_key)
    }
}

enum UpdateOutcome {
    /// The watched version changed and EXEC was aborted.
    Aborted,
    /// `SET … XX` found no data key; both keys were reconciled away.
    MissingData,
    /// The transaction ran; carries the INCR result.
    Written(i64),
}

/// One mutex-guarded, authenticated connection to a single endpoint.
#[derive(Debug)]
pub struct NodeConnection {
    host: String,
    port: u16,
    factory: ConnectionFactory,
    raw: Mutex<RawConnection>,
}

impl NodeConnection {
    /// Establish, and authenticate, a connection to `host:port`.
    pub fn connect(factory: ConnectionFactory, host: &str, port: u16) -> Result<Self> {
        info!("connecting to Redis at {}:{}", host, port);
        let raw = factory.create(host, port)?;
        Ok(Self {
            host: host.to_string(),
            port,
            factory,
            raw: Mutex::new(raw),
        })
    }

    pub fn endpoint(&self) -> (&str, u16) {
        (&self.host, self.port)
    }

    /// Handle a dead transport: silently try to re-establish the
    /// connection a few times so the *next* operation finds a live one,
    /// then fail the current operation as lost either way.
    fn recover(&self, raw: &mut RawConnection, fn_name: &str, cause: &io::Error) -> StoreError {
        error!("error during Redis communications: {}", cause);
        for attempt in 1..=CONNECTION_RETRY_COUNT {
            match self.factory.create(&self.host, self.port) {
                Ok(fresh) => {
                    debug!("reconnected to {}:{} on attempt {}", self.host, self.port, attempt);
                    *raw = fresh;
                    break;
                }
                Err(e) => {
                    warn!(
                        "reconnect attempt {}/{} to {}:{} failed: {}",
                        attempt, CONNECTION_RETRY_COUNT, self.host, self.port, e
                    );
                }
            }
        }
        StoreError::ConnectionLost(format!("NodeConnection::{}: {}", fn_name, cause))
    }

    fn send(&self, raw: &mut RawConnection, enc: &RespEncoder, fn_name: &str) -> Result<()> {
        raw.send(enc)
            .map_err(|e| self.recover(raw, fn_name, &e))
    }

    fn next_reply(&self, raw: &mut RawConnection, fn_name: &str, command: &str) -> Result<Reply> {
        let value = raw
            .read_reply()
            .map_err(|e| self.recover(raw, fn_name, &e))?;
        Reply::classify(value, fn_name, command)
    }

    fn one_command(
        &self,
        raw: &mut RawConnection,
        args: &[&[u8]],
        fn_name: &str,
        command: &str,
    ) -> Result<Reply> {
        let mut enc = RespEncoder::new();
        enc.push_command(args);
        self.send(raw, &enc, fn_name)?;
        self.next_reply(raw, fn_name, command)
    }

    /// Bare read of the version companion; a missing key reads as 0.
    fn read_version(&self, raw: &mut RawConnection, id: &StorageId) -> Result<i64> {
        debug!("(read_version) short-circuiting to only reading version for key {}@?", id);
        let version_key = id.version_key();
        let reply = self.one_command(
            raw,
            &[b"GET", version_key.as_bytes()],
            "read_version",
            "GET (version)",
        )?;
        if reply.is_nil() {
            return Ok(0);
        }
        let text = reply.expect_string("read_version")?;
        Ok(parse_version(id, "read_version", &text))
    }

    fn unlink_pair(&self, raw: &mut RawConnection, id: &StorageId) -> Result<()> {
        let data_key = id.data_key();
        let version_key = id.version_key();
        self.one_command(
            raw,
            &[b"UNLINK", data_key.as_bytes(), version_key.as_bytes()],
            "unlink_pair",
            "UNLINK",
        )?;
        Ok(())
    }

    /// Create both keys iff neither exists; `false` when the data key is
    /// already present. A lone survivor of a previous half-write is
    /// unlinked and reported as absent.
    pub fn set(&self, id: &StorageId, value: &str, expiration: i64) -> Result<bool> {
        debug!("(set) setting key {}@1 (exp: {})", id, expiration);
        let mut raw = self.raw.lock();

        let data_key = id.data_key();
        let version_key = id.version_key();
        let exp = expiration.to_string();

        let mut enc = RespEncoder::new();
        enc.push_command(&[b"MULTI"]);
        enc.push_command(&[
            b"SET",
            data_key.as_bytes(),
            value.as_bytes(),
            b"NX",
            b"EXAT",
            exp.as_bytes(),
        ]);
        enc.push_command(&[
            b"SET",
            version_key.as_bytes(),
            b"1",
            b"NX",
            b"EXAT",
            exp.as_bytes(),
        ]);
        enc.push_command(&[b"EXEC"]);
        self.send(&mut raw, &enc, "set")?;

        self.next_reply(&mut raw, "set", "MULTI")?.expect_status("set")?;
        self.next_reply(&mut raw, "set", "SET (data)")?.expect_status("set")?;
        self.next_reply(&mut raw, "set", "SET (version)")?.expect_status("set")?;
        let exec = self.next_reply(&mut raw, "set", "EXEC")?;
        let elements = exec.expect_array("set")?;
        if elements.len() != 2 {
            return Err(exec_arity_error("set", 2, elements.len()));
        }

        let data_created = !elements[0].is_nil();
        let version_created = !elements[1].is_nil();
        if data_created {
            Reply::of_element(&elements[0]).expect_status("set")?;
        }
        if version_created {
            Reply::of_element(&elements[1]).expect_status("set")?;
        }

        match (data_created, version_created) {
            (true, true) => Ok(true),
            (false, false) => Ok(false),
            _ => {
                warn!(
                    "data and version keys out of step for {}: removing both",
                    id
                );
                self.unlink_pair(&mut raw, id)?;
                Ok(false)
            }
        }
    }

    /// Read the value if its version is at least `min_version`; a lower
    /// current version comes back without the payload. With neither
    /// output requested this collapses to a bare version read.
    pub fn get_versioned(
        &self,
        id: &StorageId,
        want_value: bool,
        want_expiration: bool,
        min_version: i64,
    ) -> Result<VersionedValue> {
        debug!("(get_versioned) getting key {}@{}+", id, min_version);
        let mut raw = self.raw.lock();

        if !want_value && !want_expiration {
            let version = self.read_version(&mut raw, id)?;
            return Ok(VersionedValue::version_only(version));
        }

        let data_key = id.data_key();
        let version_key = id.version_key();

        for _ in 0..OPTIMISTIC_CONCURRENCY_RETRY_COUNT {
            self.one_command(
                &mut raw,
                &[b"WATCH", version_key.as_bytes()],
                "get_versioned",
                "WATCH",
            )?
            .expect_status("get_versioned")?;

            let current = self.read_version(&mut raw, id)?;

            // Below the requested version only the metadata travels back.
            let read_value = want_value && current >= min_version;
            if !read_value && !want_expiration {
                self.one_command(&mut raw, &[b"UNWATCH"], "get_versioned", "UNWATCH")?
                    .expect_status("get_versioned")?;
                return Ok(VersionedValue::version_only(current));
            }

            let mut enc = RespEncoder::new();
            enc.push_command(&[b"MULTI"]);
            if read_value {
                enc.push_command(&[b"GET", data_key.as_bytes()]);
            }
            if want_expiration {
                enc.push_command(&[b"EXPIRETIME", data_key.as_bytes()]);
            }
            enc.push_command(&[b"EXEC"]);
            self.send(&mut raw, &enc, "get_versioned")?;

            self.next_reply(&mut raw, "get_versioned", "MULTI")?
                .expect_status("get_versioned")?;
            if read_value {
                self.next_reply(&mut raw, "get_versioned", "GET (data)")?
                    .expect_status("get_versioned")?;
            }
            if want_expiration {
                self.next_reply(&mut raw, "get_versioned", "EXPIRETIME")?
                    .expect_status("get_versioned")?;
            }
            let exec = self.next_reply(&mut raw, "get_versioned", "EXEC")?;
            if exec.is_nil() {
                info!("(get_versioned) concurrency failure: retrying accessing {}", id);
                continue;
            }

            let elements = exec.expect_array("get_versioned")?;
            let expected = usize::from(read_value) + usize::from(want_expiration);
            if elements.len() != expected {
                return Err(exec_arity_error("get_versioned", expected, elements.len()));
            }

            let mut expiration_index = 0;
            let value = if read_value {
                expiration_index += 1;
                Some(Reply::of_element(&elements[0]).expect_string("get_versioned")?)
            } else {
                None
            };
            let expiration = if want_expiration {
                Some(Reply::of_element(&elements[expiration_index]).expect_integer("get_versioned")?)
            } else {
                None
            };

            return Ok(VersionedValue {
                version: current,
                value,
                expiration,
            });
        }

        warn!(
            "(get_versioned) concurrency failure: too-many retries while reading {}",
            id
        );
        Ok(VersionedValue::version_only(0))
    }

    /// Unconditional read; version 0 means the record is absent.
    pub fn force_get(
        &self,
        id: &StorageId,
        want_value: bool,
        want_expiration: bool,
    ) -> Result<VersionedValue> {
        debug!("(force_get) getting key {}@?", id);
        let mut raw = self.raw.lock();

        let data_key = id.data_key();
        let version_key = id.version_key();

        let mut enc = RespEncoder::new();
        enc.push_command(&[b"MULTI"]);
        enc.push_command(&[b"GET", version_key.as_bytes()]);
        if want_value {
            enc.push_command(&[b"GET", data_key.as_bytes()]);
        }
        if want_expiration {
            enc.push_command(&[b"EXPIRETIME", data_key.as_bytes()]);
        }
        enc.push_command(&[b"EXEC"]);
        self.send(&mut raw, &enc, "force_get")?;

        self.next_reply(&mut raw, "force_get", "MULTI")?
            .expect_status("force_get")?;
        self.next_reply(&mut raw, "force_get", "GET (version)")?
            .expect_status("force_get")?;
        if want_value {
            self.next_reply(&mut raw, "force_get", "GET (data)")?
                .expect_status("force_get")?;
        }
        if want_expiration {
            self.next_reply(&mut raw, "force_get", "EXPIRETIME")?
                .expect_status("force_get")?;
        }
        let exec = self.next_reply(&mut raw, "force_get", "EXEC")?;
        let elements = exec.expect_array("force_get")?;
        let expected = 1 + usize::from(want_value) + usize::from(want_expiration);
        if elements.len() != expected {
            return Err(exec_arity_error("force_get", expected, elements.len()));
        }

        let version_absent = elements[0].is_nil();
        if want_value {
            let data_absent = elements[1].is_nil();
            if version_absent != data_absent {
                warn!(
                    "data and version keys out of step for {}: removing both",
                    id
                );
                self.unlink_pair(&mut raw, id)?;
                return Ok(VersionedValue::version_only(0));
            }
            if version_absent && data_absent {
                return Ok(VersionedValue::version_only(0));
            }
        } else if version_absent {
            return Ok(VersionedValue::version_only(0));
        }

        let version_text = Reply::of_element(&elements[0]).expect_string("force_get")?;
        let version = parse_version(id, "force_get", &version_text);

        let mut expiration_index = 1;
        let value = if want_value {
            expiration_index += 1;
            Some(Reply::of_element(&elements[1]).expect_string("force_get")?)
        } else {
            None
        };
        let expiration = if want_expiration {
            Some(Reply::of_element(&elements[expiration_index]).expect_integer("force_get")?)
        } else {
            None
        };

        Ok(VersionedValue {
            version,
            value,
            expiration,
        })
    }

    /// The shared write transaction of both update flavors: overwrite
    /// the data key, bump the version, optionally re-pin expirations.
    fn run_update_transaction(
        &self,
        raw: &mut RawConnection,
        id: &StorageId,
        value: &str,
        expiration: i64,
        fn_name: &str,
    ) -> Result<UpdateOutcome> {
        let data_key = id.data_key();
        let version_key = id.version_key();
        let touch_expiration = expiration != 0;
        let exp = expiration.to_string();

        let mut enc = RespEncoder::new();
        enc.push_command(&[b"MULTI"]);
        enc.push_command(&[
            b"SET",
            data_key.as_bytes(),
            value.as_bytes(),
            b"XX",
            b"KEEPTTL",
        ]);
        enc.push_command(&[b"INCR", version_key.as_bytes()]);
        if touch_expiration {
            enc.push_command(&[b"EXPIREAT", data_key.as_bytes(), exp.as_bytes()]);
            enc.push_command(&[b"EXPIREAT", version_key.as_bytes(), exp.as_bytes()]);
        }
        enc.push_command(&[b"EXEC"]);
        self.send(raw, &enc, fn_name)?;

        self.next_reply(raw, fn_name, "MULTI")?.expect_status(fn_name)?;
        self.next_reply(raw, fn_name, "SET (data)")?.expect_status(fn_name)?;
        self.next_reply(raw, fn_name, "INCR (version)")?.expect_status(fn_name)?;
        if touch_expiration {
            self.next_reply(raw, fn_name, "EXPIREAT (data)")?.expect_status(fn_name)?;
            self.next_reply(raw, fn_name, "EXPIREAT (version)")?.expect_status(fn_name)?;
        }
        let exec = self.next_reply(raw, fn_name, "EXEC")?;
        if exec.is_nil() {
            return Ok(UpdateOutcome::Aborted);
        }

        let elements = exec.expect_array(fn_name)?;
        let expected = 2 + 2 * usize::from(touch_expiration);
        if elements.len() != expected {
            return Err(exec_arity_error(fn_name, expected, elements.len()));
        }

        if elements[0].is_nil() {
            // XX found nothing to overwrite but INCR still ran: the pair
            // is now a lone version key.
            warn!(
                "data and version keys out of step for {}: removing both",
                id
            );
            self.unlink_pair(raw, id)?;
            return Ok(UpdateOutcome::MissingData);
        }
        Reply::of_element(&elements[0]).expect_status(fn_name)?;

        let new_version = Reply::of_element(&elements[1]).expect_integer(fn_name)?;

        if touch_expiration {
            Reply::of_element(&elements[2]).expect_integer(fn_name)?;
            Reply::of_element(&elements[3]).expect_integer(fn_name)?;
        }

        Ok(UpdateOutcome::Written(new_version))
    }

    /// Compare-and-set update: `-1` on version mismatch, the new version
    /// on success, `0` after exhausting the optimistic retries.
    pub fn update_versioned(
        &self,
        id: &StorageId,
        value: &str,
        expiration: i64,
        if_version: i64,
    ) -> Result<i64> {
        debug!(
            "(update_versioned) updating key {}@{} (exp: {})",
            id, if_version, expiration
        );
        let mut raw = self.raw.lock();
        let version_key = id.version_key();

        for _ in 0..OPTIMISTIC_CONCURRENCY_RETRY_COUNT {
            self.one_command(
                &mut raw,
                &[b"WATCH", version_key.as_bytes()],
                "update_versioned",
                "WATCH",
            )?
            .expect_status("update_versioned")?;

            let current = self.read_version(&mut raw, id)?;
            if current != if_version {
                self.one_command(&mut raw, &[b"UNWATCH"], "update_versioned", "UNWATCH")?
                    .expect_status("update_versioned")?;
                return Ok(-1);
            }

            match self.run_update_transaction(&mut raw, id, value, expiration, "update_versioned")? {
                UpdateOutcome::Aborted => {
                    info!(
                        "(update_versioned) concurrency failure: retrying accessing {}",
                        id
                    );
                    continue;
                }
                UpdateOutcome::MissingData => return Ok(0),
                UpdateOutcome::Written(new_version) => {
                    if new_version - 1 != current {
                        warn!(
                            "(update_versioned) severe concurrency failure: retrying accessing {}",
                            id
                        );
                        continue;
                    }
                    return Ok(new_version);
                }
            }
        }

        warn!(
            "(update_versioned) concurrency failure: too-many retries while writing {}",
            id
        );
        Ok(0)
    }

    /// Unconditional update; returns the new version, or 0 when the
    /// record does not exist.
    pub fn force_update(&self, id: &StorageId, value: &str, expiration: i64) -> Result<i64> {
        debug!("(force_update) updating key {}@? (exp: {})", id, expiration);
        let mut raw = self.raw.lock();

        match self.run_update_transaction(&mut raw, id, value, expiration, "force_update")? {
            UpdateOutcome::Aborted => Err(StoreError::Protocol(
                "(force_update) EXEC aborted without a WATCH in flight".to_string(),
            )),
            UpdateOutcome::MissingData => Ok(0),
            UpdateOutcome::Written(new_version) => Ok(new_version),
        }
    }

    /// Unlink the pair; `true` iff the server reports at least one key
    /// deleted.
    pub fn remove(&self, id: &StorageId) -> Result<bool> {
        debug!("(remove) deleting key {}@?", id);
        let mut raw = self.raw.lock();

        let data_key = id.data_key();
        let version_key = id.version_key();
        let reply = self.one_command(
            &mut raw,
            &[b"UNLINK", data_key.as_bytes(), version_key.as_bytes()],
            "remove",
            "UNLINK",
        )?;
        match reply.value().as_i64() {
            Some(removed) => Ok(removed != 0),
            None => Ok(false),
        }
    }

    /// Iterate all keys of `context` on this node, yielding each to the
    /// visitor. Returns the number of keys seen.
    pub fn scan_context(&self, context: &str, visitor: &mut dyn KeyVisitor) -> Result<u64> {
        let mut raw = self.raw.lock();

        // Keys render as `{context:prefixkey}`, so the context together
        // with the opening brace and the separating colon is a prefix of
        // every key in the context.
        let pattern = format!("{{{}:*", context);
        let mut cursor: u64 = 0;
        let mut count: u64 = 0;

        loop {
            let cursor_text = cursor.to_string();
            let reply = self.one_command(
                &mut raw,
                &[b"SCAN", cursor_text.as_bytes(), b"MATCH", pattern.as_bytes()],
                "scan_context",
                "SCAN",
            )?;
            let page = reply.expect_array("scan_context")?;
            if page.len() != 2 {
                return Ok(count);
            }
            let (next_cursor, entries) = match (page[0].as_str(), page[1].as_array()) {
                (Some(next), Some(entries)) => (next.to_string(), entries.to_vec()),
                _ => {
                    warn!("(scan_context) malformed SCAN page while scanning {}", context);
                    return Ok(count);
                }
            };

            count += entries.len() as u64;
            for (index, entry) in entries.iter().enumerate() {
                match entry.as_str() {
                    Some(full_key) => {
                        let mut session = ScanSession { raw: &mut *raw };
                        visitor.process(&mut session, full_key);
                    }
                    None => {
                        warn!(
                            "(scan_context) non-string element returned during scanning: {} at index {}",
                            entry.type_name(),
                            index
                        );
                    }
                }
            }

            cursor = match next_cursor.parse() {
                Ok(next) => next,
                Err(_) => break,
            };
            if cursor == 0 {
                break;
            }
        }

        Ok(count)
    }

    /// Ask this node for the cluster topology and yield each
    /// `(range, node)` row of `CLUSTER SLOTS`.
    pub fn iterate_slots(
        &self,
        mut callback: impl FnMut(SlotRange, ClusterNode),
    ) -> Result<()> {
        let mut raw = self.raw.lock();
        let reply = self.one_command(
            &mut raw,
            &[b"CLUSTER", b"SLOTS"],
            "iterate_slots",
            "CLUSTER SLOTS",
        )?;
        let rows = reply.expect_array("iterate_slots")?;

        for row in rows {
            let fields = row.as_array().ok_or_else(|| {
                StoreError::Protocol("(iterate_slots) slot entry is not an array".to_string())
            })?;
            if fields.len() < 3 {
                error!("invalid slots configuration returned from Redis: slot-range is missing nodes");
                return Err(StoreError::Protocol(
                    "(iterate_slots) slot entry is missing its node list".to_string(),
                ));
            }

            let start = fields[0].as_i64().ok_or_else(|| {
                StoreError::Protocol("(iterate_slots) slot-range start is not an integer".to_string())
            })?;
            let end = fields[1].as_i64().ok_or_else(|| {
                StoreError::Protocol("(iterate_slots) slot-range end is not an integer".to_string())
            })?;
            let range = SlotRange::new(start, end)?;

            let node_fields = fields[2].as_array().ok_or_else(|| {
                StoreError::Protocol("(iterate_slots) node entry is not an array".to_string())
            })?;
            if node_fields.len() < 2 {
                error!("invalid slots configuration returned from Redis: node is missing address data");
                return Err(StoreError::Protocol(
                    "(iterate_slots) node entry is missing host and port".to_string(),
                ));
            }
            let host = node_fields[0].as_str().ok_or_else(|| {
                StoreError::Protocol("(iterate_slots) node host is not a string".to_string())
            })?;
            let port = node_fields[1].as_i64().ok_or_else(|| {
                StoreError::Protocol("(iterate_slots) node port is not an integer".to_string())
            })?;
            if !(0..=i64::from(u16::MAX)).contains(&port) {
                return Err(StoreError::Protocol(format!(
                    "(iterate_slots) node port {} out of range",
                    port
                )));
            }

            callback(range, ClusterNode::new(host, port as u16));
        }

        Ok(())
    }
}

impl crate::store::StorageBackend for NodeConnection {
    fn set(&self, id: &StorageId, value: &str, expiration: i64) -> Result<bool> {
        NodeConnection::set(self, id, value, expiration)
    }

    fn get_versioned(
        &self,
        id: &StorageId,
        want_value: bool,
        want_expiration: bool,
        min_version: i64,
    ) -> Result<VersionedValue> {
        NodeConnection::get_versioned(self, id, want_value, want_expiration, min_version)
    }

    fn force_get(
        &self,
        id: &StorageId,
        want_value: bool,
        want_expiration: bool,
    ) -> Result<VersionedValue> {
        NodeConnection::force_get(self, id, want_value, want_expiration)
    }

    fn update_versioned(
        &self,
        id: &StorageId,
        value: &str,
        expiration: i64,
        if_version: i64,
    ) -> Result<i64> {
        NodeConnection::update_versioned(self, id, value, expiration, if_version)
    }

    fn force_update(&self, id: &StorageId, value: &str, expiration: i64) -> Result<i64> {
        NodeConnection::force_update(self, id, value, expiration)
    }

    fn remove(&self, id: &StorageId) -> Result<bool> {
        NodeConnection::remove(self, id)
    }

    fn scan_context(&self, context: &str, visitor: &mut dyn KeyVisitor) -> Result<u64> {
        NodeConnection::scan_context(self, context, visitor)
    }
}

fn exec_arity_error(fn_name: &str, expected: usize, got: usize) -> StoreError {
    StoreError::Protocol(format!(
        "({}) incorrect amount of results from EXEC: expected {}, got {}",
        fn_name, expected, got
    ))
}

/// Lenient version parse: a corrupted version value reads as 0 so the
/// record presents as absent instead of failing every call.
fn parse_version(id: &StorageId, fn_name: &str, text: &str) -> i64 {
    match text.parse() {
        Ok(version) => version,
        Err(_) => {
            error!(
                "({}) non-integer value in version key `version.of:{}'",
                fn_name, id
            );
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exec_arity_error_message() {
        let err = exec_arity_error("set", 2, 3);
        match err {
            StoreError::Protocol(message) => {
                assert!(message.contains("expected 2, got 3"), "{}", message);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn parse_version_tolerates_garbage() {
        let id = StorageId::new("c", "k", "");
        assert_eq!(parse_version(&id, "t", "41"), 41);
        assert_eq!(parse_version(&id, "t", "not-a-number"), 0);
        assert_eq!(parse_version(&id, "t", "99999999999999999999999"), 0);
    }
}
