//! Scripted in-memory Redis used by the integration tests.
//!
//! Speaks just enough RESP2 for the storage engine: strings with
//! NX/XX/EXAT/KEEPTTL, INCR, UNLINK, EXPIREAT/EXPIRETIME, SCAN,
//! MULTI/EXEC queueing, WATCH/UNWATCH as no-ops, and a configurable
//! `CLUSTER SLOTS`. Per-node behavior toggles let tests script MOVED
//! redirections, CLUSTERDOWN answers and topology changes.

// Each test binary uses a different subset of the helpers.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;

#[derive(Debug, Clone)]
pub struct Entry {
    pub value: String,
    pub expire_at: Option<i64>,
}

pub type SharedStore = Arc<Mutex<HashMap<String, Entry>>>;

/// One `CLUSTER SLOTS` row: `(start, end, host, port)`.
pub type SlotRow = (u16, u16, String, u16);

#[derive(Default)]
pub struct NodeBehavior {
    /// Data commands answer `-CLUSTERDOWN The cluster is down`.
    pub cluster_down: bool,
    /// Data commands answer `-MOVED <slot> <host>:<port>`.
    pub moved: Option<(u16, String, u16)>,
    /// `CLUSTER SLOTS` answers an error once the queue is drained.
    pub fail_cluster_slots: bool,
}

struct Shared {
    store: SharedStore,
    behavior: Mutex<NodeBehavior>,
    /// One-shot `CLUSTER SLOTS` answers, consumed front to back.
    slots_queue: Mutex<VecDeque<Vec<SlotRow>>>,
    /// Answer used once the queue is empty.
    slots_default: Mutex<Vec<SlotRow>>,
}

pub struct MiniRedis {
    port: u16,
    shared: Arc<Shared>,
}

impl MiniRedis {
    pub fn start() -> Self {
        Self::start_with_store(Arc::new(Mutex::new(HashMap::new())))
    }

    pub fn start_with_store(store: SharedStore) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind mini server");
        let port = listener.local_addr().expect("local addr").port();
        let shared = Arc::new(Shared {
            store,
            behavior: Mutex::new(NodeBehavior::default()),
            slots_queue: Mutex::new(VecDeque::new()),
            slots_default: Mutex::new(Vec::new()),
        });

        let accept_shared = Arc::clone(&shared);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { return };
                let conn_shared = Arc::clone(&accept_shared);
                thread::spawn(move || serve_connection(stream, conn_shared));
            }
        });

        Self { port, shared }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn store(&self) -> SharedStore {
        Arc::clone(&self.shared.store)
    }

    pub fn seed_record(&self, data_key: &str, value: &str, version: i64, expire_at: Option<i64>) {
        let mut store = self.shared.store.lock().unwrap();
        store.insert(
            data_key.to_string(),
            Entry {
                value: value.to_string(),
                expire_at,
            },
        );
        store.insert(
            format!("version.of:{}", data_key),
            Entry {
                value: version.to_string(),
                expire_at,
            },
        );
    }

    pub fn set_default_slots(&self, rows: Vec<SlotRow>) {
        *self.shared.slots_default.lock().unwrap() = rows;
    }

    pub fn push_slots_once(&self, rows: Vec<SlotRow>) {
        self.shared.slots_queue.lock().unwrap().push_back(rows);
    }

    pub fn set_cluster_down(&self, value: bool) {
        self.shared.behavior.lock().unwrap().cluster_down = value;
    }

    pub fn set_moved(&self, target: Option<(u16, String, u16)>) {
        self.shared.behavior.lock().unwrap().moved = target;
    }

    pub fn set_fail_cluster_slots(&self, value: bool) {
        self.shared.behavior.lock().unwrap().fail_cluster_slots = value;
    }

    /// Row pointing this node at `0-16383` of `owner`.
    pub fn whole_range(owner: &MiniRedis) -> Vec<SlotRow> {
        vec![(0, 16383, "127.0.0.1".to_string(), owner.port())]
    }
}

/// A bound-then-dropped listener leaves a port that refuses connects.
pub fn dead_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    listener.local_addr().expect("local addr").port()
}

fn serve_connection(stream: TcpStream, shared: Arc<Shared>) {
    let Ok(read_half) = stream.try_clone() else { return };
    let mut reader = BufReader::new(read_half);
    let mut writer = stream;
    let mut queued: Option<Vec<Vec<String>>> = None;

    while let Some(command) = read_command(&mut reader) {
        let reply = handle_command(&command, &mut queued, &shared);
        if writer.write_all(&reply).is_err() {
            return;
        }
    }
}

fn read_command(reader: &mut BufReader<TcpStream>) -> Option<Vec<String>> {
    let count = read_prefixed_line(reader, b'*')?;
    let mut args = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let len = read_prefixed_line(reader, b'$')?;
        let mut data = vec![0u8; len as usize];
        reader.read_exact(&mut data).ok()?;
        let mut crlf = [0u8; 2];
        reader.read_exact(&mut crlf).ok()?;
        args.push(String::from_utf8(data).ok()?);
    }
    Some(args)
}

fn read_prefixed_line(reader: &mut BufReader<TcpStream>, prefix: u8) -> Option<i64> {
    let mut line = Vec::new();
    let n = reader.read_until(b'\n', &mut line).ok()?;
    if n == 0 || line.first() != Some(&prefix) || !line.ends_with(b"\r\n") {
        return None;
    }
    std::str::from_utf8(&line[1..line.len() - 2])
        .ok()?
        .parse()
        .ok()
}

fn handle_command(
    command: &[String],
    queued: &mut Option<Vec<Vec<String>>>,
    shared: &Shared,
) -> Vec<u8> {
    let name = command[0].to_ascii_uppercase();

    match name.as_str() {
        "MULTI" => {
            *queued = Some(Vec::new());
            return ok();
        }
        "EXEC" => {
            let commands = queued.take().unwrap_or_default();
            let mut reply = format!("*{}\r\n", commands.len()).into_bytes();
            for queued_command in &commands {
                reply.extend(execute_data(queued_command, shared));
            }
            return reply;
        }
        "AUTH" | "WATCH" | "UNWATCH" => return ok(),
        "SCAN" => return scan(command, shared),
        "CLUSTER" => return cluster_slots(shared),
        _ => {}
    }

    if let Some(denied) = behavior_reply(shared) {
        // Behavior errors fire at queue time too, like a real cluster.
        return denied;
    }

    if let Some(queue) = queued.as_mut() {
        queue.push(command.to_vec());
        return b"+QUEUED\r\n".to_vec();
    }

    execute_data(command, shared)
}

fn behavior_reply(shared: &Shared) -> Option<Vec<u8>> {
    let behavior = shared.behavior.lock().unwrap();
    if behavior.cluster_down {
        return Some(error("CLUSTERDOWN The cluster is down"));
    }
    if let Some((slot, ref host, port)) = behavior.moved {
        return Some(error(&format!("MOVED {} {}:{}", slot, host, port)));
    }
    None
}

fn execute_data(command: &[String], shared: &Shared) -> Vec<u8> {
    if let Some(denied) = behavior_reply(shared) {
        return denied;
    }

    let mut store = shared.store.lock().unwrap();
    let name = command[0].to_ascii_uppercase();
    match name.as_str() {
        "GET" => match store.get(&command[1]) {
            Some(entry) => bulk(&entry.value),
            None => nil(),
        },
        "SET" => {
            let key = &command[1];
            let value = &command[2];
            let mut nx = false;
            let mut xx = false;
            let mut keep_ttl = false;
            let mut exat = None;
            let mut index = 3;
            while index < command.len() {
                match command[index].to_ascii_uppercase().as_str() {
                    "NX" => nx = true,
                    "XX" => xx = true,
                    "KEEPTTL" => keep_ttl = true,
                    "EXAT" => {
                        index += 1;
                        exat = command.get(index).and_then(|v| v.parse().ok());
                    }
                    _ => {}
                }
                index += 1;
            }

            let exists = store.contains_key(key);
            if (nx && exists) || (xx && !exists) {
                return nil();
            }
            let expire_at = match (exat, keep_ttl) {
                (Some(ts), _) => Some(ts),
                (None, true) => store.get(key).and_then(|e| e.expire_at),
                (None, false) => None,
            };
            store.insert(
                key.clone(),
                Entry {
                    value: value.clone(),
                    expire_at,
                },
            );
            ok()
        }
        "INCR" => {
            let key = &command[1];
            let current: i64 = store
                .get(key)
                .and_then(|e| e.value.parse().ok())
                .unwrap_or(0);
            let next = current + 1;
            let expire_at = store.get(key).and_then(|e| e.expire_at);
            store.insert(
                key.clone(),
                Entry {
                    value: next.to_string(),
                    expire_at,
                },
            );
            integer(next)
        }
        "UNLINK" => {
            let removed = command[1..]
                .iter()
                .filter(|key| store.remove(*key).is_some())
                .count();
            integer(removed as i64)
        }
        "EXPIREAT" => {
            let key = &command[1];
            let ts: i64 = command[2].parse().unwrap_or(0);
            match store.get_mut(key) {
                Some(entry) => {
                    entry.expire_at = Some(ts);
                    integer(1)
                }
                None => integer(0),
            }
        }
        "EXPIRETIME" => match store.get(&command[1]) {
            Some(entry) => integer(entry.expire_at.unwrap_or(-1)),
            None => integer(-2),
        },
        _ => error(&format!("ERR unknown command '{}'", command[0])),
    }
}

fn scan(command: &[String], shared: &Shared) -> Vec<u8> {
    // SCAN <cursor> MATCH <pattern>; everything fits on one page.
    let pattern = command
        .iter()
        .position(|arg| arg.eq_ignore_ascii_case("MATCH"))
        .and_then(|at| command.get(at + 1))
        .cloned()
        .unwrap_or_else(|| "*".to_string());

    let store = shared.store.lock().unwrap();
    let mut keys: Vec<&String> = store
        .keys()
        .filter(|key| glob_match(&pattern, key))
        .collect();
    keys.sort();

    let mut reply = b"*2\r\n$1\r\n0\r\n".to_vec();
    reply.extend(format!("*{}\r\n", keys.len()).into_bytes());
    for key in keys {
        reply.extend(bulk(key));
    }
    reply
}

fn glob_match(pattern: &str, key: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => key.starts_with(prefix),
        None => key == pattern,
    }
}

fn cluster_slots(shared: &Shared) -> Vec<u8> {
    let queued = shared.slots_queue.lock().unwrap().pop_front();
    let rows = match queued {
        Some(rows) => rows,
        None => {
            if shared.behavior.lock().unwrap().fail_cluster_slots {
                return error("ERR This instance has cluster support disabled");
            }
            shared.slots_default.lock().unwrap().clone()
        }
    };
    if rows.is_empty() {
        return error("ERR This instance has cluster support disabled");
    }

    let mut reply = format!("*{}\r\n", rows.len()).into_bytes();
    for (start, end, host, port) in rows {
        reply.extend(b"*3\r\n");
        reply.extend(integer(i64::from(start)));
        reply.extend(integer(i64::from(end)));
        reply.extend(b"*2\r\n");
        reply.extend(bulk(&host));
        reply.extend(integer(i64::from(port)));
    }
    reply
}

fn ok() -> Vec<u8> {
    b"+OK\r\n".to_vec()
}

fn nil() -> Vec<u8> {
    b"$-1\r\n".to_vec()
}

fn error(message: &str) -> Vec<u8> {
    format!("-{}\r\n", message).into_bytes()
}

fn integer(value: i64) -> Vec<u8> {
    format!(":{}\r\n", value).into_bytes()
}

fn bulk(value: &str) -> Vec<u8> {
    format!("${}\r\n{}\r\n", value.len(), value).into_bytes()
}
