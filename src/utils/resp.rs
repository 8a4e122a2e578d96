//! RESP2 protocol encoding and decoding
//!
//! Commands are always encoded as arrays of bulk strings built from
//! explicit argument slices; replies are decoded from any buffered
//! reader, one value at a time, so pipelined responses can be drained
//! reply by reply.

use std::io::{self, BufRead};

/// One decoded server reply.
#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    /// `+OK\r\n`
    SimpleString(String),
    /// `-ERR message\r\n`
    Error(String),
    /// `:42\r\n`
    Integer(i64),
    /// `$5\r\nhello\r\n`
    BulkString(Vec<u8>),
    /// `$-1\r\n` or `*-1\r\n`
    Null,
    /// `*N\r\n…`
    Array(Vec<RespValue>),
}

impl RespValue {
    pub fn is_nil(&self) -> bool {
        matches!(self, RespValue::Null)
    }

    pub fn as_status(&self) -> Option<&str> {
        match self {
            RespValue::SimpleString(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            RespValue::SimpleString(s) => Some(s),
            RespValue::BulkString(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            RespValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[RespValue]> {
        match self {
            RespValue::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Short name of the value's wire type, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            RespValue::SimpleString(_) => "status",
            RespValue::Error(_) => "error",
            RespValue::Integer(_) => "integer",
            RespValue::BulkString(_) => "string",
            RespValue::Null => "nil",
            RespValue::Array(_) => "array",
        }
    }
}

/// Accumulates one or more encoded commands for a single write.
///
/// Reused across calls; `clear` between unrelated pipelines.
pub struct RespEncoder {
    buf: Vec<u8>,
    commands: usize,
}

impl RespEncoder {
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            commands: 0,
        }
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.commands = 0;
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Number of commands appended since the last `clear`.
    pub fn command_count(&self) -> usize {
        self.commands
    }

    /// Append one command as a RESP array of bulk strings.
    pub fn push_command(&mut self, args: &[&[u8]]) {
        self.buf.push(b'*');
        self.push_len(args.len());
        for arg in args {
            self.buf.push(b'$');
            self.push_len(arg.len());
            self.buf.extend_from_slice(arg);
            self.buf.extend_from_slice(b"\r\n");
        }
        self.commands += 1;
    }

    /// Append one command given as string slices.
    pub fn push_command_str(&mut self, args: &[&str]) {
        self.buf.push(b'*');
        self.push_len(args.len());
        for arg in args {
            self.buf.push(b'$');
            self.push_len(arg.len());
            self.buf.extend_from_slice(arg.as_bytes());
            self.buf.extend_from_slice(b"\r\n");
        }
        self.commands += 1;
    }

    #[inline]
    fn push_len(&mut self, len: usize) {
        let mut itoa_buf = itoa::Buffer::new();
        self.buf.extend_from_slice(itoa_buf.format(len).as_bytes());
        self.buf.extend_from_slice(b"\r\n");
    }
}

impl Default for RespEncoder {
    fn default() -> Self {
        Self::new()
    }
}

fn bad_data(what: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, what.into())
}

/// Read one `\r\n`-terminated line, excluding the terminator.
fn read_line<R: BufRead>(reader: &mut R, line: &mut Vec<u8>) -> io::Result<()> {
    line.clear();
    let n = reader.read_until(b'\n', line)?;
    if n == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed by server",
        ));
    }
    if !line.ends_with(b"\r\n") {
        return Err(bad_data("RESP line missing CRLF terminator"));
    }
    line.truncate(line.len() - 2);
    Ok(())
}

fn parse_i64(digits: &[u8]) -> io::Result<i64> {
    std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| bad_data("invalid RESP integer"))
}

/// Decode a single reply from `reader`.
///
/// Blocks until a full value is available; nested arrays are decoded
/// recursively.
pub fn decode_value<R: BufRead>(reader: &mut R) -> io::Result<RespValue> {
    let mut line = Vec::with_capacity(64);
    read_line(reader, &mut line)?;
    if line.is_empty() {
        return Err(bad_data("empty RESP line"));
    }

    let payload = &line[1..];
    match line[0] {
        b'+' => Ok(RespValue::SimpleString(
            String::from_utf8_lossy(payload).into_owned(),
        )),
        b'-' => Ok(RespValue::Error(
            String::from_utf8_lossy(payload).into_owned(),
        )),
        b':' => Ok(RespValue::Integer(parse_i64(payload)?)),
        b'$' => {
            let len = parse_i64(payload)?;
            if len < 0 {
                return Ok(RespValue::Null);
            }
            let mut data = vec![0u8; len as usize];
            reader.read_exact(&mut data)?;
            let mut crlf = [0u8; 2];
            reader.read_exact(&mut crlf)?;
            if &crlf != b"\r\n" {
                return Err(bad_data("bulk string missing CRLF terminator"));
            }
            Ok(RespValue::BulkString(data))
        }
        b'*' => {
            let len = parse_i64(payload)?;
            if len < 0 {
                return Ok(RespValue::Null);
            }
            let mut items = Vec::with_capacity(len as usize);
            for _ in 0..len {
                items.push(decode_value(reader)?);
            }
            Ok(RespValue::Array(items))
        }
        other => Err(bad_data(format!(
            "invalid RESP type byte 0x{:02x}",
            other
        ))),
    }
}
