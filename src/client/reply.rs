//! Typed reply validation and error-reply classification
//!
//! Every reply read off a connection passes through [`Reply::classify`]
//! first, so `MOVED` and `CLUSTERDOWN` error replies become control-flow
//! errors before any type checking happens. The remaining accessors turn
//! unexpected reply shapes into [`StoreError::Protocol`].

use tracing::{error, warn};

use crate::utils::{RespValue, Result, StoreError};

/// Classify an error-reply string into the matching failure kind.
///
/// `MOVED <slot> <host>:<port>` raises the redirection that drives the
/// router's reconfiguration; `CLUSTERDOWN …` is treated as a transient
/// connection loss so the same rebuild path runs; anything else is a
/// protocol failure of the current call.
pub fn classify_error_reply(fn_name: &str, command: &str, message: &str) -> StoreError {
    if let Some(rest) = message.strip_prefix("MOVED ") {
        warn!(
            "Redis cluster configuration changed: reconfiguring caused by error: MOVED {}",
            rest
        );
        let (host, port) = parse_moved_target(rest);
        return StoreError::Redirected { host, port };
    }

    if message.starts_with("CLUSTERDOWN") {
        return StoreError::ConnectionLost(
            "CLUSTERDOWN received: Redis cluster is unavailable at the moment".to_string(),
        );
    }

    StoreError::Protocol(format!("{}: {}: {}", fn_name, command, message))
}

/// Extract `(host, port)` from the remainder of a `MOVED` error
/// (`<slot> <host>:<port>`). The port falls back to 6379 when it cannot
/// be parsed.
fn parse_moved_target(rest: &str) -> (String, u16) {
    let target = rest.split_whitespace().nth(1).unwrap_or("");
    match target.rsplit_once(':') {
        Some((host, port_str)) => match port_str.parse::<u16>() {
            Ok(port) => (host.to_string(), port),
            Err(_) => {
                error!(
                    "malformed MOVED redirection: `{}' is not a port number, trying 6379",
                    port_str
                );
                (host.to_string(), 6379)
            }
        },
        None => {
            error!(
                "malformed MOVED redirection: no port in target `{}', trying 6379",
                target
            );
            (target.to_string(), 6379)
        }
    }
}

/// Owner of one classified server reply with typed accessors.
#[derive(Debug)]
pub struct Reply {
    value: RespValue,
}

impl Reply {
    /// Wrap a decoded reply, converting error replies into `Err`.
    pub fn classify(value: RespValue, fn_name: &str, command: &str) -> Result<Self> {
        if let RespValue::Error(ref message) = value {
            return Err(classify_error_reply(fn_name, command, message));
        }
        Ok(Self { value })
    }

    /// Wrap a sub-element of an array reply; elements carry no error
    /// replies once the surrounding reply has been classified.
    pub fn of_element(value: &RespValue) -> Self {
        Self {
            value: value.clone(),
        }
    }

    pub fn value(&self) -> &RespValue {
        &self.value
    }

    pub fn is_nil(&self) -> bool {
        self.value.is_nil()
    }

    fn mismatch(&self, fn_name: &str, expected: &str) -> StoreError {
        StoreError::Protocol(format!(
            "({}) incorrect response from Redis server: expected {} but got {}",
            fn_name,
            expected,
            self.value.type_name()
        ))
    }

    pub fn expect_status(&self, fn_name: &str) -> Result<&str> {
        self.value
            .as_status()
            .ok_or_else(|| self.mismatch(fn_name, "status"))
    }

    pub fn expect_integer(&self, fn_name: &str) -> Result<i64> {
        self.value
            .as_i64()
            .ok_or_else(|| self.mismatch(fn_name, "integer"))
    }

    pub fn expect_array(&self, fn_name: &str) -> Result<&[RespValue]> {
        self.value
            .as_array()
            .ok_or_else(|| self.mismatch(fn_name, "array"))
    }

    /// Bulk-string payload as text. Invalid UTF-8 is replaced rather
    /// than failed: stored values enter the crate as `&str`, so lossy
    /// decoding only triggers on foreign data.
    pub fn expect_string(&self, fn_name: &str) -> Result<String> {
        match self.value {
            RespValue::BulkString(ref bytes) => {
                Ok(String::from_utf8_lossy(bytes).into_owned())
            }
            _ => Err(self.mismatch(fn_name, "string")),
        }
    }
}
