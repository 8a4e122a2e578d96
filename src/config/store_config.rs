//! Storage engine configuration
//!
//! Plain records only; parsing these out of a configuration document is
//! the host's concern.

use std::fmt;

use super::tls_config::TlsConfig;

/// A configured Redis endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAddress {
    pub host: String,
    pub port: u16,
}

impl ServerAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Authentication credentials.
///
/// Absence of the whole struct disables authentication; a password alone
/// sends `AUTH <password>`, a username as well sends the ACL-style
/// `AUTH <username> <password>`.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub password: String,
    pub username: Option<String>,
}

/// Connection, retry and key-composition parameters for the engine.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Default endpoint when no cluster seeds are configured.
    pub host: String,
    pub port: u16,
    /// Prepended to every key, between context and caller key.
    pub prefix: String,
    /// Cluster seed nodes; non-empty switches the engine to cluster mode.
    pub initial_nodes: Vec<ServerAddress>,
    /// Milliseconds; 0 = transport default.
    pub connect_timeout_ms: u64,
    /// Milliseconds; 0 = transport default.
    pub command_timeout_ms: u64,
    /// Advisory request for a non-blocking connect.
    pub non_blocking: bool,
    pub auth: Option<AuthConfig>,
    /// Router retries after transient failures.
    pub max_retries: u32,
    /// Base backoff in milliseconds, doubled per attempt.
    pub base_wait_ms: u64,
    /// Backoff cap in milliseconds; 0 = unbounded.
    pub max_wait_ms: u64,
    pub tls: Option<TlsConfig>,
}

impl StoreConfig {
    /// Cluster mode is implied by the presence of seed nodes.
    pub fn clustered(&self) -> bool {
        !self.initial_nodes.is_empty()
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            prefix: String::new(),
            initial_nodes: Vec::new(),
            connect_timeout_ms: 0,
            command_timeout_ms: 0,
            non_blocking: false,
            auth: None,
            max_retries: 5,
            base_wait_ms: 500,
            max_wait_ms: 0,
            tls: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = StoreConfig::default();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 6379);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.base_wait_ms, 500);
        assert_eq!(config.max_wait_ms, 0);
        assert!(!config.clustered());
    }

    #[test]
    fn seeds_switch_to_cluster_mode() {
        let config = StoreConfig {
            initial_nodes: vec![ServerAddress::new("10.0.0.1", 7000)],
            ..StoreConfig::default()
        };
        assert!(config.clustered());
    }
}
