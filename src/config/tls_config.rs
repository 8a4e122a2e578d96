//! TLS configuration

use std::path::PathBuf;

/// TLS material for server connections.
///
/// `client_cert` and `client_key` must be set together; when both are
/// present the connection authenticates with mTLS. `ca_bundle` points at
/// a PEM file, `ca_directory` at a directory whose PEM files are all
/// trusted in addition to the system roots.
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    pub client_cert: Option<PathBuf>,
    pub client_key: Option<PathBuf>,
    pub ca_bundle: Option<PathBuf>,
    pub ca_directory: Option<PathBuf>,
}

impl TlsConfig {
    /// True when a client certificate and key are both configured.
    pub fn has_client_identity(&self) -> bool {
        self.client_cert.is_some() && self.client_key.is_some()
    }
}
