//! Configuration module

pub mod store_config;
pub mod tls_config;

pub use store_config::{AuthConfig, ServerAddress, StoreConfig};
pub use tls_config::TlsConfig;
