//! Error types for redis-context-store

use thiserror::Error;

/// Failure classes surfaced by the storage engine.
///
/// These map one-to-one onto the recovery behavior of the cluster router:
/// `ConnectionLost` and `Redirected` are transient and trigger the
/// backoff/rebuild cycle, `Protocol` fails the current call, `Fatal` means
/// the engine as a whole is unusable (no reachable node).
///
/// Two conditions are deliberately *not* errors but return values: a
/// compare-and-set version mismatch is `-1`, and exhausting the
/// optimistic-concurrency retries yields version `0`.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("connection to Redis lost: {0}")]
    ConnectionLost(String),

    #[error("operation redirected to {host}:{port}")]
    Redirected { host: String, port: u16 },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("fatal storage failure: {0}")]
    Fatal(String),
}

impl StoreError {
    /// Transient failures are the ones the router may retry after a
    /// backoff and slot-map rebuild.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::ConnectionLost(_) | StoreError::Redirected { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
