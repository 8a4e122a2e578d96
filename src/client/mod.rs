//! Client connection layer

pub mod connection;
pub mod raw_connection;
pub mod reply;

pub use connection::{KeyVisitor, NodeConnection, ScanSession};
pub use raw_connection::{ConnectionFactory, RawConnection};
pub use reply::Reply;
