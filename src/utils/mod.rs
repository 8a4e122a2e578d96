//! Utility modules

pub mod error;
pub mod resp;

pub use error::{Result, StoreError};
pub use resp::{decode_value, RespEncoder, RespValue};
