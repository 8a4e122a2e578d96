//! Cluster routing
//!
//! Hash-slot arithmetic, the slot-range to node map, and the router
//! that dispatches operations to the owning node and recovers from
//! `MOVED` redirections and lost connections.

pub mod node;
pub mod router;
pub mod slot;
pub mod slot_map;

pub use node::ClusterNode;
pub use router::ClusterRouter;
pub use slot::{crc16, crc16_update, slot_for_key, SlotRange, SLOT_COUNT};
pub use slot_map::SlotMap;
