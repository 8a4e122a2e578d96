//! Slot-range to node mapping

use std::collections::BTreeMap;

use super::node::ClusterNode;
use super::slot::{SlotRange, SLOT_COUNT};
use crate::store::StorageId;

/// Ordered mapping from slot ranges to their owning nodes.
///
/// A freshly published `CLUSTER SLOTS` yields pairwise non-overlapping
/// ranges; lookups probe with a synthetic `[slot, 16383]` range and then
/// confirm containment, so transiently inconsistent content degrades to
/// "absent" rather than a wrong owner.
#[derive(Debug, Default, Clone)]
pub struct SlotMap {
    ranges: BTreeMap<SlotRange, ClusterNode>,
}

impl SlotMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn clear(&mut self) {
        self.ranges.clear();
    }

    pub fn insert(&mut self, range: SlotRange, node: ClusterNode) {
        self.ranges.insert(range, node);
    }

    /// Node owning `slot`, if any known range contains it.
    pub fn lookup_slot(&self, slot: u16) -> Option<&ClusterNode> {
        let probe = SlotRange::new(i64::from(slot), i64::from(SLOT_COUNT) - 1).ok()?;
        self.ranges
            .range(..=probe)
            .next_back()
            .filter(|(range, _)| range.contains(slot))
            .map(|(_, node)| node)
    }

    /// Node owning the identifier's slot.
    pub fn lookup(&self, id: &StorageId) -> Option<&ClusterNode> {
        self.lookup_slot(id.slot())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SlotRange, &ClusterNode)> {
        self.ranges.iter()
    }

    /// Distinct nodes present in the map, in range order with duplicates
    /// removed. A node owning several ranges appears once.
    pub fn distinct_nodes(&self) -> Vec<ClusterNode> {
        let mut nodes: Vec<ClusterNode> = Vec::new();
        for node in self.ranges.values() {
            if !nodes.contains(node) {
                nodes.push(node.clone());
            }
        }
        nodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map3() -> SlotMap {
        let mut map = SlotMap::new();
        map.insert(
            SlotRange::new(0, 5460).unwrap(),
            ClusterNode::new("a", 7000),
        );
        map.insert(
            SlotRange::new(5461, 10922).unwrap(),
            ClusterNode::new("b", 7001),
        );
        map.insert(
            SlotRange::new(10923, 16383).unwrap(),
            ClusterNode::new("c", 7002),
        );
        map
    }

    #[test]
    fn lookup_hits_unique_owner() {
        let map = map3();
        assert_eq!(map.lookup_slot(0).unwrap().host, "a");
        assert_eq!(map.lookup_slot(5460).unwrap().host, "a");
        assert_eq!(map.lookup_slot(5461).unwrap().host, "b");
        assert_eq!(map.lookup_slot(10922).unwrap().host, "b");
        assert_eq!(map.lookup_slot(10923).unwrap().host, "c");
        assert_eq!(map.lookup_slot(16383).unwrap().host, "c");
    }

    #[test]
    fn lookup_misses_gaps() {
        let mut map = SlotMap::new();
        map.insert(
            SlotRange::new(100, 200).unwrap(),
            ClusterNode::new("a", 7000),
        );
        map.insert(
            SlotRange::new(300, 400).unwrap(),
            ClusterNode::new("b", 7001),
        );
        assert!(map.lookup_slot(99).is_none());
        assert!(map.lookup_slot(201).is_none());
        assert!(map.lookup_slot(250).is_none());
        assert!(map.lookup_slot(401).is_none());
        assert!(map.lookup_slot(16383).is_none());
        assert_eq!(map.lookup_slot(100).unwrap().host, "a");
        assert_eq!(map.lookup_slot(400).unwrap().host, "b");
    }

    #[test]
    fn lookup_every_slot_finds_an_owner() {
        let map = map3();
        for slot in 0..SLOT_COUNT {
            assert!(map.lookup_slot(slot).is_some(), "slot {}", slot);
        }
    }

    #[test]
    fn lookup_by_id_matches_slot_lookup() {
        let map = map3();
        let id = StorageId::new("sessions", "abc", "");
        assert_eq!(map.lookup(&id), map.lookup_slot(id.slot()));
    }

    #[test]
    fn distinct_nodes_deduplicates() {
        let mut map = SlotMap::new();
        map.insert(
            SlotRange::new(0, 100).unwrap(),
            ClusterNode::new("a", 7000),
        );
        map.insert(
            SlotRange::new(200, 300).unwrap(),
            ClusterNode::new("a", 7000),
        );
        map.insert(
            SlotRange::new(301, 400).unwrap(),
            ClusterNode::new("b", 7001),
        );
        assert_eq!(map.distinct_nodes().len(), 2);
    }
}
