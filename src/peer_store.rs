//! Peer store (spec §4.8 component list / §3): `info_hash -> set<PeerEntry>`
//! learned via `announce_peer`. No TTL/eviction (spec §9, flagged as future
//! work).

use std::collections::{HashMap, HashSet};

use crate::compact::PeerEntry;
use crate::id::NodeId;

#[derive(Debug, Default)]
pub struct PeerStore {
    peers: HashMap<NodeId, HashSet<PeerEntry>>,
}

impl PeerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a peer under `info_hash`. Duplicates (byte-equal 6-byte
    /// compact form) are suppressed by `HashSet` membership (spec §3).
    pub fn insert(&mut self, info_hash: NodeId, peer: PeerEntry) {
        self.peers.entry(info_hash).or_default().insert(peer);
    }

    pub fn remove(&mut self, info_hash: &NodeId, peer: &PeerEntry) {
        if let Some(set) = self.peers.get_mut(info_hash) {
            set.remove(peer);
            if set.is_empty() {
                self.peers.remove(info_hash);
            }
        }
    }

    pub fn get(&self, info_hash: &NodeId) -> Vec<PeerEntry> {
        self.peers
            .get(info_hash)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn has_peers(&self, info_hash: &NodeId) -> bool {
        self.peers.get(info_hash).is_some_and(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, SocketAddrV4};

    fn entry(port: u16) -> PeerEntry {
        PeerEntry::from_addr(SocketAddrV4::new(Ipv4Addr::new(1, 2, 3, 4), port))
    }

    #[test]
    fn duplicates_are_suppressed() {
        let mut store = PeerStore::new();
        let h = NodeId::random();
        store.insert(h, entry(6881));
        store.insert(h, entry(6881));
        assert_eq!(store.get(&h).len(), 1);
    }

    #[test]
    fn remove_matching_entry() {
        let mut store = PeerStore::new();
        let h = NodeId::random();
        store.insert(h, entry(6881));
        store.insert(h, entry(6882));
        store.remove(&h, &entry(6881));
        let remaining = store.get(&h);
        assert_eq!(remaining, vec![entry(6882)]);
    }

    #[test]
    fn remove_of_absent_entry_is_noop() {
        let mut store = PeerStore::new();
        let h = NodeId::random();
        store.remove(&h, &entry(6881)); // should not panic
        assert!(store.get(&h).is_empty());
    }
}
