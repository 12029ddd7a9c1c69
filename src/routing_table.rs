//! K-bucket routing table (spec §4.2), grounded on the bucket shape of
//! `other_examples/…wraith-discovery…dht-routing.rs.rs` (most-recent-at-end
//! ordering, move-to-front on refresh) and the split/no-split-on-full-leaf
//! distinction described in `other_examples/…NerfedChou…routing_table/`.
//! Implements design note §9's "proper tree-of-buckets with on-demand
//! splitting along the local ID's bit prefix", replacing the teacher's
//! (nonexistent, since it had none) best-effort single-bucket model.

use crate::contact::Contact;
use crate::id::NodeId;

/// Default bucket capacity (spec §3).
pub const K: usize = 8;

/// A single k-bucket. `range` buckets are the ones still covering the local
/// id's branch of the trie and are the only ones ever split further; once a
/// bucket is peeled off as a fixed (`range = false`) bucket it is frozen.
#[derive(Debug, Clone)]
struct Bucket {
    /// Depth (number of leading bits shared with the local id) this bucket
    /// sits at in the trie.
    prefix_len: usize,
    range: bool,
    contacts: Vec<Contact>,
}

impl Bucket {
    fn position_of(&self, id: &NodeId) -> Option<usize> {
        self.contacts.iter().position(|c| &c.id == id)
    }
}

#[derive(Debug)]
pub struct RoutingTable {
    local_id: NodeId,
    k: usize,
    buckets: Vec<Bucket>,
}

impl RoutingTable {
    pub fn new(local_id: NodeId) -> Self {
        Self::with_capacity(local_id, K)
    }

    pub fn with_capacity(local_id: NodeId, k: usize) -> Self {
        RoutingTable {
            local_id,
            k,
            buckets: vec![Bucket {
                prefix_len: 0,
                range: true,
                contacts: Vec::new(),
            }],
        }
    }

    pub fn local_id(&self) -> NodeId {
        self.local_id
    }

    /// Index of the bucket whose coverage exactly matches the
    /// first-differing-bit distance `fdb`, given the current split state.
    fn bucket_index_for(&self, fdb: usize) -> usize {
        self.buckets
            .iter()
            .position(|b| !b.range && b.prefix_len == fdb)
            .unwrap_or(self.buckets.len() - 1)
    }

    /// Inserts or refreshes a contact (spec §4.2). The local id is never
    /// stored. Returns `true` if the contact ends up present in the table
    /// (inserted or refreshed), `false` if it was dropped.
    pub fn add(&mut self, contact: Contact) -> bool {
        if contact.id == self.local_id {
            return false;
        }
        let Some(fdb) = self.local_id.first_differing_bit(&contact.id) else {
            return false;
        };

        loop {
            let idx = self.bucket_index_for(fdb);
            if let Some(pos) = self.buckets[idx].position_of(&contact.id) {
                // Reinsertion: refresh to the most-recently-seen end.
                let existing = self.buckets[idx].contacts.remove(pos);
                self.buckets[idx].contacts.push(existing);
                return true;
            }
            if self.buckets[idx].contacts.len() < self.k {
                self.buckets[idx].contacts.push(contact);
                return true;
            }
            if !self.buckets[idx].range {
                // Full, fixed bucket that doesn't cover the local prefix:
                // drop the newcomer (spec §4.2).
                return false;
            }
            self.split(idx);
            // Retry: the contact now routes into one of the two new buckets.
        }
    }

    /// Splits the full range bucket at `idx` along the next trie bit.
    fn split(&mut self, idx: usize) {
        let old = self.buckets.remove(idx);
        debug_assert!(old.range);
        let depth = old.prefix_len;

        let mut fixed = Bucket {
            prefix_len: depth,
            range: false,
            contacts: Vec::new(),
        };
        let mut range = Bucket {
            prefix_len: depth + 1,
            range: true,
            contacts: Vec::new(),
        };

        for contact in old.contacts {
            let fdb = self
                .local_id
                .first_differing_bit(&contact.id)
                .expect("local id is never stored in a bucket");
            if fdb == depth {
                fixed.contacts.push(contact);
            } else {
                range.contacts.push(contact);
            }
        }

        self.buckets.insert(idx, fixed);
        self.buckets.insert(idx + 1, range);
    }

    pub fn remove(&mut self, id: &NodeId) {
        for bucket in &mut self.buckets {
            if let Some(pos) = bucket.position_of(id) {
                bucket.contacts.remove(pos);
                return;
            }
        }
    }

    pub fn get(&self, id: &NodeId) -> Option<Contact> {
        self.buckets
            .iter()
            .flat_map(|b| b.contacts.iter())
            .find(|c| &c.id == id)
            .copied()
    }

    /// Finds a contact by endpoint rather than id — used where a response
    /// is known to have come from `addr` but the responder's id hasn't
    /// been threaded through the call site (spec §4.7's token bookkeeping).
    pub fn find_by_addr(&self, addr: std::net::SocketAddrV4) -> Option<Contact> {
        self.buckets
            .iter()
            .flat_map(|b| b.contacts.iter())
            .find(|c| c.addr == addr)
            .copied()
    }

    /// Up to `n` contacts sorted ascending by XOR distance to `target`
    /// (spec §4.2). Ties break by insertion order, preserved by a stable
    /// sort over the buckets-in-order traversal.
    pub fn closest(&self, target: &NodeId, n: usize) -> Vec<Contact> {
        let mut all: Vec<Contact> = self.buckets.iter().flat_map(|b| b.contacts.iter().copied()).collect();
        all.sort_by_key(|c| target.distance(&c.id));
        all.truncate(n);
        all
    }

    pub fn count(&self) -> usize {
        self.buckets.iter().map(|b| b.contacts.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }
}
