use std::fmt;

use rand::RngCore;

/// A 160-bit DHT participant identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId([u8; 20]);

impl NodeId {
    pub const LEN: usize = 20;

    /// 160 uniformly-random bits, per spec §4.1.
    pub fn random() -> Self {
        let mut bytes = [0u8; 20];
        rand::thread_rng().fill_bytes(&mut bytes);
        NodeId(bytes)
    }

    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        NodeId(bytes)
    }

    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        if slice.len() != 20 {
            return None;
        }
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(slice);
        Some(NodeId(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// XOR distance, interpreted as a 160-bit unsigned integer (spec §3).
    ///
    /// Big-endian byte-wise XOR preserves numeric ordering, so `Distance`'s
    /// derived `Ord` is the metric's `Ord`.
    pub fn distance(&self, other: &NodeId) -> Distance {
        let mut out = [0u8; 20];
        for i in 0..20 {
            out[i] = self.0[i] ^ other.0[i];
        }
        Distance(out)
    }

    /// Index (0-159) of the first bit where `self` and `other` differ,
    /// counting from the most significant bit. `None` if the ids are equal.
    pub fn first_differing_bit(&self, other: &NodeId) -> Option<usize> {
        for (byte_index, (a, b)) in self.0.iter().zip(other.0.iter()).enumerate() {
            let xor = a ^ b;
            if xor != 0 {
                return Some(byte_index * 8 + xor.leading_zeros() as usize);
            }
        }
        None
    }

    /// Whether bit `index` (0 = most significant) of this id is set.
    pub fn bit(&self, index: usize) -> bool {
        let byte = index / 8;
        let shift = 7 - (index % 8);
        (self.0[byte] >> shift) & 1 == 1
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl AsRef<[u8]> for NodeId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// XOR distance between two `NodeId`s, totally ordered (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Distance([u8; 20]);

impl Distance {
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_id() -> impl Strategy<Value = NodeId> {
        any::<[u8; 20]>().prop_map(NodeId::from_bytes)
    }

    #[test]
    fn random_ids_differ() {
        let a = NodeId::random();
        let b = NodeId::random();
        assert_ne!(a, b);
    }

    #[test]
    fn distance_to_self_is_zero() {
        let a = NodeId::random();
        assert!(a.distance(&a).is_zero());
    }

    proptest! {
        #[test]
        fn distance_is_symmetric(a in arb_id(), b in arb_id()) {
            prop_assert_eq!(a.distance(&b), b.distance(&a));
        }

        #[test]
        fn distance_zero_iff_equal(a in arb_id(), b in arb_id()) {
            prop_assert_eq!(a.distance(&b).is_zero(), a == b);
        }

        #[test]
        fn distance_triangle_identity(a in arb_id(), b in arb_id(), c in arb_id()) {
            // d(a,c) <= d(a,b) XOR d(b,c), bitwise, per spec §8.
            let dac = a.distance(&c);
            let dab = a.distance(&b);
            let dbc = b.distance(&c);
            let mut bound = [0u8; 20];
            for i in 0..20 {
                bound[i] = dab.0[i] ^ dbc.0[i];
            }
            prop_assert!(dac <= Distance(bound));
        }
    }
}
