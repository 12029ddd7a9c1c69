//! Compact node/peer encodings (spec §4.1), grounded on the teacher's
//! `tracker/http.rs::peers` module, which hand-rolls the same kind of
//! fixed-size-record splitting for the HTTP tracker's compact peer list.

use byteorder::{BigEndian, ByteOrder};
use std::net::{Ipv4Addr, SocketAddrV4};

use crate::contact::Contact;
use crate::id::NodeId;

/// 6-byte compact peer form: `ipv4(4) ‖ port(2 BE)` (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerEntry([u8; 6]);

impl PeerEntry {
    pub fn from_addr(addr: SocketAddrV4) -> Self {
        let mut bytes = [0u8; 6];
        bytes[0..4].copy_from_slice(&addr.ip().octets());
        BigEndian::write_u16(&mut bytes[4..6], addr.port());
        PeerEntry(bytes)
    }

    pub fn addr(&self) -> SocketAddrV4 {
        let ip = Ipv4Addr::new(self.0[0], self.0[1], self.0[2], self.0[3]);
        let port = BigEndian::read_u16(&self.0[4..6]);
        SocketAddrV4::new(ip, port)
    }

    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != 6 {
            return None;
        }
        let mut out = [0u8; 6];
        out.copy_from_slice(bytes);
        Some(PeerEntry(out))
    }
}

/// Packs contacts into the concatenated 26-byte compact-node-info form.
pub fn pack_nodes(contacts: &[Contact]) -> Vec<u8> {
    let mut out = Vec::with_capacity(contacts.len() * 26);
    for contact in contacts {
        out.extend_from_slice(contact.id.as_bytes());
        out.extend_from_slice(&contact.addr.ip().octets());
        let mut port_buf = [0u8; 2];
        BigEndian::write_u16(&mut port_buf, contact.addr.port());
        out.extend_from_slice(&port_buf);
    }
    out
}

/// Parses the 26-byte-record compact-node-info form. A trailing partial
/// record is discarded best-effort, per spec §4.1.
pub fn parse_nodes(bytes: &[u8]) -> Vec<Contact> {
    bytes
        .chunks_exact(26)
        .map(|chunk| {
            let id = NodeId::from_slice(&chunk[0..20]).expect("chunk is exactly 20 bytes");
            let ip = Ipv4Addr::new(chunk[20], chunk[21], chunk[22], chunk[23]);
            let port = BigEndian::read_u16(&chunk[24..26]);
            Contact::new(id, SocketAddrV4::new(ip, port))
        })
        .collect()
}

/// Packs peer endpoints into a list of 6-byte compact-peer-info strings.
pub fn pack_peers(peers: &[PeerEntry]) -> Vec<Vec<u8>> {
    peers.iter().map(|p| p.as_bytes().to_vec()).collect()
}

/// Parses a list of bencoded 6-byte strings into `PeerEntry`s. Entries of
/// the wrong length are skipped best-effort.
pub fn parse_peers(values: &[Vec<u8>]) -> Vec<PeerEntry> {
    values
        .iter()
        .filter_map(|v| PeerEntry::from_bytes(v))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_contact() -> impl Strategy<Value = Contact> {
        (
            any::<[u8; 20]>(),
            any::<[u8; 4]>(),
            1u16..65535,
        )
            .prop_map(|(id, ip, port)| {
                Contact::new(
                    NodeId::from_bytes(id),
                    SocketAddrV4::new(Ipv4Addr::from(ip), port),
                )
            })
    }

    #[test]
    fn peer_entry_round_trips() {
        let addr = SocketAddrV4::new(Ipv4Addr::new(1, 2, 3, 4), 6881);
        let entry = PeerEntry::from_addr(addr);
        assert_eq!(entry.addr(), addr);
        assert_eq!(entry.as_bytes(), &[1, 2, 3, 4, 0x1a, 0xe1]);
    }

    #[test]
    fn parse_nodes_discards_trailing_partial_record() {
        let contacts = vec![Contact::new(
            NodeId::random(),
            SocketAddrV4::new(Ipv4Addr::new(127, 0, 0, 1), 6881),
        )];
        let mut bytes = pack_nodes(&contacts);
        bytes.extend_from_slice(&[1, 2, 3]); // trailing partial record
        let parsed = parse_nodes(&bytes);
        assert_eq!(parsed, contacts);
    }

    proptest! {
        #[test]
        fn nodes_round_trip(contacts in proptest::collection::vec(arb_contact(), 0..16)) {
            let packed = pack_nodes(&contacts);
            let parsed = parse_nodes(&packed);
            prop_assert_eq!(parsed, contacts);
        }

        #[test]
        fn peers_round_trip(addrs in proptest::collection::vec((any::<[u8;4]>(), 1u16..65535), 0..16)) {
            let entries: Vec<PeerEntry> = addrs.iter()
                .map(|(ip, port)| PeerEntry::from_addr(SocketAddrV4::new(Ipv4Addr::from(*ip), *port)))
                .collect();
            let packed = pack_peers(&entries);
            let parsed = parse_peers(&packed);
            prop_assert_eq!(parsed, entries);
        }
    }
}
