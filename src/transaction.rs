//! Transaction registry (spec §4.4), redesigned per design note §9: each
//! query is an awaitable (a `tokio::oneshot::Receiver`) that completes on
//! response or timeout rather than a stored callback. Cancellation is
//! implicit in dropping the receiver; at-most-once resolution falls out of
//! `HashMap::remove` owning the single `Sender` rather than needing a
//! separate idempotence wrapper.

use std::collections::HashMap;
use std::net::SocketAddrV4;

use tokio::sync::oneshot;

use crate::bencode::Message;

type Key = (SocketAddrV4, u16);

#[derive(Debug, Default)]
pub struct TransactionRegistry {
    next_tid: HashMap<SocketAddrV4, u16>,
    pending: HashMap<Key, oneshot::Sender<Message>>,
}

impl TransactionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the next transaction id for `endpoint`. Starts at 1 and
    /// wraps at 2^16 (spec §4.4); collisions with a still-pending
    /// transaction after wraparound are an accepted open question (see
    /// DESIGN.md), not defended against here.
    fn alloc_tid(&mut self, endpoint: SocketAddrV4) -> u16 {
        let slot = self.next_tid.entry(endpoint).or_insert(0);
        *slot = slot.wrapping_add(1);
        *slot
    }

    /// Registers a pending outgoing query, returning its transaction id and
    /// an awaitable that resolves when a matching response/error arrives.
    pub fn register(&mut self, endpoint: SocketAddrV4) -> (u16, oneshot::Receiver<Message>) {
        let tid = self.alloc_tid(endpoint);
        let (tx, rx) = oneshot::channel();
        self.pending.insert((endpoint, tid), tx);
        (tid, rx)
    }

    /// Resolves a pending transaction with an inbound message. Returns
    /// `false` if no matching transaction was pending (spec §4.5's
    /// "unmatched" case — the caller should then reply 201 or warn).
    pub fn resolve(&mut self, endpoint: SocketAddrV4, tid: u16, message: Message) -> bool {
        match self.pending.remove(&(endpoint, tid)) {
            Some(tx) => {
                // Ignore send failure: the awaiting receiver was dropped,
                // meaning the caller already gave up (e.g. timed out).
                let _ = tx.send(message);
                true
            }
            None => false,
        }
    }

    /// Clears a slot without resolving it (the timeout path; spec §4.4).
    pub fn cancel(&mut self, endpoint: SocketAddrV4, tid: u16) {
        self.pending.remove(&(endpoint, tid));
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Shutdown (spec §5): drops all pending senders without resolving
    /// them. Any awaiting receiver observes a closed channel, which its
    /// caller must treat as terminal.
    pub fn destroy(&mut self) {
        self.pending.clear();
        self.next_tid.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bencode::Dict;
    use std::net::{Ipv4Addr, SocketAddrV4};

    fn endpoint() -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::new(127, 0, 0, 1), 6881)
    }

    fn response(tid: &[u8]) -> Message {
        Message::Response {
            tid: tid.to_vec(),
            result: Dict::new(),
        }
    }

    #[test]
    fn tids_are_monotonic_and_start_at_one() {
        let mut reg = TransactionRegistry::new();
        let (t1, _r1) = reg.register(endpoint());
        let (t2, _r2) = reg.register(endpoint());
        assert_eq!(t1, 1);
        assert_eq!(t2, 2);
    }

    #[test]
    fn concurrently_pending_tids_for_one_endpoint_are_unique() {
        let mut reg = TransactionRegistry::new();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..50 {
            let (tid, _rx) = reg.register(endpoint());
            assert!(seen.insert(tid), "tid reused while still pending");
        }
    }

    #[tokio::test]
    async fn resolve_delivers_to_the_awaiting_receiver() {
        let mut reg = TransactionRegistry::new();
        let (tid, rx) = reg.register(endpoint());
        assert!(reg.resolve(endpoint(), tid, response(b"\x00\x01")));
        let msg = rx.await.unwrap();
        assert_eq!(msg.tid(), b"\x00\x01");
    }

    #[test]
    fn resolve_of_unknown_transaction_returns_false() {
        let mut reg = TransactionRegistry::new();
        assert!(!reg.resolve(endpoint(), 999, response(b"\x03\xe7")));
    }

    #[tokio::test]
    async fn cancel_drops_receiver_without_resolving() {
        let mut reg = TransactionRegistry::new();
        let (tid, rx) = reg.register(endpoint());
        reg.cancel(endpoint(), tid);
        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn destroy_drops_all_pending_without_resolving() {
        let mut reg = TransactionRegistry::new();
        let (_t1, rx1) = reg.register(endpoint());
        let (_t2, rx2) = reg.register(endpoint());
        reg.destroy();
        assert!(rx1.await.is_err());
        assert!(rx2.await.is_err());
    }
}
