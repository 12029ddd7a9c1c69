//! The node's event surface (spec §6, redesigned per design note §9): a
//! small explicit enum delivered over a `tokio::sync::broadcast` channel,
//! replacing the teacher's absence of one (the teacher used direct
//! `log::*` calls and `anyhow::Result` returns instead of an event-emitter
//! surface) and the spec's described event-emitter pattern.

use std::net::SocketAddrV4;

use crate::id::NodeId;

#[derive(Debug, Clone)]
pub enum Event {
    Listening { port: u16 },
    Node { addr: SocketAddrV4, id: NodeId },
    Peer { addr: SocketAddrV4, info_hash: NodeId },
    Warning { message: String },
    Error { message: String },
}

/// Default channel depth: generous enough that a burst of warnings during
/// a lookup doesn't force-drop events before a subscriber drains them.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;
