//! Server-side query handlers (spec §4.6). Pure functions over explicit
//! state references so they're trivially unit-testable without spinning up
//! a socket; `engine.rs` is the only caller in the running node.

use std::net::SocketAddrV4;

use crate::bencode::{
    dict_get_bytes, dict_get_id, dict_get_int, dict_set_bytes, dict_set_list_of_bytes, Dict,
    Message,
};
use crate::compact::{self, PeerEntry};
use crate::id::NodeId;
use crate::peer_store::PeerStore;
use crate::routing_table::RoutingTable;
use crate::token::{Token, TokenAuthority};

pub struct HandlerContext<'a> {
    pub local_id: NodeId,
    pub routing_table: &'a mut RoutingTable,
    pub peer_store: &'a mut PeerStore,
    pub tokens: &'a mut TokenAuthority,
    pub k: usize,
}

/// Dispatches a decoded query to the matching verb handler (spec §4.6).
/// `tid`/`src` are needed to shape the reply envelope and to bind the
/// issued token/announced peer to the sender's address.
pub fn handle_query(
    ctx: &mut HandlerContext<'_>,
    verb: &str,
    args: &Dict,
    tid: Vec<u8>,
    src: SocketAddrV4,
) -> Message {
    match verb {
        "ping" => handle_ping(ctx, tid),
        "find_node" => handle_find_node(ctx, args, tid),
        "get_peers" => handle_get_peers(ctx, args, tid, src),
        "announce_peer" => handle_announce_peer(ctx, args, tid, src),
        other => error_reply(tid, 204, format!("unexpected query type {other}")),
    }
}

fn error_reply(tid: Vec<u8>, code: i64, message: String) -> Message {
    Message::Error { tid, code, message }
}

fn base_result(local_id: NodeId) -> Dict {
    let mut result = Dict::new();
    dict_set_bytes(&mut result, "id", local_id.as_bytes().to_vec());
    result
}

fn handle_ping(ctx: &mut HandlerContext<'_>, tid: Vec<u8>) -> Message {
    Message::Response {
        tid,
        result: base_result(ctx.local_id),
    }
}

fn handle_find_node(ctx: &mut HandlerContext<'_>, args: &Dict, tid: Vec<u8>) -> Message {
    let Some(target) = dict_get_id(args, "target") else {
        return error_reply(tid, 203, "protocol error: missing target".to_string());
    };

    let mut result = base_result(ctx.local_id);
    // Spec §4.6 permits answering with the exact-match contact alone when
    // the target is already known, but always returns the k-nearest set
    // instead (a known contact is its own closest node, so it's included
    // regardless) to match the worked example in spec §8 scenario 2.
    let nodes = ctx.routing_table.closest(&target, ctx.k);
    dict_set_bytes(&mut result, "nodes", compact::pack_nodes(&nodes));
    Message::Response { tid, result }
}

fn handle_get_peers(
    ctx: &mut HandlerContext<'_>,
    args: &Dict,
    tid: Vec<u8>,
    src: SocketAddrV4,
) -> Message {
    let Some(info_hash) = dict_get_id(args, "info_hash") else {
        return error_reply(tid, 203, "protocol error: missing info_hash".to_string());
    };

    let mut result = base_result(ctx.local_id);
    let token = ctx.tokens.issue(*src.ip());
    dict_set_bytes(&mut result, "token", token.as_bytes().to_vec());

    if ctx.peer_store.has_peers(&info_hash) {
        let peers = ctx.peer_store.get(&info_hash);
        dict_set_list_of_bytes(
            &mut result,
            "values",
            peers.iter().map(|p| p.as_bytes().to_vec()).collect(),
        );
    } else {
        let nodes = ctx.routing_table.closest(&info_hash, ctx.k);
        dict_set_bytes(&mut result, "nodes", compact::pack_nodes(&nodes));
    }

    Message::Response { tid, result }
}

fn handle_announce_peer(
    ctx: &mut HandlerContext<'_>,
    args: &Dict,
    tid: Vec<u8>,
    src: SocketAddrV4,
) -> Message {
    let Some(info_hash) = dict_get_id(args, "info_hash") else {
        return error_reply(tid, 203, "protocol error: missing info_hash".to_string());
    };
    let Some(token_bytes) = dict_get_bytes(args, "token") else {
        return error_reply(
            tid,
            203,
            "cannot announce_peer with bad token".to_string(),
        );
    };
    let token = Token::from_bytes(token_bytes.to_vec());
    if !ctx.tokens.verify(&token, *src.ip()) {
        return error_reply(
            tid,
            203,
            "cannot announce_peer with bad token".to_string(),
        );
    }

    // The source rebinds `port` inside announce_peer handling in the
    // original implementation, shadowing the UDP source port (spec §9);
    // here the evident intent is followed directly: use the UDP source
    // port when implied_port is set and non-zero, else the announced port.
    let implied_port = dict_get_int(args, "implied_port").unwrap_or(0) != 0;
    let effective_port = if implied_port {
        src.port()
    } else {
        dict_get_int(args, "port").unwrap_or(0) as u16
    };

    let peer_addr = SocketAddrV4::new(*src.ip(), effective_port);
    ctx.peer_store.insert(info_hash, PeerEntry::from_addr(peer_addr));

    Message::Response {
        tid,
        result: base_result(ctx.local_id),
    }
}
