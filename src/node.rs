//! The node actor (spec §5/§6): wires the message engine, routing table,
//! peer store, token authority, transaction registry, bootstrap, and
//! lookups behind one handle. Grounded on `rqbit-dht`'s `Dht`/`DhtWorker`
//! split (`other_examples/`): a cheap, cloneable handle type backed by a
//! background task that owns the actual socket and mutable state.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;

use log::info;
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time;

use crate::bencode::{dict_set_bytes, dict_set_int, Dict};
use crate::compact::PeerEntry;
use crate::config::DhtConfig;
use crate::contact::Contact;
use crate::engine::{MessageEngine, SharedState};
use crate::error::DhtError;
use crate::events::{Event, EVENT_CHANNEL_CAPACITY};
use crate::id::NodeId;
use crate::lookup::{self, GetPeersResult};
use crate::transaction::TransactionRegistry;

/// A running DHT node (spec §5/§6). Cheaply cloneable; clones share the
/// same background tasks and state.
#[derive(Clone)]
pub struct Node {
    engine: Arc<MessageEngine>,
    state: Arc<Mutex<SharedState>>,
    events: broadcast::Sender<Event>,
    config: DhtConfig,
    background: Arc<Vec<JoinHandle<()>>>,
}

impl Node {
    /// Binds the UDP socket, starts the ingress loop and secret-rotation
    /// timer, and — unless disabled — spawns bootstrap (spec §6 `listen`).
    pub async fn new(config: DhtConfig) -> Result<Self, DhtError> {
        let local_id = config.node_id.unwrap_or_else(NodeId::random);
        let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, config.bind_port.unwrap_or(0));
        let socket = UdpSocket::bind(bind_addr).await?;
        let bound_port = socket.local_addr()?.port();

        let state = Arc::new(Mutex::new(SharedState::new(local_id, config.k)));
        let transactions = Arc::new(Mutex::new(TransactionRegistry::new()));
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let engine = Arc::new(MessageEngine::new(
            socket,
            state.clone(),
            transactions,
            events.clone(),
            config.query_timeout,
        ));

        let mut background = Vec::new();
        background.push(tokio::spawn(engine.clone().run()));
        background.push(spawn_secret_rotation(state.clone(), config.secret_rotation_interval));

        let node = Node {
            engine,
            state,
            events: events.clone(),
            config: config.clone(),
            background: Arc::new(background),
        };

        let _ = events.send(Event::Listening { port: bound_port });
        info!("listening on {bound_port}");

        if config.bootstrap {
            let node = node.clone();
            tokio::spawn(async move {
                crate::bootstrap::run(
                    node.engine.clone(),
                    node.state.clone(),
                    node.config.bootstrap_nodes.clone(),
                    node.config.alpha,
                    node.config.k,
                    node.config.bootstrap_retry_after,
                )
                .await;
            });
        }

        Ok(node)
    }

    pub async fn local_id(&self) -> NodeId {
        self.state.lock().await.local_id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    pub async fn routing_table_size(&self) -> usize {
        self.state.lock().await.routing_table.count()
    }

    /// Pings `addr` (spec §6 `addNode`); a successful reply causes the
    /// engine to learn and store the contact via its normal response path.
    pub async fn add_node(&self, addr: SocketAddrV4) -> Result<(), DhtError> {
        let local_id = self.state.lock().await.local_id;
        let mut args = Dict::new();
        dict_set_bytes(&mut args, "id", local_id.as_bytes().to_vec());
        self.engine.send_query(addr, "ping", args).await?;
        Ok(())
    }

    pub async fn remove_node(&self, id: &NodeId) {
        self.state.lock().await.routing_table.remove(id);
    }

    pub async fn add_peer(&self, info_hash: NodeId, peer: PeerEntry) {
        self.state.lock().await.peer_store.insert(info_hash, peer);
    }

    pub async fn remove_peer(&self, info_hash: &NodeId, peer: &PeerEntry) {
        self.state.lock().await.peer_store.remove(info_hash, peer);
    }

    /// Iterative `find_node` lookup (spec §4.7/§6 `lookup`). Seeds from
    /// whatever the routing table already has; no separate endpoint seed is
    /// needed outside of bootstrap (spec §4.8), which drives `lookup::find_node`
    /// directly with its own resolved router addresses.
    pub async fn lookup(&self, target: NodeId) -> Vec<Contact> {
        lookup::find_node(
            self.engine.clone(),
            self.state.clone(),
            target,
            self.config.alpha,
            self.config.k,
            Vec::new(),
        )
        .await
    }

    /// Iterative `get_peers` lookup (spec §4.7/§6).
    pub async fn get_peers(&self, info_hash: NodeId) -> GetPeersResult {
        lookup::get_peers(
            self.engine.clone(),
            self.state.clone(),
            info_hash,
            self.config.alpha,
            self.config.k,
            Vec::new(),
        )
        .await
    }

    /// Runs `get_peers`, then announces our own listening port to every
    /// node that returned a token (spec §4.6/§6 `announce`).
    pub async fn announce(&self, info_hash: NodeId, port: u16, implied_port: bool) -> GetPeersResult {
        let result = self.get_peers(info_hash).await;
        let local_id = self.state.lock().await.local_id;

        for contact in &result.closest {
            let Some(token) = result.tokens.get(&contact.id) else {
                continue;
            };
            let mut args = Dict::new();
            dict_set_bytes(&mut args, "id", local_id.as_bytes().to_vec());
            dict_set_bytes(&mut args, "info_hash", info_hash.as_bytes().to_vec());
            dict_set_bytes(&mut args, "token", token.as_bytes().to_vec());
            dict_set_int(&mut args, "implied_port", if implied_port { 1 } else { 0 });
            dict_set_int(&mut args, "port", port as i64);
            let _ = self.engine.send_query(contact.addr, "announce_peer", args).await;
        }

        result
    }

    /// Shuts the node down (spec §5): drops pending transactions and aborts
    /// background tasks. The handle remains valid but inert afterward.
    pub async fn destroy(&self) {
        self.engine.destroy().await;
        for handle in self.background.iter() {
            handle.abort();
        }
    }
}

fn spawn_secret_rotation(
    state: Arc<Mutex<SharedState>>,
    interval: std::time::Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.tick().await; // first tick fires immediately; skip it
        loop {
            ticker.tick().await;
            state.lock().await.tokens.rotate();
        }
    })
}
