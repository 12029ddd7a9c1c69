//! The UDP message engine (spec §4.5): owns the socket, decodes/encodes
//! BEP-5 datagrams, and routes them either to the query handlers or to the
//! transaction registry. Grounded on the teacher's `tracker/udp.rs`, which
//! owns a UDP socket and demultiplexes inbound packets by transaction id in
//! the same two-case ("is this a response we're waiting for, else treat as
//! unsolicited") shape; the blocking `mio` socket there is swapped for
//! `tokio::net::UdpSocket` per the architectural redesign in DESIGN.md.

use std::net::SocketAddrV4;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, Mutex};
use tokio::time;

use crate::bencode::{decode_message, dict_get_id, encode_message, Dict, Message};
use crate::contact::Contact;
use crate::error::DhtError;
use crate::events::Event;
use crate::handlers::{self, HandlerContext};
use crate::id::NodeId;
use crate::peer_store::PeerStore;
use crate::routing_table::RoutingTable;
use crate::token::TokenAuthority;
use crate::transaction::TransactionRegistry;

/// State shared between the engine's recv loop and the query handlers
/// (spec §4.2/§4.3/§4.8 component list).
pub struct SharedState {
    pub local_id: NodeId,
    pub routing_table: RoutingTable,
    pub peer_store: PeerStore,
    pub tokens: TokenAuthority,
    pub k: usize,
}

impl SharedState {
    pub fn new(local_id: NodeId, k: usize) -> Self {
        SharedState {
            local_id,
            routing_table: RoutingTable::with_capacity(local_id, k),
            peer_store: PeerStore::new(),
            tokens: TokenAuthority::new(),
            k,
        }
    }
}

pub struct MessageEngine {
    socket: Arc<UdpSocket>,
    state: Arc<Mutex<SharedState>>,
    transactions: Arc<Mutex<TransactionRegistry>>,
    events: broadcast::Sender<Event>,
    query_timeout: Duration,
}

impl MessageEngine {
    pub fn new(
        socket: UdpSocket,
        state: Arc<Mutex<SharedState>>,
        transactions: Arc<Mutex<TransactionRegistry>>,
        events: broadcast::Sender<Event>,
        query_timeout: Duration,
    ) -> Self {
        MessageEngine {
            socket: Arc::new(socket),
            state,
            transactions,
            events,
            query_timeout,
        }
    }

    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.socket.local_addr()
    }

    /// Runs the ingress loop until the socket errors out (spec §4.5). The
    /// caller spawns this as a background task; shutdown is triggered by
    /// dropping the engine, which closes the socket.
    pub async fn run(self: Arc<Self>) {
        let mut buf = [0u8; 2048];
        loop {
            let (len, src) = match self.socket.recv_from(&mut buf).await {
                Ok(pair) => pair,
                Err(e) => {
                    let _ = self.events.send(Event::Error {
                        message: format!("socket recv error: {e}"),
                    });
                    return;
                }
            };
            let src = match src {
                std::net::SocketAddr::V4(v4) => v4,
                std::net::SocketAddr::V6(_) => continue, // spec §9: IPv4-only
            };
            self.dispatch(&buf[..len], src).await;
        }
    }

    async fn dispatch(&self, bytes: &[u8], src: SocketAddrV4) {
        let message = match decode_message(bytes) {
            Ok(m) => m,
            Err(e) => {
                debug!("dropping malformed datagram from {src}: {e}");
                return;
            }
        };

        match message {
            Message::Query { tid, verb, args } => {
                if let Some(id) = dict_get_id(&args, "id") {
                    self.remember_contact(id, src).await;
                }
                let reply = {
                    let mut state = self.state.lock().await;
                    let mut ctx = HandlerContext {
                        local_id: state.local_id,
                        routing_table: &mut state.routing_table,
                        peer_store: &mut state.peer_store,
                        tokens: &mut state.tokens,
                        k: state.k,
                    };
                    handlers::handle_query(&mut ctx, &verb, &args, tid, src)
                };
                self.send_message(&reply, src).await;
            }
            Message::Response { tid, result } => {
                if let Some(id) = dict_get_id(&result, "id") {
                    self.remember_contact(id, src).await;
                }
                let resolved = match decode_tid(&tid) {
                    Some(t) => {
                        self.transactions
                            .lock()
                            .await
                            .resolve(src, t, Message::Response { tid: tid.clone(), result })
                    }
                    None => false,
                };
                if !resolved {
                    // Unmatched response: the sender likely saw our
                    // transaction time out already. Spec §4.5 says reply
                    // with a generic error rather than staying silent.
                    self.send_message(
                        &Message::Error {
                            tid,
                            code: 201,
                            message: "unexpected message".to_string(),
                        },
                        src,
                    )
                    .await;
                }
            }
            Message::Error { tid, code, message } => {
                let resolved = match decode_tid(&tid) {
                    Some(t) => self.transactions.lock().await.resolve(
                        src,
                        t,
                        Message::Error {
                            tid: tid.clone(),
                            code,
                            message: message.clone(),
                        },
                    ),
                    None => false,
                };
                if !resolved {
                    let _ = self.events.send(Event::Warning {
                        message: format!("unmatched error {code} from {src}: {message}"),
                    });
                }
            }
        }
    }

    async fn remember_contact(&self, id: NodeId, addr: SocketAddrV4) {
        let contact = Contact::new(id, addr);
        if !contact.has_valid_port() {
            return;
        }
        let mut state = self.state.lock().await;
        if id == state.local_id {
            return;
        }
        if state.routing_table.add(contact) {
            let _ = self.events.send(Event::Node { addr, id });
        }
    }

    /// Sends a query and awaits its matching response/error, or times out
    /// (spec §4.4). `dest` must carry a valid port; invalid ports are
    /// rejected before anything touches the wire (spec §4.5 egress check).
    pub async fn send_query(
        &self,
        dest: SocketAddrV4,
        verb: &str,
        args: Dict,
    ) -> Result<Message, DhtError> {
        if !(0 < dest.port() && dest.port() < 65535) {
            return Err(DhtError::Protocol(format!("invalid destination port {}", dest.port())));
        }

        let (tid, rx) = self.transactions.lock().await.register(dest);
        let query = Message::Query {
            tid: encode_tid(tid),
            verb: verb.to_string(),
            args,
        };
        self.send_message(&query, dest).await;

        match time::timeout(self.query_timeout, rx).await {
            Ok(Ok(Message::Error { code, message, .. })) => {
                Err(DhtError::Protocol(format!("remote error {code}: {message}")))
            }
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(DhtError::UnexpectedMessage),
            Err(_) => {
                self.transactions.lock().await.cancel(dest, tid);
                Err(DhtError::Timeout)
            }
        }
    }

    async fn send_message(&self, message: &Message, dest: SocketAddrV4) {
        if !(0 < dest.port() && dest.port() < 65535) {
            warn!("refusing to send to invalid port {}", dest.port());
            return;
        }
        let bytes = encode_message(message);
        if let Err(e) = self.socket.send_to(&bytes, dest).await {
            warn!("send to {dest} failed: {e}");
        }
    }

    pub async fn destroy(&self) {
        self.transactions.lock().await.destroy();
    }
}

fn decode_tid(tid: &[u8]) -> Option<u16> {
    if tid.len() != 2 {
        return None;
    }
    Some(u16::from_be_bytes([tid[0], tid[1]]))
}

fn encode_tid(tid: u16) -> Vec<u8> {
    tid.to_be_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bencode::dict_set_bytes;
    use std::net::Ipv4Addr;
    use tokio::net::UdpSocket as TokioUdpSocket;

    async fn engine_pair() -> (Arc<MessageEngine>, Arc<MessageEngine>) {
        let sock_a = TokioUdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let sock_b = TokioUdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let (tx_a, _) = broadcast::channel(16);
        let (tx_b, _) = broadcast::channel(16);
        let id_a = NodeId::random();
        let id_b = NodeId::random();
        let engine_a = Arc::new(MessageEngine::new(
            sock_a,
            Arc::new(Mutex::new(SharedState::new(id_a, 8))),
            Arc::new(Mutex::new(TransactionRegistry::new())),
            tx_a,
            Duration::from_millis(500),
        ));
        let engine_b = Arc::new(MessageEngine::new(
            sock_b,
            Arc::new(Mutex::new(SharedState::new(id_b, 8))),
            Arc::new(Mutex::new(TransactionRegistry::new())),
            tx_b,
            Duration::from_millis(500),
        ));
        (engine_a, engine_b)
    }

    #[tokio::test]
    async fn ping_round_trip_between_two_engines() {
        let (engine_a, engine_b) = engine_pair().await;
        let addr_b = match engine_b.local_addr().unwrap() {
            std::net::SocketAddr::V4(v4) => v4,
            _ => unreachable!(),
        };

        tokio::spawn(engine_b.clone().run());

        let mut args = Dict::new();
        let id_a = engine_a.state.lock().await.local_id;
        dict_set_bytes(&mut args, "id", id_a.as_bytes().to_vec());

        let response = engine_a.send_query(addr_b, "ping", args).await.unwrap();
        match response {
            Message::Response { result, .. } => {
                let id_b = engine_b.state.lock().await.local_id;
                assert_eq!(dict_get_id(&result, "id"), Some(id_b));
            }
            _ => panic!("expected response"),
        }
    }

    #[tokio::test]
    async fn send_query_times_out_when_unanswered() {
        let (engine_a, _engine_b) = engine_pair().await;
        // engine_b never runs its recv loop, so the ping goes unanswered.
        let addr_b = match _engine_b.local_addr().unwrap() {
            std::net::SocketAddr::V4(v4) => v4,
            _ => unreachable!(),
        };
        let mut args = Dict::new();
        dict_set_bytes(&mut args, "id", NodeId::random().as_bytes().to_vec());
        let result = engine_a.send_query(addr_b, "ping", args).await;
        assert!(matches!(result, Err(DhtError::Timeout)));
        assert_eq!(engine_a.transactions.lock().await.pending_count(), 0);
    }

    #[tokio::test]
    async fn send_query_rejects_invalid_port() {
        let (engine_a, _engine_b) = engine_pair().await;
        let bad = SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0);
        let result = engine_a.send_query(bad, "ping", Dict::new()).await;
        assert!(result.is_err());
    }
}
