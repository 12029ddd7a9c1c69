//! Bootstrap (spec §4.8): resolve the well-known router hostnames, seed an
//! iterative `find_node` lookup for our own id against them, and retry on a
//! timer while the routing table stays empty. Grounded on the teacher's
//! `tracker/http.rs` host-resolution path (`tokio::net::lookup_host` usage
//! pattern), adapted here to UDP bootstrap nodes instead of an HTTP
//! tracker announce URL.

use std::net::{SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use tokio::sync::Mutex;
use tokio::time;

use crate::engine::{MessageEngine, SharedState};
use crate::lookup;

/// Resolves each `host:port` bootstrap entry via DNS, keeping only the
/// IPv4 results (spec §9: IPv6 is out of scope).
pub async fn resolve_bootstrap_nodes(hosts: &[String]) -> Vec<SocketAddrV4> {
    let mut addrs = Vec::new();
    for host in hosts {
        match tokio::net::lookup_host(host).await {
            Ok(resolved) => {
                for addr in resolved {
                    if let SocketAddr::V4(v4) = addr {
                        addrs.push(v4);
                    }
                }
            }
            Err(e) => warn!("failed to resolve bootstrap host {host}: {e}"),
        }
    }
    addrs
}

/// Runs bootstrap to completion once: resolves hosts, then runs a
/// `find_node(self)` lookup seeded directly with the resolved router
/// addresses (spec §4.8). The routers' ids aren't known yet; the lookup's
/// `next_batch` step probes them by endpoint first, and the engine learns
/// their real ids off each reply's `id` field as it arrives.
pub async fn bootstrap_once(
    engine: Arc<MessageEngine>,
    state: Arc<Mutex<SharedState>>,
    hosts: &[String],
    alpha: usize,
    k: usize,
) {
    let addrs = resolve_bootstrap_nodes(hosts).await;
    if addrs.is_empty() {
        warn!("bootstrap: no bootstrap hosts resolved");
        return;
    }

    let local_id = state.lock().await.local_id;
    let found = lookup::find_node(engine, state, local_id, alpha, k, addrs).await;
    info!("bootstrap: lookup converged with {} candidates", found.len());
}

/// Bootstraps, then retries every `retry_after` while the table remains
/// empty (spec §4.8's "keep retrying" behavior for a cold start against
/// unreachable routers).
pub async fn run(
    engine: Arc<MessageEngine>,
    state: Arc<Mutex<SharedState>>,
    hosts: Vec<String>,
    alpha: usize,
    k: usize,
    retry_after: Duration,
) {
    loop {
        bootstrap_once(engine.clone(), state.clone(), &hosts, alpha, k).await;
        if !state.lock().await.routing_table.is_empty() {
            return;
        }
        warn!("bootstrap: routing table still empty, retrying in {retry_after:?}");
        time::sleep(retry_after).await;
    }
}
