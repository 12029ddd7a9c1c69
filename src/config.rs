//! Node configuration (ambient stack §12 of SPEC_FULL.md). Grounded on the
//! teacher's `clap`-derived `Cli` in `main.rs` and on `chikuno-dchat`'s
//! `DhtConfig` (`other_examples`), which names the same knobs (k-bucket
//! size, alpha, query timeout) this spec's constants correspond to.

use std::time::Duration;

use crate::id::NodeId;
use crate::routing_table::K;

/// The three well-known mainline-DHT bootstrap hosts (spec §4.8).
pub const DEFAULT_BOOTSTRAP_NODES: &[&str] = &[
    "router.bittorrent.com:6881",
    "router.utorrent.com:6881",
    "dht.transmissionbt.com:6881",
];

#[derive(Debug, Clone)]
pub struct DhtConfig {
    /// UDP port to bind. `None` picks an ephemeral port (spec §6 `listen`).
    pub bind_port: Option<u16>,
    /// Local node id. `None` generates 160 random bits (spec §4.1).
    pub node_id: Option<NodeId>,
    /// Bootstrap hostnames, resolved at bootstrap time (spec §4.8).
    pub bootstrap_nodes: Vec<String>,
    /// Whether to run bootstrap at all (spec §6).
    pub bootstrap: bool,
    /// K-bucket capacity (spec §3).
    pub k: usize,
    /// Lookup concurrency parameter α (spec §4.7).
    pub alpha: usize,
    /// Per-transaction timeout (spec §4.4).
    pub query_timeout: Duration,
    /// Token-secret rotation cadence (spec §4.3).
    pub secret_rotation_interval: Duration,
    /// Delay before retrying bootstrap if the table is still empty
    /// (spec §4.8).
    pub bootstrap_retry_after: Duration,
}

impl Default for DhtConfig {
    fn default() -> Self {
        DhtConfig {
            bind_port: None,
            node_id: None,
            bootstrap_nodes: DEFAULT_BOOTSTRAP_NODES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            bootstrap: true,
            k: K,
            alpha: 3,
            query_timeout: Duration::from_secs(2),
            secret_rotation_interval: Duration::from_secs(5 * 60),
            bootstrap_retry_after: Duration::from_secs(5),
        }
    }
}
