use std::net::SocketAddrV4;
use std::time::Duration;

use clap::Parser;
use mdht::id::NodeId;
use mdht::{DhtConfig, Event, Node};

/// A mainline BitTorrent DHT node.
#[derive(Parser, Debug)]
struct Cli {
    /// UDP port to bind; 0 picks an ephemeral port.
    #[clap(short, long, default_value_t = 0)]
    port: u16,
    /// Skip bootstrap against the well-known router hosts.
    #[clap(long)]
    no_bootstrap: bool,
    /// Hex-encoded 20-byte info-hash to look up peers for once bootstrapped.
    #[clap(short, long)]
    get_peers: Option<String>,
}

fn parse_info_hash(hex: &str) -> Option<NodeId> {
    if hex.len() != 40 {
        return None;
    }
    let mut bytes = [0u8; 20];
    for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
        let byte_str = std::str::from_utf8(chunk).ok()?;
        bytes[i] = u8::from_str_radix(byte_str, 16).ok()?;
    }
    Some(NodeId::from_bytes(bytes))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();
    let args = Cli::parse();

    let config = DhtConfig {
        bind_port: if args.port == 0 { None } else { Some(args.port) },
        bootstrap: !args.no_bootstrap,
        ..DhtConfig::default()
    };

    let node = Node::new(config).await?;
    let mut events = node.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                Event::Listening { port } => log::info!("listening on port {port}"),
                Event::Node { addr, id } => log::debug!("learned node {id} at {addr}"),
                Event::Peer { addr, info_hash } => {
                    log::info!("found peer {addr} for {info_hash}")
                }
                Event::Warning { message } => log::warn!("{message}"),
                Event::Error { message } => log::error!("{message}"),
            }
        }
    });

    if let Some(hex) = args.get_peers {
        let info_hash = parse_info_hash(&hex)
            .ok_or_else(|| anyhow::anyhow!("info-hash must be 40 hex characters"))?;
        // Give bootstrap a head start before spending a lookup on an
        // all-but-empty routing table.
        tokio::time::sleep(Duration::from_secs(3)).await;
        let result = node.get_peers(info_hash).await;
        for peer in &result.peers {
            let addr: SocketAddrV4 = peer.addr();
            println!("{addr}");
        }
    } else {
        tokio::signal::ctrl_c().await?;
    }

    node.destroy().await;
    Ok(())
}
