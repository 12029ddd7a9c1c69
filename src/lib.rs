pub mod bencode;
pub mod bootstrap;
pub mod compact;
pub mod config;
pub mod contact;
pub mod engine;
pub mod error;
pub mod events;
pub mod handlers;
pub mod id;
pub mod lookup;
pub mod node;
pub mod peer_store;
pub mod routing_table;
pub mod token;
pub mod transaction;

pub use config::DhtConfig;
pub use contact::Contact;
pub use error::DhtError;
pub use events::Event;
pub use id::NodeId;
pub use node::Node;
