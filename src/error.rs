//! Error taxonomy (spec §7). Grounded on the pack's common use of
//! `thiserror` for typed domain errors (e.g. `paritytech-polkadot-sdk`,
//! `joshuapetersen-Sarah-John-Genesis/lib-*`); the teacher uses bare
//! `anyhow` throughout, which this crate keeps at the CLI boundary only
//! (`src/main.rs`).

use thiserror::Error;

/// The wire error code carried in a BEP-5 `e` reply (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireErrorCode {
    Generic = 201,
    Server = 202,
    Protocol = 203,
    MethodUnknown = 204,
}

#[derive(Debug, Error)]
pub enum DhtError {
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("unexpected query type {0}")]
    MethodUnknown(String),

    #[error("timeout")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("unexpected message")]
    UnexpectedMessage,
}

impl DhtError {
    /// The wire error this should be reported as, per spec §7/§6. `Timeout`
    /// and `Transport` never cross the wire (spec §7: they're surfaced to
    /// the local caller or swallowed, not replied with).
    pub fn wire_code(&self) -> Option<WireErrorCode> {
        match self {
            DhtError::Protocol(_) => Some(WireErrorCode::Protocol),
            DhtError::MethodUnknown(_) => Some(WireErrorCode::MethodUnknown),
            DhtError::UnexpectedMessage => Some(WireErrorCode::Generic),
            DhtError::Timeout | DhtError::Transport(_) => None,
        }
    }
}
