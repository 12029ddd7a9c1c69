//! Token authority (spec §4.3): issues and validates the `announce_peer`
//! capability token. Grounded on `torrent.rs::info_hash()`'s
//! `Sha1::new()/update()/finalize()` usage for hashing.

use std::net::Ipv4Addr;
use std::time::Duration;

use rand::RngCore;
use sha1::{Digest, Sha1};

/// A 20-byte `announce_peer` capability token (spec §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token(Vec<u8>);

impl Token {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Token(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Rotating-secret token issuer/verifier (spec §4.3). Holds exactly two
/// generations so a token remains valid for 5-10 minutes depending on when
/// in the rotation cycle it was issued.
#[derive(Debug)]
pub struct TokenAuthority {
    current: Vec<u8>,
    previous: Vec<u8>,
}

/// Default rotation cadence (spec §3/§4.3).
pub const DEFAULT_ROTATION_INTERVAL: Duration = Duration::from_secs(5 * 60);

fn fresh_secret() -> Vec<u8> {
    let mut bytes = vec![0u8; 20]; // >= 160 bits of entropy, per spec §3.
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

impl TokenAuthority {
    pub fn new() -> Self {
        TokenAuthority {
            current: fresh_secret(),
            previous: fresh_secret(),
        }
    }

    /// `SHA1(remote_ip_bytes ‖ secret)`, where `remote_ip_bytes` is the
    /// dotted-quad *string* form — preserved verbatim for wire
    /// compatibility with existing peers (spec §4.3).
    fn digest(ip: Ipv4Addr, secret: &[u8]) -> Vec<u8> {
        let mut hasher = Sha1::new();
        hasher.update(ip.to_string().as_bytes());
        hasher.update(secret);
        hasher.finalize().to_vec()
    }

    pub fn issue(&self, remote_ip: Ipv4Addr) -> Token {
        Token(Self::digest(remote_ip, &self.current))
    }

    pub fn verify(&self, token: &Token, remote_ip: Ipv4Addr) -> bool {
        token.0 == Self::digest(remote_ip, &self.current)
            || token.0 == Self::digest(remote_ip, &self.previous)
    }

    /// Rotates the secrets: `previous <- current; current <- fresh`.
    pub fn rotate(&mut self) {
        self.previous = std::mem::replace(&mut self.current, fresh_secret());
    }
}

impl Default for TokenAuthority {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip() -> Ipv4Addr {
        Ipv4Addr::new(9, 9, 9, 9)
    }

    #[test]
    fn issued_token_verifies_immediately() {
        let auth = TokenAuthority::new();
        let token = auth.issue(ip());
        assert!(auth.verify(&token, ip()));
    }

    #[test]
    fn token_bound_to_issuing_ip() {
        let auth = TokenAuthority::new();
        let token = auth.issue(ip());
        assert!(!auth.verify(&token, Ipv4Addr::new(1, 1, 1, 1)));
    }

    #[test]
    fn token_survives_one_rotation_but_not_two() {
        let mut auth = TokenAuthority::new();
        let token = auth.issue(ip());
        auth.rotate();
        assert!(auth.verify(&token, ip()), "should survive one rotation");
        auth.rotate();
        assert!(
            !auth.verify(&token, ip()),
            "should not survive a second rotation"
        );
    }
}
