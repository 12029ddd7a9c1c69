//! The BEP-5 message envelope and its bencode codec (spec §3, §4.1, §6).
//!
//! Grounded on the teacher's `torrent.rs`, which moves between typed Rust
//! structs and bencoded bytes via `serde_bencode`/`serde_bytes`. The query
//! verbs here don't fit one fixed struct shape the way a torrent metainfo
//! dict does, so this module works one level down, through
//! `serde_bencode::value::Value`, whose `Dict` variant is keyed by a
//! `HashMap<Vec<u8>, Value>`; `serde_bencode`'s own serializer already sorts
//! keys before writing them, satisfying spec §4.1's "keys... emitted... in
//! lexicographic order on encode" without this module doing any of its own
//! ordering.

use std::collections::HashMap;

use serde_bencode::value::Value;

use crate::error::DhtError;
use crate::id::NodeId;

pub type Dict = HashMap<Vec<u8>, Value>;

/// A decoded BEP-5 message (spec §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Query {
        tid: Vec<u8>,
        verb: String,
        args: Dict,
    },
    Response {
        tid: Vec<u8>,
        result: Dict,
    },
    Error {
        tid: Vec<u8>,
        code: i64,
        message: String,
    },
}

impl Message {
    pub fn tid(&self) -> &[u8] {
        match self {
            Message::Query { tid, .. } => tid,
            Message::Response { tid, .. } => tid,
            Message::Error { tid, .. } => tid,
        }
    }
}

/// Decodes a raw UDP datagram. Any malformed bencode (truncation, bad
/// length prefix, trailing bytes, non-string dict key, or a structurally
/// invalid envelope) is reported as `DhtError::Protocol` — the caller's
/// policy (spec §4.5/§7) is to drop such datagrams silently, never raise.
pub fn decode_message(bytes: &[u8]) -> Result<Message, DhtError> {
    let consumed = bencode_value_len(bytes)?;
    if consumed != bytes.len() {
        return Err(DhtError::Protocol("trailing bytes after top-level value".into()));
    }
    let value: Value =
        serde_bencode::from_bytes(bytes).map_err(|e| DhtError::Protocol(e.to_string()))?;
    let dict = match value {
        Value::Dict(d) => d,
        _ => return Err(DhtError::Protocol("top-level value is not a dict".into())),
    };

    let tid = get_bytes(&dict, b"t")
        .ok_or_else(|| DhtError::Protocol("missing t".into()))?
        .to_vec();
    let y = get_bytes(&dict, b"y").ok_or_else(|| DhtError::Protocol("missing y".into()))?;

    match y {
        b"q" => {
            let verb = get_bytes(&dict, b"q")
                .ok_or_else(|| DhtError::Protocol("missing q".into()))?;
            let verb = String::from_utf8_lossy(verb).into_owned();
            let args = match dict.get(b"a".as_slice()) {
                Some(Value::Dict(a)) => a.clone(),
                _ => return Err(DhtError::Protocol("missing or malformed a".into())),
            };
            Ok(Message::Query { tid, verb, args })
        }
        b"r" => {
            let result = match dict.get(b"r".as_slice()) {
                Some(Value::Dict(r)) => r.clone(),
                _ => return Err(DhtError::Protocol("missing or malformed r".into())),
            };
            Ok(Message::Response { tid, result })
        }
        b"e" => {
            let e = match dict.get(b"e".as_slice()) {
                Some(Value::List(items)) if items.len() == 2 => items,
                _ => return Err(DhtError::Protocol("missing or malformed e".into())),
            };
            let code = match &e[0] {
                Value::Int(i) => *i,
                _ => return Err(DhtError::Protocol("error code is not an int".into())),
            };
            let message = match &e[1] {
                Value::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
                _ => return Err(DhtError::Protocol("error message is not a string".into())),
            };
            Ok(Message::Error { tid, code, message })
        }
        other => Err(DhtError::Protocol(format!(
            "unknown y: {:?}",
            String::from_utf8_lossy(other)
        ))),
    }
}

pub fn encode_message(msg: &Message) -> Vec<u8> {
    let mut top: Dict = HashMap::new();
    top.insert(b"t".to_vec(), Value::Bytes(msg.tid().to_vec()));
    match msg {
        Message::Query { verb, args, .. } => {
            top.insert(b"y".to_vec(), Value::Bytes(b"q".to_vec()));
            top.insert(b"q".to_vec(), Value::Bytes(verb.as_bytes().to_vec()));
            top.insert(b"a".to_vec(), Value::Dict(args.clone()));
        }
        Message::Response { result, .. } => {
            top.insert(b"y".to_vec(), Value::Bytes(b"r".to_vec()));
            top.insert(b"r".to_vec(), Value::Dict(result.clone()));
        }
        Message::Error { code, message, .. } => {
            top.insert(b"y".to_vec(), Value::Bytes(b"e".to_vec()));
            top.insert(
                b"e".to_vec(),
                Value::List(vec![
                    Value::Int(*code),
                    Value::Bytes(message.as_bytes().to_vec()),
                ]),
            );
        }
    }
    serde_bencode::to_bytes(&Value::Dict(top)).expect("constructed dict always encodes")
}

/// Scans exactly one bencoded value starting at `bytes[0]` and returns how
/// many bytes it occupies, without building a `Value` tree. Used only to
/// detect trailing garbage after the top-level message (spec §4.1): full
/// structural decoding is left to `serde_bencode`.
fn bencode_value_len(bytes: &[u8]) -> Result<usize, DhtError> {
    fn err(msg: &str) -> DhtError {
        DhtError::Protocol(msg.to_string())
    }

    match bytes.first() {
        None => Err(err("empty input")),
        Some(b'i') => {
            let end = bytes
                .iter()
                .position(|&b| b == b'e')
                .ok_or_else(|| err("unterminated integer"))?;
            Ok(end + 1)
        }
        Some(b'l') => {
            let mut pos = 1;
            while bytes.get(pos) != Some(&b'e') {
                if pos >= bytes.len() {
                    return Err(err("unterminated list"));
                }
                pos += bencode_value_len(&bytes[pos..])?;
            }
            Ok(pos + 1)
        }
        Some(b'd') => {
            let mut pos = 1;
            while bytes.get(pos) != Some(&b'e') {
                if pos >= bytes.len() {
                    return Err(err("unterminated dict"));
                }
                pos += bencode_value_len(&bytes[pos..])?; // key
                if pos >= bytes.len() {
                    return Err(err("dict key without value"));
                }
                pos += bencode_value_len(&bytes[pos..])?; // value
            }
            Ok(pos + 1)
        }
        Some(c) if c.is_ascii_digit() => {
            let colon = bytes
                .iter()
                .position(|&b| b == b':')
                .ok_or_else(|| err("bad length prefix"))?;
            let len: usize = std::str::from_utf8(&bytes[..colon])
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| err("bad length prefix"))?;
            let start = colon + 1;
            let end = start
                .checked_add(len)
                .ok_or_else(|| err("length overflow"))?;
            if end > bytes.len() {
                return Err(err("truncated byte string"));
            }
            Ok(end)
        }
        Some(_) => Err(err("unrecognized token")),
    }
}

fn get_bytes<'a>(dict: &'a Dict, key: &[u8]) -> Option<&'a [u8]> {
    match dict.get(key) {
        Some(Value::Bytes(b)) => Some(b),
        _ => None,
    }
}

pub fn dict_get_bytes<'a>(dict: &'a Dict, key: &str) -> Option<&'a [u8]> {
    get_bytes(dict, key.as_bytes())
}

pub fn dict_get_int(dict: &Dict, key: &str) -> Option<i64> {
    match dict.get(key.as_bytes()) {
        Some(Value::Int(i)) => Some(*i),
        _ => None,
    }
}

pub fn dict_get_id(dict: &Dict, key: &str) -> Option<NodeId> {
    dict_get_bytes(dict, key).and_then(NodeId::from_slice)
}

pub fn dict_set_bytes(dict: &mut Dict, key: &str, value: Vec<u8>) {
    dict.insert(key.as_bytes().to_vec(), Value::Bytes(value));
}

pub fn dict_set_int(dict: &mut Dict, key: &str, value: i64) {
    dict.insert(key.as_bytes().to_vec(), Value::Int(value));
}

pub fn dict_set_list_of_bytes(dict: &mut Dict, key: &str, values: Vec<Vec<u8>>) {
    dict.insert(
        key.as_bytes().to_vec(),
        Value::List(values.into_iter().map(Value::Bytes).collect()),
    );
}

/// Reads `values` (a bencoded list of byte strings) as raw byte vectors, if
/// present and well-formed.
pub fn dict_get_list_of_bytes(dict: &Dict, key: &str) -> Option<Vec<Vec<u8>>> {
    match dict.get(key.as_bytes()) {
        Some(Value::List(items)) => items
            .iter()
            .map(|v| match v {
                Value::Bytes(b) => Some(b.clone()),
                _ => None,
            })
            .collect(),
        _ => None,
    }
}
