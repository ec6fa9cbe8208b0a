//! Stratum v1 message types and JSON-RPC serialization.
//!
//! Stratum uses a simplified JSON-RPC format where messages can be
//! requests (method and params, with an id), notifications (method and
//! params, id null), or responses (id plus result or error).

use bitcoin::hashes::Hash;
use bitcoin::{BlockHash, CompactTarget, TxMerkleNode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::extranonce::Extranonce;

/// Request id used for `mining.subscribe`.
pub const SUBSCRIBE_ID: u64 = 1;
/// Request id used for `mining.authorize`.
pub const AUTHORIZE_ID: u64 = 2;
/// Request id used for every `mining.submit`.
pub const SUBMIT_ID: u64 = 9;

/// JSON-RPC message envelope.
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    /// Request or notification, from either side.
    Request {
        /// Message id (null for notifications).
        id: Option<u64>,
        /// Method name, e.g. "mining.notify".
        method: String,
        /// Method parameters.
        params: Value,
    },

    /// Response to a request.
    Response {
        /// Message id matching the request.
        id: u64,
        /// Result value, present on success.
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        /// Error value, present on failure.
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<Value>,
    },
}

impl JsonRpcMessage {
    /// Create a request message.
    pub fn request(id: u64, method: impl Into<String>, params: Value) -> Self {
        JsonRpcMessage::Request {
            id: Some(id),
            method: method.into(),
            params,
        }
    }
}

/// Mining job notification from the pool (`mining.notify`).
///
/// Replaced wholesale by the next notification; never mutated.
#[derive(Debug, Clone)]
pub struct JobNotification {
    /// Opaque job identifier, echoed back on submit.
    pub job_id: String,

    /// Previous block hash, in internal byte order.
    pub prev_hash: BlockHash,

    /// Coinbase transaction prefix, up to the extranonce.
    pub coinbase1: Vec<u8>,

    /// Coinbase transaction suffix, after the extranonce.
    pub coinbase2: Vec<u8>,

    /// Merkle branch, folded over the coinbase txid in order.
    pub merkle_branches: Vec<TxMerkleNode>,

    /// Block version word.
    pub version: u32,

    /// Compact difficulty target.
    pub nbits: CompactTarget,

    /// Block timestamp, Unix epoch seconds.
    pub ntime: u32,

    /// If true, discard work on earlier jobs.
    pub clean_jobs: bool,
}

impl JobNotification {
    /// Parse from the Stratum params array.
    pub fn from_stratum_params(params: &[Value]) -> Result<Self, String> {
        if params.len() < 9 {
            return Err("mining.notify params too short".to_string());
        }

        let job_id = params[0].as_str().ok_or("job_id not a string")?.to_string();

        let prev_hash = parse_prev_hash(params[1].as_str().ok_or("prevhash not a string")?)?;

        let coinbase1 = hex::decode(params[2].as_str().ok_or("coinb1 not a string")?)
            .map_err(|e| format!("coinb1 hex: {e}"))?;
        let coinbase2 = hex::decode(params[3].as_str().ok_or("coinb2 not a string")?)
            .map_err(|e| format!("coinb2 hex: {e}"))?;

        let branches_json = params[4].as_array().ok_or("merkle_branch not an array")?;
        let mut merkle_branches = Vec::with_capacity(branches_json.len());
        for branch in branches_json {
            merkle_branches.push(parse_merkle_node(
                branch.as_str().ok_or("merkle branch not a string")?,
            )?);
        }

        let version = parse_hex_u32(params[5].as_str().ok_or("version not a string")?, "version")?;
        let nbits = CompactTarget::from_consensus(parse_hex_u32(
            params[6].as_str().ok_or("nbits not a string")?,
            "nbits",
        )?);
        let ntime = parse_hex_u32(params[7].as_str().ok_or("ntime not a string")?, "ntime")?;

        let clean_jobs = params[8].as_bool().ok_or("clean_jobs not a bool")?;

        Ok(Self {
            job_id,
            prev_hash,
            coinbase1,
            coinbase2,
            merkle_branches,
            version,
            nbits,
            ntime,
            clean_jobs,
        })
    }
}

fn parse_hex_u32(s: &str, what: &str) -> Result<u32, String> {
    u32::from_str_radix(s, 16).map_err(|e| format!("{what} hex: {e}"))
}

/// Parse a previous block hash from its Stratum encoding.
///
/// Stratum transmits the hash as eight 4-byte words, each hex-encoded
/// big-endian, with the words in little-endian hash order. Reversing the
/// bytes within each word recovers the internal byte order the header
/// serialization expects.
fn parse_prev_hash(hex: &str) -> Result<BlockHash, String> {
    let mut bytes = hex::decode(hex).map_err(|e| format!("prevhash hex: {e}"))?;
    if bytes.len() != 32 {
        return Err(format!("prevhash wrong length: {}", bytes.len()));
    }

    for chunk in bytes.chunks_mut(4) {
        chunk.reverse();
    }

    BlockHash::from_slice(&bytes).map_err(|e| format!("prevhash parse: {e}"))
}

/// Merkle branches arrive in internal byte order; no swapping.
fn parse_merkle_node(hex: &str) -> Result<TxMerkleNode, String> {
    let bytes = hex::decode(hex).map_err(|e| format!("merkle node hex: {e}"))?;
    if bytes.len() != 32 {
        return Err(format!("merkle node wrong length: {}", bytes.len()));
    }
    TxMerkleNode::from_slice(&bytes).map_err(|e| format!("merkle node parse: {e}"))
}

/// How far a scanned nonce got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Low 16 bits of the hash are zero. Counted, never submitted.
    Half,
    /// Low 32 bits of the hash are zero. Submitted as proof of work.
    Share,
    /// Hash at or below the full target: a block solution.
    Valid,
}

/// A share ready for submission.
#[derive(Debug, Clone)]
pub struct ShareCandidate {
    pub job_id: String,
    pub extranonce2: Extranonce,
    pub ntime: u32,
    pub nonce: u32,
    pub classification: Classification,
}

impl ShareCandidate {
    /// Serialize to a single `mining.submit` line, newline terminated.
    ///
    /// All hex fields are lowercase without a prefix; the nonce is exactly
    /// eight hex characters.
    pub fn to_submit_line(&self, address: &str) -> String {
        let msg = json!({
            "id": SUBMIT_ID,
            "method": "mining.submit",
            "params": [
                address,
                self.job_id,
                self.extranonce2.to_hex(),
                format!("{:08x}", self.ntime),
                format!("{:08x}", self.nonce),
            ],
        });
        format!("{msg}\n")
    }
}
