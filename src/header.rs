//! Job-to-header assembly.
//!
//! Builds the canonical 80-byte block header for a job plus a freshly
//! chosen extranonce2, and derives the scan midstate. The wire fields
//! arrive big-endian hex; the header stores version, ntime, nbits, and
//! nonce little-endian, the previous block hash and merkle root in
//! internal byte order.

use bitcoin::hashes::{sha256d, Hash};
use bitcoin::TxMerkleNode;

use crate::sha256::Midstate;
use crate::stratum::{Extranonce, JobNotification};

/// An assembled header with its cached midstate.
///
/// The nonce slot (bytes 76..80) stays zero; the kernel substitutes nonces
/// during scanning without touching these bytes.
#[derive(Debug, Clone)]
pub struct HeaderWork {
    pub header: [u8; 80],
    pub midstate: Midstate,
}

/// Assemble the header for one scan pass.
pub fn build(job: &JobNotification, extranonce1: &[u8], extranonce2: &Extranonce) -> HeaderWork {
    let coinbase = coinbase_txid(job, extranonce1, extranonce2);
    let root = merkle_root(coinbase, &job.merkle_branches);

    let mut header = [0u8; 80];
    header[0..4].copy_from_slice(&job.version.to_le_bytes());
    header[4..36].copy_from_slice(job.prev_hash.as_byte_array());
    header[36..68].copy_from_slice(&root);
    header[68..72].copy_from_slice(&job.ntime.to_le_bytes());
    header[72..76].copy_from_slice(&job.nbits.to_consensus().to_le_bytes());
    // bytes 76..80 remain the zeroed nonce slot

    let midstate = Midstate::of_header(&header);
    HeaderWork { header, midstate }
}

/// Double SHA-256 of the full coinbase transaction:
/// `coinb1 || extranonce1 || extranonce2 || coinb2`.
fn coinbase_txid(job: &JobNotification, extranonce1: &[u8], extranonce2: &Extranonce) -> [u8; 32] {
    let mut tx = Vec::with_capacity(
        job.coinbase1.len() + extranonce1.len() + extranonce2.len() + job.coinbase2.len(),
    );
    tx.extend_from_slice(&job.coinbase1);
    tx.extend_from_slice(extranonce1);
    tx.extend_from_slice(extranonce2.as_bytes());
    tx.extend_from_slice(&job.coinbase2);
    sha256d::Hash::hash(&tx).to_byte_array()
}

/// Fold the merkle branch over the coinbase txid. An empty branch means
/// the coinbase txid is the merkle root.
fn merkle_root(coinbase_txid: [u8; 32], branches: &[TxMerkleNode]) -> [u8; 32] {
    let mut acc = coinbase_txid;
    let mut pair = [0u8; 64];
    for branch in branches {
        pair[..32].copy_from_slice(&acc);
        pair[32..].copy_from_slice(branch.as_byte_array());
        acc = sha256d::Hash::hash(&pair).to_byte_array();
    }
    acc
}
