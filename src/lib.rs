//! Solo Bitcoin mining worker speaking Stratum v1.
//!
//! The crate is organized around a small number of subsystems:
//!
//! - [`stratum`] talks to the pool: line-delimited JSON-RPC over plain TCP,
//!   subscribe/authorize handshake, job notifications, share submission.
//! - [`header`] turns a job plus a freshly chosen extranonce2 into the
//!   80-byte block header and its cached SHA-256 midstate.
//! - [`sha256`] is the scan kernel: double SHA-256 over the header tail with
//!   the midstate reused across all four billion nonces, and an early exit
//!   three rounds before the end of the second hash.
//! - [`target`] expands compact difficulty bits into the full 256-bit target
//!   and compares digests against it.
//! - [`engine`] drives the whole thing: one session loop per worker thread,
//!   the nonce scan, share classification, and a submitter thread that keeps
//!   network writes off the hash loop.
//! - [`stats`] is the shared counter registry read by the stats reporter.

pub mod config;
pub mod daemon;
pub mod difficulty;
pub mod engine;
pub mod header;
pub mod sha256;
pub mod stats;
pub mod stratum;
pub mod target;
pub mod tracing;
