//! Stratum v1 pool protocol.
//!
//! One JSON object per line over plain TCP. The client half lives on the
//! worker thread and owns the read side; a cloned write handle goes to the
//! submitter thread, so the socket is shared in time, never concurrently.

mod client;
mod error;
mod extranonce;
mod messages;

pub use client::{LivenessProbe, PoolClient, SubmitSink};
pub use error::{StratumError, StratumResult};
pub use extranonce::Extranonce;
pub use messages::{
    Classification, JobNotification, JsonRpcMessage, ShareCandidate, AUTHORIZE_ID, SUBMIT_ID,
    SUBSCRIBE_ID,
};
