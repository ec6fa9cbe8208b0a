//! Blocking Stratum v1 pool client.
//!
//! The socket is plain blocking TCP on purpose: the worker thread reads
//! jobs between scans and the submitter thread writes shares on a cloned
//! handle, so access is partitioned in time rather than guarded by a lock.
//! Read timeouts bound every blocking call; a timed-out read is "no job
//! this time", not an error.

use std::collections::VecDeque;
use std::io::{self, BufRead, BufReader, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use serde_json::{json, Value};

use super::error::{StratumError, StratumResult};
use super::messages::{JobNotification, JsonRpcMessage, AUTHORIZE_ID, SUBMIT_ID, SUBSCRIBE_ID};
use crate::tracing::prelude::*;

/// Session parameters from the subscribe response.
#[derive(Debug, Clone, Default)]
struct Subscription {
    extranonce1: Vec<u8>,
    extranonce2_size: usize,
}

/// A pool connection, owned by one worker thread.
pub struct PoolClient {
    stream: TcpStream,
    reader: BufReader<TcpStream>,
    io_timeout: Duration,
    /// Partial line carried across read timeouts.
    line: Vec<u8>,
    /// Notifications that interleaved with the handshake.
    pending: VecDeque<JobNotification>,
    subscription: Subscription,
}

impl PoolClient {
    /// Connect to the pool, retrying with backoff until the socket opens or
    /// shutdown is requested.
    pub fn connect(
        host: &str,
        port: u16,
        io_timeout: Duration,
        backoff: Duration,
        shutdown: &AtomicBool,
    ) -> StratumResult<Self> {
        loop {
            if shutdown.load(Ordering::Relaxed) {
                return Err(StratumError::Shutdown);
            }

            match TcpStream::connect((host, port)) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    stream.set_read_timeout(Some(io_timeout))?;
                    stream.set_write_timeout(Some(io_timeout))?;
                    let reader = BufReader::new(stream.try_clone()?);
                    info!(host, port, "connected to pool");
                    return Ok(Self {
                        stream,
                        reader,
                        io_timeout,
                        line: Vec::new(),
                        pending: VecDeque::new(),
                        subscription: Subscription::default(),
                    });
                }
                Err(e) => {
                    warn!(error = %e, host, port, "pool connect failed, retrying");
                    thread::sleep(backoff);
                }
            }
        }
    }

    /// Subscribe and authorize.
    ///
    /// Fills the session extranonce parameters from the subscribe result.
    /// The authorize result is read to advance the stream but otherwise
    /// ignored; a pool that dislikes the address will simply reject shares.
    /// Notifications that interleave with the exchange are buffered for
    /// [`next_job`](Self::next_job).
    pub fn handshake(&mut self, address: &str, password: &str) -> StratumResult<()> {
        self.send(&JsonRpcMessage::request(
            SUBSCRIBE_ID,
            "mining.subscribe",
            json!([]),
        ))?;
        let (result, error) = self.wait_response(SUBSCRIBE_ID)?;
        if let Some(err) = error {
            return Err(StratumError::SubscribeFailed(err.to_string()));
        }
        self.subscription = parse_subscription(&result)?;
        debug!(
            extranonce1 = %hex::encode(&self.subscription.extranonce1),
            extranonce2_size = self.subscription.extranonce2_size,
            "subscribed"
        );

        self.send(&JsonRpcMessage::request(
            AUTHORIZE_ID,
            "mining.authorize",
            json!([address, password]),
        ))?;
        // Result and error are both ignored; a displeased pool will reject
        // shares soon enough.
        let _ = self.wait_response(AUTHORIZE_ID)?;

        Ok(())
    }

    /// Session extranonce1.
    pub fn extranonce1(&self) -> &[u8] {
        &self.subscription.extranonce1
    }

    /// Required extranonce2 length in bytes.
    pub fn extranonce2_size(&self) -> usize {
        self.subscription.extranonce2_size
    }

    /// Read the next job, if one arrived.
    ///
    /// `Ok(None)` means nothing useful came within the read timeout: the
    /// line was an unsolicited notification, a submit reply, unparseable,
    /// or the read simply timed out. Only a closed or broken socket is an
    /// error.
    pub fn next_job(&mut self) -> StratumResult<Option<JobNotification>> {
        if let Some(job) = self.pending.pop_front() {
            return Ok(Some(job));
        }

        match self.read_line()? {
            Some(line) => Ok(self.dispatch(&line)),
            None => Ok(None),
        }
    }

    /// Clone a write handle for the submitter thread.
    pub fn submit_sink(&self) -> StratumResult<SubmitSink> {
        Ok(SubmitSink {
            stream: self.stream.try_clone()?,
        })
    }

    /// Clone a liveness probe for use during scanning.
    pub fn probe(&self) -> StratumResult<LivenessProbe> {
        Ok(LivenessProbe {
            stream: self.stream.try_clone()?,
            io_timeout: self.io_timeout,
        })
    }

    fn send(&mut self, msg: &JsonRpcMessage) -> StratumResult<()> {
        let mut line = serde_json::to_string(msg)
            .map_err(|e| StratumError::InvalidMessage(e.to_string()))?;
        line.push('\n');
        self.stream.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Read one line within the timeout. `Ok(None)` on timeout; a partial
    /// line stays buffered and completes on a later call.
    fn read_line(&mut self) -> StratumResult<Option<String>> {
        match self.reader.read_until(b'\n', &mut self.line) {
            Ok(0) => Err(StratumError::Disconnected),
            Ok(_) => {
                let line = String::from_utf8_lossy(&self.line).trim().to_string();
                self.line.clear();
                Ok(Some(line))
            }
            Err(e) if is_timeout(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Wait for the response with the given id, stashing any jobs that
    /// arrive in between. During the handshake an expired read timeout
    /// means the pool is unresponsive, which is fatal for the session.
    fn wait_response(&mut self, id: u64) -> StratumResult<(Value, Option<Value>)> {
        loop {
            let line = self.read_line()?.ok_or(StratumError::Timeout)?;

            let msg: JsonRpcMessage = match serde_json::from_str(&line) {
                Ok(msg) => msg,
                Err(e) => {
                    warn!(error = %e, "skipping unparseable pool line");
                    continue;
                }
            };

            match msg {
                JsonRpcMessage::Response {
                    id: got,
                    result,
                    error,
                } if got == id => {
                    let error = error.filter(|e| !e.is_null());
                    return Ok((result.unwrap_or(Value::Null), error));
                }
                other => {
                    // Buffers notifies, swallows difficulty lines.
                    self.stash(other);
                }
            }
        }
    }

    /// Interpret one inbound line, returning a job if it carried one.
    fn dispatch(&mut self, line: &str) -> Option<JobNotification> {
        let msg: JsonRpcMessage = match serde_json::from_str(line) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(error = %e, "skipping unparseable pool line");
                return None;
            }
        };

        match msg {
            JsonRpcMessage::Request { method, params, .. } if method == "mining.notify" => {
                let params = params.as_array().cloned().unwrap_or_default();
                match JobNotification::from_stratum_params(&params) {
                    Ok(job) => Some(job),
                    Err(e) => {
                        warn!(error = %e, "skipping malformed mining.notify");
                        None
                    }
                }
            }
            other => {
                self.stash(other);
                None
            }
        }
    }

    /// Handle a message that is not the caller's business: buffer jobs,
    /// log submit replies, silently consume the rest.
    fn stash(&mut self, msg: JsonRpcMessage) {
        match msg {
            JsonRpcMessage::Request { method, params, .. } if method == "mining.notify" => {
                let params = params.as_array().cloned().unwrap_or_default();
                if let Ok(job) = JobNotification::from_stratum_params(&params) {
                    self.pending.push_back(job);
                }
            }
            JsonRpcMessage::Request { method, .. } => {
                debug!(%method, "ignoring server notification");
            }
            JsonRpcMessage::Response { id, result, error } if id == SUBMIT_ID => {
                let accepted =
                    error.map_or(true, |e| e.is_null()) && result.is_some_and(|r| r == json!(true));
                if accepted {
                    info!("share accepted by pool");
                } else {
                    warn!("share rejected by pool");
                }
            }
            JsonRpcMessage::Response { id, .. } => {
                debug!(msg_id = id, "ignoring stray response");
            }
        }
    }
}

/// Write half handed to the submitter thread.
pub struct SubmitSink {
    stream: TcpStream,
}

impl SubmitSink {
    #[cfg(test)]
    pub(crate) fn from_stream(stream: TcpStream) -> Self {
        Self { stream }
    }

    /// Write one submit line. Fire and forget; the reply is consumed by
    /// the job-reading side.
    pub fn submit(&mut self, line: &str) -> io::Result<()> {
        self.stream.write_all(line.as_bytes())
    }
}

/// Cheap connection liveness check for the scan loop.
///
/// A peek with a millisecond read timeout distinguishes a live socket
/// (data, or nothing yet) from a dead one (EOF or a hard error). The
/// receive timeout is restored afterwards; it is shared with the reader
/// handle, but only the owning worker thread reads.
pub struct LivenessProbe {
    stream: TcpStream,
    io_timeout: Duration,
}

impl LivenessProbe {
    pub fn is_connected(&self) -> bool {
        if self
            .stream
            .set_read_timeout(Some(Duration::from_millis(1)))
            .is_err()
        {
            return false;
        }

        let mut byte = [0u8; 1];
        let alive = match self.stream.peek(&mut byte) {
            Ok(0) => false,
            Ok(_) => true,
            Err(e) => is_timeout(&e),
        };

        let _ = self.stream.set_read_timeout(Some(self.io_timeout));
        alive
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

fn parse_subscription(result: &Value) -> StratumResult<Subscription> {
    let arr = result
        .as_array()
        .ok_or_else(|| StratumError::SubscribeFailed("result is not an array".to_string()))?;
    if arr.len() < 3 {
        return Err(StratumError::SubscribeFailed(
            "result is too short".to_string(),
        ));
    }

    let extranonce1_hex = arr[1]
        .as_str()
        .ok_or_else(|| StratumError::SubscribeFailed("extranonce1 is not a string".to_string()))?;
    let extranonce1 = hex::decode(extranonce1_hex)
        .map_err(|e| StratumError::SubscribeFailed(format!("extranonce1 hex: {e}")))?;

    let extranonce2_size = arr[2]
        .as_u64()
        .ok_or_else(|| StratumError::SubscribeFailed("extranonce2_size is not a number".to_string()))?
        as usize;

    Ok(Subscription {
        extranonce1,
        extranonce2_size,
    })
}
