//! The mining engine.
//!
//! Each worker runs a session loop on its own OS thread: connect,
//! handshake, then alternate between reading jobs and scanning the nonce
//! space. A second thread per session drains the bounded share queue and
//! writes submissions, so the hash loop never blocks on the network.
//!
//! Scan-local counters flush into the shared [`StatsRegistry`] every
//! [`STATS_INTERVAL`] nonces, which is also when the loop checks liveness
//! and yields. Between those points the loop is pure arithmetic.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread;

use crate::config::Config;
use crate::difficulty;
use crate::header::{self, HeaderWork};
use crate::sha256;
use crate::stats::StatsRegistry;
use crate::stratum::{
    Classification, Extranonce, JobNotification, LivenessProbe, PoolClient, ShareCandidate,
    StratumError, SubmitSink,
};
use crate::target::Target;
use crate::tracing::prelude::*;

/// Nonces per inner batch.
const BATCH: u32 = 100_000;

/// Nonces between stats flushes, liveness checks, and yields.
const STATS_INTERVAL: u32 = 175_000;

/// Depth of the bounded share submission queue.
const SHARE_QUEUE_DEPTH: usize = 10;

/// Outcome of one scan pass over a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanOutcome {
    /// All 2^32 nonces tried without a block solution.
    Exhausted,
    /// A block solution was found and queued; re-read the job stream.
    BlockFound,
    /// The connection died or shutdown was requested.
    Aborted,
}

/// One mining worker: a session loop over its own pool connection.
pub struct Worker {
    id: usize,
    config: Arc<Config>,
    stats: Arc<StatsRegistry>,
    shutdown: Arc<AtomicBool>,
}

impl Worker {
    pub fn new(
        id: usize,
        config: Arc<Config>,
        stats: Arc<StatsRegistry>,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            id,
            config,
            stats,
            shutdown,
        }
    }

    /// Run sessions until shutdown. Every failure tears the session down
    /// and reconnects after the configured delay.
    pub fn run(&self) {
        loop {
            match self.session() {
                Err(StratumError::Shutdown) => break,
                Err(e) => {
                    warn!(worker = self.id, error = %e, "session ended, will reconnect");
                }
                Ok(()) => {}
            }

            if self.shutdown.load(Ordering::Relaxed) {
                break;
            }
            thread::sleep(self.config.reconnect_delay);
        }
        info!(worker = self.id, "worker stopped");
    }

    /// One connection lifetime: handshake, submitter, job loop, teardown.
    fn session(&self) -> Result<(), StratumError> {
        let cfg = &self.config;
        let mut client = PoolClient::connect(
            &cfg.pool_host,
            cfg.pool_port,
            cfg.io_timeout,
            cfg.connect_backoff,
            &self.shutdown,
        )?;
        client.handshake(&cfg.address, &cfg.password)?;
        info!(
            worker = self.id,
            extranonce2_size = client.extranonce2_size(),
            "subscribed and authorized"
        );

        let (share_tx, share_rx) = std::sync::mpsc::sync_channel(SHARE_QUEUE_DEPTH);
        let connected = Arc::new(AtomicBool::new(true));

        let submitter = {
            let sink = client.submit_sink()?;
            let address = cfg.address.clone();
            let connected = Arc::clone(&connected);
            thread::Builder::new()
                .name(format!("submit-{}", self.id))
                .spawn(move || submitter_loop(sink, share_rx, &address, &connected))?
        };

        let probe = client.probe()?;
        let result = self.job_loop(&mut client, &share_tx, &probe, &connected);

        // Cooperative teardown: close the queue, let the submitter drain
        // what it holds, join it, and only then drop the socket.
        drop(share_tx);
        let _ = submitter.join();
        result
    }

    fn job_loop(
        &self,
        client: &mut PoolClient,
        share_tx: &SyncSender<ShareCandidate>,
        probe: &LivenessProbe,
        connected: &AtomicBool,
    ) -> Result<(), StratumError> {
        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                return Err(StratumError::Shutdown);
            }
            if !connected.load(Ordering::Relaxed) {
                return Err(StratumError::Disconnected);
            }

            let Some(job) = client.next_job()? else {
                continue;
            };
            self.stats.record_template();
            debug!(
                worker = self.id,
                job_id = %job.job_id,
                clean = job.clean_jobs,
                "new job"
            );

            let extranonce2 = Extranonce::random(client.extranonce2_size());
            let work = header::build(&job, client.extranonce1(), &extranonce2);
            let target = Target::from_compact(job.nbits);

            match self.scan(&work, &target, &job, &extranonce2, share_tx, probe, connected) {
                ScanOutcome::BlockFound => {
                    info!(worker = self.id, job_id = %job.job_id, "block solution queued");
                }
                ScanOutcome::Exhausted => {
                    debug!(worker = self.id, "nonce space exhausted, waiting for work");
                }
                ScanOutcome::Aborted => {
                    if self.shutdown.load(Ordering::Relaxed) {
                        return Err(StratumError::Shutdown);
                    }
                    return Err(StratumError::Disconnected);
                }
            }
        }
    }

    /// Scan the full nonce space against one job.
    #[allow(clippy::too_many_arguments)]
    fn scan(
        &self,
        work: &HeaderWork,
        target: &Target,
        job: &JobNotification,
        extranonce2: &Extranonce,
        share_tx: &SyncSender<ShareCandidate>,
        probe: &LivenessProbe,
        connected: &AtomicBool,
    ) -> ScanOutcome {
        let mut local_hashes: u64 = 0;
        let mut local_halfshares: u64 = 0;
        let mut local_shares: u64 = 0;
        let mut since_flush: u32 = 0;

        let mut cursor: u64 = 0;
        while cursor <= u32::MAX as u64 {
            let batch_end = (cursor + BATCH as u64).min(u32::MAX as u64 + 1);

            while cursor < batch_end {
                let nonce = cursor as u32;
                cursor += 1;
                local_hashes += 1;

                let Some(hash) = sha256::final_rounds(&work.midstate, nonce) else {
                    continue;
                };

                if hash[28..32] != [0u8; 4] {
                    // The prefilter already proved the low 16 bits zero.
                    local_halfshares += 1;
                    continue;
                }

                local_halfshares += 1;
                local_shares += 1;

                let valid = target.is_met_by(&hash);
                let share = ShareCandidate {
                    job_id: job.job_id.clone(),
                    extranonce2: extranonce2.clone(),
                    ntime: job.ntime,
                    nonce,
                    classification: if valid {
                        Classification::Valid
                    } else {
                        Classification::Share
                    },
                };
                info!(
                    worker = self.id,
                    job_id = %share.job_id,
                    nonce = %format!("{:#010x}", nonce),
                    difficulty = difficulty::of_hash(&hash),
                    valid,
                    "share found"
                );

                if valid {
                    self.stats.record_valid();
                    self.stats
                        .add_scan(local_hashes, local_halfshares, local_shares);
                    // A solution must not be lost to a full queue; block
                    // until the submitter takes it, then rejoin the job
                    // stream.
                    let _ = share_tx.send(share);
                    return ScanOutcome::BlockFound;
                }

                match share_tx.try_send(share) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        self.stats.record_dropped();
                        warn!(worker = self.id, "share queue full, dropping share");
                    }
                    Err(TrySendError::Disconnected(_)) => {
                        connected.store(false, Ordering::Relaxed);
                    }
                }
            }

            since_flush += BATCH;
            if since_flush >= STATS_INTERVAL {
                self.stats
                    .add_scan(local_hashes, local_halfshares, local_shares);
                local_hashes = 0;
                local_halfshares = 0;
                local_shares = 0;
                since_flush = 0;

                if self.shutdown.load(Ordering::Relaxed)
                    || !connected.load(Ordering::Relaxed)
                    || !probe.is_connected()
                {
                    return ScanOutcome::Aborted;
                }
                thread::yield_now();
            }
        }

        self.stats
            .add_scan(local_hashes, local_halfshares, local_shares);
        ScanOutcome::Exhausted
    }
}

/// Submitter half of a session: one write per dequeued share, in queue
/// order. Exits when the queue closes or the socket breaks.
fn submitter_loop(
    mut sink: SubmitSink,
    shares: Receiver<ShareCandidate>,
    address: &str,
    connected: &AtomicBool,
) {
    while let Ok(share) = shares.recv() {
        let line = share.to_submit_line(address);
        debug!(
            job_id = %share.job_id,
            nonce = %format!("{:08x}", share.nonce),
            "submitting share"
        );

        if let Err(e) = sink.submit(&line) {
            warn!(error = %e, "share submission failed");
            connected.store(false, Ordering::Relaxed);
            break;
        }

        if share.classification == Classification::Valid {
            info!("*** BLOCK FOUND *** check your wallet");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::sync_channel;

    fn share(nonce: u32) -> ShareCandidate {
        ShareCandidate {
            job_id: "j".to_string(),
            extranonce2: Extranonce::from_bytes(&[0, 0, 0, 1]),
            ntime: 0x495fab29,
            nonce,
            classification: Classification::Share,
        }
    }

    #[test]
    fn test_queue_drops_eleventh_share_and_keeps_order() {
        // Submitter blocked: nothing reads the queue while we enqueue.
        let (tx, rx) = sync_channel::<ShareCandidate>(SHARE_QUEUE_DEPTH);

        let mut dropped = 0;
        for nonce in 0..11u32 {
            match tx.try_send(share(nonce)) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => dropped += 1,
                Err(e) => panic!("unexpected: {e:?}"),
            }
        }
        assert_eq!(dropped, 1, "exactly the eleventh share is dropped");

        // The submitter then drains the first ten in enqueue order.
        let drained: Vec<u32> = rx.try_iter().map(|s| s.nonce).collect();
        assert_eq!(drained, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_submitter_writes_shares_in_order() {
        use crate::stratum::SubmitSink;
        use std::io::BufRead;
        use std::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let pool = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let reader = std::io::BufReader::new(stream);
            reader.lines().map_while(Result::ok).collect::<Vec<_>>()
        });

        let stream = std::net::TcpStream::connect(("127.0.0.1", port)).unwrap();
        let sink = SubmitSink::from_stream(stream);

        let (tx, rx) = sync_channel::<ShareCandidate>(SHARE_QUEUE_DEPTH);
        let connected = Arc::new(AtomicBool::new(true));
        let submitter = {
            let connected = Arc::clone(&connected);
            thread::spawn(move || submitter_loop(sink, rx, "bc1qexample", &connected))
        };

        for nonce in [7u32, 11, 13] {
            tx.send(share(nonce)).unwrap();
        }
        drop(tx); // session teardown closes the queue
        submitter.join().unwrap();

        let lines = pool.join().unwrap();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("\"00000007\""));
        assert!(lines[1].contains("\"0000000b\""));
        assert!(lines[2].contains("\"0000000d\""));
        for line in &lines {
            assert!(line.contains("\"mining.submit\""));
            assert!(line.contains("bc1qexample"));
        }
        assert!(connected.load(Ordering::Relaxed));
    }

    #[test]
    fn test_valid_share_blocks_instead_of_dropping() {
        let (tx, rx) = sync_channel::<ShareCandidate>(1);
        tx.try_send(share(1)).unwrap();

        // Queue is full; a blocking send must still get through once the
        // consumer drains.
        let sender = thread::spawn(move || {
            let mut valid = share(2);
            valid.classification = Classification::Valid;
            tx.send(valid).unwrap();
        });

        assert_eq!(rx.recv().unwrap().nonce, 1);
        assert_eq!(rx.recv().unwrap().nonce, 2);
        sender.join().unwrap();
    }
}
