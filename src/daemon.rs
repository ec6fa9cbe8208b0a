//! Daemon lifecycle management.
//!
//! Spawns the worker threads, runs the periodic stats reporter, installs
//! signal handlers, and coordinates graceful shutdown. Async work (signals,
//! the reporter interval) stays on the Tokio runtime; the miners themselves
//! are plain OS threads because they are CPU-bound and do blocking socket
//! I/O.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::signal::unix::{self, SignalKind};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::config::Config;
use crate::engine::Worker;
use crate::stats::StatsRegistry;
use crate::tracing::prelude::*;

/// How often the stats reporter logs a snapshot.
const REPORT_INTERVAL: Duration = Duration::from_secs(5);

/// The main daemon.
pub struct Daemon {
    config: Arc<Config>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl Daemon {
    /// Create a new daemon instance.
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Run the daemon until shutdown is requested.
    pub async fn run(self) -> anyhow::Result<()> {
        let stats = Arc::new(StatsRegistry::new());
        let stop_workers = Arc::new(AtomicBool::new(false));

        let available_cores = core_affinity::get_core_ids().unwrap_or_default();
        let mut workers = Vec::with_capacity(self.config.workers);
        for id in 0..self.config.workers {
            let worker = Worker::new(
                id,
                Arc::clone(&self.config),
                Arc::clone(&stats),
                Arc::clone(&stop_workers),
            );

            let pin = self
                .config
                .pin_cpus
                .get(id % self.config.pin_cpus.len().max(1))
                .and_then(|wanted| available_cores.iter().find(|c| c.id == *wanted))
                .copied();

            let handle = std::thread::Builder::new()
                .name(format!("miner-{id}"))
                .spawn(move || {
                    if let Some(core) = pin {
                        if core_affinity::set_for_current(core) {
                            debug!(worker = id, core = core.id, "pinned worker");
                        } else {
                            warn!(worker = id, core = core.id, "failed to pin worker");
                        }
                    }
                    worker.run();
                })?;
            workers.push(handle);
        }
        info!(workers = self.config.workers, "mining started");

        // Stats reporter.
        self.tracker.spawn({
            let stats = Arc::clone(&stats);
            let shutdown = self.shutdown.clone();
            async move {
                let mut interval = tokio::time::interval(REPORT_INTERVAL);
                interval.tick().await; // first tick is immediate and boring
                loop {
                    tokio::select! {
                        _ = interval.tick() => report(&stats),
                        _ = shutdown.cancelled() => break,
                    }
                }
            }
        });
        self.tracker.close();

        // Install signal handlers.
        let mut sigint = unix::signal(SignalKind::interrupt())?;
        let mut sigterm = unix::signal(SignalKind::terminate())?;

        tokio::select! {
            _ = sigint.recv() => info!("Received SIGINT"),
            _ = sigterm.recv() => info!("Received SIGTERM"),
        }

        // Initiate shutdown. Workers notice the flag at their next stats
        // interval or read timeout.
        self.shutdown.cancel();
        stop_workers.store(true, Ordering::Relaxed);

        self.tracker.wait().await;
        for handle in workers {
            let _ = handle.join();
        }
        info!("Exiting.");

        Ok(())
    }
}

fn report(stats: &StatsRegistry) {
    let snap = stats.snapshot();
    let secs = snap.uptime.as_secs_f64();
    let kilohashes = if secs > 0.0 {
        snap.hashes as f64 / secs / 1000.0
    } else {
        0.0
    };

    info!(
        hashrate = %format!("{kilohashes:.2} KH/s"),
        templates = snap.templates,
        halfshares = snap.halfshares,
        shares = snap.shares,
        valids = snap.valids,
        dropped = snap.dropped,
        "mining stats"
    );

    if snap.block_found {
        info!("a block was found this session, check your wallet");
    }
}
