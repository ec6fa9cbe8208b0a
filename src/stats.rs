//! Shared mining statistics.
//!
//! One registry is shared by every worker and the stats reporter. Workers
//! accumulate counters locally while scanning and flush them here in
//! batches, so the mutex is taken a handful of times per second rather than
//! per nonce. Readers take a consistent snapshot.
//!
//! The counters reset when any of them reaches [`RESET_SENTINEL`] or the
//! session exceeds [`RESET_UPTIME`]; the session start rebases to now so
//! derived rates stay meaningful. The block-found flag survives resets.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Counter value at which the registry resets, matching the display width
/// the counters were originally sized for.
pub const RESET_SENTINEL: u64 = 65_536_000;

/// Session length at which the registry resets.
pub const RESET_UPTIME: Duration = Duration::from_secs(3600);

#[derive(Debug)]
struct Counters {
    session_start: Instant,
    templates: u64,
    hashes: u64,
    halfshares: u64,
    shares: u64,
    valids: u64,
    dropped: u64,
    block_found: bool,
    block_found_at: Option<Instant>,
}

impl Counters {
    fn new() -> Self {
        Self {
            session_start: Instant::now(),
            templates: 0,
            hashes: 0,
            halfshares: 0,
            shares: 0,
            valids: 0,
            dropped: 0,
            block_found: false,
            block_found_at: None,
        }
    }
}

/// The process-wide statistics registry.
#[derive(Debug)]
pub struct StatsRegistry {
    inner: Mutex<Counters>,
}

/// A point-in-time view of the registry.
#[derive(Debug, Clone, Copy)]
pub struct StatsSnapshot {
    pub uptime: Duration,
    pub templates: u64,
    pub hashes: u64,
    pub halfshares: u64,
    pub shares: u64,
    pub valids: u64,
    pub dropped: u64,
    pub block_found: bool,
    pub block_found_ago: Option<Duration>,
}

impl StatsRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Counters::new()),
        }
    }

    /// Flush one batch of scan-local counters.
    pub fn add_scan(&self, hashes: u64, halfshares: u64, shares: u64) {
        let mut c = self.inner.lock().unwrap();
        c.hashes += hashes;
        c.halfshares += halfshares;
        c.shares += shares;
    }

    /// Count a received job template.
    pub fn record_template(&self) {
        self.inner.lock().unwrap().templates += 1;
    }

    /// Record a block solution.
    pub fn record_valid(&self) {
        let mut c = self.inner.lock().unwrap();
        c.valids += 1;
        c.block_found = true;
        c.block_found_at = Some(Instant::now());
    }

    /// Count a share dropped because the submission queue was full.
    pub fn record_dropped(&self) {
        self.inner.lock().unwrap().dropped += 1;
    }

    /// Snapshot the counters, applying the overflow reset first.
    pub fn snapshot(&self) -> StatsSnapshot {
        let mut c = self.inner.lock().unwrap();
        let now = Instant::now();

        let overflowed = [c.templates, c.hashes, c.halfshares, c.shares, c.valids]
            .iter()
            .any(|&v| v >= RESET_SENTINEL);
        if overflowed || now.duration_since(c.session_start) >= RESET_UPTIME {
            c.templates = 0;
            c.hashes = 0;
            c.halfshares = 0;
            c.shares = 0;
            c.valids = 0;
            c.dropped = 0;
            c.session_start = now;
        }

        StatsSnapshot {
            uptime: now.duration_since(c.session_start),
            templates: c.templates,
            hashes: c.hashes,
            halfshares: c.halfshares,
            shares: c.shares,
            valids: c.valids,
            dropped: c.dropped,
            block_found: c.block_found,
            block_found_ago: c.block_found_at.map(|at| now.duration_since(at)),
        }
    }
}

impl Default for StatsRegistry {
    fn default() -> Self {
        Self::new()
    }
}
