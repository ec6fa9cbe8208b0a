//! Runtime configuration.
//!
//! Everything comes from environment variables so the binary can run under
//! systemd or a container without a config file:
//!
//! - `POOL_URL`: pool address as `host:port`, optionally with a
//!   `stratum+tcp://` scheme (default: `solo.ckpool.org:3333`)
//! - `POOL_ADDRESS`: payout address, used as the Stratum username (required)
//! - `POOL_PASS`: Stratum password (default: `x`; solo pools ignore it)
//! - `SOLOMINER_THREADS`: number of workers, each with its own pool
//!   connection (default: 1)
//! - `SOLOMINER_CORES`: comma-separated CPU ids to pin workers to,
//!   round-robin (default: no pinning)
//! - `SOLOMINER_DEBUG`: set to `1` or `true` to raise the log level

use anyhow::{bail, Context, Result};
use std::time::Duration;

const DEFAULT_POOL: &str = "solo.ckpool.org:3333";

/// Miner configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Pool hostname.
    pub pool_host: String,

    /// Pool TCP port.
    pub pool_port: u16,

    /// Payout address, doubling as the Stratum username.
    pub address: String,

    /// Stratum password.
    pub password: String,

    /// Number of worker threads.
    pub workers: usize,

    /// CPU ids to pin workers to, assigned round-robin. Empty disables
    /// pinning.
    pub pin_cpus: Vec<usize>,

    /// Raise the default log level to DEBUG.
    pub debug: bool,

    /// Socket read/write timeout.
    pub io_timeout: Duration,

    /// Delay before reconnecting after a session failure.
    pub reconnect_delay: Duration,

    /// Delay between connection attempts.
    pub connect_backoff: Duration,
}

impl Config {
    /// Parse configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let url = std::env::var("POOL_URL").unwrap_or_else(|_| DEFAULT_POOL.to_string());
        let (pool_host, pool_port) = parse_pool_url(&url)?;

        let address =
            std::env::var("POOL_ADDRESS").context("POOL_ADDRESS must be set to a payout address")?;
        if address.is_empty() {
            bail!("POOL_ADDRESS is empty");
        }

        let password = std::env::var("POOL_PASS").unwrap_or_else(|_| "x".to_string());

        let workers = match std::env::var("SOLOMINER_THREADS") {
            Ok(s) => s
                .parse::<usize>()
                .ok()
                .filter(|&n| n >= 1)
                .with_context(|| format!("invalid SOLOMINER_THREADS: {s:?}"))?,
            Err(_) => 1,
        };

        let pin_cpus = match std::env::var("SOLOMINER_CORES") {
            Ok(s) => parse_core_list(&s)?,
            Err(_) => Vec::new(),
        };

        let debug = std::env::var("SOLOMINER_DEBUG")
            .map(|s| s == "1" || s.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Ok(Self {
            pool_host,
            pool_port,
            address,
            password,
            workers,
            pin_cpus,
            debug,
            io_timeout: Duration::from_secs(10),
            reconnect_delay: Duration::from_secs(3),
            connect_backoff: Duration::from_secs(5),
        })
    }
}

/// Split `host:port`, tolerating a `stratum+tcp://` prefix.
fn parse_pool_url(url: &str) -> Result<(String, u16)> {
    let trimmed = url
        .strip_prefix("stratum+tcp://")
        .unwrap_or(url)
        .trim_end_matches('/');

    let (host, port) = trimmed
        .rsplit_once(':')
        .with_context(|| format!("POOL_URL {url:?} is missing a port"))?;
    if host.is_empty() {
        bail!("POOL_URL {url:?} is missing a host");
    }

    let port = port
        .parse::<u16>()
        .with_context(|| format!("POOL_URL {url:?} has an invalid port"))?;

    Ok((host.to_string(), port))
}

fn parse_core_list(s: &str) -> Result<Vec<usize>> {
    s.split(',')
        .filter(|part| !part.trim().is_empty())
        .map(|part| {
            part.trim()
                .parse::<usize>()
                .with_context(|| format!("invalid CPU id in SOLOMINER_CORES: {part:?}"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for var in [
            "POOL_URL",
            "POOL_ADDRESS",
            "POOL_PASS",
            "SOLOMINER_THREADS",
            "SOLOMINER_CORES",
            "SOLOMINER_DEBUG",
        ] {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_requires_address() {
        clear_env();
        assert!(Config::from_env().is_err());
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear_env();
        std::env::set_var("POOL_ADDRESS", "bc1qexample");

        let config = Config::from_env().unwrap();
        assert_eq!(config.pool_host, "solo.ckpool.org");
        assert_eq!(config.pool_port, 3333);
        assert_eq!(config.password, "x");
        assert_eq!(config.workers, 1);
        assert!(config.pin_cpus.is_empty());
        assert!(!config.debug);
        assert_eq!(config.io_timeout, Duration::from_secs(10));
        assert_eq!(config.reconnect_delay, Duration::from_secs(3));
    }

    #[test]
    #[serial]
    fn test_full_configuration() {
        clear_env();
        std::env::set_var("POOL_URL", "stratum+tcp://pool.example.net:4242");
        std::env::set_var("POOL_ADDRESS", "bc1qexample");
        std::env::set_var("SOLOMINER_THREADS", "4");
        std::env::set_var("SOLOMINER_CORES", "0,2, 4");
        std::env::set_var("SOLOMINER_DEBUG", "true");

        let config = Config::from_env().unwrap();
        assert_eq!(config.pool_host, "pool.example.net");
        assert_eq!(config.pool_port, 4242);
        assert_eq!(config.workers, 4);
        assert_eq!(config.pin_cpus, vec![0, 2, 4]);
        assert!(config.debug);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_rejects_zero_workers() {
        clear_env();
        std::env::set_var("POOL_ADDRESS", "bc1qexample");
        std::env::set_var("SOLOMINER_THREADS", "0");
        assert!(Config::from_env().is_err());
        clear_env();
    }

    #[test]
    fn test_parse_pool_url() {
        assert_eq!(
            parse_pool_url("example.com:3333").unwrap(),
            ("example.com".to_string(), 3333)
        );
        assert!(parse_pool_url("example.com").is_err());
        assert!(parse_pool_url(":3333").is_err());
        assert!(parse_pool_url("example.com:notaport").is_err());
    }
}
