//! Load config from file and environment.

use std::path::PathBuf;
use std::time::Duration;

use ndnfs_core::config as defaults;
use serde::Deserialize;

/// Consumer configuration. File: ~/.config/ndnfs/config.toml or /etc/ndnfs/config.toml.
/// Env overrides: NDNFS_FORWARDER, NDNFS_PREFIX, NDNFS_WINDOW, NDNFS_LOG.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Forwarder TCP address (default 127.0.0.1:6363).
    #[serde(default = "default_forwarder")]
    pub forwarder: String,
    /// Root name prefix (default /ndn/xrootd).
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Outstanding request window (default 64).
    #[serde(default = "default_window")]
    pub window: usize,
    #[serde(default = "default_interest_lifetime_ms")]
    pub interest_lifetime_ms: u64,
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
    #[serde(default = "default_max_nack_congestion")]
    pub max_nack_congestion: u32,
    #[serde(default = "default_max_nack_duplicate")]
    pub max_nack_duplicate: u32,
    #[serde(default = "default_max_timeouts")]
    pub max_timeouts: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub congestion_backoff_base_ms: u64,
    #[serde(default = "default_backoff_cap_ms")]
    pub congestion_backoff_cap_ms: u64,
    /// Bytes per read_at call when copying a file (default 3 MiB).
    #[serde(default = "default_read_chunk_size")]
    pub read_chunk_size: usize,
    /// Log filter used when RUST_LOG is unset (default info).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_forwarder() -> String {
    "127.0.0.1:6363".to_string()
}
fn default_prefix() -> String {
    ndnfs_core::namespace::DEFAULT_PREFIX.to_string()
}
fn default_window() -> usize {
    defaults::DEFAULT_WINDOW
}
fn default_interest_lifetime_ms() -> u64 {
    ndnfs_core::namespace::DEFAULT_INTEREST_LIFETIME.as_millis() as u64
}
fn default_sweep_interval_ms() -> u64 {
    defaults::DEFAULT_SWEEP_INTERVAL.as_millis() as u64
}
fn default_max_nack_congestion() -> u32 {
    defaults::DEFAULT_MAX_NACK_CONGESTION
}
fn default_max_nack_duplicate() -> u32 {
    defaults::DEFAULT_MAX_NACK_DUPLICATE
}
fn default_max_timeouts() -> u32 {
    defaults::DEFAULT_MAX_TIMEOUTS
}
fn default_backoff_base_ms() -> u64 {
    defaults::DEFAULT_CONGESTION_BACKOFF_BASE.as_millis() as u64
}
fn default_backoff_cap_ms() -> u64 {
    defaults::DEFAULT_CONGESTION_BACKOFF_CAP.as_millis() as u64
}
fn default_read_chunk_size() -> usize {
    3 * 1024 * 1024
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            forwarder: default_forwarder(),
            prefix: default_prefix(),
            window: default_window(),
            interest_lifetime_ms: default_interest_lifetime_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
            max_nack_congestion: default_max_nack_congestion(),
            max_nack_duplicate: default_max_nack_duplicate(),
            max_timeouts: default_max_timeouts(),
            congestion_backoff_base_ms: default_backoff_base_ms(),
            congestion_backoff_cap_ms: default_backoff_cap_ms(),
            read_chunk_size: default_read_chunk_size(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Pipeline and reader settings. Segment size is part of the naming
    /// contract with the responder and is not configurable here.
    pub fn fetch_config(&self) -> ndnfs_core::Config {
        ndnfs_core::Config {
            prefix: self.prefix.clone(),
            window: self.window,
            interest_lifetime: Duration::from_millis(self.interest_lifetime_ms),
            sweep_interval: Duration::from_millis(self.sweep_interval_ms),
            max_nack_congestion: self.max_nack_congestion,
            max_nack_duplicate: self.max_nack_duplicate,
            max_timeouts: self.max_timeouts,
            congestion_backoff_base: Duration::from_millis(self.congestion_backoff_base_ms),
            congestion_backoff_cap: Duration::from_millis(self.congestion_backoff_cap_ms),
            ..ndnfs_core::Config::default()
        }
    }
}

/// Load config: merge default, then config file (if present), then env vars.
pub fn load() -> Config {
    let c = load_file().unwrap_or_default();
    apply_env(c, |key| std::env::var(key).ok())
}

fn apply_env(mut c: Config, var: impl Fn(&str) -> Option<String>) -> Config {
    if let Some(s) = var("NDNFS_FORWARDER") {
        c.forwarder = s;
    }
    if let Some(s) = var("NDNFS_PREFIX") {
        c.prefix = s;
    }
    if let Some(s) = var("NDNFS_WINDOW") {
        if let Ok(w) = s.parse::<usize>() {
            c.window = w;
        }
    }
    if let Some(s) = var("NDNFS_LOG") {
        c.log_level = s;
    }
    c
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/ndnfs/config.toml"));
    }
    out.push(PathBuf::from("/etc/ndnfs/config.toml"));
    out
}

fn load_file() -> Option<Config> {
    for p in config_paths() {
        if p.exists() {
            match std::fs::read_to_string(&p) {
                Ok(s) => match toml::from_str::<Config>(&s) {
                    Ok(c) => return Some(c),
                    Err(e) => eprintln!("ignoring {}: {}", p.display(), e),
                },
                Err(e) => eprintln!("cannot read {}: {}", p.display(), e),
            }
            break;
        }
    }
    None
}
