//! Configuration system for muster.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $MUSTER_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/muster/config.toml
//!   3. ~/.config/muster/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::wire;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MusterConfig {
    pub network: NetworkConfig,
    pub timing: TimingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// UDP port to bind, and the port assumed for hostfile entries
    /// without an explicit one.
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Delay before the first HELLO broadcast, in milliseconds.
    pub settle_delay_ms: u64,
    /// Delay between broadcast rounds, in milliseconds.
    pub round_interval_ms: u64,
    /// Maximum broadcast rounds before the run is a timeout.
    pub max_rounds: u32,
    /// Hostname resolution attempts per peer.
    pub resolve_attempts: u32,
    /// Delay between resolution attempts, in milliseconds.
    pub resolve_retry_ms: u64,
    /// How long the receive loop keeps answering HELLOs after
    /// readiness, in milliseconds.
    pub ready_grace_ms: u64,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for MusterConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            timing: TimingConfig::default(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            port: wire::DEFAULT_PORT,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: wire::SETTLE_DELAY_MS,
            round_interval_ms: wire::ROUND_INTERVAL_MS,
            max_rounds: wire::MAX_ROUNDS,
            resolve_attempts: wire::RESOLVE_ATTEMPTS,
            resolve_retry_ms: wire::RESOLVE_RETRY_MS,
            ready_grace_ms: wire::READY_GRACE_MS,
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("muster")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl MusterConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            MusterConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("MUSTER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Apply MUSTER_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("MUSTER_NETWORK__PORT") {
            if let Ok(p) = v.parse() {
                self.network.port = p;
            }
        }
        if let Ok(v) = std::env::var("MUSTER_TIMING__SETTLE_DELAY_MS") {
            if let Ok(ms) = v.parse() {
                self.timing.settle_delay_ms = ms;
            }
        }
        if let Ok(v) = std::env::var("MUSTER_TIMING__ROUND_INTERVAL_MS") {
            if let Ok(ms) = v.parse() {
                self.timing.round_interval_ms = ms;
            }
        }
        if let Ok(v) = std::env::var("MUSTER_TIMING__MAX_ROUNDS") {
            if let Ok(n) = v.parse() {
                self.timing.max_rounds = n;
            }
        }
    }
}
