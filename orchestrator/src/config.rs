//! Configuration of a run.
//!
//! A [Config] is read once from a YAML file, validated, and passed by reference to
//! everything that needs it. Components never read the environment themselves.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};
use warden_cache::{resp, writer};
use warden_checks::{merge, parse, sync};
use warden_relay::http;

/// Application lists to check.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct Sources {
    pub staked: bool,
    pub gigastaked: bool,
    pub settlers: bool,
}

impl Default for Sources {
    fn default() -> Self {
        Self {
            staked: true,
            gigastaked: true,
            settlers: false,
        }
    }
}

/// Fork parameters of the only chain subject to the merge check.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct MergeConfig {
    pub chain: String,
    pub terminal_total_difficulty: String,
    pub merge_block_number: u64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Config {
    /// Prefixed to every cache key, so deployments of different versions never share
    /// results.
    pub commit_hash: String,
    /// Base URL of the dispatcher.
    pub dispatcher: String,
    /// Addresses (`host:port`) of the cache replicas.
    pub replicas: Vec<String>,
    #[serde(default)]
    pub sources: Sources,

    /// Maximum number of outbound calls in flight across the whole run.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_mailbox_size")]
    pub mailbox_size: usize,
    /// Number of replicas consulted before reusing a cached session.
    #[serde(default = "default_session_sample_size")]
    pub session_sample_size: usize,

    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
    #[serde(default = "default_run_timeout_ms")]
    pub run_timeout_ms: u64,
    #[serde(default = "default_relay_timeout_ms")]
    pub relay_timeout_ms: u64,
    #[serde(default = "default_cache_timeout_ms")]
    pub cache_timeout_ms: u64,

    #[serde(default = "default_sync_allowance")]
    pub default_sync_allowance: u64,
    #[serde(default = "default_altruist_trust_threshold")]
    pub altruist_trust_threshold: f64,

    #[serde(default)]
    pub merge: Option<MergeConfig>,
}

fn default_concurrency() -> usize {
    50
}

fn default_batch_size() -> usize {
    50
}

fn default_mailbox_size() -> usize {
    1024
}

fn default_session_sample_size() -> usize {
    3
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_session_ttl_secs() -> u64 {
    3600
}

fn default_run_timeout_ms() -> u64 {
    120_000
}

fn default_relay_timeout_ms() -> u64 {
    5_000
}

fn default_cache_timeout_ms() -> u64 {
    1_000
}

fn default_sync_allowance() -> u64 {
    5
}

fn default_altruist_trust_threshold() -> f64 {
    0.5
}

impl Config {
    /// Reads and validates the configuration at `path`.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let config: Self = serde_yaml::from_str(&std::fs::read_to_string(path)?)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.dispatcher.is_empty() {
            return Err(Error::InvalidConfig("dispatcher must be set".into()));
        }
        if self.replicas.is_empty() {
            return Err(Error::InvalidConfig(
                "at least one replica is required".into(),
            ));
        }
        if self.concurrency == 0 {
            return Err(Error::InvalidConfig("concurrency must be >= 1".into()));
        }
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be >= 1".into()));
        }
        if self.mailbox_size == 0 {
            return Err(Error::InvalidConfig("mailbox_size must be >= 1".into()));
        }
        if self.run_timeout_ms == 0 {
            return Err(Error::InvalidConfig("run_timeout_ms must be >= 1".into()));
        }
        if !(0.0..=1.0).contains(&self.altruist_trust_threshold) {
            return Err(Error::InvalidConfig(format!(
                "altruist_trust_threshold must be within [0, 1] (got {})",
                self.altruist_trust_threshold
            )));
        }
        if let Some(merge) = &self.merge {
            if merge.chain.is_empty() {
                return Err(Error::InvalidConfig("merge.chain must be set".into()));
            }
            parse::number(&merge.terminal_total_difficulty).map_err(|err| {
                Error::InvalidConfig(format!("merge.terminal_total_difficulty: {err}"))
            })?;
        }
        Ok(())
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_millis(self.run_timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn relay(&self) -> http::Config {
        http::Config {
            dispatcher: self.dispatcher.clone(),
            timeout: Duration::from_millis(self.relay_timeout_ms),
        }
    }

    pub fn replica(&self, address: &str) -> resp::Config {
        resp::Config {
            address: address.to_string(),
            timeout: Duration::from_millis(self.cache_timeout_ms),
        }
    }

    pub fn writer(&self) -> writer::Config {
        writer::Config {
            batch_size: self.batch_size,
            mailbox_size: self.mailbox_size,
        }
    }

    pub fn sync(&self) -> sync::Config {
        sync::Config {
            default_allowance: self.default_sync_allowance,
            altruist_trust_threshold: self.altruist_trust_threshold,
        }
    }

    pub fn merge(&self) -> Option<merge::Config> {
        self.merge.as_ref().map(|merge| merge::Config {
            chain: merge.chain.clone(),
            terminal_total_difficulty: merge.terminal_total_difficulty.clone(),
            merge_block_number: merge.merge_block_number,
        })
    }
}
