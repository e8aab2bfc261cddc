//! Read and write check results across cache replicas.
//!
//! Every region runs its own replica of a key-value cache. Results are published to all of
//! them through a single [writer::Writer] per run, and a [quorum] of them is consulted before
//! a new session is dispatched.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::{future::Future, time::Duration};
use thiserror::Error;
use warden_relay::Session;

pub mod memory;
#[cfg(any(test, feature = "mocks"))]
pub mod mocks;
pub mod quorum;
pub mod resp;
pub mod writer;

/// Errors that can occur when interacting with a [Cache].
#[derive(Error, Debug)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("server error: {0}")]
    Server(String),
    #[error("timed out")]
    Timeout,
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("connection closed")]
    Closed,
}

/// A value to write with its time-to-live.
///
/// Items have no identity beyond their key: the last write wins.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Item {
    pub key: String,
    pub value: Bytes,
    pub ttl: Duration,
}

impl Item {
    pub fn new(key: impl Into<String>, value: impl Into<Bytes>, ttl: Duration) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            ttl,
        }
    }

    /// Creates an item holding the JSON encoding of `value`.
    pub fn json<T: Serialize>(
        key: impl Into<String>,
        value: &T,
        ttl: Duration,
    ) -> Result<Self, Error> {
        Ok(Self::new(key, serde_json::to_vec(value)?, ttl))
    }
}

/// A single cache replica.
pub trait Cache: Clone + Send + Sync + 'static {
    /// Name of the replica, used in logs.
    fn name(&self) -> &str;

    /// Verifies the replica is reachable.
    fn ping(&self) -> impl Future<Output = Result<(), Error>> + Send;

    /// Reads the value stored at `key`, if any.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Bytes>, Error>> + Send;

    /// Writes all `items` in a single pipelined round trip.
    fn set(&self, items: &[Item]) -> impl Future<Output = Result<(), Error>> + Send;

    /// Lists keys matching a glob `pattern` (`*` matches any run of characters).
    fn keys(&self, pattern: &str) -> impl Future<Output = Result<Vec<String>, Error>> + Send;
}

/// A dispatched [Session] as stored in the cache, stamped with the network height at
/// which it was observed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedSession {
    pub session: Session,
    pub block_height: u64,
}

/// Matches `key` against a glob `pattern` where `*` matches any run of characters and `?`
/// matches exactly one.
pub(crate) fn glob(pattern: &str, key: &str) -> bool {
    let pattern = pattern.as_bytes();
    let key = key.as_bytes();
    let (mut p, mut k) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;
    while k < key.len() {
        if p < pattern.len() && (pattern[p] == b'?' || pattern[p] == key[k]) {
            p += 1;
            k += 1;
        } else if p < pattern.len() && pattern[p] == b'*' {
            backtrack = Some((p, k));
            p += 1;
        } else if let Some((star, matched)) = backtrack {
            p = star + 1;
            k = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }
    while p < pattern.len() && pattern[p] == b'*' {
        p += 1;
    }
    p == pattern.len()
}
