//! Errors that end a run.

use thiserror::Error;

/// Errors that can occur during a run.
///
/// Failures of a single node, replica or pair are absorbed (and logged) where they occur.
/// Only failures that make the whole run meaningless are returned.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The document store could not be read
    #[error("registry unavailable: {0}")]
    Registry(String),

    /// The current height of the network could not be determined
    #[error("failed to fetch current height")]
    Height(#[source] warden_relay::Error),

    /// Every cache replica failed to respond
    #[error("no cache replica reachable")]
    NoCache,

    /// The run did not complete before its deadline
    #[error("run deadline exceeded ({outstanding} pairs outstanding)")]
    DeadlineExceeded { outstanding: usize },

    /// The writer task failed before completing its final flush
    #[error("writer failed: {0}")]
    Writer(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
