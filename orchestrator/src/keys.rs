//! Layout of the cache entries read and written by a run.
//!
//! Every key starts with the commit hash of the deployment, so results of different
//! versions never mix.

use std::time::Duration;

/// Prefix of sync check verdicts.
pub const SYNC_CHECK: &str = "sync-check-";

/// Prefix of chain check verdicts.
pub const CHAIN_CHECK: &str = "chain-check-";

/// Prefix of merge check verdicts.
pub const MERGE_CHECK: &str = "merge-check-";

/// TTL of a verdict in which no node passed, so a total failure is retried quickly.
pub const EMPTY_VERDICT_TTL: Duration = Duration::from_secs(30);

/// TTL of a failure mark erasure.
pub const ERASURE_TTL: Duration = Duration::from_secs(60 * 60);

/// Value written to erase the failure mark of a node.
pub const ERASED: &str = "false";

/// Key of the verdict of one check of a session.
pub fn verdict(commit: &str, prefix: &str, session_key: &str) -> String {
    format!("{commit}{prefix}{session_key}")
}

/// Key of the failure mark of a node on a chain.
pub fn failure(commit: &str, chain: &str, node: &str) -> String {
    format!("{commit}{chain}-{node}-failure")
}

/// Key of the cached session of an application on a chain.
pub fn session(commit: &str, app_public_key: &str, chain: &str) -> String {
    format!("{commit}session-{app_public_key}-{chain}")
}
