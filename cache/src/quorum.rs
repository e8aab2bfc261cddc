//! Decide whether a cached session is fresh enough to skip dispatching a new one.
//!
//! A random sample of replicas is read concurrently. The cached session is reused only if
//! every sampled replica holds a session observed at (or above) the current network height:
//! a single stale, missing or unreachable replica forces a fresh dispatch. Dispatching
//! needlessly is cheap, serving a stale session is not.

use crate::{Cache, CachedSession};
use futures::future::join_all;
use rand::{seq::SliceRandom, Rng};
use std::future::Future;
use tracing::debug;
use warden_relay::Session;

/// Outcome of [should_dispatch].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Decision {
    /// Whether a new session must be dispatched.
    pub dispatch: bool,

    /// The last fresh session observed, if any replica confirmed freshness.
    ///
    /// Concurrent writers may overwrite it at any time, so it is advisory.
    pub session: Option<Session>,
}

/// Samples `min(sample_size, replicas.len())` replicas without replacement and checks
/// whether all of them hold a fresh session at `key`.
///
/// The sample is drawn before the returned future is polled, so `rng` is not borrowed by it.
pub fn should_dispatch<'a, C: Cache, R: Rng>(
    rng: &mut R,
    replicas: &'a [C],
    current_height: u64,
    key: &'a str,
    sample_size: usize,
) -> impl Future<Output = Decision> + Send + 'a {
    let sampled: Vec<&'a C> = replicas.choose_multiple(rng, sample_size).collect();
    async move {
        if sampled.is_empty() {
            return Decision {
                dispatch: true,
                session: None,
            };
        }

        let observed = join_all(
            sampled
                .iter()
                .map(|replica| observe(*replica, key, current_height)),
        )
        .await;

        let confirmed = observed.iter().filter(|session| session.is_some()).count();
        let session = observed.into_iter().flatten().last();
        Decision {
            dispatch: confirmed < sampled.len(),
            session,
        }
    }
}

/// Returns the session cached by `replica` at `key` if it is fresh.
fn observe<'a, C: Cache>(
    replica: &'a C,
    key: &'a str,
    current_height: u64,
) -> impl Future<Output = Option<Session>> + Send + 'a {
    async move {
        match replica.get(key).await {
            Ok(Some(value)) => match serde_json::from_slice::<CachedSession>(&value) {
                Ok(cached) if cached.block_height >= current_height => Some(cached.session),
                Ok(cached) => {
                    debug!(
                        replica = replica.name(),
                        key,
                        cached = cached.block_height,
                        current = current_height,
                        "cached session is stale"
                    );
                    None
                }
                Err(err) => {
                    debug!(replica = replica.name(), key, ?err, "invalid cached session");
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                debug!(replica = replica.name(), key, ?err, "failed to read cached session");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{mocks, Item};
    use rand::{rngs::StdRng, SeedableRng};
    use std::time::Duration;
    use warden_relay::SessionHeader;

    const KEY: &str = "abcsession-app-0021";

    fn cached(height: u64) -> Item {
        let cached = CachedSession {
            session: Session {
                key: format!("session-{height}"),
                header: SessionHeader {
                    app_public_key: "app".into(),
                    chain: "0021".into(),
                    session_height: height,
                },
                nodes: Vec::new(),
            },
            block_height: height,
        };
        Item::json(KEY, &cached, Duration::from_secs(60)).unwrap()
    }

    fn replicas(n: usize) -> Vec<mocks::Cache> {
        (0..n).map(|i| mocks::Cache::new(&format!("replica-{i}"))).collect()
    }

    #[tokio::test]
    async fn test_all_fresh_reuses_session() {
        let replicas = replicas(3);
        for replica in &replicas {
            replica.seed(cached(100));
        }
        let mut rng = StdRng::seed_from_u64(0);
        let decision = should_dispatch(&mut rng, &replicas, 100, KEY, 3).await;
        assert!(!decision.dispatch);
        assert_eq!(decision.session.unwrap().key, "session-100");
    }

    #[tokio::test]
    async fn test_single_unreachable_replica_forces_dispatch() {
        let replicas = replicas(3);
        for replica in &replicas {
            replica.seed(cached(100));
        }
        replicas[2].set_failing(true);
        let mut rng = StdRng::seed_from_u64(0);
        let decision = should_dispatch(&mut rng, &replicas, 100, KEY, 3).await;
        assert!(decision.dispatch);
        assert!(decision.session.is_some());
    }

    #[tokio::test]
    async fn test_single_stale_replica_forces_dispatch() {
        let replicas = replicas(3);
        replicas[0].seed(cached(100));
        replicas[1].seed(cached(99));
        replicas[2].seed(cached(101));
        let mut rng = StdRng::seed_from_u64(0);
        let decision = should_dispatch(&mut rng, &replicas, 100, KEY, 3).await;
        assert!(decision.dispatch);
    }

    #[tokio::test]
    async fn test_nothing_cached() {
        let replicas = replicas(2);
        let mut rng = StdRng::seed_from_u64(0);
        let decision = should_dispatch(&mut rng, &replicas, 100, KEY, 2).await;
        assert_eq!(
            decision,
            Decision {
                dispatch: true,
                session: None
            }
        );
    }

    #[tokio::test]
    async fn test_garbage_counts_as_missing() {
        let replicas = replicas(1);
        replicas[0].seed(Item::new(KEY, "not json", Duration::from_secs(60)));
        let mut rng = StdRng::seed_from_u64(0);
        let decision = should_dispatch(&mut rng, &replicas, 1, KEY, 1).await;
        assert!(decision.dispatch);
        assert!(decision.session.is_none());
    }

    #[tokio::test]
    async fn test_sample_is_bounded() {
        let replicas = replicas(5);
        for replica in &replicas {
            replica.seed(cached(100));
        }
        let mut rng = StdRng::seed_from_u64(7);
        let decision = should_dispatch(&mut rng, &replicas, 100, KEY, 2).await;
        assert!(!decision.dispatch);
        let reads: usize = replicas.iter().map(|replica| replica.reads()).sum();
        assert_eq!(reads, 2);
        assert!(replicas.iter().all(|replica| replica.reads() <= 1));

        // A sample larger than the replica set reads each replica once
        let decision = should_dispatch(&mut rng, &replicas, 100, KEY, 10).await;
        assert!(!decision.dispatch);
        assert!(replicas.iter().all(|replica| replica.reads() >= 1));
    }

    #[tokio::test]
    async fn test_empty_sample_dispatches() {
        let replicas = replicas(3);
        for replica in &replicas {
            replica.seed(cached(100));
        }
        let mut rng = StdRng::seed_from_u64(0);
        let decision = should_dispatch(&mut rng, &replicas, 100, KEY, 0).await;
        assert!(decision.dispatch);
        let none: Vec<mocks::Cache> = Vec::new();
        let decision = should_dispatch(&mut rng, &none, 100, KEY, 3).await;
        assert!(decision.dispatch);
    }
}
