//! Determine which nodes of a session are in sync with the chain.
//!
//! Every node is asked for its height, and a trusted altruist is asked for a reference
//! height. The altruist is only advisory: if too many nodes report heights above it (it
//! may be lagging or unreachable), the highest node height is used as the reference
//! instead. If the altruist is trusted and the highest node is implausibly far ahead of it
//! (usually a node serving a different chain), the highest height is clamped to the
//! altruist's.
//!
//! A node is in sync when its height is non-zero, at most `allowance` blocks above the
//! reference, and at most `allowance` blocks behind both the highest node and the
//! reference.

use crate::{metrics::Recorder, parse, relay_all, Reporter};
use std::future::Future;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use warden_relay::{redact, Aat, Altruist, Blockchain, Relayer, Session};

/// Name of the check, used in metrics.
pub const METHOD: &str = "sync-check";

/// Result key used when a chain does not configure one.
const DEFAULT_RESULT_KEY: &str = "result";

/// Configuration for the [Checker].
#[derive(Clone, Debug)]
pub struct Config {
    /// Allowance used when a chain does not configure one.
    pub default_allowance: u64,

    /// Fraction of valid nodes that may report heights above the altruist before the
    /// altruist is no longer trusted.
    pub altruist_trust_threshold: f64,
}

/// Height reported by a node (zero if it could not be determined).
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Observation {
    pub node: String,
    pub height: u64,
}

/// Intermediate values of a sync evaluation.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Summary {
    pub valid: usize,
    pub highest: u64,
    pub altruist: u64,
    pub trusted: bool,
    pub max_allowed: u64,
}

/// Checks the nodes of a session are in sync.
#[derive(Clone)]
pub struct Checker<R: Relayer, A: Altruist, M: Recorder> {
    relayer: R,
    altruist: A,
    recorder: M,
    cfg: Config,
}

impl<R: Relayer, A: Altruist, M: Recorder> Checker<R, A, M> {
    pub fn new(relayer: R, altruist: A, recorder: M, cfg: Config) -> Self {
        Self {
            relayer,
            altruist,
            recorder,
            cfg,
        }
    }

    /// Returns the public keys of the nodes of `session` that are in sync.
    pub fn check<'a>(
        &'a self,
        session: &'a Session,
        chain: &'a Blockchain,
        aat: &'a Aat,
    ) -> impl Future<Output = Vec<String>> + Send + 'a {
        async move {
            let request_id = Uuid::new_v4();
            let options = &chain.sync_check_options;
            let allowance = if options.allowance > 0 {
                options.allowance
            } else {
                self.cfg.default_allowance
            };
            let result_key = if options.result_key.is_empty() {
                DEFAULT_RESULT_KEY
            } else {
                options.result_key.as_str()
            };
            let payload = chain.sync_payload();
            let reporter = Reporter {
                recorder: &self.recorder,
                session,
                method: METHOD,
                request_id,
                bytes: payload.len(),
            };

            // Query nodes and altruist concurrently
            let (responses, altruist) = futures::join!(
                relay_all(&self.relayer, session, &payload, aat),
                self.altruist_height(chain, result_key, request_id)
            );
            let mut observations: Vec<Observation> = responses
                .into_iter()
                .map(|response| {
                    let height = match response.result {
                        Ok(body) => match parse::integer(&body, result_key) {
                            Ok(height) => height,
                            Err(err) => {
                                reporter.fail(response.node, response.elapsed, err.to_string());
                                0
                            }
                        },
                        Err(err) => {
                            reporter.fail(response.node, response.elapsed, err.to_string());
                            0
                        }
                    };
                    Observation {
                        node: response.node.public_key.clone(),
                        height,
                    }
                })
                .collect();

            let (synced, summary) = select(
                &mut observations,
                altruist,
                allowance,
                self.cfg.altruist_trust_threshold,
            );
            if summary.highest == 0 {
                error!(
                    chain = chain.id.as_str(),
                    session = session.key.as_str(),
                    %request_id,
                    nodes = session.nodes.len(),
                    "no node reported a height"
                );
            }
            if !summary.trusted {
                debug!(
                    chain = chain.id.as_str(),
                    %request_id,
                    altruist = altruist,
                    highest = summary.highest,
                    "altruist not trusted, using highest node height"
                );
            }
            info!(
                chain = chain.id.as_str(),
                session = session.key.as_str(),
                %request_id,
                nodes = session.nodes.len(),
                valid = summary.valid,
                highest = summary.highest,
                altruist = summary.altruist,
                trusted = summary.trusted,
                max_allowed = summary.max_allowed,
                allowance,
                synced = synced.len(),
                "sync check complete"
            );
            synced
        }
    }

    /// Returns the altruist height, or zero if it is unknown.
    fn altruist_height<'a>(
        &'a self,
        chain: &'a Blockchain,
        result_key: &'a str,
        request_id: Uuid,
    ) -> impl Future<Output = u64> + Send + 'a {
        async move {
            if chain.altruist.is_empty() {
                warn!(chain = chain.id.as_str(), %request_id, "no altruist configured");
                return 0;
            }
            let payload = chain.sync_payload();
            let body = match self.altruist.request(&chain.altruist, &payload).await {
                Ok(body) => body,
                Err(err) => {
                    warn!(
                        chain = chain.id.as_str(),
                        altruist = %redact(&chain.altruist),
                        %request_id,
                        %err,
                        "altruist request failed"
                    );
                    return 0;
                }
            };
            match parse::integer(&body, result_key) {
                Ok(height) => height,
                Err(err) => {
                    warn!(
                        chain = chain.id.as_str(),
                        altruist = %redact(&chain.altruist),
                        %request_id,
                        %err,
                        "invalid altruist response"
                    );
                    0
                }
            }
        }
    }
}

/// Selects the in-sync nodes among `observations` (sorted in place by height, descending).
pub(crate) fn select(
    observations: &mut [Observation],
    altruist: u64,
    allowance: u64,
    threshold: f64,
) -> (Vec<String>, Summary) {
    observations.sort_by(|a, b| b.height.cmp(&a.height));

    let valid = observations.iter().filter(|o| o.height > 0).count();
    let mut highest = observations.first().map(|o| o.height).unwrap_or(0);

    // An unknown altruist (zero) is never trusted
    let ahead = observations.iter().filter(|o| o.height > altruist).count();
    let trusted = altruist > 0 && (ahead as f64 / valid.max(1) as f64) < threshold;
    let altruist = if trusted { altruist } else { highest };
    if trusted && highest > altruist.saturating_add(allowance) {
        highest = altruist;
    }
    let max_allowed = altruist.saturating_add(allowance);

    let synced = observations
        .iter()
        .filter(|o| {
            o.height > 0
                && o.height <= max_allowed
                && o.height.saturating_add(allowance) >= highest
                && o.height.saturating_add(allowance) >= altruist
        })
        .map(|o| o.node.clone())
        .collect();
    (
        synced,
        Summary {
            valid,
            highest,
            altruist,
            trusted,
            max_allowed,
        },
    )
}
