//! Determine which nodes of a session have crossed a protocol fork.
//!
//! Only one chain is subject to this check. A node has crossed the fork when the latest
//! block it reports carries exactly the terminal total difficulty and a number at or past
//! the fork block.

use crate::{metrics::Recorder, parse, relay_all, Reporter};
use std::future::Future;
use tracing::{info, warn};
use uuid::Uuid;
use warden_relay::{Aat, Payload, Relayer, Session};

/// Name of the check, used in metrics.
pub const METHOD: &str = "merge-check";

/// Request for the latest block header.
pub const LATEST_BLOCK: &str =
    r#"{"jsonrpc":"2.0","method":"eth_getBlockByNumber","params":["latest",false],"id":1}"#;

const DIFFICULTY_KEY: &str = "result.totalDifficulty";
const NUMBER_KEY: &str = "result.number";

/// Configuration for the [Checker].
#[derive(Clone, Debug)]
pub struct Config {
    /// The only chain this check applies to.
    pub chain: String,

    /// Total difficulty at which the fork happened (decimal or `0x` hex).
    pub terminal_total_difficulty: String,

    /// First block after the fork.
    pub merge_block_number: u64,
}

/// Checks the nodes of a session have observed the fork.
#[derive(Clone)]
pub struct Checker<R: Relayer, M: Recorder> {
    relayer: R,
    recorder: M,
    cfg: Config,
}

impl<R: Relayer, M: Recorder> Checker<R, M> {
    pub fn new(relayer: R, recorder: M, cfg: Config) -> Self {
        Self {
            relayer,
            recorder,
            cfg,
        }
    }

    /// Returns whether `chain` is subject to this check.
    pub fn applies(&self, chain: &str) -> bool {
        self.cfg.chain == chain
    }

    /// Returns the public keys of the nodes of `session` that crossed the fork.
    ///
    /// Sessions of any chain other than the configured one yield no nodes.
    pub fn check<'a>(
        &'a self,
        session: &'a Session,
        aat: &'a Aat,
    ) -> impl Future<Output = Vec<String>> + Send + 'a {
        async move {
            let request_id = Uuid::new_v4();
            if !self.applies(session.chain()) {
                warn!(
                    chain = session.chain(),
                    merge_chain = self.cfg.chain.as_str(),
                    %request_id,
                    "merge check invoked for another chain"
                );
                return Vec::new();
            }
            let terminal = match parse::number(&self.cfg.terminal_total_difficulty) {
                Ok(terminal) => terminal,
                Err(err) => {
                    warn!(
                        difficulty = self.cfg.terminal_total_difficulty.as_str(),
                        %request_id,
                        %err,
                        "invalid terminal total difficulty"
                    );
                    return Vec::new();
                }
            };
            let payload = Payload::post(LATEST_BLOCK, "");
            let reporter = Reporter {
                recorder: &self.recorder,
                session,
                method: METHOD,
                request_id,
                bytes: payload.len(),
            };

            let mut passed = Vec::new();
            for response in relay_all(&self.relayer, session, &payload, aat).await {
                let observed = match response.result {
                    Ok(body) => parse::big(&body, DIFFICULTY_KEY)
                        .and_then(|difficulty| {
                            parse::integer(&body, NUMBER_KEY).map(|number| (difficulty, number))
                        })
                        .map_err(|err| {
                            reporter.fail(response.node, response.elapsed, err.to_string());
                        })
                        .ok(),
                    Err(err) => {
                        reporter.fail(response.node, response.elapsed, err.to_string());
                        None
                    }
                };
                let Some((difficulty, number)) = observed else {
                    continue;
                };
                if difficulty == terminal && number >= self.cfg.merge_block_number {
                    passed.push(response.node.public_key.clone());
                }
            }
            info!(
                chain = session.chain(),
                session = session.key.as_str(),
                %request_id,
                nodes = session.nodes.len(),
                passed = passed.len(),
                "merge check complete"
            );
            passed
        }
    }
}
