//! Determine which nodes of a session serve the expected chain.

use crate::{metrics::Recorder, parse, relay_all, Reporter};
use std::future::Future;
use tracing::{info, warn};
use uuid::Uuid;
use warden_relay::{Aat, Blockchain, Relayer, Session};

/// Name of the check, used in metrics.
pub const METHOD: &str = "chain-check";

/// Key of the chain identifier in a node response.
const RESULT_KEY: &str = "result";

/// Checks the nodes of a session report the expected chain identifier.
#[derive(Clone)]
pub struct Checker<R: Relayer, M: Recorder> {
    relayer: R,
    recorder: M,
}

impl<R: Relayer, M: Recorder> Checker<R, M> {
    pub fn new(relayer: R, recorder: M) -> Self {
        Self { relayer, recorder }
    }

    /// Returns the public keys of the nodes of `session` reporting `chain.chain_id`.
    ///
    /// If the expected identifier cannot be parsed, no node passes.
    pub fn check<'a>(
        &'a self,
        session: &'a Session,
        chain: &'a Blockchain,
        aat: &'a Aat,
    ) -> impl Future<Output = Vec<String>> + Send + 'a {
        async move {
            let request_id = Uuid::new_v4();
            let expected = match parse::number(&chain.chain_id) {
                Ok(expected) => expected,
                Err(err) => {
                    warn!(
                        chain = chain.id.as_str(),
                        chain_id = chain.chain_id.as_str(),
                        %request_id,
                        %err,
                        "invalid expected chain id"
                    );
                    return Vec::new();
                }
            };
            let payload = chain.chain_id_payload();
            let reporter = Reporter {
                recorder: &self.recorder,
                session,
                method: METHOD,
                request_id,
                bytes: payload.len(),
            };

            let mut passed = Vec::new();
            for response in relay_all(&self.relayer, session, &payload, aat).await {
                let reported = match response.result {
                    Ok(body) => match parse::big(&body, RESULT_KEY) {
                        Ok(id) => Some(id),
                        Err(err) => {
                            reporter.fail(response.node, response.elapsed, err.to_string());
                            None
                        }
                    },
                    Err(err) => {
                        reporter.fail(response.node, response.elapsed, err.to_string());
                        None
                    }
                };
                if reported == Some(expected) {
                    passed.push(response.node.public_key.clone());
                }
            }
            info!(
                chain = chain.id.as_str(),
                session = session.key.as_str(),
                %request_id,
                expected = %expected,
                nodes = session.nodes.len(),
                passed = passed.len(),
                "chain check complete"
            );
            passed
        }
    }
}
