//! Verify the nodes of a session are synced, on the right chain, and past a fork.
//!
//! Each checker relays a request to every node of a [Session] concurrently, turns each
//! response into a typed observation (a zero-value observation if the relay or parsing
//! failed) and returns the public keys of the nodes that passed:
//!
//! - [sync::Checker] compares node heights against each other and against an altruist.
//! - [chain::Checker] compares the chain identifier reported by each node.
//! - [merge::Checker] verifies nodes of one designated chain have crossed a fork.
//!
//! A failed node never aborts a check: it is excluded from the result and reported to a
//! [metrics::Recorder].

use bytes::Bytes;
use chrono::Utc;
use futures::future::join_all;
use std::{
    future::Future,
    time::{Duration, Instant},
};
use uuid::Uuid;
use warden_relay::{Aat, Error, Node, Payload, Relayer, Session};

pub mod chain;
pub mod merge;
pub mod metrics;
pub mod parse;
pub mod sync;

use metrics::{ErrorMetric, Recorder};

/// Response of a single node.
pub(crate) struct Response<'a> {
    pub node: &'a Node,
    pub elapsed: Duration,
    pub result: Result<Bytes, Error>,
}

/// Relays `payload` to every node of `session` concurrently.
///
/// Responses are returned in node order, one per node.
pub(crate) fn relay_all<'a, R: Relayer>(
    relayer: &'a R,
    session: &'a Session,
    payload: &'a Payload,
    aat: &'a Aat,
) -> impl Future<Output = Vec<Response<'a>>> + Send + 'a {
    join_all(
        session
            .nodes
            .iter()
            .map(move |node| relay_one(relayer, node, session, payload, aat)),
    )
}

fn relay_one<'a, R: Relayer>(
    relayer: &'a R,
    node: &'a Node,
    session: &'a Session,
    payload: &'a Payload,
    aat: &'a Aat,
) -> impl Future<Output = Response<'a>> + Send + 'a {
    async move {
        let start = Instant::now();
        let result = relayer.relay(node, session, payload, aat).await;
        Response {
            node,
            elapsed: start.elapsed(),
            result,
        }
    }
}

/// Reports failures of a single check invocation.
pub(crate) struct Reporter<'a, M: Recorder> {
    pub recorder: &'a M,
    pub session: &'a Session,
    pub method: &'static str,
    pub request_id: Uuid,
    pub bytes: usize,
}

impl<M: Recorder> Reporter<'_, M> {
    pub fn fail(&self, node: &Node, elapsed: Duration, message: String) {
        self.recorder.record(ErrorMetric {
            timestamp: Utc::now(),
            app_public_key: self.session.application().to_string(),
            chain: self.session.chain().to_string(),
            node_public_key: node.public_key.clone(),
            elapsed,
            bytes: self.bytes,
            method: self.method.to_string(),
            message,
            request_id: self.request_id,
        });
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use warden_relay::{Node, Session, SessionHeader};

    /// Creates a session on `chain` with one node per public key.
    pub fn session(chain: &str, nodes: &[&str]) -> Session {
        Session {
            key: format!("session-{chain}"),
            header: SessionHeader {
                app_public_key: "app".into(),
                chain: chain.into(),
                session_height: 1,
            },
            nodes: nodes
                .iter()
                .map(|public_key| Node {
                    public_key: public_key.to_string(),
                    service_url: format!("https://{public_key}.example.com"),
                    ..Default::default()
                })
                .collect(),
        }
    }

    /// Sorts a check result so it can be compared as a set.
    pub fn sorted(mut nodes: Vec<String>) -> Vec<String> {
        nodes.sort();
        nodes
    }
}
