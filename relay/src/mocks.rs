//! Scripted [crate::Relayer] and [crate::Altruist] for tests.

use crate::{Aat, Error, Node, Payload, Session};
use bytes::Bytes;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

#[derive(Clone)]
enum Reply {
    Body(Bytes),
    Fail,
}

#[derive(Default)]
struct State {
    // (node, payload data) -> reply, payload data `None` matches any payload
    replies: HashMap<(String, Option<String>), Reply>,
    sessions: HashMap<(String, String), Session>,
    height: Option<u64>,
    delay: Duration,

    relays: usize,
    dispatches: usize,
    in_flight: usize,
    max_in_flight: usize,
}

/// A [crate::Relayer] answering from a script.
///
/// Nodes without a scripted reply fail with [Error::Transport].
#[derive(Clone, Default)]
pub struct Relayer {
    state: Arc<Mutex<State>>,
}

impl Relayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers every relay to `node` with `body`.
    pub fn respond(&self, node: &str, body: impl Into<Bytes>) {
        self.state
            .lock()
            .unwrap()
            .replies
            .insert((node.to_string(), None), Reply::Body(body.into()));
    }

    /// Answers relays to `node` whose payload data equals `data` with `body`.
    pub fn respond_to(&self, node: &str, data: &str, body: impl Into<Bytes>) {
        self.state.lock().unwrap().replies.insert(
            (node.to_string(), Some(data.to_string())),
            Reply::Body(body.into()),
        );
    }

    /// Fails every relay to `node`.
    pub fn fail(&self, node: &str) {
        self.state
            .lock()
            .unwrap()
            .replies
            .insert((node.to_string(), None), Reply::Fail);
    }

    /// Serves `session` when dispatching for its application and chain.
    pub fn set_session(&self, session: Session) {
        let key = (
            session.header.app_public_key.clone(),
            session.header.chain.clone(),
        );
        self.state.lock().unwrap().sessions.insert(key, session);
    }

    pub fn set_height(&self, height: u64) {
        self.state.lock().unwrap().height = Some(height);
    }

    /// Delays every relay by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().unwrap().delay = delay;
    }

    /// Number of relays sent.
    pub fn relays(&self) -> usize {
        self.state.lock().unwrap().relays
    }

    /// Number of sessions dispatched.
    pub fn dispatches(&self) -> usize {
        self.state.lock().unwrap().dispatches
    }

    /// Largest number of relays that were in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.state.lock().unwrap().max_in_flight
    }
}

impl crate::Relayer for Relayer {
    async fn relay(
        &self,
        node: &Node,
        _session: &Session,
        payload: &Payload,
        _aat: &Aat,
    ) -> Result<Bytes, Error> {
        let (reply, delay) = {
            let mut state = self.state.lock().unwrap();
            state.relays += 1;
            state.in_flight += 1;
            state.max_in_flight = state.max_in_flight.max(state.in_flight);
            let reply = state
                .replies
                .get(&(node.public_key.clone(), Some(payload.data.clone())))
                .or_else(|| state.replies.get(&(node.public_key.clone(), None)))
                .cloned();
            (reply, state.delay)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.state.lock().unwrap().in_flight -= 1;
        match reply {
            Some(Reply::Body(body)) => Ok(body),
            Some(Reply::Fail) => Err(Error::Transport("scripted failure".into())),
            None => Err(Error::Transport(format!(
                "no reply scripted for {}",
                node.public_key
            ))),
        }
    }

    async fn dispatch(&self, app_public_key: &str, chain: &str) -> Result<Session, Error> {
        let mut state = self.state.lock().unwrap();
        state.dispatches += 1;
        state
            .sessions
            .get(&(app_public_key.to_string(), chain.to_string()))
            .cloned()
            .ok_or_else(|| Error::Rejected {
                status: 400,
                message: format!("no session for {app_public_key} on {chain}"),
            })
    }

    async fn height(&self) -> Result<u64, Error> {
        self.state
            .lock()
            .unwrap()
            .height
            .ok_or_else(|| Error::Transport("height unavailable".into()))
    }
}

/// An [crate::Altruist] answering from a script.
#[derive(Clone, Default)]
pub struct Altruist {
    replies: Arc<Mutex<HashMap<String, Bytes>>>,
    requests: Arc<Mutex<usize>>,
}

impl Altruist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers every request to `url` with `body`.
    pub fn respond(&self, url: &str, body: impl Into<Bytes>) {
        self.replies
            .lock()
            .unwrap()
            .insert(url.to_string(), body.into());
    }

    /// Number of requests received.
    pub fn requests(&self) -> usize {
        *self.requests.lock().unwrap()
    }
}

impl crate::Altruist for Altruist {
    async fn request(&self, url: &str, _payload: &Payload) -> Result<Bytes, Error> {
        *self.requests.lock().unwrap() += 1;
        self.replies
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| Error::Transport(format!("altruist {url} unreachable")))
    }
}
