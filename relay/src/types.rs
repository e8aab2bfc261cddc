//! Records exchanged with the network and the metadata stores.

use serde::{Deserialize, Serialize};

/// A relay-serving participant of the network.
///
/// Stake, jailing and status are carried through untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub public_key: String,
    pub service_url: String,
    #[serde(default)]
    pub stake: String,
    #[serde(default)]
    pub jailed: bool,
    #[serde(default)]
    pub status: i32,
}

/// Identifies who a [Session] was issued for and when.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionHeader {
    pub app_public_key: String,
    pub chain: String,
    pub session_height: u64,
}

/// A network-issued routing unit binding an application and chain to a fixed set of nodes.
///
/// Sessions are never mutated once dispatched. A stale session is replaced by dispatching a
/// new one.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub key: String,
    pub header: SessionHeader,
    #[serde(default)]
    pub nodes: Vec<Node>,
}

impl Session {
    /// Returns the chain this session routes to.
    pub fn chain(&self) -> &str {
        &self.header.chain
    }

    /// Returns the public key of the application this session was issued for.
    pub fn application(&self) -> &str {
        &self.header.app_public_key
    }
}

/// Application authentication token attached to every relay.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aat {
    pub version: String,
    pub app_public_key: String,
    pub client_public_key: String,
    pub signature: String,
}

/// A staked application that relays may be sent on behalf of.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub public_key: String,
    #[serde(default)]
    pub chains: Vec<String>,
    #[serde(default)]
    pub aat: Aat,
}

/// How to ask a node (or the altruist) for its current height.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCheckOptions {
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub result_key: String,
    #[serde(default)]
    pub path: String,
    /// Blocks a node may trail the reference height by. Zero selects the checker default.
    #[serde(default)]
    pub allowance: u64,
}

/// Static configuration of a chain served by the network.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blockchain {
    pub id: String,
    #[serde(default)]
    pub ticker: String,
    /// Expected chain identifier reported by healthy nodes.
    #[serde(default)]
    pub chain_id: String,
    /// Request body used to ask a node for its chain identifier.
    #[serde(default)]
    pub chain_id_check: String,
    #[serde(default)]
    pub path: String,
    /// Reference endpoint used as a fallback source of truth for height.
    #[serde(default)]
    pub altruist: String,
    #[serde(default)]
    pub sync_check_options: SyncCheckOptions,
}

impl Blockchain {
    /// Chains without a sync request body and path are exempt from sync checking.
    pub fn sync_checked(&self) -> bool {
        !(self.sync_check_options.body.is_empty() && self.sync_check_options.path.is_empty())
    }

    /// Chains without a chain id request are exempt from chain checking.
    pub fn chain_checked(&self) -> bool {
        !self.chain_id_check.is_empty()
    }

    /// Returns the payload used to query the height of a node.
    pub fn sync_payload(&self) -> Payload {
        Payload::post(
            &self.sync_check_options.body,
            &self.sync_check_options.path,
        )
    }

    /// Returns the payload used to query the chain identifier of a node.
    pub fn chain_id_payload(&self) -> Payload {
        Payload::post(&self.chain_id_check, &self.path)
    }
}

/// Body of a relay.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub data: String,
    pub method: String,
    #[serde(default)]
    pub path: String,
}

impl Payload {
    /// Creates a `POST` payload.
    pub fn post(data: &str, path: &str) -> Self {
        Self {
            data: data.to_string(),
            method: "POST".to_string(),
            path: path.to_string(),
        }
    }

    /// Size of the request body in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
