//! [Relayer] and [Altruist] over HTTP.

use crate::{Aat, Altruist, Error, Node, Payload, Relayer, Session};
use bytes::Bytes;
use reqwest::{header, Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Path of the dispatch endpoint on the dispatcher.
const DISPATCH_PATH: &str = "/v1/client/dispatch";

/// Path of the height endpoint on the dispatcher.
const HEIGHT_PATH: &str = "/v1/query/height";

/// Configuration for [Client].
#[derive(Clone, Debug)]
pub struct Config {
    /// Base URL of the node used to dispatch sessions and query the network height.
    pub dispatcher: String,

    /// Upper bound on a single request, including reading the body.
    pub timeout: Duration,
}

#[derive(Serialize)]
struct DispatchRequest<'a> {
    app_public_key: &'a str,
    chain: &'a str,
    session_height: u64,
}

#[derive(Deserialize)]
struct DispatchResponse {
    session: Session,
}

#[derive(Deserialize)]
struct HeightResponse {
    height: u64,
}

/// Sends relays straight to the service URL of each node.
///
/// Relays are not signed: the [Aat] travels as a header so that a signing proxy in front of
/// the network can pick it up.
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    dispatcher: String,
}

impl Client {
    /// Creates a new client.
    pub fn new(cfg: Config) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(|e| Error::Transport(e.to_string()))?;
        Ok(Self {
            http,
            dispatcher: cfg.dispatcher.trim_end_matches('/').to_string(),
        })
    }

    async fn send(
        &self,
        url: &str,
        payload: &Payload,
        aat: Option<&Aat>,
    ) -> Result<Bytes, Error> {
        let method = Method::from_bytes(payload.method.as_bytes())
            .map_err(|_| Error::InvalidMethod(payload.method.clone()))?;
        let target = join(url, &payload.path);
        let mut request = self
            .http
            .request(method, &target)
            .header(header::CONTENT_TYPE, "application/json")
            .body(payload.data.clone());
        if let Some(aat) = aat {
            let token = serde_json::to_string(aat)?;
            request = request.header("x-relay-aat", token);
        }
        let response = request.send().await.map_err(classify)?;
        let status = response.status();
        let body = response.bytes().await.map_err(classify)?;
        if !status.is_success() {
            return Err(rejected(status, &body));
        }
        Ok(body)
    }
}

impl Relayer for Client {
    async fn relay(
        &self,
        node: &Node,
        session: &Session,
        payload: &Payload,
        aat: &Aat,
    ) -> Result<Bytes, Error> {
        debug!(
            node = node.public_key.as_str(),
            chain = session.chain(),
            session = session.key.as_str(),
            "sending relay"
        );
        self.send(&node.service_url, payload, Some(aat)).await
    }

    async fn dispatch(&self, app_public_key: &str, chain: &str) -> Result<Session, Error> {
        let url = format!("{}{DISPATCH_PATH}", self.dispatcher);
        let request = DispatchRequest {
            app_public_key,
            chain,
            session_height: 0,
        };
        let response = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(classify)?;
        let status = response.status();
        let body = response.bytes().await.map_err(classify)?;
        if !status.is_success() {
            return Err(rejected(status, &body));
        }
        let dispatched: DispatchResponse = serde_json::from_slice(&body)?;
        Ok(dispatched.session)
    }

    async fn height(&self) -> Result<u64, Error> {
        let url = format!("{}{HEIGHT_PATH}", self.dispatcher);
        let response = self
            .http
            .post(&url)
            .header(header::CONTENT_TYPE, "application/json")
            .body("{}")
            .send()
            .await
            .map_err(classify)?;
        let status = response.status();
        let body = response.bytes().await.map_err(classify)?;
        if !status.is_success() {
            return Err(rejected(status, &body));
        }
        let height: HeightResponse = serde_json::from_slice(&body)?;
        Ok(height.height)
    }
}

impl Altruist for Client {
    async fn request(&self, url: &str, payload: &Payload) -> Result<Bytes, Error> {
        self.send(url, payload, None).await
    }
}

/// Appends `path` to `base`, avoiding a doubled or missing separator.
fn join(base: &str, path: &str) -> String {
    if path.is_empty() {
        return base.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn classify(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        return Error::Timeout;
    }
    if err.is_builder() {
        return Error::InvalidUrl(err.to_string());
    }
    Error::Transport(err.to_string())
}

fn rejected(status: StatusCode, body: &[u8]) -> Error {
    Error::Rejected {
        status: status.as_u16(),
        message: String::from_utf8_lossy(body).into_owned(),
    }
}
