//! Bound the number of outbound calls in flight across a run.
//!
//! Every pair and every check of a run shares one [Limiter]. Rather than reserving
//! capacity for a whole check up front, each outbound call (a relay to one node, a
//! dispatch, a request to an altruist) holds a single permit for as long as it is in flight.
//! A check over `n` nodes therefore weighs `n` while its relays are outstanding, and
//! nothing ever waits for a permit while holding another one.

use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use warden_relay::{Aat, Altruist, Error, Node, Payload, Relayer, Session};

/// A counting semaphore shared by every clone.
#[derive(Clone, Debug)]
pub struct Limiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl Limiter {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, Semaphore::MAX_PERMITS);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Permits not currently held.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Waits for a permit, released when the returned guard is dropped.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, Error> {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::Transport("limiter closed".into()))
    }
}

/// Wraps a [Relayer] or an [Altruist] so every call holds a [Limiter] permit.
#[derive(Clone)]
pub struct Limited<T> {
    inner: T,
    limiter: Limiter,
}

impl<T> Limited<T> {
    pub fn new(inner: T, limiter: Limiter) -> Self {
        Self { inner, limiter }
    }
}

impl<R: Relayer> Relayer for Limited<R> {
    async fn relay(
        &self,
        node: &Node,
        session: &Session,
        payload: &Payload,
        aat: &Aat,
    ) -> Result<Bytes, Error> {
        let _permit = self.limiter.acquire().await?;
        self.inner.relay(node, session, payload, aat).await
    }

    async fn dispatch(&self, app_public_key: &str, chain: &str) -> Result<Session, Error> {
        let _permit = self.limiter.acquire().await?;
        self.inner.dispatch(app_public_key, chain).await
    }

    async fn height(&self) -> Result<u64, Error> {
        let _permit = self.limiter.acquire().await?;
        self.inner.height().await
    }
}

impl<A: Altruist> Altruist for Limited<A> {
    async fn request(&self, url: &str, payload: &Payload) -> Result<Bytes, Error> {
        let _permit = self.limiter.acquire().await?;
        self.inner.request(url, payload).await
    }
}
