//! A [crate::Cache] replica with injectable faults.

use crate::{memory, Cache as _, Error, Item};
use bytes::Bytes;
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

/// Wraps a [memory::Cache], recording every write and optionally failing or stalling.
#[derive(Clone)]
pub struct Cache {
    inner: memory::Cache,
    failing: Arc<AtomicBool>,
    delay: Arc<Mutex<Duration>>,
    writes: Arc<Mutex<Vec<Vec<Item>>>>,
    reads: Arc<Mutex<usize>>,
}

impl Cache {
    pub fn new(name: &str) -> Self {
        Self {
            inner: memory::Cache::new(name),
            failing: Arc::default(),
            delay: Arc::default(),
            writes: Arc::default(),
            reads: Arc::default(),
        }
    }

    /// Makes every subsequent operation fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Delays every subsequent operation by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    /// Stores `item` directly, without recording a write.
    pub fn seed(&self, item: Item) {
        self.inner.insert(item);
    }

    /// Returns the items of every successful or attempted [crate::Cache::set] call.
    pub fn writes(&self) -> Vec<Vec<Item>> {
        self.writes.lock().unwrap().clone()
    }

    /// Number of [crate::Cache::get] calls received.
    pub fn reads(&self) -> usize {
        *self.reads.lock().unwrap()
    }

    async fn fault(&self) -> Result<(), Error> {
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "replica unavailable",
            )));
        }
        Ok(())
    }
}

impl crate::Cache for Cache {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn ping(&self) -> Result<(), Error> {
        self.fault().await
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, Error> {
        *self.reads.lock().unwrap() += 1;
        self.fault().await?;
        self.inner.get(key).await
    }

    async fn set(&self, items: &[Item]) -> Result<(), Error> {
        self.writes.lock().unwrap().push(items.to_vec());
        self.fault().await?;
        self.inner.set(items).await
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, Error> {
        self.fault().await?;
        self.inner.keys(pattern).await
    }
}
