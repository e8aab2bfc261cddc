//! An in-process [Cache] replica.

use crate::{glob, Error, Item};
use bytes::Bytes;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Instant,
};

/// A [crate::Cache] kept in memory, honoring per-key TTLs.
#[derive(Clone)]
pub struct Cache {
    name: String,
    entries: Arc<Mutex<HashMap<String, (Bytes, Instant)>>>,
}

impl Cache {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Arc::default(),
        }
    }

    /// Returns the number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .unwrap()
            .values()
            .filter(|(_, expiry)| *expiry > now)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes a single value, bypassing any batching.
    pub fn insert(&self, item: Item) {
        let expiry = Instant::now() + item.ttl;
        self.entries
            .lock()
            .unwrap()
            .insert(item.key, (item.value, expiry));
    }
}

impl crate::Cache for Cache {
    fn name(&self) -> &str {
        &self.name
    }

    async fn ping(&self) -> Result<(), Error> {
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, Error> {
        let mut entries = self.entries.lock().unwrap();
        let Some((value, expiry)) = entries.get(key) else {
            return Ok(None);
        };
        if *expiry > Instant::now() {
            return Ok(Some(value.clone()));
        }
        entries.remove(key);
        Ok(None)
    }

    async fn set(&self, items: &[Item]) -> Result<(), Error> {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap();
        for item in items {
            entries.insert(item.key.clone(), (item.value.clone(), now + item.ttl));
        }
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, Error> {
        let now = Instant::now();
        let entries = self.entries.lock().unwrap();
        let mut keys: Vec<String> = entries
            .iter()
            .filter(|(key, (_, expiry))| *expiry > now && glob(pattern, key))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}
