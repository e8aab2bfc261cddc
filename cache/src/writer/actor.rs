use super::{ingress::Mailbox, Config, Stats};
use crate::{Cache, Item};
use futures::{channel::mpsc, future::join_all, StreamExt};
use prometheus_client::{metrics::counter::Counter, registry::Registry};
use std::mem;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Accumulates [Item]s pushed by many producers and writes them to every replica in
/// batches.
pub struct Writer<C: Cache> {
    replicas: Vec<C>,
    batch_size: usize,
    mailbox: mpsc::Receiver<Item>,

    stats: Stats,

    flushes: Counter,
    items: Counter,
    failures: Counter,
}

impl<C: Cache> Writer<C> {
    /// Creates a new writer publishing to `replicas`.
    ///
    /// Returns a tuple of the writer and the mailbox producers push to.
    pub fn new(replicas: Vec<C>, cfg: Config, registry: &mut Registry) -> (Self, Mailbox) {
        let (tx, rx) = mpsc::channel(cfg.mailbox_size);

        let flushes = Counter::default();
        let items = Counter::default();
        let failures = Counter::default();
        registry.register("flushes", "batches flushed", flushes.clone());
        registry.register("items", "items flushed", items.clone());
        registry.register(
            "failures",
            "replica writes that failed",
            failures.clone(),
        );

        (
            Self {
                replicas,
                batch_size: cfg.batch_size.max(1),
                mailbox: rx,
                stats: Stats::default(),
                flushes,
                items,
                failures,
            },
            Mailbox::new(tx),
        )
    }

    /// Starts the writer.
    ///
    /// The returned handle resolves once the mailbox is closed and the final flush completed.
    pub fn start(self) -> JoinHandle<Stats> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) -> Stats {
        let mut batch = Vec::with_capacity(self.batch_size);
        while let Some(item) = self.mailbox.next().await {
            batch.push(item);
            if batch.len() >= self.batch_size {
                self.flush(&mut batch).await;
            }
        }
        debug!(remaining = batch.len(), "mailbox closed");
        self.flush(&mut batch).await;
        self.stats
    }

    /// Writes `batch` to every replica concurrently and clears it.
    ///
    /// A failed replica is logged and skipped, it is not retried.
    async fn flush(&mut self, batch: &mut Vec<Item>) {
        if batch.is_empty() {
            return;
        }
        let items = mem::replace(batch, Vec::with_capacity(self.batch_size));
        let results = join_all(self.replicas.iter().map(|replica| replica.set(&items))).await;
        for (replica, result) in self.replicas.iter().zip(results) {
            if let Err(err) = result {
                self.failures.inc();
                self.stats.failures += 1;
                warn!(replica = replica.name(), ?err, items = items.len(), "flush failed");
            }
        }
        self.flushes.inc();
        self.items.inc_by(items.len() as u64);
        self.stats.flushes += 1;
        self.stats.items += items.len();
        debug!(items = items.len(), replicas = self.replicas.len(), "flushed batch");
    }
}
