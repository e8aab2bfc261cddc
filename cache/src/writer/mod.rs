//! Batch many small writes into few pipelined writes to every replica.
//!
//! Producers never write to the cache directly. They push [crate::Item]s into a [Mailbox]
//! and a single [Writer] flushes them to all replicas whenever `batch_size` items are
//! pending, and once more (with whatever remains) when the mailbox is closed. Flushes are
//! best-effort: a failed replica is logged and skipped, and producers are never told.

mod actor;
mod ingress;

pub use actor::Writer;
pub use ingress::Mailbox;

/// Configuration for the [Writer].
#[derive(Clone, Debug)]
pub struct Config {
    /// Number of pending items that triggers a flush.
    pub batch_size: usize,

    /// The maximum size of the mailbox backlog.
    pub mailbox_size: usize,
}

/// Totals reported by a [Writer] once its mailbox is closed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    /// Batches written (each batch is sent to every replica).
    pub flushes: usize,
    /// Items written.
    pub items: usize,
    /// Replica writes that failed.
    pub failures: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{mocks, Cache as _, Item};
    use bytes::Bytes;
    use prometheus_client::registry::Registry;
    use std::time::Duration;

    fn item(i: usize) -> Item {
        Item::new(format!("key-{i}"), format!("{i}"), Duration::from_secs(60))
    }

    fn config(batch_size: usize) -> Config {
        Config {
            batch_size,
            mailbox_size: 16,
        }
    }

    #[tokio::test]
    async fn test_full_batch_flushes_once() {
        let replicas = vec![mocks::Cache::new("a"), mocks::Cache::new("b")];
        let (writer, mut mailbox) =
            Writer::new(replicas.clone(), config(4), &mut Registry::default());
        let handle = writer.start();
        mailbox.push_all((0..4).map(item)).await;
        mailbox.close();

        let stats = handle.await.unwrap();
        assert_eq!(
            stats,
            Stats {
                flushes: 1,
                items: 4,
                failures: 0
            }
        );
        for replica in &replicas {
            let writes = replica.writes();
            assert_eq!(writes.len(), 1);
            assert_eq!(writes[0].len(), 4);
        }
    }

    #[tokio::test]
    async fn test_partial_batch_flushes_on_close() {
        let replicas = vec![mocks::Cache::new("a")];
        let (writer, mut mailbox) =
            Writer::new(replicas.clone(), config(4), &mut Registry::default());
        let handle = writer.start();
        mailbox.push_all((0..3).map(item)).await;
        drop(mailbox);

        let stats = handle.await.unwrap();
        assert_eq!(stats.flushes, 1);
        assert_eq!(stats.items, 3);
        let writes = replicas[0].writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0], (0..3).map(item).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_close_without_items() {
        let replicas = vec![mocks::Cache::new("a")];
        let (writer, mut mailbox) =
            Writer::new(replicas.clone(), config(4), &mut Registry::default());
        let handle = writer.start();
        mailbox.close();
        assert_eq!(handle.await.unwrap(), Stats::default());
        assert!(replicas[0].writes().is_empty());
    }

    #[tokio::test]
    async fn test_many_producers() {
        let replicas = vec![mocks::Cache::new("a"), mocks::Cache::new("b")];
        let (writer, mailbox) =
            Writer::new(replicas.clone(), config(10), &mut Registry::default());
        let handle = writer.start();
        let producers: Vec<_> = (0..5)
            .map(|p| {
                let mut mailbox = mailbox.clone();
                tokio::spawn(async move {
                    mailbox.push_all((0..7).map(|i| item(p * 100 + i))).await;
                })
            })
            .collect();
        drop(mailbox);
        for producer in producers {
            producer.await.unwrap();
        }

        let stats = handle.await.unwrap();
        assert_eq!(stats.items, 35);
        assert_eq!(stats.flushes, 4);
        for replica in &replicas {
            let sizes: Vec<usize> = replica.writes().iter().map(Vec::len).collect();
            assert_eq!(sizes, vec![10, 10, 10, 5]);
            assert_eq!(
                replica.get("key-406").await.unwrap(),
                Some(Bytes::from("406"))
            );
        }
    }

    #[tokio::test]
    async fn test_failed_replica_does_not_block_others() {
        let replicas = vec![mocks::Cache::new("down"), mocks::Cache::new("up")];
        replicas[0].set_failing(true);
        let (writer, mut mailbox) =
            Writer::new(replicas.clone(), config(2), &mut Registry::default());
        let handle = writer.start();
        mailbox.push_all((0..5).map(item)).await;
        mailbox.close();

        let stats = handle.await.unwrap();
        assert_eq!(stats.flushes, 3);
        assert_eq!(stats.failures, 3);
        assert_eq!(replicas[1].get("key-4").await.unwrap(), Some(Bytes::from("4")));
        assert_eq!(replicas[0].writes().len(), 3);
    }
}
