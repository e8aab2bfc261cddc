use crate::Item;
use futures::{channel::mpsc, SinkExt};
use tracing::warn;

/// A mailbox that can be used to push [Item]s to a [super::Writer].
///
/// The writer performs its final flush once every clone has been closed or dropped.
#[derive(Clone)]
pub struct Mailbox {
    sender: mpsc::Sender<Item>,
}

impl Mailbox {
    /// Creates a new [Mailbox] with the given [mpsc::Sender].
    pub(super) fn new(sender: mpsc::Sender<Item>) -> Self {
        Self { sender }
    }

    /// Queues `item` for the next flush.
    ///
    /// Writes are best-effort: if the writer is gone the item is dropped.
    pub async fn push(&mut self, item: Item) {
        if self.sender.send(item).await.is_err() {
            warn!("writer closed, dropping item");
        }
    }

    /// Queues every item of `items`.
    pub async fn push_all(&mut self, items: impl IntoIterator<Item = Item>) {
        for item in items {
            self.push(item).await;
        }
    }

    /// Closes the mailbox for every clone, triggering the final flush.
    pub fn close(&mut self) {
        self.sender.close_channel();
    }
}
