use std::sync::Arc;

use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use store::GraphStore;

use crate::handler;
use crate::ingress::InboundMessage;
use crate::metrics::Metrics;

/// Pulls messages off the ingress queue and runs one task per message.
pub struct Worker {
    store: Arc<dyn GraphStore>,
    metrics: Arc<Metrics>,
    permits: Arc<Semaphore>,
}

impl Worker {
    pub fn new(store: Arc<dyn GraphStore>, metrics: Arc<Metrics>, max_in_flight: usize) -> Self {
        Self {
            store,
            metrics,
            permits: Arc::new(Semaphore::new(max_in_flight.max(1))),
        }
    }

    /// Receive until `shutdown` flips or every sender is gone, then drain.
    ///
    /// Draining closes the queue to new messages, still processes the ones
    /// already accepted, and waits for every in-flight task.
    pub async fn run(
        self,
        mut receiver: mpsc::Receiver<InboundMessage>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                message = receiver.recv() => match message {
                    Some(message) => self.spawn(&mut tasks, message).await,
                    None => break,
                },
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "Trigger task panicked");
                    }
                }
            }
        }

        receiver.close();
        let mut drained = 0;
        while let Some(message) = receiver.recv().await {
            self.spawn(&mut tasks, message).await;
            drained += 1;
        }
        info!(queued = drained, in_flight = tasks.len(), "Draining importer");

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Trigger task panicked");
            }
        }
        info!("Importer drained");
    }

    async fn spawn(&self, tasks: &mut JoinSet<()>, message: InboundMessage) {
        let Ok(permit) = self.permits.clone().acquire_owned().await else {
            return;
        };
        let store = self.store.clone();
        let metrics = self.metrics.clone();

        tasks.spawn(async move {
            let _permit = permit;
            let reply = handler::handle(store.as_ref(), &metrics, message.id, &message.data).await;
            match message.reply {
                Some(reply_to) => {
                    if reply_to.send(reply).is_err() {
                        debug!(id = %message.id, "Reply receiver went away");
                    }
                }
                None => debug!(id = %message.id, ok = reply.ok, "No reply address"),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;
    use serde_json::json;
    use store::MemoryStore;
    use tokio::sync::oneshot;

    fn message(id: &str) -> Bytes {
        Bytes::from(
            serde_json::to_vec(&json!({
                "config": {
                    "entities": [{"name": "item", "graph_type": "Item", "identifying_field": {"name": "id"}}]
                },
                "data": {"id": id}
            }))
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_processes_and_replies() {
        let store = MemoryStore::new();
        let metrics = Metrics::new();
        let (sender, receiver) = mpsc::channel(8);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let worker = Worker::new(Arc::new(store.clone()), metrics.clone(), 2);
        let handle = tokio::spawn(worker.run(receiver, shutdown_rx));

        let (tx, rx) = oneshot::channel();
        sender
            .send(InboundMessage::new(message("a"), Some(tx)))
            .await
            .unwrap();
        assert!(rx.await.unwrap().ok);

        sender
            .send(InboundMessage::new(Bytes::from_static(b"garbage"), None))
            .await
            .unwrap();

        drop(sender);
        handle.await.unwrap();

        assert_eq!(store.commits(), 1);
        assert_eq!(metrics.snapshot().failed_decode, 1);
    }

    #[tokio::test]
    async fn test_shutdown_drains_accepted_messages() {
        let store = MemoryStore::new();
        let metrics = Metrics::new();
        let (sender, receiver) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut replies = Vec::new();
        for i in 0..10 {
            let (tx, rx) = oneshot::channel();
            sender
                .send(InboundMessage::new(message(&format!("item-{i}")), Some(tx)))
                .await
                .unwrap();
            replies.push(rx);
        }
        shutdown_tx.send(true).unwrap();

        let worker = Worker::new(Arc::new(store.clone()), metrics.clone(), 3);
        worker.run(receiver, shutdown_rx).await;

        for rx in replies {
            assert!(rx.await.unwrap().ok);
        }
        assert_eq!(store.node_count().await, 10);
        assert!(sender.send(InboundMessage::new(message("late"), None)).await.is_err());
    }
}
