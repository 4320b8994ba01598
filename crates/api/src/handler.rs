use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use extract::{DecodeError, ExtractError, Trigger};
use store::{GraphStore, StoreError};

use crate::metrics::{FailureStage, Metrics, TimedOperation};

#[derive(Debug, Error)]
pub enum ImportError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ImportError {
    pub fn stage(&self) -> FailureStage {
        match self {
            ImportError::Decode(_) => FailureStage::Decode,
            ImportError::Extract(_) => FailureStage::Generation,
            ImportError::Store(_) => FailureStage::Store,
        }
    }
}

/// Body sent back on the reply channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub ok: bool,
}

impl Reply {
    pub fn to_bytes(self) -> Vec<u8> {
        // a struct with one bool field always serializes
        serde_json::to_vec(&self).unwrap_or_else(|_| b"{\"ok\":false}".to_vec())
    }
}

/// Decode, generate and commit one inbound message.
///
/// Decode failures return before the store is touched. Once a transaction is
/// open, any failure discards it.
pub async fn process(
    store: &dyn GraphStore,
    metrics: &Metrics,
    id: Uuid,
    data: &[u8],
) -> Result<(), ImportError> {
    let trigger = Trigger::from_slice(data)?;

    let timer = TimedOperation::start();
    let upsert = trigger.upsert()?;
    metrics.record_generate(timer.elapsed(), upsert.statements.len());

    let timer = TimedOperation::start();
    let mut txn = store.begin();
    let result = txn.upsert_and_commit(&upsert).await;
    metrics.record_commit(timer.elapsed());

    if let Err(e) = result {
        error!(
            %id,
            error = %e,
            query = %upsert.query_block(),
            mutations = %upsert.mutation_block(),
            "Upsert failed, discarding transaction"
        );
        if let Err(discard_err) = txn.discard().await {
            warn!(%id, error = %discard_err, "Failed to discard transaction");
        }
        return Err(e.into());
    }

    info!(
        %id,
        entities = trigger.plan().entities().len(),
        statements = upsert.statements.len(),
        edges = upsert.edge_count(),
        "Upsert committed"
    );
    Ok(())
}

/// Run [`process`] and turn the outcome into a reply, recording metrics.
pub async fn handle(store: &dyn GraphStore, metrics: &Metrics, id: Uuid, data: &[u8]) -> Reply {
    metrics.record_received();

    match process(store, metrics, id, data).await {
        Ok(()) => {
            metrics.record_success();
            Reply { ok: true }
        }
        Err(e) => {
            let kind = match &e {
                ImportError::Decode(_) => "decode",
                ImportError::Extract(inner) => inner.kind(),
                ImportError::Store(_) => "store",
            };
            warn!(%id, kind, error = %e, "Trigger failed");
            metrics.record_failure(e.stage());
            Reply { ok: false }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use store::MemoryStore;

    fn message(data: serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "config": {
                "entities": [
                    {
                        "name": "person",
                        "dgraph_type": "Person",
                        "query_filter": {"name": "id"},
                        "attributes": [{"name": "status"}]
                    },
                    {
                        "name": "email",
                        "dgraph_type": "EmailAddress",
                        "query_filter": {"name": "email_address", "key": "emails"},
                        "multiple": true
                    }
                ],
                "relations": [["person", "has_email", "email"]]
            },
            "data": data
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_success_reply() {
        let store = MemoryStore::new();
        let metrics = Metrics::new();

        let bytes = message(json!({"id": "abc", "status": "new", "emails": ["a@x", "b@x"]}));
        let reply = handle(&store, &metrics, Uuid::new_v4(), &bytes).await;

        assert_eq!(reply, Reply { ok: true });
        assert_eq!(store.commits(), 1);
        assert_eq!(store.node_count().await, 3);
        assert_eq!(metrics.snapshot().succeeded, 1);
    }

    #[tokio::test]
    async fn test_reimport_updates_existing_node() {
        let store = MemoryStore::new();
        let metrics = Metrics::new();

        let first = message(json!({"id": "abc", "status": "new", "emails": []}));
        let second = message(json!({"id": "abc", "status": "updated", "emails": []}));
        assert!(handle(&store, &metrics, Uuid::new_v4(), &first).await.ok);
        assert!(handle(&store, &metrics, Uuid::new_v4(), &second).await.ok);

        let bound = store.lookup("id", "abc").await;
        assert_eq!(bound.len(), 1);
        assert_eq!(bound[0].values["status"], "updated");
    }

    #[tokio::test]
    async fn test_malformed_input_never_reaches_store() {
        let store = MemoryStore::new();
        let metrics = Metrics::new();

        let cases: [&[u8]; 2] = [b"{not json", br#"{"config": {}, "data": {}}"#];
        for bytes in cases {
            let reply = handle(&store, &metrics, Uuid::new_v4(), bytes).await;
            assert_eq!(reply, Reply { ok: false });
        }

        assert_eq!(store.upsert_calls(), 0);
        assert_eq!(metrics.snapshot().failed_decode, 2);
    }

    #[tokio::test]
    async fn test_generation_failure_never_reaches_store() {
        let store = MemoryStore::new();
        let metrics = Metrics::new();

        let bytes = message(json!({"id": "abc", "status": "new", "emails": "a@x"}));
        let reply = handle(&store, &metrics, Uuid::new_v4(), &bytes).await;

        assert!(!reply.ok);
        assert_eq!(store.upsert_calls(), 0);
        assert_eq!(metrics.snapshot().failed_generation, 1);
    }

    #[tokio::test]
    async fn test_store_failure_discards() {
        let store = MemoryStore::new();
        store.fail_commits(true);
        let metrics = Metrics::new();

        let bytes = message(json!({"id": "abc", "status": "new", "emails": ["a@x"]}));
        let err = process(&store, &metrics, Uuid::new_v4(), &bytes)
            .await
            .unwrap_err();

        assert_eq!(err.stage(), FailureStage::Store);
        assert_eq!(store.discards(), 1);
        assert_eq!(store.node_count().await, 0);
    }

    #[test]
    fn test_reply_bytes() {
        assert_eq!(Reply { ok: true }.to_bytes(), br#"{"ok":true}"#.to_vec());
        assert_eq!(Reply { ok: false }.to_bytes(), br#"{"ok":false}"#.to_vec());
    }
}
