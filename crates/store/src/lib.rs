pub mod dgraph;
pub mod error;
pub mod memory;
pub mod schema;

pub use dgraph::DgraphClient;
pub use error::StoreError;
pub use memory::{MemoryStore, Node};
pub use schema::{exact_string_schema, DEFAULT_INDEXED_PREDICATES};

use async_trait::async_trait;
use extract::Upsert;

/// A graph database able to run a lookup query and its mutation atomically.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Apply a schema declaration. Must be idempotent.
    async fn alter_schema(&self, schema: &str) -> Result<(), StoreError>;

    /// Cheap reachability check.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Open a transaction scope. Scopes are never shared between triggers.
    fn begin(&self) -> Box<dyn Transaction + '_>;
}

/// One transaction scope.
///
/// `upsert_and_commit` runs the lookup query and the statements as a single
/// request with immediate commit. After a failure the caller discards; the
/// store's atomic commit guarantees nothing was partially applied.
#[async_trait]
pub trait Transaction: Send {
    async fn upsert_and_commit(&mut self, upsert: &Upsert) -> Result<(), StoreError>;

    async fn discard(&mut self) -> Result<(), StoreError>;
}
