use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use extract::{Statement, Upsert};

use crate::error::StoreError;
use crate::{GraphStore, Transaction};

/// In-process graph with the same upsert semantics as Dgraph.
///
/// Lookups bind every node whose predicate equals the value exactly. A
/// variable that bound nothing becomes one fresh node the first time a
/// statement references it. Each upsert is applied entirely or not at all.
#[derive(Clone, Default)]
pub struct MemoryStore {
    graph: Arc<Mutex<MemoryGraph>>,
    counters: Arc<Counters>,
    fail_commits: Arc<AtomicBool>,
}

#[derive(Default)]
struct Counters {
    upserts: AtomicUsize,
    commits: AtomicUsize,
    discards: AtomicUsize,
}

#[derive(Debug, Clone, Default)]
struct MemoryGraph {
    nodes: BTreeMap<u64, Node>,
    next_uid: u64,
    schema: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Node {
    pub uid: u64,
    pub values: BTreeMap<String, String>,
    pub edges: BTreeMap<String, BTreeSet<u64>>,
}

impl MemoryGraph {
    fn allocate(&mut self) -> u64 {
        self.next_uid += 1;
        let uid = self.next_uid;
        self.nodes.insert(
            uid,
            Node {
                uid,
                ..Node::default()
            },
        );
        uid
    }

    fn find(&self, predicate: &str, value: &str) -> Vec<u64> {
        self.nodes
            .values()
            .filter(|n| n.values.get(predicate).map(String::as_str) == Some(value))
            .map(|n| n.uid)
            .collect()
    }

    fn resolve(
        &mut self,
        bound: &mut HashMap<String, Vec<u64>>,
        variable: &str,
    ) -> Result<Vec<u64>, StoreError> {
        let uids = bound
            .get_mut(variable)
            .ok_or_else(|| StoreError::Rejected(format!("variable {variable} is not defined")))?;
        if uids.is_empty() {
            uids.push(self.allocate());
        }
        Ok(uids.clone())
    }

    fn apply(&mut self, upsert: &Upsert) -> Result<(), StoreError> {
        let mut bound: HashMap<String, Vec<u64>> = HashMap::with_capacity(upsert.lookups.len());
        for lookup in &upsert.lookups {
            let uids = self.find(&lookup.predicate, lookup.value.as_str());
            if bound.insert(lookup.variable.clone(), uids).is_some() {
                return Err(StoreError::Rejected(format!(
                    "variable {} is defined more than once",
                    lookup.variable
                )));
            }
        }

        for statement in &upsert.statements {
            match statement {
                Statement::Attribute(binding) => {
                    for uid in self.resolve(&mut bound, &binding.variable)? {
                        if let Some(node) = self.nodes.get_mut(&uid) {
                            node.values
                                .insert(binding.predicate.clone(), binding.value.as_str().to_string());
                        }
                    }
                }
                Statement::Edge(edge) => {
                    let sources = self.resolve(&mut bound, &edge.source)?;
                    let destinations = self.resolve(&mut bound, &edge.destination)?;
                    for uid in sources {
                        if let Some(node) = self.nodes.get_mut(&uid) {
                            node.edges
                                .entry(edge.relation.clone())
                                .or_default()
                                .extend(destinations.iter().copied());
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following commit fail after the statements were sent.
    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    pub fn upsert_calls(&self) -> usize {
        self.counters.upserts.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.counters.commits.load(Ordering::SeqCst)
    }

    pub fn discards(&self) -> usize {
        self.counters.discards.load(Ordering::SeqCst)
    }

    pub async fn node_count(&self) -> usize {
        self.graph.lock().await.nodes.len()
    }

    pub async fn nodes(&self) -> Vec<Node> {
        self.graph.lock().await.nodes.values().cloned().collect()
    }

    /// Nodes a lookup fragment on `predicate == value` would bind.
    pub async fn lookup(&self, predicate: &str, value: &str) -> Vec<Node> {
        let graph = self.graph.lock().await;
        graph
            .find(predicate, value)
            .into_iter()
            .filter_map(|uid| graph.nodes.get(&uid).cloned())
            .collect()
    }

    pub async fn schema(&self) -> Vec<String> {
        self.graph.lock().await.schema.iter().cloned().collect()
    }
}

#[async_trait]
impl GraphStore for MemoryStore {
    async fn alter_schema(&self, schema: &str) -> Result<(), StoreError> {
        let mut graph = self.graph.lock().await;
        for line in schema.lines().map(str::trim).filter(|l| !l.is_empty()) {
            graph.schema.insert(line.to_string());
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn begin(&self) -> Box<dyn Transaction + '_> {
        Box::new(MemoryTxn {
            store: self,
            finished: false,
        })
    }
}

struct MemoryTxn<'a> {
    store: &'a MemoryStore,
    finished: bool,
}

#[async_trait]
impl Transaction for MemoryTxn<'_> {
    async fn upsert_and_commit(&mut self, upsert: &Upsert) -> Result<(), StoreError> {
        if self.finished {
            return Err(StoreError::Finished);
        }
        self.store.counters.upserts.fetch_add(1, Ordering::SeqCst);

        let mut graph = self.store.graph.lock().await;
        let mut staged = graph.clone();
        staged.apply(upsert)?;

        if self.store.fail_commits.load(Ordering::SeqCst) {
            return Err(StoreError::Rejected("injected commit failure".to_string()));
        }

        *graph = staged;
        self.finished = true;
        self.store.counters.commits.fetch_add(1, Ordering::SeqCst);
        debug!(nodes = graph.nodes.len(), "Committed upsert");
        Ok(())
    }

    async fn discard(&mut self) -> Result<(), StoreError> {
        if !self.finished {
            self.finished = true;
            self.store.counters.discards.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use extract::{EntityDescriptor, ExtractionPlan, FieldAccessor, Relation};
    use serde_json::{json, Map, Value};

    fn payload(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn single_entity_plan() -> ExtractionPlan {
        ExtractionPlan::new(
            vec![
                EntityDescriptor::new("item", "Item", FieldAccessor::new("id"))
                    .with_attributes(vec![FieldAccessor::new("status")]),
            ],
            vec![],
        )
        .unwrap()
    }

    async fn run(store: &MemoryStore, upsert: &Upsert) -> Result<(), StoreError> {
        let mut txn = store.begin();
        let result = txn.upsert_and_commit(upsert).await;
        if result.is_err() {
            txn.discard().await?;
        }
        result
    }

    #[tokio::test]
    async fn test_repeated_import_updates_same_node() {
        let store = MemoryStore::new();
        let plan = single_entity_plan();

        let first = plan
            .generate(&payload(json!({"id": "abc", "status": "new"})))
            .unwrap();
        run(&store, &first).await.unwrap();
        assert_eq!(store.node_count().await, 1);

        let second = plan
            .generate(&payload(json!({"id": "abc", "status": "updated"})))
            .unwrap();
        run(&store, &second).await.unwrap();

        let bound = store.lookup("id", "abc").await;
        assert_eq!(bound.len(), 1);
        assert_eq!(bound[0].values.get("status").unwrap(), "updated");
        assert_eq!(bound[0].values.get("dgraph.type").unwrap(), "Item");
        assert_eq!(store.node_count().await, 1);
    }

    #[tokio::test]
    async fn test_multi_valued_import_is_idempotent() {
        let store = MemoryStore::new();
        let plan = ExtractionPlan::new(
            vec![
                EntityDescriptor::new("person", "Person", FieldAccessor::new("id")),
                EntityDescriptor::new(
                    "email",
                    "EmailAddress",
                    FieldAccessor::with_key("email_address", "emails"),
                )
                .multi_valued(),
            ],
            vec![Relation::new("person", "has_email", "email")],
        )
        .unwrap();
        let upsert = plan
            .generate(&payload(json!({"id": "p1", "emails": ["a@x", "b@x"]})))
            .unwrap();

        run(&store, &upsert).await.unwrap();
        run(&store, &upsert).await.unwrap();

        assert_eq!(store.node_count().await, 3);
        let person = store.lookup("id", "p1").await;
        assert_eq!(person.len(), 1);
        assert_eq!(person[0].edges.get("has_email").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_commit_applies_nothing() {
        let store = MemoryStore::new();
        store.fail_commits(true);

        let upsert = single_entity_plan()
            .generate(&payload(json!({"id": "abc", "status": "new"})))
            .unwrap();
        assert!(run(&store, &upsert).await.is_err());

        assert_eq!(store.node_count().await, 0);
        assert_eq!(store.upsert_calls(), 1);
        assert_eq!(store.commits(), 0);
        assert_eq!(store.discards(), 1);
    }

    #[tokio::test]
    async fn test_undefined_variable_is_rejected() {
        let store = MemoryStore::new();
        let mut upsert = single_entity_plan()
            .generate(&payload(json!({"id": "abc", "status": "new"})))
            .unwrap();
        upsert.lookups.clear();

        let err = run(&store, &upsert).await.unwrap_err();
        assert!(err.to_string().contains("variable item is not defined"));
        assert_eq!(store.node_count().await, 0);
    }

    #[tokio::test]
    async fn test_variable_defined_twice_is_rejected() {
        let store = MemoryStore::new();
        let mut upsert = single_entity_plan()
            .generate(&payload(json!({"id": "abc", "status": "new"})))
            .unwrap();
        let mut shadow = upsert.lookups[0].clone();
        shadow.predicate = "status".to_string();
        upsert.lookups.push(shadow);

        let err = run(&store, &upsert).await.unwrap_err();
        assert!(err.to_string().contains("variable item is defined more than once"));
        assert_eq!(store.node_count().await, 0);
        assert_eq!(store.discards(), 1);
    }

    #[tokio::test]
    async fn test_repeated_identifying_values_split_on_first_import() {
        let store = MemoryStore::new();
        let plan = ExtractionPlan::new(
            vec![
                EntityDescriptor::new(
                    "email",
                    "EmailAddress",
                    FieldAccessor::with_key("email_address", "emails"),
                )
                .multi_valued(),
            ],
            vec![],
        )
        .unwrap();
        let upsert = plan
            .generate(&payload(json!({"emails": ["a@x", "a@x"]})))
            .unwrap();

        // both lookups miss against an empty store
        run(&store, &upsert).await.unwrap();
        assert_eq!(store.lookup("email_address", "a@x").await.len(), 2);

        // afterwards each lookup binds both nodes, so no more are created
        run(&store, &upsert).await.unwrap();
        assert_eq!(store.node_count().await, 2);
    }

    #[tokio::test]
    async fn test_schema_is_idempotent() {
        let store = MemoryStore::new();
        let schema = crate::exact_string_schema(crate::DEFAULT_INDEXED_PREDICATES);
        store.alter_schema(&schema).await.unwrap();
        store.alter_schema(&schema).await.unwrap();
        assert_eq!(store.schema().await.len(), 2);
    }
}
