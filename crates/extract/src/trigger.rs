use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{DecodeError, ExtractError};
use crate::plan::ExtractionPlan;
use crate::statement::Upsert;

/// One unit of work: a plan paired with the payload it should be applied to.
#[derive(Debug, Clone)]
pub struct Trigger {
    plan: Arc<ExtractionPlan>,
    payload: Map<String, Value>,
}

/// Wire shape of an inbound message.
#[derive(Deserialize)]
struct TriggerMessage {
    config: ExtractionPlan,
    data: Map<String, Value>,
}

impl Trigger {
    pub fn new(plan: Arc<ExtractionPlan>, payload: Map<String, Value>) -> Self {
        Self { plan, payload }
    }

    /// Decode `{ "config": <plan>, "data": <object> }`.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, DecodeError> {
        let message: TriggerMessage = serde_json::from_slice(bytes)?;
        Ok(Self::new(Arc::new(message.config), message.data))
    }

    pub fn plan(&self) -> &ExtractionPlan {
        &self.plan
    }

    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }

    pub fn upsert(&self) -> Result<Upsert, ExtractError> {
        self.plan.generate(&self.payload)
    }

    /// The mutation block and the query block, in that order.
    pub fn mutations_and_query(&self) -> Result<(String, String), ExtractError> {
        let upsert = self.upsert()?;
        Ok((upsert.mutation_block(), upsert.query_block()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityDescriptor;
    use crate::field::FieldAccessor;
    use serde_json::json;

    #[test]
    fn test_decode_and_generate() {
        let bytes = serde_json::to_vec(&json!({
            "config": {
                "entities": [{
                    "name": "person",
                    "dgraph_type": "Person",
                    "query_filter": {"name": "email_address", "key": "email"}
                }],
                "relations": []
            },
            "data": {"email": "a@example.com"}
        }))
        .unwrap();

        let trigger = Trigger::from_slice(&bytes).unwrap();
        let (mutations, query) = trigger.mutations_and_query().unwrap();

        assert_eq!(
            query,
            "{\n  person as var(func: eq(email_address, \"a@example.com\"))\n}"
        );
        assert_eq!(
            mutations,
            "uid(person) <dgraph.type> \"Person\" .\n\
             uid(person) <email_address> \"a@example.com\" ."
        );
    }

    #[test]
    fn test_end_to_end_nested_person() {
        let plan = ExtractionPlan::new(
            vec![
                EntityDescriptor::new(
                    "person",
                    "Person",
                    FieldAccessor::with_key("email_address", "person.email"),
                )
                .with_attributes(vec![FieldAccessor::with_key("id", "person.email")]),
            ],
            vec![],
        )
        .unwrap();
        let payload = json!({"person": {"email": "a@example.com"}})
            .as_object()
            .cloned()
            .unwrap();

        let upsert = Trigger::new(Arc::new(plan), payload).upsert().unwrap();

        assert_eq!(upsert.lookups.len(), 1);
        assert_eq!(upsert.lookups[0].variable, "person");
        assert_eq!(upsert.lookups[0].predicate, "email_address");

        assert_eq!(upsert.statements.len(), 3);
        assert!(upsert.statements.iter().all(|s| s.subject() == "person"));
        assert_eq!(upsert.edge_count(), 0);
    }

    #[test]
    fn test_malformed_input() {
        let cases: [&[u8]; 4] = [
            b"not json",
            br#"{"data": {}}"#,
            br#"{"config": {"entities": []}, "data": [1, 2]}"#,
            br#"{"config": {"entities": [{"name": "x"}]}, "data": {}}"#,
        ];
        for bytes in cases {
            assert!(Trigger::from_slice(bytes).is_err());
        }
    }

    #[test]
    fn test_generation_error_propagates() {
        let bytes = br#"{
            "config": {"entities": [{"name": "p", "graph_type": "P", "identifying_field": {"name": "id"}}]},
            "data": {"name": "no id here"}
        }"#;
        let trigger = Trigger::from_slice(bytes).unwrap();
        let err = trigger.mutations_and_query().unwrap_err();
        assert_eq!(err.kind(), "missing_key");
    }
}
