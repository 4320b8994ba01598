use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::entity::EntityDescriptor;
use crate::error::{ExtractError, PlanError};
use crate::statement::{Edge, Statement, Upsert};

static VARIABLE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex"));

static PREDICATE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.\-]*$").expect("valid regex"));

/// A directed edge declaration, written as `[source, label, destination]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, String, String)", into = "(String, String, String)")]
pub struct Relation {
    pub source: String,
    pub label: String,
    pub destination: String,
}

impl Relation {
    pub fn new(
        source: impl Into<String>,
        label: impl Into<String>,
        destination: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            label: label.into(),
            destination: destination.into(),
        }
    }
}

impl From<(String, String, String)> for Relation {
    fn from((source, label, destination): (String, String, String)) -> Self {
        Self {
            source,
            label,
            destination,
        }
    }
}

impl From<Relation> for (String, String, String) {
    fn from(relation: Relation) -> Self {
        (relation.source, relation.label, relation.destination)
    }
}

/// The declarative mapping from payloads to graph upserts.
///
/// Built once and shared read-only. Relation endpoints are not checked here;
/// a relation naming an unknown entity fails when a payload is generated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PlanSpec")]
pub struct ExtractionPlan {
    entities: Vec<EntityDescriptor>,
    relations: Vec<Relation>,
}

#[derive(Deserialize)]
struct PlanSpec {
    entities: Vec<EntityDescriptor>,
    #[serde(default)]
    relations: Vec<Relation>,
}

impl TryFrom<PlanSpec> for ExtractionPlan {
    type Error = PlanError;

    fn try_from(spec: PlanSpec) -> Result<Self, Self::Error> {
        Self::new(spec.entities, spec.relations)
    }
}

impl ExtractionPlan {
    pub fn new(
        entities: Vec<EntityDescriptor>,
        relations: Vec<Relation>,
    ) -> Result<Self, PlanError> {
        let mut seen = HashSet::new();
        for entity in &entities {
            check_name("entity", &entity.name, &VARIABLE_NAME)?;
            if !seen.insert(entity.name.as_str()) {
                return Err(PlanError::DuplicateEntity(entity.name.clone()));
            }
            check_name("predicate", entity.identifying_field.name(), &PREDICATE_NAME)?;
            for attribute in &entity.attributes {
                check_name("predicate", attribute.name(), &PREDICATE_NAME)?;
            }
        }
        for relation in &relations {
            check_name("relation", &relation.label, &PREDICATE_NAME)?;
        }
        check_variable_collisions(&entities)?;

        Ok(Self {
            entities,
            relations,
        })
    }

    pub fn entities(&self) -> &[EntityDescriptor] {
        &self.entities
    }

    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    pub fn entity(&self, name: &str) -> Option<&EntityDescriptor> {
        self.entities.iter().find(|e| e.name == name)
    }

    /// Build the lookup query and the statement set for `payload`.
    ///
    /// Entity statements come first in declaration order, then relation
    /// edges in declaration order. Any failure discards everything.
    pub fn generate(&self, payload: &Map<String, Value>) -> Result<Upsert, ExtractError> {
        let mut upsert = Upsert::default();

        for entity in &self.entities {
            upsert.lookups.extend(entity.lookup_fragments(payload)?);
            upsert.statements.extend(
                entity
                    .attribute_bindings(payload)?
                    .into_iter()
                    .map(Statement::from),
            );
        }

        upsert.statements.extend(self.relation_statements(payload)?);

        debug!(
            lookups = upsert.lookups.len(),
            statements = upsert.statements.len(),
            edges = upsert.edge_count(),
            "Generated upsert"
        );
        Ok(upsert)
    }

    pub fn query(&self, payload: &Map<String, Value>) -> Result<String, ExtractError> {
        Ok(self.generate(payload)?.query_block())
    }

    pub fn mutations(&self, payload: &Map<String, Value>) -> Result<String, ExtractError> {
        Ok(self.generate(payload)?.mutation_block())
    }

    /// Every source instance is linked to every destination instance.
    fn relation_statements(
        &self,
        payload: &Map<String, Value>,
    ) -> Result<Vec<Statement>, ExtractError> {
        let mut statements = Vec::new();

        for relation in &self.relations {
            let sources = self
                .endpoint(relation, &relation.source)?
                .instance_variable_names(payload)?;
            let destinations = self
                .endpoint(relation, &relation.destination)?
                .instance_variable_names(payload)?;

            for source in &sources {
                for destination in &destinations {
                    statements.push(Statement::Edge(Edge {
                        source: source.clone(),
                        relation: relation.label.clone(),
                        destination: destination.clone(),
                    }));
                }
            }
        }

        Ok(statements)
    }

    fn endpoint(&self, relation: &Relation, name: &str) -> Result<&EntityDescriptor, ExtractError> {
        self.entity(name).ok_or_else(|| ExtractError::DanglingRelation {
            label: relation.label.clone(),
            entity: name.to_string(),
        })
    }
}

/// A single-valued `email_1` would share its variable with the second
/// instance of a multi-valued `email`.
fn check_variable_collisions(entities: &[EntityDescriptor]) -> Result<(), PlanError> {
    let multi_valued: HashSet<&str> = entities
        .iter()
        .filter(|e| e.multi_valued)
        .map(|e| e.name.as_str())
        .collect();

    for entity in entities.iter().filter(|e| !e.multi_valued) {
        let Some((prefix, index)) = entity.name.rsplit_once('_') else {
            continue;
        };
        if multi_valued.contains(prefix) && is_instance_index(index) {
            return Err(PlanError::VariableCollision {
                entity: entity.name.clone(),
                multi_valued: prefix.to_string(),
            });
        }
    }
    Ok(())
}

/// Indices render without leading zeros, so `email_01` is never generated.
fn is_instance_index(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().all(|b| b.is_ascii_digit())
        && (s == "0" || !s.starts_with('0'))
}

fn check_name(kind: &'static str, name: &str, pattern: &Regex) -> Result<(), PlanError> {
    if pattern.is_match(name) {
        Ok(())
    } else {
        Err(PlanError::InvalidName {
            kind,
            name: name.to_string(),
        })
    }
}
