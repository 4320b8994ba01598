use thiserror::Error;

/// Failures while turning one payload into an upsert.
///
/// Any of these aborts generation for the whole trigger; no partial
/// statement set is ever returned alongside an error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("missing key `{key}` for field `{field}`")]
    MissingKey { field: String, key: String },

    #[error("entity `{entity}` is multi-valued but identifying field `{field}` is not a list")]
    Cardinality { entity: String, field: String },

    #[error(
        "entity `{entity}` field `{field}` has {found} values but identifying field has {expected}"
    )]
    ZipLength {
        entity: String,
        field: String,
        expected: usize,
        found: usize,
    },

    #[error("relation `{label}` references undeclared entity `{entity}`")]
    DanglingRelation { label: String, entity: String },
}

impl ExtractError {
    /// Short machine-friendly name used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ExtractError::MissingKey { .. } => "missing_key",
            ExtractError::Cardinality { .. } | ExtractError::ZipLength { .. } => "cardinality",
            ExtractError::DanglingRelation { .. } => "dangling_relation",
        }
    }
}

/// Structural problems with an extraction plan, caught when it is built.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("entity `{0}` is declared more than once")]
    DuplicateEntity(String),

    #[error("invalid {kind} name `{name}`")]
    InvalidName { kind: &'static str, name: String },

    #[error("entity `{entity}` has the same query variable as an instance of `{multi_valued}`")]
    VariableCollision {
        entity: String,
        multi_valued: String,
    },
}

/// The inbound bytes could not be turned into a trigger.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed trigger: {0}")]
    Json(#[from] serde_json::Error),
}
