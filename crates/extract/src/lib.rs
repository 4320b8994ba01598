pub mod entity;
pub mod error;
pub mod field;
pub mod plan;
pub mod statement;
pub mod trigger;

pub use entity::EntityDescriptor;
pub use error::{DecodeError, ExtractError, PlanError};
pub use field::FieldAccessor;
pub use plan::{ExtractionPlan, Relation};
pub use statement::{
    variable_name, Binding, Edge, Literal, LookupFragment, Statement, Upsert, TYPE_PREDICATE,
};
pub use trigger::Trigger;
