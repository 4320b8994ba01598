use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ExtractError;
use crate::field::FieldAccessor;
use crate::statement::{variable_name, Binding, Literal, LookupFragment, TYPE_PREDICATE};

/// One node type the payload describes.
///
/// A multi-valued entity stands for N occurrences in the same payload: its
/// identifying field must hold a list and every element becomes its own node.
/// Repeated elements are not merged, so `["a@x", "a@x"]` creates two nodes
/// when neither is found by the lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    pub name: String,
    #[serde(alias = "dgraph_type")]
    pub graph_type: String,
    #[serde(alias = "query_filter")]
    pub identifying_field: FieldAccessor,
    #[serde(default)]
    pub attributes: Vec<FieldAccessor>,
    #[serde(default, alias = "multiple")]
    pub multi_valued: bool,
}

impl EntityDescriptor {
    pub fn new(
        name: impl Into<String>,
        graph_type: impl Into<String>,
        identifying_field: FieldAccessor,
    ) -> Self {
        Self {
            name: name.into(),
            graph_type: graph_type.into(),
            identifying_field,
            attributes: Vec::new(),
            multi_valued: false,
        }
    }

    pub fn with_attributes(mut self, attributes: Vec<FieldAccessor>) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn multi_valued(mut self) -> Self {
        self.multi_valued = true;
        self
    }

    /// One variable per instance, in list order for multi-valued entities.
    pub fn instance_variable_names(
        &self,
        payload: &Map<String, Value>,
    ) -> Result<Vec<String>, ExtractError> {
        let count = self.identifying_values(payload)?.len();
        Ok(self.variables(count))
    }

    /// Type label, identifying field and attribute bindings, in that order.
    ///
    /// For multi-valued entities a list attribute is zipped with the
    /// instances and a scalar attribute is broadcast to all of them.
    pub fn attribute_bindings(
        &self,
        payload: &Map<String, Value>,
    ) -> Result<Vec<Binding>, ExtractError> {
        let identifying = self.identifying_values(payload)?;
        let variables = self.variables(identifying.len());

        let mut bindings = Vec::with_capacity(variables.len() * (self.attributes.len() + 2));

        let type_label = Literal::from(self.graph_type.as_str());
        bindings.extend(variables.iter().map(|variable| Binding {
            variable: variable.clone(),
            predicate: TYPE_PREDICATE.to_string(),
            value: type_label.clone(),
        }));

        bindings.extend(Self::bind(&variables, &self.identifying_field, &identifying));

        for attribute in &self.attributes {
            let values = self.attribute_values(attribute, variables.len(), payload)?;
            bindings.extend(Self::bind(&variables, attribute, &values));
        }

        Ok(bindings)
    }

    /// Exact-match lookups on the identifying field, one per instance.
    pub fn lookup_fragments(
        &self,
        payload: &Map<String, Value>,
    ) -> Result<Vec<LookupFragment>, ExtractError> {
        let identifying = self.identifying_values(payload)?;
        let variables = self.variables(identifying.len());

        Ok(variables
            .into_iter()
            .zip(identifying)
            .map(|(variable, value)| LookupFragment {
                variable,
                predicate: self.identifying_field.name().to_string(),
                value: Literal::from_value(value),
            })
            .collect())
    }

    fn variables(&self, count: usize) -> Vec<String> {
        if self.multi_valued {
            (0..count).map(|i| variable_name(&self.name, Some(i))).collect()
        } else {
            vec![variable_name(&self.name, None)]
        }
    }

    fn identifying_values<'a>(
        &self,
        payload: &'a Map<String, Value>,
    ) -> Result<Vec<&'a Value>, ExtractError> {
        let value = self.identifying_field.resolve(payload)?;
        if !self.multi_valued {
            return Ok(vec![value]);
        }
        match value {
            Value::Array(items) => Ok(items.iter().collect()),
            _ => Err(ExtractError::Cardinality {
                entity: self.name.clone(),
                field: self.identifying_field.name().to_string(),
            }),
        }
    }

    fn attribute_values<'a>(
        &self,
        attribute: &FieldAccessor,
        count: usize,
        payload: &'a Map<String, Value>,
    ) -> Result<Vec<&'a Value>, ExtractError> {
        let value = attribute.resolve(payload)?;
        if !self.multi_valued {
            return Ok(vec![value]);
        }
        match value {
            Value::Array(items) if items.len() == count => Ok(items.iter().collect()),
            Value::Array(items) => Err(ExtractError::ZipLength {
                entity: self.name.clone(),
                field: attribute.name().to_string(),
                expected: count,
                found: items.len(),
            }),
            scalar => Ok(vec![scalar; count]),
        }
    }

    fn bind<'v>(
        variables: &'v [String],
        field: &'v FieldAccessor,
        values: &'v [&Value],
    ) -> impl Iterator<Item = Binding> + 'v {
        variables.iter().zip(values).map(|(variable, value)| Binding {
            variable: variable.clone(),
            predicate: field.name().to_string(),
            value: Literal::from_value(value),
        })
    }
}
