use std::fmt;

use serde_json::Value;

/// Predicate carrying a node's graph type label.
pub const TYPE_PREDICATE: &str = "dgraph.type";

/// The query variable for one instance of an entity.
///
/// Single-valued entities use their bare name; instance `i` of a
/// multi-valued entity is `{name}_{i}`. Lookups, attribute statements and
/// edges all name their nodes through this function, which is what ties
/// mutation statements to the nodes the lookup query bound.
pub fn variable_name(entity: &str, index: Option<usize>) -> String {
    match index {
        Some(i) => format!("{entity}_{i}"),
        None => entity.to_string(),
    }
}

/// A string literal taken from the payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Literal(String);

impl Literal {
    /// Strings are taken verbatim, everything else as compact JSON text.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::String(s) => Self(s.clone()),
            other => Self(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Literal {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("\"")?;
        for c in self.0.chars() {
            match c {
                '\\' => f.write_str("\\\\")?,
                '"' => f.write_str("\\\"")?,
                '\n' => f.write_str("\\n")?,
                '\r' => f.write_str("\\r")?,
                '\t' => f.write_str("\\t")?,
                c => write!(f, "{c}")?,
            }
        }
        f.write_str("\"")
    }
}

/// `uid(variable) <predicate> "value" .`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub variable: String,
    pub predicate: String,
    pub value: Literal,
}

/// `uid(source) <relation> uid(destination) .`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub source: String,
    pub relation: String,
    pub destination: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Attribute(Binding),
    Edge(Edge),
}

impl Statement {
    pub fn subject(&self) -> &str {
        match self {
            Statement::Attribute(b) => &b.variable,
            Statement::Edge(e) => &e.source,
        }
    }
}

impl From<Binding> for Statement {
    fn from(binding: Binding) -> Self {
        Statement::Attribute(binding)
    }
}

impl From<Edge> for Statement {
    fn from(edge: Edge) -> Self {
        Statement::Edge(edge)
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "uid({}) <{}> {} .", self.variable, self.predicate, self.value)
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "uid({}) <{}> uid({}) .",
            self.source, self.relation, self.destination
        )
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Attribute(b) => b.fmt(f),
            Statement::Edge(e) => e.fmt(f),
        }
    }
}

/// Binds `variable` to any existing node whose `predicate` equals `value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupFragment {
    pub variable: String,
    pub predicate: String,
    pub value: Literal,
}

impl fmt::Display for LookupFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} as var(func: eq({}, {}))",
            self.variable, self.predicate, self.value
        )
    }
}

/// Everything generated for one payload: the lookup query and the
/// statements to apply against the variables it binds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Upsert {
    pub lookups: Vec<LookupFragment>,
    pub statements: Vec<Statement>,
}

impl Upsert {
    pub fn query_block(&self) -> String {
        let mut block = String::from("{\n");
        for lookup in &self.lookups {
            block.push_str("  ");
            block.push_str(&lookup.to_string());
            block.push('\n');
        }
        block.push('}');
        block
    }

    pub fn mutation_block(&self) -> String {
        self.statements
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn edge_count(&self) -> usize {
        self.statements
            .iter()
            .filter(|s| matches!(s, Statement::Edge(_)))
            .count()
    }
}
