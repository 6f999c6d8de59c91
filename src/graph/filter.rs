//! Backend-neutral query filters
//!
//! Replaces a traversal DSL with a small predicate language every backend
//! can evaluate: label selection, equality and substring predicates over
//! property values, endpoint selection for edges, and a result limit.

use super::store_models::{Edge, EdgeLabel, PropertyMap, Vertex, VertexId, VertexLabel};
use serde_json::Value;

/// Predicate over a single property value
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Property equals the value exactly
    Eq(Value),
    /// Property's text form contains the substring
    Contains(String),
}

impl Predicate {
    pub fn matches(&self, value: Option<&Value>) -> bool {
        match (self, value) {
            (Predicate::Eq(expected), Some(actual)) => actual == expected,
            (Predicate::Contains(needle), Some(Value::String(s))) => s.contains(needle.as_str()),
            (Predicate::Contains(needle), Some(other)) => {
                other.to_string().contains(needle.as_str())
            }
            (_, None) => false,
        }
    }
}

fn props_match(predicates: &[(String, Predicate)], properties: &PropertyMap) -> bool {
    predicates
        .iter()
        .all(|(key, pred)| pred.matches(properties.get(key)))
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VertexFilter {
    pub label: Option<VertexLabel>,
    pub id: Option<VertexId>,
    pub properties: Vec<(String, Predicate)>,
    pub limit: Option<usize>,
}

impl VertexFilter {
    /// Matches every vertex
    pub fn all() -> Self {
        Self::default()
    }

    pub fn label(label: VertexLabel) -> Self {
        Self {
            label: Some(label),
            ..Self::default()
        }
    }

    pub fn id(id: VertexId) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    pub fn with_label(mut self, label: Option<VertexLabel>) -> Self {
        self.label = label;
        self
    }

    pub fn has(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties
            .push((key.to_string(), Predicate::Eq(value.into())));
        self
    }

    pub fn has_containing(mut self, key: &str, needle: &str) -> Self {
        self.properties
            .push((key.to_string(), Predicate::Contains(needle.to_string())));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, vertex: &Vertex) -> bool {
        self.label.is_none_or(|l| l == vertex.label)
            && self.id.is_none_or(|id| id == vertex.id)
            && props_match(&self.properties, &vertex.properties)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EdgeFilter {
    pub label: Option<EdgeLabel>,
    pub from: Option<VertexId>,
    pub to: Option<VertexId>,
    /// Either endpoint
    pub incident: Option<VertexId>,
    pub properties: Vec<(String, Predicate)>,
    pub limit: Option<usize>,
}

impl EdgeFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn label(label: EdgeLabel) -> Self {
        Self {
            label: Some(label),
            ..Self::default()
        }
    }

    /// Outgoing edges of a vertex
    pub fn outgoing(from: VertexId) -> Self {
        Self {
            from: Some(from),
            ..Self::default()
        }
    }

    /// Incoming edges of a vertex
    pub fn incoming(to: VertexId) -> Self {
        Self {
            to: Some(to),
            ..Self::default()
        }
    }

    /// Edges touching a vertex in either direction
    pub fn incident(id: VertexId) -> Self {
        Self {
            incident: Some(id),
            ..Self::default()
        }
    }

    pub fn has(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties
            .push((key.to_string(), Predicate::Eq(value.into())));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, edge: &Edge) -> bool {
        self.label.is_none_or(|l| l == edge.label)
            && self.from.is_none_or(|id| id == edge.from)
            && self.to.is_none_or(|id| id == edge.to)
            && self
                .incident
                .is_none_or(|id| id == edge.from || id == edge.to)
            && props_match(&self.properties, &edge.properties)
    }
}
