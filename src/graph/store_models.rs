use crate::error::{GraphError, GraphResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Ordered property map. Composite values (labels, containers, rules,
/// selectors) are stored as JSON text.
pub type PropertyMap = BTreeMap<String, serde_json::Value>;

/// Store-assigned vertex identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VertexId(pub u64);

/// Store-assigned edge identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(pub u64);

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for VertexId {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(VertexId)
            .map_err(|_| GraphError::validation(format!("'{}' is not a valid vertex id", s)))
    }
}

/// Vertex types in the cluster graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum VertexLabel {
    Namespace,
    Pod,
    Service,
    Deployment,
    ClusterRole,
}

impl VertexLabel {
    pub const ALL: [VertexLabel; 5] = [
        VertexLabel::Namespace,
        VertexLabel::Pod,
        VertexLabel::Service,
        VertexLabel::Deployment,
        VertexLabel::ClusterRole,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VertexLabel::Namespace => "Namespace",
            VertexLabel::Pod => "Pod",
            VertexLabel::Service => "Service",
            VertexLabel::Deployment => "Deployment",
            VertexLabel::ClusterRole => "ClusterRole",
        }
    }

    /// Prefix of the build-scoped identity key
    pub fn key_prefix(&self) -> &'static str {
        match self {
            VertexLabel::Namespace => "namespace",
            VertexLabel::Pod => "pod",
            VertexLabel::Service => "service",
            VertexLabel::Deployment => "deployment",
            VertexLabel::ClusterRole => "cluster_role",
        }
    }
}

impl fmt::Display for VertexLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VertexLabel {
    type Err = GraphError;

    /// Accepts `Pod`, `pod`, `cluster_role`, `clusterrole`, ...
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_lowercase();
        VertexLabel::ALL
            .into_iter()
            .find(|l| l.as_str().to_lowercase() == normalized)
            .ok_or_else(|| {
                GraphError::validation(format!(
                    "unknown vertex type '{}' (expected one of: Namespace, Pod, Service, Deployment, ClusterRole)",
                    s
                ))
            })
    }
}

/// Edge types in the cluster graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeLabel {
    Contains,
    Exposes,
    Manages,
    PotentialEscalation,
}

impl EdgeLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeLabel::Contains => "contains",
            EdgeLabel::Exposes => "exposes",
            EdgeLabel::Manages => "manages",
            EdgeLabel::PotentialEscalation => "potential_escalation",
        }
    }
}

impl fmt::Display for EdgeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse per-vertex risk classification
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    #[default]
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            other => Err(GraphError::validation(format!(
                "unknown risk level '{}'",
                other
            ))),
        }
    }
}

/// Property key holding the derived risk level
pub const RISK_LEVEL: &str = "risk_level";

/// A vertex as returned by the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub id: VertexId,
    pub label: VertexLabel,
    pub properties: PropertyMap,
}

impl Vertex {
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(|v| v.as_str())
    }

    pub fn name(&self) -> Option<&str> {
        self.get_str("name")
    }

    pub fn namespace(&self) -> Option<&str> {
        self.get_str("namespace")
    }

    /// Risk level, `medium` when never tagged
    pub fn risk_level(&self) -> RiskLevel {
        self.get_str(RISK_LEVEL)
            .and_then(|s| s.parse().ok())
            .unwrap_or_default()
    }

    /// Decode a JSON-encoded composite property.
    ///
    /// Missing properties decode from `null`, so `Option<T>` and
    /// `#[serde(default)]` targets treat them as absent.
    pub fn decode_json<T: DeserializeOwned>(&self, key: &str) -> GraphResult<T> {
        let decoded = match self.properties.get(key) {
            Some(serde_json::Value::String(text)) => serde_json::from_str(text),
            Some(other) => serde_json::from_value(other.clone()),
            None => serde_json::from_value(serde_json::Value::Null),
        };
        decoded.map_err(|e| {
            GraphError::operation(
                "decode_property",
                format!("vertex {} property '{}': {}", self.id, key, e),
            )
        })
    }
}

/// An edge as returned by the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub label: EdgeLabel,
    pub from: VertexId,
    pub to: VertexId,
    pub properties: PropertyMap,
}

impl Edge {
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(|v| v.as_str())
    }

    /// Human readable relationship tag
    pub fn relationship(&self) -> Option<&str> {
        self.get_str("relationship")
    }

    /// The endpoint on the other side of `id`
    pub fn peer_of(&self, id: VertexId) -> VertexId {
        if self.from == id {
            self.to
        } else {
            self.from
        }
    }
}

/// Encode a composite value as a JSON text property
pub fn json_property<T: Serialize>(value: &T) -> GraphResult<serde_json::Value> {
    serde_json::to_string(value)
        .map(serde_json::Value::String)
        .map_err(GraphError::op("encode_property"))
}
