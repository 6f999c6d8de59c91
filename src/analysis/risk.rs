//! Risk assessment, statistics and visualization projections

use super::budget::QueryBudget;
use crate::config::AnalysisConfig;
use crate::error::GraphResult;
use crate::graph::{
    EdgeFilter, EdgeId, EdgeLabel, GraphBackend, PropertyMap, RiskLevel, Vertex, VertexFilter,
    VertexId, VertexLabel, RISK_LEVEL,
};
use crate::models::{is_privileged_pod, ContainerRecord, PolicyRule, SecurityContext};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Service types reachable from outside the cluster
const EXPOSED_SERVICE_TYPES: [&str; 2] = ["LoadBalancer", "NodePort"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFactor {
    pub factor: String,
    pub count: usize,
    pub severity: RiskLevel,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub high_risk_count: usize,
    pub privileged_pod_count: usize,
    pub exposed_service_count: usize,
    pub total_vertices: usize,
    /// Ranked by severity, then count
    pub risk_factors: Vec<RiskFactor>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphStatistics {
    pub total_vertices: usize,
    pub total_edges: usize,
    pub vertex_types: BTreeMap<VertexLabel, usize>,
    pub edge_types: BTreeMap<EdgeLabel, usize>,
}

/// A vertex as shown to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VertexView {
    pub id: VertexId,
    pub label: VertexLabel,
    pub name: Option<String>,
    pub namespace: Option<String>,
    pub risk_level: RiskLevel,
    pub properties: PropertyMap,
}

impl From<&Vertex> for VertexView {
    fn from(v: &Vertex) -> Self {
        Self {
            id: v.id,
            label: v.label,
            name: v.name().map(String::from),
            namespace: v.namespace().map(String::from),
            risk_level: v.risk_level(),
            properties: v.properties.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Outgoing,
    Incoming,
}

/// An edge seen from one of its endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeView {
    pub id: EdgeId,
    pub label: EdgeLabel,
    pub direction: Direction,
    pub relationship: Option<String>,
    pub properties: PropertyMap,
    /// The vertex on the other side
    pub peer: VertexView,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VizNode {
    pub id: VertexId,
    pub label: String,
    #[serde(rename = "type")]
    pub node_type: VertexLabel,
    pub namespace: Option<String>,
    pub properties: PropertyMap,
    pub risk_level: RiskLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VizEdge {
    pub id: EdgeId,
    pub source: VertexId,
    pub target: VertexId,
    pub label: String,
    #[serde(rename = "type")]
    pub edge_type: EdgeLabel,
    pub properties: PropertyMap,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VizStatistics {
    pub node_count: usize,
    pub edge_count: usize,
    pub node_types: BTreeMap<VertexLabel, usize>,
    /// Set when the node limit cut the projection short
    pub truncated: bool,
}

/// Bounded projection of the graph for rendering
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Visualization {
    pub nodes: Vec<VizNode>,
    pub edges: Vec<VizEdge>,
    pub statistics: VizStatistics,
}

pub struct RiskAnalyzer<'a> {
    backend: &'a dyn GraphBackend,
    settings: &'a AnalysisConfig,
}

impl<'a> RiskAnalyzer<'a> {
    pub fn new(backend: &'a dyn GraphBackend, settings: &'a AnalysisConfig) -> Self {
        Self { backend, settings }
    }

    pub fn risk_assessment(&self, budget: &QueryBudget) -> GraphResult<RiskAssessment> {
        const OP: &str = "risk_assessment";

        budget.check(OP)?;
        let total_vertices = self.backend.count_vertices(&VertexFilter::all())?;

        budget.check(OP)?;
        let high_risk_count = self
            .backend
            .count_vertices(&VertexFilter::all().has(RISK_LEVEL, RiskLevel::High.as_str()))?;

        budget.check(OP)?;
        let privileged_pod_count = self
            .backend
            .query_vertices(&VertexFilter::label(VertexLabel::Pod))?
            .iter()
            .filter(|pod| is_privileged(pod))
            .count();

        budget.check(OP)?;
        let exposed_service_count = self
            .backend
            .query_vertices(&VertexFilter::label(VertexLabel::Service))?
            .iter()
            .filter(|svc| is_exposed(svc))
            .count();

        budget.check(OP)?;
        let high_privilege_roles = self
            .backend
            .query_vertices(&VertexFilter::label(VertexLabel::ClusterRole))?
            .iter()
            .filter(|role| is_high_privilege(role))
            .count();

        let mut risk_factors: Vec<RiskFactor> = [
            (
                "privileged_containers",
                privileged_pod_count,
                RiskLevel::High,
                "Pods running privileged containers",
            ),
            (
                "exposed_services",
                exposed_service_count,
                RiskLevel::Medium,
                "Services reachable from outside the cluster",
            ),
            (
                "high_privilege_roles",
                high_privilege_roles,
                RiskLevel::High,
                "Cluster roles granting wildcard verbs or resources",
            ),
        ]
        .into_iter()
        .filter(|(_, count, _, _)| *count > 0)
        .map(|(factor, count, severity, description)| RiskFactor {
            factor: factor.to_string(),
            count,
            severity,
            description: description.to_string(),
        })
        .collect();
        risk_factors.sort_by(|a, b| b.severity.cmp(&a.severity).then(b.count.cmp(&a.count)));

        Ok(RiskAssessment {
            high_risk_count,
            privileged_pod_count,
            exposed_service_count,
            total_vertices,
            risk_factors,
        })
    }

    pub fn graph_statistics(&self, budget: &QueryBudget) -> GraphResult<GraphStatistics> {
        budget.check("graph_statistics")?;
        let vertices = self.backend.query_vertices(&VertexFilter::all())?;
        budget.check("graph_statistics")?;
        let edges = self.backend.query_edges(&EdgeFilter::all())?;

        let mut stats = GraphStatistics {
            total_vertices: vertices.len(),
            total_edges: edges.len(),
            ..Default::default()
        };
        for v in &vertices {
            *stats.vertex_types.entry(v.label).or_default() += 1;
        }
        for e in &edges {
            *stats.edge_types.entry(e.label).or_default() += 1;
        }
        Ok(stats)
    }

    /// Vertices, optionally narrowed to one label and/or namespace
    pub fn vertices(
        &self,
        label: Option<VertexLabel>,
        namespace: Option<&str>,
        budget: &QueryBudget,
    ) -> GraphResult<Vec<VertexView>> {
        budget.check("vertices")?;
        let mut filter = VertexFilter::all().with_label(label);
        if let Some(ns) = namespace {
            filter = filter.has("namespace", ns);
        }
        Ok(self
            .backend
            .query_vertices(&filter)?
            .iter()
            .map(VertexView::from)
            .collect())
    }

    /// Edges incident to `id` in both directions, with the peer vertex
    pub fn vertex_edges(&self, id: VertexId, budget: &QueryBudget) -> GraphResult<Vec<EdgeView>> {
        budget.check("vertex_edges")?;
        let edges = self.backend.query_edges(&EdgeFilter::incident(id))?;

        let mut views = Vec::with_capacity(edges.len());
        for edge in edges {
            budget.check("vertex_edges")?;
            let peer_id = edge.peer_of(id);
            let Some(peer) = self.backend.vertex(peer_id)? else {
                debug!("Edge {} points at missing vertex {}", edge.id, peer_id);
                continue;
            };
            views.push(EdgeView {
                id: edge.id,
                label: edge.label,
                direction: if edge.from == id {
                    Direction::Outgoing
                } else {
                    Direction::Incoming
                },
                relationship: edge.relationship().map(String::from),
                properties: edge.properties,
                peer: VertexView::from(&peer),
            });
        }
        Ok(views)
    }

    /// Node/edge projection capped at `viz_node_limit` vertices
    pub fn visualization(
        &self,
        namespace: Option<&str>,
        budget: &QueryBudget,
    ) -> GraphResult<Visualization> {
        const OP: &str = "visualization";

        budget.check(OP)?;
        let limit = self.settings.viz_node_limit;
        // One extra row tells a full graph apart from a cut one
        let mut filter = VertexFilter::all().limit(limit.saturating_add(1));
        if let Some(ns) = namespace {
            filter = filter.has("namespace", ns);
        }
        let mut vertices = self.backend.query_vertices(&filter)?;
        let truncated = vertices.len() > limit;
        vertices.truncate(limit);

        let nodes: Vec<VizNode> = vertices
            .iter()
            .filter_map(|v| {
                let name = v.name()?;
                Some(VizNode {
                    id: v.id,
                    label: name.to_string(),
                    node_type: v.label,
                    namespace: v.namespace().map(String::from),
                    properties: v.properties.clone(),
                    risk_level: v.risk_level(),
                })
            })
            .collect();
        let retained: FxHashSet<VertexId> = nodes.iter().map(|n| n.id).collect();

        let mut seen = FxHashSet::default();
        let mut edges = Vec::new();
        for node in &nodes {
            budget.check(OP)?;
            let incident = self.backend.query_edges(
                &EdgeFilter::incident(node.id).limit(self.settings.viz_edges_per_node),
            )?;
            for edge in incident {
                if !retained.contains(&edge.peer_of(node.id)) || !seen.insert(edge.id) {
                    continue;
                }
                edges.push(VizEdge {
                    id: edge.id,
                    source: edge.from,
                    target: edge.to,
                    label: edge.relationship().unwrap_or("connected").to_string(),
                    edge_type: edge.label,
                    properties: edge.properties,
                });
            }
        }

        let mut node_types: BTreeMap<VertexLabel, usize> = BTreeMap::new();
        for node in &nodes {
            *node_types.entry(node.node_type).or_default() += 1;
        }
        let statistics = VizStatistics {
            node_count: nodes.len(),
            edge_count: edges.len(),
            node_types,
            truncated,
        };
        Ok(Visualization {
            nodes,
            edges,
            statistics,
        })
    }
}

fn is_privileged(pod: &Vertex) -> bool {
    let containers = pod.decode_json::<Vec<ContainerRecord>>("containers");
    let ctx = pod.decode_json::<Option<SecurityContext>>("security_context");
    match (containers, ctx) {
        (Ok(containers), Ok(ctx)) => is_privileged_pod(&containers, ctx.as_ref()),
        (Err(e), _) | (_, Err(e)) => {
            warn!("Cannot read security settings of pod {}: {}", pod.id, e);
            false
        }
    }
}

fn is_exposed(svc: &Vertex) -> bool {
    if svc
        .get_str("type")
        .is_some_and(|t| EXPOSED_SERVICE_TYPES.contains(&t))
    {
        return true;
    }
    svc.decode_json::<Option<Vec<String>>>("external_ips")
        .map(|ips| ips.is_some_and(|ips| !ips.is_empty()))
        .unwrap_or(false)
}

fn is_high_privilege(role: &Vertex) -> bool {
    match role.decode_json::<Option<Vec<PolicyRule>>>("rules") {
        Ok(rules) => rules.unwrap_or_default().iter().any(PolicyRule::is_wildcard),
        Err(e) => {
            warn!("Cannot read rules of cluster role {}: {}", role.id, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{json_property, GraphBuilder, GraphStore};
    use crate::models::{
        ClusterRoleRecord, NamespaceRecord, PodRecord, ServiceRecord, Snapshot,
    };
    use maplit::btreemap;
    use serde_json::json;

    fn snapshot() -> Snapshot {
        let app = btreemap! {"app".to_string() => "web".to_string()};
        Snapshot {
            namespaces: vec![NamespaceRecord {
                name: "prod".into(),
                ..Default::default()
            }],
            pods: vec![
                PodRecord {
                    name: "web-0".into(),
                    namespace: "prod".into(),
                    labels: app.clone(),
                    service_account: Some("web".into()),
                    security_context: Some(SecurityContext {
                        privileged: Some(true),
                        run_as_root: Some(true),
                    }),
                    ..Default::default()
                },
                PodRecord {
                    name: "web-1".into(),
                    namespace: "prod".into(),
                    labels: app.clone(),
                    ..Default::default()
                },
            ],
            services: vec![
                ServiceRecord {
                    name: "web".into(),
                    namespace: "prod".into(),
                    labels: app,
                    service_type: Some("LoadBalancer".into()),
                    ..Default::default()
                },
                ServiceRecord {
                    name: "internal".into(),
                    namespace: "prod".into(),
                    labels: btreemap! {"app".to_string() => "none".to_string()},
                    service_type: Some("ClusterIP".into()),
                    external_ips: vec!["10.0.0.1".into()],
                    ..Default::default()
                },
            ],
            cluster_roles: vec![
                ClusterRoleRecord {
                    name: "cluster-admin".into(),
                    rules: vec![PolicyRule {
                        verbs: vec!["*".into()],
                        resources: vec!["*".into()],
                        ..Default::default()
                    }],
                    ..Default::default()
                },
                ClusterRoleRecord {
                    name: "view".into(),
                    rules: vec![PolicyRule {
                        verbs: vec!["get".into()],
                        resources: vec!["pods".into()],
                        ..Default::default()
                    }],
                    ..Default::default()
                },
            ],
            ..Default::default()
        }
    }

    fn built() -> GraphStore {
        let store = GraphStore::in_memory();
        GraphBuilder::new(&store).build(&snapshot()).unwrap();
        store
    }

    #[test]
    fn test_risk_assessment() {
        let store = built();
        let settings = AnalysisConfig::default();
        let risk = RiskAnalyzer::new(&store, &settings)
            .risk_assessment(&QueryBudget::unlimited())
            .unwrap();

        assert_eq!(risk.total_vertices, 7);
        assert_eq!(risk.high_risk_count, 1);
        assert_eq!(risk.privileged_pod_count, 1);
        assert_eq!(risk.exposed_service_count, 2);

        let factors: Vec<_> = risk
            .risk_factors
            .iter()
            .map(|f| (f.factor.as_str(), f.count, f.severity))
            .collect();
        assert_eq!(
            factors,
            vec![
                ("privileged_containers", 1, RiskLevel::High),
                ("high_privilege_roles", 1, RiskLevel::High),
                ("exposed_services", 2, RiskLevel::Medium),
            ]
        );
    }

    #[test]
    fn test_empty_graph_has_no_factors() {
        let store = GraphStore::in_memory();
        let settings = AnalysisConfig::default();
        let risk = RiskAnalyzer::new(&store, &settings)
            .risk_assessment(&QueryBudget::unlimited())
            .unwrap();
        assert_eq!(risk, RiskAssessment::default());
    }

    #[test]
    fn test_graph_statistics() {
        let store = built();
        let settings = AnalysisConfig::default();
        let stats = RiskAnalyzer::new(&store, &settings)
            .graph_statistics(&QueryBudget::unlimited())
            .unwrap();

        assert_eq!(stats.total_vertices, 7);
        assert_eq!(stats.vertex_types[&VertexLabel::Pod], 2);
        assert_eq!(stats.vertex_types[&VertexLabel::ClusterRole], 2);
        // 4 contains, 2 exposes, 2 escalation edges for the one pod with an account
        assert_eq!(stats.edge_types[&EdgeLabel::Contains], 4);
        assert_eq!(stats.edge_types[&EdgeLabel::Exposes], 2);
        assert_eq!(stats.edge_types[&EdgeLabel::PotentialEscalation], 2);
        assert_eq!(stats.total_edges, 8);
    }

    #[test]
    fn test_vertices_and_edges_views() {
        let store = built();
        let settings = AnalysisConfig::default();
        let analyzer = RiskAnalyzer::new(&store, &settings);
        let budget = QueryBudget::unlimited();

        let pods = analyzer
            .vertices(Some(VertexLabel::Pod), Some("prod"), &budget)
            .unwrap();
        assert_eq!(pods.len(), 2);
        let web0 = pods
            .iter()
            .find(|p| p.name.as_deref() == Some("web-0"))
            .unwrap();
        assert_eq!(web0.risk_level, RiskLevel::High);

        let edges = analyzer.vertex_edges(web0.id, &budget).unwrap();
        let incoming = edges
            .iter()
            .filter(|e| e.direction == Direction::Incoming)
            .count();
        let outgoing = edges
            .iter()
            .filter(|e| e.direction == Direction::Outgoing)
            .count();
        // contains + exposes in, two escalation edges out
        assert_eq!((incoming, outgoing), (2, 2));
        assert!(edges
            .iter()
            .any(|e| e.peer.name.as_deref() == Some("cluster-admin")));

        assert!(analyzer
            .vertices(None, Some("staging"), &budget)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_visualization_projection() {
        let store = built();
        // A vertex without a name is dropped from the projection
        store
            .add_vertex(
                VertexLabel::Pod,
                PropertyMap::from([("namespace".to_string(), json!("prod"))]),
            )
            .unwrap();

        let settings = AnalysisConfig::default();
        let viz = RiskAnalyzer::new(&store, &settings)
            .visualization(None, &QueryBudget::unlimited())
            .unwrap();

        assert_eq!(viz.nodes.len(), 7);
        assert_eq!(viz.edges.len(), 8);
        assert!(!viz.statistics.truncated);

        let ids: FxHashSet<_> = viz.edges.iter().map(|e| e.id).collect();
        assert_eq!(ids.len(), viz.edges.len(), "each edge listed once");

        let contains = viz
            .edges
            .iter()
            .find(|e| e.edge_type == EdgeLabel::Contains)
            .unwrap();
        let source = viz.nodes.iter().find(|n| n.id == contains.source).unwrap();
        assert_eq!(source.node_type, VertexLabel::Namespace, "real direction kept");
        assert!(contains.label.starts_with("namespace_contains_"));
    }

    #[test]
    fn test_visualization_node_limit() {
        let store = built();
        let settings = AnalysisConfig {
            viz_node_limit: 3,
            ..Default::default()
        };
        let viz = RiskAnalyzer::new(&store, &settings)
            .visualization(None, &QueryBudget::unlimited())
            .unwrap();
        assert_eq!(viz.nodes.len(), 3);
        assert!(viz.statistics.truncated);
        for edge in &viz.edges {
            assert!(viz.nodes.iter().any(|n| n.id == edge.source));
            assert!(viz.nodes.iter().any(|n| n.id == edge.target));
        }
    }

    #[test]
    fn test_visualization_at_exact_limit_is_complete() {
        let store = GraphStore::in_memory();
        for name in ["a", "b", "c"] {
            let properties = PropertyMap::from([("name".to_string(), json!(name))]);
            store.add_vertex(VertexLabel::Pod, properties).unwrap();
        }
        let settings = AnalysisConfig {
            viz_node_limit: 3,
            ..Default::default()
        };
        let viz = RiskAnalyzer::new(&store, &settings)
            .visualization(None, &QueryBudget::unlimited())
            .unwrap();
        assert_eq!(viz.nodes.len(), 3);
        assert!(!viz.statistics.truncated);
    }

    #[test]
    fn test_unlabeled_edges_are_connected() {
        let store = GraphStore::in_memory();
        let a = store
            .add_vertex(VertexLabel::Pod, PropertyMap::from([("name".to_string(), json!("a"))]))
            .unwrap();
        let b = store
            .add_vertex(
                VertexLabel::ClusterRole,
                PropertyMap::from([
                    ("name".to_string(), json!("b")),
                    ("rules".to_string(), json_property(&vec![PolicyRule::default()]).unwrap()),
                ]),
            )
            .unwrap();
        store
            .add_edge(a, b, EdgeLabel::PotentialEscalation, PropertyMap::new())
            .unwrap();

        let settings = AnalysisConfig::default();
        let viz = RiskAnalyzer::new(&store, &settings)
            .visualization(None, &QueryBudget::unlimited())
            .unwrap();
        assert_eq!(viz.edges.len(), 1);
        assert_eq!(viz.edges[0].label, "connected");
        assert_eq!(viz.nodes[0].risk_level, RiskLevel::Medium);
    }

    #[test]
    fn test_cancelled_budget_fails() {
        let store = built();
        let settings = AnalysisConfig::default();
        let budget = QueryBudget::unlimited();
        budget.cancel();

        let analyzer = RiskAnalyzer::new(&store, &settings);
        assert!(analyzer.risk_assessment(&budget).unwrap_err().is_cancelled());
        assert!(analyzer.graph_statistics(&budget).unwrap_err().is_cancelled());
        assert!(analyzer.visualization(None, &budget).unwrap_err().is_cancelled());
    }
}
