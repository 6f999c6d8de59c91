//! Attack graph service
//!
//! Facade over [`GraphContext`] for callers that want a uniform envelope:
//! every method returns a [`Response`] and never panics or returns `Err`.

use crate::analysis::{
    EdgeView, GraphStatistics, PathFinder, PathQuery, PathSearch, RiskAnalyzer, RiskAssessment,
    VertexView, Visualization,
};
use crate::context::{GraphContext, GraphVersion};
use crate::error::GraphResult;
use crate::graph::{BuildReport, VertexId, VertexLabel};
use crate::models::{Snapshot, SnapshotSummary};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

/// Uniform result envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Graph generation observed at the end of the call
    pub version: GraphVersion,
    /// False when a rebuild overlapped this call
    pub consistent: bool,
}

impl<T> Response<T> {
    fn from_result(
        op: &str,
        result: GraphResult<T>,
        version: GraphVersion,
        consistent: bool,
    ) -> Self {
        match result {
            Ok(data) => Self {
                success: true,
                data: Some(data),
                error: None,
                version,
                consistent,
            },
            Err(e) => {
                if e.is_cancelled() {
                    warn!("{}: {}", op, e);
                } else {
                    error!("{} failed: {}", op, e);
                }
                Self {
                    success: false,
                    data: None,
                    error: Some(e.to_string()),
                    version,
                    consistent,
                }
            }
        }
    }

    pub fn into_result(self) -> Result<T, String> {
        match (self.data, self.error) {
            (Some(data), _) => Ok(data),
            (None, Some(e)) => Err(e),
            (None, None) => Err("empty response".to_string()),
        }
    }
}

/// Snapshot summary, build outcome, visualization and risk in one report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullReport {
    pub snapshot: SnapshotSummary,
    pub build: BuildReport,
    pub visualization: Visualization,
    pub risk_assessment: RiskAssessment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Health {
    pub store_reachable: bool,
    pub generation: u64,
    pub rebuilding: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct AttackGraphService {
    ctx: GraphContext,
}

impl AttackGraphService {
    pub fn new(ctx: GraphContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &GraphContext {
        &self.ctx
    }

    pub fn into_context(self) -> GraphContext {
        self.ctx
    }

    /// Replace the graph with `snapshot`
    pub fn build(&self, snapshot: &Snapshot) -> Response<BuildReport> {
        let result = self.ctx.build(snapshot);
        Response::from_result("build", result, self.ctx.version(), true)
    }

    /// Bounded path search. Parameters arrive as strings and are validated
    /// before the store is touched.
    pub fn find_paths(
        &self,
        source: Option<&str>,
        target: Option<&str>,
        max_depth: Option<&str>,
    ) -> Response<PathSearch> {
        let query = match PathQuery::parse(source, target, max_depth, self.ctx.settings()) {
            Ok(query) => query,
            Err(e) => return Response::from_result("find_paths", Err(e), self.ctx.version(), true),
        };
        let (result, version, consistent) = self.ctx.read(|ctx| {
            PathFinder::new(ctx.backend(), ctx.settings()).find_paths(&query, &ctx.budget())
        });
        Response::from_result("find_paths", result, version, consistent)
    }

    pub fn vertices(
        &self,
        label: Option<&str>,
        namespace: Option<&str>,
    ) -> Response<Vec<VertexView>> {
        let label = match label.map(str::trim).filter(|s| !s.is_empty()) {
            None => None,
            Some(raw) => match raw.parse::<VertexLabel>() {
                Ok(label) => Some(label),
                Err(e) => {
                    return Response::from_result("vertices", Err(e), self.ctx.version(), true)
                }
            },
        };
        let (result, version, consistent) = self.ctx.read(|ctx| {
            RiskAnalyzer::new(ctx.backend(), ctx.settings()).vertices(
                label,
                namespace,
                &ctx.budget(),
            )
        });
        Response::from_result("vertices", result, version, consistent)
    }

    pub fn vertex_edges(&self, id: &str) -> Response<Vec<EdgeView>> {
        let id = match id.parse::<VertexId>() {
            Ok(id) => id,
            Err(e) => {
                return Response::from_result("vertex_edges", Err(e), self.ctx.version(), true)
            }
        };
        let (result, version, consistent) = self.ctx.read(|ctx| {
            RiskAnalyzer::new(ctx.backend(), ctx.settings()).vertex_edges(id, &ctx.budget())
        });
        Response::from_result("vertex_edges", result, version, consistent)
    }

    pub fn risk_assessment(&self) -> Response<RiskAssessment> {
        let (result, version, consistent) = self.ctx.read(|ctx| {
            RiskAnalyzer::new(ctx.backend(), ctx.settings()).risk_assessment(&ctx.budget())
        });
        Response::from_result("risk_assessment", result, version, consistent)
    }

    pub fn graph_statistics(&self) -> Response<GraphStatistics> {
        let (result, version, consistent) = self.ctx.read(|ctx| {
            RiskAnalyzer::new(ctx.backend(), ctx.settings()).graph_statistics(&ctx.budget())
        });
        Response::from_result("graph_statistics", result, version, consistent)
    }

    pub fn visualization(&self, namespace: Option<&str>) -> Response<Visualization> {
        let (result, version, consistent) = self.ctx.read(|ctx| {
            RiskAnalyzer::new(ctx.backend(), ctx.settings()).visualization(namespace, &ctx.budget())
        });
        Response::from_result("visualization", result, version, consistent)
    }

    /// Build, then project and assess the fresh graph
    pub fn full_process(
        &self,
        snapshot: &Snapshot,
        namespace: Option<&str>,
    ) -> Response<FullReport> {
        let result = self.ctx.build(snapshot).and_then(|build| {
            let generation = build.generation;
            let budget = self.ctx.budget();
            let analyzer = RiskAnalyzer::new(self.ctx.backend(), self.ctx.settings());
            let visualization = analyzer.visualization(namespace, &budget)?;
            let risk_assessment = analyzer.risk_assessment(&budget)?;
            if self.ctx.version().generation != generation {
                warn!("Graph was rebuilt while the full report was assembled");
            }
            Ok(FullReport {
                snapshot: snapshot.summary(),
                build,
                visualization,
                risk_assessment,
            })
        });

        let version = self.ctx.version();
        let consistent = match &result {
            Ok(report) => report.build.generation == version.generation && !version.rebuilding,
            Err(_) => true,
        };
        Response::from_result("full_process", result, version, consistent)
    }

    pub fn health(&self) -> Health {
        let version = self.ctx.version();
        let ping = self.ctx.backend().ping();
        Health {
            store_reachable: ping.is_ok(),
            generation: version.generation,
            rebuilding: version.rebuilding,
            error: ping.err().map(|e| e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;
    use crate::models::{NamespaceRecord, PodRecord};

    fn service() -> AttackGraphService {
        AttackGraphService::new(GraphContext::in_memory(AnalysisConfig::default()).unwrap())
    }

    fn snapshot() -> Snapshot {
        Snapshot {
            namespaces: vec![NamespaceRecord {
                name: "default".into(),
                ..Default::default()
            }],
            pods: vec![PodRecord {
                name: "web".into(),
                namespace: "default".into(),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_build_response() {
        let svc = service();
        let response = svc.build(&snapshot());
        assert!(response.success);
        assert!(response.consistent);
        assert_eq!(response.version.generation, 1);
        assert_eq!(response.data.unwrap().total_vertices(), 2);
    }

    #[test]
    fn test_invalid_parameters_fail_without_panicking() {
        let svc = service();

        let paths = svc.find_paths(None, None, Some("deep"));
        assert!(!paths.success);
        assert!(paths.data.is_none());
        assert!(paths.error.unwrap().contains("max_depth"));

        assert!(!svc.vertices(Some("Secret"), None).success);
        assert!(!svc.vertex_edges("not-a-number").success);
    }

    #[test]
    fn test_reads_after_build() {
        let svc = service();
        svc.build(&snapshot());

        let vertices = svc.vertices(Some("pod"), Some("default")).into_result().unwrap();
        assert_eq!(vertices.len(), 1);

        let edges = svc
            .vertex_edges(&vertices[0].id.to_string())
            .into_result()
            .unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].relationship.as_deref(), Some("namespace_contains_pod"));

        let paths = svc.find_paths(Some("Namespace"), Some("Pod"), Some("2"));
        assert!(paths.consistent);
        assert_eq!(paths.data.unwrap().paths.len(), 1);

        let stats = svc.graph_statistics().into_result().unwrap();
        assert_eq!((stats.total_vertices, stats.total_edges), (2, 1));
    }

    #[test]
    fn test_full_process() {
        let svc = service();
        let report = svc.full_process(&snapshot(), None).into_result().unwrap();
        assert_eq!(report.snapshot.pods, 1);
        assert_eq!(report.build.generation, 1);
        assert_eq!(report.visualization.nodes.len(), 2);
        assert_eq!(report.risk_assessment.total_vertices, 2);
    }

    #[test]
    fn test_health() {
        let svc = service();
        let health = svc.health();
        assert!(health.store_reachable);
        assert_eq!(health.generation, 0);
        assert!(health.error.is_none());
    }
}
