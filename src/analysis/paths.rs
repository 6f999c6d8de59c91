//! Bounded attack path search
//!
//! Depth-first traversal along outgoing edges from a sample of source
//! vertices. A path never visits the same vertex twice and never has more
//! than `max_depth` hops.

use super::budget::QueryBudget;
use crate::config::AnalysisConfig;
use crate::error::{GraphError, GraphResult};
use crate::graph::{
    Edge, EdgeFilter, EdgeLabel, GraphBackend, PropertyMap, Vertex, VertexFilter, VertexId,
    VertexLabel,
};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Validated path search parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathQuery {
    pub source: Option<VertexLabel>,
    pub target: Option<VertexLabel>,
    pub max_depth: usize,
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

impl PathQuery {
    /// Parse caller-supplied string parameters.
    ///
    /// Nothing touches the store here; any malformed value is a
    /// [`GraphError::Validation`].
    pub fn parse(
        source: Option<&str>,
        target: Option<&str>,
        max_depth: Option<&str>,
        settings: &AnalysisConfig,
    ) -> GraphResult<Self> {
        let source: Option<VertexLabel> = non_empty(source).map(str::parse).transpose()?;
        let target: Option<VertexLabel> = non_empty(target).map(str::parse).transpose()?;
        let max_depth = match non_empty(max_depth) {
            None => settings.default_max_depth,
            Some(raw) => raw.parse::<usize>().map_err(|_| {
                GraphError::validation(format!("max_depth '{}' is not a positive integer", raw))
            })?,
        };

        let query = Self {
            source,
            target,
            max_depth,
        };
        query.validate(settings)?;
        Ok(query)
    }

    pub fn validate(&self, settings: &AnalysisConfig) -> GraphResult<()> {
        if self.max_depth == 0 || self.max_depth > settings.max_depth_limit {
            return Err(GraphError::validation(format!(
                "max_depth must be between 1 and {} (got {})",
                settings.max_depth_limit, self.max_depth
            )));
        }
        Ok(())
    }
}

/// One element of a path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PathStep {
    Vertex {
        id: VertexId,
        label: VertexLabel,
        properties: PropertyMap,
    },
    Edge {
        label: EdgeLabel,
    },
}

impl PathStep {
    fn vertex(v: &Vertex) -> Self {
        PathStep::Vertex {
            id: v.id,
            label: v.label,
            properties: v.properties.clone(),
        }
    }
}

/// Alternating vertex / edge steps, starting and ending with a vertex
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path {
    pub steps: Vec<PathStep>,
}

impl Path {
    pub fn vertex_ids(&self) -> Vec<VertexId> {
        self.steps
            .iter()
            .filter_map(|s| match s {
                PathStep::Vertex { id, .. } => Some(*id),
                PathStep::Edge { .. } => None,
            })
            .collect()
    }

    pub fn hops(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s, PathStep::Edge { .. }))
            .count()
    }

    /// Vertex labels and edge labels joined with arrows
    pub fn describe(&self) -> String {
        self.steps
            .iter()
            .map(|s| match s {
                PathStep::Vertex {
                    label, properties, ..
                } => {
                    let name = properties
                        .get("name")
                        .and_then(|v| v.as_str())
                        .unwrap_or("?");
                    format!("{}({})", label, name)
                }
                PathStep::Edge { label } => format!("-[{}]->", label),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PathSearch {
    pub paths: Vec<Path>,
    /// Set when the budget ran out and the result is partial
    pub truncated: bool,
    pub sources_examined: usize,
}

/// Path finder over a graph backend
///
/// Outgoing edges and vertices are memoized for the lifetime of one finder.
pub struct PathFinder<'a> {
    backend: &'a dyn GraphBackend,
    source_sample: usize,
    paths_per_source: usize,
    outgoing: FxHashMap<VertexId, Vec<Edge>>,
    vertices: FxHashMap<VertexId, Option<Vertex>>,
}

impl<'a> PathFinder<'a> {
    pub fn new(backend: &'a dyn GraphBackend, settings: &AnalysisConfig) -> Self {
        Self {
            backend,
            source_sample: settings.source_sample,
            paths_per_source: settings.paths_per_source,
            outgoing: FxHashMap::default(),
            vertices: FxHashMap::default(),
        }
    }

    pub fn find_paths(
        &mut self,
        query: &PathQuery,
        budget: &QueryBudget,
    ) -> GraphResult<PathSearch> {
        budget.check("find_paths")?;

        let sources = self.backend.query_vertices(
            &VertexFilter::all()
                .with_label(query.source)
                .limit(self.source_sample),
        )?;
        debug!(
            "Path search from {} source vertices (max depth {})",
            sources.len(),
            query.max_depth
        );

        let mut search = PathSearch::default();
        for source in &sources {
            let mut found = Vec::new();
            let mut steps = vec![PathStep::vertex(source)];
            let mut visited = FxHashSet::default();
            visited.insert(source.id);

            let result = self.walk(source, 0, query, &mut steps, &mut visited, &mut found, budget);
            search.paths.append(&mut found);
            search.sources_examined += 1;

            match result {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => {
                    debug!("Path search cut short: {}", e);
                    search.truncated = true;
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(search)
    }

    #[allow(clippy::too_many_arguments)]
    fn walk(
        &mut self,
        current: &Vertex,
        depth: usize,
        query: &PathQuery,
        steps: &mut Vec<PathStep>,
        visited: &mut FxHashSet<VertexId>,
        found: &mut Vec<Path>,
        budget: &QueryBudget,
    ) -> GraphResult<()> {
        if found.len() >= self.paths_per_source {
            return Ok(());
        }

        match query.target {
            Some(target) if depth > 0 && current.label == target => {
                found.push(Path {
                    steps: steps.clone(),
                });
                return Ok(());
            }
            _ if depth == query.max_depth => {
                if query.target.is_none() {
                    found.push(Path {
                        steps: steps.clone(),
                    });
                }
                return Ok(());
            }
            _ => {}
        }

        budget.check("find_paths")?;
        let edges = self.outgoing(current.id)?;
        for edge in edges {
            if found.len() >= self.paths_per_source {
                break;
            }
            if visited.contains(&edge.to) {
                continue;
            }
            let Some(next) = self.vertex(edge.to)? else {
                continue;
            };

            steps.push(PathStep::Edge { label: edge.label });
            steps.push(PathStep::vertex(&next));
            visited.insert(next.id);

            let result = self.walk(&next, depth + 1, query, steps, visited, found, budget);

            visited.remove(&next.id);
            steps.truncate(steps.len() - 2);
            result?;
        }
        Ok(())
    }

    fn outgoing(&mut self, id: VertexId) -> GraphResult<Vec<Edge>> {
        if let Some(edges) = self.outgoing.get(&id) {
            return Ok(edges.clone());
        }
        let edges = self.backend.query_edges(&EdgeFilter::outgoing(id))?;
        self.outgoing.insert(id, edges.clone());
        Ok(edges)
    }

    fn vertex(&mut self, id: VertexId) -> GraphResult<Option<Vertex>> {
        if let Some(v) = self.vertices.get(&id) {
            return Ok(v.clone());
        }
        let v = self.backend.vertex(id)?;
        self.vertices.insert(id, v.clone());
        Ok(v)
    }
}
