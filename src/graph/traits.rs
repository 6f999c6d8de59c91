//! Graph store adapter trait
//!
//! Every component talks to the graph through this capability, so the
//! builder and analyzers stay portable to any graph-capable backend.

use super::filter::{EdgeFilter, VertexFilter};
use super::store_models::{Edge, EdgeId, EdgeLabel, PropertyMap, Vertex, VertexId, VertexLabel};
use crate::error::GraphResult;
use std::sync::Arc;

/// Add/query/clear protocol of a graph store.
///
/// Every call is a synchronous round trip. Implementations do not cache or
/// retry: a failure is reported once as `GraphError::Operation`.
pub trait GraphBackend: Send + Sync {
    /// Startup handshake
    fn ping(&self) -> GraphResult<()>;

    /// Add a vertex and return its store-assigned id
    fn add_vertex(&self, label: VertexLabel, properties: PropertyMap) -> GraphResult<VertexId>;

    /// Add a directed edge between two existing vertices
    fn add_edge(
        &self,
        from: VertexId,
        to: VertexId,
        label: EdgeLabel,
        properties: PropertyMap,
    ) -> GraphResult<EdgeId>;

    /// Set (or overwrite) a single vertex property
    fn set_vertex_property(
        &self,
        id: VertexId,
        key: &str,
        value: serde_json::Value,
    ) -> GraphResult<()>;

    /// Vertices matching the filter, in ascending id order
    fn query_vertices(&self, filter: &VertexFilter) -> GraphResult<Vec<Vertex>>;

    /// Edges matching the filter, in ascending id order
    fn query_edges(&self, filter: &EdgeFilter) -> GraphResult<Vec<Edge>>;

    /// Drop every vertex and edge
    fn clear(&self) -> GraphResult<()>;

    /// Persist pending state (teardown)
    fn flush(&self) -> GraphResult<()> {
        Ok(())
    }

    /// Fetch one vertex by id
    fn vertex(&self, id: VertexId) -> GraphResult<Option<Vertex>> {
        Ok(self
            .query_vertices(&VertexFilter::id(id).limit(1))?
            .into_iter()
            .next())
    }

    fn count_vertices(&self, filter: &VertexFilter) -> GraphResult<usize> {
        Ok(self.query_vertices(filter)?.len())
    }

    fn count_edges(&self, filter: &EdgeFilter) -> GraphResult<usize> {
        Ok(self.query_edges(filter)?.len())
    }
}

impl<T: GraphBackend + ?Sized> GraphBackend for Arc<T> {
    fn ping(&self) -> GraphResult<()> {
        (**self).ping()
    }

    fn add_vertex(&self, label: VertexLabel, properties: PropertyMap) -> GraphResult<VertexId> {
        (**self).add_vertex(label, properties)
    }

    fn add_edge(
        &self,
        from: VertexId,
        to: VertexId,
        label: EdgeLabel,
        properties: PropertyMap,
    ) -> GraphResult<EdgeId> {
        (**self).add_edge(from, to, label, properties)
    }

    fn set_vertex_property(
        &self,
        id: VertexId,
        key: &str,
        value: serde_json::Value,
    ) -> GraphResult<()> {
        (**self).set_vertex_property(id, key, value)
    }

    fn query_vertices(&self, filter: &VertexFilter) -> GraphResult<Vec<Vertex>> {
        (**self).query_vertices(filter)
    }

    fn query_edges(&self, filter: &EdgeFilter) -> GraphResult<Vec<Edge>> {
        (**self).query_edges(filter)
    }

    fn clear(&self) -> GraphResult<()> {
        (**self).clear()
    }

    fn flush(&self) -> GraphResult<()> {
        (**self).flush()
    }

    fn vertex(&self, id: VertexId) -> GraphResult<Option<Vertex>> {
        (**self).vertex(id)
    }

    fn count_vertices(&self, filter: &VertexFilter) -> GraphResult<usize> {
        (**self).count_vertices(filter)
    }

    fn count_edges(&self, filter: &EdgeFilter) -> GraphResult<usize> {
        (**self).count_edges(filter)
    }
}
