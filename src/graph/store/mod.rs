//! Pure Rust graph storage using petgraph + redb
//!
//! The in-memory graph answers every query; redb persists it between
//! processes so `build` and later queries can run as separate commands.

use crate::error::{GraphError, GraphResult};
use crate::graph::filter::{EdgeFilter, VertexFilter};
use crate::graph::traits::GraphBackend;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use redb::ReadableTable;
use rustc_hash::FxHashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

pub use super::store_models::{
    Edge, EdgeId, EdgeLabel, PropertyMap, Vertex, VertexId, VertexLabel,
};

/// Embedded graph store
pub struct GraphStore {
    /// In-memory graph
    graph: RwLock<DiGraph<Vertex, Edge>>,
    /// Vertex lookup by store id
    index: RwLock<FxHashMap<VertexId, NodeIndex>>,
    /// Next id to hand out. Never reset, so a rebuild gets fresh ids.
    next_id: AtomicU64,
    /// Persistence layer (optional)
    db: Option<redb::Database>,
}

// redb table definitions
const VERTICES_TABLE: redb::TableDefinition<u64, &[u8]> = redb::TableDefinition::new("vertices");
const EDGES_TABLE: redb::TableDefinition<u64, &[u8]> = redb::TableDefinition::new("edges");
const META_TABLE: redb::TableDefinition<&str, u64> = redb::TableDefinition::new("meta");
const NEXT_ID_KEY: &str = "next_id";

impl GraphStore {
    /// Create or open a graph store at the given path
    pub fn open(db_path: &Path) -> GraphResult<Self> {
        std::fs::create_dir_all(db_path).map_err(|e| {
            GraphError::Connection(format!("cannot create {}: {}", db_path.display(), e))
        })?;

        // redb uses a single file, not a directory
        let db_file = db_path.join("graph.redb");
        let db = redb::Database::create(&db_file).map_err(|e| {
            GraphError::Connection(format!("cannot open {}: {}", db_file.display(), e))
        })?;

        let store = Self {
            graph: RwLock::new(DiGraph::new()),
            index: RwLock::new(FxHashMap::default()),
            next_id: AtomicU64::new(1),
            db: Some(db),
        };

        store.load().map_err(|e| {
            GraphError::Connection(format!("cannot load {}: {}", db_file.display(), e))
        })?;

        Ok(store)
    }

    /// Create an in-memory only store (no persistence)
    pub fn in_memory() -> Self {
        Self {
            graph: RwLock::new(DiGraph::new()),
            index: RwLock::new(FxHashMap::default()),
            next_id: AtomicU64::new(1),
            db: None,
        }
    }

    // ==================== Lock Helpers ====================
    //
    // Lock order is graph before index for every writer.

    fn read_graph(&self) -> GraphResult<RwLockReadGuard<'_, DiGraph<Vertex, Edge>>> {
        self.graph
            .read()
            .map_err(|_| GraphError::operation("lock", "graph lock poisoned"))
    }

    fn write_graph(&self) -> GraphResult<RwLockWriteGuard<'_, DiGraph<Vertex, Edge>>> {
        self.graph
            .write()
            .map_err(|_| GraphError::operation("lock", "graph lock poisoned"))
    }

    fn read_index(&self) -> GraphResult<RwLockReadGuard<'_, FxHashMap<VertexId, NodeIndex>>> {
        self.index
            .read()
            .map_err(|_| GraphError::operation("lock", "index lock poisoned"))
    }

    fn write_index(&self) -> GraphResult<RwLockWriteGuard<'_, FxHashMap<VertexId, NodeIndex>>> {
        self.index
            .write()
            .map_err(|_| GraphError::operation("lock", "index lock poisoned"))
    }

    fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Get node count
    pub fn node_count(&self) -> usize {
        self.read_graph().map(|g| g.node_count()).unwrap_or(0)
    }

    /// Get edge count
    pub fn edge_count(&self) -> usize {
        self.read_graph().map(|g| g.edge_count()).unwrap_or(0)
    }

    // ==================== Persistence ====================

    /// Persist graph to redb, replacing what was stored before
    pub fn save(&self) -> GraphResult<()> {
        let db = match &self.db {
            Some(db) => db,
            None => return Ok(()),
        };

        let graph = self.read_graph()?;

        let write_txn = db.begin_write().map_err(GraphError::op("save"))?;
        {
            write_txn
                .delete_table(VERTICES_TABLE)
                .map_err(GraphError::op("save"))?;
            write_txn
                .delete_table(EDGES_TABLE)
                .map_err(GraphError::op("save"))?;

            let mut vertices = write_txn
                .open_table(VERTICES_TABLE)
                .map_err(GraphError::op("save"))?;
            for vertex in graph.node_weights() {
                let value = serde_json::to_vec(vertex).map_err(GraphError::op("save"))?;
                vertices
                    .insert(vertex.id.0, value.as_slice())
                    .map_err(GraphError::op("save"))?;
            }

            let mut edges = write_txn
                .open_table(EDGES_TABLE)
                .map_err(GraphError::op("save"))?;
            for edge in graph.edge_weights() {
                let value = serde_json::to_vec(edge).map_err(GraphError::op("save"))?;
                edges
                    .insert(edge.id.0, value.as_slice())
                    .map_err(GraphError::op("save"))?;
            }

            let mut meta = write_txn
                .open_table(META_TABLE)
                .map_err(GraphError::op("save"))?;
            meta.insert(NEXT_ID_KEY, self.next_id.load(Ordering::SeqCst))
                .map_err(GraphError::op("save"))?;
        }
        write_txn.commit().map_err(GraphError::op("save"))?;

        tracing::debug!(
            "Saved graph: {} vertices, {} edges",
            graph.node_count(),
            graph.edge_count()
        );
        Ok(())
    }

    /// Load graph from redb
    fn load(&self) -> GraphResult<()> {
        let db = match &self.db {
            Some(db) => db,
            None => return Ok(()),
        };

        let read_txn = db.begin_read().map_err(GraphError::op("load"))?;

        let mut next_id = 1u64;
        match read_txn.open_table(META_TABLE) {
            Ok(meta) => {
                if let Some(stored) = meta.get(NEXT_ID_KEY).map_err(GraphError::op("load"))? {
                    next_id = stored.value();
                }
            }
            Err(redb::TableError::TableDoesNotExist(_)) => {}
            Err(e) => return Err(GraphError::operation("load", e)),
        }

        // Missing tables mean a fresh db
        let vertices_table = match read_txn.open_table(VERTICES_TABLE) {
            Ok(t) => Some(t),
            Err(redb::TableError::TableDoesNotExist(_)) => None,
            Err(e) => return Err(GraphError::operation("load", e)),
        };

        let mut graph = self.write_graph()?;
        let mut index = self.write_index()?;

        if let Some(table) = vertices_table {
            for item in table.iter().map_err(GraphError::op("load"))? {
                let (_, value) = item.map_err(GraphError::op("load"))?;
                let vertex: Vertex =
                    serde_json::from_slice(value.value()).map_err(GraphError::op("load"))?;
                next_id = next_id.max(vertex.id.0 + 1);
                let id = vertex.id;
                let idx = graph.add_node(vertex);
                index.insert(id, idx);
            }
        }

        let edges_table = match read_txn.open_table(EDGES_TABLE) {
            Ok(t) => Some(t),
            Err(redb::TableError::TableDoesNotExist(_)) => None,
            Err(e) => return Err(GraphError::operation("load", e)),
        };

        if let Some(table) = edges_table {
            for item in table.iter().map_err(GraphError::op("load"))? {
                let (_, value) = item.map_err(GraphError::op("load"))?;
                let edge: Edge =
                    serde_json::from_slice(value.value()).map_err(GraphError::op("load"))?;
                next_id = next_id.max(edge.id.0 + 1);
                match (index.get(&edge.from), index.get(&edge.to)) {
                    (Some(&from), Some(&to)) => {
                        graph.add_edge(from, to, edge);
                    }
                    _ => tracing::warn!("Dropping stored edge {} with missing endpoint", edge.id),
                }
            }
        }

        self.next_id.store(next_id, Ordering::SeqCst);
        Ok(())
    }
}

impl GraphBackend for GraphStore {
    fn ping(&self) -> GraphResult<()> {
        drop(self.read_graph()?);
        if let Some(ref db) = self.db {
            db.begin_read()
                .map_err(|e| GraphError::Connection(e.to_string()))?;
        }
        Ok(())
    }

    fn add_vertex(&self, label: VertexLabel, properties: PropertyMap) -> GraphResult<VertexId> {
        let mut graph = self.write_graph()?;
        let mut index = self.write_index()?;

        let id = VertexId(self.allocate_id());
        let idx = graph.add_node(Vertex {
            id,
            label,
            properties,
        });
        index.insert(id, idx);
        Ok(id)
    }

    fn add_edge(
        &self,
        from: VertexId,
        to: VertexId,
        label: EdgeLabel,
        properties: PropertyMap,
    ) -> GraphResult<EdgeId> {
        let mut graph = self.write_graph()?;
        let index = self.read_index()?;

        let (Some(&a), Some(&b)) = (index.get(&from), index.get(&to)) else {
            return Err(GraphError::operation(
                "add_edge",
                format!("{} edge {} -> {} references an unknown vertex", label, from, to),
            ));
        };

        let id = EdgeId(self.allocate_id());
        graph.add_edge(
            a,
            b,
            Edge {
                id,
                label,
                from,
                to,
                properties,
            },
        );
        Ok(id)
    }

    fn set_vertex_property(
        &self,
        id: VertexId,
        key: &str,
        value: serde_json::Value,
    ) -> GraphResult<()> {
        let mut graph = self.write_graph()?;
        let index = self.read_index()?;

        let vertex = index
            .get(&id)
            .and_then(|&idx| graph.node_weight_mut(idx))
            .ok_or_else(|| {
                GraphError::operation("set_vertex_property", format!("unknown vertex {}", id))
            })?;
        vertex.properties.insert(key.to_string(), value);
        Ok(())
    }

    fn query_vertices(&self, filter: &VertexFilter) -> GraphResult<Vec<Vertex>> {
        let graph = self.read_graph()?;
        let limit = filter.limit.unwrap_or(usize::MAX);

        if let Some(id) = filter.id {
            let index = self.read_index()?;
            return Ok(index
                .get(&id)
                .and_then(|&idx| graph.node_weight(idx))
                .filter(|v| filter.matches(v))
                .cloned()
                .into_iter()
                .take(limit)
                .collect());
        }

        // Node indices follow insertion order, which is id order
        Ok(graph
            .node_weights()
            .filter(|v| filter.matches(v))
            .take(limit)
            .cloned()
            .collect())
    }

    fn query_edges(&self, filter: &EdgeFilter) -> GraphResult<Vec<Edge>> {
        let graph = self.read_graph()?;
        let index = self.read_index()?;

        let anchor = filter.from.or(filter.to).or(filter.incident);
        let mut edges: Vec<Edge> = match anchor {
            None => graph
                .edge_weights()
                .filter(|e| filter.matches(e))
                .cloned()
                .collect(),
            Some(id) => {
                let Some(&idx) = index.get(&id) else {
                    return Ok(Vec::new());
                };
                graph
                    .edges_directed(idx, Direction::Outgoing)
                    .chain(graph.edges_directed(idx, Direction::Incoming))
                    .map(|e| e.weight())
                    .filter(|e| filter.matches(e))
                    .cloned()
                    .collect()
            }
        };

        edges.sort_by_key(|e| e.id);
        edges.dedup_by_key(|e| e.id);
        if let Some(limit) = filter.limit {
            edges.truncate(limit);
        }
        Ok(edges)
    }

    fn clear(&self) -> GraphResult<()> {
        let mut graph = self.write_graph()?;
        let mut index = self.write_index()?;

        graph.clear();
        index.clear();

        if let Some(ref db) = self.db {
            let write_txn = db.begin_write().map_err(GraphError::op("clear"))?;
            write_txn
                .delete_table(VERTICES_TABLE)
                .map_err(GraphError::op("clear"))?;
            write_txn
                .delete_table(EDGES_TABLE)
                .map_err(GraphError::op("clear"))?;
            write_txn.commit().map_err(GraphError::op("clear"))?;
        }

        Ok(())
    }

    fn flush(&self) -> GraphResult<()> {
        self.save()
    }

    fn count_vertices(&self, filter: &VertexFilter) -> GraphResult<usize> {
        let graph = self.read_graph()?;
        Ok(graph
            .node_weights()
            .filter(|v| filter.matches(v))
            .take(filter.limit.unwrap_or(usize::MAX))
            .count())
    }

    fn count_edges(&self, filter: &EdgeFilter) -> GraphResult<usize> {
        if filter.from.is_some() || filter.to.is_some() || filter.incident.is_some() {
            return Ok(self.query_edges(filter)?.len());
        }
        let graph = self.read_graph()?;
        Ok(graph
            .edge_weights()
            .filter(|e| filter.matches(e))
            .take(filter.limit.unwrap_or(usize::MAX))
            .count())
    }
}

#[cfg(test)]
mod tests;
