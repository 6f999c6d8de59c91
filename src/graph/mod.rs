//! Cluster resource graph
//!
//! Pure Rust implementation using petgraph + redb.
//!
//! - [`traits::GraphBackend`]: the add/query/clear protocol every component uses
//! - [`store::GraphStore`]: embedded backend, optionally persisted to redb
//! - [`builder::GraphBuilder`]: snapshot -> vertices and edges

pub mod builder;
pub mod filter;
pub mod selector;
pub mod store;
pub mod store_models;
pub mod traits;

pub use builder::{BuildReport, GraphBuilder, VertexCache};
pub use filter::{EdgeFilter, Predicate, VertexFilter};
pub use selector::Selector;
pub use store::GraphStore;
pub use store_models::{
    json_property, Edge, EdgeId, EdgeLabel, PropertyMap, RiskLevel, Vertex, VertexId,
    VertexLabel, RISK_LEVEL,
};
pub use traits::GraphBackend;
