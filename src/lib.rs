//! kubegraph - attack graph analysis for Kubernetes clusters
//!
//! Turns a point-in-time snapshot of cluster resources (namespaces, pods,
//! services, deployments, cluster roles) into a property graph, tags risky
//! workloads, synthesizes potential privilege escalation edges and answers
//! bounded path and risk queries over the result.

pub mod analysis;
pub mod config;
pub mod context;
pub mod error;
pub mod graph;
pub mod models;
pub mod service;

pub use analysis::{
    GraphStatistics, PathQuery, PathSearch, QueryBudget, RiskAssessment, Visualization,
};
pub use context::{GraphContext, GraphVersion};
pub use error::{GraphError, GraphResult};
pub use graph::{BuildReport, GraphBackend, GraphStore};
pub use models::Snapshot;
pub use service::{AttackGraphService, FullReport, Health, Response};
