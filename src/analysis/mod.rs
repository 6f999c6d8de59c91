//! Read-side analysis over the built graph
//!
//! - [`paths`]: bounded attack path search
//! - [`risk`]: risk assessment, statistics, listings and visualization
//!
//! Every operation takes a [`QueryBudget`] and stops once it is spent.

pub mod budget;
pub mod paths;
pub mod risk;

pub use budget::QueryBudget;
pub use paths::{Path, PathFinder, PathQuery, PathSearch, PathStep};
pub use risk::{
    Direction, EdgeView, GraphStatistics, RiskAnalyzer, RiskAssessment, RiskFactor, VertexView,
    Visualization, VizEdge, VizNode, VizStatistics,
};
