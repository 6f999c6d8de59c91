//! Graph context
//!
//! Owns the store handle, the build gate and the analysis settings. A
//! context is created explicitly with [`GraphContext::connect`] and torn
//! down with [`GraphContext::shutdown`]; there is no process-wide graph.

use crate::analysis::QueryBudget;
use crate::config::AnalysisConfig;
use crate::error::{GraphError, GraphResult};
use crate::graph::{BuildReport, GraphBackend, GraphBuilder, GraphStore};
use crate::models::Snapshot;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

/// Generation of the graph a reader observed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphVersion {
    pub generation: u64,
    pub rebuilding: bool,
}

/// Serializes builds and publishes a generation number per build
#[derive(Debug, Default)]
pub struct BuildGate {
    lock: Mutex<()>,
    generation: AtomicU64,
    rebuilding: AtomicBool,
}

impl BuildGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for any running build, then mark the graph as rebuilding
    pub fn begin(&self) -> GraphResult<BuildTicket<'_>> {
        let guard = self
            .lock
            .lock()
            .map_err(|_| GraphError::operation("build", "build gate poisoned"))?;
        self.rebuilding.store(true, Ordering::Release);
        Ok(BuildTicket {
            gate: self,
            _guard: guard,
            published: None,
        })
    }

    pub fn version(&self) -> GraphVersion {
        GraphVersion {
            generation: self.generation.load(Ordering::Acquire),
            rebuilding: self.rebuilding.load(Ordering::Acquire),
        }
    }
}

/// Exclusive right to rebuild the graph.
///
/// Dropping the ticket (also on failure) publishes a new generation, since
/// the store content changed either way.
pub struct BuildTicket<'a> {
    gate: &'a BuildGate,
    _guard: MutexGuard<'a, ()>,
    published: Option<u64>,
}

impl BuildTicket<'_> {
    /// Publish the build and return its generation
    pub fn finish(mut self) -> u64 {
        self.publish()
    }

    fn publish(&mut self) -> u64 {
        if let Some(generation) = self.published {
            return generation;
        }
        let generation = self.gate.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.gate.rebuilding.store(false, Ordering::Release);
        self.published = Some(generation);
        generation
    }
}

impl Drop for BuildTicket<'_> {
    fn drop(&mut self) {
        self.publish();
    }
}

/// Store handle plus build coordination, shared by the builder and analyzers
pub struct GraphContext {
    backend: Arc<dyn GraphBackend>,
    gate: BuildGate,
    settings: AnalysisConfig,
}

impl GraphContext {
    /// Handshake with the backend. Fails with [`GraphError::Connection`].
    pub fn connect(backend: Arc<dyn GraphBackend>, settings: AnalysisConfig) -> GraphResult<Self> {
        backend.ping().map_err(|e| match e {
            GraphError::Connection(_) => e,
            other => GraphError::Connection(other.to_string()),
        })?;
        debug!("Graph store reachable");
        Ok(Self {
            backend,
            gate: BuildGate::new(),
            settings,
        })
    }

    /// Open (or create) the persistent store at `db_path`
    pub fn open(db_path: &Path, settings: AnalysisConfig) -> GraphResult<Self> {
        let store = GraphStore::open(db_path)?;
        Self::connect(Arc::new(store), settings)
    }

    /// Context over a fresh in-memory store
    pub fn in_memory(settings: AnalysisConfig) -> GraphResult<Self> {
        Self::connect(Arc::new(GraphStore::in_memory()), settings)
    }

    pub fn backend(&self) -> &dyn GraphBackend {
        self.backend.as_ref()
    }

    pub fn settings(&self) -> &AnalysisConfig {
        &self.settings
    }

    pub fn version(&self) -> GraphVersion {
        self.gate.version()
    }

    /// A fresh budget using the configured query timeout
    pub fn budget(&self) -> QueryBudget {
        QueryBudget::with_timeout(self.settings.query_timeout())
    }

    /// Replace the graph with `snapshot`. Concurrent builds run one at a time.
    pub fn build(&self, snapshot: &Snapshot) -> GraphResult<BuildReport> {
        let ticket = self.gate.begin()?;
        let result = GraphBuilder::new(self.backend())
            .with_escalation_confidence(self.settings.escalation_confidence)
            .build(snapshot);
        let generation = ticket.finish();

        let mut report = result?;
        report.generation = generation;
        info!("Published graph generation {}", generation);
        Ok(report)
    }

    /// Run a read and report whether a rebuild overlapped it
    pub fn read<T>(
        &self,
        read: impl FnOnce(&Self) -> GraphResult<T>,
    ) -> (GraphResult<T>, GraphVersion, bool) {
        let before = self.version();
        let result = read(self);
        let after = self.version();
        let consistent = before == after && !after.rebuilding;
        if !consistent {
            debug!("Read overlapped a rebuild ({:?} -> {:?})", before, after);
        }
        (result, after, consistent)
    }

    /// Flush pending state to the backing store
    pub fn shutdown(self) -> GraphResult<()> {
        self.backend.flush()?;
        debug!("Graph store flushed");
        Ok(())
    }
}
