//! Snapshot to graph builder
//!
//! A build replaces the whole graph in one pass:
//!
//! ```text
//! clear
//!   -> Namespace vertices
//!   -> Pod vertices          (+ contains)
//!   -> Service vertices      (+ contains, + exposes by label selector)
//!   -> Deployment vertices   (+ contains, + manages by selector)
//!   -> ClusterRole vertices
//!   -> escalation synthesis  (pod risk tagging, pod -> role edges)
//! ```
//!
//! Identity is tracked by a [`VertexCache`] that lives for one build only.
//! A record whose key was already seen reuses the existing vertex and does
//! not get its edges wired a second time.
//!
//! Per-record failures are logged, counted in the [`BuildReport`] and
//! skipped. Only a failed `clear` or a failed pod read-back aborts the build.

use super::filter::VertexFilter;
use super::selector::Selector;
use super::store_models::{
    json_property, EdgeLabel, PropertyMap, VertexId, VertexLabel, RISK_LEVEL,
};
use super::traits::GraphBackend;
use crate::error::GraphResult;
use crate::models::{
    is_privileged_pod, ClusterRoleRecord, ContainerRecord, DeploymentRecord, LabelMap,
    NamespaceRecord, PodRecord, SecurityContext, ServiceRecord, Snapshot,
};
use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Confidence attached to escalation edges unless configured otherwise
pub const DEFAULT_ESCALATION_CONFIDENCE: f64 = 0.7;

/// Build-scoped identity map: resource key -> vertex id
#[derive(Debug, Default)]
pub struct VertexCache {
    ids: FxHashMap<String, VertexId>,
}

impl VertexCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identity key of a resource, e.g. `pod:default:web-0`
    pub fn key(label: VertexLabel, namespace: Option<&str>, name: &str) -> String {
        match namespace {
            Some(ns) => format!("{}:{}:{}", label.key_prefix(), ns, name),
            None => format!("{}:{}", label.key_prefix(), name),
        }
    }

    pub fn get(&self, key: &str) -> Option<VertexId> {
        self.ids.get(key).copied()
    }

    /// Return the cached vertex for `key`, or create it.
    ///
    /// The flag is `true` when the vertex was created by this call.
    pub fn get_or_create(
        &mut self,
        key: String,
        create: impl FnOnce() -> GraphResult<VertexId>,
    ) -> GraphResult<(VertexId, bool)> {
        if let Some(id) = self.ids.get(&key) {
            return Ok((*id, false));
        }
        let id = create()?;
        self.ids.insert(key, id);
        Ok((id, true))
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Outcome of one build
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildReport {
    /// Graph generation published by this build
    pub generation: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Vertices created per label
    pub vertices: BTreeMap<VertexLabel, usize>,
    /// Edges created per label
    pub edges: BTreeMap<EdgeLabel, usize>,
    /// Records whose identity key was already present in this build
    pub duplicates: usize,
    /// Records dropped because encoding or a store call failed
    pub skipped_records: usize,
    /// Edges that could not be created
    pub failed_edges: usize,
    /// Pods tagged `risk_level = high`
    pub high_risk_pods: usize,
}

impl BuildReport {
    pub fn total_vertices(&self) -> usize {
        self.vertices.values().sum()
    }

    pub fn total_edges(&self) -> usize {
        self.edges.values().sum()
    }

    pub fn vertex_count(&self, label: VertexLabel) -> usize {
        self.vertices.get(&label).copied().unwrap_or(0)
    }

    pub fn edge_count(&self, label: EdgeLabel) -> usize {
        self.edges.get(&label).copied().unwrap_or(0)
    }
}

fn prop(key: &str, value: impl Into<Value>) -> (String, Value) {
    (key.to_string(), value.into())
}

fn opt_prop<T: Into<Value> + Clone>(key: &str, value: &Option<T>) -> (String, Value) {
    (
        key.to_string(),
        value.clone().map(Into::into).unwrap_or(Value::Null),
    )
}

/// Populates a graph store from a [`Snapshot`]
pub struct GraphBuilder<'a> {
    backend: &'a dyn GraphBackend,
    confidence: f64,
    cache: VertexCache,
    /// Pods created in this build with their labels, for selector matching
    pods: Vec<(VertexId, LabelMap)>,
    roles: Vec<VertexId>,
    report: BuildReport,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(backend: &'a dyn GraphBackend) -> Self {
        Self {
            backend,
            confidence: DEFAULT_ESCALATION_CONFIDENCE,
            cache: VertexCache::new(),
            pods: Vec::new(),
            roles: Vec::new(),
            report: BuildReport::default(),
        }
    }

    pub fn with_escalation_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Replace the store content with the graph of `snapshot`
    pub fn build(mut self, snapshot: &Snapshot) -> GraphResult<BuildReport> {
        self.report.started_at = Some(Utc::now());

        self.backend.clear()?;
        debug!("Cleared graph store");

        for ns in &snapshot.namespaces {
            self.add_namespace(ns);
        }
        for pod in &snapshot.pods {
            self.add_pod(pod);
        }
        for svc in &snapshot.services {
            self.add_service(svc);
        }
        for deploy in &snapshot.deployments {
            self.add_deployment(deploy);
        }
        for role in &snapshot.cluster_roles {
            self.add_cluster_role(role);
        }
        info!(
            "Created {} vertices ({} namespaces, {} pods, {} services, {} deployments, {} cluster roles)",
            self.report.total_vertices(),
            self.report.vertex_count(VertexLabel::Namespace),
            self.report.vertex_count(VertexLabel::Pod),
            self.report.vertex_count(VertexLabel::Service),
            self.report.vertex_count(VertexLabel::Deployment),
            self.report.vertex_count(VertexLabel::ClusterRole),
        );

        self.synthesize_escalations()?;

        self.report.finished_at = Some(Utc::now());
        info!(
            "Graph built: {} vertices, {} edges ({} duplicates, {} skipped, {} failed edges)",
            self.report.total_vertices(),
            self.report.total_edges(),
            self.report.duplicates,
            self.report.skipped_records,
            self.report.failed_edges,
        );
        Ok(self.report)
    }

    /// Create a vertex unless its key was already seen.
    ///
    /// Returns the id only when the vertex is new, so callers wire edges
    /// exactly once per resource.
    fn add_vertex(
        &mut self,
        label: VertexLabel,
        key: String,
        properties: impl FnOnce() -> GraphResult<PropertyMap>,
    ) -> Option<VertexId> {
        let backend = self.backend;
        let result = self.cache.get_or_create(key.clone(), || {
            let properties = properties()?;
            backend.add_vertex(label, properties)
        });

        match result {
            Ok((id, true)) => {
                *self.report.vertices.entry(label).or_default() += 1;
                Some(id)
            }
            Ok((_, false)) => {
                debug!("Duplicate resource '{}', reusing existing vertex", key);
                self.report.duplicates += 1;
                None
            }
            Err(e) => {
                warn!("Skipping {}: {}", key, e);
                self.report.skipped_records += 1;
                None
            }
        }
    }

    fn add_edge(
        &mut self,
        from: VertexId,
        to: VertexId,
        label: EdgeLabel,
        properties: PropertyMap,
    ) {
        match self.backend.add_edge(from, to, label, properties) {
            Ok(_) => *self.report.edges.entry(label).or_default() += 1,
            Err(e) => {
                warn!("Failed to add {} edge {} -> {}: {}", label, from, to, e);
                self.report.failed_edges += 1;
            }
        }
    }

    /// `contains` edge from the record's namespace, when that namespace exists
    fn link_namespace(
        &mut self,
        namespace: &str,
        child: VertexId,
        relationship: &str,
        created: &str,
    ) {
        let key = VertexCache::key(VertexLabel::Namespace, None, namespace);
        let Some(ns) = self.cache.get(&key) else {
            debug!("Namespace '{}' not in snapshot, no contains edge", namespace);
            return;
        };
        let properties = PropertyMap::from([
            prop("relationship", relationship),
            prop("created", created),
        ]);
        self.add_edge(ns, child, EdgeLabel::Contains, properties);
    }

    fn add_namespace(&mut self, ns: &NamespaceRecord) {
        let key = VertexCache::key(VertexLabel::Namespace, None, &ns.name);
        self.add_vertex(VertexLabel::Namespace, key, || {
            Ok(PropertyMap::from([
                prop("name", ns.name.as_str()),
                prop("uid", ns.uid.as_str()),
                prop("created", ns.created.as_str()),
                ("labels".to_string(), json_property(&ns.labels)?),
                opt_prop("status", &ns.status),
            ]))
        });
    }

    fn add_pod(&mut self, pod: &PodRecord) {
        let key = VertexCache::key(VertexLabel::Pod, Some(&pod.namespace), &pod.name);
        let Some(id) = self.add_vertex(VertexLabel::Pod, key, || {
            Ok(PropertyMap::from([
                prop("name", pod.name.as_str()),
                prop("namespace", pod.namespace.as_str()),
                prop("uid", pod.uid.as_str()),
                prop("created", pod.created.as_str()),
                ("labels".to_string(), json_property(&pod.labels)?),
                opt_prop("status", &pod.status),
                opt_prop("node_name", &pod.node_name),
                opt_prop("service_account", &pod.service_account),
                ("containers".to_string(), json_property(&pod.containers)?),
                (
                    "security_context".to_string(),
                    json_property(&pod.security_context)?,
                ),
            ]))
        }) else {
            return;
        };

        self.pods.push((id, pod.labels.clone()));
        self.link_namespace(&pod.namespace, id, "namespace_contains_pod", &pod.created);
    }

    fn add_service(&mut self, svc: &ServiceRecord) {
        let key = VertexCache::key(VertexLabel::Service, Some(&svc.namespace), &svc.name);
        let Some(id) = self.add_vertex(VertexLabel::Service, key, || {
            Ok(PropertyMap::from([
                prop("name", svc.name.as_str()),
                prop("namespace", svc.namespace.as_str()),
                prop("uid", svc.uid.as_str()),
                prop("created", svc.created.as_str()),
                ("labels".to_string(), json_property(&svc.labels)?),
                opt_prop("type", &svc.service_type),
                opt_prop("cluster_ip", &svc.cluster_ip),
                ("external_ips".to_string(), json_property(&svc.external_ips)?),
                ("ports".to_string(), json_property(&svc.ports)?),
            ]))
        }) else {
            return;
        };

        self.link_namespace(
            &svc.namespace,
            id,
            "namespace_contains_service",
            &svc.created,
        );

        // Services select by their own label map, across all namespaces
        let selector = Selector::new(&svc.labels);
        if selector.is_empty() {
            debug!(
                "Service {}/{} has no labels and selects every pod",
                svc.namespace, svc.name
            );
        }
        let targets: Vec<VertexId> = self
            .pods
            .iter()
            .filter(|(_, labels)| selector.matches(labels))
            .map(|(pod, _)| *pod)
            .collect();
        for pod in targets {
            let properties = PropertyMap::from([
                prop("relationship", "service_exposes_pod"),
                prop("expose_type", "network"),
            ]);
            self.add_edge(id, pod, EdgeLabel::Exposes, properties);
        }
    }

    fn add_deployment(&mut self, deploy: &DeploymentRecord) {
        let key = VertexCache::key(
            VertexLabel::Deployment,
            Some(&deploy.namespace),
            &deploy.name,
        );
        let Some(id) = self.add_vertex(VertexLabel::Deployment, key, || {
            Ok(PropertyMap::from([
                prop("name", deploy.name.as_str()),
                prop("namespace", deploy.namespace.as_str()),
                prop("uid", deploy.uid.as_str()),
                prop("created", deploy.created.as_str()),
                ("labels".to_string(), json_property(&deploy.labels)?),
                opt_prop("replicas", &deploy.replicas),
                ("selector".to_string(), json_property(&deploy.selector)?),
                (
                    "template_labels".to_string(),
                    json_property(&deploy.template_labels)?,
                ),
                opt_prop("service_account", &deploy.service_account),
            ]))
        }) else {
            return;
        };

        self.link_namespace(
            &deploy.namespace,
            id,
            "namespace_contains_deployment",
            &deploy.created,
        );

        let selector = Selector::new(&deploy.selector);
        let targets: Vec<VertexId> = self
            .pods
            .iter()
            .filter(|(_, labels)| selector.matches(labels))
            .map(|(pod, _)| *pod)
            .collect();
        for pod in targets {
            let properties = PropertyMap::from([
                prop("relationship", "deployment_manages_pod"),
                prop("manage_type", "orchestration"),
            ]);
            self.add_edge(id, pod, EdgeLabel::Manages, properties);
        }
    }

    fn add_cluster_role(&mut self, role: &ClusterRoleRecord) {
        let key = VertexCache::key(VertexLabel::ClusterRole, None, &role.name);
        if let Some(id) = self.add_vertex(VertexLabel::ClusterRole, key, || {
            Ok(PropertyMap::from([
                prop("name", role.name.as_str()),
                prop("uid", role.uid.as_str()),
                prop("created", role.created.as_str()),
                ("rules".to_string(), json_property(&role.rules)?),
            ]))
        }) {
            self.roles.push(id);
        }
    }

    /// Tag privileged pods and connect every service-account pod to every
    /// cluster role.
    ///
    /// Role bindings are not part of the snapshot, so the fan-out is P x R.
    fn synthesize_escalations(&mut self) -> GraphResult<()> {
        let pods = self.backend.query_vertices(&VertexFilter::label(VertexLabel::Pod))?;
        debug!(
            "Synthesizing escalations for {} pods x {} cluster roles",
            pods.len(),
            self.roles.len()
        );

        for pod in &pods {
            let decoded = pod
                .decode_json::<Vec<ContainerRecord>>("containers")
                .and_then(|containers| {
                    pod.decode_json::<Option<SecurityContext>>("security_context")
                        .map(|ctx| (containers, ctx))
                });
            let (containers, ctx) = match decoded {
                Ok(decoded) => decoded,
                Err(e) => {
                    warn!("Skipping risk tagging for pod {}: {}", pod.id, e);
                    self.report.skipped_records += 1;
                    continue;
                }
            };

            if is_privileged_pod(&containers, ctx.as_ref()) {
                match self
                    .backend
                    .set_vertex_property(pod.id, RISK_LEVEL, Value::from("high"))
                {
                    Ok(()) => self.report.high_risk_pods += 1,
                    Err(e) => warn!("Failed to tag pod {} as high risk: {}", pod.id, e),
                }
            }

            let has_service_account = pod
                .get_str("service_account")
                .is_some_and(|sa| !sa.is_empty());
            if !has_service_account {
                continue;
            }
            for role in self.roles.clone() {
                let properties = PropertyMap::from([
                    prop("relationship", "service_account_to_cluster_role"),
                    prop("attack_vector", "privilege_escalation"),
                    prop("confidence", self.confidence),
                ]);
                self.add_edge(pod.id, role, EdgeLabel::PotentialEscalation, properties);
            }
        }

        info!(
            "Escalation synthesis: {} high risk pods, {} escalation edges",
            self.report.high_risk_pods,
            self.report.edge_count(EdgeLabel::PotentialEscalation)
        );
        Ok(())
    }
}
