//! Resource snapshot models
//!
//! A [`Snapshot`] is the collector's view of a cluster at one point in time:
//! namespaces, pods, services, deployments and cluster roles. Records are
//! decoded one at a time so a single malformed entry does not invalidate the
//! whole document.

use crate::error::{GraphError, GraphResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Label (or selector) map. Ordered so encoded JSON is stable across builds.
pub type LabelMap = BTreeMap<String, String>;

/// Treat an explicit `null` the same as a missing field
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NamespaceRecord {
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub uid: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub created: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub labels: LabelMap,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerPort {
    #[serde(rename = "containerPort", default)]
    pub container_port: Option<i64>,
    #[serde(default)]
    pub protocol: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerRecord {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub image: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub ports: Vec<ContainerPort>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub env_vars: Vec<EnvVar>,
    /// Set when the container itself requests privileged mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privileged: Option<bool>,
}

impl ContainerRecord {
    pub fn is_privileged(&self) -> bool {
        self.privileged.unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecurityContext {
    #[serde(default)]
    pub privileged: Option<bool>,
    #[serde(default)]
    pub run_as_root: Option<bool>,
}

impl SecurityContext {
    pub fn is_privileged(&self) -> bool {
        self.privileged.unwrap_or(false)
    }
}

/// A pod is privileged when its security context says so or any container does
pub fn is_privileged_pod(containers: &[ContainerRecord], ctx: Option<&SecurityContext>) -> bool {
    ctx.is_some_and(SecurityContext::is_privileged)
        || containers.iter().any(ContainerRecord::is_privileged)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PodRecord {
    pub name: String,
    pub namespace: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub uid: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub created: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub labels: LabelMap,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub node_name: Option<String>,
    #[serde(default)]
    pub service_account: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub containers: Vec<ContainerRecord>,
    #[serde(default)]
    pub security_context: Option<SecurityContext>,
}

impl PodRecord {
    pub fn is_privileged(&self) -> bool {
        is_privileged_pod(&self.containers, self.security_context.as_ref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServicePort {
    #[serde(default)]
    pub port: Option<i64>,
    /// Either a port number or a named container port
    #[serde(default)]
    pub target_port: Option<serde_json::Value>,
    #[serde(default)]
    pub protocol: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub name: String,
    pub namespace: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub uid: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub created: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub labels: LabelMap,
    #[serde(rename = "type", default)]
    pub service_type: Option<String>,
    #[serde(default)]
    pub cluster_ip: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub external_ips: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub ports: Vec<ServicePort>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub name: String,
    pub namespace: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub uid: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub created: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub labels: LabelMap,
    #[serde(default)]
    pub replicas: Option<i64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub selector: LabelMap,
    #[serde(default, deserialize_with = "null_as_default")]
    pub template_labels: LabelMap,
    #[serde(default)]
    pub service_account: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyRule {
    #[serde(default, deserialize_with = "null_as_default")]
    pub verbs: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub api_groups: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub resources: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub non_resource_urls: Vec<String>,
}

impl PolicyRule {
    /// Grants every verb or every resource
    pub fn is_wildcard(&self) -> bool {
        self.verbs.iter().chain(&self.resources).any(|v| v == "*")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterRoleRecord {
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub uid: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub created: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub rules: Vec<PolicyRule>,
}

impl ClusterRoleRecord {
    pub fn is_high_privilege(&self) -> bool {
        self.rules.iter().any(PolicyRule::is_wildcard)
    }
}

/// Point-in-time view of the cluster handed over by the collector
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub namespaces: Vec<NamespaceRecord>,
    #[serde(default)]
    pub pods: Vec<PodRecord>,
    #[serde(default)]
    pub services: Vec<ServiceRecord>,
    #[serde(default)]
    pub deployments: Vec<DeploymentRecord>,
    #[serde(default)]
    pub cluster_roles: Vec<ClusterRoleRecord>,
}

/// Per-kind record counts of a snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub namespaces: usize,
    pub pods: usize,
    pub services: usize,
    pub deployments: usize,
    pub cluster_roles: usize,
}

/// Result of decoding a snapshot document
#[derive(Debug, Clone, Default)]
pub struct SnapshotLoad {
    pub snapshot: Snapshot,
    /// Records that failed to decode and were dropped
    pub rejected: usize,
}

impl Snapshot {
    /// Decode a snapshot from JSON text, skipping malformed records
    pub fn from_json(text: &str) -> GraphResult<SnapshotLoad> {
        let doc: serde_json::Value =
            serde_json::from_str(text).map_err(|e| GraphError::Snapshot(e.to_string()))?;
        Self::from_value(doc)
    }

    /// Decode a snapshot from an already parsed JSON document
    pub fn from_value(doc: serde_json::Value) -> GraphResult<SnapshotLoad> {
        let serde_json::Value::Object(mut doc) = doc else {
            return Err(GraphError::Snapshot(
                "expected a JSON object at the top level".to_string(),
            ));
        };

        let mut rejected = 0;
        let snapshot = Snapshot {
            namespaces: take_section(&mut doc, "namespaces", &mut rejected),
            pods: take_section(&mut doc, "pods", &mut rejected),
            services: take_section(&mut doc, "services", &mut rejected),
            deployments: take_section(&mut doc, "deployments", &mut rejected),
            cluster_roles: take_section(&mut doc, "cluster_roles", &mut rejected),
        };

        Ok(SnapshotLoad { snapshot, rejected })
    }

    pub fn summary(&self) -> SnapshotSummary {
        SnapshotSummary {
            namespaces: self.namespaces.len(),
            pods: self.pods.len(),
            services: self.services.len(),
            deployments: self.deployments.len(),
            cluster_roles: self.cluster_roles.len(),
        }
    }
}

fn take_section<T: DeserializeOwned>(
    doc: &mut serde_json::Map<String, serde_json::Value>,
    key: &str,
    rejected: &mut usize,
) -> Vec<T> {
    let items = match doc.remove(key) {
        None | Some(serde_json::Value::Null) => return Vec::new(),
        Some(serde_json::Value::Array(items)) => items,
        Some(_) => {
            tracing::warn!("Snapshot section '{}' is not a list, ignoring it", key);
            *rejected += 1;
            return Vec::new();
        }
    };

    items
        .into_iter()
        .enumerate()
        .filter_map(|(i, item)| match serde_json::from_value::<T>(item) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!("Skipping {} record #{}: {}", key, i, e);
                *rejected += 1;
                None
            }
        })
        .collect()
}
