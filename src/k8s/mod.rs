//! Access to the replica group of supervisors in Kubernetes.
//!
//! The core only needs three things from the control plane: the desired replica count of a
//! replica group, a way to replace it, and the group's running pods in ordinal order. These are
//! captured by the `ReplicaGroupGateway` trait, which `KubeGateway` implements on top of the K8s
//! API. The only mutating calls are `set_desired_replicas` & `create`.

mod gateway;

use std::fmt;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::ReplicationController;
use serde_yaml::Value;

use crate::error::{SuperviseError, SuperviseResult};

pub use gateway::KubeGateway;

/// The kind of K8s object backing a replica group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GroupKind {
    /// A ReplicationController, kept for existing deployments.
    ///
    /// Its pods carry no ordinal, so ordinals are positions in (creation time, name) order. When
    /// a pod other than the newest dies, every later pod shifts down one position and its
    /// replacement takes the last one, which is still owned by a live pod until that pod resolves
    /// its host again. Prefer `StatefulSet` wherever ordinals must stay stable.
    ReplicationController,
    /// A StatefulSet, whose pods carry a stable ordinal as their name suffix.
    StatefulSet,
}

impl GroupKind {
    /// The K8s `kind` of this group kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReplicationController => "ReplicationController",
            Self::StatefulSet => "StatefulSet",
        }
    }
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for GroupKind {
    type Err = String;

    fn from_str(val: &str) -> Result<Self, Self::Err> {
        match val.to_ascii_lowercase().as_str() {
            "rc" | "replicationcontroller" => Ok(Self::ReplicationController),
            "sts" | "statefulset" => Ok(Self::StatefulSet),
            other => Err(format!("unknown replica group kind '{}', expected one of rc, sts", other)),
        }
    }
}

/// A reference to a replica group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupRef {
    pub kind: GroupKind,
    pub namespace: String,
    pub name: String,
}

impl GroupRef {
    /// Create a new instance.
    pub fn new(kind: GroupKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// The error returned when this group does not exist.
    pub(crate) fn not_found(&self) -> SuperviseError {
        SuperviseError::NotFound {
            kind: self.kind.as_str(),
            namespace: self.namespace.clone(),
            name: self.name.clone(),
        }
    }
}

impl fmt::Display for GroupRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
    }
}

/// The desired & actual state of a replica group, as read from the control plane.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReplicaGroupState {
    /// The desired number of replicas.
    pub desired_replicas: u32,
    /// The identities of the running instances, in ordinal order.
    pub running_instances: Vec<String>,
    /// The version of the object this state was read from, used to reject stale writes.
    pub resource_version: Option<String>,
}

/// A replica group definition used to create the group when it does not yet exist.
#[derive(Clone, Debug, PartialEq)]
pub enum ReplicaGroupManifest {
    ReplicationController(ReplicationController),
    StatefulSet(StatefulSet),
}

impl ReplicaGroupManifest {
    /// Parse a YAML manifest, dispatching on its `kind`.
    pub fn from_yaml(content: &str, source: &str) -> SuperviseResult<Self> {
        let invalid = |msg: String| SuperviseError::Internal(anyhow::anyhow!("invalid manifest {}: {}", source, msg));
        let value: Value = serde_yaml::from_str(content).map_err(|err| invalid(err.to_string()))?;
        let kind = value
            .as_mapping()
            .and_then(|map| map.get(&Value::String("kind".into())))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        match kind.as_str() {
            "ReplicationController" => serde_yaml::from_value(value)
                .map(Self::ReplicationController)
                .map_err(|err| invalid(err.to_string())),
            "StatefulSet" => serde_yaml::from_value(value)
                .map(Self::StatefulSet)
                .map_err(|err| invalid(err.to_string())),
            other => Err(invalid(format!("unsupported kind '{}', expected ReplicationController or StatefulSet", other))),
        }
    }

    /// Read & parse the manifest at the given path.
    pub async fn load(path: &std::path::Path) -> SuperviseResult<Self> {
        let source = path.display().to_string();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|err| SuperviseError::Internal(anyhow::anyhow!("error reading manifest {}: {}", source, err)))?;
        Self::from_yaml(&content, &source)
    }

    pub fn kind(&self) -> GroupKind {
        match self {
            Self::ReplicationController(_) => GroupKind::ReplicationController,
            Self::StatefulSet(_) => GroupKind::StatefulSet,
        }
    }

    /// The name declared by the manifest.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::ReplicationController(rc) => rc.metadata.name.as_deref(),
            Self::StatefulSet(sts) => sts.metadata.name.as_deref(),
        }
    }

    /// Set the replica count of the manifest and bind it to the given group.
    pub fn bind(&mut self, group: &GroupRef, replicas: u32) {
        match self {
            Self::ReplicationController(rc) => {
                rc.metadata.name = Some(group.name.clone());
                rc.metadata.namespace = Some(group.namespace.clone());
                rc.spec.get_or_insert_with(Default::default).replicas = Some(replicas as i32);
            }
            Self::StatefulSet(sts) => {
                sts.metadata.name = Some(group.name.clone());
                sts.metadata.namespace = Some(group.namespace.clone());
                sts.spec.get_or_insert_with(Default::default).replicas = Some(replicas as i32);
            }
        }
    }
}

/// A client of the control plane which owns replica groups.
///
/// Every call is bounded by a timeout and fails with `SuperviseError::Timeout` when exceeded.
#[async_trait]
pub trait ReplicaGroupGateway: Send + Sync {
    /// Read the current state of the given group.
    ///
    /// Fails with `SuperviseError::NotFound` if the group does not exist.
    async fn get_state(&self, group: &GroupRef) -> SuperviseResult<ReplicaGroupState>;

    /// Replace the desired replica count of the given group.
    ///
    /// When a resource version is given, the write is rejected with `SuperviseError::Conflict` if
    /// the group has changed since that version was read.
    async fn set_desired_replicas(&self, group: &GroupRef, replicas: u32, resource_version: Option<&str>) -> SuperviseResult<()>;

    /// List the identities of the running instances of the given group, in ordinal order.
    async fn list_running_instances(&self, group: &GroupRef) -> SuperviseResult<Vec<String>>;

    /// Create the given group from a manifest.
    async fn create(&self, group: &GroupRef, manifest: &ReplicaGroupManifest) -> SuperviseResult<()>;
}
