use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{Pod, ReplicationController};
use kube::api::{Api, ListParams, Patch, PatchParams, PostParams};
use kube::client::Client;
use serde_json::json;
use tokio::time::timeout;

use crate::error::{SuperviseError, SuperviseResult};
use crate::k8s::{GroupKind, GroupRef, ReplicaGroupGateway, ReplicaGroupManifest, ReplicaGroupState};

/// The pod phase of running instances.
const POD_PHASE_RUNNING: &str = "Running";

/// A `ReplicaGroupGateway` backed by the K8s API.
#[derive(Clone)]
pub struct KubeGateway {
    client: Client,
    timeout: Duration,
}

/// The parts of a replica group object needed by the gateway.
#[derive(Debug, PartialEq)]
pub(super) struct GroupSpec {
    pub replicas: u32,
    pub selector: BTreeMap<String, String>,
    pub resource_version: Option<String>,
}

impl KubeGateway {
    /// Create a new instance, bounding every API call by the given timeout.
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    async fn call<T>(&self, group: &GroupRef, action: &str, fut: impl Future<Output = Result<T, kube::Error>>) -> SuperviseResult<T> {
        bounded_call(self.timeout, group, action, fut).await
    }

    /// Fetch the spec of the given group.
    async fn get_group(&self, group: &GroupRef) -> SuperviseResult<GroupSpec> {
        match group.kind {
            GroupKind::ReplicationController => {
                let api: Api<ReplicationController> = Api::namespaced(self.client.clone(), &group.namespace);
                let rc = self.call(group, "fetching", api.get(&group.name)).await?;
                Ok(rc_spec(&rc))
            }
            GroupKind::StatefulSet => {
                let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), &group.namespace);
                let sts = self.call(group, "fetching", api.get(&group.name)).await?;
                Ok(sts_spec(&sts))
            }
        }
    }

    /// List the running pods selected by the given group spec, in ordinal order.
    async fn list_pods(&self, group: &GroupRef, spec: &GroupSpec) -> SuperviseResult<Vec<String>> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), &group.namespace);
        let params = ListParams {
            label_selector: Some(label_selector(&spec.selector)),
            ..Default::default()
        };
        let pods = self.call(group, "listing pods of", api.list(&params)).await?;
        Ok(order_instances(group, pods.items))
    }
}

#[async_trait]
impl ReplicaGroupGateway for KubeGateway {
    #[tracing::instrument(level = "debug", skip(self, group), fields(group = %group))]
    async fn get_state(&self, group: &GroupRef) -> SuperviseResult<ReplicaGroupState> {
        let spec = self.get_group(group).await?;
        let running_instances = self.list_pods(group, &spec).await?;
        tracing::debug!(replicas = spec.replicas, running = running_instances.len(), "fetched replica group state");
        Ok(ReplicaGroupState {
            desired_replicas: spec.replicas,
            running_instances,
            resource_version: spec.resource_version,
        })
    }

    #[tracing::instrument(level = "debug", skip(self, group), fields(group = %group))]
    async fn set_desired_replicas(&self, group: &GroupRef, replicas: u32, resource_version: Option<&str>) -> SuperviseResult<()> {
        tracing::info!(replicas, "updating desired replicas of {}", group);
        let mut patch = json!({ "spec": { "replicas": replicas } });
        if let Some(version) = resource_version {
            // The API server rejects a merge patch whose resourceVersion is stale with a 409.
            patch["metadata"] = json!({ "resourceVersion": version });
        }
        let params = PatchParams::default();
        match group.kind {
            GroupKind::ReplicationController => {
                let api: Api<ReplicationController> = Api::namespaced(self.client.clone(), &group.namespace);
                self.call(group, "updating", api.patch(&group.name, &params, &Patch::Merge(&patch))).await?;
            }
            GroupKind::StatefulSet => {
                let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), &group.namespace);
                self.call(group, "updating", api.patch(&group.name, &params, &Patch::Merge(&patch))).await?;
            }
        }
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self, group), fields(group = %group))]
    async fn list_running_instances(&self, group: &GroupRef) -> SuperviseResult<Vec<String>> {
        let spec = self.get_group(group).await?;
        self.list_pods(group, &spec).await
    }

    #[tracing::instrument(level = "debug", skip(self, group, manifest), fields(group = %group))]
    async fn create(&self, group: &GroupRef, manifest: &ReplicaGroupManifest) -> SuperviseResult<()> {
        tracing::info!("creating {}", group);
        let params = PostParams::default();
        match manifest {
            ReplicaGroupManifest::ReplicationController(rc) => {
                let api: Api<ReplicationController> = Api::namespaced(self.client.clone(), &group.namespace);
                self.call(group, "creating", api.create(&params, rc)).await?;
            }
            ReplicaGroupManifest::StatefulSet(sts) => {
                let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), &group.namespace);
                self.call(group, "creating", api.create(&params, sts)).await?;
            }
        }
        Ok(())
    }
}

/// Await the given API call within the given budget, mapping timeouts & API errors onto the
/// supervisor's error kinds.
pub(super) async fn bounded_call<T>(
    budget: Duration, group: &GroupRef, action: &str, fut: impl Future<Output = Result<T, kube::Error>>,
) -> SuperviseResult<T> {
    match timeout(budget, fut).await {
        Err(_elapsed) => Err(SuperviseError::Timeout(format!("{} {}", action, group))),
        Ok(res) => res.map_err(|err| map_api_error(err, group, action)),
    }
}

/// Map a K8s API error onto the supervisor's error kinds.
pub(super) fn map_api_error(err: kube::Error, group: &GroupRef, action: &str) -> SuperviseError {
    match err {
        kube::Error::Api(api_err) if api_err.code == http::StatusCode::NOT_FOUND => group.not_found(),
        kube::Error::Api(api_err) if api_err.code == http::StatusCode::CONFLICT => SuperviseError::Conflict {
            namespace: group.namespace.clone(),
            name: group.name.clone(),
        },
        err => SuperviseError::Internal(anyhow::Error::new(err).context(format!("error {} {}", action, group))),
    }
}

pub(super) fn rc_spec(rc: &ReplicationController) -> GroupSpec {
    let spec = rc.spec.as_ref();
    GroupSpec {
        // K8s defaults replicas to 1 when unset.
        replicas: spec.and_then(|spec| spec.replicas).unwrap_or(1).max(0) as u32,
        selector: spec.and_then(|spec| spec.selector.clone()).unwrap_or_default(),
        resource_version: rc.metadata.resource_version.clone(),
    }
}

pub(super) fn sts_spec(sts: &StatefulSet) -> GroupSpec {
    let spec = sts.spec.as_ref();
    GroupSpec {
        replicas: spec.and_then(|spec| spec.replicas).unwrap_or(1).max(0) as u32,
        selector: spec.and_then(|spec| spec.selector.match_labels.clone()).unwrap_or_default(),
        resource_version: sts.metadata.resource_version.clone(),
    }
}

/// Render a label selector query from a set of labels.
pub(super) fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels.iter().map(|(key, val)| format!("{}={}", key, val)).collect::<Vec<_>>().join(",")
}

/// Filter the given pods down to the running instances of the group & order them by ordinal.
///
/// StatefulSet pods carry their ordinal as a name suffix. ReplicationController pods have no
/// ordinal of their own, so they are ordered by creation time, then name.
pub(super) fn order_instances(group: &GroupRef, pods: Vec<Pod>) -> Vec<String> {
    let mut pods: Vec<Pod> = pods.into_iter().filter(|pod| is_running(pod) && is_owned_by(pod, group)).collect();
    match group.kind {
        GroupKind::StatefulSet => {
            let mut ordinals: Vec<(u32, String)> = pods
                .into_iter()
                .filter_map(|pod| pod.metadata.name)
                .filter_map(|name| sts_ordinal(&group.name, &name).map(|ordinal| (ordinal, name)))
                .collect();
            ordinals.sort();
            ordinals.into_iter().map(|(_, name)| name).collect()
        }
        GroupKind::ReplicationController => {
            pods.sort_by(|a, b| {
                let a_key = (a.metadata.creation_timestamp.as_ref().map(|ts| ts.0), a.metadata.name.as_deref());
                let b_key = (b.metadata.creation_timestamp.as_ref().map(|ts| ts.0), b.metadata.name.as_deref());
                a_key.cmp(&b_key)
            });
            pods.into_iter().filter_map(|pod| pod.metadata.name).collect()
        }
    }
}

/// Parse the ordinal of a StatefulSet pod from its name.
pub(super) fn sts_ordinal(sts_name: &str, pod_name: &str) -> Option<u32> {
    pod_name.strip_prefix(sts_name)?.strip_prefix('-')?.parse().ok()
}

fn is_running(pod: &Pod) -> bool {
    pod.metadata.deletion_timestamp.is_none() && pod.status.as_ref().and_then(|status| status.phase.as_deref()) == Some(POD_PHASE_RUNNING)
}

fn is_owned_by(pod: &Pod, group: &GroupRef) -> bool {
    pod.metadata
        .owner_references
        .as_ref()
        .map(|refs| refs.iter().any(|owner| owner.kind == group.kind.as_str() && owner.name == group.name))
        .unwrap_or(false)
}
