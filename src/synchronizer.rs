//! Replica group synchronization.
//!
//! Brings the desired replica count of the supervisor replica group into agreement with the
//! number of selected inventory hosts. A pass reads fresh state, computes the delta and, only when
//! it is non-zero, replaces the desired replica count. Running the same pass twice against an
//! unchanged inventory issues no write on the second run.
//!
//! Scaling down is a plain reduction of the desired count. The control plane chooses which
//! instances to terminate, and in-flight sessions are not drained first.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::assignment::resolve_delta;
use crate::error::{SuperviseError, SuperviseResult};
use crate::inventory::{self, HostSet};
use crate::k8s::{GroupRef, ReplicaGroupGateway, ReplicaGroupManifest};

/// The result of a reconciliation pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The group already had the desired replica count.
    Unchanged { replicas: u32 },
    /// The desired replica count of the group was replaced.
    Scaled { from: u32, to: u32 },
    /// The group did not exist and was created from a manifest.
    Created { replicas: u32 },
}

/// Reconciles a replica group's desired replicas with an inventory.
#[derive(Clone)]
pub struct Synchronizer {
    gateway: Arc<dyn ReplicaGroupGateway>,
    /// The time budget for loading the inventory.
    load_timeout: Duration,
}

impl Synchronizer {
    /// Create a new instance.
    pub fn new(gateway: Arc<dyn ReplicaGroupGateway>, load_timeout: Duration) -> Self {
        Self { gateway, load_timeout }
    }

    /// Load & select the inventory, then reconcile the group against the selected hosts.
    ///
    /// When the group does not exist and a manifest is given, the group is created from it.
    #[tracing::instrument(level = "debug", skip(self, inventory_path, group, manifest), fields(group = %group))]
    pub async fn reconcile(
        &self, inventory_path: &Path, selector: &str, group: &GroupRef, manifest: Option<&ReplicaGroupManifest>,
    ) -> SuperviseResult<ReconcileOutcome> {
        let hosts = inventory::load_selected(inventory_path, selector, self.load_timeout).await?;
        tracing::debug!(hosts = ?hosts.names(), "selected hosts");
        self.reconcile_hosts(&hosts, group, manifest).await
    }

    /// Reconcile the group against an already selected host set.
    pub async fn reconcile_hosts(&self, hosts: &HostSet, group: &GroupRef, manifest: Option<&ReplicaGroupManifest>) -> SuperviseResult<ReconcileOutcome> {
        let replicas = hosts.len() as u32;
        let state = match (self.gateway.get_state(group).await, manifest) {
            (Ok(state), _) => state,
            (Err(SuperviseError::NotFound { .. }), Some(manifest)) => {
                let mut manifest = manifest.clone();
                manifest.bind(group, replicas);
                self.gateway.create(group, &manifest).await?;
                tracing::info!(replicas, "created {}", group);
                return Ok(ReconcileOutcome::Created { replicas });
            }
            (Err(err), _) => return Err(err),
        };

        let delta = resolve_delta(hosts, &state);
        if delta == 0 {
            tracing::debug!(replicas, "replica group is up-to-date");
            return Ok(ReconcileOutcome::Unchanged { replicas });
        }
        tracing::info!(from = state.desired_replicas, to = replicas, delta, "scaling {}", group);
        self.gateway
            .set_desired_replicas(group, replicas, state.resource_version.as_deref())
            .await?;
        Ok(ReconcileOutcome::Scaled {
            from: state.desired_replicas,
            to: replicas,
        })
    }
}
