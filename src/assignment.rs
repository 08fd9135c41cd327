//! Host to replica assignment.
//!
//! ## Overview
//! There is no persisted assignment table. A running instance owns the host at the position of
//! its own ordinal within the replica group's running instances, so the whole mapping is a pure
//! function of two inputs: the ordered `HostSet` and the control plane's ordered listing of
//! running instances.
//!
//! - Host order is the inventory's declaration order, which is stable across loads.
//! - Ordinals are assigned by the control plane and are stable for the lifetime of an instance.
//!
//! Given unique host names, distinct ordinals always map to distinct hosts. An instance whose
//! ordinal is beyond the end of the `HostSet` owns nothing; it never wraps around onto another
//! instance's host.
//!
//! ## Scale transitions
//! While the replica group is scaling, the control plane's listing may briefly disagree with
//! the number of hosts, and an instance may observe an ordinal which another instance has just
//! given up. Resolution is side-effect free, so callers simply resolve again once the listing
//! has settled.

use crate::error::{SuperviseError, SuperviseResult};
use crate::inventory::{HostRecord, HostSet};
use crate::k8s::ReplicaGroupState;

/// A binding of a running instance's ordinal onto a host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Assignment<'a> {
    pub ordinal: usize,
    pub host: &'a HostRecord,
}

/// Compute the change of desired replicas needed for the group to match the host set.
///
/// A positive value means the group must scale up, negative means scale down.
pub fn resolve_delta(hosts: &HostSet, state: &ReplicaGroupState) -> i64 {
    hosts.len() as i64 - state.desired_replicas as i64
}

/// Find the ordinal of the given instance among the running instances.
pub fn ordinal_of(state: &ReplicaGroupState, identity: &str) -> SuperviseResult<usize> {
    state
        .running_instances
        .iter()
        .position(|instance| instance == identity)
        .ok_or_else(|| SuperviseError::IdentityNotFound { identity: identity.to_string() })
}

/// Resolve the host owned by the running instance with the given identity.
pub fn resolve_host_for_instance<'a>(hosts: &'a HostSet, state: &ReplicaGroupState, identity: &str) -> SuperviseResult<Assignment<'a>> {
    let ordinal = ordinal_of(state, identity)?;
    let host = hosts.get(ordinal).ok_or_else(|| SuperviseError::Unassigned {
        identity: identity.to_string(),
        ordinal,
        hosts: hosts.len(),
    })?;
    tracing::debug!(identity, ordinal, host = %host.name, "resolved host for instance");
    Ok(Assignment { ordinal, host })
}
