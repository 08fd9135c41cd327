//! Dispatch of remote sessions onto the host owned by the calling instance.

use std::path::Path;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use crate::assignment::resolve_host_for_instance;
use crate::connection::{resolve_connection, ConnectionDefaults, ConnectionDescriptor};
use crate::error::{SuperviseError, SuperviseResult};
use crate::inventory;
use crate::k8s::{GroupRef, ReplicaGroupGateway, ReplicaGroupState};
use crate::transport::Transports;

/// Resolves the host of a running instance & opens remote sessions on it.
///
/// The dispatcher knows nothing about specific transports, it hands every session off to the
/// transport selected by the resolved connection.
#[derive(Clone)]
pub struct Dispatcher {
    gateway: Arc<dyn ReplicaGroupGateway>,
    transports: Transports,
    defaults: ConnectionDefaults,
    /// The time budget for loading the inventory.
    load_timeout: Duration,
}

impl Dispatcher {
    /// Create a new instance.
    pub fn new(gateway: Arc<dyn ReplicaGroupGateway>, transports: Transports, defaults: ConnectionDefaults, load_timeout: Duration) -> Self {
        Self {
            gateway,
            transports,
            defaults,
            load_timeout,
        }
    }

    /// Resolve the connection parameters of the host owned by the given instance.
    ///
    /// Both the inventory & the running instances are read fresh on every call.
    #[tracing::instrument(level = "debug", skip(self, inventory_path, group), fields(group = %group))]
    pub async fn resolve(&self, inventory_path: &Path, selector: &str, group: &GroupRef, identity: &str) -> SuperviseResult<ConnectionDescriptor> {
        let hosts = inventory::load_selected(inventory_path, selector, self.load_timeout).await?;
        let running_instances = self.gateway.list_running_instances(group).await?;
        let state = ReplicaGroupState {
            running_instances,
            ..Default::default()
        };
        let assignment = resolve_host_for_instance(&hosts, &state, identity)?;
        let conn = resolve_connection(assignment.host, &self.defaults)?;
        tracing::info!(
            ordinal = assignment.ordinal,
            host = %conn.host,
            transport = %conn.transport(),
            "resolved host for instance {}",
            identity
        );
        Ok(conn)
    }

    /// Run the given command on the described host, waiting for it to finish.
    #[tracing::instrument(level = "debug", skip(self, conn), fields(host = %conn.host))]
    pub async fn dispatch(&self, conn: &ConnectionDescriptor, command: &str) -> SuperviseResult<ExitStatus> {
        let session = self.transports.get(conn.transport()).open_session(conn, command).await?;
        let status = session.wait().await?;
        if !status.success() {
            tracing::warn!(host = %conn.host, ?status, "remote session exited with failure");
        }
        Ok(status)
    }

    /// Resolve the host of the given instance & run the given command on it.
    pub async fn resolve_and_dispatch(
        &self, inventory_path: &Path, selector: &str, group: &GroupRef, identity: &str, command: &str,
    ) -> SuperviseResult<ExitStatus> {
        let conn = self.resolve(inventory_path, selector, group, identity).await?;
        self.dispatch(&conn, command).await
    }
}

/// Map the exit status of a finished session onto a result.
pub fn check_status(host: &str, status: ExitStatus) -> SuperviseResult<()> {
    if status.success() {
        return Ok(());
    }
    Err(SuperviseError::Transport(match status.code() {
        Some(code) => format!("remote command on host '{}' exited with status {}", host, code),
        None => format!("remote command on host '{}' was terminated by a signal", host),
    }))
}
