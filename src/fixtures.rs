use std::collections::{BTreeSet, VecDeque};
use std::io::Write;
use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tempfile::NamedTempFile;

use crate::error::{SuperviseError, SuperviseResult};
use crate::inventory::{HostRecord, HostSet};
use crate::k8s::{GroupRef, ReplicaGroupGateway, ReplicaGroupManifest, ReplicaGroupState};

/// An in-memory replica group gateway which records every write it receives.
#[derive(Default)]
pub struct MemoryGateway {
    /// The current group state, `None` if the group does not exist.
    pub state: Mutex<Option<ReplicaGroupState>>,
    /// Errors to return from upcoming `set_desired_replicas` calls, in order.
    pub write_errors: Mutex<VecDeque<SuperviseError>>,
    /// All replica counts written, in order.
    pub writes: Mutex<Vec<u32>>,
    /// All manifests created, in order.
    pub created: Mutex<Vec<ReplicaGroupManifest>>,
}

impl MemoryGateway {
    /// Create a new instance for an existing group.
    pub fn with_state(desired_replicas: u32, running: &[&str]) -> Self {
        let gateway = Self::default();
        *gateway.state.lock().expect("lock poisoned") = Some(ReplicaGroupState {
            desired_replicas,
            running_instances: running.iter().map(|val| val.to_string()).collect(),
            resource_version: Some("1".into()),
        });
        gateway
    }

    pub fn writes(&self) -> Vec<u32> {
        self.writes.lock().expect("lock poisoned").clone()
    }
}

#[async_trait]
impl ReplicaGroupGateway for MemoryGateway {
    async fn get_state(&self, group: &GroupRef) -> SuperviseResult<ReplicaGroupState> {
        self.state.lock().expect("lock poisoned").clone().ok_or_else(|| group.not_found())
    }

    async fn set_desired_replicas(&self, group: &GroupRef, replicas: u32, _resource_version: Option<&str>) -> SuperviseResult<()> {
        if let Some(err) = self.write_errors.lock().expect("lock poisoned").pop_front() {
            return Err(err);
        }
        let mut state = self.state.lock().expect("lock poisoned");
        let state = state.as_mut().ok_or_else(|| group.not_found())?;
        state.desired_replicas = replicas;
        self.writes.lock().expect("lock poisoned").push(replicas);
        Ok(())
    }

    async fn list_running_instances(&self, group: &GroupRef) -> SuperviseResult<Vec<String>> {
        self.get_state(group).await.map(|state| state.running_instances)
    }

    async fn create(&self, _group: &GroupRef, manifest: &ReplicaGroupManifest) -> SuperviseResult<()> {
        self.created.lock().expect("lock poisoned").push(manifest.clone());
        Ok(())
    }
}

/// Build a host set of bare hosts with the given names.
pub fn host_set(names: &[&str]) -> HostSet {
    let records = names
        .iter()
        .map(|name| HostRecord {
            name: name.to_string(),
            address: name.to_string(),
            port: None,
            transport: None,
            user: Some("deploy".into()),
            private_key: Some("/keys/id_rsa".into()),
            password: None,
            groups: BTreeSet::new(),
        })
        .collect();
    HostSet::new(records).expect("expected unique host names")
}

/// Write the given content to a temporary file with the given suffix.
pub fn write_temp(content: &str, suffix: &str) -> Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .context("error creating temp file")?;
    file.write_all(content.as_bytes()).context("error writing temp file")?;
    file.flush().context("error flushing temp file")?;
    Ok(file)
}

/// An INI inventory with three app servers and one database server.
pub const INVENTORY_INI: &str = r#"
# Legacy application servers.
[appservers]
a ansible_host=10.0.0.1 ansible_user=deploy ansible_ssh_private_key_file=/keys/a
b ansible_host=10.0.0.2 ansible_connection=winrm ansible_user=Administrator
c ansible_host=10.0.0.3 ansible_port=2222

[appservers:vars]
ansible_user=ops
ansible_ssh_private_key_file=/keys/shared

[databases]
db1 ansible_host=10.0.1.1
"#;
