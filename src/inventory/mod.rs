//! Read-only view over an inventory of external hosts.
//!
//! An inventory is loaded once per invocation into a `HostSet`, an ordered sequence of
//! `HostRecord`s. The order of a `HostSet` is the order in which hosts are first declared in the
//! inventory source, which is stable across repeated loads of the same file. Replica ordinals are
//! bound to positions in this order, so nothing here may reorder hosts.

mod ansible;
#[cfg(test)]
mod ansible_test;
mod yaml;
#[cfg(test)]
mod yaml_test;

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::future::Future;
use std::path::Path;
use std::time::Duration;

use tokio::time::timeout;

use crate::error::{SuperviseError, SuperviseResult};
use crate::transport::TransportKind;

/// The implicit group to which every host belongs.
pub const GROUP_ALL: &str = "all";
/// The implicit group of hosts declared outside of any group.
pub const GROUP_UNGROUPED: &str = "ungrouped";

const VARS_ADDRESS: &[&str] = &["ansible_host", "ansible_ssh_host"];
const VARS_PORT: &[&str] = &["ansible_port", "ansible_ssh_port"];
const VARS_USER: &[&str] = &["ansible_user", "ansible_ssh_user"];
const VARS_PRIVATE_KEY: &[&str] = &["ansible_ssh_private_key_file", "ansible_private_key_file"];
const VARS_PASSWORD: &[&str] = &["ansible_password", "ansible_ssh_pass", "ansible_winrm_password"];
const VAR_CONNECTION: &str = "ansible_connection";
const VAR_WINRM: &str = "winrm";

/// One supervisable remote endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostRecord {
    /// The inventory name of the host, unique within an inventory.
    pub name: String,
    /// The network address used to reach the host, defaulting to its name.
    pub address: String,
    /// The port of the remote session, if declared.
    pub port: Option<u16>,
    /// The transport of the remote session, if declared.
    pub transport: Option<TransportKind>,
    /// The remote user, if declared.
    pub user: Option<String>,
    /// The path of the SSH private key, if declared.
    pub private_key: Option<String>,
    /// The WinRM password, if declared.
    pub password: Option<String>,
    /// All groups this host belongs to, including ancestor groups and `all`.
    pub groups: BTreeSet<String>,
}

impl HostRecord {
    /// Build a host record from its fully merged variables.
    fn from_vars(name: &str, groups: BTreeSet<String>, vars: &BTreeMap<String, String>, source: &str) -> SuperviseResult<Self> {
        let lookup = |keys: &[&str]| -> Option<String> {
            keys.iter()
                .find_map(|key| vars.get(*key))
                .map(|val| val.trim().to_string())
                .filter(|val| !val.is_empty())
        };

        // An empty port is treated exactly like an absent one.
        let port = match lookup(VARS_PORT) {
            Some(port) => Some(port.parse::<u16>().map_err(|_| {
                SuperviseError::Inventory(format!("{}: host '{}' has invalid port '{}'", source, name, port))
            })?),
            None => None,
        };

        let transport = match (vars.get(VAR_CONNECTION).map(|val| val.trim()), vars.get(VAR_WINRM).map(|val| val.trim())) {
            (Some(conn), _) if !conn.is_empty() => Some(TransportKind::from_connection(conn).ok_or_else(|| {
                SuperviseError::Inventory(format!("{}: host '{}' has unsupported {} '{}'", source, name, VAR_CONNECTION, conn))
            })?),
            (_, Some(flag)) if !flag.is_empty() => match parse_bool(flag) {
                Some(true) => Some(TransportKind::WinRm),
                Some(false) => Some(TransportKind::Ssh),
                None => {
                    return Err(SuperviseError::Inventory(format!(
                        "{}: host '{}' has invalid {} value '{}'",
                        source, name, VAR_WINRM, flag
                    )))
                }
            },
            _ => None,
        };

        Ok(Self {
            name: name.to_string(),
            address: lookup(VARS_ADDRESS).unwrap_or_else(|| name.to_string()),
            port,
            transport,
            user: lookup(VARS_USER),
            private_key: lookup(VARS_PRIVATE_KEY),
            password: lookup(VARS_PASSWORD),
            groups,
        })
    }

    /// Check if this host belongs to the given group.
    pub fn in_group(&self, group: &str) -> bool {
        group == GROUP_ALL || self.groups.contains(group)
    }
}

/// An ordered sequence of hosts with unique names.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HostSet {
    hosts: Vec<HostRecord>,
}

impl HostSet {
    /// Create a new instance, rejecting duplicate host names.
    pub fn new(hosts: Vec<HostRecord>) -> SuperviseResult<Self> {
        let mut seen = HashSet::new();
        for host in hosts.iter() {
            if !seen.insert(host.name.as_str()) {
                return Err(SuperviseError::Inventory(format!("duplicate host '{}'", host.name)));
            }
        }
        Ok(Self { hosts })
    }

    /// Select the hosts belonging to the given group, preserving order.
    pub fn select(&self, selector: &str) -> SuperviseResult<HostSet> {
        let selector = selector.trim();
        let hosts: Vec<_> = self.hosts.iter().filter(|host| host.in_group(selector)).cloned().collect();
        if hosts.is_empty() {
            return Err(SuperviseError::Selection { selector: selector.to_string() });
        }
        Ok(HostSet { hosts })
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Get the host at the given position.
    pub fn get(&self, idx: usize) -> Option<&HostRecord> {
        self.hosts.get(idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = &HostRecord> {
        self.hosts.iter()
    }

    /// The names of all hosts, in order.
    pub fn names(&self) -> Vec<&str> {
        self.hosts.iter().map(|host| host.name.as_str()).collect()
    }
}

/// Load the inventory at the given path.
///
/// Files ending in `.yml` or `.yaml` are read as YAML inventories, everything else as INI.
#[tracing::instrument(level = "debug")]
pub async fn load(path: &Path) -> SuperviseResult<HostSet> {
    let source = path.display().to_string();
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|err| SuperviseError::Inventory(format!("error reading inventory {}: {}", source, err)))?;
    let is_yaml = matches!(path.extension().and_then(|ext| ext.to_str()), Some("yml") | Some("yaml"));
    let hosts = if is_yaml {
        yaml::parse(&content, &source)?
    } else {
        ansible::parse(&content, &source)?
    };
    tracing::debug!(hosts = hosts.len(), "inventory loaded");
    Ok(hosts)
}

/// Load the inventory at the given path within the given time budget & select a group of it.
pub async fn load_selected(path: &Path, selector: &str, budget: Duration) -> SuperviseResult<HostSet> {
    let hosts = bounded_load(budget, path, load(path)).await?;
    hosts.select(selector)
}

/// Await an inventory load within the given time budget.
pub(super) async fn bounded_load(budget: Duration, path: &Path, fut: impl Future<Output = SuperviseResult<HostSet>>) -> SuperviseResult<HostSet> {
    timeout(budget, fut)
        .await
        .map_err(|_elapsed| SuperviseError::Timeout(format!("loading inventory {}", path.display())))?
}

/// Accumulates the groups, hosts & variables declared by an inventory source.
///
/// Both inventory formats feed this builder, which then resolves group nesting and variable
/// precedence in one place: `all` < ancestor groups < more specific groups < host vars.
pub(crate) struct InventoryBuilder {
    source: String,
    hosts: Vec<String>,
    host_groups: HashMap<String, BTreeSet<String>>,
    host_vars: HashMap<String, BTreeMap<String, String>>,
    group_vars: HashMap<String, BTreeMap<String, String>>,
    /// Child group -> parent groups.
    parents: HashMap<String, BTreeSet<String>>,
}

impl InventoryBuilder {
    pub(crate) fn new(source: &str) -> Self {
        Self {
            source: source.to_string(),
            hosts: Default::default(),
            host_groups: Default::default(),
            host_vars: Default::default(),
            group_vars: Default::default(),
            parents: Default::default(),
        }
    }

    /// Declare a host as a member of a group, merging the given vars into the host's vars.
    pub(crate) fn add_host(&mut self, group: &str, host: &str, vars: BTreeMap<String, String>) {
        if !self.host_groups.contains_key(host) {
            self.hosts.push(host.to_string());
        }
        self.host_groups.entry(host.to_string()).or_default().insert(group.to_string());
        self.host_vars.entry(host.to_string()).or_default().extend(vars);
    }

    pub(crate) fn add_group_var(&mut self, group: &str, key: &str, val: &str) {
        self.group_vars.entry(group.to_string()).or_default().insert(key.to_string(), val.to_string());
    }

    pub(crate) fn add_child(&mut self, parent: &str, child: &str) {
        self.parents.entry(child.to_string()).or_default().insert(parent.to_string());
    }

    /// Collect the transitive ancestors of a group, guarding against cyclic declarations.
    fn ancestors(&self, group: &str) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        let mut stack = vec![group.to_string()];
        while let Some(next) = stack.pop() {
            if let Some(parents) = self.parents.get(&next) {
                for parent in parents {
                    if parent != group && out.insert(parent.clone()) {
                        stack.push(parent.clone());
                    }
                }
            }
        }
        out
    }

    pub(crate) fn build(self) -> SuperviseResult<HostSet> {
        let mut records = Vec::with_capacity(self.hosts.len());
        for host in self.hosts.iter() {
            let direct = self.host_groups.get(host).cloned().unwrap_or_default();
            let mut groups = BTreeSet::new();
            for group in direct.iter() {
                groups.extend(self.ancestors(group));
                groups.insert(group.clone());
            }
            groups.insert(GROUP_ALL.to_string());

            // Apply group vars from least to most specific, where specificity is the number of
            // ancestors a group has. Ties are broken by name so that the result is deterministic.
            let mut ordered: Vec<(usize, &String)> = groups
                .iter()
                .filter(|group| group.as_str() != GROUP_ALL)
                .map(|group| (self.ancestors(group).len(), group))
                .collect();
            ordered.sort();
            let mut vars = self.group_vars.get(GROUP_ALL).cloned().unwrap_or_default();
            for (_, group) in ordered {
                if let Some(group_vars) = self.group_vars.get(group) {
                    vars.extend(group_vars.iter().map(|(key, val)| (key.clone(), val.clone())));
                }
            }
            if let Some(host_vars) = self.host_vars.get(host) {
                vars.extend(host_vars.iter().map(|(key, val)| (key.clone(), val.clone())));
            }

            records.push(HostRecord::from_vars(host, groups, &vars, &self.source)?);
        }
        HostSet::new(records)
    }
}

/// Parse an Ansible style boolean.
fn parse_bool(val: &str) -> Option<bool> {
    match val.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}
