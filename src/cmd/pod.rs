//! Run the supervised command on the host owned by this instance.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use structopt::StructOpt;

use crate::config::Config;
use crate::connection::ConnectionDefaults;
use crate::dispatcher::{check_status, Dispatcher};
use crate::k8s::{GroupKind, GroupRef, KubeGateway};
use crate::transport::{TransportKind, Transports};
use crate::Supervise;

/// The file mode of generated shell scripts.
const SCRIPT_MODE: u32 = 0o555;

/// Run a command on the one host of an inventory group which is owned by this instance.
#[derive(StructOpt)]
#[structopt(name = "pod")]
pub struct Pod {
    /// The inventory group of hosts to supervise.
    hosts: String,
    /// The command to run on the host.
    #[structopt(required = true, min_values = 1)]
    command: Vec<String>,
    /// The location of your Ansible inventory file.
    #[structopt(long, env = "SUPERVISE_INVENTORY", default_value = "inventory")]
    inventory: PathBuf,
    /// The name of the replica group of the supervisors.
    #[structopt(long = "rc", env = "SUPERVISE_RC")]
    name: String,
    /// The kind of the replica group, `sts` or `rc`.
    ///
    /// Only `sts` gives every instance a stable ordinal. With `rc`, replacing a pod other than the
    /// newest shifts the ordinals of the later pods, so two instances may briefly claim one host.
    #[structopt(long, env = "SUPERVISE_KIND", default_value = "sts")]
    kind: GroupKind,
    /// The user for hosts which do not declare one.
    #[structopt(long, env = "SUPERVISE_USER")]
    user: Option<String>,
    /// The SSH private key for hosts which do not declare one.
    #[structopt(long, env = "SUPERVISE_PRIVATEKEY")]
    private_key: Option<String>,
    /// The password used for WinRM connections to hosts which do not declare one.
    #[structopt(long, env = "SUPERVISE_PASSWORD")]
    password: Option<String>,
    /// Use WinRM instead of SSH for hosts which do not declare a connection.
    #[structopt(long, env = "SUPERVISE_WINRM")]
    winrm: bool,
    /// If specified, a script is generated at this path for opening a shell on the remote host.
    #[structopt(long, env = "SUPERVISE_BASH")]
    bash: Option<PathBuf>,
    /// The number of times to retry resolving this instance's host on transient errors.
    ///
    /// Time spent waiting between attempts is at most `--retries` times `--retry-delay` seconds.
    #[structopt(long, default_value = "5")]
    retries: u32,
    /// The number of seconds to wait between retries.
    #[structopt(long, default_value = "2")]
    retry_delay: u64,
}

impl Pod {
    pub async fn run(&self, base: &Supervise, config: &Config) -> Result<()> {
        let command = self.command.join(" ");
        let identity = config.identity()?;
        tracing::info!("running command on a host from {} and command `{}`", self.hosts, command);

        let (client, namespace) = base.kube_client(config).await?;
        let group = GroupRef::new(self.kind, namespace, self.name.clone());
        if self.kind == GroupKind::ReplicationController {
            tracing::warn!("{} pods have no stable ordinal, replacing a pod may shift the hosts of later pods", group);
        }
        let gateway = Arc::new(KubeGateway::new(client, config.api_timeout()));
        let dispatcher = Dispatcher::new(gateway, Transports::default(), self.defaults(base.port), config.api_timeout());

        let (dispatcher_ref, group_ref) = (&dispatcher, &group);
        let conn = super::retry_transient(self.retries, Duration::from_secs(self.retry_delay), move || {
            dispatcher_ref.resolve(&self.inventory, &self.hosts, group_ref, identity)
        })
        .await
        .with_context(|| format!("error resolving the host of instance {}", identity))?;

        if let Some(path) = &self.bash {
            // Failing to write the script does not fail the session.
            if let Err(err) = write_shell_script(path, &self.hosts, conn.transport()).await {
                tracing::error!(error = ?err, "failed to generate shell script at {}", path.display());
            }
        }

        let status = dispatcher
            .dispatch(&conn, &command)
            .await
            .with_context(|| format!("error running command on host {}", conn.host))?;
        check_status(&conn.host, status)?;
        Ok(())
    }

    /// The invocation level connection defaults.
    fn defaults(&self, port: u16) -> ConnectionDefaults {
        ConnectionDefaults {
            port,
            transport: TransportKind::from_winrm_flag(self.winrm),
            user: self.user.clone(),
            private_key: self.private_key.clone(),
            password: self.password.clone(),
        }
    }
}

/// Render a script which opens an interactive shell on the host of this instance.
pub(crate) fn shell_script(hosts: &str, transport: TransportKind) -> String {
    format!(
        "#!/bin/sh\necho opening shell on remote machine...\nkube-supervise pod {} {}\n",
        hosts,
        transport.shell()
    )
}

/// Write the shell script for the given transport to the given path as a read-only executable.
pub(crate) async fn write_shell_script(path: &Path, hosts: &str, transport: TransportKind) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    tokio::fs::write(path, shell_script(hosts, transport))
        .await
        .with_context(|| format!("error writing shell script {}", path.display()))?;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(SCRIPT_MODE))
        .await
        .with_context(|| format!("error setting permissions of shell script {}", path.display()))?;
    Ok(())
}
