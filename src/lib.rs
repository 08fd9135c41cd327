//! Supervise processes on an inventory of external hosts from a Kubernetes replica group.
//!
//! Each running instance of a replica group owns exactly one host of an Ansible inventory,
//! chosen by the instance's ordinal, and supervises a command running on that host over SSH or
//! WinRM. The `rc` subcommand keeps the replica count of the group equal to the number of hosts.

pub mod app;
pub mod assignment;
pub mod cmd;
pub mod config;
pub mod connection;
pub mod dispatcher;
#[cfg(test)]
mod dispatcher_test;
pub mod error;
#[cfg(test)]
mod fixtures;
pub mod inventory;
pub mod k8s;
pub mod synchronizer;
pub mod transport;

use anyhow::{Context, Result};
use kube::Client;
use structopt::StructOpt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;

/// Supervise processes on an inventory of external hosts.
#[derive(StructOpt)]
#[structopt(name = "kube-supervise")]
pub struct Supervise {
    #[structopt(subcommand)]
    action: SuperviseSubcommands,
    /// Enable debug logging.
    #[structopt(short)]
    verbose: bool,
    /// The namespace of the replica group, overriding `NAMESPACE` & the kubeconfig's namespace.
    #[structopt(long)]
    namespace: Option<String>,
    /// The port for remote connections to hosts which do not declare one.
    #[structopt(long, env = "SUPERVISE_PORT", default_value = "22")]
    port: u16,
}

impl Supervise {
    pub async fn run(self) -> Result<()> {
        let config = Config::new()?;

        // Initialize logging based on CLI config.
        let fmt_layer = fmt::layer().with_target(true).with_level(true);
        let filter_layer = if self.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new(config.rust_log.as_deref().unwrap_or("info"))
        };
        tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt_layer)
            .try_init()
            .context("error initializing logging/tracing system")?;

        match &self.action {
            SuperviseSubcommands::Pod(inner) => inner.run(&self, &config).await,
            SuperviseSubcommands::Rc(inner) => inner.run(&self, &config).await,
            SuperviseSubcommands::Run(inner) => inner.run(&self).await,
        }
    }

    /// Build a K8s client & determine the namespace of the replica group.
    ///
    /// The namespace is taken from `--namespace`/`NAMESPACE`, then from the kubeconfig, falling
    /// back to `default`.
    pub(crate) async fn kube_client(&self, config: &Config) -> Result<(Client, String)> {
        let kube_config = kube::Config::infer().await.context("error inferring K8s client config")?;
        let namespace = match self.namespace.as_deref().map(str::trim).filter(|ns| !ns.is_empty()) {
            Some(namespace) => namespace.to_string(),
            None => config.namespace_or(&kube_config.default_namespace),
        };
        let client = Client::try_from(kube_config).context("error initializing K8s client")?;
        tracing::debug!(%namespace, "initialized K8s client");
        Ok((client, namespace))
    }
}

#[derive(StructOpt)]
pub enum SuperviseSubcommands {
    /// Runs the supervisor pod for a single host in a set of hosts from an Ansible inventory.
    #[structopt(name = "pod")]
    Pod(cmd::pod::Pod),
    /// Applies the replica group of the supervisors for some hosts in an Ansible inventory.
    #[structopt(name = "rc")]
    Rc(cmd::rc::Rc),
    /// Runs a supervisor command on a given host as a user without using Ansible.
    #[structopt(name = "run")]
    Run(cmd::run::Run),
}
