//! Apply the replica group of the supervisors for some hosts of an inventory.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use structopt::StructOpt;

use crate::app::App;
use crate::config::Config;
use crate::k8s::{GroupKind, GroupRef, KubeGateway, ReplicaGroupManifest};
use crate::synchronizer::{ReconcileOutcome, Synchronizer};
use crate::Supervise;

/// Create or update the replica group of the supervisors so that it has one replica per host.
#[derive(StructOpt)]
#[structopt(name = "rc")]
pub struct Rc {
    /// The inventory group of hosts to supervise.
    hosts: String,
    /// The location of your Ansible inventory file.
    #[structopt(long, env = "SUPERVISE_INVENTORY", default_value = "inventory")]
    inventory: PathBuf,
    /// The name of the replica group of the supervisors, defaults to the manifest's name.
    #[structopt(long = "rc", env = "SUPERVISE_RC")]
    name: Option<String>,
    /// The kind of the replica group, `sts` or `rc`; ignored when a manifest is given.
    ///
    /// Only `sts` gives every instance a stable ordinal. With `rc`, replacing a pod other than the
    /// newest shifts the ordinals of the later pods, so two instances may briefly claim one host.
    #[structopt(long, env = "SUPERVISE_KIND", default_value = "sts")]
    kind: GroupKind,
    /// A YAML manifest of the replica group, used to create it if it does not exist.
    #[structopt(long, env = "SUPERVISE_MANIFEST")]
    manifest: Option<PathBuf>,
    /// Keep running, reconciling the replica group every N seconds until interrupted.
    #[structopt(long)]
    interval_seconds: Option<u64>,
}

impl Rc {
    pub async fn run(&self, base: &Supervise, config: &Config) -> Result<()> {
        let manifest = match &self.manifest {
            Some(path) => Some(ReplicaGroupManifest::load(path).await.context("error loading replica group manifest")?),
            None => None,
        };
        let name = match (self.name.as_deref(), manifest.as_ref().and_then(|manifest| manifest.name())) {
            (Some(name), _) | (None, Some(name)) => name.to_string(),
            (None, None) => bail!("no replica group name given, use --rc or a manifest with metadata.name"),
        };
        let kind = manifest.as_ref().map(|manifest| manifest.kind()).unwrap_or(self.kind);

        let (client, namespace) = base.kube_client(config).await?;
        let group = GroupRef::new(kind, namespace, name);
        let gateway = Arc::new(KubeGateway::new(client, config.api_timeout()));
        let synchronizer = Synchronizer::new(gateway, config.api_timeout());

        if let Some(secs) = self.interval_seconds {
            let app = App::new(
                synchronizer,
                self.inventory.clone(),
                self.hosts.clone(),
                group,
                manifest,
                Duration::from_secs(secs.max(1)),
            );
            return app.spawn().await.context("error joining reconciliation driver")?;
        }

        let outcome = synchronizer
            .reconcile(&self.inventory, &self.hosts, &group, manifest.as_ref())
            .await
            .with_context(|| format!("error reconciling {} against hosts '{}'", group, self.hosts))?;
        match outcome {
            ReconcileOutcome::Unchanged { replicas } => tracing::info!("{} already has {} replicas", group, replicas),
            ReconcileOutcome::Scaled { from, to } => tracing::info!("scaled {} from {} to {} replicas", group, from, to),
            ReconcileOutcome::Created { replicas } => tracing::info!("created {} with {} replicas", group, replicas),
        }
        Ok(())
    }
}
