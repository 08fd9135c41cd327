//! The long-running reconciliation driver.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::stream::StreamExt;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::{BroadcastStream, SignalStream};
use tokio_stream::StreamMap;

use crate::k8s::{GroupRef, ReplicaGroupManifest};
use crate::synchronizer::{ReconcileOutcome, Synchronizer};

/// The application object for when the supervisor is running as the reconciliation driver.
///
/// Runs a reconciliation pass right away & then once per interval, until a signal is received
/// or shutdown is triggered through the shutdown channel. A failed pass is logged and the next
/// tick simply tries again.
pub struct App {
    synchronizer: Synchronizer,
    inventory_path: PathBuf,
    selector: String,
    group: GroupRef,
    manifest: Option<ReplicaGroupManifest>,
    interval: Duration,

    /// A channel used for triggering graceful shutdown.
    shutdown_tx: broadcast::Sender<()>,
    /// A channel used for triggering graceful shutdown.
    shutdown_rx: BroadcastStream<()>,
}

impl App {
    /// Create a new instance.
    pub fn new(
        synchronizer: Synchronizer, inventory_path: PathBuf, selector: String, group: GroupRef, manifest: Option<ReplicaGroupManifest>,
        interval: Duration,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(10);
        Self {
            synchronizer,
            inventory_path,
            selector,
            group,
            manifest,
            interval,
            shutdown_rx: BroadcastStream::new(shutdown_rx),
            shutdown_tx,
        }
    }

    /// A handle for triggering graceful shutdown of this app.
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    pub fn spawn(self) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) -> Result<()> {
        let mut signals = StreamMap::new();
        signals.insert("sigterm", SignalStream::new(signal(SignalKind::terminate()).context("error building signal stream")?));
        signals.insert("sigint", SignalStream::new(signal(SignalKind::interrupt()).context("error building signal stream")?));
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(group = %self.group, interval = ?self.interval, "reconciliation driver started");
        loop {
            tokio::select! {
                Some((_, sig)) = signals.next() => {
                    tracing::debug!(signal = ?sig, "signal received, beginning graceful shutdown");
                    let _ = self.shutdown_tx.send(());
                    break;
                }
                _ = self.shutdown_rx.next() => break,
                _ = ticker.tick() => self.reconcile_pass().await,
            }
        }

        tracing::debug!("reconciliation driver shutdown complete");
        Ok(())
    }

    /// Run a single reconciliation pass, logging its outcome.
    async fn reconcile_pass(&self) {
        let res = self
            .synchronizer
            .reconcile(&self.inventory_path, &self.selector, &self.group, self.manifest.as_ref())
            .await;
        match res {
            Ok(ReconcileOutcome::Unchanged { replicas }) => tracing::debug!(replicas, "replica group is up-to-date"),
            Ok(outcome) => tracing::info!(?outcome, "reconciled {}", self.group),
            Err(err) if err.is_transient() => tracing::warn!(error = %err, kind = err.kind(), "transient error during reconciliation, will retry"),
            Err(err) => tracing::error!(error = %err, kind = err.kind(), "error during reconciliation, will retry"),
        }
    }
}
