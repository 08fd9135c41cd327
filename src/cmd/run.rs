//! Run a command on an explicitly given host.

use anyhow::{Context, Result};
use structopt::StructOpt;

use crate::connection::{resolve_connection, ConnectionDefaults};
use crate::dispatcher::check_status;
use crate::inventory::HostRecord;
use crate::transport::{TransportKind, Transports};
use crate::Supervise;

/// Run a command on a given host as a user, without any inventory or cluster lookup.
#[derive(StructOpt)]
#[structopt(name = "run")]
pub struct Run {
    /// The user to use on the remote connection.
    #[structopt(long, env = "SUPERVISE_USER")]
    user: String,
    /// The private key used for SSH.
    #[structopt(long, env = "SUPERVISE_PRIVATEKEY")]
    private_key: Option<String>,
    /// The host for the remote connection.
    #[structopt(long, env = "SUPERVISE_HOST")]
    host: String,
    /// The remote command to invoke on the host.
    #[structopt(long, env = "SUPERVISE_COMMAND")]
    command: String,
    /// The password if using WinRM to execute the command.
    #[structopt(long)]
    password: Option<String>,
    /// Use WinRM instead of SSH.
    #[structopt(long)]
    winrm: bool,
}

impl Run {
    pub async fn run(&self, base: &Supervise) -> Result<()> {
        tracing::info!(host = %self.host, "running command on host");
        let defaults = ConnectionDefaults {
            port: base.port,
            transport: TransportKind::from_winrm_flag(self.winrm),
            user: Some(self.user.clone()),
            private_key: self.private_key.clone(),
            password: self.password.clone(),
        };
        let host = HostRecord {
            name: self.host.clone(),
            address: self.host.clone(),
            port: None,
            transport: None,
            user: None,
            private_key: None,
            password: None,
            groups: Default::default(),
        };
        let conn = resolve_connection(&host, &defaults).context("error resolving connection parameters")?;

        let transports = Transports::default();
        let session = transports
            .get(conn.transport())
            .open_session(&conn, &self.command)
            .await
            .with_context(|| format!("error opening session on host {}", conn.host))?;
        let status = session.wait().await?;
        check_status(&conn.host, status)?;
        Ok(())
    }
}
