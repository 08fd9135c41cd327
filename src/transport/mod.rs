//! Remote session transports.
//!
//! Every transport offers a single capability: open a session running a command on a host
//! described by a `ConnectionDescriptor`. The provided transports drive the system's `ssh`
//! client and a `winrm` command-line client. The supervised process's output is inherited by
//! this process, so it shows up in the pod's logs.

mod ssh;
mod winrm;

use std::fmt;
use std::process::ExitStatus;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::{Child, Command};

use crate::connection::ConnectionDescriptor;
use crate::error::{SuperviseError, SuperviseResult};

pub use ssh::SshTransport;
pub use winrm::WinRmTransport;

/// The protocol used to open a session on a host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Ssh,
    WinRm,
}

impl TransportKind {
    /// Map an `ansible_connection` value onto a transport.
    pub fn from_connection(val: &str) -> Option<Self> {
        match val.to_ascii_lowercase().as_str() {
            "ssh" | "smart" | "paramiko" => Some(Self::Ssh),
            "winrm" => Some(Self::WinRm),
            _ => None,
        }
    }

    /// The transport selected by an invocation level `--winrm` flag.
    pub fn from_winrm_flag(winrm: bool) -> Self {
        if winrm {
            Self::WinRm
        } else {
            Self::Ssh
        }
    }

    /// The interactive shell of hosts reached over this transport.
    pub fn shell(&self) -> &'static str {
        match self {
            Self::Ssh => "bash",
            Self::WinRm => "PowerShell",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ssh => f.write_str("SSH"),
            Self::WinRm => f.write_str("WinRM"),
        }
    }
}

/// A type capable of opening a remote session on a host.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Open a session on the described host, running the given command.
    async fn open_session(&self, conn: &ConnectionDescriptor, command: &str) -> SuperviseResult<RemoteSession>;
}

/// A running remote session.
#[derive(Debug)]
pub struct RemoteSession {
    host: String,
    child: Child,
}

impl RemoteSession {
    /// Spawn the given local client command as the session of a host.
    pub(crate) fn spawn(host: &str, mut cmd: Command) -> SuperviseResult<Self> {
        // If this process goes away, so does its session.
        cmd.kill_on_drop(true);
        let child = cmd
            .spawn()
            .map_err(|err| SuperviseError::Transport(format!("error spawning session client for host '{}': {}", host, err)))?;
        Ok(Self { host: host.to_string(), child })
    }

    /// The name of the host of this session.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Wait for the remote command to finish.
    pub async fn wait(mut self) -> SuperviseResult<ExitStatus> {
        self.child
            .wait()
            .await
            .map_err(|err| SuperviseError::Transport(format!("error waiting on session for host '{}': {}", self.host, err)))
    }
}

/// The set of transports available to a dispatcher, one per transport kind.
#[derive(Clone)]
pub struct Transports {
    ssh: Arc<dyn RemoteTransport>,
    winrm: Arc<dyn RemoteTransport>,
}

impl Transports {
    /// Create a new instance.
    pub fn new(ssh: Arc<dyn RemoteTransport>, winrm: Arc<dyn RemoteTransport>) -> Self {
        Self { ssh, winrm }
    }

    /// Get the transport of the given kind.
    pub fn get(&self, kind: TransportKind) -> &dyn RemoteTransport {
        match kind {
            TransportKind::Ssh => self.ssh.as_ref(),
            TransportKind::WinRm => self.winrm.as_ref(),
        }
    }
}

impl Default for Transports {
    fn default() -> Self {
        Self::new(Arc::new(SshTransport::default()), Arc::new(WinRmTransport::default()))
    }
}
