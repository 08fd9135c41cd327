use async_trait::async_trait;
use tokio::process::Command;

use crate::connection::{ConnectionDescriptor, Credentials};
use crate::error::{SuperviseError, SuperviseResult};
use crate::transport::{RemoteSession, RemoteTransport};

/// The default SSH client program.
const DEFAULT_PROGRAM: &str = "ssh";

/// A transport which opens sessions with the system's OpenSSH client.
#[derive(Clone, Debug)]
pub struct SshTransport {
    program: String,
}

impl SshTransport {
    /// Create a new instance using the given client program.
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into() }
    }

    /// Build the client arguments for running a command on the described host.
    pub(crate) fn args(conn: &ConnectionDescriptor, command: &str) -> SuperviseResult<Vec<String>> {
        let (user, private_key) = match &conn.credentials {
            Credentials::Ssh { user, private_key } => (user, private_key),
            Credentials::WinRm { .. } => {
                return Err(SuperviseError::Transport(format!("host '{}' is not configured for SSH", conn.host)));
            }
        };
        Ok(vec![
            "-o".into(),
            "BatchMode=yes".into(),
            "-o".into(),
            "StrictHostKeyChecking=no".into(),
            // Allocate a tty so that the remote process is signalled when the session ends.
            "-tt".into(),
            "-i".into(),
            private_key.clone(),
            "-p".into(),
            conn.port.to_string(),
            format!("{}@{}", user, conn.address),
            "--".into(),
            command.to_string(),
        ])
    }
}

impl Default for SshTransport {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRAM)
    }
}

#[async_trait]
impl RemoteTransport for SshTransport {
    #[tracing::instrument(level = "debug", skip(self, conn), fields(host = %conn.host))]
    async fn open_session(&self, conn: &ConnectionDescriptor, command: &str) -> SuperviseResult<RemoteSession> {
        let mut cmd = Command::new(&self.program);
        cmd.args(Self::args(conn, command)?);
        tracing::info!(host = %conn.host, address = %conn.address, port = conn.port, "opening SSH session");
        RemoteSession::spawn(&conn.host, cmd)
    }
}
