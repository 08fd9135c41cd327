use async_trait::async_trait;
use tokio::process::Command;

use crate::connection::{ConnectionDescriptor, Credentials};
use crate::error::{SuperviseError, SuperviseResult};
use crate::transport::{RemoteSession, RemoteTransport};

/// The default WinRM client program.
const DEFAULT_PROGRAM: &str = "winrm";
/// The environment variable through which the client receives the password.
pub(crate) const PASSWORD_ENV: &str = "WINRM_PASSWORD";

/// A transport which opens sessions with a `winrm` command-line client.
///
/// The client is expected to accept `-hostname`, `-port` & `-username` flags followed by the
/// command to run, and to read the password from `WINRM_PASSWORD`. The password never appears
/// on the client's command line, where any local user could read it.
#[derive(Clone, Debug)]
pub struct WinRmTransport {
    program: String,
}

impl WinRmTransport {
    /// Create a new instance using the given client program.
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into() }
    }

    pub(crate) fn args(conn: &ConnectionDescriptor, command: &str) -> SuperviseResult<Vec<String>> {
        let (user, _) = Self::credentials(conn)?;
        Ok(vec![
            "-hostname".into(),
            conn.address.clone(),
            "-port".into(),
            conn.port.to_string(),
            "-username".into(),
            user.to_string(),
            command.to_string(),
        ])
    }

    /// Build the client command for the given connection, passing the password via the environment.
    pub(crate) fn command(&self, conn: &ConnectionDescriptor, command: &str) -> SuperviseResult<Command> {
        let (_, password) = Self::credentials(conn)?;
        let mut cmd = Command::new(&self.program);
        cmd.args(Self::args(conn, command)?).env(PASSWORD_ENV, password);
        Ok(cmd)
    }

    fn credentials(conn: &ConnectionDescriptor) -> SuperviseResult<(&str, &str)> {
        match &conn.credentials {
            Credentials::WinRm { user, password } => Ok((user.as_str(), password.as_str())),
            Credentials::Ssh { .. } => Err(SuperviseError::Transport(format!("host '{}' is not configured for WinRM", conn.host))),
        }
    }
}

impl Default for WinRmTransport {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRAM)
    }
}

#[async_trait]
impl RemoteTransport for WinRmTransport {
    #[tracing::instrument(level = "debug", skip(self, conn), fields(host = %conn.host))]
    async fn open_session(&self, conn: &ConnectionDescriptor, command: &str) -> SuperviseResult<RemoteSession> {
        let cmd = self.command(conn, command)?;
        tracing::info!(host = %conn.host, address = %conn.address, port = conn.port, "opening WinRM session");
        RemoteSession::spawn(&conn.host, cmd)
    }
}
