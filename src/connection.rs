//! Connection parameter resolution.
//!
//! A `HostRecord` only carries what the inventory declares. Before a session can be opened its
//! unset fields are filled from explicit invocation level defaults, producing a fully populated
//! `ConnectionDescriptor`. A credential that is missing from both is an error naming the field,
//! never an empty value.

use crate::error::{CredentialField, SuperviseError, SuperviseResult};
use crate::inventory::HostRecord;
use crate::transport::TransportKind;

/// The default port of remote sessions.
pub const DEFAULT_PORT: u16 = 22;

/// Invocation level connection defaults.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionDefaults {
    /// The port used for hosts which do not declare one.
    pub port: u16,
    /// The transport used for hosts which do not declare one.
    pub transport: TransportKind,
    /// The user used for hosts which do not declare one.
    pub user: Option<String>,
    /// The SSH private key path used for hosts which do not declare one.
    pub private_key: Option<String>,
    /// The WinRM password used for hosts which do not declare one.
    pub password: Option<String>,
}

impl Default for ConnectionDefaults {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            transport: TransportKind::Ssh,
            user: None,
            private_key: None,
            password: None,
        }
    }
}

/// Credentials of a session, tagged by transport.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Ssh { user: String, private_key: String },
    WinRm { user: String, password: String },
}

impl Credentials {
    pub fn user(&self) -> &str {
        match self {
            Self::Ssh { user, .. } | Self::WinRm { user, .. } => user,
        }
    }
}

// Never print secrets.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ssh { user, private_key } => f
                .debug_struct("Ssh")
                .field("user", user)
                .field("private_key", private_key)
                .finish(),
            Self::WinRm { user, .. } => f.debug_struct("WinRm").field("user", user).field("password", &"<redacted>").finish(),
        }
    }
}

/// Fully resolved parameters for opening a session on a host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    /// The inventory name of the host.
    pub host: String,
    pub address: String,
    pub port: u16,
    pub credentials: Credentials,
}

impl ConnectionDescriptor {
    /// The transport of this connection.
    pub fn transport(&self) -> TransportKind {
        match &self.credentials {
            Credentials::Ssh { .. } => TransportKind::Ssh,
            Credentials::WinRm { .. } => TransportKind::WinRm,
        }
    }
}

/// Resolve the connection parameters of a host, filling unset fields from the given defaults.
pub fn resolve_connection(host: &HostRecord, defaults: &ConnectionDefaults) -> SuperviseResult<ConnectionDescriptor> {
    let transport = host.transport.unwrap_or(defaults.transport);
    let missing = |field| SuperviseError::MissingCredential {
        host: host.name.clone(),
        field,
        transport,
    };
    let pick = |own: &Option<String>, fallback: &Option<String>| -> Option<String> {
        own.as_ref()
            .filter(|val| !val.is_empty())
            .or_else(|| fallback.as_ref().filter(|val| !val.is_empty()))
            .cloned()
    };

    let user = pick(&host.user, &defaults.user).ok_or_else(|| missing(CredentialField::User))?;
    let credentials = match transport {
        TransportKind::Ssh => Credentials::Ssh {
            user,
            private_key: pick(&host.private_key, &defaults.private_key).ok_or_else(|| missing(CredentialField::PrivateKey))?,
        },
        TransportKind::WinRm => Credentials::WinRm {
            user,
            password: pick(&host.password, &defaults.password).ok_or_else(|| missing(CredentialField::Password))?,
        },
    };
    Ok(ConnectionDescriptor {
        host: host.name.clone(),
        address: host.address.clone(),
        port: host.port.unwrap_or(defaults.port),
        credentials,
    })
}
