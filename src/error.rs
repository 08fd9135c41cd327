//! Supervisor error abstractions.

use std::fmt;

use thiserror::Error;

/// A result type where the error is a `SuperviseError`.
pub type SuperviseResult<T> = ::std::result::Result<T, SuperviseError>;

/// Error variants produced by host assignment & replica group synchronization.
///
/// Nothing in this crate retries on its own. Callers use `is_transient` to decide whether an
/// operation is worth repeating after a short delay.
#[derive(Debug, Error)]
pub enum SuperviseError {
    /// The inventory source could not be read or is malformed.
    #[error("inventory error: {0}")]
    Inventory(String),
    /// No hosts of the inventory match the given selector.
    #[error("no hosts match selector '{selector}'")]
    Selection { selector: String },
    /// The target replica group does not exist.
    #[error("{kind} '{name}' not found in namespace '{namespace}'")]
    NotFound { kind: &'static str, namespace: String, name: String },
    /// The control plane rejected a write because the object changed since it was read.
    #[error("conflict while updating '{name}' in namespace '{namespace}', re-read and retry")]
    Conflict { namespace: String, name: String },
    /// The caller's identity is not among the currently running instances.
    #[error("instance '{identity}' is not among the running instances of the replica group")]
    IdentityNotFound { identity: String },
    /// The caller's ordinal has no corresponding host.
    #[error("instance '{identity}' has ordinal {ordinal} but only {hosts} hosts are available")]
    Unassigned { identity: String, ordinal: usize, hosts: usize },
    /// A host is missing a credential required by its transport.
    #[error("host '{host}' has no {field} configured for {transport} and no default was given")]
    MissingCredential {
        host: String,
        field: CredentialField,
        transport: crate::transport::TransportKind,
    },
    /// A blocking operation exceeded its time budget.
    #[error("timeout while {0}")]
    Timeout(String),
    /// The remote session collaborator failed.
    #[error("transport error: {0}")]
    Transport(String),
    /// An unexpected error from the control plane or runtime.
    #[error("internal error: {0:#}")]
    Internal(anyhow::Error),
}

impl SuperviseError {
    /// Whether this error is expected to resolve itself, so that retrying after a short delay
    /// is a reasonable reaction.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Conflict { .. } | Self::IdentityNotFound { .. } | Self::Unassigned { .. } | Self::Timeout(_)
        )
    }

    /// The short name of this error's kind, as printed by the CLI.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Inventory(_) => "InventoryError",
            Self::Selection { .. } => "SelectionError",
            Self::NotFound { .. } => "NotFoundError",
            Self::Conflict { .. } => "ConflictError",
            Self::IdentityNotFound { .. } => "IdentityNotFoundError",
            Self::Unassigned { .. } => "UnassignedError",
            Self::MissingCredential { .. } => "MissingCredentialError",
            Self::Timeout(_) => "TimeoutError",
            Self::Transport(_) => "TransportError",
            Self::Internal(_) => "InternalError",
        }
    }
}

/// A credential field which may be required to open a session on a host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CredentialField {
    User,
    PrivateKey,
    Password,
}

impl fmt::Display for CredentialField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => f.write_str("user"),
            Self::PrivateKey => f.write_str("private key"),
            Self::Password => f.write_str("password"),
        }
    }
}
