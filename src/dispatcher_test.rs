use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use crate::connection::{ConnectionDefaults, Credentials};
use crate::dispatcher::{check_status, Dispatcher};
use crate::error::{CredentialField, SuperviseError};
use crate::fixtures::{self, MemoryGateway, INVENTORY_INI};
use crate::k8s::{GroupKind, GroupRef};
use crate::transport::{SshTransport, TransportKind, Transports, WinRmTransport};

const LOAD_TIMEOUT: Duration = Duration::from_secs(5);

fn group() -> GroupRef {
    GroupRef::new(GroupKind::ReplicationController, "default", "supervisor")
}

fn dispatcher(gateway: &Arc<MemoryGateway>, defaults: ConnectionDefaults) -> Dispatcher {
    let transports = Transports::new(Arc::new(SshTransport::new("true")), Arc::new(WinRmTransport::new("false")));
    Dispatcher::new(gateway.clone(), transports, defaults, LOAD_TIMEOUT)
}

#[tokio::test]
async fn resolve_binds_instance_ordinal_to_host() -> Result<()> {
    let gateway = Arc::new(MemoryGateway::with_state(3, &["pod-0", "pod-1", "pod-2"]));
    let file = fixtures::write_temp(INVENTORY_INI, ".ini")?;
    let dispatcher = dispatcher(&gateway, ConnectionDefaults::default());

    let conn = dispatcher.resolve(file.path(), "appservers", &group(), "pod-0").await?;
    assert_eq!(conn.host, "a", "expected pod-0 to own host a, got {}", conn.host);
    assert_eq!(conn.address, "10.0.0.1");
    assert_eq!(conn.port, 22, "expected default port, got {}", conn.port);
    assert_eq!(
        conn.credentials,
        Credentials::Ssh {
            user: "deploy".into(),
            private_key: "/keys/a".into()
        }
    );

    let conn = dispatcher.resolve(file.path(), "appservers", &group(), "pod-2").await?;
    assert_eq!(conn.host, "c", "expected pod-2 to own host c, got {}", conn.host);
    assert_eq!(conn.port, 2222, "expected host port to win, got {}", conn.port);
    assert_eq!(conn.credentials.user(), "ops");
    Ok(())
}

#[tokio::test]
async fn resolve_winrm_host_without_password_names_the_field() -> Result<()> {
    let gateway = Arc::new(MemoryGateway::with_state(3, &["pod-0", "pod-1", "pod-2"]));
    let file = fixtures::write_temp(INVENTORY_INI, ".ini")?;

    let err = dispatcher(&gateway, ConnectionDefaults::default())
        .resolve(file.path(), "appservers", &group(), "pod-1")
        .await
        .expect_err("expected missing password to fail");

    assert!(
        matches!(&err, SuperviseError::MissingCredential { host, field: CredentialField::Password, transport: TransportKind::WinRm } if host == "b"),
        "expected missing password for host b, got {:?}",
        err
    );
    Ok(())
}

#[tokio::test]
async fn resolve_winrm_host_uses_default_password() -> Result<()> {
    let gateway = Arc::new(MemoryGateway::with_state(3, &["pod-0", "pod-1", "pod-2"]));
    let file = fixtures::write_temp(INVENTORY_INI, ".ini")?;
    let defaults = ConnectionDefaults {
        port: 5985,
        password: Some("hunter2".into()),
        ..Default::default()
    };

    let conn = dispatcher(&gateway, defaults).resolve(file.path(), "appservers", &group(), "pod-1").await?;

    assert_eq!(conn.transport(), TransportKind::WinRm, "expected host transport to win over the default");
    assert_eq!(conn.port, 5985);
    assert_eq!(
        conn.credentials,
        Credentials::WinRm {
            user: "Administrator".into(),
            password: "hunter2".into()
        }
    );
    Ok(())
}

#[tokio::test]
async fn resolve_over_scaled_instance_is_unassigned() -> Result<()> {
    let gateway = Arc::new(MemoryGateway::with_state(4, &["pod-0", "pod-1", "pod-2", "pod-3"]));
    let file = fixtures::write_temp(INVENTORY_INI, ".ini")?;

    let err = dispatcher(&gateway, ConnectionDefaults::default())
        .resolve(file.path(), "appservers", &group(), "pod-3")
        .await
        .expect_err("expected pod-3 to be unassigned");

    assert!(matches!(err, SuperviseError::Unassigned { ordinal: 3, hosts: 3, .. }), "expected unassigned, got {:?}", err);
    assert!(err.is_transient(), "expected unassigned to be transient");
    Ok(())
}

#[tokio::test]
async fn resolve_unlisted_instance_is_identity_not_found() -> Result<()> {
    let gateway = Arc::new(MemoryGateway::with_state(1, &["pod-0"]));
    let file = fixtures::write_temp(INVENTORY_INI, ".ini")?;

    let err = dispatcher(&gateway, ConnectionDefaults::default())
        .resolve(file.path(), "appservers", &group(), "pod-9")
        .await
        .expect_err("expected pod-9 to be unknown");

    assert!(matches!(err, SuperviseError::IdentityNotFound { .. }), "expected identity not found, got {:?}", err);
    Ok(())
}

#[tokio::test]
async fn resolve_and_dispatch_runs_the_session() -> Result<()> {
    let gateway = Arc::new(MemoryGateway::with_state(1, &["pod-0"]));
    let file = fixtures::write_temp(INVENTORY_INI, ".ini")?;

    let status = dispatcher(&gateway, ConnectionDefaults::default())
        .resolve_and_dispatch(file.path(), "appservers", &group(), "pod-0", "uptime")
        .await?;

    assert!(status.success(), "expected session to succeed, got {:?}", status);
    check_status("a", status)?;
    Ok(())
}

#[tokio::test]
async fn dispatch_failed_session_reports_status() -> Result<()> {
    let gateway = Arc::new(MemoryGateway::with_state(3, &["pod-0", "pod-1", "pod-2"]));
    let file = fixtures::write_temp(INVENTORY_INI, ".ini")?;
    let defaults = ConnectionDefaults {
        password: Some("hunter2".into()),
        ..Default::default()
    };
    let dispatcher = dispatcher(&gateway, defaults);
    let conn = dispatcher.resolve(file.path(), "appservers", &group(), "pod-1").await?;

    let status = dispatcher.dispatch(&conn, "dir").await?;

    let err = check_status(&conn.host, status).expect_err("expected failed session to be an error");
    assert!(matches!(err, SuperviseError::Transport(_)), "expected transport error, got {:?}", err);
    Ok(())
}
