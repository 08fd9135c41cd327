use anyhow::Result;

use super::ansible::parse;
use crate::error::SuperviseError;
use crate::fixtures::INVENTORY_INI;
use crate::transport::TransportKind;

#[test]
fn parse_preserves_declaration_order() -> Result<()> {
    let hosts = parse(INVENTORY_INI, "hosts")?;

    assert_eq!(hosts.names(), vec!["a", "b", "c", "db1"], "unexpected host order {:?}", hosts.names());
    Ok(())
}

#[test]
fn parse_applies_group_vars_below_host_vars() -> Result<()> {
    let hosts = parse(INVENTORY_INI, "hosts")?;

    let a = hosts.get(0).expect("host a exists");
    assert_eq!(a.address, "10.0.0.1");
    assert_eq!(a.user.as_deref(), Some("deploy"), "expected host var to win, got {:?}", a.user);
    assert_eq!(a.private_key.as_deref(), Some("/keys/a"));

    let c = hosts.get(2).expect("host c exists");
    assert_eq!(c.user.as_deref(), Some("ops"), "expected group var, got {:?}", c.user);
    assert_eq!(c.private_key.as_deref(), Some("/keys/shared"));
    assert_eq!(c.port, Some(2222));
    assert_eq!(c.transport, None);

    let db1 = hosts.get(3).expect("host db1 exists");
    assert_eq!(db1.user, None, "expected appservers vars not to leak onto db1, got {:?}", db1.user);
    Ok(())
}

#[test]
fn parse_reads_winrm_connection() -> Result<()> {
    let hosts = parse(INVENTORY_INI, "hosts")?;

    let b = hosts.get(1).expect("host b exists");
    assert_eq!(b.transport, Some(TransportKind::WinRm), "expected winrm transport, got {:?}", b.transport);
    assert_eq!(b.user.as_deref(), Some("Administrator"));
    assert_eq!(b.password, None);
    Ok(())
}

#[test]
fn parse_winrm_flag_and_password_aliases() -> Result<()> {
    let content = "[win]\nw1 winrm=true ansible_ssh_pass=secret\nw2 winrm=no\n";

    let hosts = parse(content, "hosts")?;

    let w1 = hosts.get(0).expect("host w1 exists");
    assert_eq!(w1.transport, Some(TransportKind::WinRm));
    assert_eq!(w1.password.as_deref(), Some("secret"));
    let w2 = hosts.get(1).expect("host w2 exists");
    assert_eq!(w2.transport, Some(TransportKind::Ssh));
    Ok(())
}

#[test]
fn parse_places_leading_hosts_in_ungrouped() -> Result<()> {
    let content = "loose1\nloose2 ansible_host=10.1.1.1\n[web]\nw1\n";

    let hosts = parse(content, "hosts")?;

    assert_eq!(hosts.names(), vec!["loose1", "loose2", "w1"]);
    let loose = hosts.select("ungrouped")?;
    assert_eq!(loose.names(), vec!["loose1", "loose2"], "unexpected ungrouped hosts {:?}", loose.names());
    assert_eq!(hosts.select("all")?.len(), 3);
    Ok(())
}

#[test]
fn parse_resolves_children_groups() -> Result<()> {
    let content = r#"
[east]
e1
[west]
w1
[legacy:children]
east
west
[legacy:vars]
ansible_user=legacy
[east:vars]
ansible_user=east
"#;

    let hosts = parse(content, "hosts")?;

    let legacy = hosts.select("legacy")?;
    assert_eq!(legacy.names(), vec!["e1", "w1"], "unexpected legacy hosts {:?}", legacy.names());
    let e1 = legacy.get(0).expect("host e1 exists");
    assert!(e1.in_group("east") && e1.in_group("legacy") && e1.in_group("all"), "unexpected groups {:?}", e1.groups);
    assert_eq!(e1.user.as_deref(), Some("east"), "expected child group var to win, got {:?}", e1.user);
    let w1 = legacy.get(1).expect("host w1 exists");
    assert_eq!(w1.user.as_deref(), Some("legacy"), "expected parent group var, got {:?}", w1.user);
    Ok(())
}

#[test]
fn parse_handles_quotes_and_comments() -> Result<()> {
    let content = "; semicolon comment\n[app]\nq1 ansible_user=\"svc user\" # trailing\n[app:vars]\nansible_ssh_private_key_file='/keys/with space'\n";

    let hosts = parse(content, "hosts")?;

    let q1 = hosts.get(0).expect("host q1 exists");
    assert_eq!(q1.user.as_deref(), Some("svc user"));
    assert_eq!(q1.private_key.as_deref(), Some("/keys/with space"));
    Ok(())
}

#[test]
fn parse_strips_trailing_comments_from_children_and_vars() -> Result<()> {
    let content = r#"
[web]
a
[app:children]
web # legacy frontends
[app:vars]
ansible_user=ops # shared account
ansible_password="p#ss" # quoted hash
ansible_ssh_private_key_file='/keys/#1'   # quoted hash
"#;

    let hosts = parse(content, "hosts")?;

    let app = hosts.select("app")?;
    assert_eq!(app.names(), vec!["a"], "expected web to be a child of app, got {:?}", app.names());
    let a = app.get(0).expect("host a exists");
    assert_eq!(a.user.as_deref(), Some("ops"), "expected comment to be stripped, got {:?}", a.user);
    assert_eq!(a.password.as_deref(), Some("p#ss"), "expected quoted hash to be kept, got {:?}", a.password);
    assert_eq!(a.private_key.as_deref(), Some("/keys/#1"), "expected quoted hash to be kept, got {:?}", a.private_key);
    Ok(())
}

#[test]
fn parse_treats_empty_port_as_absent() -> Result<()> {
    let hosts = parse("[app]\np1 ansible_port=\n", "hosts")?;

    assert_eq!(hosts.get(0).expect("host p1 exists").port, None);
    Ok(())
}

#[test]
fn parse_errors_name_source_and_line() {
    let cases = [
        ("[app]\nh1\n[app:bogus]\n", "hosts:3:"),
        ("[app\n", "hosts:1:"),
        ("[app]\nh1 novalue\n", "hosts:2:"),
        ("[app]\nh1 ansible_user=\"open\n", "hosts:2:"),
        ("[app:vars]\njustakey\n", "hosts:2:"),
    ];
    for (content, location) in cases {
        let err = parse(content, "hosts").expect_err("expected malformed inventory to fail");
        assert!(
            matches!(&err, SuperviseError::Inventory(msg) if msg.starts_with(location)),
            "expected inventory error at {}, got {:?}",
            location,
            err
        );
    }
}

#[test]
fn parse_rejects_invalid_port() {
    let err = parse("[app]\nh1 ansible_port=http\n", "hosts").expect_err("expected invalid port to fail");

    assert!(
        matches!(&err, SuperviseError::Inventory(msg) if msg.contains("h1") && msg.contains("http")),
        "expected inventory error naming the host & port, got {:?}",
        err
    );
}

#[test]
fn parse_rejects_unsupported_connection() {
    let err = parse("[app]\nh1 ansible_connection=docker\n", "hosts").expect_err("expected unsupported connection to fail");

    assert!(matches!(err, SuperviseError::Inventory(_)), "expected inventory error, got {:?}", err);
}
