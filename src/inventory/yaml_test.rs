use anyhow::Result;

use super::yaml::parse;
use crate::error::SuperviseError;
use crate::transport::TransportKind;

const INVENTORY_YAML: &str = r#"
all:
  vars:
    ansible_user: root
  hosts:
    bastion:
  children:
    appservers:
      vars:
        ansible_ssh_private_key_file: /keys/app
      hosts:
        zeta:
          ansible_host: 10.0.0.9
        alpha:
          ansible_host: 10.0.0.1
          ansible_port: 2200
        win1:
          ansible_host: 10.0.0.5
          ansible_connection: winrm
          ansible_password: hunter2
          ansible_user: Administrator
    databases:
      hosts:
        db1:
          ansible_port: ""
"#;

#[test]
fn parse_preserves_declaration_order() -> Result<()> {
    let hosts = parse(INVENTORY_YAML, "hosts.yml")?;

    assert_eq!(
        hosts.names(),
        vec!["bastion", "zeta", "alpha", "win1", "db1"],
        "unexpected host order {:?}",
        hosts.names()
    );
    let app = hosts.select("appservers")?;
    assert_eq!(app.names(), vec!["zeta", "alpha", "win1"], "unexpected selection {:?}", app.names());
    Ok(())
}

#[test]
fn parse_merges_vars_down_the_tree() -> Result<()> {
    let hosts = parse(INVENTORY_YAML, "hosts.yml")?;

    let alpha = hosts.get(2).expect("host alpha exists");
    assert_eq!(alpha.address, "10.0.0.1");
    assert_eq!(alpha.port, Some(2200), "expected numeric port to be read, got {:?}", alpha.port);
    assert_eq!(alpha.user.as_deref(), Some("root"), "expected all vars to apply, got {:?}", alpha.user);
    assert_eq!(alpha.private_key.as_deref(), Some("/keys/app"));
    assert!(alpha.in_group("appservers") && alpha.in_group("all"), "unexpected groups {:?}", alpha.groups);

    let win1 = hosts.get(3).expect("host win1 exists");
    assert_eq!(win1.transport, Some(TransportKind::WinRm));
    assert_eq!(win1.user.as_deref(), Some("Administrator"));
    assert_eq!(win1.password.as_deref(), Some("hunter2"));

    let bastion = hosts.get(0).expect("host bastion exists");
    assert_eq!(bastion.address, "bastion", "expected address to default to the name, got {}", bastion.address);
    assert_eq!(bastion.private_key, None);

    let db1 = hosts.get(4).expect("host db1 exists");
    assert_eq!(db1.port, None, "expected empty port to be absent, got {:?}", db1.port);
    Ok(())
}

#[test]
fn parse_null_document_is_empty_inventory() -> Result<()> {
    let hosts = parse("~\n", "hosts.yml")?;

    assert!(hosts.is_empty(), "expected no hosts, got {:?}", hosts.names());
    Ok(())
}

#[test]
fn parse_rejects_malformed_documents() {
    let cases = [
        "- just\n- a list\n",
        "all:\n  hosts: [a, b]\n",
        "all:\n  hosts:\n    a: not-a-mapping\n",
        "all: [\n",
        "all:\n  hosts:\n    a:\n      ansible_port: [1]\n",
    ];
    for content in cases {
        let err = parse(content, "hosts.yml").expect_err("expected malformed inventory to fail");
        assert!(
            matches!(&err, SuperviseError::Inventory(msg) if msg.starts_with("hosts.yml")),
            "expected inventory error naming the file for {:?}, got {:?}",
            content,
            err
        );
    }
}
