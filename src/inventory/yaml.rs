//! Ansible YAML inventory reader.
//!
//! YAML mappings preserve declaration order, which is the order used for the resulting `HostSet`.

use std::collections::BTreeMap;

use serde_yaml::{Mapping, Value};

use crate::error::{SuperviseError, SuperviseResult};
use crate::inventory::{HostSet, InventoryBuilder};

/// Parse the given YAML inventory content.
pub(super) fn parse(content: &str, source: &str) -> SuperviseResult<HostSet> {
    let root: Value =
        serde_yaml::from_str(content).map_err(|err| SuperviseError::Inventory(format!("{}: malformed YAML inventory: {}", source, err)))?;
    let mut builder = InventoryBuilder::new(source);
    match root {
        Value::Null => (),
        Value::Mapping(groups) => {
            for (name, group) in groups.iter() {
                let name = scalar(name, source)?;
                walk_group(&mut builder, &name, group, source)?;
            }
        }
        _ => return Err(SuperviseError::Inventory(format!("{}: expected a mapping of groups at the top level", source))),
    }
    builder.build()
}

/// Walk a group definition, recording its hosts, vars and children.
fn walk_group(builder: &mut InventoryBuilder, group: &str, def: &Value, source: &str) -> SuperviseResult<()> {
    let def = match def {
        Value::Null => return Ok(()),
        Value::Mapping(def) => def,
        _ => return Err(SuperviseError::Inventory(format!("{}: group '{}' must be a mapping", source, group))),
    };

    if let Some(hosts) = section(def, "hosts", group, source)? {
        for (host, vars) in hosts.iter() {
            let host = scalar(host, source)?;
            let vars = match vars {
                Value::Null => BTreeMap::new(),
                Value::Mapping(vars) => string_map(vars, source)?,
                _ => return Err(SuperviseError::Inventory(format!("{}: vars of host '{}' must be a mapping", source, host))),
            };
            builder.add_host(group, &host, vars);
        }
    }
    if let Some(vars) = section(def, "vars", group, source)? {
        for (key, val) in string_map(vars, source)? {
            builder.add_group_var(group, &key, &val);
        }
    }
    if let Some(children) = section(def, "children", group, source)? {
        for (child, child_def) in children.iter() {
            let child = scalar(child, source)?;
            builder.add_child(group, &child);
            walk_group(builder, &child, child_def, source)?;
        }
    }
    Ok(())
}

/// Get an optional mapping section of a group definition.
fn section<'a>(def: &'a Mapping, key: &str, group: &str, source: &str) -> SuperviseResult<Option<&'a Mapping>> {
    match def.get(&Value::String(key.into())) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Mapping(map)) => Ok(Some(map)),
        Some(_) => Err(SuperviseError::Inventory(format!("{}: '{}' of group '{}' must be a mapping", source, key, group))),
    }
}

fn string_map(map: &Mapping, source: &str) -> SuperviseResult<BTreeMap<String, String>> {
    map.iter().map(|(key, val)| Ok((scalar(key, source)?, scalar(val, source)?))).collect()
}

/// Render a scalar YAML value as a string.
fn scalar(val: &Value, source: &str) -> SuperviseResult<String> {
    match val {
        Value::Null => Ok(String::new()),
        Value::Bool(val) => Ok(val.to_string()),
        Value::Number(val) => Ok(val.to_string()),
        Value::String(val) => Ok(val.clone()),
        _ => Err(SuperviseError::Inventory(format!("{}: expected a scalar value, got {:?}", source, val))),
    }
}
