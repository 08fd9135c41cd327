//! Ansible INI inventory reader.

use std::collections::BTreeMap;

use crate::error::{SuperviseError, SuperviseResult};
use crate::inventory::{HostSet, InventoryBuilder, GROUP_UNGROUPED};

/// The kind of section currently being read.
enum Section {
    Hosts(String),
    Vars(String),
    Children(String),
}

/// Parse the given INI inventory content.
pub(super) fn parse(content: &str, source: &str) -> SuperviseResult<HostSet> {
    let mut builder = InventoryBuilder::new(source);
    let mut section = Section::Hosts(GROUP_UNGROUPED.to_string());
    for (idx, raw) in content.lines().enumerate() {
        let lineno = idx + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        let err = |msg: &str| SuperviseError::Inventory(format!("{}:{}: {}", source, lineno, msg));

        if line.starts_with('[') {
            let header = line
                .strip_prefix('[')
                .and_then(|rest| rest.strip_suffix(']'))
                .map(str::trim)
                .filter(|header| !header.is_empty())
                .ok_or_else(|| err("malformed section header"))?;
            section = match header.split_once(':') {
                None => Section::Hosts(header.to_string()),
                Some((group, "vars")) => Section::Vars(group.to_string()),
                Some((group, "children")) => Section::Children(group.to_string()),
                Some((_, other)) => return Err(err(&format!("unknown section suffix ':{}'", other))),
            };
            continue;
        }

        match &section {
            Section::Hosts(group) => {
                let mut tokens = tokenize(line).map_err(|msg| err(&msg))?.into_iter();
                let host = tokens.next().ok_or_else(|| err("expected a host name"))?;
                let mut vars = BTreeMap::new();
                for token in tokens {
                    let (key, val) = token
                        .split_once('=')
                        .ok_or_else(|| err(&format!("expected key=value, got '{}'", token)))?;
                    vars.insert(key.to_string(), val.to_string());
                }
                builder.add_host(group, &host, vars);
            }
            Section::Vars(group) => {
                let line = strip_comment(line);
                if line.is_empty() {
                    continue;
                }
                let (key, val) = line
                    .split_once('=')
                    .ok_or_else(|| err(&format!("expected key=value, got '{}'", line)))?;
                builder.add_group_var(group, key.trim(), &unquote(val.trim()));
            }
            Section::Children(group) => {
                let child = strip_comment(line);
                if !child.is_empty() {
                    builder.add_child(group, child);
                }
            }
        }
    }
    builder.build()
}

/// Split a host line into whitespace separated tokens, honoring single & double quotes.
fn tokenize(line: &str) -> Result<Vec<String>, String> {
    let mut tokens = vec![];
    let mut current = String::new();
    let mut quote: Option<char> = None;
    for ch in line.chars() {
        match (quote, ch) {
            (Some(q), ch) if ch == q => quote = None,
            (Some(_), ch) => current.push(ch),
            (None, '"') | (None, '\'') => quote = Some(ch),
            // Anything following an unquoted `#` is a trailing comment.
            (None, '#') => break,
            (None, ch) if ch.is_whitespace() => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            (None, ch) => current.push(ch),
        }
    }
    if let Some(q) = quote {
        return Err(format!("unterminated {} quote", q));
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    Ok(tokens)
}

/// Cut a line at its first unquoted `#`, which starts a trailing comment.
fn strip_comment(line: &str) -> &str {
    let mut quote: Option<char> = None;
    for (idx, ch) in line.char_indices() {
        match (quote, ch) {
            (Some(q), ch) if ch == q => quote = None,
            (Some(_), _) => (),
            (None, '"') | (None, '\'') => quote = Some(ch),
            (None, '#') => return line[..idx].trim_end(),
            (None, _) => (),
        }
    }
    line
}

/// Strip one level of matching quotes from a value.
fn unquote(val: &str) -> String {
    for q in ['"', '\''] {
        if val.len() >= 2 && val.starts_with(q) && val.ends_with(q) {
            return val[1..val.len() - 1].to_string();
        }
    }
    val.to_string()
}
