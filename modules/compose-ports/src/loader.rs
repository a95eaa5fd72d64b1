//! Reads compose documents into an ordered service map.

use portdump_core::{PortdumpError, Result, SourceLocation};
use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, error};

/// A parsed compose document. Services keep their declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposeDocument {
    pub path: PathBuf,
    pub services: Vec<ComposeService>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComposeService {
    pub name: String,
    /// `None` when the service has no `ports:` key.
    pub ports: Option<Vec<PortEntry>>,
    pub environment: Vec<EnvEntry>,
    pub network_mode: Option<String>,
}

/// One item of a service's `ports:` list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortEntry {
    /// `"HOST:CONTAINER[/proto]"` or `"IP:HOST:CONTAINER[/proto]"`.
    Short(String),
    /// `{ target, published, protocol }`.
    Long {
        published: Option<String>,
        target: Option<String>,
        protocol: Option<String>,
    },
}

impl PortEntry {
    /// Source text for log and error messages.
    pub fn describe(&self) -> String {
        match self {
            PortEntry::Short(s) => s.clone(),
            PortEntry::Long { published, target, protocol } => format!(
                "published={} target={} protocol={}",
                published.as_deref().unwrap_or("-"),
                target.as_deref().unwrap_or("-"),
                protocol.as_deref().unwrap_or("-"),
            ),
        }
    }
}

/// One `environment:` variable. `value` is `None` for pass-through entries (`- KEY`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvEntry {
    pub key: String,
    pub value: Option<String>,
}

impl ComposeService {
    /// Values of every environment variable whose key starts with `prefix`.
    pub fn convention_values<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a EnvEntry> + 'a {
        self.environment
            .iter()
            .filter(move |e| portdump_core::is_convention_key(&e.key, prefix))
    }

    /// True when the service declares at least one concrete port binding.
    pub fn has_direct_ports(&self) -> bool {
        self.ports.as_ref().is_some_and(|p| !p.is_empty())
    }
}

#[derive(Deserialize, Default)]
struct RawDocument {
    #[serde(default)]
    services: Option<Mapping>,
}

#[derive(Deserialize, Default)]
struct RawService {
    #[serde(default)]
    ports: Option<Vec<Value>>,
    #[serde(default)]
    environment: Option<Value>,
    #[serde(default)]
    network_mode: Option<String>,
}

/// Read and parse the compose document at `path`.
pub fn load(path: &Path) -> Result<ComposeDocument> {
    let text = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => PortdumpError::DocumentNotFound { path: path.to_path_buf() },
        ErrorKind::PermissionDenied => PortdumpError::DocumentPermissionDenied { path: path.to_path_buf() },
        _ => PortdumpError::DocumentMalformed {
            path: path.to_path_buf(),
            location: None,
            reason: e.to_string(),
        },
    })?;
    let doc = parse_document(path, &text)?;
    debug!(path = %path.display(), services = doc.services.len(), "compose document loaded");
    Ok(doc)
}

/// Check every configured path exists before anything is written.
pub fn check_documents(paths: &[PathBuf]) -> Vec<PortdumpError> {
    paths
        .iter()
        .filter(|p| !p.exists())
        .map(|p| {
            error!(path = %p.display(), "configured compose document does not exist");
            PortdumpError::DocumentNotFound { path: p.clone() }
        })
        .collect()
}

pub fn parse_document(path: &Path, text: &str) -> Result<ComposeDocument> {
    let malformed = |location: Option<SourceLocation>, reason: String| PortdumpError::DocumentMalformed {
        path: path.to_path_buf(),
        location,
        reason,
    };

    let mut tree: Value = serde_yaml::from_str(text).map_err(|e| {
        let location = e.location().map(|loc| SourceLocation {
            line: loc.line(),
            column: loc.column(),
            snippet: text
                .lines()
                .nth(loc.line().saturating_sub(1))
                .map(|l| l.trim().to_string()),
        });
        malformed(location, e.to_string())
    })?;
    // `<<: *anchor` blocks carry ports and environment too
    tree.apply_merge()
        .map_err(|e| malformed(None, format!("merge key: {e}")))?;
    let raw: RawDocument = match tree {
        Value::Null => RawDocument::default(),
        tree => serde_yaml::from_value(tree).map_err(|e| malformed(None, e.to_string()))?,
    };

    let mut services = Vec::new();
    for (key, value) in raw.services.unwrap_or_default() {
        let name = match key {
            Value::String(s) => s,
            other => return Err(malformed(None, format!("service name must be a string, got {other:?}"))),
        };
        let raw_service: RawService = match value {
            Value::Null => RawService::default(),
            v @ Value::Mapping(_) => serde_yaml::from_value(v)
                .map_err(|e| malformed(None, format!("service '{name}': {e}")))?,
            other => return Err(malformed(None, format!("service '{name}' must be a mapping, got {other:?}"))),
        };
        let ports = raw_service
            .ports
            .map(|entries| entries.into_iter().map(port_entry).collect::<std::result::Result<Vec<_>, _>>())
            .transpose()
            .map_err(|reason| malformed(None, format!("service '{name}': {reason}")))?;
        let environment = match raw_service.environment {
            None | Some(Value::Null) => Vec::new(),
            Some(env) => environment(env).map_err(|reason| malformed(None, format!("service '{name}': {reason}")))?,
        };
        services.push(ComposeService { name, ports, environment, network_mode: raw_service.network_mode });
    }

    Ok(ComposeDocument { path: path.to_path_buf(), services })
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn port_entry(value: Value) -> std::result::Result<PortEntry, String> {
    match value {
        Value::String(s) => Ok(PortEntry::Short(s)),
        Value::Number(n) => Ok(PortEntry::Short(n.to_string())),
        Value::Mapping(m) => {
            let field = |name: &str| m.get(name).and_then(scalar);
            Ok(PortEntry::Long {
                published: field("published"),
                target: field("target"),
                protocol: field("protocol"),
            })
        }
        other => Err(format!("unsupported ports entry {other:?}")),
    }
}

fn environment(value: Value) -> std::result::Result<Vec<EnvEntry>, String> {
    match value {
        Value::Sequence(items) => items
            .iter()
            .map(|item| {
                let text = scalar(item).ok_or_else(|| format!("unsupported environment entry {item:?}"))?;
                Ok(match portdump_core::split_env_entry(&text) {
                    Some((k, v)) => EnvEntry { key: k.trim().to_string(), value: Some(v.to_string()) },
                    None => EnvEntry { key: text.trim().to_string(), value: None },
                })
            })
            .collect(),
        Value::Mapping(map) => map
            .iter()
            .map(|(k, v)| {
                let key = scalar(k).ok_or_else(|| format!("unsupported environment key {k:?}"))?;
                let value = match v {
                    Value::Null => None,
                    other => Some(scalar(other).ok_or_else(|| format!("unsupported value for {key}: {other:?}"))?),
                };
                Ok(EnvEntry { key, value })
            })
            .collect(),
        other => Err(format!("environment must be a list or mapping, got {other:?}")),
    }
}
