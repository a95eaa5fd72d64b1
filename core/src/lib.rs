//! Core utilities and shared types for the port-dump pipeline.

pub mod config;
pub mod error;

pub use config::{RunConfig, RuntimeConfig};
pub use error::{PortdumpError, Result, SourceLocation};

/// Environment-variable prefix that attaches a service to a port forwarded by another container.
pub const PORT_MAPPING_PREFIX: &str = "port.mapping";

/// Environment-variable prefix that declares a port exposed directly on the host.
pub const HOST_MAPPING_PREFIX: &str = "host.mapping";

/// Network mode value that shares the host's network namespace.
pub const HOST_NETWORK_MODE: &str = "host";

/// `service_info.service_name` used for rows declared through `host.mapping*`.
pub const HOST_SERVICE_NAME: &str = "host";

pub const fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// A host or container port number.
pub type Port = u16;

/// Parse a port number, tolerating surrounding whitespace. Zero is rejected.
pub fn parse_port(raw: &str) -> std::result::Result<Port, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("empty port".to_string());
    }
    let port: Port = trimmed
        .parse()
        .map_err(|_| format!("not a port number: {trimmed:?}"))?;
    if port == 0 {
        return Err("port 0 is not a valid binding".to_string());
    }
    Ok(port)
}

/// Split a `KEY=VALUE` environment entry on the first `=`.
pub fn split_env_entry(entry: &str) -> Option<(&str, &str)> {
    entry.split_once('=')
}

/// True when `key` follows the given naming convention (`port.mapping`, `port.mapping2`, ...).
pub fn is_convention_key(key: &str, prefix: &str) -> bool {
    key.starts_with(prefix)
}

/// Value of a convention variable. Bare (`- port.mapping`) and blank entries carry no port.
pub fn convention_value(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
