//! Live view of published ports, read from the container runtime.
//!
//! Nothing downstream reads `container_ports`; it exists to cross-check the
//! compose-derived tables against what is actually running.

pub mod docker;

pub use docker::{ContainerRuntime, ContainerSnapshot, DockerRuntime, ObservedBinding};

use portdump_core::{is_convention_key, parse_port, split_env_entry, PortdumpError, Result, HOST_MAPPING_PREFIX, PORT_MAPPING_PREFIX};
use ports_sqlite::{ContainerPortRecord, ContainerPortWriter, Db, WriteStats};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info};

const PROTOCOLS: [&str; 2] = ["tcp", "udp"];

/// Bound to every interface.
fn is_wildcard(host_ip: Option<&str>) -> bool {
    matches!(host_ip.map(str::trim), None | Some("") | Some("0.0.0.0"))
}

/// Record for a wildcard TCP/UDP binding; anything else is ignored.
fn binding_record(container: &str, binding: &ObservedBinding) -> Option<ContainerPortRecord> {
    if !is_wildcard(binding.host_ip.as_deref()) {
        debug!(container, port = %binding.container_port, ip = ?binding.host_ip, "binding not on wildcard address");
        return None;
    }
    let (port, proto) = binding.container_port.split_once('/').unwrap_or((binding.container_port.as_str(), "tcp"));
    let proto = proto.to_ascii_lowercase();
    if !PROTOCOLS.contains(&proto.as_str()) {
        debug!(container, port = %binding.container_port, "unsupported protocol");
        return None;
    }
    let internal = parse_port(port).ok()?;
    let external = parse_port(binding.host_port.as_deref().unwrap_or("")).ok()?;
    Some(ContainerPortRecord::binding(container, internal, external, &proto))
}

/// Every record one container contributes: bindings first, then convention variables.
pub fn snapshot_records(snapshot: &ContainerSnapshot) -> Vec<ContainerPortRecord> {
    let mut records: Vec<ContainerPortRecord> = snapshot
        .bindings
        .iter()
        .filter_map(|b| binding_record(&snapshot.name, b))
        .collect();
    for entry in &snapshot.env {
        let Some((key, value)) = split_env_entry(entry) else { continue };
        if is_convention_key(key, HOST_MAPPING_PREFIX) || is_convention_key(key, PORT_MAPPING_PREFIX) {
            records.push(ContainerPortRecord::mapping(&snapshot.name, key, value));
        }
    }
    records
}

pub fn container_records(snapshots: &[ContainerSnapshot]) -> Vec<ContainerPortRecord> {
    snapshots.iter().flat_map(snapshot_records).collect()
}

/// Ask the runtime for its running containers, giving up after `timeout_secs`.
pub async fn fetch_running<R: ContainerRuntime>(runtime: &R, timeout_secs: u64) -> Result<Vec<ContainerSnapshot>> {
    match timeout(Duration::from_secs(timeout_secs), runtime.running_containers()).await {
        Ok(result) => result,
        Err(_) => Err(PortdumpError::RuntimeUnavailable(format!(
            "no answer from the container runtime within {timeout_secs}s"
        ))),
    }
}

/// Write every record in batches of `batch_size`.
pub fn record(db: &mut Db, snapshots: &[ContainerSnapshot], batch_size: usize) -> Result<WriteStats> {
    let mut writer = ContainerPortWriter::new(db, batch_size);
    for rec in container_records(snapshots) {
        writer.push(rec)?;
    }
    let stats = writer.finish()?;
    info!(
        containers = snapshots.len(),
        rows = stats.written,
        batches = stats.flushes,
        "container ports recorded"
    );
    Ok(stats)
}
