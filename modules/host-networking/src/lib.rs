//! Services sharing the host's network namespace, and their `host.mapping*` ports.

use compose_ports::ComposeDocument;
use portdump_core::{convention_value, parse_port, PortdumpError, Result, HOST_MAPPING_PREFIX, HOST_NETWORK_MODE, HOST_SERVICE_NAME};
use ports_sqlite::{Db, InsertOutcome, ServiceRow};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostNetworkingScan {
    /// Services with `network_mode: host`, in document order.
    pub host_mode_services: Vec<String>,
    /// `service_info` rows tagged `host`, one per declared host port.
    pub host_mapping_rows: Vec<ServiceRow>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostNetworkingOutcome {
    pub host_networking: InsertOutcome,
    pub host_mappings: InsertOutcome,
}

fn host_mapping_row(service: &str, port: u16) -> ServiceRow {
    ServiceRow {
        service_name: HOST_SERVICE_NAME.to_string(),
        external_port: Some(port),
        internal_port: Some(port),
        has_port_mapping: true,
        mapped_app: Some(service.to_string()),
    }
}

/// Collect host-mode services and `host.mapping*` declarations. The mapping
/// convention is read from every service, whatever its network mode.
pub fn scan_documents(documents: &[ComposeDocument]) -> Result<HostNetworkingScan> {
    let mut scan = HostNetworkingScan::default();
    for doc in documents {
        for service in &doc.services {
            if service.network_mode.as_deref() == Some(HOST_NETWORK_MODE) {
                scan.host_mode_services.push(service.name.clone());
            }
            for entry in service.convention_values(HOST_MAPPING_PREFIX) {
                let Some(raw) = convention_value(entry.value.as_deref()) else {
                    debug!(service = %service.name, key = %entry.key, "host mapping without a value ignored");
                    continue;
                };
                let port = parse_port(raw).map_err(|reason| PortdumpError::PortDeclarationMalformed {
                    path: doc.path.clone(),
                    service: service.name.clone(),
                    value: format!("{}={raw}", entry.key),
                    reason,
                })?;
                scan.host_mapping_rows.push(host_mapping_row(&service.name, port));
            }
        }
    }
    Ok(scan)
}

/// Write both host-networking views. Repeated declarations are logged and skipped.
pub fn record(db: &mut Db, scan: &HostNetworkingScan) -> Result<HostNetworkingOutcome> {
    let host_networking = db.insert_host_networking(&scan.host_mode_services)?;
    let host_mappings = db.insert_service_rows(&scan.host_mapping_rows)?;
    if host_networking.skipped + host_mappings.skipped > 0 {
        warn!(
            services = host_networking.skipped,
            mappings = host_mappings.skipped,
            "duplicate host networking declarations skipped"
        );
    }
    info!(
        services = host_networking.inserted,
        mappings = host_mappings.inserted,
        "host networking recorded"
    );
    Ok(HostNetworkingOutcome { host_networking, host_mappings })
}

#[cfg(test)]
mod tests {
    use super::*;
    use compose_ports::parse_document;
    use std::path::Path;

    fn doc(text: &str) -> ComposeDocument {
        parse_document(Path::new("compose.yml"), text).unwrap()
    }

    const SAMPLE: &str = r#"
services:
  homeassistant:
    network_mode: host
    environment:
      - host.mapping=8123
  pihole:
    network_mode: host
  plex:
    environment:
      - host.mapping=32400
      - host.mapping2=
      - host.mapping3
"#;

    #[test]
    fn host_mode_services_in_order() {
        let scan = scan_documents(&[doc(SAMPLE)]).unwrap();
        assert_eq!(scan.host_mode_services, vec!["homeassistant", "pihole"]);
    }

    #[test]
    fn host_mappings_read_regardless_of_network_mode() {
        let scan = scan_documents(&[doc(SAMPLE)]).unwrap();
        assert_eq!(scan.host_mapping_rows, vec![host_mapping_row("homeassistant", 8123), host_mapping_row("plex", 32400)]);
        let row = &scan.host_mapping_rows[1];
        assert_eq!(row.service_name, "host");
        assert_eq!(row.external_port, row.internal_port);
        assert!(row.has_port_mapping);
    }

    #[test]
    fn bad_host_mapping_value_is_malformed() {
        let d = doc("services:\n  a:\n    environment: [\"host.mapping=web\"]\n");
        assert!(matches!(scan_documents(&[d]), Err(PortdumpError::PortDeclarationMalformed { .. })));
    }

    #[test]
    fn duplicate_declaration_keeps_one_row() {
        let d = doc("services:\n  plex:\n    environment:\n      - host.mapping=32400\n      - host.mapping2=32400\n");
        let scan = scan_documents(&[d]).unwrap();
        assert_eq!(scan.host_mapping_rows.len(), 2);
        let mut db = Db::open_in_memory().unwrap();
        let out = record(&mut db, &scan).unwrap();
        assert_eq!(out.host_mappings, InsertOutcome { inserted: 1, skipped: 1 });
        let rows = db.service_info().unwrap();
        assert_eq!(rows, vec![host_mapping_row("plex", 32400)]);
    }

    #[test]
    fn same_service_in_two_documents_is_listed_once() {
        let a = doc("services:\n  pihole:\n    network_mode: host\n");
        let b = doc("services:\n  pihole:\n    network_mode: host\n");
        let scan = scan_documents(&[a, b]).unwrap();
        let mut db = Db::open_in_memory().unwrap();
        let out = record(&mut db, &scan).unwrap();
        assert_eq!(out.host_networking.inserted, 1);
        assert_eq!(db.host_networking().unwrap().len(), 1);
    }
}
