//! Static port extraction: direct `ports:` bindings and `port.mapping*` conventions.

use crate::loader::{ComposeDocument, ComposeService, PortEntry};
use portdump_core::{convention_value, parse_port, Port, PortdumpError, Result, PORT_MAPPING_PREFIX};
use ports_sqlite::{Db, InsertOutcome, PortMappingRow, ServiceRow};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// Both static views of the configured documents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticExtraction {
    pub port_mappings: Vec<PortMappingRow>,
    pub service_rows: Vec<ServiceRow>,
}

/// Groups services by the external port they are routed through, first-seen order.
#[derive(Debug, Default)]
pub struct PortAggregator {
    groups: Vec<PortMappingRow>,
    index: HashMap<Port, usize>,
}

impl PortAggregator {
    pub fn add(&mut self, port: Port, service: &str) {
        match self.index.get(&port) {
            Some(&i) => {
                let group = &mut self.groups[i];
                if !group.services.iter().any(|s| s == service) {
                    group.services.push(service.to_string());
                }
            }
            None => {
                self.index.insert(port, self.groups.len());
                self.groups.push(PortMappingRow { external_port: port, services: vec![service.to_string()] });
            }
        }
    }

    pub fn into_rows(self) -> Vec<PortMappingRow> {
        self.groups
    }
}

/// Split a short-syntax binding into `(host, container)` ports.
pub fn parse_short_binding(binding: &str) -> std::result::Result<(Port, Port), String> {
    let without_proto = match binding.rsplit_once('/') {
        Some((ports, _proto)) => ports,
        None => binding,
    };
    let (host_side, container) = without_proto
        .rsplit_once(':')
        .ok_or_else(|| "expected HOST:CONTAINER, missing ':'".to_string())?;
    // `IP:HOST:CONTAINER` carries the bind address in front.
    let host = match host_side.rsplit_once(':') {
        Some((_ip, host)) => host,
        None => host_side,
    };
    let external = parse_port(host).map_err(|e| format!("host port: {e}"))?;
    let internal = parse_port(container).map_err(|e| format!("container port: {e}"))?;
    Ok((external, internal))
}

pub fn parse_port_entry(entry: &PortEntry) -> std::result::Result<(Port, Port), String> {
    match entry {
        PortEntry::Short(binding) => parse_short_binding(binding),
        PortEntry::Long { published, target, .. } => {
            let published = published.as_deref().ok_or("no published host port")?;
            let target = target.as_deref().ok_or("no target container port")?;
            let external = parse_port(published).map_err(|e| format!("published: {e}"))?;
            let internal = parse_port(target).map_err(|e| format!("target: {e}"))?;
            Ok((external, internal))
        }
    }
}

fn malformed(path: &Path, service: &str, value: String, reason: String) -> PortdumpError {
    PortdumpError::PortDeclarationMalformed {
        path: path.to_path_buf(),
        service: service.to_string(),
        value,
        reason,
    }
}

/// `(raw value, port)` for every `port.mapping*` variable of `service` that has a value.
fn convention_ports(path: &Path, service: &ComposeService) -> Result<Vec<(String, Port)>> {
    let mut ports = Vec::new();
    for entry in service.convention_values(PORT_MAPPING_PREFIX) {
        let Some(raw) = convention_value(entry.value.as_deref()) else {
            debug!(service = %service.name, key = %entry.key, "port mapping without a value ignored");
            continue;
        };
        let port = parse_port(raw)
            .map_err(|reason| malformed(path, &service.name, format!("{}={raw}", entry.key), reason))?;
        ports.push((raw.to_string(), port));
    }
    Ok(ports)
}

/// Rows for one service. Direct bindings win over convention variables; a
/// service with neither still gets one placeholder row.
pub fn service_rows(path: &Path, service: &ComposeService) -> Result<Vec<ServiceRow>> {
    if service.has_direct_ports() {
        let entries = service.ports.as_deref().unwrap_or_default();
        let mut rows = Vec::with_capacity(entries.len());
        for entry in entries {
            let (external, internal) = parse_port_entry(entry)
                .map_err(|reason| malformed(path, &service.name, entry.describe(), reason))?;
            debug!(service = %service.name, external, internal, "direct port binding");
            rows.push(ServiceRow::direct(&service.name, external, internal));
        }
        return Ok(rows);
    }

    let conventions = convention_ports(path, service)?;
    if !conventions.is_empty() {
        return Ok(conventions
            .iter()
            .map(|(raw, _)| {
                debug!(service = %service.name, mapping = %raw, "convention port mapping");
                ServiceRow::convention(&service.name, raw)
            })
            .collect());
    }

    debug!(service = %service.name, "no port data; recording placeholder");
    Ok(vec![ServiceRow::placeholder(&service.name)])
}

/// Walk every document in order and build both static views.
pub fn extract_documents(documents: &[ComposeDocument]) -> Result<StaticExtraction> {
    let mut aggregator = PortAggregator::default();
    let mut service_info = Vec::new();
    for doc in documents {
        for service in &doc.services {
            if service.has_direct_ports() {
                if service.convention_values(PORT_MAPPING_PREFIX).next().is_some() {
                    warn!(
                        path = %doc.path.display(),
                        service = %service.name,
                        "service declares ports and port.mapping variables; using ports only"
                    );
                }
            } else {
                for (_, port) in convention_ports(&doc.path, service)? {
                    aggregator.add(port, &service.name);
                }
            }
            service_info.extend(service_rows(&doc.path, service)?);
        }
    }
    Ok(StaticExtraction { port_mappings: aggregator.into_rows(), service_rows: service_info })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StaticOutcome {
    pub port_mappings: InsertOutcome,
    pub service_info: InsertOutcome,
}

/// Write the aggregation, then the per-service rows; each commits on its own.
pub fn record(db: &mut Db, extraction: &StaticExtraction) -> Result<StaticOutcome> {
    let port_mappings = db.insert_port_mappings(&extraction.port_mappings)?;
    info!(rows = port_mappings.inserted, skipped = port_mappings.skipped, "port mappings stored");
    let service_info = db.insert_service_rows(&extraction.service_rows)?;
    info!(rows = service_info.inserted, skipped = service_info.skipped, "service rows stored");
    Ok(StaticOutcome { port_mappings, service_info })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::parse_document;

    fn doc(text: &str) -> ComposeDocument {
        parse_document(Path::new("compose.yml"), text).unwrap()
    }

    #[test]
    fn short_bindings() {
        assert_eq!(parse_short_binding("8080:80").unwrap(), (8080, 80));
        assert_eq!(parse_short_binding("51820:51820/udp").unwrap(), (51820, 51820));
        assert_eq!(parse_short_binding("127.0.0.1:8443:443/tcp").unwrap(), (8443, 443));
    }

    #[test]
    fn bad_short_bindings() {
        assert!(parse_short_binding("80").is_err());
        assert!(parse_short_binding("web:80").is_err());
        assert!(parse_short_binding("8000-8010:8000-8010").is_err());
        assert!(parse_short_binding("8080:").is_err());
    }

    #[test]
    fn direct_ports_yield_one_row_each() {
        let d = doc("services:\n  web:\n    ports: [\"8080:80\", \"8443:443/tcp\"]\n");
        let out = extract_documents(&[d]).unwrap();
        assert_eq!(out.service_rows, vec![ServiceRow::direct("web", 8080, 80), ServiceRow::direct("web", 8443, 443)]);
        assert!(out.port_mappings.is_empty());
    }

    #[test]
    fn service_without_ports_gets_placeholder() {
        let out = extract_documents(&[doc("services:\n  idle:\n    image: busybox\n")]).unwrap();
        assert_eq!(out.service_rows, vec![ServiceRow::placeholder("idle")]);
    }

    #[test]
    fn empty_ports_list_still_gets_placeholder() {
        let out = extract_documents(&[doc("services:\n  idle:\n    ports: []\n")]).unwrap();
        assert_eq!(out.service_rows, vec![ServiceRow::placeholder("idle")]);
    }

    #[test]
    fn shared_convention_port_merges_in_document_order() {
        let d = doc(
            "services:\n  a:\n    environment: [\"port.mapping=9000\"]\n  b:\n    environment: [\"port.mapping=9000\", \"port.mapping2=9001\"]\n",
        );
        let out = extract_documents(&[d]).unwrap();
        assert_eq!(
            out.port_mappings,
            vec![
                PortMappingRow { external_port: 9000, services: vec!["a".into(), "b".into()] },
                PortMappingRow { external_port: 9001, services: vec!["b".into()] },
            ]
        );
        assert_eq!(out.port_mappings[0].mapping_values(), "a, b");
        assert_eq!(
            out.service_rows,
            vec![
                ServiceRow::convention("a", "9000"),
                ServiceRow::convention("b", "9000"),
                ServiceRow::convention("b", "9001"),
            ]
        );
    }

    #[test]
    fn aggregation_spans_documents() {
        let first = doc("services:\n  a:\n    environment: [\"port.mapping=9000\"]\n");
        let second = doc("services:\n  c:\n    environment:\n      port.mapping: 9000\n");
        let out = extract_documents(&[first, second]).unwrap();
        assert_eq!(out.port_mappings.len(), 1);
        assert_eq!(out.port_mappings[0].services, vec!["a", "c"]);
    }

    #[test]
    fn direct_ports_take_priority_over_conventions() {
        let d = doc("services:\n  both:\n    ports: [\"8080:80\"]\n    environment: [\"port.mapping=9000\"]\n");
        let out = extract_documents(&[d]).unwrap();
        assert_eq!(out.service_rows, vec![ServiceRow::direct("both", 8080, 80)]);
        assert!(out.port_mappings.is_empty());
    }

    #[test]
    fn malformed_binding_is_fatal_with_context() {
        let d = doc("services:\n  web:\n    ports: [\"8080\"]\n");
        let err = extract_documents(&[d]).unwrap_err();
        match err {
            PortdumpError::PortDeclarationMalformed { service, value, .. } => {
                assert_eq!(service, "web");
                assert_eq!(value, "8080");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn non_numeric_convention_value_is_fatal() {
        let d = doc("services:\n  a:\n    environment: [\"port.mapping=http\"]\n");
        assert!(matches!(extract_documents(&[d]), Err(PortdumpError::PortDeclarationMalformed { .. })));
    }

    #[test]
    fn bare_port_mapping_is_ignored() {
        let d = doc("services:\n  a:\n    environment: [\"port.mapping\", \"port.mapping2=\"]\n");
        let out = extract_documents(&[d]).unwrap();
        assert!(out.port_mappings.is_empty());
        assert_eq!(out.service_rows, vec![ServiceRow::placeholder("a")]);
    }

    #[test]
    fn conventions_inherited_through_merge_keys_are_extracted() {
        let d = doc(
            "x-vpn-app: &vpnapp\n  environment:\n    - port.mapping=9000\nservices:\n  a:\n    <<: *vpnapp\n  b:\n    <<: *vpnapp\n    ports: [\"8080:80\"]\n",
        );
        let out = extract_documents(&[d]).unwrap();
        assert_eq!(out.port_mappings, vec![PortMappingRow { external_port: 9000, services: vec!["a".into()] }]);
        assert_eq!(
            out.service_rows,
            vec![ServiceRow::convention("a", "9000"), ServiceRow::direct("b", 8080, 80)]
        );
    }

    #[test]
    fn record_commits_both_views() {
        let d = doc("services:\n  a:\n    environment: [\"port.mapping=9000\"]\n  web:\n    ports: [\"80:80\"]\n");
        let out = extract_documents(&[d]).unwrap();
        let mut db = Db::open_in_memory().unwrap();
        let stored = record(&mut db, &out).unwrap();
        assert_eq!(stored.port_mappings.inserted, 1);
        assert_eq!(stored.service_info.inserted, 2);
        assert_eq!(db.port_mappings().unwrap(), out.port_mappings);
        assert_eq!(db.service_info().unwrap(), out.service_rows);
    }
}
