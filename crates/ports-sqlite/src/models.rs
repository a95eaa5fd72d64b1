use portdump_core::Port;
use serde::{Deserialize, Serialize};

/// One `service_info` row: a (service, port declaration) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRow {
    pub service_name: String,
    pub external_port: Option<Port>,
    pub internal_port: Option<Port>,
    pub has_port_mapping: bool,
    /// Attributed application; `None` is stored as the display value `N/A`.
    pub mapped_app: Option<String>,
}

impl ServiceRow {
    /// A concrete `HOST:CONTAINER` binding.
    pub fn direct(service: &str, external: Port, internal: Port) -> Self {
        ServiceRow {
            service_name: service.to_string(),
            external_port: Some(external),
            internal_port: Some(internal),
            has_port_mapping: false,
            mapped_app: None,
        }
    }

    /// A service reached through another container's port (`port.mapping*`).
    pub fn convention(service: &str, raw_value: &str) -> Self {
        ServiceRow {
            service_name: service.to_string(),
            external_port: None,
            internal_port: None,
            has_port_mapping: false,
            mapped_app: Some(raw_value.to_string()),
        }
    }

    /// A service that declares no port at all.
    pub fn placeholder(service: &str) -> Self {
        ServiceRow {
            service_name: service.to_string(),
            external_port: None,
            internal_port: None,
            has_port_mapping: false,
            mapped_app: None,
        }
    }
}

/// One `port_mappings` row: every service routed through a shared external port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMappingRow {
    pub external_port: Port,
    /// Service names in discovery order.
    pub services: Vec<String>,
}

impl PortMappingRow {
    pub const SEPARATOR: &'static str = ", ";

    pub fn mapping_values(&self) -> String {
        self.services.join(Self::SEPARATOR)
    }

    pub fn from_mapping_values(external_port: Port, mapping_values: &str) -> Self {
        let services = mapping_values
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        PortMappingRow { external_port, services }
    }

    /// The first service that claimed this port.
    pub fn primary_app(&self) -> Option<&str> {
        self.services.first().map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostNetworkingRow {
    pub service_name: String,
}

/// One `container_ports` row observed on a running container.
///
/// Either the port/protocol columns or the mapping columns are populated, never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerPortRecord {
    pub container_name: String,
    pub internal_port: Option<Port>,
    pub external_port: Option<Port>,
    pub mapping_name: Option<String>,
    pub mapping_value: Option<String>,
    pub protocol: Option<String>,
}

impl ContainerPortRecord {
    pub fn binding(container: &str, internal: Port, external: Port, protocol: &str) -> Self {
        ContainerPortRecord {
            container_name: container.to_string(),
            internal_port: Some(internal),
            external_port: Some(external),
            mapping_name: None,
            mapping_value: None,
            protocol: Some(protocol.to_string()),
        }
    }

    pub fn mapping(container: &str, name: &str, value: &str) -> Self {
        ContainerPortRecord {
            container_name: container.to_string(),
            internal_port: None,
            external_port: None,
            mapping_name: Some(name.to_string()),
            mapping_value: Some(value.to_string()),
            protocol: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCounts {
    pub service_info: i64,
    pub port_mappings: i64,
    pub host_networking: i64,
    pub container_ports: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapping_values_round_trip_keeps_order() {
        let row = PortMappingRow {
            external_port: 9000,
            services: vec!["qbittorrent".to_string(), "prowlarr".to_string()],
        };
        assert_eq!(row.mapping_values(), "qbittorrent, prowlarr");
        let back = PortMappingRow::from_mapping_values(9000, &row.mapping_values());
        assert_eq!(back, row);
        assert_eq!(back.primary_app(), Some("qbittorrent"));
    }

    #[test]
    fn empty_mapping_has_no_primary_app() {
        let row = PortMappingRow::from_mapping_values(1, "");
        assert!(row.primary_app().is_none());
    }
}
