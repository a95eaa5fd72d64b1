use crate::schema::NOT_APPLICABLE;
use crate::{sql_error, ContainerPortRecord, Db, HostNetworkingRow, PortMappingRow, ServiceRow, TableCounts};
use portdump_core::{Port, Result};
use rusqlite::Row;

fn port_column(raw: Option<String>) -> Option<Port> {
    raw.and_then(|s| s.trim().parse().ok())
}

fn service_row(r: &Row<'_>) -> rusqlite::Result<ServiceRow> {
    let mapped_app: Option<String> = r.get(4)?;
    Ok(ServiceRow {
        service_name: r.get(0)?,
        external_port: port_column(r.get(1)?),
        internal_port: port_column(r.get(2)?),
        has_port_mapping: r.get::<_, Option<bool>>(3)?.unwrap_or(false),
        mapped_app: mapped_app.filter(|m| m != NOT_APPLICABLE),
    })
}

fn container_port_row(r: &Row<'_>) -> rusqlite::Result<ContainerPortRecord> {
    Ok(ContainerPortRecord {
        container_name: r.get(0)?,
        internal_port: port_column(r.get(1)?),
        external_port: port_column(r.get(2)?),
        mapping_name: r.get(3)?,
        mapping_value: r.get(4)?,
        protocol: r.get(5)?,
    })
}

impl Db {
    pub fn table_exists(&self, name: &str) -> Result<bool> {
        let cnt: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(1) FROM sqlite_master WHERE type='table' AND name=?",
                [name],
                |r| r.get(0),
            )
            .map_err(|e| sql_error("sqlite_master", e))?;
        Ok(cnt > 0)
    }

    /// `service_info` in insertion order.
    pub fn service_info(&self) -> Result<Vec<ServiceRow>> {
        let table = "service_info";
        let mut stmt = self
            .conn
            .prepare("SELECT service_name, external_port, internal_port, has_port_mapping, mapped_app FROM service_info ORDER BY id")
            .map_err(|e| sql_error(table, e))?;
        let rows = stmt
            .query_map([], service_row)
            .map_err(|e| sql_error(table, e))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| sql_error(table, e))?;
        Ok(rows)
    }

    pub fn port_mappings(&self) -> Result<Vec<PortMappingRow>> {
        let table = "port_mappings";
        let mut stmt = self
            .conn
            .prepare("SELECT external_port, mapping_values FROM port_mappings ORDER BY id")
            .map_err(|e| sql_error(table, e))?;
        let rows = stmt
            .query_map([], |r| {
                let port: Port = r.get(0)?;
                let values: String = r.get(1)?;
                Ok(PortMappingRow::from_mapping_values(port, &values))
            })
            .map_err(|e| sql_error(table, e))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| sql_error(table, e))?;
        Ok(rows)
    }

    pub fn host_networking(&self) -> Result<Vec<HostNetworkingRow>> {
        let table = "host_networking";
        let mut stmt = self
            .conn
            .prepare("SELECT service_name FROM host_networking ORDER BY id")
            .map_err(|e| sql_error(table, e))?;
        let rows = stmt
            .query_map([], |r| Ok(HostNetworkingRow { service_name: r.get(0)? }))
            .map_err(|e| sql_error(table, e))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| sql_error(table, e))?;
        Ok(rows)
    }

    pub fn container_ports(&self) -> Result<Vec<ContainerPortRecord>> {
        let table = "container_ports";
        let mut stmt = self
            .conn
            .prepare("SELECT container_name, internal_port, external_port, mapping_name, mapping_value, protocol FROM container_ports ORDER BY id")
            .map_err(|e| sql_error(table, e))?;
        let rows = stmt
            .query_map([], container_port_row)
            .map_err(|e| sql_error(table, e))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| sql_error(table, e))?;
        Ok(rows)
    }

    pub fn table_counts(&self) -> Result<TableCounts> {
        let count = |table: &'static str| -> Result<i64> {
            self.conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
                .map_err(|e| sql_error(table, e))
        };
        Ok(TableCounts {
            service_info: count("service_info")?,
            port_mappings: count("port_mappings")?,
            host_networking: count("host_networking")?,
            container_ports: count("container_ports")?,
        })
    }

    /// True once the static extraction has written anything to `service_info`.
    pub fn has_service_rows(&self) -> Result<bool> {
        self.conn
            .query_row("SELECT EXISTS(SELECT 1 FROM service_info)", [], |r| r.get(0))
            .map_err(|e| sql_error("service_info", e))
    }
}
