use crate::schema::NOT_APPLICABLE;
use crate::{sql_error, ContainerPortRecord, Db, PortMappingRow, ServiceRow};
use portdump_core::Result;
use rusqlite::{params, Statement};
use std::fmt::Debug;
use tracing::{debug, warn};

/// Rows written by one phase, and rows skipped as duplicates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertOutcome {
    pub inserted: usize,
    pub skipped: usize,
}

impl Db {
    pub fn insert_port_mappings(&mut self, rows: &[PortMappingRow]) -> Result<InsertOutcome> {
        self.insert_phase(
            "port_mappings",
            "INSERT INTO port_mappings(external_port, mapping_values) VALUES (?,?)",
            rows,
            |stmt, row| stmt.execute(params![row.external_port, row.mapping_values()]),
        )
    }

    pub fn insert_service_rows(&mut self, rows: &[ServiceRow]) -> Result<InsertOutcome> {
        self.insert_phase(
            "service_info",
            "INSERT INTO service_info(service_name, external_port, internal_port, has_port_mapping, mapped_app) VALUES (?,?,?,?,?)",
            rows,
            |stmt, row| {
                stmt.execute(params![
                    row.service_name,
                    row.external_port.map(|p| p.to_string()),
                    row.internal_port.map(|p| p.to_string()),
                    row.has_port_mapping,
                    row.mapped_app.as_deref().unwrap_or(NOT_APPLICABLE),
                ])
            },
        )
    }

    pub fn insert_host_networking(&mut self, services: &[String]) -> Result<InsertOutcome> {
        self.insert_phase(
            "host_networking",
            "INSERT INTO host_networking(service_name) VALUES (?)",
            services,
            |stmt, name| stmt.execute([name]),
        )
    }

    pub fn insert_container_ports(&mut self, rows: &[ContainerPortRecord]) -> Result<InsertOutcome> {
        self.insert_phase(
            "container_ports",
            "INSERT INTO container_ports(container_name, internal_port, external_port, mapping_name, mapping_value, protocol) VALUES (?,?,?,?,?,?)",
            rows,
            |stmt, row| {
                stmt.execute(params![
                    row.container_name,
                    row.internal_port.map(|p| p.to_string()),
                    row.external_port.map(|p| p.to_string()),
                    row.mapping_name,
                    row.mapping_value,
                    row.protocol,
                ])
            },
        )
    }

    /// Insert `rows` inside a single transaction. Constraint violations are
    /// logged and skipped; any other failure rolls the whole phase back.
    fn insert_phase<T, F>(
        &mut self,
        table: &'static str,
        sql: &str,
        rows: &[T],
        mut exec: F,
    ) -> Result<InsertOutcome>
    where
        T: Debug,
        F: FnMut(&mut Statement<'_>, &T) -> rusqlite::Result<usize>,
    {
        let tx = self.conn.transaction().map_err(|e| sql_error(table, e))?;
        let mut outcome = InsertOutcome::default();
        {
            let mut stmt = tx.prepare(sql).map_err(|e| sql_error(table, e))?;
            for row in rows {
                match exec(&mut stmt, row).map_err(|e| sql_error(table, e)) {
                    Ok(_) => outcome.inserted += 1,
                    Err(err) if err.is_recoverable() => {
                        warn!(table, row = ?row, error = %err, "duplicate row skipped");
                        outcome.skipped += 1;
                    }
                    Err(err) => return Err(err),
                }
            }
        }
        tx.commit().map_err(|e| sql_error(table, e))?;
        debug!(table, inserted = outcome.inserted, skipped = outcome.skipped, "phase committed");
        Ok(outcome)
    }
}
