//! Derived `service_info` columns, recomputed from the two static tables.
//!
//! The result depends only on the current contents of `service_info` and
//! `port_mappings`, so running it again changes nothing.

use crate::{sql_error, Db, PortMappingRow};
use portdump_core::Result;
use rusqlite::{params, Transaction};
use std::collections::BTreeSet;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Rows with `has_port_mapping = true` after the pass.
    pub flagged_rows: usize,
    /// Sidecar rows that received a primary-app attribution.
    pub attributed_rows: usize,
}

const TABLE: &str = "service_info";

impl Db {
    /// Recompute `has_port_mapping` for every row, then attribute the sidecar's
    /// forwarded ports to the first application that claimed each one.
    pub fn reconcile_derived_fields(&mut self, sidecar: Option<&str>) -> Result<ReconcileOutcome> {
        let mappings = self.port_mappings()?;
        let tx = self.conn.transaction().map_err(|e| sql_error(TABLE, e))?;
        let flagged_rows = refresh_port_mapping_flags(&tx, &mappings)?;
        let attributed_rows = match sidecar {
            Some(name) => attribute_sidecar_ports(&tx, name, &mappings)?,
            None => {
                debug!("no sidecar configured; skipping primary-app attribution");
                0
            }
        };
        tx.commit().map_err(|e| sql_error(TABLE, e))?;
        info!(flagged_rows, attributed_rows, "derived service fields updated");
        Ok(ReconcileOutcome { flagged_rows, attributed_rows })
    }
}

fn refresh_port_mapping_flags(tx: &Transaction<'_>, mappings: &[PortMappingRow]) -> Result<usize> {
    tx.execute("UPDATE service_info SET has_port_mapping = 0", [])
        .map_err(|e| sql_error(TABLE, e))?;
    let members: BTreeSet<&str> = mappings
        .iter()
        .flat_map(|m| m.services.iter().map(String::as_str))
        .collect();
    let mut flagged = 0;
    for service in members {
        flagged += tx
            .execute("UPDATE service_info SET has_port_mapping = 1 WHERE service_name = ?", [service])
            .map_err(|e| sql_error(TABLE, e))?;
    }
    Ok(flagged)
}

fn attribute_sidecar_ports(tx: &Transaction<'_>, sidecar: &str, mappings: &[PortMappingRow]) -> Result<usize> {
    let mut attributed = 0;
    for mapping in mappings {
        let Some(primary) = mapping.primary_app() else { continue };
        let changed = tx
            .execute(
                "UPDATE service_info SET mapped_app = ? WHERE service_name = ? AND external_port = ?",
                params![primary, sidecar, mapping.external_port.to_string()],
            )
            .map_err(|e| sql_error(TABLE, e))?;
        if changed > 0 {
            debug!(port = mapping.external_port, app = primary, sidecar, "sidecar port attributed");
        }
        attributed += changed;
    }
    Ok(attributed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ServiceRow;

    fn seeded() -> Db {
        let mut db = Db::open_in_memory().unwrap();
        db.insert_port_mappings(&[
            PortMappingRow { external_port: 9000, services: vec!["qbit".into(), "sonarr".into()] },
            PortMappingRow { external_port: 51820, services: vec!["wg-app".into()] },
        ])
        .unwrap();
        db.insert_service_rows(&[
            ServiceRow::direct("gluetun", 9000, 9000),
            ServiceRow::direct("gluetun", 8888, 8888),
            ServiceRow::convention("qbit", "9000"),
            ServiceRow::convention("sonarr", "9000"),
            ServiceRow::direct("plex", 32400, 32400),
        ])
        .unwrap();
        db
    }

    #[test]
    fn flags_every_member_of_a_shared_port() {
        let mut db = seeded();
        db.reconcile_derived_fields(None).unwrap();
        let flagged: Vec<String> = db
            .service_info()
            .unwrap()
            .into_iter()
            .filter(|r| r.has_port_mapping)
            .map(|r| r.service_name)
            .collect();
        assert_eq!(flagged, vec!["qbit", "sonarr"]);
    }

    #[test]
    fn stale_flags_are_reset() {
        let mut db = seeded();
        db.conn.execute("UPDATE service_info SET has_port_mapping = 1", []).unwrap();
        db.reconcile_derived_fields(None).unwrap();
        let plex = db.service_info().unwrap().into_iter().find(|r| r.service_name == "plex").unwrap();
        assert!(!plex.has_port_mapping);
    }

    #[test]
    fn sidecar_port_gets_primary_app() {
        let mut db = seeded();
        let out = db.reconcile_derived_fields(Some("gluetun")).unwrap();
        assert_eq!(out.attributed_rows, 1);
        let rows = db.service_info().unwrap();
        let forwarded = rows.iter().find(|r| r.service_name == "gluetun" && r.external_port == Some(9000)).unwrap();
        assert_eq!(forwarded.mapped_app.as_deref(), Some("qbit"));
        let own = rows.iter().find(|r| r.service_name == "gluetun" && r.external_port == Some(8888)).unwrap();
        assert!(own.mapped_app.is_none());
        // convention rows keep their raw mapping value
        let sonarr = rows.iter().find(|r| r.service_name == "sonarr").unwrap();
        assert_eq!(sonarr.mapped_app.as_deref(), Some("9000"));
    }

    #[test]
    fn running_twice_is_idempotent() {
        let mut db = seeded();
        db.reconcile_derived_fields(Some("gluetun")).unwrap();
        let first = (db.service_info().unwrap(), db.port_mappings().unwrap());
        db.reconcile_derived_fields(Some("gluetun")).unwrap();
        let second = (db.service_info().unwrap(), db.port_mappings().unwrap());
        assert_eq!(first, second);
    }
}
