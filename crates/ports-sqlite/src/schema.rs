/// Display value stored in `service_info.mapped_app` when no application is attributed.
pub const NOT_APPLICABLE: &str = "N/A";

pub const TABLES: [&str; 4] = ["service_info", "port_mappings", "host_networking", "container_ports"];

pub const SCHEMA: &str = r#"
BEGIN;

CREATE TABLE IF NOT EXISTS service_info (
  id                INTEGER PRIMARY KEY AUTOINCREMENT,
  service_name      TEXT NOT NULL,
  external_port     TEXT,
  internal_port     TEXT,
  has_port_mapping  BOOLEAN NOT NULL DEFAULT 0 CHECK (has_port_mapping IN (0,1)),
  mapped_app        TEXT NOT NULL DEFAULT 'N/A'
);

CREATE TABLE IF NOT EXISTS port_mappings (
  id                INTEGER PRIMARY KEY AUTOINCREMENT,
  external_port     INTEGER NOT NULL UNIQUE CHECK (external_port BETWEEN 1 AND 65535),
  mapping_values    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS host_networking (
  id                INTEGER PRIMARY KEY AUTOINCREMENT,
  service_name      TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS container_ports (
  id                INTEGER PRIMARY KEY AUTOINCREMENT,
  container_name    TEXT NOT NULL,
  internal_port     TEXT,
  external_port     TEXT,
  mapping_name      TEXT,
  mapping_value     TEXT,
  protocol          TEXT CHECK (protocol IN ('TCP','UDP','tcp','udp')),
  CHECK (mapping_name IS NULL OR (internal_port IS NULL AND external_port IS NULL AND protocol IS NULL))
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_service_info_host_mapping
  ON service_info(external_port, mapped_app) WHERE service_name = 'host';
CREATE INDEX IF NOT EXISTS idx_service_info_name ON service_info(service_name);
CREATE INDEX IF NOT EXISTS idx_container_ports_name ON container_ports(container_name);

COMMIT;
"#
;
