use anyhow::{Context, Result};
use portdump_core::{RunConfig, RuntimeConfig};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const DEFAULT_CONFIG_FILE: &str = "portdump.yaml";

#[derive(Debug, Default, Deserialize, Clone)]
pub struct RuntimeSection {
    pub enabled: Option<bool>,
    pub batch_size: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub docker_socket: Option<String>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct Config {
    pub compose_files: Option<Vec<PathBuf>>,
    pub sidecar_service: Option<String>,
    pub db_path: Option<PathBuf>,
    pub runtime: Option<RuntimeSection>,
}

/// Read `path`, or `./portdump.yaml` when no path is given. An implicit file
/// that is absent or unreadable counts as no file; an explicit one must load.
pub fn load_config(path: Option<&Path>) -> Result<Option<Config>> {
    match path {
        Some(p) => {
            let s = fs::read_to_string(p).with_context(|| format!("reading config {}", p.display()))?;
            let cfg: Config = serde_yaml::from_str(&s).with_context(|| format!("parsing config {}", p.display()))?;
            Ok(Some(cfg))
        }
        None => {
            let p = Path::new(DEFAULT_CONFIG_FILE);
            if !p.exists() {
                return Ok(None);
            }
            let parsed: std::result::Result<Config, String> = fs::read_to_string(p)
                .map_err(|e| e.to_string())
                .and_then(|s| serde_yaml::from_str(&s).map_err(|e| e.to_string()));
            match parsed {
                Ok(cfg) => Ok(Some(cfg)),
                Err(e) => {
                    warn!(path = DEFAULT_CONFIG_FILE, error = %e, "ignoring unreadable config file");
                    Ok(None)
                }
            }
        }
    }
}

impl Config {
    pub fn into_run_config(self) -> RunConfig {
        let defaults = RuntimeConfig::default();
        let rt = self.runtime.unwrap_or_default();
        let mut cfg = RunConfig::new(self.compose_files.unwrap_or_default());
        if let Some(db) = self.db_path {
            cfg.db_path = db;
        }
        cfg.runtime = RuntimeConfig {
            enabled: rt.enabled.unwrap_or(defaults.enabled),
            batch_size: rt.batch_size.unwrap_or(defaults.batch_size),
            timeout_secs: rt.timeout_secs.unwrap_or(defaults.timeout_secs),
            docker_socket: rt.docker_socket,
        };
        match self.sidecar_service {
            Some(name) => cfg.with_sidecar(name),
            None => cfg,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn file_values_fill_run_config() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(
            f,
            "compose_files: [a.yml, b.yml]\nsidecar_service: gluetun\ndb_path: /tmp/x.db\nruntime:\n  batch_size: 5\n  enabled: false\n"
        )
        .unwrap();
        let cfg = load_config(Some(f.path())).unwrap().unwrap().into_run_config();
        assert_eq!(cfg.compose_files, vec![PathBuf::from("a.yml"), PathBuf::from("b.yml")]);
        assert_eq!(cfg.sidecar_service.as_deref(), Some("gluetun"));
        assert_eq!(cfg.db_path, PathBuf::from("/tmp/x.db"));
        assert_eq!(cfg.runtime.batch_size, 5);
        assert!(!cfg.runtime.enabled);
        assert_eq!(cfg.runtime.timeout_secs, RuntimeConfig::default().timeout_secs);
    }

    #[test]
    fn blank_sidecar_means_none() {
        let cfg = Config { sidecar_service: Some(String::new()), ..Config::default() }.into_run_config();
        assert!(cfg.sidecar_service.is_none());
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        assert!(load_config(Some(Path::new("/no/such/portdump.yaml"))).is_err());
    }

    #[test]
    fn explicit_bad_yaml_is_an_error() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "compose_files: [unterminated\n").unwrap();
        assert!(load_config(Some(f.path())).is_err());
    }
}
