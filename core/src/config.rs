use std::path::PathBuf;

use crate::error::{PortdumpError, Result};

pub const DEFAULT_DB_PATH: &str = "portdump.db";
pub const DEFAULT_BATCH_SIZE: usize = 20;
pub const DEFAULT_RUNTIME_TIMEOUT_SECS: u64 = 10;

/// Settings for the live container-runtime pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub enabled: bool,
    /// Rows buffered before `container_ports` is written.
    pub batch_size: usize,
    pub timeout_secs: u64,
    /// Explicit Docker socket; local defaults are used when absent.
    pub docker_socket: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            enabled: true,
            batch_size: DEFAULT_BATCH_SIZE,
            timeout_secs: DEFAULT_RUNTIME_TIMEOUT_SECS,
            docker_socket: None,
        }
    }
}

/// Everything one run needs. Built once at startup and handed to each stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Compose documents, processed in this order.
    pub compose_files: Vec<PathBuf>,
    /// Service whose forwarded ports get a primary-app attribution.
    pub sidecar_service: Option<String>,
    pub db_path: PathBuf,
    pub runtime: RuntimeConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            compose_files: Vec::new(),
            sidecar_service: None,
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            runtime: RuntimeConfig::default(),
        }
    }
}

impl RunConfig {
    pub fn new(compose_files: Vec<PathBuf>) -> Self {
        RunConfig { compose_files, ..RunConfig::default() }
    }

    pub fn with_sidecar(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.sidecar_service = if name.trim().is_empty() { None } else { Some(name) };
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.compose_files.is_empty() {
            return Err(PortdumpError::Config {
                field: "compose_files".to_string(),
                reason: "at least one compose document is required".to_string(),
            });
        }
        if self.runtime.batch_size == 0 {
            return Err(PortdumpError::Config {
                field: "runtime.batch_size".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.runtime.timeout_secs == 0 {
            return Err(PortdumpError::Config {
                field: "runtime.timeout_secs".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}
