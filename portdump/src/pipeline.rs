//! One full run: rebuild the store, extract the static views, reconcile, then
//! record what the container runtime reports.

use compose_ports::ComposeDocument;
use portdump_core::{PortdumpError, Result, RunConfig, RuntimeConfig};
use ports_sqlite::{Db, TableCounts};
use runtime_ports::ContainerRuntime;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{error, info, warn};

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_else(|_| String::new())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RuntimeStatus {
    Disabled,
    Recorded { containers: usize, rows: usize, batches: usize },
    Failed { kind: &'static str, reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedDocument {
    pub path: PathBuf,
    pub kind: &'static str,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub started_at: String,
    pub db_path: PathBuf,
    pub documents_loaded: usize,
    pub documents_skipped: Vec<SkippedDocument>,
    pub rows_skipped: usize,
    pub tables: TableCounts,
    pub runtime: RuntimeStatus,
    pub elapsed_ms: u128,
}

struct StaticReport {
    documents_loaded: usize,
    documents_skipped: Vec<SkippedDocument>,
    rows_skipped: usize,
}

/// Run every stage against `config`. `connect` builds the runtime client; it
/// is only called when the runtime pass is enabled.
pub fn run<R, F>(config: &RunConfig, connect: F) -> Result<RunSummary>
where
    R: ContainerRuntime,
    F: FnOnce(&RuntimeConfig) -> Result<R>,
{
    config.validate()?;
    let started = Instant::now();
    let started_at = now_rfc3339();
    let run_id = uuid::Uuid::now_v7().to_string();
    info!(%run_id, documents = config.compose_files.len(), db = %config.db_path.display(), "run started");

    let missing = compose_ports::check_documents(&config.compose_files);
    if missing.len() == config.compose_files.len() {
        if let Some(first) = missing.into_iter().next() {
            return Err(first);
        }
    }

    let mut db = Db::open_fresh(&config.db_path)?;
    let report = match static_phases(&mut db, config) {
        Ok(r) => r,
        Err(e) => return Err(abandon(db, e)),
    };

    let runtime = if config.runtime.enabled {
        runtime_phase(&mut db, &config.runtime, connect)
    } else {
        info!("runtime reconciliation disabled");
        RuntimeStatus::Disabled
    };

    let tables = match db.table_counts() {
        Ok(t) => t,
        Err(e) => return Err(abandon(db, e)),
    };
    let elapsed_ms = started.elapsed().as_millis();
    info!(%run_id, elapsed_ms, "run finished");
    Ok(RunSummary {
        run_id,
        started_at,
        db_path: config.db_path.clone(),
        documents_loaded: report.documents_loaded,
        documents_skipped: report.documents_skipped,
        rows_skipped: report.rows_skipped,
        tables,
        runtime,
        elapsed_ms,
    })
}

/// Drop the store of a failed run so no half-built snapshot is left behind.
fn abandon(db: Db, err: PortdumpError) -> PortdumpError {
    error!(kind = err.kind(), error = %err, "run failed; removing partial store");
    if let Err(cleanup) = db.discard() {
        warn!(error = %cleanup, "could not remove partial store");
    }
    err
}

fn load_documents(config: &RunConfig) -> Result<(Vec<ComposeDocument>, Vec<SkippedDocument>)> {
    let mut documents = Vec::with_capacity(config.compose_files.len());
    let mut skipped = Vec::new();
    for path in &config.compose_files {
        match compose_ports::load(path) {
            Ok(doc) => documents.push(doc),
            Err(e) if e.is_document_load_failure() => {
                error!(path = %path.display(), kind = e.kind(), error = %e, "compose document skipped");
                skipped.push(SkippedDocument { path: path.clone(), kind: e.kind(), reason: e.to_string() });
            }
            Err(e) => return Err(e),
        }
    }
    if documents.is_empty() {
        let path = config.compose_files.first().cloned().unwrap_or_default();
        return Err(PortdumpError::DocumentMalformed {
            path,
            location: None,
            reason: "no compose document could be loaded".to_string(),
        });
    }
    Ok((documents, skipped))
}

fn static_phases(db: &mut Db, config: &RunConfig) -> Result<StaticReport> {
    let (documents, documents_skipped) = load_documents(config)?;

    let extraction = compose_ports::extract_documents(&documents)?;
    let stored = compose_ports::record(db, &extraction)?;

    db.reconcile_derived_fields(config.sidecar_service.as_deref())?;

    let scan = host_networking::scan_documents(&documents)?;
    let host = host_networking::record(db, &scan)?;

    if !db.has_service_rows()? {
        warn!(documents = documents.len(), "compose documents declare no services");
    }

    Ok(StaticReport {
        documents_loaded: documents.len(),
        documents_skipped,
        rows_skipped: stored.port_mappings.skipped
            + stored.service_info.skipped
            + host.host_networking.skipped
            + host.host_mappings.skipped,
    })
}

fn runtime_phase<R, F>(db: &mut Db, config: &RuntimeConfig, connect: F) -> RuntimeStatus
where
    R: ContainerRuntime,
    F: FnOnce(&RuntimeConfig) -> Result<R>,
{
    let result = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| PortdumpError::RuntimeUnavailable(format!("async runtime: {e}")))
        .and_then(|rt| {
            let runtime = {
                let _guard = rt.enter();
                connect(config)?
            };
            rt.block_on(runtime_ports::fetch_running(&runtime, config.timeout_secs))
        })
        .and_then(|snapshots| {
            let stats = runtime_ports::record(db, &snapshots, config.batch_size)?;
            Ok(RuntimeStatus::Recorded { containers: snapshots.len(), rows: stats.written, batches: stats.flushes })
        });
    match result {
        Ok(status) => status,
        Err(e) => {
            warn!(kind = e.kind(), error = %e, "runtime reconciliation skipped; static tables are complete");
            RuntimeStatus::Failed { kind: e.kind(), reason: e.to_string() }
        }
    }
}
