use anyhow::Result;
use clap::Parser;
use portdump_core::RunConfig;
use runtime_ports::DockerRuntime;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;

mod config;
mod logging;
mod pipeline;

use logging::LogFormat;

#[derive(Debug, Parser)]
#[command(name = "portdump", version, about = "Snapshot compose-declared and live container ports into SQLite")]
struct Cli {
    /// Optional config file (YAML). If omitted, loads ./portdump.yaml if present.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Compose document to read; repeat for several, processed in order
    #[arg(long = "compose", value_name = "FILE")]
    compose: Vec<PathBuf>,
    /// Service whose forwarded ports are attributed to the owning application
    #[arg(long)]
    sidecar: Option<String>,
    /// Store path; replaced on every run
    #[arg(long, value_name = "FILE")]
    db: Option<PathBuf>,
    /// Skip the live container runtime pass
    #[arg(long)]
    no_runtime: bool,
    /// Rows written to container_ports per batch
    #[arg(long)]
    batch_size: Option<usize>,
    /// Give up on the container runtime after this many seconds
    #[arg(long)]
    runtime_timeout_secs: Option<u64>,
    /// Docker socket path (default: platform default)
    #[arg(long, value_name = "PATH")]
    docker_socket: Option<String>,
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

impl Cli {
    /// Flags win over file values.
    fn run_config(&self, file: Option<config::Config>) -> RunConfig {
        let mut cfg = file.map(config::Config::into_run_config).unwrap_or_default();
        if !self.compose.is_empty() {
            cfg.compose_files = self.compose.clone();
        }
        if let Some(name) = &self.sidecar {
            cfg = cfg.with_sidecar(name.clone());
        }
        if let Some(db) = &self.db {
            cfg.db_path = db.clone();
        }
        if self.no_runtime {
            cfg.runtime.enabled = false;
        }
        if let Some(n) = self.batch_size {
            cfg.runtime.batch_size = n;
        }
        if let Some(secs) = self.runtime_timeout_secs {
            cfg.runtime.timeout_secs = secs;
        }
        if let Some(socket) = &self.docker_socket {
            cfg.runtime.docker_socket = Some(socket.clone());
        }
        cfg
    }
}

fn execute(cli: &Cli) -> Result<()> {
    let file = config::load_config(cli.config.as_deref())?;
    let cfg = cli.run_config(file);
    let summary = pipeline::run(&cfg, DockerRuntime::connect)?;
    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = logging::init_tracing(cli.verbose, cli.log_format) {
        eprintln!("{e:#}");
        return ExitCode::FAILURE;
    }
    match execute(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "portdump failed");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_file_values() {
        let cli = Cli::parse_from([
            "portdump",
            "--compose",
            "b.yml",
            "--sidecar",
            "wireguard",
            "--no-runtime",
            "--batch-size",
            "7",
        ]);
        let file = config::Config {
            compose_files: Some(vec![PathBuf::from("a.yml")]),
            sidecar_service: Some("gluetun".into()),
            db_path: Some(PathBuf::from("from-file.db")),
            runtime: None,
        };
        let cfg = cli.run_config(Some(file));
        assert_eq!(cfg.compose_files, vec![PathBuf::from("b.yml")]);
        assert_eq!(cfg.sidecar_service.as_deref(), Some("wireguard"));
        assert_eq!(cfg.db_path, PathBuf::from("from-file.db"));
        assert!(!cfg.runtime.enabled);
        assert_eq!(cfg.runtime.batch_size, 7);
    }

    #[test]
    fn defaults_without_file() {
        let cli = Cli::parse_from(["portdump", "--compose", "a.yml", "--compose", "b.yml", "-vv"]);
        let cfg = cli.run_config(None);
        assert_eq!(cfg.compose_files.len(), 2);
        assert_eq!(cfg.db_path, PathBuf::from(portdump_core::config::DEFAULT_DB_PATH));
        assert!(cfg.runtime.enabled);
        assert_eq!(cli.verbose, 2);
    }
}
