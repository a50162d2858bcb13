use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};

use ticket_migrate::clock::SystemClock;
use ticket_migrate::config::{self, AppConfig, TomlConfigStore};
use ticket_migrate::github::GithubClient;
use ticket_migrate::logging;
use ticket_migrate::metrics::Metrics;
use ticket_migrate::model::KeyedTicketRecord;
use ticket_migrate::store::{RecordStore, SqliteRecordStore};
use ticket_migrate::sync::{import_project, ImportSettings, SyncDeps};

#[derive(Debug, Parser)]
#[command(
    name = "ticket-migrate",
    version,
    about = "Mirror stored tickets into a GitHub issue tracker"
)]
struct Cli {
    /// Config file; defaults to $XDG_CONFIG_HOME/ticket-migrate/config.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Import configured projects, or only the ones named.
    Import { projects: Vec<String> },
    /// Load ticket records from a JSON array into the record store.
    Load { project: String, file: PathBuf },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(path) => path,
        None => config::resolve_config_path()?,
    };
    let cfg = config::load_from(&config_path)?;
    logging::init(cli.debug || cfg.logging.debug);
    tracing::debug!(path = %config_path.display(), "config loaded");

    let records = SqliteRecordStore::open(Path::new(&cfg.store.db_path))?;

    match cli.command {
        Command::Load { project, file } => load_records(&records, &project, &file),
        Command::Import { projects } => run_import(&cfg, &config_path, &records, projects),
    }
}

fn load_records(
    records: &SqliteRecordStore,
    project: &str,
    file: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(file)
        .map_err(|err| format!("failed to read {}: {err}", file.display()))?;
    let keyed: Vec<KeyedTicketRecord> = serde_json::from_str(&raw)
        .map_err(|err| format!("failed to parse {}: {err}", file.display()))?;

    for entry in &keyed {
        records.write(project, &entry.id, &entry.record)?;
    }
    tracing::info!(project, count = keyed.len(), "ticket records loaded");
    Ok(())
}

fn run_import(
    cfg: &AppConfig,
    config_path: &Path,
    records: &SqliteRecordStore,
    requested: Vec<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let metrics = Arc::new(Metrics::new());
    let client = GithubClient::new_with_metrics(
        &cfg.github.base_url,
        cfg.github.token.clone(),
        metrics.clone(),
    )?;
    let settings = ImportSettings::from(&cfg.import);
    let clock = SystemClock;
    let mut config_store = TomlConfigStore::new(config_path);

    let keys: Vec<String> = if requested.is_empty() {
        cfg.projects.keys().cloned().collect()
    } else {
        requested
    };
    if keys.is_empty() {
        tracing::warn!("no projects configured, nothing to import");
        return Ok(());
    }

    for key in keys {
        let Some(mut project) = cfg.project_config(&key) else {
            tracing::warn!(project = %key, "project is not configured, skipping");
            continue;
        };
        if !project.is_configured() {
            tracing::warn!(project = %key, "project has no account or repository set, skipping");
            continue;
        }

        let deps = SyncDeps {
            tracker: &client,
            records,
            clock: &clock,
            settings: &settings,
            metrics: &metrics,
        };
        let report = import_project(&mut project, &mut config_store, deps)?;
        tracing::info!(
            project = %key,
            tickets = report.tickets_seen,
            issues_created = report.issues_created,
            comments_created = report.comments_created,
            "project imported"
        );
        metrics.log_snapshot(&key);
    }

    Ok(())
}
