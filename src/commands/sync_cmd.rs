//! Sync CLI commands for reconciling local collections with the server.

use clap::{Args, Subcommand};
use sqlx::SqlitePool;
use std::time::Duration;

use mintboard::client::{ClientConfigError, HttpHealthProbe, HttpRemoteClient};
use mintboard::config::Config;
use mintboard::db::{EntityRepository, RepositoryError, SqliteStore};
use mintboard::models::{Entity, EntityKind, FarmingProject, Mint, SyncStatus, TodoTask};
use mintboard::sync::{Connectivity, LocalStore, SyncEngine, SyncOutcome};

/// Sync with remote server
#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Only sync one collection (mint, todo, farming)
    #[arg(long, short)]
    kind: Option<EntityKind>,

    #[command(subcommand)]
    command: Option<SyncSubcommand>,
}

#[derive(Debug, Subcommand)]
enum SyncSubcommand {
    /// Show sync configuration, server status and pending work
    Status,
}

impl SyncCommand {
    pub async fn run(&self, pool: &SqlitePool, config: &Config) -> Result<(), SyncCommandError> {
        match &self.command {
            None => self.sync(pool, config).await,
            Some(SyncSubcommand::Status) => self.status(pool, config).await,
        }
    }

    fn kinds(&self) -> Vec<EntityKind> {
        match self.kind {
            Some(kind) => vec![kind],
            None => EntityKind::ALL.to_vec(),
        }
    }

    async fn sync(&self, pool: &SqlitePool, config: &Config) -> Result<(), SyncCommandError> {
        if !config.sync.is_configured() {
            return Err(ClientConfigError::NotConfigured.into());
        }

        println!("Syncing with server...");
        println!();

        let mut failures = 0;
        let mut queued = 0;
        for kind in self.kinds() {
            let outcome = sync_kind(pool, config, kind).await?;
            let line = outcome_line(kind, &outcome);
            println!("{}", line.text);
            match line.state {
                LineState::Synced => {}
                LineState::Queued => queued += 1,
                LineState::Failed => failures += 1,
            }
        }

        println!();
        if failures > 0 {
            return Err(SyncCommandError::Unsuccessful(failures));
        }
        if queued > 0 {
            println!("Server unreachable; changes stay queued for the next sync.");
        } else {
            println!("Sync complete.");
        }
        Ok(())
    }

    async fn status(&self, pool: &SqlitePool, config: &Config) -> Result<(), SyncCommandError> {
        println!("Sync Configuration");
        println!("==================");
        println!();

        match (&config.sync.server_url.value, &config.sync.api_key.value) {
            (Some(server_url), Some(api_key)) => {
                let prefix: String = api_key.chars().take(8).collect();
                println!("Server:    {}", server_url);
                println!("API Key:   {}...", prefix);
                println!(
                    "Auto-sync: {}",
                    if config.sync.auto_sync.value {
                        "enabled"
                    } else {
                        "disabled"
                    }
                );
                println!();

                print!("Server status: ");
                let probe = HttpHealthProbe::new(server_url, timeout(config))?;
                if probe.is_online().await {
                    println!("✓ reachable");
                } else {
                    println!("✗ unreachable");
                }
            }
            _ => {
                println!("Status: Not configured");
                println!();
                println!("To enable sync, add to your config file:");
                println!();
                println!("  sync:");
                println!("    server_url: \"http://localhost:8080\"");
                println!("    api_key: \"your-api-key\"");
                println!("    auto_sync: false");
                println!();
                println!("Or set environment variables:");
                println!("  MINTBOARD_SYNC_URL");
                println!("  MINTBOARD_SYNC_API_KEY");
            }
        }
        println!();

        println!("Local Records");
        println!("=============");
        for kind in self.kinds() {
            match kind {
                EntityKind::Mint => print_status::<Mint>(pool).await?,
                EntityKind::Todo => print_status::<TodoTask>(pool).await?,
                EntityKind::Farming => print_status::<FarmingProject>(pool).await?,
            }
        }

        Ok(())
    }
}

async fn print_status<E: Entity>(pool: &SqlitePool) -> Result<(), SyncCommandError> {
    let repo = EntityRepository::new(SqliteStore::<E>::new(pool.clone()));
    let counts = repo.status_counts().await?;

    let summary: Vec<String> = counts
        .iter()
        .filter(|(_, n)| **n > 0)
        .map(|(status, n)| format!("{} {}", n, status))
        .collect();
    println!();
    if summary.is_empty() {
        println!("{}: empty", E::KIND);
    } else {
        println!("{}: {}", E::KIND, summary.join(", "));
    }

    let errored = repo
        .store()
        .list_all()
        .await
        .map_err(RepositoryError::from)?
        .into_iter()
        .filter(|r| r.sync_error.is_some() || r.sync_status == SyncStatus::Error);
    for record in errored {
        println!(
            "  #{} [{}] {}",
            record.local_id,
            record.sync_status,
            record.sync_error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineState {
    Synced,
    Queued,
    Failed,
}

struct OutcomeLine {
    state: LineState,
    text: String,
}

/// One summary line per collection. Being offline is not a failure.
fn outcome_line(kind: EntityKind, outcome: &SyncOutcome) -> OutcomeLine {
    let report = &outcome.report;
    if outcome.success {
        OutcomeLine {
            state: LineState::Synced,
            text: format!(
                "  ✓ {:<8} pushed {}, pulled {}, deleted {}",
                kind.to_string(),
                report.pushed,
                report.inserted + report.updated,
                report.deleted
            ),
        }
    } else if outcome.is_queued() {
        OutcomeLine {
            state: LineState::Queued,
            text: format!("  … {:<8} {}", kind.to_string(), outcome.message),
        }
    } else {
        OutcomeLine {
            state: LineState::Failed,
            text: format!("  ✗ {:<8} {}", kind.to_string(), outcome.message),
        }
    }
}

fn timeout(config: &Config) -> Duration {
    Duration::from_secs(config.sync.timeout_secs.value)
}

/// Runs one reconciliation of `kind` against the configured server.
pub async fn sync_kind(
    pool: &SqlitePool,
    config: &Config,
    kind: EntityKind,
) -> Result<SyncOutcome, SyncCommandError> {
    match kind {
        EntityKind::Mint => run_engine::<Mint>(pool, config).await,
        EntityKind::Todo => run_engine::<TodoTask>(pool, config).await,
        EntityKind::Farming => run_engine::<FarmingProject>(pool, config).await,
    }
}

async fn run_engine<E: Entity>(
    pool: &SqlitePool,
    config: &Config,
) -> Result<SyncOutcome, SyncCommandError> {
    let remote = HttpRemoteClient::<E>::from_config(&config.sync)?;
    let probe = HttpHealthProbe::new(remote.base_url(), timeout(config))?;

    let engine =
        SyncEngine::new(SqliteStore::<E>::new(pool.clone()), remote).with_connectivity(probe);
    Ok(engine.run_sync().await)
}

/// Syncs `kind` after a local write when `sync.auto_sync` is on.
/// Problems are reported but never fail the write that triggered them.
pub async fn auto_sync(pool: &SqlitePool, config: &Config, kind: EntityKind) {
    if !config.sync.auto_sync.value {
        return;
    }
    if !config.sync.is_configured() {
        eprintln!("Auto-sync skipped: sync is not configured");
        return;
    }

    match sync_kind(pool, config, kind).await {
        Ok(outcome) if outcome.success => println!("Synced {}.", kind),
        Ok(outcome) if outcome.is_queued() => println!("Offline; {} changes queued.", kind),
        Ok(outcome) => eprintln!("Auto-sync {}: {}", kind, outcome.message),
        Err(e) => eprintln!("Auto-sync {} failed: {}", kind, e),
    }
}

/// Errors from sync commands
#[derive(Debug)]
pub enum SyncCommandError {
    Client(ClientConfigError),
    Repository(RepositoryError),
    /// Number of collections whose sync did not succeed
    Unsuccessful(usize),
}

impl std::fmt::Display for SyncCommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncCommandError::Client(e) => write!(f, "{}", e),
            SyncCommandError::Repository(e) => write!(f, "{}", e),
            SyncCommandError::Unsuccessful(n) => {
                write!(f, "{} collection(s) did not sync; changes stay queued", n)
            }
        }
    }
}

impl std::error::Error for SyncCommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncCommandError::Client(e) => Some(e),
            SyncCommandError::Repository(e) => Some(e),
            SyncCommandError::Unsuccessful(_) => None,
        }
    }
}

impl From<ClientConfigError> for SyncCommandError {
    fn from(e: ClientConfigError) -> Self {
        SyncCommandError::Client(e)
    }
}

impl From<RepositoryError> for SyncCommandError {
    fn from(e: RepositoryError) -> Self {
        SyncCommandError::Repository(e)
    }
}
