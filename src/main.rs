use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::{ConfigCommand, FarmCommand, MintCommand, SyncCommand, TodoCommand};
use mintboard::config::Config;
use mintboard::db::init_db;

#[derive(Parser)]
#[command(name = "mintboard")]
#[command(version)]
#[command(
    about = "Offline-first tracker for mints, to-dos and farming projects",
    long_about = None
)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage tracked mints
    Mint(MintCommand),

    /// Manage to-dos
    Todo(TodoCommand),

    /// Manage farming projects
    Farm(FarmCommand),

    /// Sync local changes with the server
    Sync(SyncCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    // Logs go to stderr so they never mix with command output
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mintboard=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config)?;

    match cli.command {
        Some(Commands::Mint(cmd)) => {
            let pool = init_db(&config.database_path.value).await?;
            cmd.run(&pool, &config).await?;
        }
        Some(Commands::Todo(cmd)) => {
            let pool = init_db(&config.database_path.value).await?;
            cmd.run(&pool, &config).await?;
        }
        Some(Commands::Farm(cmd)) => {
            let pool = init_db(&config.database_path.value).await?;
            cmd.run(&pool, &config).await?;
        }
        Some(Commands::Sync(cmd)) => {
            let pool = init_db(&config.database_path.value).await?;
            cmd.run(&pool, &config).await?;
        }
        Some(Commands::Config(cmd)) => {
            cmd.run(&config)?;
        }
        None => {
            println!("Use --help to see available commands");
        }
    }

    Ok(())
}
