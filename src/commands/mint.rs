use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Subcommand};
use sqlx::SqlitePool;

use super::sync_cmd::auto_sync;
use super::{confirm, parse_date, parse_datetime, status_label, truncate, OutputFormat};
use mintboard::config::Config;
use mintboard::db::{EntityRepository, SqliteStore};
use mintboard::models::{EntityKind, LocalId, Mint};

#[derive(Args)]
pub struct MintCommand {
    #[command(subcommand)]
    pub command: MintSubcommand,
}

#[derive(Subcommand)]
pub enum MintSubcommand {
    /// Track an upcoming mint
    Add {
        /// Collection name
        name: String,

        /// Chain the mint happens on
        #[arg(long, default_value = "")]
        chain: String,

        /// Mint date (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date)]
        date: Option<NaiveDate>,

        /// Mint price
        #[arg(long)]
        price: Option<f64>,

        /// Collection supply
        #[arg(long)]
        supply: Option<u32>,

        /// Project link
        #[arg(long)]
        link: Option<String>,

        /// Free-form notes
        #[arg(long)]
        notes: Option<String>,
    },

    /// List tracked mints
    List {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Edit a mint
    Edit {
        /// Local mint ID
        id: LocalId,

        /// New name
        #[arg(long)]
        name: Option<String>,

        /// New chain
        #[arg(long)]
        chain: Option<String>,

        /// New mint date (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date)]
        date: Option<NaiveDate>,

        /// New price
        #[arg(long)]
        price: Option<f64>,

        /// New supply
        #[arg(long)]
        supply: Option<u32>,

        /// New link
        #[arg(long)]
        link: Option<String>,

        /// New notes
        #[arg(long)]
        notes: Option<String>,
    },

    /// Delete a mint (removed from the server on next sync)
    Delete {
        /// Local mint ID
        id: LocalId,

        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },

    /// Add a reminder to a mint, or list its reminders
    Remind {
        /// Local mint ID
        id: LocalId,

        /// When to remind (RFC 3339 or "YYYY-MM-DD HH:MM" UTC)
        #[arg(long, value_parser = parse_datetime)]
        at: Option<DateTime<Utc>>,

        /// Reminder note
        #[arg(long, default_value = "")]
        note: String,
    },
}

impl MintCommand {
    pub async fn run(
        &self,
        pool: &SqlitePool,
        config: &Config,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let store = SqliteStore::<Mint>::new(pool.clone());
        let repo = EntityRepository::new(store.clone());

        match &self.command {
            MintSubcommand::Add {
                name,
                chain,
                date,
                price,
                supply,
                link,
                notes,
            } => {
                if name.trim().is_empty() {
                    return Err("Mint name cannot be empty".into());
                }

                let mut mint = Mint::new(name.trim(), chain.trim());
                mint.mint_date = *date;
                mint.price = *price;
                mint.supply = *supply;
                mint.link = link.clone();
                if let Some(notes) = notes {
                    mint.notes = notes.clone();
                }

                let record = repo.create(mint).await?;
                println!("Created mint #{}:", record.local_id);
                println!("{}", record.payload);
            }

            MintSubcommand::List { format } => {
                let records = repo.list().await?;
                if records.is_empty() {
                    println!("No mints found");
                    return Ok(());
                }

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&records)?);
                    }
                    OutputFormat::Text => {
                        println!(
                            "{:<6}  {:<30}  {:<10}  {:<10}  STATUS",
                            "ID", "NAME", "CHAIN", "DATE"
                        );
                        println!("{}", "-".repeat(80));
                        for record in &records {
                            let mint = &record.payload;
                            println!(
                                "{:<6}  {:<30}  {:<10}  {:<10}  {}",
                                record.local_id,
                                truncate(&mint.name, 30),
                                truncate(&mint.chain, 10),
                                mint.mint_date.map(|d| d.to_string()).unwrap_or_default(),
                                status_label(record)
                            );
                        }
                        println!("\nTotal: {} mint(s)", records.len());
                    }
                }
                return Ok(());
            }

            MintSubcommand::Edit {
                id,
                name,
                chain,
                date,
                price,
                supply,
                link,
                notes,
            } => {
                let has_updates = name.is_some()
                    || chain.is_some()
                    || date.is_some()
                    || price.is_some()
                    || supply.is_some()
                    || link.is_some()
                    || notes.is_some();
                if !has_updates {
                    return Err("Nothing to update. Provide at least one option.".into());
                }

                let Some(record) = repo.get(*id).await? else {
                    return Err(format!("Mint not found: {}", id).into());
                };
                let mut mint = record.payload;

                if let Some(name) = name {
                    mint.name = name.clone();
                }
                if let Some(chain) = chain {
                    mint.chain = chain.clone();
                }
                if date.is_some() {
                    mint.mint_date = *date;
                }
                if price.is_some() {
                    mint.price = *price;
                }
                if supply.is_some() {
                    mint.supply = *supply;
                }
                if link.is_some() {
                    mint.link = link.clone();
                }
                if let Some(notes) = notes {
                    mint.notes = notes.clone();
                }

                let updated = repo.edit(*id, mint).await?;
                println!("Updated mint #{}:", updated.local_id);
                println!("{}", updated.payload);
            }

            MintSubcommand::Delete { id, force } => {
                let Some(record) = repo.get(*id).await? else {
                    return Err(format!("Mint not found: {}", id).into());
                };

                if !force && !confirm(&format!("Delete mint '{}'?", record.payload.name))? {
                    println!("Deletion cancelled.");
                    return Ok(());
                }

                repo.delete(*id).await?;
                println!("Deleted mint: {}", record.payload.name);
            }

            MintSubcommand::Remind { id, at, note } => {
                let Some(record) = repo.get(*id).await? else {
                    return Err(format!("Mint not found: {}", id).into());
                };

                if let Some(at) = at {
                    store.add_reminder(*id, *at, note).await?;
                    println!("Reminder set for '{}' at {}", record.payload.name, at);
                }

                let reminders = store.reminders(*id).await?;
                if reminders.is_empty() {
                    println!("No reminders for '{}'", record.payload.name);
                } else {
                    println!("Reminders for '{}':", record.payload.name);
                    for reminder in &reminders {
                        let due = if reminder.remind_at <= Utc::now() {
                            " (due)"
                        } else {
                            ""
                        };
                        println!("  {}{}  {}", reminder.remind_at, due, reminder.note);
                    }
                }
                // Reminders are local-only; nothing to sync.
                return Ok(());
            }
        }

        auto_sync(pool, config, EntityKind::Mint).await;
        Ok(())
    }
}
