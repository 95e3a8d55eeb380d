use chrono::NaiveDate;
use clap::{Args, Subcommand};
use sqlx::SqlitePool;

use super::sync_cmd::auto_sync;
use super::{confirm, parse_date, status_label, truncate, OutputFormat};
use mintboard::config::Config;
use mintboard::db::{EntityRepository, SqliteStore};
use mintboard::models::{EntityKind, FarmingProject, LocalId, TaskItem};

#[derive(Args)]
pub struct FarmCommand {
    #[command(subcommand)]
    pub command: FarmSubcommand,
}

#[derive(Subcommand)]
pub enum FarmSubcommand {
    /// Track a farming project
    Add {
        /// Project name
        name: String,

        /// Network or chain
        #[arg(long, default_value = "")]
        network: String,

        /// Start date (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date)]
        start: Option<NaiveDate>,

        /// Recurring task (can be repeated)
        #[arg(long = "task", value_name = "TITLE")]
        tasks: Vec<String>,

        /// Free-form notes
        #[arg(long)]
        notes: Option<String>,
    },

    /// List farming projects with progress
    List {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Edit a farming project
    Edit {
        /// Local project ID
        id: LocalId,

        /// New name
        #[arg(long)]
        name: Option<String>,

        /// New network
        #[arg(long)]
        network: Option<String>,

        /// New start date (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date)]
        start: Option<NaiveDate>,

        /// New notes
        #[arg(long)]
        notes: Option<String>,

        /// Add a task (can be repeated)
        #[arg(long = "add-task", value_name = "TITLE")]
        add_tasks: Vec<String>,

        /// Mark a task done by 1-based number (can be repeated)
        #[arg(long = "complete-task", value_name = "N")]
        complete_tasks: Vec<usize>,

        /// Mark every task as not done
        #[arg(long)]
        reset_tasks: bool,
    },

    /// Delete a farming project (removed from the server on next sync)
    Delete {
        /// Local project ID
        id: LocalId,

        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },
}

impl FarmCommand {
    pub async fn run(
        &self,
        pool: &SqlitePool,
        config: &Config,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let repo = EntityRepository::new(SqliteStore::<FarmingProject>::new(pool.clone()));

        match &self.command {
            FarmSubcommand::Add {
                name,
                network,
                start,
                tasks,
                notes,
            } => {
                if name.trim().is_empty() {
                    return Err("Project name cannot be empty".into());
                }

                let mut project = FarmingProject::new(name.trim(), network.trim())
                    .with_tasks(tasks.iter().map(TaskItem::new).collect());
                project.start_date = *start;
                if let Some(notes) = notes {
                    project.notes = notes.clone();
                }

                let record = repo.create(project).await?;
                println!("Created farming project #{}:", record.local_id);
                println!("{}", record.payload);
            }

            FarmSubcommand::List { format } => {
                let records = repo.list().await?;
                if records.is_empty() {
                    println!("No farming projects found");
                    return Ok(());
                }

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&records)?);
                    }
                    OutputFormat::Text => {
                        println!(
                            "{:<6}  {:<28}  {:<12}  {:>5}  STATUS",
                            "ID", "NAME", "NETWORK", "DONE"
                        );
                        println!("{}", "-".repeat(80));
                        for record in &records {
                            let project = &record.payload;
                            println!(
                                "{:<6}  {:<28}  {:<12}  {:>4.0}%  {}",
                                record.local_id,
                                truncate(&project.name, 28),
                                truncate(&project.network, 12),
                                project.progress() * 100.0,
                                status_label(record)
                            );
                        }
                        println!("\nTotal: {} project(s)", records.len());
                    }
                }
                return Ok(());
            }

            FarmSubcommand::Edit {
                id,
                name,
                network,
                start,
                notes,
                add_tasks,
                complete_tasks,
                reset_tasks,
            } => {
                let has_updates = name.is_some()
                    || network.is_some()
                    || start.is_some()
                    || notes.is_some()
                    || !add_tasks.is_empty()
                    || !complete_tasks.is_empty()
                    || *reset_tasks;
                if !has_updates {
                    return Err("Nothing to update. Provide at least one option.".into());
                }

                let Some(record) = repo.get(*id).await? else {
                    return Err(format!("Farming project not found: {}", id).into());
                };
                let mut project = record.payload;

                if let Some(name) = name {
                    project.name = name.clone();
                }
                if let Some(network) = network {
                    project.network = network.clone();
                }
                if start.is_some() {
                    project.start_date = *start;
                }
                if let Some(notes) = notes {
                    project.notes = notes.clone();
                }
                if *reset_tasks {
                    for task in &mut project.tasks {
                        task.completed = false;
                    }
                }
                for title in add_tasks {
                    project.tasks.push(TaskItem::new(title));
                }
                for n in complete_tasks {
                    let index = n.checked_sub(1).unwrap_or(usize::MAX);
                    let Some(task) = project.tasks.get_mut(index) else {
                        return Err(format!("Project #{} has no task {}", id, n).into());
                    };
                    task.completed = true;
                }

                let updated = repo.edit(*id, project).await?;
                println!("Updated farming project #{}:", updated.local_id);
                println!("{}", updated.payload);
            }

            FarmSubcommand::Delete { id, force } => {
                let Some(record) = repo.get(*id).await? else {
                    return Err(format!("Farming project not found: {}", id).into());
                };

                if !force && !confirm(&format!("Delete project '{}'?", record.payload.name))? {
                    println!("Deletion cancelled.");
                    return Ok(());
                }

                repo.delete(*id).await?;
                println!("Deleted farming project: {}", record.payload.name);
            }
        }

        auto_sync(pool, config, EntityKind::Farming).await;
        Ok(())
    }
}
