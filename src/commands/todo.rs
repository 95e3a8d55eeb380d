use chrono::NaiveDate;
use clap::{Args, Subcommand};
use sqlx::SqlitePool;

use super::sync_cmd::auto_sync;
use super::{confirm, parse_date, status_label, truncate, OutputFormat};
use mintboard::config::Config;
use mintboard::db::{EntityRepository, SqliteStore};
use mintboard::models::{EntityKind, LocalId, Priority, TaskItem, TodoTask};

#[derive(Args)]
pub struct TodoCommand {
    #[command(subcommand)]
    pub command: TodoSubcommand,
}

#[derive(Subcommand)]
pub enum TodoSubcommand {
    /// Add a to-do
    Add {
        /// Title
        title: String,

        /// Longer description
        #[arg(long)]
        description: Option<String>,

        /// Due date (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date)]
        due: Option<NaiveDate>,

        /// Priority: low, medium, high
        #[arg(long, short)]
        priority: Option<Priority>,

        /// Checklist item (can be repeated)
        #[arg(long = "subtask", value_name = "TITLE")]
        subtasks: Vec<String>,
    },

    /// List to-dos
    List {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Hide completed to-dos
        #[arg(long)]
        open: bool,
    },

    /// Mark a to-do, or one of its subtasks, as done
    Done {
        /// Local to-do ID
        id: LocalId,

        /// 1-based subtask number instead of the whole to-do
        #[arg(long)]
        subtask: Option<usize>,
    },

    /// Edit a to-do
    Edit {
        /// Local to-do ID
        id: LocalId,

        /// New title
        #[arg(long)]
        title: Option<String>,

        /// New description
        #[arg(long)]
        description: Option<String>,

        /// New due date (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date)]
        due: Option<NaiveDate>,

        /// New priority
        #[arg(long, short)]
        priority: Option<Priority>,

        /// Add a subtask (can be repeated)
        #[arg(long = "add-subtask", value_name = "TITLE")]
        add_subtasks: Vec<String>,

        /// Remove subtasks by title (can be repeated)
        #[arg(long = "remove-subtask", value_name = "TITLE")]
        remove_subtasks: Vec<String>,

        /// Mark as not completed
        #[arg(long)]
        reopen: bool,
    },

    /// Delete a to-do (removed from the server on next sync)
    Delete {
        /// Local to-do ID
        id: LocalId,

        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },
}

impl TodoCommand {
    pub async fn run(
        &self,
        pool: &SqlitePool,
        config: &Config,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let repo = EntityRepository::new(SqliteStore::<TodoTask>::new(pool.clone()));

        match &self.command {
            TodoSubcommand::Add {
                title,
                description,
                due,
                priority,
                subtasks,
            } => {
                if title.trim().is_empty() {
                    return Err("To-do title cannot be empty".into());
                }

                let mut task = TodoTask::new(title.trim())
                    .with_subtasks(subtasks.iter().map(TaskItem::new).collect());
                if let Some(description) = description {
                    task.description = description.clone();
                }
                task.due_date = *due;
                if let Some(priority) = priority {
                    task.priority = *priority;
                }

                let record = repo.create(task).await?;
                println!("Created to-do #{}:", record.local_id);
                println!("{}", record.payload);
            }

            TodoSubcommand::List { format, open } => {
                let records: Vec<_> = repo
                    .list()
                    .await?
                    .into_iter()
                    .filter(|r| !*open || !r.payload.completed)
                    .collect();
                if records.is_empty() {
                    println!("No to-dos found");
                    return Ok(());
                }

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&records)?);
                    }
                    OutputFormat::Text => {
                        println!(
                            "{:<6}  {:<3}  {:<34}  {:<6}  {:<10}  STATUS",
                            "ID", "", "TITLE", "PRIO", "DUE"
                        );
                        println!("{}", "-".repeat(80));
                        for record in &records {
                            let task = &record.payload;
                            println!(
                                "{:<6}  {:<3}  {:<34}  {:<6}  {:<10}  {}",
                                record.local_id,
                                if task.completed { "[x]" } else { "[ ]" },
                                truncate(&task.title, 34),
                                task.priority.to_string(),
                                task.due_date.map(|d| d.to_string()).unwrap_or_default(),
                                status_label(record)
                            );
                        }
                        println!("\nTotal: {} to-do(s)", records.len());
                    }
                }
                return Ok(());
            }

            TodoSubcommand::Done { id, subtask } => {
                let Some(record) = repo.get(*id).await? else {
                    return Err(format!("To-do not found: {}", id).into());
                };
                let mut task = record.payload;

                match subtask {
                    Some(n) => {
                        let index = n.checked_sub(1).unwrap_or(usize::MAX);
                        let Some(item) = task.subtasks.get_mut(index) else {
                            return Err(format!("To-do #{} has no subtask {}", id, n).into());
                        };
                        item.completed = true;
                        println!("Completed subtask: {}", item.title);
                    }
                    None => {
                        task.completed = true;
                        println!("Completed: {}", task.title);
                    }
                }

                repo.edit(*id, task).await?;
            }

            TodoSubcommand::Edit {
                id,
                title,
                description,
                due,
                priority,
                add_subtasks,
                remove_subtasks,
                reopen,
            } => {
                let has_updates = title.is_some()
                    || description.is_some()
                    || due.is_some()
                    || priority.is_some()
                    || !add_subtasks.is_empty()
                    || !remove_subtasks.is_empty()
                    || *reopen;
                if !has_updates {
                    return Err("Nothing to update. Provide at least one option.".into());
                }

                let Some(record) = repo.get(*id).await? else {
                    return Err(format!("To-do not found: {}", id).into());
                };
                let mut task = record.payload;

                if let Some(title) = title {
                    task.title = title.clone();
                }
                if let Some(description) = description {
                    task.description = description.clone();
                }
                if due.is_some() {
                    task.due_date = *due;
                }
                if let Some(priority) = priority {
                    task.priority = *priority;
                }
                for title in add_subtasks {
                    task.subtasks.push(TaskItem::new(title));
                }
                for title in remove_subtasks {
                    task.subtasks
                        .retain(|s| !s.title.eq_ignore_ascii_case(title));
                }
                if *reopen {
                    task.completed = false;
                }

                let updated = repo.edit(*id, task).await?;
                println!("Updated to-do #{}:", updated.local_id);
                println!("{}", updated.payload);
            }

            TodoSubcommand::Delete { id, force } => {
                let Some(record) = repo.get(*id).await? else {
                    return Err(format!("To-do not found: {}", id).into());
                };

                if !force && !confirm(&format!("Delete to-do '{}'?", record.payload.title))? {
                    println!("Deletion cancelled.");
                    return Ok(());
                }

                repo.delete(*id).await?;
                println!("Deleted to-do: {}", record.payload.title);
            }
        }

        auto_sync(pool, config, EntityKind::Todo).await;
        Ok(())
    }
}
