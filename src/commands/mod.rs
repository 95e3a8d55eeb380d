mod config_cmd;
mod farm;
mod mint;
mod sync_cmd;
mod todo;

pub use config_cmd::ConfigCommand;
pub use farm::FarmCommand;
pub use mint::MintCommand;
pub use sync_cmd::SyncCommand;
pub use todo::TodoCommand;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use clap::ValueEnum;
use std::io::{self, Write};

use mintboard::models::{Entity, SyncRecord, SyncStatus};

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// clap parser for `YYYY-MM-DD` dates.
pub fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| format!("Invalid date '{}'. Use YYYY-MM-DD format.", s))
}

/// clap parser for RFC 3339 timestamps or `YYYY-MM-DD HH:MM` in UTC.
pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M")
        .map(|naive| naive.and_utc())
        .map_err(|_| {
            format!(
                "Invalid time '{}'. Use RFC 3339 or 'YYYY-MM-DD HH:MM' (UTC).",
                s
            )
        })
}

/// Asks for a y/N confirmation on stdin.
pub fn confirm(prompt: &str) -> io::Result<bool> {
    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

/// Short status label for list output, with the last error if any.
pub fn status_label<E: Entity>(record: &SyncRecord<E>) -> String {
    match (&record.sync_status, &record.sync_error) {
        (SyncStatus::Synced, _) => "synced".to_string(),
        (status, Some(error)) => format!("{} ({})", status, truncate(error, 40)),
        (status, None) => status.to_string(),
    }
}

pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    } else {
        s.to_string()
    }
}
