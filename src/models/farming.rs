use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{Entity, EntityKind, TaskItem};
use crate::sync::fingerprint;

/// A testnet or airdrop farming campaign and its recurring tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FarmingProject {
    pub name: String,
    #[serde(default)]
    pub network: String,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub tasks: Vec<TaskItem>,
    #[serde(default)]
    pub notes: String,
}

impl FarmingProject {
    pub fn new(name: impl Into<String>, network: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            network: network.into(),
            start_date: None,
            tasks: Vec::new(),
            notes: String::new(),
        }
    }

    pub fn with_start_date(mut self, date: NaiveDate) -> Self {
        self.start_date = Some(date);
        self
    }

    pub fn with_tasks(mut self, tasks: Vec<TaskItem>) -> Self {
        self.tasks = tasks;
        self
    }

    /// Share of tasks completed, 0.0 when there are none.
    pub fn progress(&self) -> f64 {
        if self.tasks.is_empty() {
            return 0.0;
        }
        let done = self.tasks.iter().filter(|t| t.completed).count();
        done as f64 / self.tasks.len() as f64
    }
}

impl Entity for FarmingProject {
    const KIND: EntityKind = EntityKind::Farming;

    fn fingerprint(&self) -> String {
        fingerprint::digest(&[
            fingerprint::text(&self.name),
            fingerprint::text(&self.network),
            fingerprint::date(self.start_date),
            fingerprint::unordered(self.tasks.iter().map(TaskItem::fingerprint_pair)),
        ])
    }
}

impl fmt::Display for FarmingProject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.name)?;
        writeln!(f, "{}", "=".repeat(self.name.len()))?;
        if !self.network.is_empty() {
            writeln!(f, "Network: {}", self.network)?;
        }
        if let Some(date) = self.start_date {
            writeln!(f, "Started: {}", date)?;
        }
        if !self.tasks.is_empty() {
            writeln!(f, "\nTasks ({:.0}% done):", self.progress() * 100.0)?;
            for task in &self.tasks {
                let mark = if task.completed { "x" } else { " " };
                writeln!(f, "  - [{}] {}", mark, task.title)?;
            }
        }
        Ok(())
    }
}
