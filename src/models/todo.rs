use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{Entity, EntityKind, TaskItem};
use crate::sync::fingerprint;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Medium => write!(f, "medium"),
            Priority::High => write!(f, "high"),
        }
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            _ => Err(format!(
                "Invalid priority '{}'. Valid options: low, medium, high",
                s
            )),
        }
    }
}

/// A to-do list entry with optional checklist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoTask {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub subtasks: Vec<TaskItem>,
}

impl TodoTask {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            due_date: None,
            priority: Priority::default(),
            completed: false,
            subtasks: Vec::new(),
        }
    }

    pub fn with_due_date(mut self, date: NaiveDate) -> Self {
        self.due_date = Some(date);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_subtasks(mut self, subtasks: Vec<TaskItem>) -> Self {
        self.subtasks = subtasks;
        self
    }
}

impl Entity for TodoTask {
    const KIND: EntityKind = EntityKind::Todo;

    fn fingerprint(&self) -> String {
        fingerprint::digest(&[
            fingerprint::text(&self.title),
            fingerprint::date(self.due_date),
            self.priority.to_string(),
            self.completed.to_string(),
            fingerprint::unordered(self.subtasks.iter().map(TaskItem::fingerprint_pair)),
        ])
    }
}

impl fmt::Display for TodoTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = if self.completed { "x" } else { " " };
        writeln!(f, "[{}] {} ({})", mark, self.title, self.priority)?;
        if let Some(due) = self.due_date {
            writeln!(f, "    due {}", due)?;
        }
        if !self.description.is_empty() {
            writeln!(f, "    {}", self.description)?;
        }
        for item in &self.subtasks {
            let mark = if item.completed { "x" } else { " " };
            writeln!(f, "    - [{}] {}", mark, item.title)?;
        }
        Ok(())
    }
}
