use serde::{Deserialize, Serialize};

use crate::sync::fingerprint;

/// A checklist entry inside a to-do or a farming project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskItem {
    pub title: String,
    #[serde(default)]
    pub completed: bool,
}

impl TaskItem {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            completed: false,
        }
    }

    pub fn done(mut self) -> Self {
        self.completed = true;
        self
    }

    /// Normalized `[title, completed]` entry for checklist fingerprints.
    pub fn fingerprint_pair(&self) -> String {
        fingerprint::pair(&self.title, self.completed)
    }
}
