use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The synchronizable collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Mint,
    Todo,
    Farming,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [EntityKind::Mint, EntityKind::Todo, EntityKind::Farming];

    /// Returns the SQLite table holding this collection.
    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::Mint => "mints",
            EntityKind::Todo => "todos",
            EntityKind::Farming => "farming_projects",
        }
    }

    /// Returns the REST path segment for this collection.
    pub fn path(&self) -> &'static str {
        match self {
            EntityKind::Mint => "mints",
            EntityKind::Todo => "todos",
            EntityKind::Farming => "farming",
        }
    }

    /// Parse from a REST path segment.
    pub fn from_path(segment: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.path() == segment)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Mint => write!(f, "mint"),
            EntityKind::Todo => write!(f, "todo"),
            EntityKind::Farming => write!(f, "farming"),
        }
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mint" | "mints" => Ok(EntityKind::Mint),
            "todo" | "todos" => Ok(EntityKind::Todo),
            "farming" | "farm" => Ok(EntityKind::Farming),
            _ => Err(format!(
                "Invalid entity kind '{}'. Valid options: mint, todo, farming",
                s
            )),
        }
    }
}
