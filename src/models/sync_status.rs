use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Where a local record stands relative to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    PendingCreate,
    PendingUpdate,
    PendingDelete,
    Synced,
    Error,
}

impl SyncStatus {
    pub const ALL: [SyncStatus; 5] = [
        SyncStatus::PendingCreate,
        SyncStatus::PendingUpdate,
        SyncStatus::PendingDelete,
        SyncStatus::Synced,
        SyncStatus::Error,
    ];

    /// Statuses picked up by the push phase.
    pub const PUSHABLE: [SyncStatus; 3] = [
        SyncStatus::PendingCreate,
        SyncStatus::PendingUpdate,
        SyncStatus::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::PendingCreate => "pending_create",
            SyncStatus::PendingUpdate => "pending_update",
            SyncStatus::PendingDelete => "pending_delete",
            SyncStatus::Synced => "synced",
            SyncStatus::Error => "error",
        }
    }

    /// True while a local change still waits for the backend.
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            SyncStatus::PendingCreate | SyncStatus::PendingUpdate | SyncStatus::PendingDelete
        )
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SyncStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("Invalid sync status '{}'", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_status_str_roundtrip() {
        for status in SyncStatus::ALL {
            assert_eq!(SyncStatus::from_str(status.as_str()).unwrap(), status);
        }
        assert!(SyncStatus::from_str("deleted").is_err());
    }

    #[test]
    fn test_sync_status_json() {
        let json = serde_json::to_string(&SyncStatus::PendingDelete).unwrap();
        assert_eq!(json, "\"pending_delete\"");
    }

    #[test]
    fn test_is_pending() {
        assert!(SyncStatus::PendingUpdate.is_pending());
        assert!(!SyncStatus::Synced.is_pending());
        assert!(!SyncStatus::Error.is_pending());
    }
}
