//! Per-kind entity storage for the reference backend.
//!
//! Each collection lives in memory and is written through to one JSON file
//! after every change:
//! ```text
//! <DATA_DIR>/
//!   mints.json
//!   todos.json
//!   farming.json
//! ```
//!
//! Payload fields are opaque to the server; it only owns `id`, `clientId`
//! and the timestamps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

use crate::models::EntityKind;

/// Keys the server manages itself; clients can't set them through the payload.
const RESERVED_FIELDS: [&str; 4] = ["id", "clientId", "createdAt", "updatedAt"];

/// Errors that can occur during server storage operations.
#[derive(Debug)]
pub enum StorageError {
    /// I/O error reading or writing a file.
    IoError(PathBuf, io::Error),
    /// A collection file exists but can't be parsed.
    ParseError(PathBuf, serde_json::Error),
    /// A previous writer panicked while holding the lock.
    Poisoned,
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::IoError(path, e) => {
                write!(f, "I/O error for {}: {}", path.display(), e)
            }
            StorageError::ParseError(path, e) => {
                write!(f, "Failed to load collection {}: {}", path.display(), e)
            }
            StorageError::Poisoned => write!(f, "Storage lock poisoned"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::IoError(_, e) => Some(e),
            StorageError::ParseError(_, e) => Some(e),
            StorageError::Poisoned => None,
        }
    }
}

/// One entity as stored and returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredEntity {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Whether a create stored a new entity or matched an earlier one by client id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    Existing,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Collection {
    next_id: u64,
    entities: BTreeMap<u64, StoredEntity>,
}

impl Collection {
    fn find_by_client_id(&mut self, client_id: Uuid) -> Option<&mut StoredEntity> {
        self.entities
            .values_mut()
            .find(|e| e.client_id == Some(client_id))
    }
}

/// Server-side storage for all entity collections.
#[derive(Debug)]
pub struct EntityStorage {
    data_dir: PathBuf,
    collections: Mutex<HashMap<EntityKind, Collection>>,
}

impl EntityStorage {
    /// Opens the storage, loading every collection file that exists.
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir).map_err(|e| StorageError::IoError(data_dir.clone(), e))?;

        let mut collections = HashMap::new();
        for kind in EntityKind::ALL {
            let path = Self::collection_path(&data_dir, kind);
            let collection = match fs::read(&path) {
                Ok(bytes) => serde_json::from_slice(&bytes)
                    .map_err(|e| StorageError::ParseError(path.clone(), e))?,
                Err(e) if e.kind() == io::ErrorKind::NotFound => Collection::default(),
                Err(e) => return Err(StorageError::IoError(path, e)),
            };
            collections.insert(kind, collection);
        }

        Ok(Self {
            data_dir,
            collections: Mutex::new(collections),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn collection_path(data_dir: &Path, kind: EntityKind) -> PathBuf {
        data_dir.join(format!("{}.json", kind.path()))
    }

    /// Runs `f` against one collection under the lock.
    fn read_collection<T>(
        &self,
        kind: EntityKind,
        f: impl FnOnce(&Collection) -> T,
    ) -> Result<T, StorageError> {
        let mut collections = self.collections.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(f(collections.entry(kind).or_default()))
    }

    /// Runs `f` against a copy of one collection under the lock. When `f`
    /// reports a change the copy is persisted and only then replaces the
    /// in-memory collection, so a failed write leaves both untouched.
    fn write_collection<T>(
        &self,
        kind: EntityKind,
        f: impl FnOnce(&mut Collection) -> (T, bool),
    ) -> Result<T, StorageError> {
        let mut collections = self.collections.lock().map_err(|_| StorageError::Poisoned)?;
        let mut draft = collections.get(&kind).cloned().unwrap_or_default();
        let (result, changed) = f(&mut draft);
        if changed {
            self.persist(kind, &draft)?;
            collections.insert(kind, draft);
        }
        Ok(result)
    }

    /// Writes atomically using temp file + rename.
    fn persist(&self, kind: EntityKind, collection: &Collection) -> Result<(), StorageError> {
        let path = Self::collection_path(&self.data_dir, kind);
        let temp_path = path.with_extension("json.tmp");

        let bytes = serde_json::to_vec_pretty(collection)
            .map_err(|e| StorageError::ParseError(path.clone(), e))?;

        let mut file =
            File::create(&temp_path).map_err(|e| StorageError::IoError(temp_path.clone(), e))?;
        file.write_all(&bytes)
            .map_err(|e| StorageError::IoError(temp_path.clone(), e))?;
        file.sync_all()
            .map_err(|e| StorageError::IoError(temp_path.clone(), e))?;

        fs::rename(&temp_path, &path).map_err(|e| StorageError::IoError(path, e))
    }

    /// All entities of a kind, in id order.
    pub fn list(&self, kind: EntityKind) -> Result<Vec<StoredEntity>, StorageError> {
        self.read_collection(kind, |c| c.entities.values().cloned().collect())
    }

    pub fn get(&self, kind: EntityKind, id: &str) -> Result<Option<StoredEntity>, StorageError> {
        let Some(key) = parse_id(id) else {
            return Ok(None);
        };
        self.read_collection(kind, |c| c.entities.get(&key).cloned())
    }

    /// Stores a new entity. A repeated create carrying a known client id
    /// updates and returns the earlier entity instead.
    pub fn create(
        &self,
        kind: EntityKind,
        client_id: Option<Uuid>,
        fields: Map<String, Value>,
    ) -> Result<(StoredEntity, CreateOutcome), StorageError> {
        let fields = strip_reserved(fields);
        let now = Utc::now();

        self.write_collection(kind, |c| {
            let existing = match client_id {
                Some(id) => c.find_by_client_id(id),
                None => None,
            };
            if let Some(existing) = existing {
                existing.fields = fields;
                existing.updated_at = now;
                return ((existing.clone(), CreateOutcome::Existing), true);
            }

            c.next_id += 1;
            let entity = StoredEntity {
                id: c.next_id.to_string(),
                client_id,
                created_at: now,
                updated_at: now,
                fields,
            };
            c.entities.insert(c.next_id, entity.clone());
            ((entity, CreateOutcome::Created), true)
        })
    }

    /// Replaces an entity's payload. Returns `None` for unknown ids.
    pub fn update(
        &self,
        kind: EntityKind,
        id: &str,
        client_id: Option<Uuid>,
        fields: Map<String, Value>,
    ) -> Result<Option<StoredEntity>, StorageError> {
        let Some(key) = parse_id(id) else {
            return Ok(None);
        };
        let fields = strip_reserved(fields);

        self.write_collection(kind, |c| match c.entities.get_mut(&key) {
            Some(entity) => {
                entity.fields = fields;
                entity.updated_at = Utc::now();
                // First client id wins; later ones are ignored.
                if entity.client_id.is_none() {
                    entity.client_id = client_id;
                }
                (Some(entity.clone()), true)
            }
            None => (None, false),
        })
    }

    /// Returns `false` for unknown ids.
    pub fn delete(&self, kind: EntityKind, id: &str) -> Result<bool, StorageError> {
        let Some(key) = parse_id(id) else {
            return Ok(false);
        };
        self.write_collection(kind, |c| {
            let removed = c.entities.remove(&key).is_some();
            (removed, removed)
        })
    }
}

fn parse_id(id: &str) -> Option<u64> {
    id.parse().ok()
}

fn strip_reserved(mut fields: Map<String, Value>) -> Map<String, Value> {
    for key in RESERVED_FIELDS {
        fields.remove(key);
    }
    fields
}
