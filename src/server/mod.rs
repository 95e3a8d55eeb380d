//! Reference REST backend for mintboard clients.
//!
//! Stores each collection as opaque JSON, assigns decimal ids, and echoes
//! the `clientId` a client sends on create so retried creates stay
//! idempotent.

pub mod auth;
pub mod routes;
pub mod storage;

use std::sync::Arc;

pub use auth::{ApiKeyStore, AuthUser};
pub use routes::{router, ApiError};
pub use storage::{CreateOutcome, EntityStorage, StorageError, StoredEntity};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub api_keys: Arc<ApiKeyStore>,
    pub storage: Arc<EntityStorage>,
}
