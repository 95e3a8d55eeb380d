//! Remote client contract consumed by the sync engine.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::models::Entity;

/// A classified backend failure.
///
/// `transient` failures are worth retrying on the next run; anything else
/// stops the current run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RemoteError {
    pub transient: bool,
    pub status_code: Option<u16>,
    pub message: String,
}

impl RemoteError {
    /// Unreachable host, dropped connection, timeout.
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            transient: true,
            status_code: None,
            message: message.into(),
        }
    }

    /// HTTP failure; 429 and 5xx are transient.
    pub fn from_status(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            transient: status_code == 429 || (500..600).contains(&status_code),
            status_code: Some(status_code),
            message: message.into(),
        }
    }

    /// Client-side validation or undecodable response.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            transient: false,
            status_code: None,
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status_code == Some(404)
    }
}

/// An entity as the backend reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEntity<E> {
    pub id: String,
    /// Echo of the client id supplied on create.
    #[serde(default)]
    pub client_id: Option<Uuid>,
    #[serde(flatten)]
    pub payload: E,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Backend API for one entity collection.
#[async_trait]
pub trait RemoteClient<E: Entity>: Send + Sync {
    async fn list(&self) -> Result<Vec<RemoteEntity<E>>, RemoteError>;

    async fn create(&self, client_id: Uuid, payload: &E) -> Result<RemoteEntity<E>, RemoteError>;

    async fn update(
        &self,
        remote_id: &str,
        client_id: Uuid,
        payload: &E,
    ) -> Result<RemoteEntity<E>, RemoteError>;

    async fn delete(&self, remote_id: &str) -> Result<(), RemoteError>;
}

#[async_trait]
impl<E, R> RemoteClient<E> for Arc<R>
where
    E: Entity,
    R: RemoteClient<E> + ?Sized,
{
    async fn list(&self) -> Result<Vec<RemoteEntity<E>>, RemoteError> {
        (**self).list().await
    }

    async fn create(&self, client_id: Uuid, payload: &E) -> Result<RemoteEntity<E>, RemoteError> {
        (**self).create(client_id, payload).await
    }

    async fn update(
        &self,
        remote_id: &str,
        client_id: Uuid,
        payload: &E,
    ) -> Result<RemoteEntity<E>, RemoteError> {
        (**self).update(remote_id, client_id, payload).await
    }

    async fn delete(&self, remote_id: &str) -> Result<(), RemoteError> {
        (**self).delete(remote_id).await
    }
}
