//! Offline-first synchronization between a local store and a REST backend.
//!
//! One [`SyncEngine`] serves one entity collection. It only talks to the
//! outside world through three seams:
//! - [`LocalStore`]: durable record collection carrying sync metadata
//! - [`RemoteClient`]: list/create/update/delete against the backend
//! - [`Connectivity`]: consulted once before any network call
//!
//! # Usage
//!
//! ```
//! use mintboard::db::MemoryStore;
//! use mintboard::models::Mint;
//! use mintboard::sync::SyncEngine;
//! # use mintboard::sync::{RemoteClient, RemoteEntity, RemoteError};
//! # struct Offline;
//! # #[async_trait::async_trait]
//! # impl RemoteClient<Mint> for Offline {
//! #     async fn list(&self) -> Result<Vec<RemoteEntity<Mint>>, RemoteError> { Err(RemoteError::network("down")) }
//! #     async fn create(&self, _: uuid::Uuid, _: &Mint) -> Result<RemoteEntity<Mint>, RemoteError> { Err(RemoteError::network("down")) }
//! #     async fn update(&self, _: &str, _: uuid::Uuid, _: &Mint) -> Result<RemoteEntity<Mint>, RemoteError> { Err(RemoteError::network("down")) }
//! #     async fn delete(&self, _: &str) -> Result<(), RemoteError> { Err(RemoteError::network("down")) }
//! # }
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let engine = SyncEngine::new(MemoryStore::<Mint>::new(), Offline);
//! let outcome = engine.run_sync().await;
//! assert!(!outcome.success);
//! # });
//! ```

mod connectivity;
mod engine;
pub mod fingerprint;
#[cfg(test)]
pub(crate) mod mock;
mod notify;
mod remote;
mod store;

pub use connectivity::{AlwaysOnline, Connectivity, ConnectivityFlag};
pub use engine::{
    SyncEngine, SyncError, SyncOutcome, SyncReport, ALREADY_RUNNING, OFFLINE_QUEUED,
    SYNC_COMPLETE,
};
pub use notify::{ChangeKind, ChangeNotifier, RecordChange};
pub use remote::{RemoteClient, RemoteEntity, RemoteError};
pub use store::{LocalStore, StoreError};
