//! The three-phase reconciliation run.
//!
//! A run pushes local deletes, then local creates and updates, then pulls
//! the full remote list and merges it into the local store. Each phase
//! finishes before the next starts, and records are processed one at a time
//! so an aborted run leaves exactly the already-processed records changed.
//!
//! All state is re-derived from the store on every run, so calling
//! [`SyncEngine::run_sync`] again after any failure resumes where the last
//! run stopped.

use chrono::Utc;
use serde::Serialize;
use std::collections::HashSet;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::connectivity::{AlwaysOnline, Connectivity};
use super::notify::{ChangeKind, ChangeNotifier, RecordChange};
use super::remote::{RemoteClient, RemoteEntity, RemoteError};
use super::store::{LocalStore, StoreError};
use crate::models::{Entity, LocalId, RecordPatch, SyncRecord, SyncStatus};

pub const SYNC_COMPLETE: &str = "sync complete";
pub const OFFLINE_QUEUED: &str = "offline, queued";
pub const ALREADY_RUNNING: &str = "sync already in progress";

/// Why a run stopped early.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("{0}")]
    Remote(RemoteError),

    #[error("local store failure: {0}")]
    Store(#[from] StoreError),
}

/// Per-run counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Local records removed after a confirmed (or unnecessary) remote delete.
    pub deleted: usize,
    /// Local creates and updates accepted by the backend.
    pub pushed: usize,
    /// Remote entities new to this device.
    pub inserted: usize,
    /// Local records overwritten with remote state.
    pub updated: usize,
    /// Pending local records that only had their remote id backfilled.
    pub backfilled: usize,
    /// Remote entities ignored because the local copy awaits deletion.
    pub skipped: usize,
    /// Records whose remote call failed.
    pub failed: usize,
}

/// Result of [`SyncEngine::run_sync`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    pub success: bool,
    pub message: String,
    pub report: SyncReport,
}

impl SyncOutcome {
    /// The run found the device offline; local changes are waiting, nothing
    /// failed.
    pub fn is_queued(&self) -> bool {
        !self.success && self.message == OFFLINE_QUEUED
    }

    fn failure(message: impl Into<String>, report: SyncReport) -> Self {
        Self {
            success: false,
            message: message.into(),
            report,
        }
    }
}

#[derive(Default)]
struct RunState {
    report: SyncReport,
    first_transient: Option<String>,
}

impl RunState {
    /// Counts a failed record; non-transient failures end the run.
    fn record_failure(&mut self, error: RemoteError) -> Result<(), SyncError> {
        self.report.failed += 1;
        if error.transient {
            self.first_transient.get_or_insert(error.message);
            Ok(())
        } else {
            Err(SyncError::Remote(error))
        }
    }
}

/// Clears the in-flight flag when a run ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Reconciles one entity collection with its backend.
pub struct SyncEngine<E, S, R, C = AlwaysOnline> {
    store: S,
    remote: R,
    connectivity: C,
    notifier: ChangeNotifier,
    in_flight: AtomicBool,
    _entity: PhantomData<fn() -> E>,
}

impl<E, S, R> SyncEngine<E, S, R, AlwaysOnline>
where
    E: Entity,
    S: LocalStore<E>,
    R: RemoteClient<E>,
{
    pub fn new(store: S, remote: R) -> Self {
        Self {
            store,
            remote,
            connectivity: AlwaysOnline,
            notifier: ChangeNotifier::default(),
            in_flight: AtomicBool::new(false),
            _entity: PhantomData,
        }
    }
}

impl<E, S, R, C> SyncEngine<E, S, R, C> {
    pub fn with_connectivity<C2>(self, connectivity: C2) -> SyncEngine<E, S, R, C2> {
        SyncEngine {
            store: self.store,
            remote: self.remote,
            connectivity,
            notifier: self.notifier,
            in_flight: self.in_flight,
            _entity: PhantomData,
        }
    }

    /// Publishes changes on a notifier shared with other components.
    pub fn with_notifier(mut self, notifier: ChangeNotifier) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RecordChange> {
        self.notifier.subscribe()
    }

    pub fn is_syncing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}

impl<E, S, R, C> SyncEngine<E, S, R, C>
where
    E: Entity,
    S: LocalStore<E>,
    R: RemoteClient<E>,
    C: Connectivity,
{
    /// Runs one full reconciliation. Never fails: every problem is folded
    /// into the returned outcome and into per-record `sync_error`s.
    pub async fn run_sync(&self) -> SyncOutcome {
        let Some(_guard) = InFlight::acquire(&self.in_flight) else {
            tracing::warn!("Sync {}: another run is in flight", E::KIND);
            return SyncOutcome::failure(ALREADY_RUNNING, SyncReport::default());
        };

        if !self.connectivity.is_online().await {
            tracing::info!("Sync {}: offline, leaving changes queued", E::KIND);
            return SyncOutcome::failure(OFFLINE_QUEUED, SyncReport::default());
        }

        let mut run = RunState::default();
        let result = self.reconcile(&mut run).await;
        let report = run.report;

        match result {
            Ok(()) => match run.first_transient {
                None => {
                    tracing::info!("Sync {} complete: {:?}", E::KIND, report);
                    SyncOutcome {
                        success: true,
                        message: SYNC_COMPLETE.to_string(),
                        report,
                    }
                }
                Some(message) => {
                    tracing::warn!(
                        "Sync {} finished with {} failed record(s): {}",
                        E::KIND,
                        report.failed,
                        message
                    );
                    SyncOutcome::failure(message, report)
                }
            },
            Err(SyncError::Remote(error)) => {
                tracing::warn!("Sync {} aborted: {}", E::KIND, error);
                SyncOutcome::failure(error.message, report)
            }
            Err(error @ SyncError::Store(_)) => {
                tracing::error!("Sync {} failed: {}", E::KIND, error);
                SyncOutcome::failure(error.to_string(), report)
            }
        }
    }

    async fn reconcile(&self, run: &mut RunState) -> Result<(), SyncError> {
        self.push_deletes(run).await?;
        self.push_changes(run).await?;
        self.pull_and_merge(run).await
    }

    /// Phase A: confirm local deletes with the backend, then drop the rows.
    async fn push_deletes(&self, run: &mut RunState) -> Result<(), SyncError> {
        let pending = self
            .store
            .list_by_sync_status(SyncStatus::PendingDelete)
            .await?;
        tracing::debug!("Sync {}: {} pending delete(s)", E::KIND, pending.len());

        for record in pending {
            if let Some(remote_id) = &record.remote_id {
                match self.remote.delete(remote_id).await {
                    Ok(()) => {}
                    // Already gone remotely, which is what we wanted.
                    Err(error) if error.is_not_found() => {
                        tracing::debug!("Sync {}: remote {} already deleted", E::KIND, remote_id);
                    }
                    Err(error) => {
                        self.mark_sync_error(&record, &error).await;
                        run.record_failure(error)?;
                        continue;
                    }
                }
            }

            self.store.delete(record.local_id).await?;
            self.notify(record.local_id, ChangeKind::Removed);
            run.report.deleted += 1;
        }

        Ok(())
    }

    /// Phase B: push local creates and updates, adopting the server's copy.
    async fn push_changes(&self, run: &mut RunState) -> Result<(), SyncError> {
        let mut pending = Vec::new();
        for status in SyncStatus::PUSHABLE {
            pending.extend(self.store.list_by_sync_status(status).await?);
        }
        pending.retain(|record| !record.is_deleted());
        pending.sort_by_key(|record| record.local_id);
        tracing::debug!("Sync {}: {} pending push(es)", E::KIND, pending.len());

        for record in pending {
            let result = match &record.remote_id {
                Some(remote_id) => {
                    self.remote
                        .update(remote_id, record.client_id, &record.payload)
                        .await
                }
                None => self.remote.create(record.client_id, &record.payload).await,
            };

            match result {
                Ok(remote) => {
                    self.warn_on_foreign_client_id(&record, &remote);
                    let patch = RecordPatch::new()
                        .payload(remote.payload)
                        .remote_id(remote.id)
                        .synced(Utc::now());
                    if self.store.update(record.local_id, patch).await? {
                        self.notify(record.local_id, ChangeKind::Updated);
                        run.report.pushed += 1;
                    }
                }
                Err(error) => {
                    self.mark_sync_error(&record, &error).await;
                    run.record_failure(error)?;
                }
            }
        }

        Ok(())
    }

    /// Phase C: fetch the full remote list and fold it into the store.
    ///
    /// Local rows missing from the remote list are left alone.
    async fn pull_and_merge(&self, run: &mut RunState) -> Result<(), SyncError> {
        let remotes = self.remote.list().await.map_err(SyncError::Remote)?;
        let locals = self.store.list_all().await?;
        let mut index = MergeIndex::new(locals, &remotes);
        tracing::debug!("Sync {}: merging {} remote entities", E::KIND, remotes.len());

        for remote in remotes {
            let now = Utc::now();
            let Some(local) = index.claim(&remote) else {
                let record = SyncRecord {
                    local_id: 0,
                    remote_id: Some(remote.id),
                    client_id: remote
                        .client_id
                        .filter(|id| !index.knows_client_id(id))
                        .unwrap_or_else(Uuid::new_v4),
                    payload: remote.payload,
                    sync_status: SyncStatus::Synced,
                    last_synced_at: Some(now),
                    sync_error: None,
                    deleted_at: None,
                    created_at: remote.created_at.unwrap_or(now),
                    updated_at: now,
                };
                index.remember_client_id(record.client_id);
                let local_id = self.store.add(record).await?;
                self.notify(local_id, ChangeKind::Inserted);
                run.report.inserted += 1;
                continue;
            };

            match local.sync_status {
                SyncStatus::PendingDelete => {
                    run.report.skipped += 1;
                }
                SyncStatus::PendingCreate | SyncStatus::PendingUpdate => {
                    // The local edit is newer; it goes out on the next push.
                    let patch = RecordPatch::new().remote_id(remote.id).clear_error();
                    if self.store.update(local.local_id, patch).await? {
                        self.notify(local.local_id, ChangeKind::Updated);
                        run.report.backfilled += 1;
                    }
                }
                SyncStatus::Synced | SyncStatus::Error => {
                    let patch = RecordPatch::new()
                        .payload(remote.payload)
                        .remote_id(remote.id)
                        .synced(now);
                    if self.store.update(local.local_id, patch).await? {
                        self.notify(local.local_id, ChangeKind::Updated);
                        run.report.updated += 1;
                    }
                }
            }
        }

        Ok(())
    }

    /// Best-effort annotation of a failed record. The pending status is kept
    /// so the intent survives until a later run succeeds.
    async fn mark_sync_error(&self, record: &SyncRecord<E>, error: &RemoteError) {
        tracing::warn!(
            "Sync {}: record {} failed ({}): {}",
            E::KIND,
            record.local_id,
            if error.transient { "transient" } else { "fatal" },
            error
        );

        let status = match record.sync_status {
            SyncStatus::Synced => SyncStatus::Error,
            other => other,
        };
        let patch = RecordPatch::new()
            .status(status)
            .error(error.message.clone());

        match self.store.update(record.local_id, patch).await {
            Ok(true) => self.notify(record.local_id, ChangeKind::Updated),
            Ok(false) => {}
            Err(e) => tracing::warn!(
                "Sync {}: could not record error on {}: {}",
                E::KIND,
                record.local_id,
                e
            ),
        }
    }

    fn warn_on_foreign_client_id(&self, record: &SyncRecord<E>, remote: &RemoteEntity<E>) {
        if let Some(echo) = remote.client_id {
            if echo != record.client_id {
                tracing::warn!(
                    "Sync {}: backend echoed client id {} for local {} (expected {})",
                    E::KIND,
                    echo,
                    record.local_id,
                    record.client_id
                );
            }
        }
    }

    fn notify(&self, local_id: LocalId, change: ChangeKind) {
        self.notifier.notify(E::KIND, local_id, change);
    }
}

/// Local records prepared for matching against the remote list.
struct MergeIndex<E> {
    locals: Vec<(SyncRecord<E>, String)>,
    remote_ids: HashSet<String>,
    client_ids: HashSet<Uuid>,
    claimed: HashSet<LocalId>,
}

impl<E: Entity> MergeIndex<E> {
    fn new(locals: Vec<SyncRecord<E>>, remotes: &[RemoteEntity<E>]) -> Self {
        Self {
            client_ids: locals.iter().map(|r| r.client_id).collect(),
            locals: locals
                .into_iter()
                .map(|record| {
                    let fingerprint = record.payload.fingerprint();
                    (record, fingerprint)
                })
                .collect(),
            remote_ids: remotes.iter().map(|r| r.id.clone()).collect(),
            claimed: HashSet::new(),
        }
    }

    /// Client ids must stay unique locally, even if the backend repeats one.
    fn knows_client_id(&self, client_id: &Uuid) -> bool {
        self.client_ids.contains(client_id)
    }

    fn remember_client_id(&mut self, client_id: Uuid) {
        self.client_ids.insert(client_id);
    }

    /// Finds the local counterpart of `remote` by remote id, then client
    /// id, then fingerprint. A local record is matched at most once per run.
    ///
    /// The fingerprint fallback skips tombstones and records already bound
    /// to a different remote row that is still present remotely.
    fn claim(&mut self, remote: &RemoteEntity<E>) -> Option<SyncRecord<E>> {
        let claimed = &self.claimed;
        let unclaimed = |entry: &&(SyncRecord<E>, String)| !claimed.contains(&entry.0.local_id);

        let by_remote_id = self
            .locals
            .iter()
            .filter(unclaimed)
            .find(|(record, _)| record.remote_id.as_deref() == Some(remote.id.as_str()));

        let by_client_id = || {
            let client_id = remote.client_id?;
            self.locals
                .iter()
                .filter(unclaimed)
                .find(|(record, _)| record.client_id == client_id)
        };

        let by_fingerprint = || {
            let fingerprint = remote.payload.fingerprint();
            self.locals
                .iter()
                .filter(unclaimed)
                .filter(|(record, _)| !record.is_deleted())
                .filter(|(record, _)| match &record.remote_id {
                    None => true,
                    Some(id) => !self.remote_ids.contains(id),
                })
                .find(|(_, local_fingerprint)| *local_fingerprint == fingerprint)
        };

        let found = by_remote_id
            .or_else(by_client_id)
            .or_else(by_fingerprint)
            .map(|(record, _)| record.clone())?;

        self.claimed.insert(found.local_id);
        Some(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::models::{Mint, TaskItem, TodoTask};
    use crate::sync::connectivity::ConnectivityFlag;
    use crate::sync::mock::{Call, MockRemote, Op};
    use async_trait::async_trait;

    type Engine<E> = SyncEngine<E, MemoryStore<E>, MockRemote<E>>;

    fn engine<E: Entity>(remote: MockRemote<E>) -> Engine<E> {
        SyncEngine::new(MemoryStore::new(), remote)
    }

    async fn add<E: Entity>(engine: &Engine<E>, payload: E) -> LocalId {
        engine.store().add(SyncRecord::new(payload)).await.unwrap()
    }

    async fn get<E: Entity>(engine: &Engine<E>, local_id: LocalId) -> Option<SyncRecord<E>> {
        engine.store().get(local_id).await.unwrap()
    }

    async fn tombstone<E: Entity>(engine: &Engine<E>, local_id: LocalId) {
        engine
            .store()
            .update(
                local_id,
                RecordPatch::new()
                    .status(SyncStatus::PendingDelete)
                    .deleted_at(Utc::now()),
            )
            .await
            .unwrap();
    }

    fn pals() -> Mint {
        Mint::new("Pudgy Pals", "ethereum").with_price(0.05)
    }

    #[tokio::test]
    async fn test_create_then_sync() {
        let engine = engine(MockRemote::starting_at(42));
        let id = add(&engine, Mint::new("X", "sol").with_supply(1)).await;

        let record = get(&engine, id).await.unwrap();
        assert_eq!(record.sync_status, SyncStatus::PendingCreate);
        assert!(record.remote_id.is_none());

        let outcome = engine.run_sync().await;
        assert!(outcome.success, "{}", outcome.message);
        assert_eq!(outcome.message, SYNC_COMPLETE);
        assert_eq!(outcome.report.pushed, 1);

        let record = get(&engine, id).await.unwrap();
        assert_eq!(record.remote_id.as_deref(), Some("42"));
        assert_eq!(record.sync_status, SyncStatus::Synced);
        assert!(record.sync_error.is_none());
        assert!(record.last_synced_at.is_some());

        let remote = engine.remote().entities();
        assert_eq!(remote.len(), 1);
        assert_eq!(remote[0].client_id, Some(record.client_id));
    }

    #[tokio::test]
    async fn test_second_run_is_idempotent() {
        let engine = engine(MockRemote::new());
        engine.remote().seed(None, Mint::new("Remote", "sol"));
        add(&engine, pals()).await;
        add(&engine, Mint::new("Other", "base")).await;

        assert!(engine.run_sync().await.success);
        let first = engine.store().list_all().await.unwrap();

        engine.remote().clear_calls();
        let outcome = engine.run_sync().await;
        assert!(outcome.success);
        assert_eq!(outcome.report.pushed, 0);
        assert_eq!(outcome.report.inserted, 0);
        assert_eq!(engine.remote().calls(), vec![Call::List]);

        let second = engine.store().list_all().await.unwrap();
        assert_eq!(first.len(), 3);
        assert_eq!(second.len(), 3);
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.local_id, b.local_id);
            assert_eq!(a.remote_id, b.remote_id);
            assert_eq!(a.client_id, b.client_id);
            assert_eq!(a.payload, b.payload);
            assert_eq!(b.sync_status, SyncStatus::Synced);
        }
    }

    #[tokio::test]
    async fn test_fatal_delete_failure_skips_later_phases() {
        let engine = engine(MockRemote::new());
        let doomed = add(&engine, pals()).await;
        assert!(engine.run_sync().await.success);
        tombstone(&engine, doomed).await;
        let fresh = add(&engine, Mint::new("Fresh", "sol")).await;

        engine.remote().clear_calls();
        engine
            .remote()
            .fail_next(Op::Delete, RemoteError::from_status(403, "HTTP 403: forbidden"));

        let outcome = engine.run_sync().await;
        assert!(!outcome.success);
        assert_eq!(outcome.message, "HTTP 403: forbidden");
        assert_eq!(engine.remote().calls(), vec![Call::Delete("1".to_string())]);

        let fresh = get(&engine, fresh).await.unwrap();
        assert_eq!(fresh.sync_status, SyncStatus::PendingCreate);
        assert!(fresh.remote_id.is_none());
        assert!(fresh.sync_error.is_none());

        let doomed = get(&engine, doomed).await.unwrap();
        assert_eq!(doomed.sync_status, SyncStatus::PendingDelete);
        assert_eq!(doomed.sync_error.as_deref(), Some("HTTP 403: forbidden"));
    }

    #[tokio::test]
    async fn test_transient_delete_failure_continues() {
        let engine = engine(MockRemote::new());
        let doomed = add(&engine, pals()).await;
        assert!(engine.run_sync().await.success);
        tombstone(&engine, doomed).await;
        let fresh = add(&engine, Mint::new("Fresh", "sol")).await;

        engine
            .remote()
            .fail_next(Op::Delete, RemoteError::network("connection reset"));

        let outcome = engine.run_sync().await;
        assert!(!outcome.success);
        assert_eq!(outcome.message, "connection reset");
        assert_eq!(outcome.report.failed, 1);
        assert_eq!(outcome.report.skipped, 1);

        let fresh = get(&engine, fresh).await.unwrap();
        assert_eq!(fresh.sync_status, SyncStatus::Synced);

        // The delete intent survives and the pull did not resurrect it.
        let doomed_record = get(&engine, doomed).await.unwrap();
        assert_eq!(doomed_record.sync_status, SyncStatus::PendingDelete);
        assert!(doomed_record.sync_error.is_some());

        assert!(engine.run_sync().await.success);
        assert!(get(&engine, doomed).await.is_none());
        assert_eq!(engine.remote().entities().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_before_first_push() {
        let engine = engine(MockRemote::new());
        let id = add(&engine, pals()).await;
        tombstone(&engine, id).await;

        let outcome = engine.run_sync().await;
        assert!(outcome.success);
        assert_eq!(outcome.report.deleted, 1);
        assert!(get(&engine, id).await.is_none());
        assert_eq!(engine.remote().calls(), vec![Call::List]);
    }

    #[tokio::test]
    async fn test_remote_not_found_confirms_delete() {
        let engine = engine(MockRemote::new());
        let id = add(&engine, pals()).await;
        assert!(engine.run_sync().await.success);
        tombstone(&engine, id).await;
        engine
            .remote()
            .fail_next(Op::Delete, RemoteError::from_status(404, "HTTP 404: not found"));

        let outcome = engine.run_sync().await;
        assert!(outcome.success, "{}", outcome.message);
        assert!(get(&engine, id).await.is_none());
    }

    #[tokio::test]
    async fn test_transient_create_failure_then_retry() {
        let engine = engine(MockRemote::new());
        let id = add(&engine, pals()).await;
        engine
            .remote()
            .fail_next(Op::Create, RemoteError::from_status(503, "HTTP 503: unavailable"));

        let outcome = engine.run_sync().await;
        assert!(!outcome.success);
        assert_eq!(outcome.message, "HTTP 503: unavailable");

        let record = get(&engine, id).await.unwrap();
        assert_eq!(record.sync_status, SyncStatus::PendingCreate);
        assert_eq!(record.sync_error.as_deref(), Some("HTTP 503: unavailable"));

        let outcome = engine.run_sync().await;
        assert!(outcome.success);
        let record = get(&engine, id).await.unwrap();
        assert_eq!(record.sync_status, SyncStatus::Synced);
        assert!(record.sync_error.is_none());
        assert!(record.remote_id.is_some());
    }

    #[tokio::test]
    async fn test_fatal_push_failure_aborts_before_pull() {
        let engine = engine(MockRemote::new());
        engine.remote().seed(None, Mint::new("Remote only", "sol"));
        let first = add(&engine, pals()).await;
        let second = add(&engine, Mint::new("Second", "sol")).await;
        engine
            .remote()
            .fail_next(Op::Create, RemoteError::from_status(422, "HTTP 422: invalid"));

        let outcome = engine.run_sync().await;
        assert!(!outcome.success);
        assert_eq!(outcome.message, "HTTP 422: invalid");
        assert!(!engine.remote().calls().contains(&Call::List));

        let first = get(&engine, first).await.unwrap();
        assert_eq!(first.sync_status, SyncStatus::PendingCreate);
        assert_eq!(first.sync_error.as_deref(), Some("HTTP 422: invalid"));
        let second = get(&engine, second).await.unwrap();
        assert_eq!(second.sync_status, SyncStatus::PendingCreate);
        assert_eq!(engine.store().list_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_fingerprint_match_backfills_remote_id() {
        let engine = engine(MockRemote::new());
        let remote_id = engine.remote().seed(Some(Uuid::new_v4()), pals());

        let local = Mint::new("  PUDGY pals", "Ethereum").with_price(0.05);
        let id = add(&engine, local).await;
        engine
            .remote()
            .fail_next(Op::Create, RemoteError::network("timed out"));

        engine.run_sync().await;

        let records = engine.store().list_all().await.unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.local_id, id);
        assert_eq!(record.remote_id.as_deref(), Some(remote_id.as_str()));
        assert!(record.sync_error.is_none());

        // Now bound to the existing row, the next push updates instead of
        // creating a duplicate.
        engine.remote().clear_calls();
        assert!(engine.run_sync().await.success);
        assert_eq!(
            engine.remote().calls(),
            vec![Call::Update(remote_id), Call::List]
        );
        assert_eq!(engine.remote().entities().len(), 1);
    }

    #[tokio::test]
    async fn test_fingerprint_match_claims_once() {
        let engine = engine(MockRemote::new());
        let first = engine.remote().seed(None, pals());
        let second = engine.remote().seed(None, pals());
        let id = add(&engine, pals()).await;
        engine
            .remote()
            .fail_next(Op::Create, RemoteError::network("timed out"));

        engine.run_sync().await;

        // One duplicate binds to the pending record, the other becomes a
        // record of its own.
        let records = engine.store().list_all().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].local_id, id);
        assert_eq!(records[0].remote_id.as_deref(), Some(first.as_str()));
        assert_eq!(records[1].remote_id.as_deref(), Some(second.as_str()));
        assert_eq!(records[1].sync_status, SyncStatus::Synced);
    }

    #[tokio::test]
    async fn test_lookalike_text_does_not_bind_to_foreign_row() {
        let engine = engine(MockRemote::new());
        let foreign = engine.remote().seed(None, Mint::new("a|b", "c"));
        let id = add(&engine, Mint::new("a", "b|c")).await;
        engine
            .remote()
            .fail_next(Op::Create, RemoteError::network("timed out"));

        let outcome = engine.run_sync().await;
        assert_eq!(outcome.report.inserted, 1);
        assert_eq!(outcome.report.backfilled, 0);
        assert!(get(&engine, id).await.unwrap().remote_id.is_none());

        assert!(engine.run_sync().await.success);
        let remote = engine.remote().entities();
        assert_eq!(remote.len(), 2);
        assert_eq!(remote[0].id, foreign);
        assert_eq!(remote[0].payload, Mint::new("a|b", "c"));
        assert_eq!(remote[1].payload, Mint::new("a", "b|c"));
    }

    #[tokio::test]
    async fn test_client_id_match_backfills_lost_create() {
        let engine = engine(MockRemote::new());
        let id = add(&engine, pals()).await;
        let client_id = get(&engine, id).await.unwrap().client_id;

        // The create reached the backend but the response was lost, and the
        // row has since changed there.
        let remote_id = engine
            .remote()
            .seed(Some(client_id), Mint::new("Renamed", "base"));
        engine
            .remote()
            .fail_next(Op::Create, RemoteError::network("timed out"));

        let outcome = engine.run_sync().await;
        assert_eq!(outcome.report.backfilled, 1);
        assert_eq!(outcome.report.inserted, 0);

        let records = engine.store().list_all().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].local_id, id);
        assert_eq!(records[0].remote_id.as_deref(), Some(remote_id.as_str()));
        assert_eq!(records[0].sync_status, SyncStatus::PendingCreate);
        assert_eq!(records[0].payload, pals());

        engine.remote().clear_calls();
        assert!(engine.run_sync().await.success);
        assert_eq!(
            engine.remote().calls(),
            vec![Call::Update(remote_id), Call::List]
        );
        assert_eq!(engine.remote().entities().len(), 1);
        assert_eq!(engine.remote().entities()[0].payload, pals());
    }

    #[tokio::test]
    async fn test_fingerprint_skips_tombstones() {
        let engine = engine(MockRemote::new());
        let remote_id = engine.remote().seed(None, pals());

        let mut record = SyncRecord::new(pals());
        record.remote_id = Some("999".to_string());
        record.sync_status = SyncStatus::PendingDelete;
        record.deleted_at = Some(Utc::now());
        let id = engine.store().add(record).await.unwrap();
        engine
            .remote()
            .fail_next(Op::Delete, RemoteError::network("connection reset"));

        let outcome = engine.run_sync().await;
        assert_eq!(outcome.report.inserted, 1);
        assert_eq!(outcome.report.skipped, 0);

        let tombstone = get(&engine, id).await.unwrap();
        assert_eq!(tombstone.sync_status, SyncStatus::PendingDelete);
        assert_eq!(tombstone.remote_id.as_deref(), Some("999"));

        let records = engine.store().list_all().await.unwrap();
        assert_eq!(records.len(), 2);
        let inserted = records.iter().find(|r| r.local_id != id).unwrap();
        assert_eq!(inserted.remote_id.as_deref(), Some(remote_id.as_str()));
        assert_eq!(inserted.sync_status, SyncStatus::Synced);
    }

    #[tokio::test]
    async fn test_no_phantom_deletes() {
        let engine = engine(MockRemote::new());
        let mut record = SyncRecord::new(pals());
        record.remote_id = Some("999".to_string());
        record.sync_status = SyncStatus::Synced;
        let id = engine.store().add(record).await.unwrap();

        assert!(engine.run_sync().await.success);
        let record = get(&engine, id).await.unwrap();
        assert_eq!(record.sync_status, SyncStatus::Synced);
        assert_eq!(record.remote_id.as_deref(), Some("999"));
    }

    #[tokio::test]
    async fn test_pending_update_wins_over_remote() {
        let engine = engine(MockRemote::new());
        let id = add(&engine, TodoTask::new("Write report")).await;
        assert!(engine.run_sync().await.success);
        let remote_id = get(&engine, id).await.unwrap().remote_id.unwrap();

        engine
            .remote()
            .set_payload(&remote_id, TodoTask::new("Changed elsewhere"));
        let edited = TodoTask::new("Write report").with_subtasks(vec![TaskItem::new("outline")]);
        engine
            .store()
            .update(
                id,
                RecordPatch::new()
                    .payload(edited.clone())
                    .status(SyncStatus::PendingUpdate),
            )
            .await
            .unwrap();
        engine
            .remote()
            .fail_next(Op::Update, RemoteError::from_status(502, "HTTP 502: bad gateway"));

        engine.run_sync().await;

        let record = get(&engine, id).await.unwrap();
        assert_eq!(record.sync_status, SyncStatus::PendingUpdate);
        assert_eq!(record.payload, edited);
        assert!(record.sync_error.is_none());

        assert!(engine.run_sync().await.success);
        let record = get(&engine, id).await.unwrap();
        assert_eq!(record.sync_status, SyncStatus::Synced);
        assert_eq!(engine.remote().entities()[0].payload, edited);
    }

    #[tokio::test]
    async fn test_pull_inserts_and_refreshes() {
        let engine = engine(MockRemote::new());
        let id = add(&engine, TodoTask::new("Mine")).await;
        assert!(engine.run_sync().await.success);
        let remote_id = get(&engine, id).await.unwrap().remote_id.unwrap();

        let client_id = Uuid::new_v4();
        engine.remote().seed(Some(client_id), TodoTask::new("From phone"));
        let mut refreshed = TodoTask::new("Mine");
        refreshed.completed = true;
        engine.remote().set_payload(&remote_id, refreshed.clone());

        let outcome = engine.run_sync().await;
        assert!(outcome.success);
        assert_eq!(outcome.report.inserted, 1);
        assert_eq!(outcome.report.updated, 1);

        assert_eq!(get(&engine, id).await.unwrap().payload, refreshed);
        let inserted = engine
            .store()
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .find(|r| r.local_id != id)
            .unwrap();
        assert_eq!(inserted.client_id, client_id);
        assert_eq!(inserted.sync_status, SyncStatus::Synced);
        assert_eq!(inserted.payload.title, "From phone");
    }

    #[tokio::test]
    async fn test_error_record_is_refreshed_from_remote() {
        let engine = engine(MockRemote::new());
        let client_id = Uuid::new_v4();
        let remote_id = engine.remote().seed(Some(client_id), pals());

        let mut record = SyncRecord::new(Mint::new("Stale", "sol"));
        record.client_id = client_id;
        record.remote_id = Some(remote_id.clone());
        record.sync_status = SyncStatus::Error;
        record.sync_error = Some("old failure".to_string());
        let id = engine.store().add(record).await.unwrap();

        // Push re-sends the stale payload, then the pull confirms it.
        assert!(engine.run_sync().await.success);
        let record = get(&engine, id).await.unwrap();
        assert_eq!(record.sync_status, SyncStatus::Synced);
        assert!(record.sync_error.is_none());
        assert_eq!(record.payload.name, "Stale");
    }

    #[tokio::test]
    async fn test_list_failure_reports_message() {
        let engine = engine(MockRemote::<Mint>::new());
        engine
            .remote()
            .fail_next(Op::List, RemoteError::from_status(500, "HTTP 500: boom"));

        let outcome = engine.run_sync().await;
        assert!(!outcome.success);
        assert!(!outcome.is_queued());
        assert_eq!(outcome.message, "HTTP 500: boom");
    }

    #[tokio::test]
    async fn test_offline_short_circuits() {
        let flag = ConnectivityFlag::new(false);
        let engine = engine(MockRemote::new()).with_connectivity(flag.clone());
        engine.store().add(SyncRecord::new(pals())).await.unwrap();

        let outcome = engine.run_sync().await;
        assert!(!outcome.success);
        assert_eq!(outcome.message, OFFLINE_QUEUED);
        assert!(outcome.is_queued());
        assert!(engine.remote().calls().is_empty());

        flag.set_online(true);
        let outcome = engine.run_sync().await;
        assert!(outcome.success);
        assert!(!outcome.is_queued());
    }

    #[tokio::test]
    async fn test_concurrent_sync_rejected() {
        let engine = engine(MockRemote::<Mint>::new());
        engine.in_flight.store(true, Ordering::Release);

        let outcome = engine.run_sync().await;
        assert!(!outcome.success);
        assert_eq!(outcome.message, ALREADY_RUNNING);
        assert!(engine.remote().calls().is_empty());

        engine.in_flight.store(false, Ordering::Release);
        assert!(engine.run_sync().await.success);
        assert!(!engine.is_syncing());
    }

    #[tokio::test]
    async fn test_changes_are_published() {
        let engine = engine(MockRemote::new());
        let mut rx = engine.subscribe();
        let id = add(&engine, pals()).await;

        engine.run_sync().await;

        let change = rx.recv().await.unwrap();
        assert_eq!(change.local_id, id);
        assert_eq!(change.kind, crate::models::EntityKind::Mint);
        assert_eq!(change.change, ChangeKind::Updated);
    }

    struct BrokenStore;

    #[async_trait]
    impl LocalStore<Mint> for BrokenStore {
        async fn add(&self, _: SyncRecord<Mint>) -> Result<LocalId, StoreError> {
            Err(StoreError::Unavailable("quota exceeded".to_string()))
        }
        async fn get(&self, _: LocalId) -> Result<Option<SyncRecord<Mint>>, StoreError> {
            Err(StoreError::Unavailable("quota exceeded".to_string()))
        }
        async fn update(&self, _: LocalId, _: RecordPatch<Mint>) -> Result<bool, StoreError> {
            Err(StoreError::Unavailable("quota exceeded".to_string()))
        }
        async fn delete(&self, _: LocalId) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("quota exceeded".to_string()))
        }
        async fn list_by_sync_status(
            &self,
            _: SyncStatus,
        ) -> Result<Vec<SyncRecord<Mint>>, StoreError> {
            Err(StoreError::Unavailable("quota exceeded".to_string()))
        }
        async fn list_all(&self) -> Result<Vec<SyncRecord<Mint>>, StoreError> {
            Err(StoreError::Unavailable("quota exceeded".to_string()))
        }
    }

    #[tokio::test]
    async fn test_store_failure_is_reported() {
        let engine = SyncEngine::new(BrokenStore, MockRemote::<Mint>::new());
        let outcome = engine.run_sync().await;
        assert!(!outcome.success);
        assert!(outcome.message.starts_with("local store failure"));
        assert!(outcome.message.contains("quota exceeded"));
        assert!(!engine.is_syncing());
    }
}
