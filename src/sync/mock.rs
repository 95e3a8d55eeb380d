//! Scripted in-memory backend for engine tests.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use uuid::Uuid;

use super::{RemoteClient, RemoteEntity, RemoteError};
use crate::models::Entity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Op {
    List,
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    List,
    Create(Uuid),
    Update(String),
    Delete(String),
}

pub(crate) struct MockRemote<E> {
    state: Mutex<MockState<E>>,
}

struct MockState<E> {
    entities: BTreeMap<u64, RemoteEntity<E>>,
    next_id: u64,
    failures: VecDeque<(Op, RemoteError)>,
    calls: Vec<Call>,
}

impl<E: Entity> MockRemote<E> {
    pub(crate) fn new() -> Self {
        Self::starting_at(1)
    }

    /// Backend whose next assigned id is `next_id`.
    pub(crate) fn starting_at(next_id: u64) -> Self {
        Self {
            state: Mutex::new(MockState {
                entities: BTreeMap::new(),
                next_id,
                failures: VecDeque::new(),
                calls: Vec::new(),
            }),
        }
    }

    /// Seeds a row as if another device had created it.
    pub(crate) fn seed(&self, client_id: Option<Uuid>, payload: E) -> String {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id;
        state.next_id += 1;
        let now = Utc::now();
        state.entities.insert(
            id,
            RemoteEntity {
                id: id.to_string(),
                client_id,
                payload,
                created_at: Some(now),
                updated_at: Some(now),
            },
        );
        id.to_string()
    }

    pub(crate) fn set_payload(&self, remote_id: &str, payload: E) {
        let mut state = self.state.lock().unwrap();
        let id: u64 = remote_id.parse().unwrap();
        state.entities.get_mut(&id).unwrap().payload = payload;
    }

    /// The next call of `op` fails with `error`.
    pub(crate) fn fail_next(&self, op: Op, error: RemoteError) {
        self.state.lock().unwrap().failures.push_back((op, error));
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub(crate) fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub(crate) fn entities(&self) -> Vec<RemoteEntity<E>> {
        self.state.lock().unwrap().entities.values().cloned().collect()
    }

    fn begin(&self, op: Op, call: Call) -> Result<std::sync::MutexGuard<'_, MockState<E>>, RemoteError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        if let Some(pos) = state.failures.iter().position(|(o, _)| *o == op) {
            let (_, error) = state.failures.remove(pos).unwrap();
            return Err(error);
        }
        Ok(state)
    }
}

#[async_trait]
impl<E: Entity> RemoteClient<E> for MockRemote<E> {
    async fn list(&self) -> Result<Vec<RemoteEntity<E>>, RemoteError> {
        let state = self.begin(Op::List, Call::List)?;
        Ok(state.entities.values().cloned().collect())
    }

    async fn create(&self, client_id: Uuid, payload: &E) -> Result<RemoteEntity<E>, RemoteError> {
        let mut state = self.begin(Op::Create, Call::Create(client_id))?;
        let id = state.next_id;
        state.next_id += 1;
        let now = Utc::now();
        let entity = RemoteEntity {
            id: id.to_string(),
            client_id: Some(client_id),
            payload: payload.clone(),
            created_at: Some(now),
            updated_at: Some(now),
        };
        state.entities.insert(id, entity.clone());
        Ok(entity)
    }

    async fn update(
        &self,
        remote_id: &str,
        _client_id: Uuid,
        payload: &E,
    ) -> Result<RemoteEntity<E>, RemoteError> {
        let mut state = self.begin(Op::Update, Call::Update(remote_id.to_string()))?;
        let entity = remote_id
            .parse::<u64>()
            .ok()
            .and_then(|id| state.entities.get_mut(&id))
            .ok_or_else(|| RemoteError::from_status(404, "HTTP 404: not found"))?;
        entity.payload = payload.clone();
        entity.updated_at = Some(Utc::now());
        Ok(entity.clone())
    }

    async fn delete(&self, remote_id: &str) -> Result<(), RemoteError> {
        let mut state = self.begin(Op::Delete, Call::Delete(remote_id.to_string()))?;
        let removed = remote_id
            .parse::<u64>()
            .ok()
            .and_then(|id| state.entities.remove(&id));
        match removed {
            Some(_) => Ok(()),
            None => Err(RemoteError::from_status(404, "HTTP 404: not found")),
        }
    }
}
