//! In-memory body store.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain::{StoreError, TaskId};
use crate::ports::{BodyRecord, BodyStore};

#[derive(Debug, Default)]
pub struct InMemoryBodyStore {
    bodies: Mutex<HashMap<TaskId, BodyRecord>>,
}

impl InMemoryBodyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.bodies.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.bodies.lock().await.is_empty()
    }
}

#[async_trait]
impl BodyStore for InMemoryBodyStore {
    async fn insert(&self, record: BodyRecord) -> Result<(), StoreError> {
        let mut bodies = self.bodies.lock().await;
        match bodies.entry(record.task_id) {
            Entry::Occupied(entry) => Err(StoreError::DuplicateKey(entry.key().to_string())),
            Entry::Vacant(entry) => {
                entry.insert(record);
                Ok(())
            }
        }
    }

    async fn find(&self, task_id: TaskId) -> Result<Option<BodyRecord>, StoreError> {
        Ok(self.bodies.lock().await.get(&task_id).cloned())
    }

    async fn set_delete_after(
        &self,
        task_id: TaskId,
        delete_after: Option<DateTime<Utc>>,
    ) -> Result<u64, StoreError> {
        let mut bodies = self.bodies.lock().await;
        let Some(record) = bodies.get_mut(&task_id) else {
            return Ok(0);
        };
        record.delete_after = delete_after;
        Ok(1)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut bodies = self.bodies.lock().await;
        let before = bodies.len();
        bodies.retain(|_, r| r.delete_after.is_none_or(|at| at > now));
        Ok(before - bodies.len())
    }
}
