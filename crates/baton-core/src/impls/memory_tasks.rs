//! In-memory task store.
//!
//! Every trait call holds the map lock from filter evaluation to the end of
//! the update, which gives the same per-document atomicity a real document
//! store offers. State is lost when the process exits.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::app::status::TaskCounts;
use crate::domain::{StoreError, Task, TaskId};
use crate::ports::{SortBy, TaskFilter, TaskStore, TaskUpdate};

#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    tasks: Mutex<HashMap<TaskId, Task>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.tasks.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.lock().await.is_empty()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn insert(&self, task: Task) -> Result<(), StoreError> {
        let mut tasks = self.tasks.lock().await;
        match tasks.entry(task.task_id) {
            Entry::Occupied(entry) => Err(StoreError::DuplicateKey(entry.key().to_string())),
            Entry::Vacant(entry) => {
                entry.insert(task);
                Ok(())
            }
        }
    }

    async fn find(&self, filter: &TaskFilter) -> Result<Option<Task>, StoreError> {
        let tasks = self.tasks.lock().await;
        if let Some(task_id) = filter.task_id {
            return Ok(tasks.get(&task_id).filter(|t| filter.matches(t)).cloned());
        }
        Ok(tasks.values().find(|t| filter.matches(t)).cloned())
    }

    async fn find_one_and_update(
        &self,
        filter: &TaskFilter,
        update: &TaskUpdate,
        sort: SortBy,
    ) -> Result<Option<Task>, StoreError> {
        let mut tasks = self.tasks.lock().await;
        let Some(task) = tasks
            .values_mut()
            .filter(|t| filter.matches(t))
            .min_by_key(|t| sort.key(t))
        else {
            return Ok(None);
        };
        update.apply(task);
        Ok(Some(task.clone()))
    }

    async fn update_one(
        &self,
        filter: &TaskFilter,
        update: &TaskUpdate,
    ) -> Result<u64, StoreError> {
        let mut tasks = self.tasks.lock().await;
        let task = match filter.task_id {
            Some(task_id) => tasks.get_mut(&task_id).filter(|t| filter.matches(t)),
            None => tasks.values_mut().find(|t| filter.matches(t)),
        };
        let Some(task) = task else {
            return Ok(0);
        };
        update.apply(task);
        Ok(1)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut tasks = self.tasks.lock().await;
        let before = tasks.len();
        tasks.retain(|_, t| t.delete_after.is_none_or(|at| at > now));
        Ok(before - tasks.len())
    }

    async fn count_by_state(&self) -> Result<TaskCounts, StoreError> {
        let tasks = self.tasks.lock().await;
        Ok(tasks.values().map(|t| t.state).collect())
    }
}
