//! BodyStore port - タスク本体（payload）のストレージ
//!
//! BodyStore は TaskId をキーにした payload を保存します。
//!
//! # 設計原則
//! - TTL（delete_after）を Task とは独立に持つ
//! - Task と Body の書き込みは別々の往復で、トランザクションではない
//! - 期限切れの削除はストア側のスイープに任せる

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{StoreError, TaskBody, TaskId};

/// A body as persisted, with its own expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BodyRecord {
    pub task_id: TaskId,
    pub body: TaskBody,
    pub delete_after: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait BodyStore: Send + Sync {
    /// Fails with `StoreError::DuplicateKey` if a body already exists for the task.
    async fn insert(&self, record: BodyRecord) -> Result<(), StoreError>;

    async fn find(&self, task_id: TaskId) -> Result<Option<BodyRecord>, StoreError>;

    /// Returns the number of matched records (0 or 1).
    async fn set_delete_after(
        &self,
        task_id: TaskId,
        delete_after: Option<DateTime<Utc>>,
    ) -> Result<u64, StoreError>;

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError>;
}
