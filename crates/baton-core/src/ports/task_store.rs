//! TaskStore port - タスク文書の正本（source of truth）
//!
//! TaskStore は「条件付き find-and-update」だけを並行制御の手段として提供します。
//!
//! # 設計原則
//! - 状態遷移の前提条件はすべて `TaskFilter` に書く（read-then-write をしない）
//! - `TaskFilter` の評価と `TaskUpdate` の適用は 1 文書に対して原子的
//! - ロックは持たない。複数プロセスから同時に呼ばれても正しく動く
//!
//! `TaskFilter` / `TaskUpdate` are plain data so that a document store can
//! translate them into a query + update document, and a relational store into
//! `UPDATE ... WHERE ... RETURNING`.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::app::status::TaskCounts;
use crate::domain::{ExecutionId, StoreError, Task, TaskGroup, TaskId, TaskState};

/// Structured predicate over a task document. Unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub task_id: Option<TaskId>,
    pub state: Option<TaskState>,
    pub is_available_for_execution: Option<bool>,
    pub has_attempts_left: bool,

    /// Fencing check. `Some(None)` matches only tasks that never had an
    /// execution; it is not a wildcard.
    pub last_execution_id: Option<Option<ExecutionId>>,

    /// Task holds this execution and it is still `Created`.
    pub live_execution_id: Option<ExecutionId>,

    /// Task holds this execution, in any state.
    pub contains_execution_id: Option<ExecutionId>,

    pub groups: Option<Vec<TaskGroup>>,
}

impl TaskFilter {
    pub fn task(task_id: TaskId) -> Self {
        Self {
            task_id: Some(task_id),
            ..Self::default()
        }
    }

    /// `is_available_for_execution == true AND attempts_left > 0`
    pub fn claimable() -> Self {
        Self {
            is_available_for_execution: Some(true),
            has_attempts_left: true,
            ..Self::default()
        }
    }

    pub fn state(mut self, state: TaskState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn available(mut self, available: bool) -> Self {
        self.is_available_for_execution = Some(available);
        self
    }

    pub fn with_attempts_left(mut self) -> Self {
        self.has_attempts_left = true;
        self
    }

    pub fn last_execution_id(mut self, expected: Option<ExecutionId>) -> Self {
        self.last_execution_id = Some(expected);
        self
    }

    pub fn live_execution(mut self, execution_id: ExecutionId) -> Self {
        self.live_execution_id = Some(execution_id);
        self
    }

    pub fn containing_execution(mut self, execution_id: ExecutionId) -> Self {
        self.contains_execution_id = Some(execution_id);
        self
    }

    /// An empty list leaves the filter unrestricted.
    pub fn in_groups(mut self, groups: &[TaskGroup]) -> Self {
        self.groups = (!groups.is_empty()).then(|| groups.to_vec());
        self
    }

    pub fn matches(&self, task: &Task) -> bool {
        if let Some(task_id) = self.task_id
            && task.task_id != task_id
        {
            return false;
        }
        if let Some(state) = self.state
            && task.state != state
        {
            return false;
        }
        if let Some(available) = self.is_available_for_execution
            && task.is_available_for_execution != available
        {
            return false;
        }
        if self.has_attempts_left && task.attempts_left == 0 {
            return false;
        }
        if let Some(expected) = self.last_execution_id
            && task.last_execution_id != expected
        {
            return false;
        }
        if let Some(execution_id) = self.live_execution_id
            && task
                .live_execution()
                .is_none_or(|e| e.execution_id != execution_id)
        {
            return false;
        }
        if let Some(execution_id) = self.contains_execution_id
            && task.execution(execution_id).is_none()
        {
            return false;
        }
        if let Some(groups) = &self.groups {
            match &task.group {
                Some(group) if groups.contains(group) => {}
                _ => return false,
            }
        }
        true
    }
}

/// Structured mutation, applied only to a document its filter matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskUpdate {
    Cancel {
        now: DateTime<Utc>,
    },
    StartExecution {
        execution_id: ExecutionId,
        now: DateTime<Utc>,
    },
    MarkSucceeded {
        execution_id: ExecutionId,
        now: DateTime<Utc>,
    },
    MarkFailed {
        execution_id: ExecutionId,
        now: DateTime<Utc>,
    },
    SetDeleteAfter {
        delete_after: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    },
}

impl TaskUpdate {
    pub fn apply(&self, task: &mut Task) {
        match *self {
            TaskUpdate::Cancel { now } => task.cancel(now),
            TaskUpdate::StartExecution { execution_id, now } => {
                task.start_execution(execution_id, now)
            }
            TaskUpdate::MarkSucceeded { execution_id, now } => {
                task.succeed_execution(execution_id, now)
            }
            TaskUpdate::MarkFailed { execution_id, now } => task.fail_execution(execution_id, now),
            TaskUpdate::SetDeleteAfter { delete_after, now } => {
                task.set_delete_after(delete_after, now)
            }
        }
    }
}

/// Which matching document `find_one_and_update` picks first.
///
/// Ties are broken by task id, which for ULIDs means submission order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    /// Oldest `available_since` first: a retried task queues up behind
    /// everything that became available before its failure.
    #[default]
    AvailableSince,
    /// Oldest submission first, regardless of retries.
    SubmittedAt,
}

impl SortBy {
    /// Ascending key; documents without the timestamp sort last.
    pub fn key(self, task: &Task) -> (bool, Option<DateTime<Utc>>, TaskId) {
        let at = match self {
            SortBy::AvailableSince => task.available_since,
            SortBy::SubmittedAt => Some(task.submitted_at),
        };
        (at.is_none(), at, task.task_id)
    }
}

impl fmt::Display for SortBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortBy::AvailableSince => f.write_str("available_since"),
            SortBy::SubmittedAt => f.write_str("submitted_at"),
        }
    }
}

impl FromStr for SortBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available_since" => Ok(SortBy::AvailableSince),
            "submitted_at" => Ok(SortBy::SubmittedAt),
            other => Err(format!("unknown sort order '{other}'")),
        }
    }
}

/// TaskStore は Task 文書の永続化を担う
///
/// Every method is a single round trip. Implementations must make
/// `find_one_and_update` and `update_one` atomic per document: the filter is
/// evaluated and the update applied with no interleaving writer.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Fails with `StoreError::DuplicateKey` if the id is taken.
    async fn insert(&self, task: Task) -> Result<(), StoreError>;

    async fn find(&self, filter: &TaskFilter) -> Result<Option<Task>, StoreError>;

    /// Picks the first match by `sort`, applies `update` and returns the
    /// document as it is after the update.
    async fn find_one_and_update(
        &self,
        filter: &TaskFilter,
        update: &TaskUpdate,
        sort: SortBy,
    ) -> Result<Option<Task>, StoreError>;

    /// Returns the number of matched documents (0 or 1).
    async fn update_one(&self, filter: &TaskFilter, update: &TaskUpdate)
    -> Result<u64, StoreError>;

    /// Background expiry: drops every document whose `delete_after <= now`.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError>;

    async fn count_by_state(&self) -> Result<TaskCounts, StoreError>;
}
