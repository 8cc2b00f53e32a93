//! Task aggregate and its execution history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::config::{TaskConfig, TaskGroup};
use super::ids::{ExecutionId, TaskId};
use super::state::{ExecutionState, TaskState};

/// One claimed attempt at running a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Execution {
    pub task_id: TaskId,
    pub execution_id: ExecutionId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub state: ExecutionState,
}

/// Task document: the unit of mutual exclusion in the store.
///
/// Design:
/// - This is the "single source of truth" for a task and its executions.
/// - Stores change it only through `TaskUpdate::apply`, after the
///   `TaskFilter` of the same atomic call has matched.
/// - `executions` is append-only, in claim order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: TaskId,
    pub group: Option<TaskGroup>,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub state: TaskState,
    pub is_available_for_execution: bool,

    /// Budget given at submission.
    pub attempt_count: u32,
    pub attempts_left: u32,

    /// Fencing token: id of the most recently created execution.
    pub last_execution_id: Option<ExecutionId>,
    pub executions: Vec<Execution>,

    /// When the task last became claimable. Drives claim ordering;
    /// cleared whenever the task stops being available.
    pub available_since: Option<DateTime<Utc>>,

    /// Earliest moment the background sweep may delete the task.
    pub delete_after: Option<DateTime<Utc>>,
}

impl Task {
    pub fn submitted(
        task_id: TaskId,
        config: &TaskConfig,
        now: DateTime<Utc>,
        delete_after: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            task_id,
            group: config.group.clone(),
            submitted_at: now,
            updated_at: now,
            state: TaskState::Submitted,
            is_available_for_execution: true,
            attempt_count: config.attempt_count,
            attempts_left: config.attempt_count,
            last_execution_id: None,
            executions: Vec::new(),
            available_since: Some(now),
            delete_after,
        }
    }

    pub fn execution(&self, execution_id: ExecutionId) -> Option<&Execution> {
        self.executions
            .iter()
            .find(|e| e.execution_id == execution_id)
    }

    pub fn last_execution(&self) -> Option<&Execution> {
        self.executions.last()
    }

    /// The execution still waiting for a success/failure report, if any.
    pub fn live_execution(&self) -> Option<&Execution> {
        self.executions
            .iter()
            .find(|e| e.state == ExecutionState::Created)
    }

    /// Would a claim select this task right now?
    pub fn is_claimable(&self) -> bool {
        self.is_available_for_execution && self.attempts_left > 0
    }

    /// No execution is live and none can ever be claimed again.
    pub fn is_settled(&self) -> bool {
        self.state.is_terminal() || (self.state == TaskState::Failed && self.attempts_left == 0)
    }

    pub(crate) fn start_execution(&mut self, execution_id: ExecutionId, now: DateTime<Utc>) {
        self.executions.push(Execution {
            task_id: self.task_id,
            execution_id,
            created_at: now,
            updated_at: now,
            state: ExecutionState::Created,
        });
        self.attempts_left = self.attempts_left.saturating_sub(1);
        self.is_available_for_execution = false;
        self.state = TaskState::Running;
        self.last_execution_id = Some(execution_id);
        self.available_since = None;
        self.updated_at = now;
    }

    pub(crate) fn cancel(&mut self, now: DateTime<Utc>) {
        self.state = TaskState::Cancelled;
        self.is_available_for_execution = false;
        self.available_since = None;
        self.updated_at = now;
    }

    pub(crate) fn succeed_execution(&mut self, execution_id: ExecutionId, now: DateTime<Utc>) {
        self.finish_execution(execution_id, ExecutionState::Succeeded, now);
        self.state = TaskState::Succeeded;
    }

    /// Re-opens the task for claiming. With no attempts left it stays
    /// unclaimable because every claim also requires `attempts_left > 0`.
    pub(crate) fn fail_execution(&mut self, execution_id: ExecutionId, now: DateTime<Utc>) {
        self.finish_execution(execution_id, ExecutionState::Failed, now);
        self.state = TaskState::Failed;
        self.is_available_for_execution = true;
        self.available_since = Some(now);
    }

    pub(crate) fn set_delete_after(
        &mut self,
        delete_after: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) {
        self.delete_after = delete_after;
        self.updated_at = now;
    }

    fn finish_execution(
        &mut self,
        execution_id: ExecutionId,
        outcome: ExecutionState,
        now: DateTime<Utc>,
    ) {
        if let Some(execution) = self
            .executions
            .iter_mut()
            .find(|e| e.execution_id == execution_id)
        {
            execution.state = outcome;
            execution.updated_at = now;
        }
        self.updated_at = now;
    }
}
