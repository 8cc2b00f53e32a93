//! TaskEngine - タスクのライフサイクル
//!
//! submit / cancel / claim / mark / TTL をすべて TaskStore の条件付き更新
//! 1 回（Body を含む操作は 2 回）で表現します。
//!
//! # 設計原則
//! - 前提条件は `TaskFilter` に入れる（先に読んでから書くことはしない）
//! - 「キャンセルできなかった」「取れるタスクがない」はエラーではなく値
//! - ストアのエラーはそのまま返す。エンジンはリトライしない
//! - 時刻は注入された `Clock` からだけ取る

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::app::status::TaskCounts;
use crate::domain::{
    EngineError, Execution, ExecutionId, Task, TaskBody, TaskConfig, TaskGroup, TaskId, TaskState,
};
use crate::impls::{InMemoryBodyStore, InMemoryTaskStore};
use crate::ports::{
    BodyRecord, BodyStore, Clock, IdGenerator, SortBy, TaskFilter, TaskStore, TaskUpdate,
    UlidGenerator,
};

/// Documents removed by one expiry sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeReport {
    pub tasks: usize,
    pub bodies: usize,
}

pub struct TaskEngine {
    tasks: Arc<dyn TaskStore>,
    bodies: Arc<dyn BodyStore>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    claim_order: SortBy,
}

impl TaskEngine {
    /// Ids come from a `UlidGenerator` on the same clock.
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        bodies: Arc<dyn BodyStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let ids = Arc::new(UlidGenerator::new(Arc::clone(&clock)));
        Self {
            tasks,
            bodies,
            clock,
            ids,
            claim_order: SortBy::default(),
        }
    }

    pub fn in_memory(clock: Arc<dyn Clock>) -> Self {
        Self::new(
            Arc::new(InMemoryTaskStore::new()),
            Arc::new(InMemoryBodyStore::new()),
            clock,
        )
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_claim_order(mut self, claim_order: SortBy) -> Self {
        self.claim_order = claim_order;
        self
    }

    pub fn claim_order(&self) -> SortBy {
        self.claim_order
    }

    /// Validates the config, then writes the body and the task.
    ///
    /// The two inserts are independent. The body goes first, so a crash in
    /// between leaves an orphaned body (which expires with the same
    /// `delete_after`) rather than a task whose payload is missing.
    #[instrument(skip_all, fields(attempt_count = config.attempt_count))]
    pub async fn submit(&self, config: TaskConfig, body: TaskBody) -> Result<TaskId, EngineError> {
        config.validate()?;

        let now = self.clock.now();
        let delete_after = config.ttl.map(|ttl| deadline(now, ttl)).transpose()?;
        let task_id = self.ids.generate_task_id();

        self.bodies
            .insert(BodyRecord {
                task_id,
                body,
                delete_after,
            })
            .await?;
        self.tasks
            .insert(Task::submitted(task_id, &config, now, delete_after))
            .await?;

        debug!(%task_id, ?delete_after, "task submitted");
        Ok(task_id)
    }

    pub async fn load_task(&self, task_id: TaskId) -> Result<Option<Task>, EngineError> {
        Ok(self.tasks.find(&TaskFilter::task(task_id)).await?)
    }

    pub async fn load_task_body(&self, task_id: TaskId) -> Result<Option<TaskBody>, EngineError> {
        Ok(self.bodies.find(task_id).await?.map(|record| record.body))
    }

    pub async fn task_exists(&self, task_id: TaskId) -> Result<bool, EngineError> {
        Ok(self.load_task(task_id).await?.is_some())
    }

    /// Looks an execution up by its own id, whatever its state.
    pub async fn find_execution(
        &self,
        execution_id: ExecutionId,
    ) -> Result<Option<Execution>, EngineError> {
        let filter = TaskFilter::default().containing_execution(execution_id);
        let task = self.tasks.find(&filter).await?;
        Ok(task.and_then(|t| t.execution(execution_id).cloned()))
    }

    /// Cancels a task that is waiting to be claimed.
    ///
    /// `expected_last_execution_id` is the fencing token: it must equal the
    /// task's `last_execution_id`. `None` matches only a task that has never
    /// been claimed.
    #[instrument(skip_all, fields(%task_id, ?expected_last_execution_id))]
    pub async fn cancel(
        &self,
        task_id: TaskId,
        expected_last_execution_id: Option<ExecutionId>,
    ) -> Result<bool, EngineError> {
        let filter = TaskFilter::task(task_id)
            .last_execution_id(expected_last_execution_id)
            .available(true)
            .with_attempts_left();
        let update = TaskUpdate::Cancel {
            now: self.clock.now(),
        };

        let cancelled = self.tasks.update_one(&filter, &update).await? == 1;
        debug!(cancelled, "cancel");
        Ok(cancelled)
    }

    /// Claims the next available task across all groups.
    pub async fn claim_next_execution(&self) -> Result<Option<Execution>, EngineError> {
        self.claim_next_execution_in(&[]).await
    }

    /// Claims the next available task whose group is in `groups`.
    /// An empty slice claims from every group, ungrouped tasks included.
    #[instrument(skip_all, fields(groups = groups.len()))]
    pub async fn claim_next_execution_in(
        &self,
        groups: &[TaskGroup],
    ) -> Result<Option<Execution>, EngineError> {
        let execution_id = self.ids.generate_execution_id();
        let filter = TaskFilter::claimable().in_groups(groups);
        let update = TaskUpdate::StartExecution {
            execution_id,
            now: self.clock.now(),
        };

        let Some(task) = self
            .tasks
            .find_one_and_update(&filter, &update, self.claim_order)
            .await?
        else {
            return Ok(None);
        };

        let execution = task.execution(execution_id).cloned();
        if let Some(execution) = &execution {
            debug!(
                task_id = %execution.task_id,
                %execution_id,
                attempts_left = task.attempts_left,
                "execution claimed"
            );
        }
        Ok(execution)
    }

    #[instrument(skip_all, fields(%execution_id))]
    pub async fn mark_succeeded(&self, execution_id: ExecutionId) -> Result<bool, EngineError> {
        let update = TaskUpdate::MarkSucceeded {
            execution_id,
            now: self.clock.now(),
        };
        self.finish_execution(execution_id, update).await
    }

    /// Puts the task back up for claiming if it still has attempts left.
    #[instrument(skip_all, fields(%execution_id))]
    pub async fn mark_failed(&self, execution_id: ExecutionId) -> Result<bool, EngineError> {
        let update = TaskUpdate::MarkFailed {
            execution_id,
            now: self.clock.now(),
        };
        self.finish_execution(execution_id, update).await
    }

    /// Only the live execution of a running task can be finished, and only once.
    async fn finish_execution(
        &self,
        execution_id: ExecutionId,
        update: TaskUpdate,
    ) -> Result<bool, EngineError> {
        let filter = TaskFilter::default()
            .last_execution_id(Some(execution_id))
            .state(TaskState::Running)
            .live_execution(execution_id);

        let finished = self.tasks.update_one(&filter, &update).await? == 1;
        debug!(finished, "execution report");
        Ok(finished)
    }

    /// Makes the task and its body eligible for deletion `ttl` from now.
    #[instrument(skip_all, fields(%task_id, ?ttl))]
    pub async fn set_ttl(&self, task_id: TaskId, ttl: Duration) -> Result<bool, EngineError> {
        let now = self.clock.now();
        let delete_after = deadline(now, ttl)?;
        self.update_delete_after(task_id, Some(delete_after), now)
            .await
    }

    #[instrument(skip_all, fields(%task_id))]
    pub async fn keep_forever(&self, task_id: TaskId) -> Result<bool, EngineError> {
        let now = self.clock.now();
        self.update_delete_after(task_id, None, now).await
    }

    /// Task first, body second; the body write is skipped if the task is gone.
    async fn update_delete_after(
        &self,
        task_id: TaskId,
        delete_after: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<bool, EngineError> {
        let update = TaskUpdate::SetDeleteAfter { delete_after, now };
        if self
            .tasks
            .update_one(&TaskFilter::task(task_id), &update)
            .await?
            == 0
        {
            return Ok(false);
        }

        if self.bodies.set_delete_after(task_id, delete_after).await? == 0 {
            warn!(%task_id, "task has no body; only the task deadline was updated");
        }
        Ok(true)
    }

    /// Remaining time until the task may be deleted.
    ///
    /// `None` when no TTL is set or the task does not exist. A deadline that
    /// has already passed reports `Duration::ZERO`. Task and body deadlines
    /// must agree; a missing body is tolerated.
    pub async fn get_ttl(&self, task_id: TaskId) -> Result<Option<Duration>, EngineError> {
        let now = self.clock.now();
        let Some(task) = self.tasks.find(&TaskFilter::task(task_id)).await? else {
            return Ok(None);
        };

        if let Some(body) = self.bodies.find(task_id).await?
            && body.delete_after != task.delete_after
        {
            return Err(EngineError::InconsistentTtl {
                task_id,
                task_delete_after: task.delete_after,
                body_delete_after: body.delete_after,
            });
        }

        Ok(task
            .delete_after
            .map(|at| (at - now).to_std().unwrap_or(Duration::ZERO)))
    }

    pub async fn counts(&self) -> Result<TaskCounts, EngineError> {
        Ok(self.tasks.count_by_state().await?)
    }

    /// One pass of the expiry sweep over both stores.
    #[instrument(skip_all)]
    pub async fn purge_expired(&self) -> Result<PurgeReport, EngineError> {
        let now = self.clock.now();
        let report = PurgeReport {
            tasks: self.tasks.purge_expired(now).await?,
            bodies: self.bodies.purge_expired(now).await?,
        };
        if report.tasks > 0 || report.bodies > 0 {
            debug!(tasks = report.tasks, bodies = report.bodies, "expired documents purged");
        }
        Ok(report)
    }
}

fn deadline(now: DateTime<Utc>, ttl: Duration) -> Result<DateTime<Utc>, EngineError> {
    TimeDelta::from_std(ttl)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .ok_or_else(|| EngineError::InvalidConfig(format!("ttl {ttl:?} is out of range")))
}
