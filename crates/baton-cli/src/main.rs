use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::time::{Duration, sleep};
use tracing::info;

use baton_core::app::{
    EngineConfig, ExecutionHandler, ExpirySweeper, HandlerError, TaskEngine, WorkerGroup,
};
use baton_core::domain::{Execution, TaskBody, TaskConfig, TaskId};
use baton_core::observability::{LogFormat, init_logging};
use baton_core::ports::SystemClock;

#[derive(Debug, Serialize, Deserialize)]
struct HelloPayload {
    name: String,
}

/// 最初の n 回は失敗する handler
struct HelloHandler {
    remaining_failures: AtomicU32,
}

impl HelloHandler {
    fn new(n: u32) -> Self {
        Self {
            remaining_failures: AtomicU32::new(n),
        }
    }
}

#[async_trait]
impl ExecutionHandler for HelloHandler {
    async fn handle(
        &self,
        execution: &Execution,
        body: Option<TaskBody>,
    ) -> Result<(), HandlerError> {
        let p: HelloPayload = body
            .ok_or_else(|| HandlerError::failed("body expired"))?
            .decode()?;

        let failed = self
            .remaining_failures
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |left| {
                left.checked_sub(1)
            });
        if let Ok(left) = failed {
            return Err(HandlerError::failed(format!(
                "intentional failure (left={left})"
            )));
        }

        info!(task_id = %execution.task_id, "Hello, {}!", p.name);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let format = std::env::var("BATON_LOG_FORMAT")
        .ok()
        .and_then(|raw| raw.parse::<LogFormat>().ok())
        .unwrap_or_default();
    init_logging(format);

    // (A) 設定とエンジン（インメモリ）を用意
    let config = EngineConfig::from_env()?;
    let engine = Arc::new(
        TaskEngine::in_memory(Arc::new(SystemClock)).with_claim_order(config.claim_order),
    );

    // (B) タスク投入（JSON body）
    let mut task_ids: Vec<TaskId> = Vec::new();
    for name in ["baton", "relay", "anchor"] {
        let mut task_config = TaskConfig::new(
            config.default_attempt_count,
            Some(std::time::Duration::from_secs(3600)),
        )?;
        // worker が group を絞っている場合でも拾えるように
        if let Some(group) = config.worker_groups.first() {
            task_config = task_config.with_group(group.clone());
        }
        let body = TaskBody::from_json(&HelloPayload {
            name: name.to_string(),
        })?;
        let task_id = engine.submit(task_config, body).await?;
        info!(%task_id, name, "submitted");
        task_ids.push(task_id);
    }

    // 一度も claim されていないので fencing token なしで cancel できる
    let doomed = engine
        .submit(TaskConfig::new(1, None)?, TaskBody::new("{\"name\":\"never\"}"))
        .await?;
    let cancelled = engine.cancel(doomed, None).await?;
    info!(task_id = %doomed, cancelled, "cancel");
    task_ids.push(doomed);

    // (C) worker と expiry sweeper を起動
    let workers = WorkerGroup::spawn(
        &config,
        Arc::clone(&engine),
        Arc::new(HelloHandler::new(2)),
    );
    let sweeper = ExpirySweeper::spawn(Arc::clone(&engine), config.sweep_interval);

    // (D) 全タスクが落ち着くまでポーリング
    loop {
        let mut settled = true;
        for task_id in &task_ids {
            if let Some(task) = engine.load_task(*task_id).await? {
                settled &= task.is_settled();
            }
        }
        if settled {
            break;
        }
        sleep(Duration::from_millis(50)).await;
    }

    for task_id in &task_ids {
        if let Some(task) = engine.load_task(*task_id).await? {
            println!(
                "final status: task={} state={:?} executions={} attempts_left={} ttl={:?}",
                task.task_id,
                task.state,
                task.executions.len(),
                task.attempts_left,
                engine.get_ttl(*task_id).await?,
            );
        }
    }
    println!("counts: {}", serde_json::to_string(&engine.counts().await?)?);

    // (E) graceful shutdown
    workers.shutdown_and_join().await;
    sweeper.shutdown().await;
    Ok(())
}
