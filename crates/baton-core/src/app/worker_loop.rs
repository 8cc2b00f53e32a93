//! WorkerLoop - タスク実行ループ
//!
//! claim → body 読み込み → handler 実行 → mark_succeeded / mark_failed
//!
//! - 何も取れなければ `poll_interval` だけ待つ（shutdown とは select で競合）
//! - 実行中の handler は中断しない。shutdown 後は新しい claim をしないだけ
//! - handler の panic は失敗扱い（mark_failed）にして、ワーカーは動き続ける
//! - 放棄された execution の検知はこのループの責務ではない

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, warn};

use crate::app::config::EngineConfig;
use crate::app::engine::TaskEngine;
use crate::domain::{Execution, TaskBody, TaskGroup};
use crate::observability::execution_span;

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{0}")]
    Failed(String),

    #[error("malformed task body: {0}")]
    Payload(#[from] serde_json::Error),
}

impl HandlerError {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }
}

/// Runs one claimed execution. An `Err` marks the execution failed.
#[async_trait]
pub trait ExecutionHandler: Send + Sync {
    async fn handle(&self, execution: &Execution, body: Option<TaskBody>)
    -> Result<(), HandlerError>;
}

/// Worker group handle.
/// - `request_shutdown()` で全ワーカーが新しい claim をやめる
/// - handle を drop しても同様に止まる
/// - `shutdown_and_join()` で全ワーカーの終了を待てる
pub struct WorkerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

#[derive(Debug, Clone)]
struct WorkerSettings {
    poll_interval: Duration,
    groups: Vec<TaskGroup>,
}

impl WorkerGroup {
    /// Spawns `config.workers` workers claiming from `config.worker_groups`.
    pub fn spawn(
        config: &EngineConfig,
        engine: Arc<TaskEngine>,
        handler: Arc<dyn ExecutionHandler>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let settings = WorkerSettings {
            poll_interval: config.poll_interval,
            groups: config.worker_groups.clone(),
        };

        let mut joins = Vec::with_capacity(config.workers);
        for worker_id in 0..config.workers {
            let engine = Arc::clone(&engine);
            let handler = Arc::clone(&handler);
            let settings = settings.clone();
            let mut rx = shutdown_rx.clone();

            joins.push(tokio::spawn(async move {
                worker_loop(worker_id, engine, handler, settings, &mut rx).await;
            }));
        }

        info!(workers = config.workers, "worker group started");
        Self { shutdown_tx, joins }
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    pub fn request_shutdown(&self) {
        // receivers may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for join in self.joins {
            if let Err(e) = join.await {
                error!(error = %e, "worker task panicked");
            }
        }
        info!("worker group stopped");
    }
}

async fn worker_loop(
    worker_id: usize,
    engine: Arc<TaskEngine>,
    handler: Arc<dyn ExecutionHandler>,
    settings: WorkerSettings,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let execution = match engine.claim_next_execution_in(&settings.groups).await {
            Ok(Some(execution)) => execution,
            Ok(None) => {
                if !idle(settings.poll_interval, shutdown_rx).await {
                    break;
                }
                continue;
            }
            Err(e) => {
                error!(worker_id, error = %e, "claim failed");
                if !idle(settings.poll_interval, shutdown_rx).await {
                    break;
                }
                continue;
            }
        };

        let span = execution_span(execution.task_id, execution.execution_id);
        run_execution(worker_id, &engine, &handler, &execution)
            .instrument(span)
            .await;
    }
    debug!(worker_id, "worker stopped");
}

/// Returns false once the group handle is gone.
async fn idle(poll_interval: Duration, shutdown_rx: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        changed = shutdown_rx.changed() => changed.is_ok(),
        _ = tokio::time::sleep(poll_interval) => true,
    }
}

async fn run_execution(
    worker_id: usize,
    engine: &TaskEngine,
    handler: &Arc<dyn ExecutionHandler>,
    execution: &Execution,
) {
    let execution_id = execution.execution_id;

    let outcome = match engine.load_task_body(execution.task_id).await {
        Ok(body) => run_handler(Arc::clone(handler), execution.clone(), body).await,
        Err(e) => Err(HandlerError::failed(format!("could not load body: {e}"))),
    };

    let reported = match &outcome {
        Ok(()) => engine.mark_succeeded(execution_id).await,
        Err(e) => {
            warn!(worker_id, %execution_id, error = %e, "execution failed");
            engine.mark_failed(execution_id).await
        }
    };

    match reported {
        Ok(true) => {
            debug!(worker_id, %execution_id, ok = outcome.is_ok(), "execution reported")
        }
        Ok(false) => {
            warn!(worker_id, %execution_id, "execution was no longer live; report dropped")
        }
        Err(e) => error!(worker_id, %execution_id, error = %e, "could not report execution"),
    }
}

/// Runs the handler on its own task so a panic fails the execution instead
/// of taking the worker down with it.
async fn run_handler(
    handler: Arc<dyn ExecutionHandler>,
    execution: Execution,
    body: Option<TaskBody>,
) -> Result<(), HandlerError> {
    let join = tokio::spawn(
        async move { handler.handle(&execution, body).await }.in_current_span(),
    );
    match join.await {
        Ok(outcome) => outcome,
        Err(e) if e.is_panic() => Err(HandlerError::failed(format!(
            "handler panicked: {}",
            panic_message(e.into_panic())
        ))),
        Err(e) => Err(HandlerError::failed(format!("handler task ended: {e}"))),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
