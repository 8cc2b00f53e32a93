//! GCLoop - 期限切れタスクの削除
//!
//! `delete_after <= now` の Task と Body を定期的に削除します。
//! ストアに TTL インデックスがある場合、このループはその代わりです。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::app::engine::TaskEngine;

/// Background expiry sweep.
///
/// Deletion is best effort: a document past its deadline stays readable
/// until the next pass.
pub struct ExpirySweeper {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl ExpirySweeper {
    pub fn spawn(engine: Arc<TaskEngine>, interval: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        match engine.purge_expired().await {
                            Ok(report) if report.tasks > 0 || report.bodies > 0 => {
                                info!(
                                    tasks = report.tasks,
                                    bodies = report.bodies,
                                    "expired tasks removed"
                                );
                            }
                            Ok(_) => {}
                            Err(e) => error!(error = %e, "expiry sweep failed"),
                        }
                    }
                }
            }
        });

        Self { shutdown_tx, join }
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.join.await {
            error!(error = %e, "expiry sweeper panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TaskBody, TaskConfig};
    use crate::ports::FixedClock;
    use chrono::{TimeDelta, Utc};

    #[tokio::test]
    async fn sweeper_removes_expired_tasks() {
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let engine = Arc::new(TaskEngine::in_memory(clock.clone()));

        let config = TaskConfig::new(1, Some(Duration::from_secs(5))).unwrap();
        let expiring = engine.submit(config, TaskBody::new("a")).await.unwrap();
        let kept = engine
            .submit(TaskConfig::new(1, None).unwrap(), TaskBody::new("b"))
            .await
            .unwrap();
        clock.advance(TimeDelta::seconds(10));

        let sweeper = ExpirySweeper::spawn(Arc::clone(&engine), Duration::from_millis(5));
        tokio::time::timeout(Duration::from_secs(5), async {
            while engine.task_exists(expiring).await.unwrap() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("expired task was never swept");
        sweeper.shutdown().await;

        assert!(engine.load_task_body(expiring).await.unwrap().is_none());
        assert!(engine.task_exists(kept).await.unwrap());
    }
}
