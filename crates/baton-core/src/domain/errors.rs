//! Errors - エラー型と分類
//!
//! Business outcomes ("cancel rejected", "nothing to claim") are plain
//! `bool` / `Option` values and never show up here. What remains is bad
//! input, consistency faults and infrastructure failures.

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::ids::TaskId;

/// ErrorKind は運用上の分類
///
/// - Validation: 入力エラー（修正せずにリトライしても無意味）
/// - Consistency: Task と Body の不整合（自動解決しない）
/// - Infrastructure: ストアの障害（リトライ方針は呼び出し側が決める）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Consistency,
    Infrastructure,
}

/// Failure reported by a store adapter.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid task config: {0}")]
    InvalidConfig(String),

    #[error(
        "inconsistent ttl for {task_id}: task delete_after={task_delete_after:?}, body delete_after={body_delete_after:?}"
    )]
    InconsistentTtl {
        task_id: TaskId,
        task_delete_after: Option<DateTime<Utc>>,
        body_delete_after: Option<DateTime<Utc>>,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::InvalidConfig(_) => ErrorKind::Validation,
            EngineError::InconsistentTtl { .. } => ErrorKind::Consistency,
            EngineError::Store(_) => ErrorKind::Infrastructure,
        }
    }
}
