//! Domain identifiers (strongly-typed IDs).
//!
//! Every id is a ULID wrapped in `Id<M>`, where `M` is a zero-sized marker
//! that keeps `TaskId` and `ExecutionId` from being mixed up at compile time.
//!
//! ## ULID の特性
//! - **時刻でソート可能**: timestamp が先頭にあるため、生成順序でソートできる
//! - **分散生成可能**: 調整なしで複数ノードで生成できる
//! - **UUID互換**: 128-bit で UUID と同じサイズ
//!
//! `ExecutionId` doubles as the fencing token: a task's `last_execution_id`
//! is compared against the id a caller presents before any state change.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use ulid::Ulid;

/// IdMarker は各 ID 型のマーカー trait
///
/// Display で使うプレフィックス（"task-", "exec-"）を提供します。
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// ジェネリック ID 型
///
/// `M` は PhantomData で、実行時にはメモリを消費しません。
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id<M: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<M>,
}

impl<M: IdMarker> Id<M> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<M: IdMarker> From<Ulid> for Id<M> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<M: IdMarker> fmt::Display for Id<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", M::prefix(), self.ulid)
    }
}

/// Error returned when parsing an id from its display form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdParseError {
    #[error("expected prefix '{expected}' in '{input}'")]
    WrongPrefix { expected: &'static str, input: String },

    #[error("invalid ulid in '{input}': {reason}")]
    InvalidUlid { input: String, reason: String },
}

impl<M: IdMarker> FromStr for Id<M> {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s
            .strip_prefix(M::prefix())
            .ok_or_else(|| IdParseError::WrongPrefix {
                expected: M::prefix(),
                input: s.to_string(),
            })?;
        let ulid = Ulid::from_string(raw).map_err(|e| IdParseError::InvalidUlid {
            input: s.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::from_ulid(ulid))
    }
}

// ========================================
// マーカー型の定義
// ========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskMarker {}

impl IdMarker for TaskMarker {
    fn prefix() -> &'static str {
        "task-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExecutionMarker {}

impl IdMarker for ExecutionMarker {
    fn prefix() -> &'static str {
        "exec-"
    }
}

/// Identifier of a Task (assigned at submission, never reused).
pub type TaskId = Id<TaskMarker>;

/// Identifier of an Execution (one claimed attempt of a Task).
pub type ExecutionId = Id<ExecutionMarker>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct_types() {
        let ulid1 = Ulid::new();
        let ulid2 = Ulid::new();

        let task = TaskId::from_ulid(ulid1);
        let execution = ExecutionId::from_ulid(ulid2);

        assert_eq!(task.as_ulid(), ulid1);
        assert_eq!(execution.as_ulid(), ulid2);

        assert!(task.to_string().starts_with("task-"));
        assert!(execution.to_string().starts_with("exec-"));

        // let _: TaskId = execution; // <- does not compile
    }

    #[test]
    fn ulid_ids_are_sortable() {
        let id1 = ExecutionId::from_ulid(Ulid::new());
        std::thread::sleep(std::time::Duration::from_millis(2));
        let id2 = ExecutionId::from_ulid(Ulid::new());

        assert!(id1 < id2);
    }

    #[test]
    fn ulid_ids_can_be_serialized() {
        let task_id = TaskId::from_ulid(Ulid::new());

        let serialized = serde_json::to_string(&task_id).unwrap();
        let deserialized: TaskId = serde_json::from_str(&serialized).unwrap();

        assert_eq!(task_id, deserialized);
    }

    #[test]
    fn display_form_parses_back() {
        let task_id = TaskId::from_ulid(Ulid::new());
        let parsed: TaskId = task_id.to_string().parse().unwrap();
        assert_eq!(parsed, task_id);
    }

    #[test]
    fn parse_rejects_other_prefix() {
        let execution_id = ExecutionId::from_ulid(Ulid::new());
        let err = execution_id.to_string().parse::<TaskId>().unwrap_err();
        assert!(matches!(err, IdParseError::WrongPrefix { expected: "task-", .. }));
    }

    #[test]
    fn parse_rejects_garbage_ulid() {
        let err = "task-not-a-ulid".parse::<TaskId>().unwrap_err();
        assert!(matches!(err, IdParseError::InvalidUlid { .. }));
    }

    #[test]
    fn phantom_data_does_not_consume_memory() {
        use std::mem::size_of;

        assert_eq!(size_of::<TaskId>(), size_of::<Ulid>());
        assert_eq!(size_of::<ExecutionId>(), size_of::<Ulid>());
    }
}
