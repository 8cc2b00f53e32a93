//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部システム（ドキュメントストア、時計、ID 生成）への
//! インターフェースを提供し、実装の詳細を隠蔽します。
//!
//! # 設計原則
//! - TaskStore が source of truth（正本）
//! - 並行制御はストアの条件付き更新のみ（プロセス内ロックは使わない）
//! - BodyStore は payload の保存先（TTL は Task と揃える）

pub mod body_store;
pub mod clock;
pub mod id_generator;
pub mod task_store;

pub use self::body_store::{BodyRecord, BodyStore};
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::task_store::{SortBy, TaskFilter, TaskStore, TaskUpdate};
