//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせてアプリケーションロジックを実装します。
//!
//! # 主要コンポーネント
//! - **TaskEngine**: submit / cancel / claim / mark / TTL
//! - **EngineConfig**: 設定（環境変数で上書き可能）
//! - **WorkerGroup**: タスク実行ループ（claim→handle→mark）
//! - **ExpirySweeper**: 期限切れ Task / Body の削除
//! - **TaskCounts**: 状態ごとの件数

pub mod config;
pub mod engine;
pub mod gc_loop;
pub mod status;
pub mod worker_loop;

// 主要な型を再エクスポート
pub use self::config::{ConfigError, EngineConfig};
pub use self::engine::{PurgeReport, TaskEngine};
pub use self::gc_loop::ExpirySweeper;
pub use self::status::TaskCounts;
pub use self::worker_loop::{ExecutionHandler, HandlerError, WorkerGroup};
