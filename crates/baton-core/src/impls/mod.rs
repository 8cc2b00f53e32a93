//! Impls - ports の実装
//!
//! 開発・テスト用のインメモリ実装。プロセスが終わると状態は消えます。

pub mod memory_bodies;
pub mod memory_tasks;

pub use self::memory_bodies::InMemoryBodyStore;
pub use self::memory_tasks::InMemoryTaskStore;
