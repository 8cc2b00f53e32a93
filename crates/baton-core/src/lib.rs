//! baton-core
//!
//! Persistent task queue with bounded retries and fenced cancellation.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, config, body, state, task, errors）
//! - **ports**: 抽象化レイヤー（TaskStore, BodyStore, Clock, IdGenerator）
//! - **impls**: 実装（InMemoryTaskStore / InMemoryBodyStore、開発・テスト用）
//! - **app**: アプリケーションロジック（TaskEngine, WorkerGroup, ExpirySweeper, EngineConfig）
//! - **observability**: tracing の初期化と span ヘルパー

pub mod app;
pub mod domain;
pub mod impls;
pub mod observability;
pub mod ports;
