//! herald-core
//!
//! Core building blocks for the Herald publishing runtime: take a content
//! item, deliver it to any number of pluggable backends, and reconcile the
//! per-target results into one item status. Two background loops keep the
//! pipeline moving without a human: a polling scheduler for items whose
//! time has come, and a cadence scheduler that writes and posts on its own
//! weekly rhythm.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, item, outcome, attempt, errors）
//! - **ports**: 抽象化レイヤー（ContentStore, DeliveryBackend, Clock, など）
//! - **registry**: 配信先レジストリ（name -> backend + config）
//! - **app**: アプリケーションロジック（dispatch, poll_loop, cadence_loop, builder）
//! - **impls**: 実装（InMemoryContentStore など開発用）

pub mod app;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod registry;

pub use app::{
    AggregateResult, App, AppBuilder, AppHandles, CadenceConfig, CadenceScheduler, CadenceTick,
    DispatchConfig, DispatchEngine, DispatchError, LoopHandle, PollConfig, PollScheduler,
    TargetReport, TickSummary,
};
pub use domain::{
    AggregationPolicy, ContentItem, DeliveryError, DeliveryErrorKind, DeliveryOutcome, ItemId,
    ItemStatus, NewItem, TargetDelivery, TargetStatus,
};
pub use registry::{BackendRegistry, RegistryError};
