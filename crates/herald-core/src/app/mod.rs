//! App - アプリケーション層
//!
//! ports を組み合わせてアプリケーションロジックを実装します。
//!
//! # 主要コンポーネント
//! - **DispatchEngine**: 1 アイテムを N バックエンドへ配信し、結果を集約
//! - **PollScheduler**: 配信予定時刻を過ぎたアイテムを拾うループ
//! - **CadenceScheduler**: 曜日スケジュールで自動生成・自動配信するループ
//! - **AppBuilder / App**: ワイヤリングと起動・停止

pub mod builder;
pub mod cadence_loop;
pub mod dispatch;
pub mod handle;
pub mod poll_loop;

pub use self::builder::{App, AppBuilder, AppHandles, BuildError};
pub use self::cadence_loop::{CadenceConfig, CadenceScheduler, CadenceTick};
pub use self::dispatch::{
    AggregateResult, DispatchConfig, DispatchEngine, DispatchError, TargetReport,
};
pub use self::handle::LoopHandle;
pub use self::poll_loop::{PollConfig, PollScheduler, TickSummary};
